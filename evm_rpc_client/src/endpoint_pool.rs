use crate::error::EvmRpcError;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointHealth {
    Unknown,
    Healthy,
    Unhealthy,
}

#[derive(Debug)]
struct EndpointState {
    url: String,
    health: EndpointHealth,
}

#[derive(Debug)]
struct PoolInner {
    endpoints: Vec<EndpointState>,
    current: usize,
}

/// Ordered, rotating pool of RPC endpoints for one network.
///
/// `current()` hands out the active endpoint; when a call fails the
/// executor marks it unhealthy and `rotate()`s to the next one, wrapping
/// around. The pool itself is passive: liveness probing and the
/// one-full-cycle exhaustion check live in the executor, which can issue
/// network calls.
#[derive(Debug)]
pub struct EndpointPool {
    inner: Mutex<PoolInner>,
}

impl EndpointPool {
    pub fn new(urls: Vec<String>) -> Result<Self, EvmRpcError> {
        if urls.is_empty() {
            return Err(EvmRpcError::NoEndpoints);
        }
        let endpoints = urls
            .into_iter()
            .map(|url| EndpointState {
                url,
                health: EndpointHealth::Unknown,
            })
            .collect();
        Ok(Self {
            inner: Mutex::new(PoolInner {
                endpoints,
                current: 0,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().endpoints.is_empty()
    }

    /// The endpoint calls should currently go to.
    pub fn current(&self) -> String {
        let inner = self.lock();
        inner.endpoints[inner.current].url.clone()
    }

    /// Advance to the next endpoint (wrapping) and return it.
    pub fn rotate(&self) -> String {
        let mut inner = self.lock();
        inner.current = (inner.current + 1) % inner.endpoints.len();
        let url = inner.endpoints[inner.current].url.clone();
        debug!("Endpoint pool advanced to index {}", inner.current);
        url
    }

    pub fn mark_healthy(&self) {
        let mut inner = self.lock();
        let current = inner.current;
        inner.endpoints[current].health = EndpointHealth::Healthy;
    }

    pub fn mark_unhealthy(&self) {
        let mut inner = self.lock();
        let current = inner.current;
        inner.endpoints[current].health = EndpointHealth::Unhealthy;
    }

    pub fn current_health(&self) -> EndpointHealth {
        let inner = self.lock();
        inner.endpoints[inner.current].health
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> EndpointPool {
        EndpointPool::new(vec![
            "https://a.example".to_string(),
            "https://b.example".to_string(),
            "https://c.example".to_string(),
        ])
        .unwrap()
    }

    #[test]
    fn empty_pool_is_rejected() {
        assert!(matches!(
            EndpointPool::new(vec![]),
            Err(EvmRpcError::NoEndpoints)
        ));
    }

    #[test]
    fn rotation_wraps_around() {
        let pool = pool();
        assert_eq!(pool.current(), "https://a.example");
        assert_eq!(pool.rotate(), "https://b.example");
        assert_eq!(pool.rotate(), "https://c.example");
        assert_eq!(pool.rotate(), "https://a.example");
        assert_eq!(pool.current(), "https://a.example");
    }

    #[test]
    fn health_marks_apply_to_current_endpoint() {
        let pool = pool();
        assert_eq!(pool.current_health(), EndpointHealth::Unknown);

        pool.mark_unhealthy();
        assert_eq!(pool.current_health(), EndpointHealth::Unhealthy);

        pool.rotate();
        assert_eq!(pool.current_health(), EndpointHealth::Unknown);
        pool.mark_healthy();
        assert_eq!(pool.current_health(), EndpointHealth::Healthy);
    }
}
