use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use retry_utils::{RetryClass, RetryPolicy};

use crate::endpoint_pool::EndpointPool;
use crate::error::EvmRpcError;
use crate::types::{RpcOutcome, RpcRequest, RpcResponse};

/// Seam between the scanners and the wire. Implemented by [`RpcExecutor`]
/// for real traffic and by scripted fakes in tests.
#[async_trait]
pub trait EvmCall: Send + Sync {
    /// Issue one JSON-RPC call and classify the outcome.
    async fn call(&self, method: &str, params: Value) -> RpcOutcome;
}

/// Wire-level seam so the retry loop can be exercised without sockets.
#[async_trait]
trait RpcTransport: Send + Sync {
    async fn post(
        &self,
        url: &str,
        request: &RpcRequest,
        timeout: Option<Duration>,
    ) -> Result<RpcResponse, EvmRpcError>;
}

struct HttpTransport {
    http: Client,
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn post(
        &self,
        url: &str,
        request: &RpcRequest,
        timeout: Option<Duration>,
    ) -> Result<RpcResponse, EvmRpcError> {
        let mut builder = self.http.post(url).json(request);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let response = builder.send().await?;
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(EvmRpcError::RateLimit);
        }
        let body = response.text().await?;
        if !status.is_success() {
            let snippet: String = body.chars().take(200).collect();
            return Err(EvmRpcError::CallFailed {
                message: format!("HTTP {} from {}: {}", status, url, snippet),
            });
        }
        serde_json::from_str::<RpcResponse>(&body).map_err(|err| {
            let snippet: String = body.chars().take(200).collect();
            warn!("⚠️  Unparseable RPC response from {}: {}", url, snippet);
            EvmRpcError::Json(err)
        })
    }
}

/// Outcome of a single attempt, before retry bookkeeping.
enum Attempt {
    /// Terminal for this call
    Done(RpcOutcome),
    /// Provider asked us to slow down. Pause, then retry the same endpoint
    RateLimited(String),
    /// Transport or RPC failure worth trying another endpoint
    Retry(String),
}

/// Provider errors that mean "no data here", not "call failed". Retrying
/// these will not change anything; the scanner narrows the query instead.
fn is_benign_rpc_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("filter not found")
        || lower.contains("result set too large")
        || lower.contains("response size exceeded")
        || (lower.contains("more than") && lower.contains("results"))
}

fn is_rate_limit_error(code: i64, message: &str) -> bool {
    let lower = message.to_lowercase();
    code == -32005 || lower.contains("rate limit") || lower.contains("too many requests")
}

fn interpret_response(response: RpcResponse) -> Attempt {
    if let Some(error) = response.error {
        if is_benign_rpc_error(&error.message) {
            debug!("📭 Treating RPC error as empty result: {}", error.message);
            return Attempt::Done(RpcOutcome::Empty);
        }
        if is_rate_limit_error(error.code, &error.message) {
            return Attempt::RateLimited(error.message);
        }
        return Attempt::Retry(format!("RPC error {}: {}", error.code, error.message));
    }
    match response.result {
        None | Some(Value::Null) => Attempt::Done(RpcOutcome::Empty),
        Some(Value::Array(items)) if items.is_empty() => Attempt::Done(RpcOutcome::Empty),
        Some(value) => Attempt::Done(RpcOutcome::Success(value)),
    }
}

/// JSON-RPC executor over a rotating endpoint pool.
///
/// One instance is shared per chain for the lifetime of the process, so
/// endpoint health learned by one request benefits the next.
pub struct RpcExecutor {
    transport: Box<dyn RpcTransport>,
    pool: Arc<EndpointPool>,
    policy: RetryPolicy,
    probe_timeout: Duration,
    request_id: AtomicU64,
}

impl RpcExecutor {
    pub fn new(
        urls: Vec<String>,
        request_timeout_seconds: u64,
        probe_timeout_seconds: u64,
        policy: RetryPolicy,
    ) -> Result<Self, EvmRpcError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(request_timeout_seconds))
            .build()?;
        Ok(Self {
            transport: Box::new(HttpTransport { http }),
            pool: Arc::new(EndpointPool::new(urls)?),
            policy,
            probe_timeout: Duration::from_secs(probe_timeout_seconds),
            request_id: AtomicU64::new(1),
        })
    }

    fn with_transport(
        transport: Box<dyn RpcTransport>,
        urls: Vec<String>,
        policy: RetryPolicy,
    ) -> Result<Self, EvmRpcError> {
        Ok(Self {
            transport,
            pool: Arc::new(EndpointPool::new(urls)?),
            policy,
            probe_timeout: Duration::from_secs(5),
            request_id: AtomicU64::new(1),
        })
    }

    pub fn pool(&self) -> &EndpointPool {
        &self.pool
    }

    fn next_request(&self, method: &str, params: &Value) -> RpcRequest {
        RpcRequest {
            jsonrpc: "2.0",
            id: self.request_id.fetch_add(1, Ordering::Relaxed),
            method: method.to_string(),
            params: params.clone(),
        }
    }

    /// Cheap liveness check: the endpoint must answer `eth_blockNumber`
    /// with a result within the probe timeout.
    async fn probe(&self, url: &str) -> bool {
        let request = self.next_request("eth_blockNumber", &json!([]));
        match self
            .transport
            .post(url, &request, Some(self.probe_timeout))
            .await
        {
            Ok(response) => {
                let alive = response.error.is_none() && response.result.is_some();
                if alive {
                    debug!("✅ RPC endpoint {} passed liveness probe", url);
                }
                alive
            }
            Err(_) => false,
        }
    }

    /// Advance the pool until a probe succeeds. One full unsuccessful
    /// cycle means the chain is unreachable right now.
    async fn rotate_to_live(&self) -> Result<String, EvmRpcError> {
        for _ in 0..self.pool.len() {
            let candidate = self.pool.rotate();
            if self.probe(&candidate).await {
                self.pool.mark_healthy();
                info!("🔄 Switched to RPC endpoint {}", candidate);
                return Ok(candidate);
            }
            self.pool.mark_unhealthy();
        }
        warn!("❌ All {} RPC endpoints are unreachable", self.pool.len());
        Err(EvmRpcError::PoolExhausted {
            message: format!("all {} endpoints failed liveness probes", self.pool.len()),
        })
    }
}

#[async_trait]
impl EvmCall for RpcExecutor {
    async fn call(&self, method: &str, params: Value) -> RpcOutcome {
        let mut attempt: u32 = 0;
        loop {
            let url = self.pool.current();
            let request = self.next_request(method, &params);
            let step = match self.transport.post(&url, &request, None).await {
                Ok(response) => interpret_response(response),
                Err(EvmRpcError::RateLimit) => {
                    Attempt::RateLimited(format!("HTTP 429 from {}", url))
                }
                Err(err) => Attempt::Retry(err.to_string()),
            };

            match step {
                Attempt::Done(outcome) => {
                    self.pool.mark_healthy();
                    return outcome;
                }
                Attempt::RateLimited(reason) => {
                    attempt += 1;
                    if attempt > self.policy.max_attempts {
                        warn!(
                            "❌ RPC {} gave up after {} attempts: {}",
                            method, attempt, reason
                        );
                        return RpcOutcome::Fatal(reason);
                    }
                    let delay = self
                        .policy
                        .delay_for(attempt, RetryClass::RateLimit)
                        .unwrap_or_default();
                    warn!(
                        "⏳ Rate limited by {} (pausing {}ms): {}",
                        url,
                        delay.as_millis(),
                        reason
                    );
                    tokio::time::sleep(delay).await;
                }
                Attempt::Retry(reason) => {
                    attempt += 1;
                    self.pool.mark_unhealthy();
                    if attempt > self.policy.max_attempts {
                        warn!(
                            "❌ RPC {} gave up after {} attempts: {}",
                            method, attempt, reason
                        );
                        return RpcOutcome::Fatal(reason);
                    }
                    warn!(
                        "⚠️  RPC {} failed via {} (attempt {}/{}): {}",
                        method,
                        url,
                        attempt,
                        self.policy.max_attempts + 1,
                        reason
                    );
                    if let Err(err) = self.rotate_to_live().await {
                        return RpcOutcome::Fatal(err.to_string());
                    }
                    let delay = self
                        .policy
                        .delay_for(attempt, RetryClass::Transport)
                        .unwrap_or_default()
                        + self.policy.jitter();
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
