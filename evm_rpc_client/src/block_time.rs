use chrono::Utc;
use serde_json::json;
use tracing::{debug, warn};

use tracker_core::{BlockRange, ScanWindow};

use crate::error::EvmRpcError;
use crate::executor::EvmCall;
use crate::types::{parse_hex_i64, parse_hex_u64, RpcBlockHeader, RpcOutcome};

/// Reference point tying a block number to a unix timestamp.
///
/// EVM chains have no timestamp index, so all time-to-block math is an
/// estimate walked back from one of these anchors at the chain's average
/// block interval.
#[derive(Debug, Clone, Copy)]
pub struct BlockAnchor {
    pub number: u64,
    pub timestamp: i64,
}

/// Anchor on the chain head via `eth_getBlockByNumber("latest")`.
pub async fn latest_anchor(call: &dyn EvmCall) -> Result<BlockAnchor, EvmRpcError> {
    match call
        .call("eth_getBlockByNumber", json!(["latest", false]))
        .await
    {
        RpcOutcome::Success(value) => {
            let header: RpcBlockHeader = serde_json::from_value(value)?;
            let number = parse_hex_u64(&header.number).ok_or_else(|| EvmRpcError::Parse {
                message: format!("bad latest block number: {}", header.number),
            })?;
            let timestamp = parse_hex_i64(&header.timestamp).ok_or_else(|| EvmRpcError::Parse {
                message: format!("bad latest block timestamp: {}", header.timestamp),
            })?;
            Ok(BlockAnchor { number, timestamp })
        }
        RpcOutcome::Empty => Err(EvmRpcError::CallFailed {
            message: "latest block query returned nothing".to_string(),
        }),
        RpcOutcome::Recoverable(reason) | RpcOutcome::Fatal(reason) => {
            Err(EvmRpcError::CallFailed { message: reason })
        }
    }
}

/// Cheaper anchor for when the head query fails: pair `eth_blockNumber`
/// with the wall clock. Less accurate, still good enough for range math.
pub async fn fallback_anchor(call: &dyn EvmCall) -> Result<BlockAnchor, EvmRpcError> {
    match call.call("eth_blockNumber", json!([])).await {
        RpcOutcome::Success(value) => {
            let raw = value.as_str().ok_or_else(|| EvmRpcError::Parse {
                message: format!("eth_blockNumber returned non-string: {}", value),
            })?;
            let number = parse_hex_u64(raw).ok_or_else(|| EvmRpcError::Parse {
                message: format!("bad block number: {}", raw),
            })?;
            Ok(BlockAnchor {
                number,
                timestamp: Utc::now().timestamp(),
            })
        }
        RpcOutcome::Empty => Err(EvmRpcError::CallFailed {
            message: "eth_blockNumber returned nothing".to_string(),
        }),
        RpcOutcome::Recoverable(reason) | RpcOutcome::Fatal(reason) => {
            Err(EvmRpcError::CallFailed { message: reason })
        }
    }
}

/// Estimate the block height at `target_ts`. Future timestamps pin to the
/// anchor; the estimate never goes below block 1.
pub fn estimate_block_at(anchor: BlockAnchor, target_ts: i64, avg_block_seconds: u64) -> u64 {
    if target_ts >= anchor.timestamp {
        return anchor.number;
    }
    let behind = (anchor.timestamp - target_ts) as u64 / avg_block_seconds.max(1);
    anchor.number.saturating_sub(behind).max(1)
}

/// Approximate timestamp of `block` relative to the anchor.
pub fn estimate_timestamp_of(anchor: BlockAnchor, block: u64, avg_block_seconds: u64) -> i64 {
    let avg = avg_block_seconds.max(1) as i64;
    if block >= anchor.number {
        anchor.timestamp + (block - anchor.number) as i64 * avg
    } else {
        anchor.timestamp - (anchor.number - block) as i64 * avg
    }
}

/// Translate a time window into a block range, clamped to `max_span`
/// blocks with the most recent end preserved.
pub async fn resolve_block_range(
    call: &dyn EvmCall,
    window: ScanWindow,
    avg_block_seconds: u64,
    max_span: u64,
) -> Result<(BlockRange, BlockAnchor), EvmRpcError> {
    let anchor = match latest_anchor(call).await {
        Ok(anchor) => anchor,
        Err(err) => {
            warn!(
                "⚠️  Latest block query failed ({}), anchoring on wall clock instead",
                err
            );
            fallback_anchor(call).await?
        }
    };
    let start = estimate_block_at(anchor, window.start_ts, avg_block_seconds);
    let end = estimate_block_at(anchor, window.end_ts, avg_block_seconds);
    let range = BlockRange::new(start, end).clamp_to_span(max_span);
    debug!(
        "🎯 Window {}..{} resolved to blocks {}..{} (head at {})",
        window.start_ts, window.end_ts, range.start_block, range.end_block, anchor.number
    );
    Ok((range, anchor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedCall {
        outcomes: Mutex<VecDeque<RpcOutcome>>,
        methods: Mutex<Vec<String>>,
    }

    impl ScriptedCall {
        fn new(outcomes: Vec<RpcOutcome>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                methods: Mutex::new(Vec::new()),
            }
        }

        fn methods(&self) -> Vec<String> {
            self.methods.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EvmCall for ScriptedCall {
        async fn call(&self, method: &str, _params: Value) -> RpcOutcome {
            self.methods.lock().unwrap().push(method.to_string());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(RpcOutcome::Empty)
        }
    }

    fn anchor() -> BlockAnchor {
        BlockAnchor {
            number: 1_000,
            timestamp: 10_000,
        }
    }

    #[test]
    fn estimates_walk_back_from_anchor() {
        assert_eq!(estimate_block_at(anchor(), 10_000, 3), 1_000);
        assert_eq!(estimate_block_at(anchor(), 9_700, 3), 900);
        assert_eq!(estimate_block_at(anchor(), 11_000, 3), 1_000);
    }

    #[test]
    fn estimate_never_goes_below_block_one() {
        assert_eq!(estimate_block_at(anchor(), 0, 3), 1);
    }

    #[test]
    fn timestamp_estimates_are_symmetric() {
        assert_eq!(estimate_timestamp_of(anchor(), 900, 3), 9_700);
        assert_eq!(estimate_timestamp_of(anchor(), 1_050, 3), 10_150);
        assert_eq!(estimate_timestamp_of(anchor(), 1_000, 3), 10_000);
    }

    #[tokio::test]
    async fn resolves_window_against_latest_header() {
        let call = ScriptedCall::new(vec![RpcOutcome::Success(json!({
            "number": "0x3e8",
            "timestamp": "0x2710",
        }))]);

        let (range, anchor) =
            resolve_block_range(&call, ScanWindow::new(9_700, 9_970), 3, 10_000)
                .await
                .unwrap();

        assert_eq!(anchor.number, 1_000);
        assert_eq!(anchor.timestamp, 10_000);
        assert_eq!(range.start_block, 900);
        assert_eq!(range.end_block, 990);
        assert_eq!(call.methods(), vec!["eth_getBlockByNumber"]);
    }

    #[tokio::test]
    async fn clamps_oversized_ranges() {
        let call = ScriptedCall::new(vec![RpcOutcome::Success(json!({
            "number": "0xf4240",
            "timestamp": "0x2710",
        }))]);

        // 50k-block window against a 10k ceiling
        let (range, _) = resolve_block_range(&call, ScanWindow::new(-140_000, 10_000), 3, 10_000)
            .await
            .unwrap();

        assert_eq!(range.span(), 10_000);
        assert_eq!(range.end_block, 1_000_000);
    }

    #[tokio::test]
    async fn falls_back_to_wall_clock_anchor() {
        let now = Utc::now().timestamp();
        let call = ScriptedCall::new(vec![
            RpcOutcome::Fatal("head query refused".to_string()),
            RpcOutcome::Success(json!("0x3e8")),
        ]);

        let (range, anchor) =
            resolve_block_range(&call, ScanWindow::new(now - 300, now), 3, 10_000)
                .await
                .unwrap();

        assert_eq!(anchor.number, 1_000);
        assert!((anchor.timestamp - now).abs() < 10);
        assert_eq!(range.end_block, 1_000);
        assert_eq!(call.methods(), vec!["eth_getBlockByNumber", "eth_blockNumber"]);
    }

    #[tokio::test]
    async fn both_anchors_failing_is_an_error() {
        let call = ScriptedCall::new(vec![
            RpcOutcome::Fatal("head query refused".to_string()),
            RpcOutcome::Fatal("still refused".to_string()),
        ]);

        let result = resolve_block_range(&call, ScanWindow::new(0, 100), 3, 10_000).await;
        assert!(result.is_err());
    }
}
