//! Incoming-transfer tracking for EVM chains over plain JSON-RPC.
//!
//! Bare nodes keep no per-address history, so the pipeline reconstructs
//! it: translate the time window into a block range, run the scan ladder
//! for native transfers plus one filtered log query for token transfers,
//! then normalize, dedup, and window-filter the candidates.

pub mod block_time;
pub mod endpoint_pool;
pub mod error;
pub mod executor;
pub mod normalize;
pub mod reconstruct;
pub mod types;

pub use endpoint_pool::{EndpointHealth, EndpointPool};
pub use error::EvmRpcError;
pub use executor::{EvmCall, RpcExecutor};
pub use reconstruct::{ScanLimits, TransferScanner};
pub use types::{RawTransferCandidate, RpcOutcome, TRANSFER_EVENT_TOPIC};

use tracing::info;

use retry_utils::RetryPolicy;
use tracker_core::{chains, merge_transfers, ChainId, ScanWindow, TrackerResult};

use crate::normalize::EvmNormalizer;

/// Tuning knobs for one chain's RPC pipeline, normally sourced from the
/// `evm_rpc` configuration section.
#[derive(Debug, Clone)]
pub struct EvmRpcSettings {
    pub endpoints: Vec<String>,
    pub request_timeout_seconds: u64,
    pub probe_timeout_seconds: u64,
    pub max_retries: u32,
    pub base_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub rate_limit_delay_ms: u64,
    pub max_blocks_to_scan: u64,
    pub direct_block_parse_limit: u64,
    pub broad_log_limit: usize,
    pub dust_filter_enabled: bool,
}

impl Default for EvmRpcSettings {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            request_timeout_seconds: 15,
            probe_timeout_seconds: 5,
            max_retries: 3,
            base_retry_delay_ms: 500,
            max_retry_delay_ms: 8_000,
            rate_limit_delay_ms: 1_000,
            max_blocks_to_scan: 10_000,
            direct_block_parse_limit: 500,
            broad_log_limit: 1_000,
            dust_filter_enabled: true,
        }
    }
}

/// Transfer tracker for one EVM network backed by a rotating JSON-RPC
/// endpoint pool. One instance per network, shared across requests so the
/// pool's endpoint health carries over.
pub struct EvmRpcTracker {
    chain: ChainId,
    network: String,
    call: Box<dyn EvmCall>,
    limits: ScanLimits,
    max_blocks_to_scan: u64,
    dust_filter_enabled: bool,
}

impl EvmRpcTracker {
    pub fn new(network: &str, settings: EvmRpcSettings) -> Result<Self, EvmRpcError> {
        let chain = chains::chain_id_for_network(network)
            .ok_or_else(|| EvmRpcError::UnsupportedNetwork(network.to_string()))?;
        let policy = RetryPolicy {
            max_attempts: settings.max_retries,
            base_delay_ms: settings.base_retry_delay_ms,
            max_delay_ms: settings.max_retry_delay_ms,
            rate_limit_delay_ms: settings.rate_limit_delay_ms,
            ..RetryPolicy::default()
        };
        let executor = RpcExecutor::new(
            settings.endpoints,
            settings.request_timeout_seconds,
            settings.probe_timeout_seconds,
            policy,
        )?;
        info!("✅ EVM RPC tracker initialized for {}", network);
        Ok(Self {
            chain,
            network: network.to_string(),
            call: Box::new(executor),
            limits: ScanLimits {
                direct_block_parse_limit: settings.direct_block_parse_limit,
                broad_log_limit: settings.broad_log_limit,
            },
            max_blocks_to_scan: settings.max_blocks_to_scan,
            dust_filter_enabled: settings.dust_filter_enabled,
        })
    }

    fn with_call(
        network: &str,
        call: Box<dyn EvmCall>,
        settings: EvmRpcSettings,
    ) -> Result<Self, EvmRpcError> {
        let chain = chains::chain_id_for_network(network)
            .ok_or_else(|| EvmRpcError::UnsupportedNetwork(network.to_string()))?;
        Ok(Self {
            chain,
            network: network.to_string(),
            call,
            limits: ScanLimits {
                direct_block_parse_limit: settings.direct_block_parse_limit,
                broad_log_limit: settings.broad_log_limit,
            },
            max_blocks_to_scan: settings.max_blocks_to_scan,
            dust_filter_enabled: settings.dust_filter_enabled,
        })
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn chain(&self) -> ChainId {
        self.chain
    }

    /// Reconstruct incoming transfers to `address` within the inclusive
    /// unix-seconds window.
    pub async fn get_transactions(
        &self,
        address: &str,
        start_time: i64,
        end_time: i64,
    ) -> Result<TrackerResult, EvmRpcError> {
        let window = ScanWindow::new(start_time, end_time);
        let avg_block_seconds = chains::avg_block_seconds(self.chain);
        info!(
            "🔍 Scanning {} for transfers to {} in window {}..{}",
            self.network, address, start_time, end_time
        );

        let (range, anchor) = block_time::resolve_block_range(
            self.call.as_ref(),
            window,
            avg_block_seconds,
            self.max_blocks_to_scan,
        )
        .await?;

        let scanner = TransferScanner::new(self.call.as_ref(), address, self.limits);
        let mut native_candidates = scanner.find_native_candidates(range).await?;
        let mut token_candidates = scanner.find_token_candidates(range).await?;
        scanner
            .resolve_timestamps(&mut native_candidates, anchor, avg_block_seconds)
            .await;
        scanner
            .resolve_timestamps(&mut token_candidates, anchor, avg_block_seconds)
            .await;

        let normalizer = EvmNormalizer::new(
            self.call.as_ref(),
            self.chain,
            address,
            self.dust_filter_enabled,
        );
        let native = normalizer.native_transfers(&native_candidates);
        let tokens = normalizer.token_transfers(&token_candidates).await;

        let result = TrackerResult {
            native: merge_transfers(native, window),
            tokens: merge_transfers(tokens, window),
            network: self.network.clone(),
        };
        info!(
            "📊 {} scan complete: {} native, {} token transfer(s)",
            self.network,
            result.native.len(),
            result.tokens.len()
        );
        Ok(result)
    }
}
