//! Multi-chain scan orchestration: per-network tracker dispatch, batched
//! concurrent (wallet, network) scan units, cooperative cancellation, and
//! the final merge into one deduplicated transfer list per wallet.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ankr_client::{AnkrSettings, AnkrTracker};
use config_manager::{address_matches_network, TrackerConfig};
use etherscan_client::{EtherscanSettings, EtherscanTracker};
use evm_rpc_client::{EvmRpcSettings, EvmRpcTracker};
use tracker_core::{merge_results, ScanWindow, TrackerResult, Transfer};
use trongrid_client::{TronGridSettings, TronTracker};

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("EVM RPC error: {0}")]
    EvmRpc(String),
    #[error("TRON error: {0}")]
    Tron(String),
    #[error("Explorer error: {0}")]
    Explorer(String),
    #[error("Gateway error: {0}")]
    Gateway(String),
    #[error("Window error: {0}")]
    Window(String),
}

impl From<config_manager::ConfigurationError> for OrchestratorError {
    fn from(err: config_manager::ConfigurationError) -> Self {
        OrchestratorError::Config(err.to_string())
    }
}

impl From<evm_rpc_client::EvmRpcError> for OrchestratorError {
    fn from(err: evm_rpc_client::EvmRpcError) -> Self {
        OrchestratorError::EvmRpc(err.to_string())
    }
}

impl From<trongrid_client::TronGridError> for OrchestratorError {
    fn from(err: trongrid_client::TronGridError) -> Self {
        match err {
            trongrid_client::TronGridError::MissingApiKey => {
                OrchestratorError::Config(err.to_string())
            }
            other => OrchestratorError::Tron(other.to_string()),
        }
    }
}

impl From<etherscan_client::EtherscanError> for OrchestratorError {
    fn from(err: etherscan_client::EtherscanError) -> Self {
        match err {
            etherscan_client::EtherscanError::MissingApiKey => {
                OrchestratorError::Config(err.to_string())
            }
            other => OrchestratorError::Explorer(other.to_string()),
        }
    }
}

impl From<ankr_client::AnkrError> for OrchestratorError {
    fn from(err: ankr_client::AnkrError) -> Self {
        match err {
            ankr_client::AnkrError::MissingApiKey => OrchestratorError::Config(err.to_string()),
            other => OrchestratorError::Gateway(other.to_string()),
        }
    }
}

impl From<tracker_core::TrackerError> for OrchestratorError {
    fn from(err: tracker_core::TrackerError) -> Self {
        OrchestratorError::Window(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Closed set of per-network pipelines. Adding a chain family means
/// adding a variant here and a routing arm in
/// [`ScanOrchestrator::build_tracker`].
pub enum ChainTracker {
    Tron(TronTracker),
    EvmRpc(EvmRpcTracker),
    Explorer(EtherscanTracker),
    Gateway(AnkrTracker),
}

impl ChainTracker {
    pub fn network(&self) -> &str {
        match self {
            ChainTracker::Tron(tracker) => tracker.network(),
            ChainTracker::EvmRpc(tracker) => tracker.network(),
            ChainTracker::Explorer(tracker) => tracker.network(),
            ChainTracker::Gateway(tracker) => tracker.network(),
        }
    }

    /// Pipeline kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ChainTracker::Tron(_) => "tron",
            ChainTracker::EvmRpc(_) => "evm-rpc",
            ChainTracker::Explorer(_) => "explorer",
            ChainTracker::Gateway(_) => "gateway",
        }
    }

    /// The one capability every variant provides: incoming transfers to
    /// `address` within the inclusive unix-seconds window.
    pub async fn get_transactions(
        &self,
        address: &str,
        start_time: i64,
        end_time: i64,
    ) -> Result<TrackerResult> {
        match self {
            ChainTracker::Tron(tracker) => {
                Ok(tracker.get_transactions(address, start_time, end_time).await?)
            }
            ChainTracker::EvmRpc(tracker) => {
                Ok(tracker.get_transactions(address, start_time, end_time).await?)
            }
            ChainTracker::Explorer(tracker) => {
                Ok(tracker.get_transactions(address, start_time, end_time).await?)
            }
            ChainTracker::Gateway(tracker) => {
                Ok(tracker.get_transactions(address, start_time, end_time).await?)
            }
        }
    }
}

/// Cooperative cancellation handle. Cancelling stops new scan units from
/// being issued; units already in flight finish or time out on their own,
/// and whatever they produced is still merged.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Outcome of scanning one wallet across every applicable network.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub id: Uuid,
    pub wallet: String,
    /// Per-network results, in completion-batch order
    pub results: Vec<TrackerResult>,
    /// All networks merged: deduplicated, window-filtered, sorted by
    /// timestamp ascending
    pub transfers: Vec<Transfer>,
}

/// Builds one tracker per configured network and runs (wallet, network)
/// scan units concurrently in bounded batches. Trackers live for the
/// orchestrator's lifetime, so RPC endpoint health learned by one scan
/// carries over to the next.
pub struct ScanOrchestrator {
    trackers: Vec<ChainTracker>,
    batch_size: usize,
    cancel: CancelToken,
}

impl ScanOrchestrator {
    /// Routing rules, checked in order: "tron" runs the TRON pipeline; a
    /// network with a configured RPC endpoint list runs the JSON-RPC
    /// pipeline; a network in `explorer_networks` runs the explorer
    /// pipeline; everything else falls back to the gateway.
    pub fn from_config(config: &TrackerConfig) -> Result<Self> {
        let mut trackers = Vec::new();
        for network in &config.tracking.networks {
            let tracker = Self::build_tracker(network, config)?;
            debug!("Routed network {} to the {} pipeline", network, tracker.kind());
            trackers.push(tracker);
        }
        info!(
            "✅ Scan orchestrator ready with {} network pipeline(s)",
            trackers.len()
        );
        Ok(Self {
            trackers,
            batch_size: config.system.scan_batch_size.max(1),
            cancel: CancelToken::new(),
        })
    }

    fn build_tracker(network: &str, config: &TrackerConfig) -> Result<ChainTracker> {
        let dust = config.filters.dust_enabled;

        if network == "tron" {
            let settings = TronGridSettings {
                api_key: config.trongrid.api_key.clone(),
                api_base_url: config.trongrid.api_base_url.clone(),
                request_timeout_seconds: config.trongrid.request_timeout_seconds,
                page_limit: config.trongrid.page_limit,
                max_retries: config.trongrid.max_retries,
            };
            return Ok(ChainTracker::Tron(TronTracker::new(settings, dust)?));
        }

        if let Some(endpoints) = config.evm_rpc.endpoints.get(network) {
            let settings = EvmRpcSettings {
                endpoints: endpoints.clone(),
                request_timeout_seconds: config.evm_rpc.request_timeout_seconds,
                probe_timeout_seconds: config.evm_rpc.probe_timeout_seconds,
                max_retries: config.evm_rpc.max_retries,
                base_retry_delay_ms: config.evm_rpc.base_retry_delay_ms,
                max_retry_delay_ms: config.evm_rpc.max_retry_delay_ms,
                rate_limit_delay_ms: config.evm_rpc.rate_limit_delay_ms,
                max_blocks_to_scan: config.evm_rpc.max_blocks_to_scan,
                direct_block_parse_limit: config.evm_rpc.direct_block_parse_limit,
                broad_log_limit: config.evm_rpc.broad_log_limit,
                dust_filter_enabled: dust,
            };
            return Ok(ChainTracker::EvmRpc(EvmRpcTracker::new(network, settings)?));
        }

        if config
            .tracking
            .explorer_networks
            .iter()
            .any(|n| n == network)
        {
            let settings = EtherscanSettings {
                api_key: config.etherscan.api_key.clone(),
                api_base_url: config.etherscan.api_base_url.clone(),
                request_timeout_seconds: config.etherscan.request_timeout_seconds,
                rate_limit_delay_ms: config.etherscan.rate_limit_delay_ms,
                max_retries: config.etherscan.max_retries,
            };
            return Ok(ChainTracker::Explorer(EtherscanTracker::new(
                network, settings, dust,
            )?));
        }

        let settings = AnkrSettings {
            api_key: config.ankr.api_key.clone(),
            api_base_url: config.ankr.api_base_url.clone(),
            request_timeout_seconds: config.ankr.request_timeout_seconds,
            page_size: config.ankr.page_size,
            max_retries: config.ankr.max_retries,
        };
        Ok(ChainTracker::Gateway(AnkrTracker::new(
            network, settings, dust,
        )?))
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn networks(&self) -> Vec<&str> {
        self.trackers.iter().map(ChainTracker::network).collect()
    }

    /// Trackers whose network can hold the wallet: TRON wallets pair only
    /// with TRON, EVM wallets with everything else.
    fn units_for(&self, wallet: &str) -> Vec<&ChainTracker> {
        self.trackers
            .iter()
            .filter(|tracker| address_matches_network(wallet, tracker.network()))
            .collect()
    }

    /// Scan one wallet across every applicable network. Chain-local
    /// failures degrade to an empty result for that chain; the report is
    /// never aborted by one unreachable provider.
    pub async fn scan_wallet(&self, wallet: &str, window: ScanWindow) -> ScanReport {
        let id = Uuid::new_v4();
        let units = self.units_for(wallet);
        info!(
            "🚀 Scan {} for wallet {} across {} network(s)",
            id,
            wallet,
            units.len()
        );

        let mut results: Vec<TrackerResult> = Vec::with_capacity(units.len());
        for batch in units.chunks(self.batch_size) {
            if self.cancel.is_cancelled() {
                info!("🛑 Scan {} cancelled; returning what was merged so far", id);
                break;
            }
            let outcomes = join_all(
                batch
                    .iter()
                    .map(|tracker| self.scan_unit(tracker, wallet, window)),
            )
            .await;
            results.extend(outcomes);
        }

        let transfers = merge_results(results.clone(), window);
        info!(
            "🏁 Scan {} complete: {} transfer(s) for {}",
            id,
            transfers.len(),
            wallet
        );
        ScanReport {
            id,
            wallet: wallet.to_string(),
            results,
            transfers,
        }
    }

    async fn scan_unit(
        &self,
        tracker: &ChainTracker,
        wallet: &str,
        window: ScanWindow,
    ) -> TrackerResult {
        if self.cancel.is_cancelled() {
            return TrackerResult::empty(tracker.network());
        }
        match tracker
            .get_transactions(wallet, window.start_ts, window.end_ts)
            .await
        {
            Ok(result) => result,
            Err(err) => {
                // Best-effort per chain: the caller sees zero transfers
                // here whether the chain was quiet or unreachable
                warn!(
                    "⚠️  {} scan failed for {} on {}: {}",
                    tracker.kind(),
                    wallet,
                    tracker.network(),
                    err
                );
                TrackerResult::empty(tracker.network())
            }
        }
    }

    /// Scan every wallet in turn. Wallets run sequentially; the per-wallet
    /// batching already saturates the upstream rate budget.
    pub async fn scan_all(&self, wallets: &[String], window: ScanWindow) -> Vec<ScanReport> {
        let mut reports = Vec::with_capacity(wallets.len());
        for wallet in wallets {
            if self.cancel.is_cancelled() {
                break;
            }
            reports.push(self.scan_wallet(wallet, window).await);
        }
        reports
    }
}
