//! Incoming-transfer tracking for TRON via the TronGrid REST API.
//!
//! TronGrid serves per-address history directly, so this pipeline is two
//! account queries (native transactions and TRC20 transfers) followed by
//! normalization and the shared dedup/window merge.

pub mod client;
pub mod error;
pub mod parser;
pub mod types;

pub use client::{TronGridClient, TronGridSettings};
pub use error::TronGridError;
pub use parser::TronNormalizer;
pub use types::*;

use tracing::{info, warn};

use tracker_core::{merge_transfers, ScanWindow, TrackerResult};

/// Transfer tracker for the TRON network.
pub struct TronTracker {
    client: TronGridClient,
    dust_enabled: bool,
}

impl TronTracker {
    /// Fails fast when no API key is configured; a keyless TronGrid
    /// client would be rejected on every request anyway.
    pub fn new(settings: TronGridSettings, dust_enabled: bool) -> Result<Self, TronGridError> {
        let client = TronGridClient::new(settings)?;
        info!("✅ TRON tracker initialized");
        Ok(Self {
            client,
            dust_enabled,
        })
    }

    pub fn network(&self) -> &'static str {
        "tron"
    }

    /// Incoming TRX and TRC20 transfers to `address` within the inclusive
    /// unix-seconds window. The two sides are fetched independently; a
    /// failure on one side degrades to an empty list for that side only.
    pub async fn get_transactions(
        &self,
        address: &str,
        start_time: i64,
        end_time: i64,
    ) -> Result<TrackerResult, TronGridError> {
        let window = ScanWindow::new(start_time, end_time);
        info!(
            "🔍 Scanning tron for transfers to {} in window {}..{}",
            address, start_time, end_time
        );

        let normalizer = TronNormalizer::new(address, self.dust_enabled);

        let native = match self.client.account_transactions(address).await {
            Ok(transactions) => normalizer.native_transfers(&transactions),
            Err(err) => {
                warn!("⚠️  TRON native transaction fetch failed: {}", err);
                Vec::new()
            }
        };
        let tokens = match self.client.trc20_transfers(address).await {
            Ok(transfers) => normalizer.token_transfers(&transfers),
            Err(err) => {
                warn!("⚠️  TRC20 transfer fetch failed: {}", err);
                Vec::new()
            }
        };

        let result = TrackerResult {
            native: merge_transfers(native, window),
            tokens: merge_transfers(tokens, window),
            network: "tron".to_string(),
        };
        info!(
            "📊 tron scan complete: {} native, {} token transfer(s)",
            result.native.len(),
            result.tokens.len()
        );
        Ok(result)
    }
}
