pub mod aggregate;
pub mod chains;
pub mod evm_log;
pub mod window;

// Re-export the merge helpers most callers want
pub use aggregate::{merge_results, merge_transfers, sum_by_symbol};
pub use window::{current_report_day, previous_report_day, relative_window};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Window parsing error: {0}")]
    WindowParse(String),
    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, TrackerError>;

/// Chain identity: a numeric EVM chain id, or the TRON sentinel for the
/// one supported non-EVM network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ChainId {
    Evm(u64),
    Tron,
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainId::Evm(id) => write!(f, "{}", id),
            ChainId::Tron => write!(f, "tron"),
        }
    }
}

impl From<ChainId> for String {
    fn from(chain: ChainId) -> Self {
        chain.to_string()
    }
}

impl TryFrom<String> for ChainId {
    type Error = TrackerError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl std::str::FromStr for ChainId {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("tron") {
            return Ok(ChainId::Tron);
        }
        s.parse::<u64>()
            .map(ChainId::Evm)
            .map_err(|_| TrackerError::UnsupportedNetwork(s.to_string()))
    }
}

/// A single reconstructed incoming transfer, normalized across chains.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transfer {
    /// Transaction hash (or provider-supplied transaction id)
    pub hash: String,

    /// Chain the transfer was observed on
    pub chain: ChainId,

    /// Sender address
    pub from: String,

    /// Destination address; always the queried wallet, lowercased
    pub to: String,

    /// Human-denominated amount after decimal conversion
    pub amount: Decimal,

    /// Resolved token symbol (the chain's native symbol for coin transfers)
    pub token_symbol: String,

    /// Whether this is a native-coin transfer rather than a token transfer
    pub is_native: bool,

    /// Unix timestamp (seconds) of the containing block
    pub timestamp: i64,
}

/// Per-chain scan output: native and token transfers kept separate, plus
/// the network identifier the scan ran against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerResult {
    pub native: Vec<Transfer>,
    pub tokens: Vec<Transfer>,
    pub network: String,
}

impl TrackerResult {
    pub fn empty(network: &str) -> Self {
        Self {
            native: Vec::new(),
            tokens: Vec::new(),
            network: network.to_string(),
        }
    }

    pub fn total_count(&self) -> usize {
        self.native.len() + self.tokens.len()
    }
}

/// Inclusive unix-seconds window a scan covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWindow {
    pub start_ts: i64,
    pub end_ts: i64,
}

impl ScanWindow {
    pub fn new(start_ts: i64, end_ts: i64) -> Self {
        Self { start_ts, end_ts }
    }

    pub fn contains(&self, ts: i64) -> bool {
        ts >= self.start_ts && ts <= self.end_ts
    }
}

/// Inclusive block-number range for an on-chain scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub start_block: u64,
    pub end_block: u64,
}

impl BlockRange {
    pub fn new(start_block: u64, end_block: u64) -> Self {
        Self {
            start_block,
            end_block,
        }
    }

    /// End before start; callers treat such a range as an empty scan.
    pub fn is_degenerate(&self) -> bool {
        self.end_block < self.start_block
    }

    pub fn span(&self) -> u64 {
        self.end_block.saturating_sub(self.start_block)
    }

    /// Clamp the range to at most `max_span` blocks by moving the start
    /// forward. Recent blocks are kept in preference to old ones.
    pub fn clamp_to_span(self, max_span: u64) -> Self {
        if self.is_degenerate() || self.span() <= max_span {
            return self;
        }
        Self {
            start_block: self.end_block.saturating_sub(max_span),
            end_block: self.end_block,
        }
    }
}
