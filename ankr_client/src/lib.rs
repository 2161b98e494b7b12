//! Incoming-transfer tracking through the Ankr multichain gateway.
//!
//! `ankr_getTransactionsByAddress` serves indexed per-address history for
//! a few dozen EVM chains from per-chain endpoints, which makes this
//! pipeline the catch-all for networks without a dedicated RPC pool or
//! explorer key. The gateway's timestamp hints are advisory, so results
//! are always re-filtered client-side.

use std::str::FromStr;
use std::time::Duration;

use num_bigint::BigUint;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use retry_utils::{retry_with_backoff, RetryClass, RetryPolicy};
use tracker_core::evm_log::{topic_to_address, TRANSFER_EVENT_TOPIC};
use tracker_core::{chains, merge_transfers, ChainId, ScanWindow, TrackerResult, Transfer};

#[derive(Error, Debug)]
pub enum AnkrError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Gateway RPC error: {message}")]
    Rpc { message: String },

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Gateway API key is missing")]
    MissingApiKey,
}

/// Connection settings for the gateway.
#[derive(Debug, Clone)]
pub struct AnkrSettings {
    pub api_key: String,
    pub api_base_url: String,
    pub request_timeout_seconds: u64,
    pub page_size: u32,
    pub max_retries: u32,
}

impl Default for AnkrSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: "https://rpc.ankr.com".to_string(),
            request_timeout_seconds: 30,
            page_size: 100,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnkrEnvelope {
    #[serde(default)]
    result: Option<AnkrResult>,
    #[serde(default)]
    error: Option<AnkrErrorObject>,
}

#[derive(Debug, Deserialize)]
struct AnkrErrorObject {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct AnkrResult {
    #[serde(default)]
    transactions: Vec<AnkrTransaction>,
}

/// One gateway transaction with embedded receipt logs. Quantities arrive
/// as hex or decimal strings depending on the chain's indexer.
#[derive(Debug, Clone, Deserialize)]
pub struct AnkrTransaction {
    #[serde(default)]
    pub hash: String,

    #[serde(default)]
    pub from: String,

    #[serde(default)]
    pub to: Option<String>,

    #[serde(default)]
    pub value: Option<String>,

    #[serde(default)]
    pub timestamp: Option<Value>,

    #[serde(default)]
    pub logs: Vec<AnkrLog>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnkrLog {
    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub topics: Vec<String>,

    #[serde(default)]
    pub data: String,
}

/// Parse a quantity that may be 0x-hex or plain decimal.
fn parse_quantity(raw: &str) -> Option<BigUint> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix("0x") {
        if hex.is_empty() {
            return Some(BigUint::from(0u8));
        }
        return BigUint::parse_bytes(hex.as_bytes(), 16);
    }
    BigUint::parse_bytes(raw.as_bytes(), 10)
}

fn scale_quantity(raw: &BigUint, decimals: u32) -> Option<Decimal> {
    let amount = Decimal::from_str(&raw.to_string()).ok()?;
    let divisor = Decimal::from(10u64.checked_pow(decimals)?);
    amount.checked_div(divisor)
}

/// Timestamps arrive as a JSON number on some chains and a hex string on
/// others.
fn parse_timestamp(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => {
            let s = s.trim();
            if let Some(hex) = s.strip_prefix("0x") {
                i64::from_str_radix(hex, 16).unwrap_or(0)
            } else {
                s.parse().unwrap_or(0)
            }
        }
        _ => 0,
    }
}

fn classify(error: &AnkrError) -> RetryClass {
    match error {
        AnkrError::RateLimit => RetryClass::RateLimit,
        AnkrError::Http(err) if err.is_timeout() => RetryClass::Timeout,
        AnkrError::Http(_) => RetryClass::Transport,
        AnkrError::Rpc { .. } => RetryClass::Transport,
        AnkrError::Json(_) | AnkrError::MissingApiKey => RetryClass::Fatal,
    }
}

/// Gateway client. Each chain has its own endpoint
/// (`{base}/{slug}/{key}`), all speaking the same RPC dialect.
pub struct AnkrClient {
    http: Client,
    settings: AnkrSettings,
    policy: RetryPolicy,
}

impl AnkrClient {
    pub fn new(settings: AnkrSettings) -> Result<Self, AnkrError> {
        if settings.api_key.is_empty() {
            return Err(AnkrError::MissingApiKey);
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()?;
        let policy = RetryPolicy {
            max_attempts: settings.max_retries,
            ..RetryPolicy::default()
        };
        Ok(Self {
            http,
            settings,
            policy,
        })
    }

    fn endpoint_for(&self, slug: &str) -> String {
        format!(
            "{}/{}/{}",
            self.settings.api_base_url.trim_end_matches('/'),
            slug,
            self.settings.api_key
        )
    }

    /// Address history on one chain, hinted to the window and re-filtered
    /// client-side since the hints are not honored everywhere.
    pub async fn transactions_by_address(
        &self,
        slug: &str,
        address: &str,
        window: ScanWindow,
    ) -> Result<Vec<AnkrTransaction>, AnkrError> {
        let endpoint = self.endpoint_for(slug);
        let payload = json!({
            "jsonrpc": "2.0",
            "method": "ankr_getTransactionsByAddress",
            "params": [{
                "address": address.to_lowercase(),
                "chain": slug,
                "fromTimestamp": window.start_ts,
                "toTimestamp": window.end_ts,
                "pageSize": self.settings.page_size,
            }],
            "id": 1,
        });

        let envelope = retry_with_backoff(
            || async {
                let response = self.http.post(&endpoint).json(&payload).send().await?;
                if response.status().as_u16() == 429 {
                    return Err(AnkrError::RateLimit);
                }
                if !response.status().is_success() {
                    return Err(AnkrError::Rpc {
                        message: format!("HTTP {} from gateway chain {}", response.status(), slug),
                    });
                }
                Ok(response.json::<AnkrEnvelope>().await?)
            },
            &self.policy,
            classify,
        )
        .await?;

        if let Some(error) = envelope.error {
            return Err(AnkrError::Rpc {
                message: format!("{} (code {})", error.message, error.code),
            });
        }
        let transactions = envelope.result.unwrap_or_default().transactions;
        let total = transactions.len();
        let filtered: Vec<AnkrTransaction> = transactions
            .into_iter()
            .filter(|tx| window.contains(parse_timestamp(tx.timestamp.as_ref())))
            .collect();
        debug!(
            "Gateway {} returned {} transaction(s), {} inside window",
            slug,
            total,
            filtered.len()
        );
        Ok(filtered)
    }
}

/// Splits gateway transactions into canonical native and token transfers
/// for one queried wallet. Native transfers come from the transaction
/// value; token transfers from Transfer events in the receipt logs.
pub struct AnkrNormalizer {
    chain: ChainId,
    address: String,
    dust_enabled: bool,
}

impl AnkrNormalizer {
    pub fn new(chain: ChainId, address: &str, dust_enabled: bool) -> Self {
        Self {
            chain,
            address: address.to_lowercase(),
            dust_enabled,
        }
    }

    pub fn transfers(&self, transactions: &[AnkrTransaction]) -> (Vec<Transfer>, Vec<Transfer>) {
        let native_symbol = chains::native_symbol(self.chain);
        let mut native = Vec::new();
        let mut tokens = Vec::new();

        for tx in transactions {
            let timestamp = parse_timestamp(tx.timestamp.as_ref());

            if let Some(to) = tx.to.as_deref() {
                if to.eq_ignore_ascii_case(&self.address) {
                    if let Some(transfer) = self.native_transfer(tx, native_symbol, timestamp) {
                        native.push(transfer);
                    }
                }
            }

            for log in &tx.logs {
                if let Some(transfer) = self.token_transfer(tx, log, timestamp) {
                    tokens.push(transfer);
                }
            }
        }
        (native, tokens)
    }

    fn native_transfer(
        &self,
        tx: &AnkrTransaction,
        symbol: &str,
        timestamp: i64,
    ) -> Option<Transfer> {
        let raw = tx.value.as_deref()?;
        let quantity = match parse_quantity(raw) {
            Some(quantity) => quantity,
            None => {
                warn!(
                    "⚠️  Dropping gateway transaction {}: unparseable value {:?}",
                    tx.hash, raw
                );
                return None;
            }
        };
        let amount = scale_quantity(&quantity, 18)?;
        if amount <= Decimal::ZERO || !self.passes_dust_filter(amount, symbol) {
            return None;
        }
        Some(Transfer {
            hash: tx.hash.clone(),
            chain: self.chain,
            from: tx.from.to_lowercase(),
            to: self.address.clone(),
            amount,
            token_symbol: symbol.to_string(),
            is_native: true,
            timestamp,
        })
    }

    fn token_transfer(
        &self,
        tx: &AnkrTransaction,
        log: &AnkrLog,
        timestamp: i64,
    ) -> Option<Transfer> {
        if log.topics.len() < 3 || log.topics[0] != TRANSFER_EVENT_TOPIC {
            return None;
        }
        let to = topic_to_address(&log.topics[2])?;
        if !to.eq_ignore_ascii_case(&self.address) {
            return None;
        }
        let from = topic_to_address(&log.topics[1]).unwrap_or_default();
        let quantity = match parse_quantity(&log.data) {
            Some(quantity) => quantity,
            None => {
                warn!(
                    "⚠️  Dropping token log in {}: undecodable amount data",
                    tx.hash
                );
                return None;
            }
        };
        let contract = log.address.to_lowercase();
        let decimals = chains::known_token_decimals(self.chain, &contract).unwrap_or(18);
        let amount = scale_quantity(&quantity, decimals)?;
        if amount <= Decimal::ZERO {
            return None;
        }
        let symbol = chains::known_token_symbol(self.chain, &contract)
            .map(str::to_string)
            .unwrap_or_else(|| chains::truncate_address(&contract));
        if !self.passes_dust_filter(amount, &symbol) {
            return None;
        }
        Some(Transfer {
            hash: tx.hash.clone(),
            chain: self.chain,
            from,
            to: self.address.clone(),
            amount,
            token_symbol: symbol,
            is_native: false,
            timestamp,
        })
    }

    fn passes_dust_filter(&self, amount: Decimal, symbol: &str) -> bool {
        if !self.dust_enabled {
            return true;
        }
        let threshold = chains::min_amount_threshold(symbol);
        if amount <= threshold {
            debug!("📭 Skipping dust transfer of {} {}", amount, symbol);
            return false;
        }
        true
    }
}

/// Transfer tracker for one gateway-routed EVM network. Networks without
/// a registry entry use their configured name as the chain slug and
/// default to mainnet chain identity, matching the gateway's generic
/// endpoint scheme.
pub struct AnkrTracker {
    client: AnkrClient,
    chain: ChainId,
    network: String,
    slug: String,
    dust_enabled: bool,
}

impl AnkrTracker {
    pub fn new(
        network: &str,
        settings: AnkrSettings,
        dust_enabled: bool,
    ) -> Result<Self, AnkrError> {
        let chain = chains::chain_id_for_network(network).unwrap_or(ChainId::Evm(1));
        let slug = chains::gateway_slug(chain)
            .map(str::to_string)
            .unwrap_or_else(|| network.to_lowercase());
        let client = AnkrClient::new(settings)?;
        info!(
            "✅ Gateway tracker initialized for {} (chain slug {})",
            network, slug
        );
        Ok(Self {
            client,
            chain,
            network: network.to_string(),
            slug,
            dust_enabled,
        })
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn chain(&self) -> ChainId {
        self.chain
    }

    /// Incoming native and token transfers to `address` within the
    /// inclusive unix-seconds window.
    pub async fn get_transactions(
        &self,
        address: &str,
        start_time: i64,
        end_time: i64,
    ) -> Result<TrackerResult, AnkrError> {
        let window = ScanWindow::new(start_time, end_time);
        info!(
            "🔍 Scanning {} via gateway for transfers to {} in window {}..{}",
            self.network, address, start_time, end_time
        );

        let transactions = self
            .client
            .transactions_by_address(&self.slug, address, window)
            .await?;
        let normalizer = AnkrNormalizer::new(self.chain, address, self.dust_enabled);
        let (native, tokens) = normalizer.transfers(&transactions);

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
