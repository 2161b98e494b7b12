//! Incoming-transfer tracking for EVM chains with an Etherscan-compatible
//! explorer. The V2 API serves every supported chain from one base URL,
//! selected per request with a `chainid` parameter, and returns account
//! history as decimal-string transaction lists, so no block-range
//! reconstruction is needed on this path.

use std::str::FromStr;
use std::time::Duration;

use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use retry_utils::{retry_with_backoff, RetryClass, RetryPolicy};
use tracker_core::{chains, merge_transfers, ChainId, ScanWindow, TrackerResult, Transfer};

#[derive(Error, Debug)]
pub enum EtherscanError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Explorer API error: {message}")]
    Api { message: String },

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Explorer API key is missing")]
    MissingApiKey,

    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),
}

/// Connection settings for the explorer API.
#[derive(Debug, Clone)]
pub struct EtherscanSettings {
    pub api_key: String,
    pub api_base_url: String,
    pub request_timeout_seconds: u64,
    /// Pause before each request; free-tier keys are limited to a few
    /// calls per second
    pub rate_limit_delay_ms: u64,
    pub max_retries: u32,
}

impl Default for EtherscanSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: "https://api.etherscan.io/v2/api".to_string(),
            request_timeout_seconds: 10,
            rate_limit_delay_ms: 1_000,
            max_retries: 5,
        }
    }
}

/// Top-level explorer response. `result` changes shape between a plain
/// list and a keyed object depending on endpoint revision, so it stays a
/// raw value until [`extract_result_list`] untangles it.
#[derive(Debug, Deserialize)]
struct EtherscanEnvelope {
    #[serde(default)]
    result: Option<Value>,
}

/// One account-history entry. Native (`txlist`) and token (`tokentx`)
/// entries share the shape; the token fields are simply absent on native
/// entries. All numeric fields are decimal strings.
#[derive(Debug, Clone, Deserialize)]
pub struct EtherscanTxEntry {
    #[serde(default)]
    pub hash: String,

    #[serde(default)]
    pub from: String,

    #[serde(default)]
    pub to: String,

    #[serde(default)]
    pub value: String,

    #[serde(rename = "timeStamp", default)]
    pub time_stamp: String,

    #[serde(rename = "tokenSymbol", default)]
    pub token_symbol: Option<String>,

    #[serde(rename = "tokenDecimal", default)]
    pub token_decimal: Option<String>,

    #[serde(rename = "contractAddress", default)]
    pub contract_address: Option<String>,
}

/// Untangle the V2 `result` shapes: a list, or an object carrying the
/// list under `erc20Transfers`, `transactions`, or some other key.
/// Unknown shapes yield `None` and the caller logs them.
fn extract_result_list(result: Value) -> Option<Vec<Value>> {
    match result {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => {
            for key in ["erc20Transfers", "transactions"] {
                if let Some(Value::Array(items)) = map.remove(key) {
                    return Some(items);
                }
            }
            map.into_iter().find_map(|(_, value)| match value {
                Value::Array(items) => Some(items),
                _ => None,
            })
        }
        _ => None,
    }
}

fn classify(error: &EtherscanError) -> RetryClass {
    match error {
        EtherscanError::RateLimit => RetryClass::RateLimit,
        EtherscanError::Http(err) if err.is_timeout() => RetryClass::Timeout,
        EtherscanError::Http(_) => RetryClass::Transport,
        EtherscanError::Api { .. } => RetryClass::Transport,
        EtherscanError::Json(_)
        | EtherscanError::MissingApiKey
        | EtherscanError::UnsupportedNetwork(_) => RetryClass::Fatal,
    }
}

/// Explorer REST client, shared by every explorer-routed network.
pub struct EtherscanClient {
    http: Client,
    settings: EtherscanSettings,
    policy: RetryPolicy,
}

impl EtherscanClient {
    pub fn new(settings: EtherscanSettings) -> Result<Self, EtherscanError> {
        if settings.api_key.is_empty() {
            return Err(EtherscanError::MissingApiKey);
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

    async fn account_query(
        &self,
        chain_id: u64,
        action: &str,
        address: &str,
    ) -> Result<Vec<EtherscanTxEntry>, EtherscanError> {
        // Pacing delay keeps a multi-chain scan under the shared key's
        // request budget
        tokio::time::sleep(Duration::from_millis(self.settings.rate_limit_delay_ms)).await;

        let envelope = retry_with_backoff(
            || async {
                let response = self
                    .http
                    .get(&self.settings.api_base_url)
                    .query(&[
                        ("module", "account"),
                        ("action", action),
                        ("address", address),
                        ("sort", "desc"),
                        ("chainid", &chain_id.to_string()),
                        ("apikey", &self.settings.api_key),
                    ])
                    .send()
                    .await?;
                if response.status().as_u16() == 429 {
                    return Err(EtherscanError::RateLimit);
                }
                if !response.status().is_success() {
                    return Err(EtherscanError::Api {
                        message: format!("HTTP {} for {} chainid={}", response.status(), action, chain_id),
                    });
                }
                Ok(response.json::<EtherscanEnvelope>().await?)
            },
            &self.policy,
            classify,
        )
        .await?;

        let result = match envelope.result {
            Some(result) => result,
            None => {
                warn!("⚠️  Explorer returned no result for {} chainid={}", action, chain_id);
                return Ok(Vec::new());
            }
        };
        let items = match extract_result_list(result) {
            Some(items) => items,
            None => {
                warn!(
                    "⚠️  Unrecognized explorer result shape for {} chainid={}",
                    action, chain_id
                );
                return Ok(Vec::new());
            }
        };

        let entries: Vec<EtherscanTxEntry> = items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!("⚠️  Dropping malformed explorer entry: {}", err);
                    None
                }
            })
            .collect();
        debug!(
            "Explorer {} chainid={} returned {} entries",
            action,
            chain_id,
            entries.len()
        );
        Ok(entries)
    }

    /// Native transaction history (`txlist`).
    pub async fn native_transactions(
        &self,
        chain_id: u64,
        address: &str,
    ) -> Result<Vec<EtherscanTxEntry>, EtherscanError> {
        self.account_query(chain_id, "txlist", address).await
    }

    /// Token transfer history (`tokentx`).
    pub async fn token_transactions(
        &self,
        chain_id: u64,
        address: &str,
    ) -> Result<Vec<EtherscanTxEntry>, EtherscanError> {
        self.account_query(chain_id, "tokentx", address).await
    }
}

/// Converts explorer list entries into canonical transfers for one
/// queried wallet.
pub struct EtherscanNormalizer {
    chain: ChainId,
    address: String,
    dust_enabled: bool,
}

impl EtherscanNormalizer {
    pub fn new(chain: ChainId, address: &str, dust_enabled: bool) -> Self {
        Self {
            chain,
            address: address.to_lowercase(),
            dust_enabled,
        }
    }

    /// Native entries divide by 10^18 and take the chain's native symbol;
    /// token entries divide by the explorer-declared decimals and carry
    /// the explorer-declared symbol.
    pub fn transfers(&self, entries: &[EtherscanTxEntry], is_native: bool) -> Vec<Transfer> {
        let mut transfers = Vec::new();
        for entry in entries {
            if !entry.to.eq_ignore_ascii_case(&self.address) {
                continue;
            }
            let decimals = if is_native {
                18
            } else {
                entry
                    .token_decimal
                    .as_deref()
                    .and_then(|d| d.parse::<u32>().ok())
                    .unwrap_or(18)
            };
            let amount = match scale_value(&entry.value, decimals) {
                Some(amount) => amount,
                None => {
                    warn!(
                        "⚠️  Dropping explorer entry {}: unparseable value {:?}",
                        entry.hash, entry.value
                    );
                    continue;
                }
            };
            if amount <= Decimal::ZERO {
                continue;
            }
            let symbol = if is_native {
                chains::native_symbol(self.chain).to_string()
            } else {
                self.token_symbol(entry)
            };
            if !self.passes_dust_filter(amount, &symbol) {
                continue;
            }
            let timestamp = entry.time_stamp.parse::<i64>().unwrap_or(0);
            transfers.push(Transfer {
                hash: entry.hash.clone(),
                chain: self.chain,
                from: entry.from.to_lowercase(),
                to: self.address.clone(),
                amount,
                token_symbol: symbol,
                is_native,
                timestamp,
            });
        }
        transfers
    }

    fn token_symbol(&self, entry: &EtherscanTxEntry) -> String {
        if let Some(symbol) = entry.token_symbol.as_deref() {
            let symbol = symbol.trim();
            if !symbol.is_empty() {
                return symbol.to_string();
            }
        }
        let contract = entry.contract_address.as_deref().unwrap_or_default();
        if let Some(symbol) = chains::known_token_symbol(self.chain, contract) {
            return symbol.to_string();
        }
        chains::truncate_address(contract)
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

fn scale_value(raw: &str, decimals: u32) -> Option<Decimal> {
    let value = Decimal::from_str(raw.trim()).ok()?;
    let divisor = Decimal::from(10u64.checked_pow(decimals)?);
    value.checked_div(divisor)
}

/// Transfer tracker for one explorer-routed EVM network.
pub struct EtherscanTracker {
    client: EtherscanClient,
    chain: ChainId,
    network: String,
    dust_enabled: bool,
}

impl EtherscanTracker {
    pub fn new(
        network: &str,
        settings: EtherscanSettings,
        dust_enabled: bool,
    ) -> Result<Self, EtherscanError> {
        let chain = chains::chain_id_for_network(network)
            .filter(|chain| matches!(chain, ChainId::Evm(_)))
            .ok_or_else(|| EtherscanError::UnsupportedNetwork(network.to_string()))?;
        let client = EtherscanClient::new(settings)?;
        info!("✅ Explorer tracker initialized for {} ({})", network, chain);
        Ok(Self {
            client,
            chain,
            network: network.to_string(),
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
    /// inclusive unix-seconds window. Failures on one side degrade to an
    /// empty list for that side only.
    pub async fn get_transactions(
        &self,
        address: &str,
        start_time: i64,
        end_time: i64,
    ) -> Result<TrackerResult, EtherscanError> {
        let window = ScanWindow::new(start_time, end_time);
        let chain_id = match self.chain {
            ChainId::Evm(id) => id,
            ChainId::Tron => unreachable!("explorer trackers are EVM-only by construction"),
        };
        info!(
            "🔍 Scanning {} via explorer for transfers to {} in window {}..{}",
            self.network, address, start_time, end_time
        );

        let normalizer = EtherscanNormalizer::new(self.chain, address, self.dust_enabled);

        let native = match self.client.native_transactions(chain_id, address).await {
            Ok(entries) => normalizer.transfers(&entries, true),
            Err(err) => {
                warn!("⚠️  Explorer txlist failed for {}: {}", self.network, err);
                Vec::new()
            }
        };
        let tokens = match self.client.token_transactions(chain_id, address).await {
            Ok(entries) => normalizer.transfers(&entries, false),
            Err(err) => {
                warn!("⚠️  Explorer tokentx failed for {}: {}", self.network, err);
                Vec::new()
            }
        };

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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const WALLET: &str = "0x1234567890abcdef1234567890abcdef12345678";

    fn keyed_settings() -> EtherscanSettings {
        EtherscanSettings {
            api_key: "test-key".to_string(),
            ..EtherscanSettings::default()
        }
    }

    fn native_entry(hash: &str, to: &str, value: &str, ts: &str) -> EtherscanTxEntry {
        EtherscanTxEntry {
            hash: hash.to_string(),
            from: "0x00000000000000000000000000000000000000aa".to_string(),
            to: to.to_string(),
            value: value.to_string(),
            time_stamp: ts.to_string(),
            token_symbol: None,
            token_decimal: None,
            contract_address: None,
        }
    }

    fn token_entry(hash: &str, value: &str, symbol: &str, decimals: &str) -> EtherscanTxEntry {
        EtherscanTxEntry {
            hash: hash.to_string(),
            from: "0x00000000000000000000000000000000000000aa".to_string(),
            to: WALLET.to_string(),
            value: value.to_string(),
            time_stamp: "1700000000".to_string(),
            token_symbol: Some(symbol.to_string()),
            token_decimal: Some(decimals.to_string()),
            contract_address: Some("0xdac17f958d2ee523a2206206994597c13d831ec7".to_string()),
        }
    }

    #[test]
    fn construction_requires_key_and_known_evm_network() {
        assert!(matches!(
            EtherscanTracker::new("eth", EtherscanSettings::default(), true),
            Err(EtherscanError::MissingApiKey)
        ));
        assert!(matches!(
            EtherscanTracker::new("tron", keyed_settings(), true),
            Err(EtherscanError::UnsupportedNetwork(_))
        ));
        let tracker = EtherscanTracker::new("eth", keyed_settings(), true).unwrap();
        assert_eq!(tracker.chain(), ChainId::Evm(1));
    }

    #[test]
    fn result_shape_tolerance() {
        let list = json!([{"hash": "0xa"}]);
        assert_eq!(extract_result_list(list).unwrap().len(), 1);

        let wrapped_tokens = json!({"erc20Transfers": [{"hash": "0xa"}, {"hash": "0xb"}]});
        assert_eq!(extract_result_list(wrapped_tokens).unwrap().len(), 2);

        let wrapped_native = json!({"transactions": [{"hash": "0xa"}]});
        assert_eq!(extract_result_list(wrapped_native).unwrap().len(), 1);

        let other_key = json!({"status": "1", "items": [{"hash": "0xa"}]});
        assert_eq!(extract_result_list(other_key).unwrap().len(), 1);

        assert!(extract_result_list(json!("Max rate limit reached")).is_none());
        assert!(extract_result_list(json!({"status": "0"})).is_none());
    }

    #[test]
    fn native_entries_divide_by_ten_to_the_eighteenth() {
        let normalizer = EtherscanNormalizer::new(ChainId::Evm(1), WALLET, true);
        // 2.5 ETH
        let transfers = normalizer.transfers(
            &[native_entry("0xa", WALLET, "2500000000000000000", "1700000000")],
            true,
        );

        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].amount, Decimal::new(25, 1));
        assert_eq!(transfers[0].token_symbol, "ETH");
        assert!(transfers[0].is_native);
        assert_eq!(transfers[0].timestamp, 1_700_000_000);
    }

    #[test]
    fn token_entries_use_declared_decimals_and_symbol() {
        let normalizer = EtherscanNormalizer::new(ChainId::Evm(1), WALLET, true);
        let transfers =
            normalizer.transfers(&[token_entry("0xa", "2500000", "USDT", "6")], false);

        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].amount, Decimal::new(25, 1));
        assert_eq!(transfers[0].token_symbol, "USDT");
        assert!(!transfers[0].is_native);
    }

    #[test]
    fn blank_symbol_falls_back_to_token_table() {
        let normalizer = EtherscanNormalizer::new(ChainId::Evm(1), WALLET, false);
        // contract in the fixture is mainnet USDT
        let transfers = normalizer.transfers(&[token_entry("0xa", "2500000", "", "6")], false);
        assert_eq!(transfers[0].token_symbol, "USDT");
    }

    #[test]
    fn outgoing_and_zero_value_entries_are_skipped() {
        let normalizer = EtherscanNormalizer::new(ChainId::Evm(1), WALLET, false);
        let transfers = normalizer.transfers(
            &[
                native_entry("0xa", "0x00000000000000000000000000000000000000bb", "1000", "1"),
                native_entry("0xb", WALLET, "0", "1"),
            ],
            true,
        );
        assert!(transfers.is_empty());
    }

    #[test]
    fn dust_entries_are_filtered_when_enabled() {
        let normalizer = EtherscanNormalizer::new(ChainId::Evm(1), WALLET, true);
        // 0.0005 ETH, under the 0.001 threshold
        let entries = [native_entry("0xa", WALLET, "500000000000000", "1700000000")];
        assert!(normalizer.transfers(&entries, true).is_empty());

        let relaxed = EtherscanNormalizer::new(ChainId::Evm(1), WALLET, false);
        assert_eq!(relaxed.transfers(&entries, true).len(), 1);
    }

    #[test]
    fn entries_deserialize_from_wire_json() {
        let json = r#"{
            "blockNumber": "18000000",
            "timeStamp": "1700000000",
            "hash": "0xdeadbeef",
            "from": "0x00000000000000000000000000000000000000aa",
            "to": "0x1234567890abcdef1234567890abcdef12345678",
            "value": "1000000",
            "tokenSymbol": "USDT",
            "tokenDecimal": "6",
            "contractAddress": "0xdac17f958d2ee523a2206206994597c13d831ec7",
            "gas": "21000",
            "confirmations": "120"
        }"#;

        let entry: EtherscanTxEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.hash, "0xdeadbeef");
        assert_eq!(entry.token_decimal.as_deref(), Some("6"));
        assert_eq!(entry.time_stamp, "1700000000");
    }
}
