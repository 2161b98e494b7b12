use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use retry_utils::{retry_with_backoff, RetryClass, RetryPolicy};

use crate::error::TronGridError;
use crate::types::{TronListResponse, TronTransaction, Trc20Transfer};

/// Connection settings for the TronGrid REST API.
#[derive(Debug, Clone)]
pub struct TronGridSettings {
    pub api_key: String,
    pub api_base_url: String,
    pub request_timeout_seconds: u64,
    pub page_limit: u32,
    pub max_retries: u32,
}

impl Default for TronGridSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: "https://api.trongrid.io/v1".to_string(),
            request_timeout_seconds: 20,
            page_limit: 100,
            max_retries: 5,
        }
    }
}

fn classify(error: &TronGridError) -> RetryClass {
    match error {
        TronGridError::RateLimit => RetryClass::RateLimit,
        TronGridError::Http(err) if err.is_timeout() => RetryClass::Timeout,
        TronGridError::Http(_) => RetryClass::Transport,
        TronGridError::Api { .. } => RetryClass::Transport,
        TronGridError::Json(_) | TronGridError::MissingApiKey => RetryClass::Fatal,
    }
}

/// TronGrid account-history client. TRON keeps per-address history on the
/// provider side, so unlike the EVM RPC path there is nothing to
/// reconstruct; the two account endpoints are queried directly.
pub struct TronGridClient {
    http: Client,
    base_url: String,
    api_key: String,
    page_limit: u32,
    policy: RetryPolicy,
}

impl TronGridClient {
    pub fn new(settings: TronGridSettings) -> Result<Self, TronGridError> {
        if settings.api_key.is_empty() {
            return Err(TronGridError::MissingApiKey);
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()?;
        Ok(Self {
            http,
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key,
            page_limit: settings.page_limit,
            policy: RetryPolicy {
                max_attempts: settings.max_retries,
                ..RetryPolicy::default()
            },
        })
    }

    async fn get_list(&self, url: &str) -> Result<Vec<Value>, TronGridError> {
        let response = retry_with_backoff(
            || async {
                let response = self
                    .http
                    .get(url)
                    .query(&[
                        ("limit", self.page_limit.to_string()),
                        ("order_by", "block_timestamp,desc".to_string()),
                    ])
                    .header("TRON-PRO-API-KEY", &self.api_key)
                    .send()
                    .await?;
                if response.status().as_u16() == 429 {
                    return Err(TronGridError::RateLimit);
                }
                if !response.status().is_success() {
                    return Err(TronGridError::Api {
                        message: format!("HTTP {} from {}", response.status(), url),
                    });
                }
                Ok(response.json::<TronListResponse>().await?)
            },
            &self.policy,
            classify,
        )
        .await?;

        if !response.success {
            warn!("⚠️  TronGrid reported success=false for {}", url);
            return Ok(Vec::new());
        }
        Ok(response.into_items())
    }

    /// Account transactions, successful ones only. Entries that do not
    /// deserialize are dropped with a warning.
    pub async fn account_transactions(
        &self,
        address: &str,
    ) -> Result<Vec<TronTransaction>, TronGridError> {
        let url = format!("{}/accounts/{}/transactions", self.base_url, address);
        let items = self.get_list(&url).await?;
        let total = items.len();

        let transactions: Vec<TronTransaction> = items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(tx) => Some(tx),
                Err(err) => {
                    warn!("⚠️  Dropping malformed TRON transaction: {}", err);
                    None
                }
            })
            .filter(TronTransaction::is_success)
            .collect();

        debug!(
            "TronGrid returned {} transaction(s) for {}, {} successful",
            total,
            address,
            transactions.len()
        );
        Ok(transactions)
    }

    /// TRC20 transfers touching the account.
    pub async fn trc20_transfers(&self, address: &str) -> Result<Vec<Trc20Transfer>, TronGridError> {
        let url = format!("{}/accounts/{}/transactions/trc20", self.base_url, address);
        let items = self.get_list(&url).await?;

        let transfers: Vec<Trc20Transfer> = items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(transfer) => Some(transfer),
                Err(err) => {
                    warn!("⚠️  Dropping malformed TRC20 transfer: {}", err);
                    None
                }
            })
            .collect();

        debug!(
            "TronGrid returned {} TRC20 transfer(s) for {}",
            transfers.len(),
            address
        );
        Ok(transfers)
    }
}
