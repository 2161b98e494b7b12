use serde::Deserialize;
use serde_json::Value;

fn default_true() -> bool {
    true
}

fn default_trc20_decimals() -> u32 {
    6
}

/// Envelope shared by the TronGrid list endpoints. TRC20 responses have
/// carried their payload under either `trc20` or `data` across API
/// revisions, so both are accepted.
#[derive(Debug, Deserialize)]
pub struct TronListResponse {
    #[serde(default = "default_true")]
    pub success: bool,

    #[serde(default)]
    pub data: Vec<Value>,

    #[serde(default)]
    pub trc20: Vec<Value>,
}

impl TronListResponse {
    /// The payload list, wherever the provider put it.
    pub fn into_items(self) -> Vec<Value> {
        if !self.trc20.is_empty() {
            self.trc20
        } else {
            self.data
        }
    }
}

/// One account transaction from `/accounts/{address}/transactions`.
#[derive(Debug, Clone, Deserialize)]
pub struct TronTransaction {
    #[serde(rename = "txID")]
    pub tx_id: String,

    #[serde(default)]
    pub ret: Vec<TronRet>,

    pub raw_data: TronRawData,
}

impl TronTransaction {
    /// Execution result of the first (and for transfers, only) contract.
    pub fn is_success(&self) -> bool {
        self.ret
            .first()
            .and_then(|r| r.contract_ret.as_deref())
            .map(|r| r == "SUCCESS")
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TronRet {
    #[serde(rename = "contractRet", default)]
    pub contract_ret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TronRawData {
    /// Transaction timestamp in milliseconds
    #[serde(default)]
    pub timestamp: i64,

    #[serde(default)]
    pub contract: Vec<TronContract>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TronContract {
    #[serde(rename = "type", default)]
    pub contract_type: String,

    #[serde(default)]
    pub parameter: TronParameter,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TronParameter {
    #[serde(default)]
    pub value: TronContractValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TronContractValue {
    /// Transfer amount in sun (1 TRX = 1e6 sun)
    #[serde(default)]
    pub amount: i64,

    #[serde(default)]
    pub owner_address: String,

    #[serde(default)]
    pub to_address: String,
}

/// One TRC20 transfer from `/accounts/{address}/transactions/trc20`.
#[derive(Debug, Clone, Deserialize)]
pub struct Trc20Transfer {
    pub transaction_id: String,

    #[serde(default)]
    pub token_info: TronTokenInfo,

    #[serde(default)]
    pub from: String,

    #[serde(default)]
    pub to: String,

    /// Raw integer amount as a decimal string
    #[serde(default)]
    pub value: String,

    /// Block timestamp in milliseconds
    #[serde(default)]
    pub block_timestamp: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TronTokenInfo {
    #[serde(default)]
    pub symbol: String,

    #[serde(default)]
    pub name: String,

    /// Token contract address (base58)
    #[serde(default)]
    pub address: String,

    #[serde(default = "default_trc20_decimals")]
    pub decimals: u32,
}

impl Default for TronTokenInfo {
    fn default() -> Self {
        Self {
            symbol: String::new(),
            name: String::new(),
            address: String::new(),
            decimals: default_trc20_decimals(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trc20_payload_key_fallback() {
        let with_trc20: TronListResponse =
            serde_json::from_str(r#"{"success": true, "trc20": [{"a": 1}]}"#).unwrap();
        assert_eq!(with_trc20.into_items().len(), 1);

        let with_data: TronListResponse =
            serde_json::from_str(r#"{"success": true, "data": [{"a": 1}, {"b": 2}]}"#).unwrap();
        assert_eq!(with_data.into_items().len(), 2);

        let bare: TronListResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(bare.success);
        assert!(bare.into_items().is_empty());
    }

    #[test]
    fn transaction_success_requires_contract_ret() {
        let tx: TronTransaction = serde_json::from_str(
            r#"{
                "txID": "abc",
                "ret": [{"contractRet": "SUCCESS"}],
                "raw_data": {"timestamp": 1700000000000, "contract": []}
            }"#,
        )
        .unwrap();
        assert!(tx.is_success());

        let reverted: TronTransaction = serde_json::from_str(
            r#"{
                "txID": "abc",
                "ret": [{"contractRet": "REVERT"}],
                "raw_data": {"timestamp": 0, "contract": []}
            }"#,
        )
        .unwrap();
        assert!(!reverted.is_success());

        let missing: TronTransaction = serde_json::from_str(
            r#"{"txID": "abc", "raw_data": {"contract": []}}"#,
        )
        .unwrap();
        assert!(!missing.is_success());
    }

    #[test]
    fn trc20_decimals_default_to_six() {
        let transfer: Trc20Transfer = serde_json::from_str(
            r#"{
                "transaction_id": "abc",
                "token_info": {"symbol": "USDT", "address": "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"},
                "from": "TSender",
                "to": "TReceiver",
                "value": "1000000",
                "block_timestamp": 1700000000000
            }"#,
        )
        .unwrap();
        assert_eq!(transfer.token_info.decimals, 6);
        assert_eq!(transfer.token_info.symbol, "USDT");
    }
}
