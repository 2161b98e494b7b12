use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use tracker_core::evm_log::{pad_topic_address, topic_to_address, TRANSFER_EVENT_TOPIC};

/// JSON-RPC request envelope.
#[derive(Debug, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

/// JSON-RPC response envelope. Providers disagree on which fields they
/// bother to send, so everything is optional.
#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorObject {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Classified result of one executed RPC call, after retries and endpoint
/// rotation have run their course.
#[derive(Debug, Clone)]
pub enum RpcOutcome {
    /// Call succeeded with a payload
    Success(Value),
    /// Call succeeded but there is nothing there: null result, empty list,
    /// or a benign provider error ("filter not found", result set too large)
    Empty,
    /// A single attempt failed in a retryable way. Internal bookkeeping;
    /// the executor resolves these before returning
    Recoverable(String),
    /// The call cannot succeed right now (attempts or endpoints exhausted)
    Fatal(String),
}

/// Block header subset used for time anchoring.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlockHeader {
    pub number: String,
    pub timestamp: String,
}

/// Full block with transaction objects (eth_getBlockByNumber with
/// full_transactions = true).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
    pub number: String,
    pub timestamp: String,
    #[serde(default)]
    pub transactions: Vec<RpcTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    pub hash: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub block_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
    pub transaction_hash: String,
    #[serde(default)]
    pub block_number: Option<String>,
}

/// Raw incoming-transfer candidate, prior to normalization. Timestamps are
/// resolved in a separate pass because log queries do not carry them.
#[derive(Debug, Clone)]
pub enum RawTransferCandidate {
    Native {
        hash: String,
        from: String,
        to: String,
        value_hex: String,
        block_number: Option<u64>,
        timestamp: Option<i64>,
    },
    TokenLog {
        tx_hash: String,
        contract: String,
        topics: Vec<String>,
        data: String,
        block_number: Option<u64>,
        timestamp: Option<i64>,
    },
}

impl RawTransferCandidate {
    pub fn hash(&self) -> &str {
        match self {
            RawTransferCandidate::Native { hash, .. } => hash,
            RawTransferCandidate::TokenLog { tx_hash, .. } => tx_hash,
        }
    }

    pub fn block_number(&self) -> Option<u64> {
        match self {
            RawTransferCandidate::Native { block_number, .. } => *block_number,
            RawTransferCandidate::TokenLog { block_number, .. } => *block_number,
        }
    }

    pub fn timestamp(&self) -> Option<i64> {
        match self {
            RawTransferCandidate::Native { timestamp, .. } => *timestamp,
            RawTransferCandidate::TokenLog { timestamp, .. } => *timestamp,
        }
    }

    pub fn set_timestamp(&mut self, ts: i64) {
        match self {
            RawTransferCandidate::Native { timestamp, .. } => *timestamp = Some(ts),
            RawTransferCandidate::TokenLog { timestamp, .. } => *timestamp = Some(ts),
        }
    }

    pub fn set_block_number(&mut self, number: u64) {
        match self {
            RawTransferCandidate::Native { block_number, .. } => *block_number = Some(number),
            RawTransferCandidate::TokenLog { block_number, .. } => *block_number = Some(number),
        }
    }
}

/// Parse a 0x-prefixed hex quantity into u64.
pub fn parse_hex_u64(value: &str) -> Option<u64> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16).ok()
}

/// Parse a 0x-prefixed hex quantity into i64 (block timestamps).
pub fn parse_hex_i64(value: &str) -> Option<i64> {
    i64::from_str_radix(value.trim_start_matches("0x"), 16).ok()
}

/// Block number rendered the way JSON-RPC wants it.
pub fn to_hex_block(number: u64) -> String {
    format!("0x{:x}", number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_quantities_parse() {
        assert_eq!(parse_hex_u64("0x10"), Some(16));
        assert_eq!(parse_hex_u64("0x0"), Some(0));
        assert_eq!(parse_hex_u64("0xzz"), None);
        assert_eq!(parse_hex_i64("0x65a1c2b0"), Some(0x65a1c2b0));
    }

    #[test]
    fn rpc_response_tolerates_missing_fields() {
        let response: RpcResponse = serde_json::from_str(r#"{"result": "0x10"}"#).unwrap();
        assert!(response.error.is_none());
        assert_eq!(response.result, Some(Value::String("0x10".to_string())));

        let response: RpcResponse =
            serde_json::from_str(r#"{"error": {"message": "filter not found"}}"#).unwrap();
        let error = response.error.unwrap();
        assert_eq!(error.code, 0);
        assert_eq!(error.message, "filter not found");
    }

    #[test]
    fn log_deserializes_from_wire_shape() {
        let json = r#"{
            "address": "0x55d398326f99059ff775485246999027b3197955",
            "topics": [
                "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef",
                "0x0000000000000000000000001111111111111111111111111111111111111111",
                "0x0000000000000000000000002222222222222222222222222222222222222222"
            ],
            "data": "0x00000000000000000000000000000000000000000000000000000000000f4240",
            "blockNumber": "0x22b8a2f",
            "transactionHash": "0xdeadbeef",
            "logIndex": "0x5"
        }"#;

        let log: RpcLog = serde_json::from_str(json).unwrap();
        assert_eq!(log.topics.len(), 3);
        assert_eq!(log.transaction_hash, "0xdeadbeef");
        assert_eq!(log.block_number.as_deref(), Some("0x22b8a2f"));
    }
}
