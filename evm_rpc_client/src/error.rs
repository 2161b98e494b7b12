use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvmRpcError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),

    #[error("No RPC endpoints configured")]
    NoEndpoints,

    #[error("All RPC endpoints failed: {message}")]
    PoolExhausted { message: String },

    #[error("RPC call failed: {message}")]
    CallFailed { message: String },

    #[error("Parse error: {message}")]
    Parse { message: String },
}
