use thiserror::Error;

#[derive(Error, Debug)]
pub enum TronGridError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TronGrid API error: {message}")]
    Api { message: String },

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("TronGrid API key is missing")]
    MissingApiKey,
}
