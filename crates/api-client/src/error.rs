use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("WebSocket transport error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid API endpoint: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Failed to serialize the API request: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to deserialize the API response: {0}")]
    Deserialization(String),

    #[error("The API rejected the request ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("Invalid data format from API: {0}")]
    InvalidData(String),

    #[error("The API connection is closed")]
    Disconnected,
}
