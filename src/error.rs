use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize/deserialize error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bad endpoint URL: {0}")]
    BadUrl(#[from] url::ParseError),
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ProbeError>;
