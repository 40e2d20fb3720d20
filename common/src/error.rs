use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed driver config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid driver config: {0}")]
    Invalid(&'static str),
}
