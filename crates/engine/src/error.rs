use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    Validation(#[from] context_protocol::ValidationError),

    #[error("Merkle error: {0}")]
    MerkleError(#[from] context_merkle::MerkleError),

    #[error("Symbol error: {0}")]
    SymbolError(#[from] context_symbols::SymbolError),

    #[error("Scoring error: {0}")]
    ScoringError(#[from] context_scoring::ScoringError),

    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Invalid workspace path: {0}")]
    InvalidPath(String),

    #[error("{0}")]
    Other(String),
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigError(err.to_string())
    }
}
