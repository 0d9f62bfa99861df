use thiserror::Error;

pub type Result<T> = std::result::Result<T, MerkleError>;

#[derive(Error, Debug)]
pub enum MerkleError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid workspace path: {0}")]
    InvalidPath(String),

    #[error("Invalid ignore pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("{0}")]
    Other(String),
}
