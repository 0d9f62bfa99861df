use thiserror::Error;

pub type Result<T> = std::result::Result<T, SymbolError>;

/// Why a file produced no symbols. Callers usually degrade these to an
/// empty symbol list rather than failing.
#[derive(Error, Debug)]
pub enum SymbolError {
    #[error("Parse error: {0}")]
    ParseError(String),

    /// No extractor or grammar for this language.
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The grammar could not be loaded into a parser.
    #[error("Tree-sitter error: {0}")]
    TreeSitterError(String),
}

impl SymbolError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    pub fn unsupported_language(lang: impl Into<String>) -> Self {
        Self::UnsupportedLanguage(lang.into())
    }

    pub fn tree_sitter(msg: impl Into<String>) -> Self {
        Self::TreeSitterError(msg.into())
    }
}
