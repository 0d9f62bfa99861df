//! # Context Symbols
//!
//! Heuristic declaration extraction over tree-sitter syntax trees.
//!
//! ## Architecture
//!
//! ```text
//! path ──> Language (extension table)
//!            │
//!            ├──> ExtractorRegistry::get(language) ── none ──> empty, tagged
//!            │
//!            └──> grammar ──> syntax tree ──> walker (DFS)
//!                                               │   asks the extractor: Symbol / Scope / Descend / Skip
//!                                               ├─> positions, signature, doc comments
//!                                               ├─> complexity (decision points + 1)
//!                                               └─> reference counts (identifier occurrences)
//! ```
//!
//! Adding a language means implementing [`SymbolExtractor`] and registering it;
//! the walker stays untouched.
//!
//! ## Example
//!
//! ```rust
//! use context_symbols::{SymbolKind, SymbolParser};
//!
//! let parsed = SymbolParser::default().parse_source(
//!     "src/app.ts",
//!     "export function main() { return 1; }",
//! );
//! let main = parsed.find_symbol("main").unwrap();
//! assert_eq!(main.kind, SymbolKind::Function);
//! assert!(main.exported);
//! ```

mod complexity;
mod error;
mod extractor;
mod language;
mod languages;
mod parser;
mod types;
mod walker;

pub use complexity::decision_points;
pub use error::{Result, SymbolError};
pub use extractor::{ExtractorRegistry, SymbolExtractor, SymbolMatch, Visit};
pub use language::{FileCategory, Language};
pub use languages::{EcmaExtractor, PythonExtractor, RustExtractor};
pub use parser::SymbolParser;
pub use types::{ExtractedSymbol, ParsedFile, Position, SymbolKind};
