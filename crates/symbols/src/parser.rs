use crate::error::{Result, SymbolError};
use crate::extractor::ExtractorRegistry;
use crate::language::Language;
use crate::types::ParsedFile;
use crate::walker;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tree_sitter::Parser;

/// Parses files into symbol lists using the registered extractors.
#[derive(Debug, Clone)]
pub struct SymbolParser {
    registry: Arc<ExtractorRegistry>,
}

impl Default for SymbolParser {
    fn default() -> Self {
        Self::new(Arc::new(ExtractorRegistry::with_defaults()))
    }
}

impl SymbolParser {
    pub fn new(registry: Arc<ExtractorRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ExtractorRegistry {
        &self.registry
    }

    /// Read and parse `root/rel_path`. Only I/O failures are errors.
    pub fn parse_file(&self, root: &Path, rel_path: &str) -> Result<ParsedFile> {
        let bytes = std::fs::read(root.join(rel_path))?;
        let source = String::from_utf8_lossy(&bytes);
        Ok(self.parse_source(rel_path, &source))
    }

    /// Parse in-memory source. Unknown extensions, missing grammars and
    /// syntax errors degrade to an empty symbol list.
    pub fn parse_source(&self, path: &str, source: &str) -> ParsedFile {
        match self.try_parse_source(path, source) {
            Ok(parsed) => parsed,
            Err(err) => {
                log::debug!("No symbols for {path}: {err}");
                ParsedFile::unknown(path, source.lines().count())
            }
        }
    }

    /// Like [`parse_source`](Self::parse_source) but reports why a parse was rejected.
    pub fn try_parse_source(&self, path: &str, source: &str) -> Result<ParsedFile> {
        let line_count = source.lines().count();
        let language = Language::from_path(path);
        if language == Language::Unknown {
            return Ok(ParsedFile::unknown(path, line_count));
        }
        let Some(extractor) = self.registry.get(language) else {
            return Ok(ParsedFile::without_symbols(path, language.as_str(), line_count));
        };

        let started = Instant::now();
        let grammar = extractor
            .grammar(language)
            .ok_or_else(|| SymbolError::unsupported_language(language.as_str()))?;
        let mut parser = Parser::new();
        parser
            .set_language(&grammar)
            .map_err(|e| SymbolError::tree_sitter(format!("Failed to set language: {e}")))?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| SymbolError::parse("Failed to parse source code"))?;
        if tree.root_node().has_error() {
            return Err(SymbolError::parse(format!("syntax errors in {path}")));
        }

        let extraction = walker::extract(extractor.as_ref(), &tree, source, path);
        Ok(ParsedFile {
            path: path.to_string(),
            language: language.as_str().to_string(),
            symbols: extraction.symbols,
            parse_duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            imports: extraction.imports,
            line_count,
        })
    }
}
