use crate::language::Language;
use crate::languages::{EcmaExtractor, PythonExtractor, RustExtractor};
use crate::types::SymbolKind;
use std::collections::HashMap;
use std::sync::Arc;
use tree_sitter::Node;

/// A declaration recognized by an extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolMatch {
    pub kind: SymbolKind,
    pub name: String,
    pub exported: bool,
    pub is_async: bool,
    /// Walk into the declaration, reporting nested declarations as its members.
    pub members: bool,
}

impl SymbolMatch {
    pub fn new(kind: SymbolKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            exported: false,
            is_async: false,
            members: false,
        }
    }

    #[must_use]
    pub const fn exported(mut self, exported: bool) -> Self {
        self.exported = exported;
        self
    }

    #[must_use]
    pub const fn with_async(mut self, is_async: bool) -> Self {
        self.is_async = is_async;
        self
    }

    #[must_use]
    pub const fn with_members(mut self) -> Self {
        self.members = true;
        self
    }
}

/// What the generic walker should do with a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visit {
    /// Record a symbol.
    Symbol(SymbolMatch),
    /// Walk children under a new owner without recording anything (impl blocks).
    Scope(String),
    /// Walk children under the current owner.
    Descend,
    /// Leave the subtree alone.
    Skip,
}

/// Language-specific knowledge plugged into the generic walker.
///
/// Implementations only classify nodes; traversal, positions, signatures,
/// complexity, reference counting and doc detection are shared.
pub trait SymbolExtractor: Send + Sync {
    fn languages(&self) -> &'static [Language];

    fn grammar(&self, language: Language) -> Option<tree_sitter::Language> {
        language.tree_sitter_language()
    }

    /// Classify `node`; `parent` names the enclosing class, trait or impl target.
    fn visit(&self, node: Node<'_>, source: &str, parent: Option<&str>) -> Visit;

    /// Top-level import statements.
    fn is_import(&self, node: Node<'_>) -> bool;

    /// Node kinds that add one to complexity. Short-circuit operators are
    /// detected separately.
    fn decision_kinds(&self) -> &'static [&'static str];

    /// Line prefixes that mark a doc comment directly above a declaration.
    fn doc_prefixes(&self) -> &'static [&'static str];

    /// Line prefixes skipped between a doc comment and its declaration.
    fn attribute_prefixes(&self) -> &'static [&'static str] {
        &[]
    }

    /// Documentation carried inside the declaration (docstrings).
    fn has_inline_doc(&self, _node: Node<'_>, _source: &str) -> bool {
        false
    }
}

/// One extractor per language, populated at startup.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    by_language: HashMap<Language, Arc<dyn SymbolExtractor>>,
}

impl ExtractorRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the bundled Rust, Python and JavaScript/TypeScript extractors.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(RustExtractor));
        registry.register(Arc::new(PythonExtractor));
        registry.register(Arc::new(EcmaExtractor));
        registry
    }

    /// Register `extractor` for every language it claims, replacing earlier entries.
    pub fn register(&mut self, extractor: Arc<dyn SymbolExtractor>) {
        for language in extractor.languages() {
            self.by_language.insert(*language, extractor.clone());
        }
    }

    pub fn get(&self, language: Language) -> Option<&Arc<dyn SymbolExtractor>> {
        self.by_language.get(&language)
    }

    pub fn supports(&self, language: Language) -> bool {
        self.by_language.contains_key(&language)
    }

    pub fn languages(&self) -> Vec<Language> {
        let mut out: Vec<Language> = self.by_language.keys().copied().collect();
        out.sort_by_key(|l| l.as_str());
        out
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorRegistry")
            .field("languages", &self.languages())
            .finish()
    }
}

pub(crate) fn node_text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    node.utf8_text(source.as_bytes()).unwrap_or_default()
}

pub(crate) fn field_text(node: Node<'_>, field: &str, source: &str) -> Option<String> {
    node.child_by_field_name(field)
        .map(|n| node_text(n, source).to_string())
        .filter(|s| !s.is_empty())
}

pub(crate) fn has_child_kind(node: Node<'_>, kind: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == kind);
    found
}

/// `MAX_RETRIES`, `API_URL`: all caps with at least one letter.
pub(crate) fn is_upper_snake(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_alphabetic())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_covers_grammar_languages() {
        let registry = ExtractorRegistry::with_defaults();
        for lang in [
            Language::Rust,
            Language::Python,
            Language::JavaScript,
            Language::TypeScript,
            Language::Tsx,
        ] {
            assert!(registry.supports(lang), "{lang}");
        }
        assert!(!registry.supports(Language::Go));
    }

    #[test]
    fn upper_snake_detection() {
        assert!(is_upper_snake("MAX_RETRIES"));
        assert!(is_upper_snake("V2"));
        assert!(!is_upper_snake("maxRetries"));
        assert!(!is_upper_snake("__"));
    }
}
