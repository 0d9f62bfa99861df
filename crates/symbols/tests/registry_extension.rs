use context_symbols::{
    ExtractorRegistry, Language, SymbolExtractor, SymbolKind, SymbolMatch, SymbolParser, Visit,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tree_sitter::Node;

/// Reports only Rust enums, to show a registered extractor replaces the bundled one
/// without touching the walker.
struct EnumsOnly;

impl SymbolExtractor for EnumsOnly {
    fn languages(&self) -> &'static [Language] {
        &[Language::Rust]
    }

    fn visit(&self, node: Node<'_>, source: &str, _parent: Option<&str>) -> Visit {
        match node.kind() {
            "enum_item" => node
                .child_by_field_name("name")
                .and_then(|n| n.utf8_text(source.as_bytes()).ok())
                .map_or(Visit::Skip, |name| {
                    Visit::Symbol(SymbolMatch::new(SymbolKind::Enum, name).exported(true))
                }),
            "mod_item" | "declaration_list" => Visit::Descend,
            _ => Visit::Skip,
        }
    }

    fn is_import(&self, _node: Node<'_>) -> bool {
        false
    }

    fn decision_kinds(&self) -> &'static [&'static str] {
        &["match_arm"]
    }

    fn doc_prefixes(&self) -> &'static [&'static str] {
        &["///"]
    }
}

#[test]
fn registered_extractor_overrides_default() {
    let mut registry = ExtractorRegistry::with_defaults();
    registry.register(Arc::new(EnumsOnly));
    let parser = SymbolParser::new(Arc::new(registry));

    let parsed = parser.parse_source(
        "src/lib.rs",
        "use std::fmt;\nfn ignored() {}\nmod inner {\n    enum Mode { A, B }\n}\n",
    );
    let names: Vec<_> = parsed.symbols.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Mode"]);
    assert!(parsed.imports.is_empty());
    assert_eq!(parsed.symbols[0].start.line, 4);
}

#[test]
fn empty_registry_yields_tagged_files_without_symbols() {
    let parser = SymbolParser::new(Arc::new(ExtractorRegistry::empty()));
    let parsed = parser.parse_source("src/lib.rs", "pub fn a() {}");
    assert_eq!(parsed.language, "rust");
    assert!(parsed.symbols.is_empty());
}
