use crate::extractor::{field_text, has_child_kind, is_upper_snake, SymbolExtractor, SymbolMatch, Visit};
use crate::language::Language;
use crate::types::SymbolKind;
use tree_sitter::Node;

/// Python: leading underscore marks a private name.
pub struct PythonExtractor;

impl PythonExtractor {
    fn module_assignment(node: Node<'_>, source: &str) -> Visit {
        let Some(assignment) = node.named_child(0).filter(|n| n.kind() == "assignment") else {
            return Visit::Skip;
        };
        let Some(left) = assignment
            .child_by_field_name("left")
            .filter(|n| n.kind() == "identifier")
        else {
            return Visit::Skip;
        };
        let name = crate::extractor::node_text(left, source).to_string();
        let kind = if is_upper_snake(&name) {
            SymbolKind::Constant
        } else {
            SymbolKind::Variable
        };
        let exported = !name.starts_with('_');
        Visit::Symbol(SymbolMatch::new(kind, name).exported(exported))
    }
}

impl SymbolExtractor for PythonExtractor {
    fn languages(&self) -> &'static [Language] {
        &[Language::Python]
    }

    fn visit(&self, node: Node<'_>, source: &str, parent: Option<&str>) -> Visit {
        match node.kind() {
            "function_definition" => {
                let Some(name) = field_text(node, "name", source) else {
                    return Visit::Skip;
                };
                let kind = if parent.is_some() {
                    SymbolKind::Method
                } else {
                    SymbolKind::Function
                };
                let exported = !name.starts_with('_');
                Visit::Symbol(
                    SymbolMatch::new(kind, name)
                        .exported(exported)
                        .with_async(has_child_kind(node, "async")),
                )
            }
            "class_definition" => match field_text(node, "name", source) {
                Some(name) => {
                    let exported = !name.starts_with('_');
                    Visit::Symbol(
                        SymbolMatch::new(SymbolKind::Class, name)
                            .exported(exported)
                            .with_members(),
                    )
                }
                None => Visit::Skip,
            },
            "decorated_definition" | "block" => Visit::Descend,
            "expression_statement" if parent.is_none() => Self::module_assignment(node, source),
            _ => Visit::Skip,
        }
    }

    fn is_import(&self, node: Node<'_>) -> bool {
        matches!(
            node.kind(),
            "import_statement" | "import_from_statement" | "future_import_statement"
        )
    }

    fn decision_kinds(&self) -> &'static [&'static str] {
        &[
            "if_statement",
            "elif_clause",
            "for_statement",
            "while_statement",
            "except_clause",
            "conditional_expression",
            "boolean_operator",
            "for_in_clause",
            "if_clause",
            "case_clause",
        ]
    }

    fn doc_prefixes(&self) -> &'static [&'static str] {
        &["#"]
    }

    fn attribute_prefixes(&self) -> &'static [&'static str] {
        &["@"]
    }

    fn has_inline_doc(&self, node: Node<'_>, _source: &str) -> bool {
        node.child_by_field_name("body")
            .and_then(|body| body.named_child(0))
            .filter(|first| first.kind() == "expression_statement")
            .and_then(|stmt| stmt.named_child(0))
            .is_some_and(|expr| expr.kind() == "string")
    }
}

#[cfg(test)]
mod tests {
    use crate::{ExtractorRegistry, SymbolKind, SymbolParser};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn extracts_functions_classes_and_module_names() {
        let code = r#"
import os
from typing import List

MAX_SIZE = 10
_cache = {}

def hello(names):
    """Greets."""
    for n in names:
        if n and n.strip():
            print(n)

async def fetch():
    pass

class Greeter:
    @staticmethod
    def build():
        return Greeter()

    def _secret(self):
        pass
"#;
        let parser = SymbolParser::new(Arc::new(ExtractorRegistry::with_defaults()));
        let parsed = parser.parse_source("app/greet.py", code);

        assert_eq!(parsed.language, "python");
        assert_eq!(parsed.imports, vec!["import os", "from typing import List"]);

        let names: Vec<_> = parsed
            .symbols
            .iter()
            .map(|s| (s.name.as_str(), s.kind))
            .collect();
        assert_eq!(
            names,
            vec![
                ("MAX_SIZE", SymbolKind::Constant),
                ("_cache", SymbolKind::Variable),
                ("hello", SymbolKind::Function),
                ("fetch", SymbolKind::Function),
                ("Greeter", SymbolKind::Class),
                ("build", SymbolKind::Method),
                ("_secret", SymbolKind::Method),
            ]
        );

        let hello = parsed.find_symbol("hello").unwrap();
        assert!(hello.documented);
        // for + if + and
        assert_eq!(hello.complexity, 4);
        assert_eq!(hello.signature.as_deref(), Some("def hello(names)"));

        assert!(parsed.find_symbol("fetch").unwrap().is_async);
        assert!(!parsed.find_symbol("_cache").unwrap().exported);
        let secret = parsed.find_symbol("_secret").unwrap();
        assert_eq!(secret.parent.as_deref(), Some("Greeter"));
        assert!(!secret.exported);
    }
}
