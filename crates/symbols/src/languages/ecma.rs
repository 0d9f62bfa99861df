use crate::extractor::{
    field_text, has_child_kind, is_upper_snake, node_text, SymbolExtractor, SymbolMatch, Visit,
};
use crate::language::Language;
use crate::types::SymbolKind;
use tree_sitter::Node;

const FUNCTION_VALUES: &[&str] = &[
    "arrow_function",
    "function_expression",
    "function",
    "generator_function",
];

/// JavaScript, TypeScript and TSX share one grammar family.
pub struct EcmaExtractor;

impl EcmaExtractor {
    fn is_exported(node: Node<'_>) -> bool {
        node.parent()
            .is_some_and(|p| p.kind() == "export_statement")
    }

    fn declaration(node: Node<'_>, source: &str, kind: SymbolKind) -> Option<SymbolMatch> {
        let name = field_text(node, "name", source)?;
        Some(SymbolMatch::new(kind, name).exported(Self::is_exported(node)))
    }

    /// `const handler = async () => {}` is a function; `const LIMIT = 5` a constant.
    fn variable(node: Node<'_>, source: &str) -> Visit {
        let mut cursor = node.walk();
        let declarator = node
            .named_children(&mut cursor)
            .find(|c| c.kind() == "variable_declarator");
        let Some(declarator) = declarator else {
            return Visit::Skip;
        };
        let Some(name_node) = declarator
            .child_by_field_name("name")
            .filter(|n| n.kind() == "identifier")
        else {
            return Visit::Skip;
        };
        let name = node_text(name_node, source).to_string();
        let exported = Self::is_exported(node);

        if let Some(value) = declarator
            .child_by_field_name("value")
            .filter(|v| FUNCTION_VALUES.contains(&v.kind()))
        {
            return Visit::Symbol(
                SymbolMatch::new(SymbolKind::Function, name)
                    .exported(exported)
                    .with_async(has_child_kind(value, "async")),
            );
        }

        let is_const = node_text(node, source).trim_start().starts_with("const");
        let kind = if is_const && is_upper_snake(&name) {
            SymbolKind::Constant
        } else {
            SymbolKind::Variable
        };
        Visit::Symbol(SymbolMatch::new(kind, name).exported(exported))
    }

    fn method(node: Node<'_>, source: &str, parent: Option<&str>) -> Visit {
        let Some(name_node) = node.child_by_field_name("name") else {
            return Visit::Skip;
        };
        let name = node_text(name_node, source).to_string();
        let mut cursor = node.walk();
        let restricted = node.children(&mut cursor).any(|c| {
            c.kind() == "accessibility_modifier"
                && matches!(node_text(c, source), "private" | "protected")
        });
        let exported = !restricted && name_node.kind() != "private_property_identifier";
        let kind = if parent.is_some() {
            SymbolKind::Method
        } else {
            SymbolKind::Function
        };
        Visit::Symbol(
            SymbolMatch::new(kind, name)
                .exported(exported)
                .with_async(has_child_kind(node, "async")),
        )
    }
}

impl SymbolExtractor for EcmaExtractor {
    fn languages(&self) -> &'static [Language] {
        &[Language::JavaScript, Language::TypeScript, Language::Tsx]
    }

    fn visit(&self, node: Node<'_>, source: &str, parent: Option<&str>) -> Visit {
        let found = match node.kind() {
            "export_statement" | "class_body" | "ambient_declaration" => return Visit::Descend,
            "function_declaration" | "generator_function_declaration" => {
                Self::declaration(node, source, SymbolKind::Function)
                    .map(|m| m.with_async(has_child_kind(node, "async")))
            }
            "class_declaration" | "abstract_class_declaration" => {
                Self::declaration(node, source, SymbolKind::Class).map(SymbolMatch::with_members)
            }
            "interface_declaration" => Self::declaration(node, source, SymbolKind::Interface),
            "type_alias_declaration" => Self::declaration(node, source, SymbolKind::Type),
            "enum_declaration" => Self::declaration(node, source, SymbolKind::Enum),
            "method_definition" | "method_signature" | "abstract_method_signature" => {
                return Self::method(node, source, parent)
            }
            "lexical_declaration" | "variable_declaration" if parent.is_none() => {
                return Self::variable(node, source)
            }
            _ => None,
        };
        found.map_or(Visit::Skip, Visit::Symbol)
    }

    fn is_import(&self, node: Node<'_>) -> bool {
        node.kind() == "import_statement"
    }

    fn decision_kinds(&self) -> &'static [&'static str] {
        &[
            "if_statement",
            "for_statement",
            "for_in_statement",
            "while_statement",
            "do_statement",
            "switch_case",
            "catch_clause",
            "ternary_expression",
        ]
    }

    fn doc_prefixes(&self) -> &'static [&'static str] {
        &["/**", "*", "//", "/*"]
    }

    fn attribute_prefixes(&self) -> &'static [&'static str] {
        &["@"]
    }
}
