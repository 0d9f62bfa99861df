use crate::extractor::{field_text, node_text, SymbolExtractor, SymbolMatch, Visit};
use crate::language::Language;
use crate::types::SymbolKind;
use tree_sitter::Node;

pub struct RustExtractor;

impl RustExtractor {
    fn is_pub(node: Node<'_>) -> bool {
        let mut cursor = node.walk();
        let found = node
            .children(&mut cursor)
            .any(|c| c.kind() == "visibility_modifier");
        found
    }

    fn is_async(node: Node<'_>, source: &str) -> bool {
        let mut cursor = node.walk();
        let found = node.children(&mut cursor).any(|c| {
            c.kind() == "function_modifiers" && node_text(c, source).contains("async")
        });
        found
    }

    /// `impl<T> Foo<T>` and `impl Display for a::Foo` both resolve to `Foo`.
    fn impl_target(node: Node<'_>, source: &str) -> Option<String> {
        let ty = node.child_by_field_name("type")?;
        let name_node = match ty.kind() {
            "generic_type" => ty.child_by_field_name("type")?,
            _ => ty,
        };
        let name_node = match name_node.kind() {
            "scoped_type_identifier" => name_node.child_by_field_name("name")?,
            _ => name_node,
        };
        let text = node_text(name_node, source);
        let base = text.split('<').next().unwrap_or(text);
        let base = base.rsplit("::").next().unwrap_or(base).trim();
        (!base.is_empty()).then(|| base.to_string())
    }

    fn named(node: Node<'_>, source: &str, kind: SymbolKind) -> Visit {
        match field_text(node, "name", source) {
            Some(name) => Visit::Symbol(SymbolMatch::new(kind, name).exported(Self::is_pub(node))),
            None => Visit::Skip,
        }
    }
}

impl SymbolExtractor for RustExtractor {
    fn languages(&self) -> &'static [Language] {
        &[Language::Rust]
    }

    fn visit(&self, node: Node<'_>, source: &str, parent: Option<&str>) -> Visit {
        match node.kind() {
            "function_item" | "function_signature_item" => {
                let Some(name) = field_text(node, "name", source) else {
                    return Visit::Skip;
                };
                let kind = if parent.is_some() {
                    SymbolKind::Method
                } else {
                    SymbolKind::Function
                };
                // Trait method declarations share the trait's visibility.
                let exported = Self::is_pub(node) || node.kind() == "function_signature_item";
                Visit::Symbol(
                    SymbolMatch::new(kind, name)
                        .exported(exported)
                        .with_async(Self::is_async(node, source)),
                )
            }
            "struct_item" | "union_item" => Self::named(node, source, SymbolKind::Class),
            "enum_item" => Self::named(node, source, SymbolKind::Enum),
            "type_item" => Self::named(node, source, SymbolKind::Type),
            "const_item" => Self::named(node, source, SymbolKind::Constant),
            "static_item" => Self::named(node, source, SymbolKind::Variable),
            "trait_item" => match Self::named(node, source, SymbolKind::Interface) {
                Visit::Symbol(found) => Visit::Symbol(found.with_members()),
                other => other,
            },
            "impl_item" => match Self::impl_target(node, source) {
                Some(target) => Visit::Scope(target),
                None => Visit::Descend,
            },
            "mod_item" | "declaration_list" => Visit::Descend,
            _ => Visit::Skip,
        }
    }

    fn is_import(&self, node: Node<'_>) -> bool {
        matches!(node.kind(), "use_declaration" | "extern_crate_declaration")
    }

    fn decision_kinds(&self) -> &'static [&'static str] {
        &[
            "if_expression",
            "match_arm",
            "for_expression",
            "while_expression",
            "loop_expression",
        ]
    }

    fn doc_prefixes(&self) -> &'static [&'static str] {
        &["///", "//!", "/**"]
    }

    fn attribute_prefixes(&self) -> &'static [&'static str] {
        &["#["]
    }
}
