//! Depth-first traversal shared by every language.

use crate::complexity::decision_points;
use crate::extractor::{node_text, SymbolExtractor, SymbolMatch, Visit};
use crate::types::{ExtractedSymbol, Position};
use std::collections::HashMap;
use tree_sitter::{Node, Tree};

pub(crate) const MAX_IMPORTS: usize = 20;
const MAX_SIGNATURE_CHARS: usize = 200;

const IDENTIFIER_KINDS: &[&str] = &[
    "identifier",
    "type_identifier",
    "property_identifier",
    "field_identifier",
    "shorthand_property_identifier",
    "shorthand_property_identifier_pattern",
];

pub(crate) struct Extraction {
    pub symbols: Vec<ExtractedSymbol>,
    pub imports: Vec<String>,
}

pub(crate) fn extract(
    extractor: &dyn SymbolExtractor,
    tree: &Tree,
    source: &str,
    path: &str,
) -> Extraction {
    let root = tree.root_node();
    let lines: Vec<&str> = source.lines().collect();
    let mut symbols = Vec::new();

    let mut stack: Vec<(Node<'_>, Option<String>)> = Vec::new();
    push_children(&mut stack, root, None);

    while let Some((node, parent)) = stack.pop() {
        match extractor.visit(node, source, parent.as_deref()) {
            Visit::Symbol(found) => {
                if found.members {
                    push_children(&mut stack, node, Some(found.name.clone()));
                }
                symbols.push(build_symbol(extractor, node, source, &lines, path, parent, found));
            }
            Visit::Scope(owner) => push_children(&mut stack, node, Some(owner)),
            Visit::Descend => push_children(&mut stack, node, parent),
            Visit::Skip => {}
        }
    }

    let references = identifier_counts(root, source);
    for symbol in &mut symbols {
        let seen = references.get(symbol.name.as_str()).copied().unwrap_or(0);
        // The declaring identifier itself is not a reference.
        symbol.reference_count = seen.saturating_sub(1);
    }
    symbols.sort_by_key(|s| (s.start.line, s.start.column));

    Extraction {
        symbols,
        imports: collect_imports(extractor, root, source),
    }
}

/// Children go on the stack in reverse so they pop in source order.
fn push_children<'t>(stack: &mut Vec<(Node<'t>, Option<String>)>, node: Node<'t>, parent: Option<String>) {
    let mut cursor = node.walk();
    let children: Vec<Node<'t>> = node.named_children(&mut cursor).collect();
    for child in children.into_iter().rev() {
        stack.push((child, parent.clone()));
    }
}

fn build_symbol(
    extractor: &dyn SymbolExtractor,
    node: Node<'_>,
    source: &str,
    lines: &[&str],
    path: &str,
    parent: Option<String>,
    found: SymbolMatch,
) -> ExtractedSymbol {
    let start = node.start_position();
    let end = node.end_position();
    ExtractedSymbol {
        name: found.name,
        kind: found.kind,
        start: Position {
            line: start.row + 1,
            column: start.column,
        },
        end: Position {
            line: end.row + 1,
            column: end.column,
        },
        signature: signature(node, source),
        complexity: decision_points(extractor, node),
        exported: found.exported,
        is_async: found.is_async,
        reference_count: 0,
        documented: has_leading_doc(extractor, start.row, lines)
            || extractor.has_inline_doc(node, source),
        parent,
        file: path.to_string(),
    }
}

/// Declaration head: text before the body, or the first line when there is none.
fn signature(node: Node<'_>, source: &str) -> Option<String> {
    let text = node_text(node, source);
    let head = match node.child_by_field_name("body") {
        Some(body) => {
            let len = body.start_byte().saturating_sub(node.start_byte());
            text.get(..len).unwrap_or(text)
        }
        None => text.lines().next().unwrap_or_default(),
    };
    let collapsed = head.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_end_matches([':', '{', ' ', ';']);
    if trimmed.is_empty() {
        return None;
    }
    Some(match trimmed.char_indices().nth(MAX_SIGNATURE_CHARS) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_string(),
    })
}

fn has_leading_doc(extractor: &dyn SymbolExtractor, start_row: usize, lines: &[&str]) -> bool {
    let prefixes = extractor.doc_prefixes();
    let attributes = extractor.attribute_prefixes();
    lines
        .get(..start_row)
        .unwrap_or_default()
        .iter()
        .rev()
        .map(|line| line.trim())
        .find(|line| !attributes.iter().any(|p| line.starts_with(p)))
        .is_some_and(|line| prefixes.iter().any(|p| line.starts_with(p)))
}

fn identifier_counts<'s>(root: Node<'_>, source: &'s str) -> HashMap<&'s str, u32> {
    let mut counts: HashMap<&str, u32> = HashMap::new();
    let mut cursor = root.walk();
    let mut descending = true;
    loop {
        if descending {
            let node = cursor.node();
            if IDENTIFIER_KINDS.contains(&node.kind()) {
                *counts.entry(node_text(node, source)).or_default() += 1;
            }
            if cursor.goto_first_child() {
                continue;
            }
        }
        if cursor.goto_next_sibling() {
            descending = true;
            continue;
        }
        if !cursor.goto_parent() {
            break;
        }
        descending = false;
    }
    counts
}

fn collect_imports(extractor: &dyn SymbolExtractor, root: Node<'_>, source: &str) -> Vec<String> {
    let mut cursor = root.walk();
    let imports: Vec<String> = root
        .named_children(&mut cursor)
        .filter(|child| extractor.is_import(*child))
        .filter_map(|child| {
            let text = node_text(child, source).trim();
            let first = text.lines().next().unwrap_or_default().trim_end_matches(';').trim();
            (!first.is_empty()).then(|| first.to_string())
        })
        .take(MAX_IMPORTS)
        .collect();
    imports
}
