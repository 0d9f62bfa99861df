use crate::extractor::SymbolExtractor;
use tree_sitter::Node;

const SHORT_CIRCUIT: &[&str] = &["&&", "||", "??"];

/// Decision points beneath `node` plus one.
pub fn decision_points(extractor: &dyn SymbolExtractor, node: Node<'_>) -> u32 {
    let kinds = extractor.decision_kinds();
    let mut count = 1u32;
    let mut cursor = node.walk();
    let mut descending = true;

    loop {
        if descending {
            let current = cursor.node();
            if kinds.contains(&current.kind()) || is_short_circuit(current) {
                count = count.saturating_add(1);
            }
            if cursor.goto_first_child() {
                continue;
            }
        }
        if cursor.goto_next_sibling() {
            descending = true;
            continue;
        }
        if !cursor.goto_parent() || cursor.node() == node {
            break;
        }
        descending = false;
    }
    count
}

fn is_short_circuit(node: Node<'_>) -> bool {
    node.kind() == "binary_expression"
        && node
            .child_by_field_name("operator")
            .is_some_and(|op| SHORT_CIRCUIT.contains(&op.kind()))
}
