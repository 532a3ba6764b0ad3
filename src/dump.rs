//! Format decoded trees for display (dump text, one-line summaries).

use crate::tree::DecodedNode;

/// One line for a node: `label: summary [offset+length]`, diagnostics appended.
pub fn node_line(node: &DecodedNode) -> String {
    let mut line = if node.summary.is_empty() {
        node.label.clone()
    } else {
        format!("{}: {}", node.label, node.summary)
    };
    if let Some(code) = node.code {
        line.push_str(&format!(" (type {})", code));
    }
    line.push_str(&format!(" [{}+{}]", node.offset, node.length));
    for d in &node.diagnostics {
        let tag = if d.is_error() { "!" } else { "~" };
        line.push_str(&format!(" {}{}", tag, d));
    }
    line
}

/// Indented multi-line dump of `node` and its descendants, two spaces per level.
pub fn tree_to_dump(node: &DecodedNode, indent: usize) -> String {
    let mut lines = Vec::new();
    push_lines(node, indent, &mut lines);
    lines.join("\n")
}

fn push_lines(node: &DecodedNode, indent: usize, out: &mut Vec<String>) {
    out.push(format!("{}{}", "  ".repeat(indent), node_line(node)));
    for c in &node.children {
        push_lines(c, indent + 1, out);
    }
}

/// Dump a sibling list (e.g. a walk outcome) at the same indent.
pub fn nodes_to_dump(nodes: &[DecodedNode]) -> String {
    nodes.iter().map(|n| tree_to_dump(n, 0)).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Diagnostic, NodeKind};

    #[test]
    fn line_carries_range_and_diagnostics() {
        let mut n = DecodedNode::new("Flag", 0, 8, NodeKind::Field).with_summary("Reject (1)").with_code(1);
        assert_eq!(node_line(&n), "Flag: Reject (1) (type 1) [0+8]");
        n.annotate(Diagnostic::EmptyCompound);
        assert!(node_line(&n).ends_with("!compound TLV with zero length"));
    }

    #[test]
    fn children_are_indented() {
        let mut parent = DecodedNode::new("Outer", 0, 12, NodeKind::Subtree);
        parent.push_child(DecodedNode::new("Inner", 4, 8, NodeKind::Field).with_summary("x"));
        let text = tree_to_dump(&parent, 0);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines, vec!["Outer [0+12]", "  Inner: x [4+8]"]);
    }
}
