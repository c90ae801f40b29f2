use serde::{Deserialize, Serialize};

use crate::{descriptor::CommandStatus, relation::TextSpan};

/// A detached, serializable copy of one node and its subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub marker: Option<String>,
    pub kind: String,
    pub span: Option<TextSpan>,
    pub status: CommandStatus,
    pub conflict: bool,
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    fn count(&self) -> usize {
        1 + self.children.iter().map(|c| c.count()).sum::<usize>()
    }

    fn spans(&self, out: &mut Vec<(usize, TextSpan)>, depth: usize) {
        if let Some(span) = self.span {
            out.push((depth, span));
        }
        for child in self.children.iter() {
            child.spans(out, depth + 1);
        }
    }
}

/// The top-level nodes of a tree, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub nodes: Vec<NodeSnapshot>,
}

impl TreeSnapshot {
    /// Number of nodes, the root excluded.
    pub fn count(&self) -> usize {
        self.nodes.iter().map(|n| n.count()).sum()
    }

    /// Pre-order `(depth, span)` pairs, top-level nodes at depth 0.
    pub fn spans(&self) -> Vec<(usize, TextSpan)> {
        let mut out = Vec::new();
        for node in self.nodes.iter() {
            node.spans(&mut out, 0);
        }
        out
    }
}
