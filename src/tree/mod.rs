//! The command tree.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]; each node stores its parent id and an
//! ordered list of child ids, so reparenting is an index rewrite. The tree is rebuilt
//! incrementally: every discovered command is [inserted](CommandTree::insert) by descending from
//! the root into the deepest node whose range contains the new one, adopting existing siblings
//! the new range contains, and keeping siblings in document order.
//!
//! Partial overlap is a structural error. The newcomer is attached as a conflict leaf of the
//! deepest container found, the overlapped siblings are flagged as well, and the number of
//! overlaps is returned to the caller. Conflict nodes take no part in later containment
//! decisions.

use std::fmt::Write;

use crate::{
    error::DocCmdError,
    host::AnchoredRange,
    relation::{relation, RangeRelation},
};

pub mod node;
pub mod snapshot;


pub use node::{CommandNode, NodeId};
pub use snapshot::{NodeSnapshot, TreeSnapshot};

const ROOT: NodeId = NodeId(0);

/// Result of inserting one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    pub id: NodeId,
    pub conflicts: usize,
}

/// Removed nodes leave a hole in `nodes`; their ids are kept in `free` and handed out again.
#[derive(Debug)]
pub struct CommandTree {
    nodes: Vec<Option<CommandNode>>,
    free: Vec<NodeId>,
}

impl Default for CommandTree {
    fn default() -> Self {
        CommandTree::new()
    }
}

impl CommandTree {
    pub fn new() -> CommandTree {
        CommandTree {
            nodes: vec![Some(CommandNode::root())],
            free: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        ROOT
    }

    pub fn get(&self, id: NodeId) -> Option<&CommandNode> {
        self.nodes.get(id.0).and_then(|n| n.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut CommandNode> {
        self.nodes.get_mut(id.0).and_then(|n| n.as_mut())
    }

    /// Number of nodes, the root excluded.
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every node and releases their ranges.
    pub fn clear(&mut self) {
        for node in self.nodes.iter_mut().flatten() {
            node.release();
        }
        *self = CommandTree::new();
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(|n| n.children()).unwrap_or(&[])
    }

    /// Inserts a freshly discovered node and returns its id and the number of conflicts found.
    pub fn insert(&mut self, mut node: CommandNode) -> InsertOutcome {
        node.parent = None;
        node.children.clear();
        let id = match self.free.pop() {
            Some(id) => {
                self.nodes[id.0] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        };
        let conflicts = self.place(id);
        InsertOutcome { id, conflicts }
    }

    fn range_of(&self, id: NodeId) -> Option<&dyn AnchoredRange> {
        self.get(id).and_then(|n| n.range())
    }

    fn relate(&self, a: NodeId, b: NodeId) -> Option<RangeRelation> {
        relation(self.range_of(a)?, self.range_of(b)?)
    }

    fn is_conflict(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(|n| n.conflict)
    }

    /// True when `a` belongs before `b` among siblings.
    fn precedes(&self, a: NodeId, b: NodeId) -> bool {
        self.relate(a, b)
            .is_some_and(|r| r.a_less_than_b() || r == RangeRelation::OverlapALeads)
    }

    fn sorted_position(&self, parent: NodeId, id: NodeId) -> usize {
        let siblings = self.children(parent);
        siblings
            .iter()
            .position(|&sib| sib != id && self.precedes(id, sib))
            .unwrap_or(siblings.len())
    }

    fn attach(&mut self, parent: NodeId, id: NodeId) {
        let pos = self.sorted_position(parent, id);
        if let Some(p) = self.get_mut(parent) {
            p.children.insert(pos, id);
        }
        if let Some(n) = self.get_mut(id) {
            n.parent = Some(parent);
        }
    }

    fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.get_mut(id).and_then(|n| n.parent.take()) else {
            return;
        };
        if let Some(p) = self.get_mut(parent) {
            p.children.retain(|&c| c != id);
        }
    }

    /// Places a detached node (possibly with children of its own) below the root.
    fn place(&mut self, id: NodeId) -> usize {
        let mut parent = ROOT;
        loop {
            let siblings = self.children(parent).to_vec();
            let mut container = None;
            let mut adopted = Vec::new();
            let mut overlapping = Vec::new();
            for sib in siblings {
                if sib == id || self.is_conflict(sib) {
                    continue;
                }
                match self.relate(id, sib) {
                    Some(r) if r.is_conflict() => overlapping.push(sib),
                    Some(r) if r == RangeRelation::Equal || r.b_contains_a() => {
                        container = Some(sib);
                        break;
                    }
                    Some(r) if r.a_contains_b() => adopted.push(sib),
                    _ => {}
                }
            }

            if !overlapping.is_empty() {
                for &sib in overlapping.iter() {
                    tracing::warn!(
                        "Command {} overlaps {} without nesting",
                        self.describe(id),
                        self.describe(sib)
                    );
                    if let Some(n) = self.get_mut(sib) {
                        n.conflict = true;
                    }
                }
                if let Some(n) = self.get_mut(id) {
                    n.conflict = true;
                }
                self.attach(parent, id);
                return overlapping.len();
            }

            if let Some(next) = container {
                parent = next;
                continue;
            }

            for &child in adopted.iter() {
                self.detach(child);
            }
            self.attach(parent, id);
            for child in adopted {
                self.attach(id, child);
            }
            return 0;
        }
    }

    fn describe(&self, id: NodeId) -> String {
        match self.get(id) {
            Some(node) => format!("'{}' ({node})", node.marker().unwrap_or("<root>")),
            None => format!("{id}"),
        }
    }

    /// Depth-first pre-order, siblings left to right. The root is not visited.
    pub fn dfs(&self) -> Vec<NodeId> {
        self.walk(ROOT, false)
    }

    /// Depth-first pre-order, siblings right to left. The root is not visited.
    pub fn dfs_rev(&self) -> Vec<NodeId> {
        self.walk(ROOT, true)
    }

    /// All nodes below `id` in pre-order, `id` itself excluded.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        self.walk(id, false)
    }

    fn walk(&self, from: NodeId, reverse: bool) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack: Vec<NodeId> = Vec::new();
        let push_children = |stack: &mut Vec<NodeId>, id: NodeId| {
            let children = self.children(id);
            if reverse {
                stack.extend(children.iter().copied());
            } else {
                stack.extend(children.iter().rev().copied());
            }
        };
        push_children(&mut stack, from);
        while let Some(id) = stack.pop() {
            order.push(id);
            push_children(&mut stack, id);
        }
        order
    }

    pub fn find_by_marker(&self, name: &str) -> Option<NodeId> {
        self.dfs()
            .into_iter()
            .find(|&id| self.get(id).and_then(|n| n.marker()) == Some(name))
    }

    /// Removes a node. Its children take its place in the parent, in order.
    pub fn remove(&mut self, id: NodeId) -> Option<CommandNode> {
        if id == ROOT {
            return None;
        }
        let mut node = self.nodes.get_mut(id.0)?.take()?;
        if let Some(parent) = node.parent {
            let children = std::mem::take(&mut node.children);
            for &child in children.iter() {
                if let Some(c) = self.get_mut(child) {
                    c.parent = Some(parent);
                }
            }
            if let Some(p) = self.get_mut(parent) {
                if let Some(pos) = p.children.iter().position(|&c| c == id) {
                    p.children.splice(pos..=pos, children);
                }
            }
        }
        self.free.push(id);
        node.release();
        node.parent = None;
        Some(node)
    }

    /// Removes retired nodes and nodes whose range is gone. Returns how many were removed.
    pub fn prune_retired(&mut self) -> usize {
        let doomed: Vec<NodeId> = self
            .dfs()
            .into_iter()
            .filter(|&id| {
                self.get(id)
                    .is_some_and(|n| n.retired || n.span().is_none())
            })
            .collect();
        for &id in doomed.iter() {
            tracing::debug!("Pruning {}", self.describe(id));
            self.remove(id);
        }
        doomed.len()
    }

    /// Gives a node a new range and moves it to where the range now belongs. Its former
    /// children are placed again from the root, so those outside the new range leave it. Returns
    /// the number of conflicts found on re-insertion.
    pub fn reanchor(&mut self, id: NodeId, range: Box<dyn AnchoredRange>) -> usize {
        if id == ROOT || self.get(id).is_none() {
            return 0;
        }
        self.detach(id);
        let children = self.children(id).to_vec();
        for &child in children.iter() {
            self.detach(child);
        }
        if let Some(node) = self.get_mut(id) {
            if let Some(old) = node.range.replace(range) {
                old.dispose();
            }
            node.conflict = false;
        }
        let mut conflicts = self.place(id);
        for child in children {
            conflicts += self.place(child);
        }
        conflicts
    }

    pub fn snapshot(&self) -> TreeSnapshot {
        TreeSnapshot {
            nodes: self
                .children(ROOT)
                .iter()
                .filter_map(|&id| self.snapshot_node(id))
                .collect(),
        }
    }

    fn snapshot_node(&self, id: NodeId) -> Option<NodeSnapshot> {
        let node = self.get(id)?;
        Some(NodeSnapshot {
            marker: node.marker().map(str::to_string),
            kind: node.kind().map(|k| k.label()).unwrap_or("root").to_string(),
            span: node.span(),
            status: node.status,
            conflict: node.conflict,
            children: node
                .children()
                .iter()
                .filter_map(|&c| self.snapshot_node(c))
                .collect(),
        })
    }

    /// Indented rendering, one node per line.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_node(&mut out, ROOT, 0);
        out
    }

    fn dump_node(&self, out: &mut String, id: NodeId, depth: usize) {
        let Some(node) = self.get(id) else {
            return;
        };
        let _ = write!(out, "{:indent$}{node}", "", indent = depth * 2);
        if let Some(marker) = node.marker() {
            let _ = write!(out, " {marker}");
        }
        out.push('\n');
        for &child in node.children() {
            self.dump_node(out, child, depth + 1);
        }
    }

    /// Lists every violated structural invariant: parent links, containment in the parent, and
    /// sibling order and disjointness. Conflict nodes are exempt.
    pub fn built_in_test(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let mut parents = vec![ROOT];
        parents.extend(self.dfs());
        for parent in parents {
            let valid: Vec<NodeId> = self
                .children(parent)
                .iter()
                .copied()
                .filter(|&c| !self.is_conflict(c))
                .collect();
            for &child in self.children(parent) {
                if self.get(child).and_then(|n| n.parent) != Some(parent) {
                    errors.push(format!("{child} is listed under {parent} but points elsewhere"));
                }
            }
            for &child in valid.iter() {
                if parent == ROOT || self.is_conflict(parent) {
                    continue;
                }
                if let Some(r) = self.relate(child, parent) {
                    if !(r == RangeRelation::Equal || r.b_contains_a()) {
                        errors.push(format!(
                            "{} is not inside its parent {}: {r}",
                            self.describe(child),
                            self.describe(parent)
                        ));
                    }
                }
            }
            for pair in valid.windows(2) {
                if let Some(r) = self.relate(pair[0], pair[1]) {
                    if r != RangeRelation::AThenB {
                        errors.push(format!(
                            "siblings {} and {} are out of order: {r}",
                            self.describe(pair[0]),
                            self.describe(pair[1])
                        ));
                    }
                }
            }
        }
        errors
    }

    pub fn is_balanced(&self) -> Result<(), DocCmdError> {
        let errors = self.built_in_test();
        if !errors.is_empty() {
            Err(DocCmdError::Custom(errors.join("\n- ")))
        } else {
            Ok(())
        }
    }
}
