use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    descriptor::{CommandDescriptor, CommandKind, CommandStatus},
    host::AnchoredRange,
    relation::TextSpan,
};

/// Stable index of a node in its [`CommandTree`](super::CommandTree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// One command of the tree. The root is synthetic and has neither marker nor descriptor.
#[derive(Debug)]
pub struct CommandNode {
    pub(crate) marker: Option<String>,
    pub(crate) range: Option<Box<dyn AnchoredRange>>,
    pub(crate) descriptor: Option<CommandDescriptor>,
    pub status: CommandStatus,
    /// The range overlaps a sibling's range without nesting.
    pub conflict: bool,
    /// The marker was removed on purpose; the node only waits for pruning.
    pub retired: bool,
    /// Insert marks were added around inserted text and still need cleaning up.
    pub has_insert_marks: bool,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

impl CommandNode {
    pub fn new(
        marker: String,
        range: Box<dyn AnchoredRange>,
        descriptor: CommandDescriptor,
    ) -> CommandNode {
        let status = descriptor.persisted;
        CommandNode {
            marker: Some(marker),
            range: Some(range),
            descriptor: Some(descriptor),
            status,
            conflict: false,
            retired: false,
            has_insert_marks: false,
            parent: None,
            children: Vec::new(),
        }
    }

    pub(crate) fn root() -> CommandNode {
        CommandNode {
            marker: None,
            range: None,
            descriptor: None,
            status: CommandStatus::default(),
            conflict: false,
            retired: false,
            has_insert_marks: false,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn marker(&self) -> Option<&str> {
        self.marker.as_deref()
    }

    pub fn range(&self) -> Option<&dyn AnchoredRange> {
        self.range.as_deref()
    }

    pub fn span(&self) -> Option<TextSpan> {
        self.range.as_ref().and_then(|r| r.span())
    }

    pub fn descriptor(&self) -> Option<&CommandDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn kind(&self) -> Option<&CommandKind> {
        self.descriptor.as_ref().map(|d| &d.kind)
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_root(&self) -> bool {
        self.descriptor.is_none()
    }

    /// Invalid and conflicting nodes are reported, never executed.
    pub fn is_invalid(&self) -> bool {
        self.conflict || self.kind().is_some_and(|k| k.is_invalid())
    }

    /// The status as it would be written back to the marker.
    pub fn persisted(&self) -> CommandStatus {
        self.descriptor
            .as_ref()
            .map(|d| d.persisted)
            .unwrap_or_default()
    }

    /// Swaps the marker name and range after the host renamed the marker.
    pub(crate) fn rebind(&mut self, marker: String, range: Option<Box<dyn AnchoredRange>>) {
        if let Some(old) = self.range.take() {
            old.dispose();
        }
        self.marker = Some(marker);
        self.range = range;
    }

    /// Records that the current status has been written to the marker.
    pub(crate) fn mark_persisted(&mut self) {
        if let Some(descriptor) = self.descriptor.as_mut() {
            descriptor.persisted = self.status;
        }
    }

    pub(crate) fn release(&mut self) {
        if let Some(range) = self.range.take() {
            range.dispose();
        }
    }
}

impl fmt::Display for CommandNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(kind) = self.kind() else {
            return write!(f, "<root>");
        };
        write!(f, "{kind}")?;
        match self.span() {
            Some(span) => write!(f, " {span}")?,
            None => write!(f, " <gone>")?,
        }
        write!(f, " [{}]", self.status)?;
        if self.conflict {
            write!(f, " CONFLICT")?;
        }
        Ok(())
    }
}
