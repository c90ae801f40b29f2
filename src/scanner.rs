//! Incremental discovery of command markers.
//!
//! The scanner remembers every marker name it has looked at. Repeated scans only consider names
//! they have not seen, so calling [`DocumentScanner::scan`] after every document change is cheap
//! and never duplicates nodes. Renames made by this crate are reported back through
//! [`DocumentScanner::rename`] so the renamed marker is not taken for a new one.

use serde::{Deserialize, Serialize};
use std::{collections::HashSet, sync::mpsc::Sender};

use crate::{
    descriptor::parse_marker,
    event::{emit, Event},
    host::HostDocument,
    tree::{CommandNode, CommandTree},
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Nodes inserted into the tree.
    pub added: usize,
    /// New marker names that are not commands.
    pub ignored: usize,
    /// New marker names that disappeared before they could be resolved.
    pub vanished: usize,
    /// Overlaps found while inserting.
    pub conflicts: usize,
}

impl ScanReport {
    pub fn merge(&mut self, other: ScanReport) {
        self.added += other.added;
        self.ignored += other.ignored;
        self.vanished += other.vanished;
        self.conflicts += other.conflicts;
    }
}

#[derive(Debug, Default)]
pub struct DocumentScanner {
    known: HashSet<String>,
}

impl DocumentScanner {
    pub fn new() -> Self {
        DocumentScanner::default()
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.known.contains(name)
    }

    pub fn known_count(&self) -> usize {
        self.known.len()
    }

    /// Inserts a node for every command marker not seen before.
    #[tracing::instrument(skip_all)]
    pub fn scan(
        &mut self,
        host: &dyn HostDocument,
        tree: &mut CommandTree,
        events: Option<&Sender<Event>>,
    ) -> ScanReport {
        let mut report = ScanReport::default();
        for name in host.marker_names() {
            if !self.known.insert(name.clone()) {
                continue;
            }
            let Some(descriptor) = parse_marker(&name) else {
                report.ignored += 1;
                continue;
            };
            let Some(range) = host.resolve(&name) else {
                tracing::debug!("Marker '{name}' vanished before it could be resolved");
                report.vanished += 1;
                continue;
            };
            let kind = descriptor.kind.label().to_string();
            let outcome = tree.insert(CommandNode::new(name.clone(), range, descriptor));
            report.added += 1;
            if outcome.conflicts > 0 {
                tracing::warn!(
                    "Marker '{name}' overlaps {} other marker(s)",
                    outcome.conflicts
                );
                report.conflicts += outcome.conflicts;
                emit(events, Event::Conflict(name.clone(), outcome.conflicts));
            }
            emit(events, Event::NodeAdded(name, kind));
        }
        if report.added > 0 {
            tracing::debug!(
                "Scan added {} node(s), ignored {}, {} vanished, {} conflict(s)",
                report.added,
                report.ignored,
                report.vanished,
                report.conflicts
            );
        }
        report
    }

    /// Records that `old` now lives on as `new`.
    pub fn rename(&mut self, old: &str, new: &str) {
        self.known.remove(old);
        self.known.insert(new.to_string());
    }

    pub fn forget(&mut self, name: &str) {
        self.known.remove(name);
    }

    pub fn clear(&mut self) {
        self.known.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{host::MemoryDocument, relation::FlowId};
    use std::sync::mpsc::channel;

    #[test]
    fn test_scan_is_incremental() {
        let doc = MemoryDocument::new("Dear NAME, see ATTACHMENT.");
        doc.add_marker("CMD(KIND 'insertValue' ID 'name')", FlowId(0), 5, 9)
            .unwrap();
        doc.add_marker("plain bookmark", FlowId(0), 0, 4).unwrap();
        let (tx, rx) = channel();
        let mut scanner = DocumentScanner::new();
        let mut tree = CommandTree::new();

        let report = scanner.scan(&doc, &mut tree, Some(&tx));
        assert_eq!(report.added, 1);
        assert_eq!(report.ignored, 1);
        assert_eq!(tree.len(), 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            Event::NodeAdded(
                "CMD(KIND 'insertValue' ID 'name')".to_string(),
                "insertValue".to_string()
            )
        );

        let again = scanner.scan(&doc, &mut tree, Some(&tx));
        assert_eq!(again, ScanReport::default());
        assert_eq!(tree.len(), 1);

        doc.add_marker("CMD(KIND 'insertContent')", FlowId(0), 15, 25)
            .unwrap();
        let third = scanner.scan(&doc, &mut tree, None);
        assert_eq!(third.added, 1);
        assert_eq!(tree.len(), 2);
        assert_eq!(scanner.known_count(), 3);
    }

    #[test]
    fn test_scan_reports_conflicts() {
        let doc = MemoryDocument::new("0123456789");
        doc.add_marker("CMD(KIND 'insertContent')", FlowId(0), 0, 5)
            .unwrap();
        doc.add_marker("CMD(KIND 'insertContent')", FlowId(0), 3, 8)
            .unwrap();
        let mut scanner = DocumentScanner::new();
        let mut tree = CommandTree::new();
        let report = scanner.scan(&doc, &mut tree, None);
        assert_eq!(report.added, 2);
        assert_eq!(report.conflicts, 1);
    }

    #[test]
    fn test_renamed_names_are_not_rediscovered() {
        let mut doc = MemoryDocument::new("0123456789");
        doc.add_marker("CMD(KIND 'insertContent')", FlowId(0), 0, 5)
            .unwrap();
        let mut scanner = DocumentScanner::new();
        let mut tree = CommandTree::new();
        scanner.scan(&doc, &mut tree, None);

        let actual = doc
            .rename_marker("CMD(KIND 'insertContent')", "CMD(KIND 'insertContent' STATE(DONE 'true'))")
            .unwrap();
        scanner.rename("CMD(KIND 'insertContent')", &actual);
        assert_eq!(scanner.scan(&doc, &mut tree, None).added, 0);
        assert_eq!(tree.len(), 1);

        scanner.forget(&actual);
        assert_eq!(scanner.scan(&doc, &mut tree, None).added, 1);
    }
}
