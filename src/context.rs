//! Per-document state.
//!
//! A [`DocumentContext`] is created when a document is opened and handed to the
//! [`Engine`](crate::engine::Engine) worker, which owns it until the document is closed. It
//! bundles the host document, the command tree, the scanner's known-name set, the collected form
//! sections and the configuration source. The passes below are what the standard
//! [operations](crate::ops::Op) run.

use serde::{Deserialize, Serialize};
use std::{fmt, sync::mpsc::Sender, sync::Arc};

use crate::{
    command::{check, clean_up, execute_within, replaces_text, ExecEnv, FormState},
    config::{ConfigProvider, DocumentConfig, Settings},
    error::DocCmdError,
    event::{emit, Event},
    host::HostDocument,
    scanner::{DocumentScanner, ScanReport},
    tree::{CommandTree, NodeId},
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    pub executed: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub renamed: usize,
    pub removed: usize,
    pub vanished: usize,
}

pub struct DocumentContext {
    pub(crate) host: Box<dyn HostDocument>,
    pub(crate) tree: CommandTree,
    pub(crate) scanner: DocumentScanner,
    pub(crate) form: FormState,
    config: Arc<dyn ConfigProvider>,
    events: Option<Sender<Event>>,
}

impl fmt::Debug for DocumentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentContext")
            .field("nodes", &self.tree.len())
            .field("known", &self.scanner.known_count())
            .field("form", &self.form)
            .finish()
    }
}

impl DocumentContext {
    pub fn new(host: Box<dyn HostDocument>, config: Arc<dyn ConfigProvider>) -> Self {
        DocumentContext {
            host,
            tree: CommandTree::new(),
            scanner: DocumentScanner::new(),
            form: FormState::default(),
            config,
            events: None,
        }
    }

    pub fn with_events(mut self, tx: Sender<Event>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn host(&self) -> &dyn HostDocument {
        self.host.as_ref()
    }

    pub fn tree(&self) -> &CommandTree {
        &self.tree
    }

    pub fn scanner(&self) -> &DocumentScanner {
        &self.scanner
    }

    pub fn form(&self) -> &FormState {
        &self.form
    }

    pub fn events(&self) -> Option<&Sender<Event>> {
        self.events.as_ref()
    }

    pub fn emit(&self, event: Event) {
        emit(self.events.as_ref(), event)
    }

    pub fn config(&self) -> Result<DocumentConfig, DocCmdError> {
        self.config.get_config()
    }

    pub fn scan(&mut self) -> ScanReport {
        self.scanner
            .scan(self.host.as_ref(), &mut self.tree, self.events.as_ref())
    }

    /// Removes the markers of everything below `id`; that text is about to be overwritten.
    fn retire_descendants(&mut self, id: NodeId) {
        for child in self.tree.descendants(id) {
            let Some(node) = self.tree.get_mut(child) else {
                continue;
            };
            if node.retired {
                continue;
            }
            node.retired = true;
            node.release();
            if let Some(marker) = node.marker.clone() {
                if let Err(e) = self.host.remove_marker(&marker) {
                    tracing::debug!("Marker '{marker}' already gone: {e}");
                }
                self.scanner.forget(&marker);
                emit(self.events.as_ref(), Event::MarkerRemoved(marker));
            }
        }
    }

    /// Executes every node that is neither done nor failed, in document order.
    #[tracing::instrument(skip_all)]
    pub fn execute_pass(&mut self, config: &DocumentConfig) -> PassReport {
        let mut report = PassReport::default();
        for id in self.tree.dfs() {
            let Some(node) = self.tree.get_mut(id) else {
                continue;
            };
            if !node.retired && node.span().is_none() {
                tracing::debug!("Marker of {id} is gone, retiring the command");
                node.retired = true;
                if let Some(marker) = node.marker() {
                    self.scanner.forget(marker);
                }
            }
            if node.retired || node.status.is_settled() {
                report.skipped += 1;
                continue;
            }
            let checked = match node.kind() {
                Some(kind) if !node.conflict => check(kind, config),
                _ => Ok(()),
            };
            if checked.is_ok() && node.kind().is_some_and(replaces_text) {
                self.retire_descendants(id);
            }
            let Some(node) = self.tree.get_mut(id) else {
                continue;
            };
            let mut env = ExecEnv {
                host: self.host.as_mut(),
                config,
                form: &mut self.form,
            };
            let marker = node.marker().unwrap_or_default().to_string();
            match checked.and_then(|()| execute_within(node, &mut env)) {
                Ok(()) => {
                    node.status.done = true;
                    report.executed += 1;
                    tracing::debug!("Executed {node}");
                    emit(self.events.as_ref(), Event::CommandExecuted(marker));
                }
                Err(e) => {
                    node.status.errors += 1;
                    report.failed += 1;
                    tracing::warn!("Command '{marker}' failed: {e}");
                    emit(self.events.as_ref(), Event::CommandFailed(marker, e.to_string()));
                }
            }
        }
        report
    }

    /// Removes insert marks, visiting siblings right to left.
    #[tracing::instrument(skip_all)]
    pub fn clean_up(&mut self) -> usize {
        let mut cleaned = 0;
        for id in self.tree.dfs_rev() {
            let Some(node) = self.tree.get_mut(id) else {
                continue;
            };
            if node.retired {
                continue;
            }
            match clean_up(node, self.host.as_ref()) {
                Ok(true) => cleaned += 1,
                Ok(false) => {}
                Err(e) => tracing::debug!("Clean-up of {id} skipped: {e}"),
            }
        }
        cleaned
    }

    /// Writes each node's status back into its marker. Finished commands lose their marker
    /// unless `settings.debug` is set. Nodes whose marker already records their status are left
    /// alone.
    #[tracing::instrument(skip_all)]
    pub fn sync_markers(&mut self, settings: &Settings) -> SyncReport {
        let mut report = SyncReport::default();
        for id in self.tree.dfs() {
            let Some(node) = self.tree.get_mut(id) else {
                continue;
            };
            let Some(old) = node.marker.clone() else {
                continue;
            };
            if node.retired {
                continue;
            }
            let status = node.status;
            if status.done && status.errors == 0 && !settings.debug {
                node.retired = true;
                node.release();
                match self.host.remove_marker(&old) {
                    Ok(()) => {
                        report.removed += 1;
                        emit(self.events.as_ref(), Event::MarkerRemoved(old.clone()));
                    }
                    Err(e) => {
                        report.vanished += 1;
                        tracing::debug!("Marker '{old}' already gone: {e}");
                    }
                }
                self.scanner.forget(&old);
                continue;
            }
            if status == node.persisted() {
                continue;
            }
            let Some(new) = node.descriptor().and_then(|d| d.marker_name(status)) else {
                continue;
            };
            match self.host.rename_marker(&old, &new) {
                Ok(actual) => {
                    if actual != new {
                        tracing::debug!("Host stored '{new}' as '{actual}'");
                    }
                    self.scanner.rename(&old, &actual);
                    let range = self.host.resolve(&actual);
                    node.rebind(actual.clone(), range);
                    node.mark_persisted();
                    report.renamed += 1;
                    emit(self.events.as_ref(), Event::MarkerRenamed(old, actual));
                }
                Err(e) if e.is_gone() => {
                    tracing::debug!("Marker '{old}' vanished before resync");
                    node.retired = true;
                    node.release();
                    self.scanner.forget(&old);
                    report.vanished += 1;
                }
                Err(e) => tracing::warn!("Could not rename marker '{old}': {e}"),
            }
        }
        report
    }

    pub fn prune_retired(&mut self) -> usize {
        self.tree.prune_retired()
    }

    /// Forgets the tree, the known names and the collected form, as on document close.
    pub fn reset(&mut self) {
        self.tree.clear();
        self.scanner.clear();
        self.form.clear();
    }
}
