//! In-memory host document.
//!
//! Text is kept per flow as characters; every range handle and every marker points at a slot
//! whose span is remapped on each edit:
//!
//! - boundaries before the edited region are unchanged,
//! - boundaries after it are shifted by the length delta,
//! - boundaries inside it collapse onto the end of the new text,
//! - ranges equal to the edited region span exactly the new text afterwards.
//!
//! Handles returned by [`HostDocument::resolve`] share the marker's slot, so removing the marker
//! (also out-of-band through [`MemoryDocument::delete_marker`]) invalidates them.

use parking_lot::Mutex;
use serde::Deserialize;
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering as AtomicOrdering},
        Arc,
    },
};

use crate::{
    error::DocCmdError,
    host::{AnchoredRange, HostDocument},
    relation::{FlowId, TextSpan},
};

type SlotId = u64;

/// Information about a single edit operation.
struct EditInfo {
    flow: FlowId,
    start: usize,
    old_end: usize,
    new_end: usize,
}

impl EditInfo {
    fn delta(&self) -> i64 {
        self.new_end as i64 - self.old_end as i64
    }

    fn remap(&self, span: TextSpan) -> TextSpan {
        if span.flow != self.flow {
            return span;
        }
        if span.start == self.start && span.end == self.old_end {
            return TextSpan::new(span.flow, self.start, self.new_end);
        }
        let start = if span.start < self.start
            || (span.start == self.start && self.start < self.old_end)
        {
            span.start
        } else if span.start >= self.old_end {
            apply_delta(span.start, self.delta())
        } else {
            self.new_end
        };
        let end = if span.end <= self.start {
            span.end
        } else if span.end >= self.old_end {
            apply_delta(span.end, self.delta())
        } else {
            self.new_end
        };
        TextSpan::new(span.flow, start, end.max(start))
    }
}

/// Apply a signed delta to a position, clamping at zero.
fn apply_delta(position: usize, delta: i64) -> usize {
    (position as i64).saturating_add(delta).max(0) as usize
}

#[derive(Debug, Default)]
struct DocState {
    flows: Vec<Vec<char>>,
    slots: HashMap<SlotId, TextSpan>,
    markers: BTreeMap<String, SlotId>,
    next_slot: SlotId,
}

impl DocState {
    fn new_slot(&mut self, span: TextSpan) -> SlotId {
        let id = self.next_slot;
        self.next_slot += 1;
        self.slots.insert(id, span);
        id
    }

    fn flow_len(&self, flow: FlowId) -> Option<usize> {
        self.flows.get(flow.0 as usize).map(|chars| chars.len())
    }

    fn check_span(&self, span: &TextSpan) -> Result<(), DocCmdError> {
        match self.flow_len(span.flow) {
            Some(len) if span.start <= span.end && span.end <= len => Ok(()),
            Some(len) => Err(DocCmdError::Host(format!(
                "span {span} outside of flow with {len} characters"
            ))),
            None => Err(DocCmdError::NotFound(format!("{}", span.flow))),
        }
    }

    fn apply_edit(&mut self, span: TextSpan, text: &str) -> Result<TextSpan, DocCmdError> {
        self.check_span(&span)?;
        let new_chars: Vec<char> = text.chars().collect();
        let edit = EditInfo {
            flow: span.flow,
            start: span.start,
            old_end: span.end,
            new_end: span.start + new_chars.len(),
        };
        if let Some(chars) = self.flows.get_mut(span.flow.0 as usize) {
            chars.splice(span.start..span.end, new_chars);
        }
        for slot in self.slots.values_mut() {
            *slot = edit.remap(*slot);
        }
        Ok(TextSpan::new(span.flow, edit.start, edit.new_end))
    }

    fn disambiguate(&self, name: &str) -> String {
        if !self.markers.contains_key(name) {
            return name.to_string();
        }
        (2..)
            .map(|n| format!("{name} {n}"))
            .find(|candidate| !self.markers.contains_key(candidate))
            .unwrap_or_else(|| name.to_string())
    }
}

/// A handle onto a slot of a [`MemoryDocument`].
pub struct MemoryRange {
    state: Arc<Mutex<DocState>>,
    slot: SlotId,
    // Handles created by `range`/`range_within` own their slot; marker handles share it.
    owned: bool,
    released: AtomicBool,
}

impl MemoryRange {
    fn new(state: Arc<Mutex<DocState>>, slot: SlotId, owned: bool) -> Self {
        MemoryRange {
            state,
            slot,
            owned,
            released: AtomicBool::new(false),
        }
    }
}

impl fmt::Debug for MemoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span() {
            Some(span) => write!(f, "MemoryRange({span})"),
            None => write!(f, "MemoryRange(<gone>)"),
        }
    }
}

impl AnchoredRange for MemoryRange {
    fn span(&self) -> Option<TextSpan> {
        if self.released.load(AtomicOrdering::Acquire) {
            return None;
        }
        self.state.lock().slots.get(&self.slot).copied()
    }

    fn text(&self) -> Option<String> {
        if self.released.load(AtomicOrdering::Acquire) {
            return None;
        }
        let state = self.state.lock();
        let span = state.slots.get(&self.slot)?;
        let chars = state.flows.get(span.flow.0 as usize)?;
        chars
            .get(span.start..span.end)
            .map(|slice| slice.iter().collect())
    }

    fn replace_text(&self, text: &str) -> Result<(), DocCmdError> {
        if self.released.load(AtomicOrdering::Acquire) {
            return Err(DocCmdError::NotFound("disposed range".to_string()));
        }
        let mut state = self.state.lock();
        let span = state
            .slots
            .get(&self.slot)
            .copied()
            .ok_or_else(|| DocCmdError::NotFound("range no longer exists".to_string()))?;
        let new_span = state.apply_edit(span, text)?;
        state.slots.insert(self.slot, new_span);
        Ok(())
    }

    fn dispose(&self) {
        if self.released.swap(true, AtomicOrdering::AcqRel) {
            return;
        }
        if self.owned {
            self.state.lock().slots.remove(&self.slot);
        }
    }
}

impl Drop for MemoryRange {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// A marker as listed in a document fixture.
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureMarker {
    pub name: String,
    #[serde(default)]
    pub flow: u32,
    pub start: usize,
    pub end: usize,
}

/// TOML description of a document: the body text, optional further flows and the markers.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentFixture {
    pub text: String,
    #[serde(default)]
    pub flows: Vec<String>,
    #[serde(default)]
    pub markers: Vec<FixtureMarker>,
}

/// Shared, cloneable in-memory document. Clones address the same text and markers.
#[derive(Clone, Default)]
pub struct MemoryDocument {
    state: Arc<Mutex<DocState>>,
}

impl fmt::Debug for MemoryDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryDocument")
            .field("flows", &state.flows.len())
            .field("markers", &state.markers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MemoryDocument {
    /// A document whose body text is flow 0.
    pub fn new(text: &str) -> Self {
        let doc = MemoryDocument::default();
        doc.add_flow(text);
        doc
    }

    pub fn from_fixture(fixture: &DocumentFixture) -> Result<Self, DocCmdError> {
        let doc = MemoryDocument::new(&fixture.text);
        for flow in fixture.flows.iter() {
            doc.add_flow(flow);
        }
        for marker in fixture.markers.iter() {
            doc.add_marker(&marker.name, FlowId(marker.flow), marker.start, marker.end)?;
        }
        Ok(doc)
    }

    pub fn from_fixture_str(content: &str) -> Result<Self, DocCmdError> {
        let fixture: DocumentFixture = toml::from_str(content)?;
        MemoryDocument::from_fixture(&fixture)
    }

    pub fn load_fixture<P: AsRef<Path>>(path: P) -> Result<Self, DocCmdError> {
        tracing::debug!("Reading document fixture {:?}", path.as_ref());
        let content = std::fs::read_to_string(path)?;
        MemoryDocument::from_fixture_str(&content)
    }

    /// Adds another text flow (a frame, a table cell ...) and returns its id.
    pub fn add_flow(&self, text: &str) -> FlowId {
        let mut state = self.state.lock();
        state.flows.push(text.chars().collect());
        FlowId((state.flows.len() - 1) as u32)
    }

    /// Adds a marker over `[start, end]` of `flow`. Returns the name actually stored.
    pub fn add_marker(
        &self,
        name: &str,
        flow: FlowId,
        start: usize,
        end: usize,
    ) -> Result<String, DocCmdError> {
        let mut state = self.state.lock();
        let span = TextSpan { flow, start, end };
        state.check_span(&span)?;
        let actual = state.disambiguate(name);
        let slot = state.new_slot(span);
        state.markers.insert(actual.clone(), slot);
        Ok(actual)
    }

    /// An owned range handle on `[start, end]` of `flow`.
    pub fn range(&self, flow: FlowId, start: usize, end: usize) -> Option<MemoryRange> {
        let mut state = self.state.lock();
        let span = TextSpan { flow, start, end };
        state.check_span(&span).ok()?;
        let slot = state.new_slot(span);
        Some(MemoryRange::new(self.state.clone(), slot, true))
    }

    pub fn text(&self, flow: FlowId) -> Option<String> {
        let state = self.state.lock();
        state
            .flows
            .get(flow.0 as usize)
            .map(|chars| chars.iter().collect())
    }

    /// The body text (flow 0).
    pub fn body(&self) -> String {
        self.text(FlowId(0)).unwrap_or_default()
    }

    /// Replaces `[start, end]` of `flow`, as a user typing would.
    pub fn edit(&self, flow: FlowId, start: usize, end: usize, text: &str) -> Result<(), DocCmdError> {
        let mut state = self.state.lock();
        state.apply_edit(TextSpan { flow, start, end }, text)?;
        Ok(())
    }

    /// Removes a marker behind the back of any command tree, as a user deleting a bookmark would.
    pub fn delete_marker(&self, name: &str) -> bool {
        let mut state = self.state.lock();
        match state.markers.remove(name) {
            Some(slot) => {
                state.slots.remove(&slot);
                true
            }
            None => false,
        }
    }

    pub fn marker_span(&self, name: &str) -> Option<TextSpan> {
        let state = self.state.lock();
        state
            .markers
            .get(name)
            .and_then(|slot| state.slots.get(slot))
            .copied()
    }

    /// The text currently covered by the named marker.
    pub fn marker_text(&self, name: &str) -> Option<String> {
        let span = self.marker_span(name)?;
        let state = self.state.lock();
        state
            .flows
            .get(span.flow.0 as usize)?
            .get(span.start..span.end)
            .map(|slice| slice.iter().collect())
    }

    pub fn marker_count(&self) -> usize {
        self.state.lock().markers.len()
    }
}

impl HostDocument for MemoryDocument {
    fn marker_names(&self) -> Vec<String> {
        self.state.lock().markers.keys().cloned().collect()
    }

    fn resolve(&self, name: &str) -> Option<Box<dyn AnchoredRange>> {
        let slot = *self.state.lock().markers.get(name)?;
        Some(Box::new(MemoryRange::new(self.state.clone(), slot, false)))
    }

    fn create_marker(
        &mut self,
        name: &str,
        range: &dyn AnchoredRange,
    ) -> Result<String, DocCmdError> {
        let span = range
            .span()
            .ok_or_else(|| DocCmdError::NotFound(format!("range for marker '{name}'")))?;
        self.add_marker(name, span.flow, span.start, span.end)
    }

    fn remove_marker(&mut self, name: &str) -> Result<(), DocCmdError> {
        if self.delete_marker(name) {
            Ok(())
        } else {
            Err(DocCmdError::NotFound(format!("marker '{name}'")))
        }
    }

    fn range_within(
        &self,
        range: &dyn AnchoredRange,
        start: usize,
        end: usize,
    ) -> Option<Box<dyn AnchoredRange>> {
        let span = range.span()?;
        if start > end || span.start + end > span.end {
            return None;
        }
        self.range(span.flow, span.start + start, span.start + end)
            .map(|r| Box::new(r) as Box<dyn AnchoredRange>)
    }

    fn rename_marker(&mut self, old: &str, new: &str) -> Result<String, DocCmdError> {
        let mut state = self.state.lock();
        let slot = state
            .markers
            .remove(old)
            .ok_or_else(|| DocCmdError::NotFound(format!("marker '{old}'")))?;
        let actual = state.disambiguate(new);
        state.markers.insert(actual.clone(), slot);
        Ok(actual)
    }
}
