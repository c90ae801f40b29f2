//! The host document surface.
//!
//! The host owns the text and the named markers; this crate only ever talks to it through
//! [`HostDocument`] and the [`AnchoredRange`] handles it hands out. Every call may find that the
//! addressed marker or range no longer exists (users edit concurrently), so lookups return
//! `Option` and mutations report [`DocCmdError::NotFound`].
//!
//! [`memory::MemoryDocument`] is a complete in-process implementation used by the tests, the
//! bench and the `doccmd` binary.

use std::{cmp::Ordering, fmt};

use crate::{error::DocCmdError, relation::TextSpan};

pub mod memory;

pub use memory::{MemoryDocument, MemoryRange};

/// A live handle onto a span of text owned by the host.
///
/// The span follows edits made through any handle of the same document. A disposed range (or one
/// whose text was deleted out-of-band) yields no span and no comparisons.
pub trait AnchoredRange: Send + Sync + fmt::Debug {
    /// The current span, `None` once the range is gone.
    fn span(&self) -> Option<TextSpan>;

    /// Orders the starts of two ranges of the same flow; `None` when incomparable.
    fn compare_starts(&self, other: &dyn AnchoredRange) -> Option<Ordering> {
        let (a, b) = (self.span()?, other.span()?);
        (a.flow == b.flow).then(|| a.start.cmp(&b.start))
    }

    /// Orders the ends of two ranges of the same flow; `None` when incomparable.
    fn compare_ends(&self, other: &dyn AnchoredRange) -> Option<Ordering> {
        let (a, b) = (self.span()?, other.span()?);
        (a.flow == b.flow).then(|| a.end.cmp(&b.end))
    }

    /// Orders this range's end against the start of `other`; `None` when incomparable.
    fn compare_end_to_start(&self, other: &dyn AnchoredRange) -> Option<Ordering> {
        let (a, b) = (self.span()?, other.span()?);
        (a.flow == b.flow).then(|| a.end.cmp(&b.start))
    }

    fn text(&self) -> Option<String>;

    /// Replaces the covered text. Afterwards the range spans exactly the new text.
    fn replace_text(&self, text: &str) -> Result<(), DocCmdError>;

    /// Releases the handle. Markers anchored on the same text are not affected.
    fn dispose(&self);

    fn is_disposed(&self) -> bool {
        self.span().is_none()
    }
}

/// The marker-bearing document a command tree is built from.
pub trait HostDocument: Send {
    /// All marker names currently present, in no particular order.
    fn marker_names(&self) -> Vec<String>;

    /// A fresh handle on the range the named marker is bound to.
    fn resolve(&self, name: &str) -> Option<Box<dyn AnchoredRange>>;

    /// Binds a new marker to the given range. The host may disambiguate a colliding name; the
    /// returned name is the one actually stored.
    fn create_marker(&mut self, name: &str, range: &dyn AnchoredRange)
        -> Result<String, DocCmdError>;

    fn remove_marker(&mut self, name: &str) -> Result<(), DocCmdError>;

    /// A handle on the part of `range` between the two character offsets relative to its start.
    fn range_within(
        &self,
        range: &dyn AnchoredRange,
        start: usize,
        end: usize,
    ) -> Option<Box<dyn AnchoredRange>>;

    /// Renames a marker by re-creating it on the same range. Returns the name actually stored.
    fn rename_marker(&mut self, old: &str, new: &str) -> Result<String, DocCmdError> {
        let range = self
            .resolve(old)
            .ok_or_else(|| DocCmdError::NotFound(format!("marker '{old}'")))?;
        let actual = self.create_marker(new, range.as_ref());
        range.dispose();
        let actual = actual?;
        self.remove_marker(old)?;
        Ok(actual)
    }
}

impl<T: HostDocument + ?Sized> HostDocument for Box<T> {
    fn marker_names(&self) -> Vec<String> {
        (**self).marker_names()
    }

    fn resolve(&self, name: &str) -> Option<Box<dyn AnchoredRange>> {
        (**self).resolve(name)
    }

    fn create_marker(
        &mut self,
        name: &str,
        range: &dyn AnchoredRange,
    ) -> Result<String, DocCmdError> {
        (**self).create_marker(name, range)
    }

    fn remove_marker(&mut self, name: &str) -> Result<(), DocCmdError> {
        (**self).remove_marker(name)
    }

    fn range_within(
        &self,
        range: &dyn AnchoredRange,
        start: usize,
        end: usize,
    ) -> Option<Box<dyn AnchoredRange>> {
        (**self).range_within(range, start, end)
    }

    fn rename_marker(&mut self, old: &str, new: &str) -> Result<String, DocCmdError> {
        (**self).rename_marker(old, new)
    }
}
