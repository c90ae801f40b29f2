//! Interval relations between two anchored ranges of the same text flow.
//!
//! Two ranges `a` and `b` are compared boundary by boundary: the sign of the start comparison and
//! the sign of the end comparison give a code `3 * start + end` in `-4..=4`. A positive sign means
//! "a comes first". When both signs agree the leading range's end is additionally compared with the
//! trailing range's start, which separates the disjoint orderings from partial overlaps.
//!
//! ```text
//! code  relation                     picture (A = only a, B = only b, 8 = both)
//!  -4   BThenA                       BBAA
//!  -3   BStartsBeforeAEndsWithA      BB88
//!  -2   BContainsA                   B88B   (also 88B: same start, b longer)
//!  -1   OverlapBLeads                BB88AA
//!   0   Equal                        8888
//!   1   OverlapALeads                AA88BB
//!   2   AContainsB                   A88A   (also 88A: same start, a longer)
//!   3   AStartsBeforeBEndsWithB      AA88
//!   4   AThenB                       AABB
//! ```
//!
//! Swapping the arguments always yields the mirrored relation, whose code is the negated code.

use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt};

use crate::host::AnchoredRange;

/// Identifies one text flow (body text, a frame, a table cell ...) of a host document. Ranges
/// of different flows are never comparable.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowId(pub u32);

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flow#{}", self.0)
    }
}

/// The current extent of an anchored range, in characters from the start of its flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextSpan {
    pub flow: FlowId,
    pub start: usize,
    pub end: usize,
}

impl TextSpan {
    pub fn new(flow: FlowId, start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "span start {start} after end {end}");
        TextSpan { flow, start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for TextSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{},{}]", self.flow, self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RangeRelation {
    BThenA,
    BStartsBeforeAEndsWithA,
    BContainsA,
    OverlapBLeads,
    Equal,
    OverlapALeads,
    AContainsB,
    AStartsBeforeBEndsWithB,
    AThenB,
}

impl RangeRelation {
    pub fn code(self) -> i8 {
        match self {
            RangeRelation::BThenA => -4,
            RangeRelation::BStartsBeforeAEndsWithA => -3,
            RangeRelation::BContainsA => -2,
            RangeRelation::OverlapBLeads => -1,
            RangeRelation::Equal => 0,
            RangeRelation::OverlapALeads => 1,
            RangeRelation::AContainsB => 2,
            RangeRelation::AStartsBeforeBEndsWithB => 3,
            RangeRelation::AThenB => 4,
        }
    }

    pub fn from_code(code: i8) -> Option<RangeRelation> {
        match code {
            -4 => Some(RangeRelation::BThenA),
            -3 => Some(RangeRelation::BStartsBeforeAEndsWithA),
            -2 => Some(RangeRelation::BContainsA),
            -1 => Some(RangeRelation::OverlapBLeads),
            0 => Some(RangeRelation::Equal),
            1 => Some(RangeRelation::OverlapALeads),
            2 => Some(RangeRelation::AContainsB),
            3 => Some(RangeRelation::AStartsBeforeBEndsWithB),
            4 => Some(RangeRelation::AThenB),
            _ => None,
        }
    }

    /// The relation seen from the other range: `classify(b, a) == classify(a, b).mirror()`.
    pub fn mirror(self) -> RangeRelation {
        match self {
            RangeRelation::BThenA => RangeRelation::AThenB,
            RangeRelation::BStartsBeforeAEndsWithA => RangeRelation::AStartsBeforeBEndsWithB,
            RangeRelation::BContainsA => RangeRelation::AContainsB,
            RangeRelation::OverlapBLeads => RangeRelation::OverlapALeads,
            RangeRelation::Equal => RangeRelation::Equal,
            RangeRelation::OverlapALeads => RangeRelation::OverlapBLeads,
            RangeRelation::AContainsB => RangeRelation::BContainsA,
            RangeRelation::AStartsBeforeBEndsWithB => RangeRelation::BStartsBeforeAEndsWithA,
            RangeRelation::AThenB => RangeRelation::BThenA,
        }
    }

    /// Partial overlap, neither disjoint nor nested.
    pub fn is_conflict(self) -> bool {
        matches!(
            self,
            RangeRelation::OverlapALeads | RangeRelation::OverlapBLeads
        )
    }

    /// `b` lies within `a` and is strictly smaller.
    pub fn a_contains_b(self) -> bool {
        matches!(
            self,
            RangeRelation::AContainsB | RangeRelation::AStartsBeforeBEndsWithB
        )
    }

    /// `a` lies within `b` and is strictly smaller.
    pub fn b_contains_a(self) -> bool {
        matches!(
            self,
            RangeRelation::BContainsA | RangeRelation::BStartsBeforeAEndsWithA
        )
    }

    pub fn is_disjoint(self) -> bool {
        matches!(self, RangeRelation::AThenB | RangeRelation::BThenA)
    }

    /// True when `a` sorts before `b` among siblings: it precedes `b` or encloses it.
    pub fn a_less_than_b(self) -> bool {
        self == RangeRelation::AThenB || self.a_contains_b()
    }

    /// True when `a` sorts after `b` among siblings: it follows `b` or is enclosed by it.
    pub fn a_greater_than_b(self) -> bool {
        self == RangeRelation::BThenA || self.b_contains_a()
    }
}

impl fmt::Display for RangeRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RangeRelation::BThenA => "b-then-a-disjoint",
            RangeRelation::BStartsBeforeAEndsWithA => "b-starts-before-a-ends-with-a",
            RangeRelation::BContainsA => "b-contains-a",
            RangeRelation::OverlapBLeads => "overlap-b-leads",
            RangeRelation::Equal => "equal",
            RangeRelation::OverlapALeads => "overlap-a-leads",
            RangeRelation::AContainsB => "a-contains-b",
            RangeRelation::AStartsBeforeBEndsWithB => "a-starts-before-b-ends-with-b",
            RangeRelation::AThenB => "a-then-b-disjoint",
        };
        write!(f, "{name}")
    }
}

/// +1 when the boundary of `a` comes first, -1 when the one of `b` does.
fn lead_sign(order: Ordering) -> i8 {
    match order {
        Ordering::Less => 1,
        Ordering::Equal => 0,
        Ordering::Greater => -1,
    }
}

/// Maps the two boundary signs to a relation. `a_then_b` and `b_then_a` tell, when both signs
/// agree, whether the leading range ends before the trailing one starts.
fn refine(
    start: i8,
    end: i8,
    a_then_b: impl FnOnce() -> Option<bool>,
    b_then_a: impl FnOnce() -> Option<bool>,
) -> Option<RangeRelation> {
    let relation = match 3 * start + end {
        4 if a_then_b()? => RangeRelation::AThenB,
        4 => RangeRelation::OverlapALeads,
        3 => RangeRelation::AStartsBeforeBEndsWithB,
        2 | -1 => RangeRelation::AContainsB,
        0 => RangeRelation::Equal,
        1 | -2 => RangeRelation::BContainsA,
        -3 => RangeRelation::BStartsBeforeAEndsWithA,
        -4 if b_then_a()? => RangeRelation::BThenA,
        _ => RangeRelation::OverlapBLeads,
    };
    Some(relation)
}

/// Classifies two spans. Returns `None` for spans of different flows.
pub fn classify(a: &TextSpan, b: &TextSpan) -> Option<RangeRelation> {
    if a.flow != b.flow {
        return None;
    }
    refine(
        lead_sign(a.start.cmp(&b.start)),
        lead_sign(a.end.cmp(&b.end)),
        || Some(a.end <= b.start),
        || Some(b.end <= a.start),
    )
}

/// Classifies two anchored ranges through the host's boundary comparisons. Disposed ranges and
/// ranges of different flows are incomparable.
pub fn relation(a: &dyn AnchoredRange, b: &dyn AnchoredRange) -> Option<RangeRelation> {
    let start = lead_sign(a.compare_starts(b)?);
    let end = lead_sign(a.compare_ends(b)?);
    refine(
        start,
        end,
        || Some(a.compare_end_to_start(b)? != Ordering::Greater),
        || Some(b.compare_end_to_start(a)? != Ordering::Greater),
    )
}
