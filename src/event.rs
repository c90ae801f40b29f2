use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    sync::mpsc::Sender,
};

/// Observable changes to a document's command tree and markers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Marker name, command kind label
    NodeAdded(String, String),
    /// Marker name, number of overlapped siblings
    Conflict(String, usize),
    CommandExecuted(String),
    /// Marker name, failure reason
    CommandFailed(String, String),
    /// From name, to name (as actually stored by the host)
    MarkerRenamed(String, String),
    MarkerRemoved(String),
    /// The collected form description, stringified
    FormRequested(String),
    /// A signal that the engine reached this point of the queue.
    Ping,
}

impl Display for Event {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::NodeAdded(marker, kind) => write!(f, "NodeAdded({kind}: {marker})"),
            Event::Conflict(marker, overlaps) => {
                write!(f, "Conflict({marker} overlaps {overlaps} sibling(s))")
            }
            Event::CommandExecuted(marker) => write!(f, "CommandExecuted({marker})"),
            Event::CommandFailed(marker, reason) => {
                write!(f, "CommandFailed({marker}: {reason})")
            }
            Event::MarkerRenamed(from, to) => write!(f, "MarkerRenamed({from} -> {to})"),
            Event::MarkerRemoved(marker) => write!(f, "MarkerRemoved({marker})"),
            Event::FormRequested(form) => write!(f, "FormRequested({form})"),
            Event::Ping => write!(f, "Ping"),
        }
    }
}

/// Sends an event if anyone listens. A closed channel is logged, never an error.
pub fn emit(tx: Option<&Sender<Event>>, event: Event) {
    if let Some(tx) = tx {
        if let Err(e) = tx.send(event) {
            tracing::debug!("Event receiver gone, dropping {}", e.0);
        }
    }
}
