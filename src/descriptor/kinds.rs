use serde::{Deserialize, Serialize};
use std::fmt;

use crate::descriptor::grammar::ConfigNode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FragmentMode {
    /// Insert the fragment text when the command executes.
    #[default]
    Auto,
    /// Leave the placeholder for the user to fill in.
    Manual,
}

/// The closed set of command kinds a marker can select.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    InsertFragment {
        fragment: String,
        args: Vec<String>,
        mode: FragmentMode,
    },
    InsertValue {
        id: String,
        transform: Option<String>,
    },
    InsertContent,
    Form {
        section: ConfigNode,
    },
    Invalid {
        reason: String,
    },
}

impl CommandKind {
    pub fn label(&self) -> &'static str {
        match self {
            CommandKind::InsertFragment { .. } => "insertFragment",
            CommandKind::InsertValue { .. } => "insertValue",
            CommandKind::InsertContent => "insertContent",
            CommandKind::Form { .. } => "form",
            CommandKind::Invalid { .. } => "invalid",
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, CommandKind::Invalid { .. })
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::InsertFragment {
                fragment,
                args,
                mode,
            } => {
                write!(f, "insertFragment({fragment}")?;
                if !args.is_empty() {
                    write!(f, " args={}", args.join(","))?;
                }
                if *mode == FragmentMode::Manual {
                    write!(f, " manual")?;
                }
                write!(f, ")")
            }
            CommandKind::InsertValue { id, transform } => match transform {
                Some(t) => write!(f, "insertValue({id} | {t})"),
                None => write!(f, "insertValue({id})"),
            },
            CommandKind::InsertContent => write!(f, "insertContent"),
            CommandKind::Form { .. } => write!(f, "form"),
            CommandKind::Invalid { reason } => write!(f, "invalid: {reason}"),
        }
    }
}

/// The done flag and error count of a command, as executed or as persisted in its marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandStatus {
    pub done: bool,
    pub errors: u32,
}

impl CommandStatus {
    /// Finished commands and failed commands are not executed again.
    pub fn is_settled(&self) -> bool {
        self.done || self.errors > 0
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "done={} errors={}", self.done, self.errors)
    }
}
