//! Command descriptors: what a marker asks to be done.
//!
//! A marker is a command when its name matches the envelope `CMD(...)`, optionally followed by
//! the numeric suffix a host appends on name collisions. Everything else is ignored by the
//! scanner. The body is parsed with [`grammar`]; any failure (syntax, missing `KIND`, unknown
//! kind, missing mandatory parameter) yields an [`CommandKind::Invalid`] descriptor instead of an
//! error, so one broken marker never aborts a scan.
//!
//! ```rust
//! use doccmd_core::descriptor::{parse_marker, CommandKind};
//!
//! let cmd = parse_marker("CMD(KIND 'insertValue' ID 'City') 2").unwrap();
//! assert_eq!(
//!     cmd.kind,
//!     CommandKind::InsertValue { id: "City".to_string(), transform: None }
//! );
//! assert!(parse_marker("just a bookmark").is_none());
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub mod grammar;
pub mod kinds;


pub use grammar::{ConfigNode, SyntaxError};
pub use kinds::{CommandKind, CommandStatus, FragmentMode};

pub const ENVELOPE: &str = "CMD";

static ENVELOPE_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*(CMD\s*\(.*\))\s*\d*\s*$")
        .map_err(|e| tracing::error!("Command envelope pattern failed to compile: {e}"))
        .ok()
});

/// The parsed payload of one marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    pub kind: CommandKind,
    /// The `CMD(...)` node the descriptor was read from; absent when the body did not parse.
    pub source: Option<ConfigNode>,
    /// Status read back from the `STATE(...)` section.
    pub persisted: CommandStatus,
}

impl CommandDescriptor {
    pub fn invalid<S: Into<String>>(reason: S, source: Option<ConfigNode>) -> Self {
        CommandDescriptor {
            kind: CommandKind::Invalid {
                reason: reason.into(),
            },
            source,
            persisted: CommandStatus::default(),
        }
    }

    /// Reads a descriptor from an already parsed `CMD(...)` node.
    pub fn from_node(cmd: &ConfigNode) -> Self {
        let source = Some(cmd.clone());
        let persisted = read_status(cmd);
        let Some(kind) = field(cmd, "KIND") else {
            return CommandDescriptor::invalid("missing mandatory field KIND", source);
        };
        let kind = match kind.to_lowercase().as_str() {
            "insertfragment" => parse_insert_fragment(cmd),
            "insertvalue" => match field(cmd, "ID") {
                Some(id) => Ok(CommandKind::InsertValue {
                    id: id.to_string(),
                    transform: field(cmd, "TRANSFORM").map(str::to_string),
                }),
                None => Err("insertValue requires ID".to_string()),
            },
            "insertcontent" => Ok(CommandKind::InsertContent),
            "form" => match cmd.child("FORM") {
                Some(section) => Ok(CommandKind::Form {
                    section: section.clone(),
                }),
                None => Err("form requires a FORM section".to_string()),
            },
            _ => Err(format!("unknown kind '{kind}'")),
        };
        match kind {
            Ok(kind) => CommandDescriptor {
                kind,
                source,
                persisted,
            },
            Err(reason) => CommandDescriptor::invalid(reason, source),
        }
    }

    /// The marker name recording `status` in a `STATE(...)` section; `None` when the body never
    /// parsed and therefore cannot be rewritten.
    pub fn marker_name(&self, status: CommandStatus) -> Option<String> {
        let mut cmd = self.source.clone()?;
        cmd.set_or_create(&["STATE", "DONE"], if status.done { "true" } else { "false" });
        cmd.set_or_create(&["STATE", "ERRORS"], &status.errors.to_string());
        Some(cmd.stringify())
    }
}

/// Parses a marker name. `None` means the marker is not a command at all.
pub fn parse_marker(name: &str) -> Option<CommandDescriptor> {
    let envelope = ENVELOPE_RE.as_ref()?;
    let body = envelope.captures(name)?.get(1)?.as_str();
    let descriptor = match ConfigNode::parse(body) {
        Ok(root) => match root.children() {
            [cmd] if cmd.name() == ENVELOPE => CommandDescriptor::from_node(cmd),
            [cmd, ..] if cmd.name() == ENVELOPE => {
                CommandDescriptor::invalid("unexpected text after the CMD body", None)
            }
            _ => CommandDescriptor::invalid("missing CMD body", None),
        },
        Err(err) => {
            tracing::debug!("Marker '{name}' failed to parse: {err}");
            CommandDescriptor::invalid(format!("syntax error at {err}"), None)
        }
    };
    Some(descriptor)
}

fn field<'a>(cmd: &'a ConfigNode, key: &str) -> Option<&'a str> {
    cmd.child(key).and_then(|node| node.value())
}

fn read_status(cmd: &ConfigNode) -> CommandStatus {
    let Some(state) = cmd.child("STATE") else {
        return CommandStatus::default();
    };
    CommandStatus {
        done: field(state, "DONE").is_some_and(|v| v.eq_ignore_ascii_case("true")),
        errors: field(state, "ERRORS")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0),
    }
}

fn parse_insert_fragment(cmd: &ConfigNode) -> Result<CommandKind, String> {
    let fragment = field(cmd, "FRAGMENT").ok_or("insertFragment requires FRAGMENT")?;
    let args = cmd
        .child("ARGS")
        .map(|args| {
            args.children()
                .iter()
                .map(|arg| arg.value().unwrap_or(arg.name()).to_string())
                .collect()
        })
        .unwrap_or_default();
    let mode = match field(cmd, "MODE").map(str::to_lowercase).as_deref() {
        None | Some("auto") => FragmentMode::Auto,
        Some("manual") => FragmentMode::Manual,
        Some(other) => return Err(format!("invalid MODE '{other}'")),
    };
    Ok(CommandKind::InsertFragment {
        fragment: fragment.to_string(),
        args,
        mode,
    })
}
