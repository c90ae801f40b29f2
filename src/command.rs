//! What each command kind does when it runs.
//!
//! [`execute_within`] performs one node's command against the host document, [`clean_up`]
//! removes the insert marks an earlier execution left around inserted text, and [`status`]
//! reports the node's done flag and error count. Tree-wide passes over these live on
//! [`DocumentContext`](crate::context::DocumentContext).

use crate::{
    config::{DocumentConfig, Fragment},
    descriptor::{CommandKind, CommandStatus, ConfigNode, FragmentMode},
    error::DocCmdError,
    host::HostDocument,
    transform::TRANSFORMS,
    tree::CommandNode,
};

pub const INSERT_MARK_OPEN: char = '<';
pub const INSERT_MARK_CLOSE: char = '>';

/// Form sections collected during execution, waiting to be shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormState {
    pub sections: Vec<ConfigNode>,
    pub presented: bool,
}

impl FormState {
    /// True when sections were collected and no form was requested for them yet.
    pub fn is_pending(&self) -> bool {
        !self.sections.is_empty() && !self.presented
    }

    /// One `FORM(...)` node holding the children of every collected section.
    pub fn description(&self) -> Option<ConfigNode> {
        if self.sections.is_empty() {
            return None;
        }
        let children = self
            .sections
            .iter()
            .flat_map(|s| s.children().iter().cloned())
            .collect();
        Some(ConfigNode::with_children("FORM", children))
    }

    pub fn clear(&mut self) {
        self.sections.clear();
        self.presented = false;
    }
}

/// What a command may touch while it executes.
pub struct ExecEnv<'a> {
    pub host: &'a mut dyn HostDocument,
    pub config: &'a DocumentConfig,
    pub form: &'a mut FormState,
}

/// True for kinds that overwrite the text of their range.
pub fn replaces_text(kind: &CommandKind) -> bool {
    matches!(
        kind,
        CommandKind::InsertFragment {
            mode: FragmentMode::Auto,
            ..
        } | CommandKind::InsertValue { .. }
            | CommandKind::InsertContent
    )
}

pub fn status(node: &CommandNode) -> CommandStatus {
    node.status
}

/// Replaces `%1`…`%n` with the arguments in one left-to-right sweep. At each `%` the longest
/// run of digits naming an existing argument wins; inserted text is never rescanned.
fn substitute_args(text: &str, args: &[String]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        let found = (1..=digits).rev().find_map(|len| {
            let n: usize = after[..len].parse().ok()?;
            let arg = args.get(n.checked_sub(1)?)?;
            Some((len, arg))
        });
        match found {
            Some((len, arg)) => {
                out.push_str(arg);
                rest = &after[len..];
            }
            None => {
                out.push('%');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// The text an automatic fragment command inserts, with its nested markers. `None` when the
/// fragment is overridden with nothing. Marker offsets are checked against the substituted text.
fn fragment_text<'c>(
    config: &'c DocumentConfig,
    fragment: &str,
    args: &[String],
) -> Result<Option<(String, &'c Fragment)>, DocCmdError> {
    let Some(id) = config.resolve_fragment_id(fragment)? else {
        return Ok(None);
    };
    let found = config
        .fragments
        .get(id)
        .ok_or_else(|| DocCmdError::NotFound(format!("fragment '{id}'")))?;
    let text = substitute_args(&found.text, args);
    let len = text.chars().count();
    if let Some(bad) = found
        .markers
        .iter()
        .find(|m| m.start > m.end || m.end > len)
    {
        return Err(DocCmdError::Config(format!(
            "marker '{}' lies outside fragment '{id}'",
            bad.name
        )));
    }
    Ok(Some((text, found)))
}

/// Checks everything a command needs from the configuration, before any text is touched.
pub fn check(kind: &CommandKind, config: &DocumentConfig) -> Result<(), DocCmdError> {
    match kind {
        CommandKind::Invalid { reason } => Err(DocCmdError::InvalidCommand(reason.clone())),
        CommandKind::InsertFragment {
            fragment,
            args,
            mode: FragmentMode::Auto,
        } => fragment_text(config, fragment, args).map(|_| ()),
        CommandKind::InsertValue { id, transform } => {
            let value = config
                .values
                .get(id)
                .ok_or_else(|| DocCmdError::NotFound(format!("value '{id}'")))?;
            if let Some(name) = transform {
                TRANSFORMS.apply(name, value)?;
            }
            Ok(())
        }
        CommandKind::InsertContent => config
            .content
            .as_ref()
            .map(|_| ())
            .ok_or_else(|| DocCmdError::NotFound("document content".to_string())),
        CommandKind::InsertFragment { .. } | CommandKind::Form { .. } => Ok(()),
    }
}

fn decorated(text: &str, insert_marks: bool) -> String {
    if insert_marks {
        format!("{INSERT_MARK_OPEN}{text}{INSERT_MARK_CLOSE}")
    } else {
        text.to_string()
    }
}

/// Executes one command. On success the command is done; the caller records failures.
pub fn execute_within(node: &mut CommandNode, env: &mut ExecEnv<'_>) -> Result<(), DocCmdError> {
    if node.conflict {
        return Err(DocCmdError::InvalidCommand(
            "range overlaps another command".to_string(),
        ));
    }
    let kind = node
        .kind()
        .cloned()
        .ok_or_else(|| DocCmdError::InvalidCommand("the root is not a command".to_string()))?;
    let insert_marks = env.config.settings.insert_marks;
    match kind {
        CommandKind::Invalid { reason } => Err(DocCmdError::InvalidCommand(reason)),
        CommandKind::InsertFragment {
            mode: FragmentMode::Manual,
            ..
        } => Ok(()),
        CommandKind::InsertFragment { fragment, args, .. } => {
            let range = node
                .range()
                .ok_or_else(|| DocCmdError::NotFound("command range".to_string()))?;
            let Some((text, found)) = fragment_text(env.config, &fragment, &args)? else {
                tracing::debug!("Fragment '{fragment}' is overridden with nothing");
                return range.replace_text("");
            };
            range.replace_text(&decorated(&text, insert_marks))?;
            let offset = usize::from(insert_marks);
            for marker in found.markers.iter() {
                let inner = env
                    .host
                    .range_within(range, marker.start + offset, marker.end + offset)
                    .ok_or_else(|| {
                        DocCmdError::NotFound(format!("range of marker '{}'", marker.name))
                    })?;
                let actual = env.host.create_marker(&marker.name, inner.as_ref())?;
                inner.dispose();
                tracing::debug!("Fragment '{fragment}' created marker '{actual}'");
            }
            node.has_insert_marks = insert_marks;
            Ok(())
        }
        CommandKind::InsertValue { id, transform } => {
            let range = node
                .range()
                .ok_or_else(|| DocCmdError::NotFound("command range".to_string()))?;
            let value = env
                .config
                .values
                .get(&id)
                .ok_or_else(|| DocCmdError::NotFound(format!("value '{id}'")))?;
            let value = match transform {
                Some(name) => TRANSFORMS.apply(&name, value)?,
                None => value.clone(),
            };
            range.replace_text(&value)
        }
        CommandKind::InsertContent => {
            let range = node
                .range()
                .ok_or_else(|| DocCmdError::NotFound("command range".to_string()))?;
            let content = env
                .config
                .content
                .as_deref()
                .ok_or_else(|| DocCmdError::NotFound("document content".to_string()))?;
            range.replace_text(&decorated(content, insert_marks))?;
            node.has_insert_marks = insert_marks;
            Ok(())
        }
        CommandKind::Form { section } => {
            env.form.sections.push(section);
            env.form.presented = false;
            Ok(())
        }
    }
}

/// Removes the insert marks around the node's text. Returns whether anything was removed.
pub fn clean_up(node: &mut CommandNode, host: &dyn HostDocument) -> Result<bool, DocCmdError> {
    if !node.has_insert_marks {
        return Ok(false);
    }
    node.has_insert_marks = false;
    let Some(range) = node.range() else {
        return Ok(false);
    };
    let text = range
        .text()
        .ok_or_else(|| DocCmdError::NotFound("command range".to_string()))?;
    let len = text.chars().count();
    if len < 2 || !text.starts_with(INSERT_MARK_OPEN) || !text.ends_with(INSERT_MARK_CLOSE) {
        tracing::debug!("Insert marks of '{}' were edited away", node.marker().unwrap_or(""));
        return Ok(false);
    }
    for (start, end) in [(len - 1, len), (0, 1)] {
        let mark = host
            .range_within(range, start, end)
            .ok_or_else(|| DocCmdError::NotFound("insert mark".to_string()))?;
        mark.replace_text("")?;
        mark.dispose();
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::FragmentMarker,
        descriptor::parse_marker,
        host::MemoryDocument,
        relation::FlowId,
    };

    fn command(doc: &mut MemoryDocument, name: &str, start: usize, end: usize) -> CommandNode {
        let actual = doc.add_marker(name, FlowId(0), start, end).unwrap();
        let range = doc.resolve(&actual).unwrap();
        CommandNode::new(actual, range, parse_marker(name).unwrap())
    }

    fn config() -> DocumentConfig {
        let mut config = DocumentConfig::default();
        config.values.insert("City".to_string(), "  berlin ".to_string());
        config.fragments.insert(
            "Greeting".to_string(),
            Fragment {
                text: "Hi %1 and %2".to_string(),
                markers: vec![FragmentMarker {
                    name: "CMD(KIND 'insertValue' ID 'City')".to_string(),
                    start: 0,
                    end: 2,
                }],
            },
        );
        config.content = Some("BODY".to_string());
        config
    }

    #[test]
    fn test_insert_value_with_transform() {
        let mut doc = MemoryDocument::new("City: ____.");
        let mut node = command(
            &mut doc,
            "CMD(KIND 'insertValue' ID 'City' TRANSFORM 'trim')",
            6,
            10,
        );
        let config = config();
        let mut form = FormState::default();
        let mut host = doc.clone();
        let mut env = ExecEnv {
            host: &mut host,
            config: &config,
            form: &mut form,
        };
        execute_within(&mut node, &mut env).unwrap();
        assert_eq!(doc.body(), "City: berlin.");
        assert!(!node.has_insert_marks);
    }

    #[test]
    fn test_missing_value_and_unknown_transform_fail() {
        let mut doc = MemoryDocument::new("0123456789");
        let mut missing = command(&mut doc, "CMD(KIND 'insertValue' ID 'Nope')", 0, 2);
        let mut unknown = command(
            &mut doc,
            "CMD(KIND 'insertValue' ID 'City' TRANSFORM 'rot13')",
            3,
            5,
        );
        let config = config();
        let mut form = FormState::default();
        let mut host = doc.clone();
        let mut env = ExecEnv {
            host: &mut host,
            config: &config,
            form: &mut form,
        };
        assert!(execute_within(&mut missing, &mut env).is_err());
        assert!(execute_within(&mut unknown, &mut env).is_err());
        assert_eq!(doc.body(), "0123456789");
    }

    #[test]
    fn test_fragment_with_marks_markers_and_clean_up() {
        let mut doc = MemoryDocument::new("[frag]");
        let mut node = command(
            &mut doc,
            "CMD(KIND 'insertFragment' FRAGMENT 'Greeting' ARGS('Ann' 'Bo'))",
            0,
            6,
        );
        let config = config();
        let mut form = FormState::default();
        let mut host = doc.clone();
        {
            let mut env = ExecEnv {
                host: &mut host,
                config: &config,
                form: &mut form,
            };
            execute_within(&mut node, &mut env).unwrap();
        }
        assert_eq!(doc.body(), "<Hi Ann and Bo>");
        assert!(node.has_insert_marks);
        assert_eq!(
            doc.marker_text("CMD(KIND 'insertValue' ID 'City')").as_deref(),
            Some("Hi")
        );

        assert!(clean_up(&mut node, &host).unwrap());
        assert_eq!(doc.body(), "Hi Ann and Bo");
        assert_eq!(node.range().and_then(|r| r.text()).as_deref(), Some("Hi Ann and Bo"));
        assert_eq!(
            doc.marker_text("CMD(KIND 'insertValue' ID 'City')").as_deref(),
            Some("Hi")
        );
        assert!(!clean_up(&mut node, &host).unwrap());
        assert_eq!(doc.body(), "Hi Ann and Bo");
    }

    #[test]
    fn test_manual_fragment_and_empty_override() {
        let mut doc = MemoryDocument::new("[a][b]");
        let mut manual = command(
            &mut doc,
            "CMD(KIND 'insertFragment' FRAGMENT 'Greeting' MODE 'manual')",
            0,
            3,
        );
        let mut dropped = command(&mut doc, "CMD(KIND 'insertFragment' FRAGMENT 'Old')", 3, 6);
        let mut config = config();
        config.overrides.insert("Old".to_string(), String::new());
        let mut form = FormState::default();
        let mut host = doc.clone();
        let mut env = ExecEnv {
            host: &mut host,
            config: &config,
            form: &mut form,
        };
        execute_within(&mut manual, &mut env).unwrap();
        execute_within(&mut dropped, &mut env).unwrap();
        assert_eq!(doc.body(), "[a]");
    }

    #[test]
    fn test_form_sections_are_collected() {
        let mut doc = MemoryDocument::new("form");
        let mut a = command(&mut doc, "CMD(KIND 'form' FORM(TITLE 'A'))", 0, 4);
        let mut b = command(&mut doc, "CMD(KIND 'form' FORM(FIELD 'b'))", 0, 4);
        let config = config();
        let mut form = FormState::default();
        let mut host = doc.clone();
        let mut env = ExecEnv {
            host: &mut host,
            config: &config,
            form: &mut form,
        };
        execute_within(&mut a, &mut env).unwrap();
        execute_within(&mut b, &mut env).unwrap();
        assert!(form.is_pending());
        assert_eq!(
            form.description().map(|d| d.stringify()).as_deref(),
            Some("FORM(TITLE 'A' FIELD 'b')")
        );
        assert_eq!(doc.body(), "form");
    }

    #[test]
    fn test_invalid_commands_fail() {
        let mut doc = MemoryDocument::new("x");
        let mut node = command(&mut doc, "CMD(KIND 'unknown')", 0, 1);
        let config = config();
        let mut form = FormState::default();
        let mut host = doc.clone();
        let mut env = ExecEnv {
            host: &mut host,
            config: &config,
            form: &mut form,
        };
        let err = execute_within(&mut node, &mut env).unwrap_err();
        assert!(matches!(err, DocCmdError::InvalidCommand(_)));
        assert_eq!(status(&node), CommandStatus::default());
    }

    #[test]
    fn test_substitution_prefers_longer_placeholders() {
        let args: Vec<String> = (1..=10).map(|n| format!("a{n}")).collect();
        assert_eq!(substitute_args("%1-%10", &args), "a1-a10");
        // %12 names no argument, so %1 is taken and the 2 kept.
        assert_eq!(substitute_args("%12", &args), "a12");
    }

    #[test]
    fn test_substituted_values_are_not_rescanned() {
        let args = vec!["X".to_string(), "100%1".to_string()];
        assert_eq!(substitute_args("%1 then %2", &args), "X then 100%1");
        assert_eq!(substitute_args("50% off %3 %0 %", &args), "50% off %3 %0 %");
        assert_eq!(substitute_args("%2%1", &args), "100%1X");
    }

    #[test]
    fn test_bad_fragment_marker_leaves_text_alone() {
        let mut doc = MemoryDocument::new("[frag]");
        let mut node = command(&mut doc, "CMD(KIND 'insertFragment' FRAGMENT 'Short')", 0, 6);
        let mut config = config();
        config.fragments.insert(
            "Short".to_string(),
            Fragment {
                text: "abc".to_string(),
                markers: vec![FragmentMarker {
                    name: "CMD(KIND 'insertContent')".to_string(),
                    start: 1,
                    end: 9,
                }],
            },
        );
        let kind = node.kind().cloned().unwrap();
        assert!(matches!(check(&kind, &config), Err(DocCmdError::Config(_))));

        let mut form = FormState::default();
        let mut host = doc.clone();
        let mut env = ExecEnv {
            host: &mut host,
            config: &config,
            form: &mut form,
        };
        assert!(execute_within(&mut node, &mut env).is_err());
        assert_eq!(doc.body(), "[frag]");
        assert_eq!(doc.marker_count(), 1);
    }
}
