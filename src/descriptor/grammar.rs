//! The nested key/value grammar command bodies are written in.
//!
//! ```text
//! CMD(KIND 'insertValue' ID 'Recipient' TRANSFORM 'upper')
//! ```
//!
//! Identifiers name nodes, quoted strings (`'…'` or `"…"`, a doubled quote escapes itself) are
//! leaves, parentheses open a list of children. `KEY 'v'` is a node `KEY` with one leaf child,
//! `KEY(…)` a node with the list's items as children. Whitespace, `,` and `;` separate items.

use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, fmt, iter::Peekable, str::Chars};

/// Deepest parenthesis nesting a body may use.
pub const MAX_DEPTH: usize = 128;

/// A parse failure, positioned at the offending character (1-based line and column).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for SyntaxError {}

/// A node of a parsed body. Leaves are nodes without children whose name is the string value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigNode {
    name: String,
    children: Vec<ConfigNode>,
}

impl ConfigNode {
    pub fn new<S: Into<String>>(name: S) -> Self {
        ConfigNode {
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children<S: Into<String>>(name: S, children: Vec<ConfigNode>) -> Self {
        ConfigNode {
            name: name.into(),
            children,
        }
    }

    /// Parses `input` into an anonymous root node holding the top-level items.
    pub fn parse(input: &str) -> Result<ConfigNode, SyntaxError> {
        let mut parser = Parser::new(input);
        let children = parser.list(None, 0)?;
        Ok(ConfigNode::with_children("", children))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn children(&self) -> &[ConfigNode] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// The value of `KEY 'v'`: the name of the single leaf child.
    pub fn value(&self) -> Option<&str> {
        match self.children.as_slice() {
            [only] if only.is_leaf() => Some(only.name()),
            _ => None,
        }
    }

    /// The first direct child named `key`.
    pub fn child(&self, key: &str) -> Option<&ConfigNode> {
        self.children.iter().find(|c| c.name == key)
    }

    /// The first descendant named `key`, searching breadth-first so direct children win.
    pub fn get(&self, key: &str) -> Option<&ConfigNode> {
        let mut queue: VecDeque<&ConfigNode> = self.children.iter().collect();
        while let Some(node) = queue.pop_front() {
            if node.name == key {
                return Some(node);
            }
            queue.extend(node.children.iter());
        }
        None
    }

    /// All descendants named `key`, in document order.
    pub fn query(&self, key: &str) -> Vec<&ConfigNode> {
        let mut found = Vec::new();
        let mut stack: Vec<&ConfigNode> = self.children.iter().rev().collect();
        while let Some(node) = stack.pop() {
            if node.name == key {
                found.push(node);
            }
            stack.extend(node.children.iter().rev());
        }
        found
    }

    /// Sets `path` (a chain of direct children, created as needed) to hold the single leaf
    /// `value`.
    pub fn set_or_create(&mut self, path: &[&str], value: &str) {
        let mut node = self;
        for key in path {
            let idx = match node.children.iter().position(|c| c.name == *key) {
                Some(idx) => idx,
                None => {
                    node.children.push(ConfigNode::new(*key));
                    node.children.len() - 1
                }
            };
            node = &mut node.children[idx];
        }
        node.children = vec![ConfigNode::new(value)];
    }

    pub fn remove_child(&mut self, key: &str) -> Option<ConfigNode> {
        let idx = self.children.iter().position(|c| c.name == key)?;
        Some(self.children.remove(idx))
    }

    /// Single-line canonical rendering. Parsing the result yields an equivalent tree.
    pub fn stringify(&self) -> String {
        let mut out = String::new();
        if self.name.is_empty() && !self.is_leaf() {
            self.write_items(&mut out);
        } else {
            self.write_node(&mut out);
        }
        out
    }

    fn write_items(&self, out: &mut String) {
        for (idx, child) in self.children.iter().enumerate() {
            if idx > 0 {
                out.push(' ');
            }
            child.write_node(out);
        }
    }

    fn write_node(&self, out: &mut String) {
        if self.is_leaf() {
            write_quoted(out, &self.name);
        } else if let (Some(value), false) = (self.value(), self.name.is_empty()) {
            out.push_str(&self.name);
            out.push(' ');
            write_quoted(out, value);
        } else {
            out.push_str(&self.name);
            out.push('(');
            self.write_items(out);
            out.push(')');
        }
    }
}

impl fmt::Display for ConfigNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stringify())
    }
}

fn write_quoted(out: &mut String, value: &str) {
    out.push('\'');
    for c in value.chars() {
        if c == '\'' {
            out.push('\'');
        }
        out.push(c);
    }
    out.push('\'');
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    Open,
    Close,
}

struct Parser<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    column: usize,
    peeked: Option<(Token, usize, usize)>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Parser {
            chars: input.chars().peekable(),
            line: 1,
            column: 1,
            peeked: None,
        }
    }

    fn error<S: Into<String>>(&self, line: usize, column: usize, message: S) -> SyntaxError {
        SyntaxError {
            line,
            column,
            message: message.into(),
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_separators(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() || c == ',' || c == ';' {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn lex(&mut self) -> Result<Option<(Token, usize, usize)>, SyntaxError> {
        self.skip_separators();
        let (line, column) = (self.line, self.column);
        let Some(&c) = self.chars.peek() else {
            return Ok(None);
        };
        let token = match c {
            '(' => {
                self.bump();
                Token::Open
            }
            ')' => {
                self.bump();
                Token::Close
            }
            '\'' | '"' => {
                self.bump();
                let mut value = String::new();
                loop {
                    match self.bump() {
                        Some(q) if q == c => {
                            if self.chars.peek() == Some(&c) {
                                self.bump();
                                value.push(c);
                            } else {
                                break;
                            }
                        }
                        Some(other) => value.push(other),
                        None => return Err(self.error(line, column, "unterminated string")),
                    }
                }
                Token::Str(value)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = self.chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                Token::Ident(ident)
            }
            other => {
                return Err(self.error(line, column, format!("unexpected character '{other}'")))
            }
        };
        Ok(Some((token, line, column)))
    }

    fn next_token(&mut self) -> Result<Option<(Token, usize, usize)>, SyntaxError> {
        match self.peeked.take() {
            Some(token) => Ok(Some(token)),
            None => self.lex(),
        }
    }

    fn peek_token(&mut self) -> Result<Option<&Token>, SyntaxError> {
        if self.peeked.is_none() {
            self.peeked = self.lex()?;
        }
        Ok(self.peeked.as_ref().map(|(token, _, _)| token))
    }

    /// Items up to the matching `)` (when `open` holds its position) or the end of input.
    /// `depth` counts the enclosing parentheses.
    fn list(
        &mut self,
        open: Option<(usize, usize)>,
        depth: usize,
    ) -> Result<Vec<ConfigNode>, SyntaxError> {
        if depth > MAX_DEPTH {
            let (line, column) = open.unwrap_or((self.line, self.column));
            return Err(self.error(line, column, "nesting too deep"));
        }
        let mut items = Vec::new();
        loop {
            let Some((token, line, column)) = self.next_token()? else {
                return match open {
                    Some((line, column)) => Err(self.error(line, column, "unclosed '('")),
                    None => Ok(items),
                };
            };
            match token {
                Token::Close => {
                    return match open {
                        Some(_) => Ok(items),
                        None => Err(self.error(line, column, "unexpected ')'")),
                    };
                }
                Token::Str(value) => items.push(ConfigNode::new(value)),
                Token::Open => {
                    let children = self.list(Some((line, column)), depth + 1)?;
                    items.push(ConfigNode::with_children("", children));
                }
                Token::Ident(name) => {
                    let node = match self.peek_token()?.cloned() {
                        Some(Token::Str(_)) => match self.next_token()? {
                            Some((Token::Str(value), _, _)) => {
                                ConfigNode::with_children(name, vec![ConfigNode::new(value)])
                            }
                            _ => ConfigNode::new(name),
                        },
                        Some(Token::Open) => {
                            let (_, line, column) = self
                                .next_token()?
                                .ok_or_else(|| self.error(line, column, "unexpected end"))?;
                            let children = self.list(Some((line, column)), depth + 1)?;
                            ConfigNode::with_children(name, children)
                        }
                        _ => ConfigNode::new(name),
                    };
                    items.push(node);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_body() {
        let root = ConfigNode::parse("CMD(KIND 'insertFragment' ARGS('a', \"b\") MODE 'auto')")
            .unwrap();
        let cmd = root.child("CMD").unwrap();
        assert_eq!(cmd.child("KIND").and_then(|k| k.value()), Some("insertFragment"));
        let args: Vec<&str> = cmd
            .child("ARGS")
            .unwrap()
            .children()
            .iter()
            .map(|c| c.name())
            .collect();
        assert_eq!(args, vec!["a", "b"]);
        assert_eq!(root.get("MODE").and_then(|m| m.value()), Some("auto"));
    }

    #[test]
    fn test_escaped_quotes_and_separators() {
        let root = ConfigNode::parse("A 'it''s'; B \"say \"\"hi\"\"\"").unwrap();
        assert_eq!(root.child("A").and_then(|n| n.value()), Some("it's"));
        assert_eq!(root.child("B").and_then(|n| n.value()), Some("say \"hi\""));
    }

    #[test]
    fn test_get_prefers_shallow_matches() {
        let root = ConfigNode::parse("X(DEEP(ID 'inner')) ID 'outer'").unwrap();
        assert_eq!(root.get("ID").and_then(|n| n.value()), Some("outer"));
        let all: Vec<_> = root
            .query("ID")
            .into_iter()
            .filter_map(|n| n.value())
            .collect();
        assert_eq!(all, vec!["inner", "outer"]);
    }

    #[test]
    fn test_syntax_errors_are_positioned() {
        let err = ConfigNode::parse("CMD(KIND 'x'").unwrap_err();
        assert_eq!((err.line, err.column), (1, 4));
        assert!(err.message.contains("unclosed"));

        let err = ConfigNode::parse("CMD(KIND 'x\n").unwrap_err();
        assert_eq!((err.line, err.column), (1, 10));

        let err = ConfigNode::parse("A 'x'\n  ) ").unwrap_err();
        assert_eq!((err.line, err.column), (2, 3));

        let err = ConfigNode::parse("A = 'x'").unwrap_err();
        assert!(err.message.contains('='));
    }

    #[test]
    fn test_nesting_depth_is_bounded() {
        let nested = |d: usize| format!("A{}{}", "(".repeat(d), ")".repeat(d));
        assert!(ConfigNode::parse(&nested(MAX_DEPTH)).is_ok());

        let err = ConfigNode::parse(&nested(MAX_DEPTH + 1)).unwrap_err();
        assert!(err.message.contains("too deep"));
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_set_or_create_and_stringify() {
        let mut root = ConfigNode::parse("CMD(KIND 'insertValue' ID 'Name')").unwrap();
        let cmd = root.children[0].clone();
        let mut cmd = cmd;
        cmd.set_or_create(&["STATE", "DONE"], "true");
        cmd.set_or_create(&["STATE", "ERRORS"], "0");
        cmd.set_or_create(&["ID"], "O'Neil");
        assert_eq!(
            cmd.stringify(),
            "CMD(KIND 'insertValue' ID 'O''Neil' STATE(DONE 'true' ERRORS '0'))"
        );

        let reparsed = ConfigNode::parse(&cmd.stringify()).unwrap();
        assert_eq!(reparsed.child("CMD"), Some(&cmd));

        root.remove_child("CMD");
        assert!(root.children().is_empty());
    }
}
