//! Shell Command Grammar
//!
//! Parses flat shell command lines: commands joined by `|`, `&&`, `||` or a
//! bare `;`, each made of a head utility followed by flags and arguments.
//! `find`-style `-exec` blocks nest a command up to a `\;` or `+`
//! terminator.
//!
//! Rejected as ungrammatical:
//! - empty input, unbalanced quotes, a trailing backslash
//! - operators at either end or back to back
//! - a command headed by a flag
//! - an `-exec` block that is empty or never terminated

use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::gazetteer::{is_common_argument, is_numeric_flag, is_utility};
use super::tree::{Node, NodeKind, Tree};
use super::Grammar;
use crate::slot::types::{is_duration_flag, EntityCategory};
use crate::vocab::{is_option, UTL_UNK};

/// Stray semicolons the decoder emits for `-exec ... ;`
static STRAY_SEMICOLON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"( ;\s+)|( ;$)").expect("static regex"));

const OPERATORS: [&str; 4] = ["|", "&&", "||", ";"];
const EXEC_FLAGS: [&str; 4] = ["-exec", "-execdir", "-ok", "-okdir"];
const TERMINATORS: [&str; 4] = ["\\;", "';'", "\";\"", "+"];

/// Lexed shell word
#[derive(Debug, Clone, PartialEq, Eq)]
struct Word {
    /// Text exactly as written, quotes included
    raw: String,
    /// Whether any quoting or escaping occurred
    quoted: bool,
}

impl Word {
    fn is_operator(&self) -> bool {
        !self.quoted && OPERATORS.contains(&self.raw.as_str())
    }

    fn is_flag(&self) -> bool {
        if self.quoted || self.raw.len() < 2 || !is_option(&self.raw) {
            return false;
        }
        // `-60` is a negative number, not a flag
        !self.raw[1..].starts_with(|c: char| c.is_ascii_digit())
    }

    fn is_terminator(&self) -> bool {
        TERMINATORS.contains(&self.raw.as_str())
    }
}

/// Split text into shell words, keeping quotes; `None` on unbalanced input
fn lex(text: &str) -> Option<Vec<Word>> {
    let mut words = Vec::new();
    let mut raw = String::new();
    let mut quoted = false;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if !raw.is_empty() {
                    words.push(Word {
                        raw: std::mem::take(&mut raw),
                        quoted,
                    });
                    quoted = false;
                }
            }
            '\\' => {
                raw.push('\\');
                raw.push(chars.next()?);
                quoted = true;
            }
            '\'' => {
                raw.push('\'');
                loop {
                    let n = chars.next()?;
                    raw.push(n);
                    if n == '\'' {
                        break;
                    }
                }
                quoted = true;
            }
            '"' => {
                raw.push('"');
                loop {
                    let n = chars.next()?;
                    raw.push(n);
                    if n == '\\' {
                        raw.push(chars.next()?);
                    } else if n == '"' {
                        break;
                    }
                }
                quoted = true;
            }
            _ => raw.push(c),
        }
    }
    if !raw.is_empty() {
        words.push(Word { raw, quoted });
    }
    Some(words)
}

/// Shell command grammar
#[derive(Debug, Clone, Default)]
pub struct BashGrammar {
    /// Reject commands whose head is not a corpus utility
    known_utilities_only: bool,
}

impl BashGrammar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grammar that only accepts utilities from the gazetteer
    pub fn restricted() -> Self {
        Self {
            known_utilities_only: true,
        }
    }

    fn parse_command(&self, words: &[&Word]) -> Option<Node> {
        let (head, rest) = words.split_first()?;
        if head.is_flag() || head.is_terminator() {
            return None;
        }
        if self.known_utilities_only && !is_utility(&head.raw) && head.raw != UTL_UNK {
            return None;
        }

        let mut node = Node::new(NodeKind::Command, head.raw.clone());
        let mut i = 0;
        while i < rest.len() {
            let word = rest[i];
            if !word.is_flag() {
                node.push(Node::new(NodeKind::Argument, word.raw.clone()));
                i += 1;
                continue;
            }

            let mut flag = Node::new(NodeKind::Flag, word.raw.clone());
            if EXEC_FLAGS.contains(&word.raw.as_str()) {
                let end = i + 1 + rest[i + 1..].iter().position(|w| w.is_terminator())?;
                flag.push(self.parse_command(&rest[i + 1..end])?);
                flag.push(Node::new(NodeKind::Terminator, rest[end].raw.clone()));
                i = end + 1;
            } else {
                i += 1;
            }
            node.push(flag);
        }
        Some(node)
    }

    fn render_words(&self, tree: &Tree, abstract_args: bool) -> String {
        let mut words = Vec::new();
        for child in &tree.root.children {
            match child.kind {
                NodeKind::Command => render_command(child, abstract_args, &mut words),
                _ => words.push(child.value.clone()),
            }
        }
        words.join(" ")
    }
}

fn render_command(cmd: &Node, abstract_args: bool, words: &mut Vec<String>) {
    words.push(cmd.value.clone());
    let mut prev_flag: Option<&str> = None;
    let mut arg_index = 0;

    for child in &cmd.children {
        match child.kind {
            NodeKind::Flag => {
                words.push(child.value.clone());
                for inner in &child.children {
                    match inner.kind {
                        NodeKind::Command => render_command(inner, abstract_args, words),
                        _ => words.push(inner.value.clone()),
                    }
                }
                prev_flag = child.children.is_empty().then_some(child.value.as_str());
            }
            NodeKind::Argument => {
                let word = if abstract_args {
                    let category = infer_category(&cmd.value, prev_flag, arg_index, &child.value);
                    abstract_argument(&child.value, category)
                } else {
                    child.value.clone()
                };
                words.push(word);
                // Flag values are not operands
                if !prev_flag.is_some_and(|f| flag_argument_category(&cmd.value, f).is_some()) {
                    arg_index += 1;
                }
                prev_flag = None;
            }
            _ => words.push(child.value.clone()),
        }
    }
}

/// Template word for an argument
fn abstract_argument(raw: &str, category: EntityCategory) -> String {
    if EntityCategory::from_placeholder(raw).is_some() || raw == "{}" || is_common_argument(raw)
    {
        return raw.to_string();
    }
    category.placeholder().to_string()
}

/// Category of an argument from its command context and shape
fn infer_category(
    utility: &str,
    prev_flag: Option<&str>,
    index: usize,
    raw: &str,
) -> EntityCategory {
    prev_flag
        .and_then(|flag| flag_argument_category(utility, flag))
        .unwrap_or_else(|| operand_category(utility, index, raw))
}

/// Category of the value taken by `flag`, `None` if the flag takes no value
fn flag_argument_category(utility: &str, flag: &str) -> Option<EntityCategory> {
    if is_duration_flag(flag) {
        return Some(EntityCategory::Timespan);
    }
    let category = match flag {
        "-perm" => EntityCategory::Permission,
        "-size" => EntityCategory::Size,
        "-user" | "-uid" => EntityCategory::Username,
        "-group" | "-gid" => EntityCategory::Groupname,
        "-newer" | "-anewer" | "-cnewer" => EntityCategory::File,
        "-name" | "-iname" | "-path" | "-ipath" | "-regex" | "-iregex" | "-wholename"
        | "-iwholename" => EntityCategory::Regex,
        "-maxdepth" | "-mindepth" => EntityCategory::Number,
        _ if is_numeric_flag(utility, flag) => EntityCategory::Number,
        _ => return None,
    };
    Some(category)
}

/// Category of the `index`-th operand of `utility`
fn operand_category(utility: &str, index: usize, raw: &str) -> EntityCategory {
    if index == 0 {
        match utility {
            "chmod" => return EntityCategory::Permission,
            "chown" => return EntityCategory::Username,
            "chgrp" => return EntityCategory::Groupname,
            "grep" | "egrep" | "fgrep" => return EntityCategory::Regex,
            _ => {}
        }
    }

    let bare = unquote(raw);
    if is_number(bare) {
        return EntityCategory::Number;
    }
    if bare.contains(&['*', '?', '['][..]) {
        return EntityCategory::Regex;
    }
    if bare.ends_with('/') {
        return EntityCategory::Directory;
    }
    if is_file_name(bare) {
        return EntityCategory::File;
    }
    let path_like = bare.contains('/')
        || bare.starts_with('~')
        || bare.starts_with('$')
        || bare == "."
        || bare == "..";
    if path_like {
        return EntityCategory::Path;
    }
    EntityCategory::Generic
}

fn unquote(raw: &str) -> &str {
    for q in ['\'', '"'] {
        if raw.len() >= 2 && raw.starts_with(q) && raw.ends_with(q) {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

fn is_number(s: &str) -> bool {
    let digits = s.strip_prefix(&['+', '-'][..]).unwrap_or(s);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn is_file_name(s: &str) -> bool {
    let name = s.rsplit('/').next().unwrap_or(s);
    match name.rfind('.') {
        Some(dot) => dot > 0 && dot + 1 < name.len(),
        None => false,
    }
}

impl Grammar for BashGrammar {
    fn name(&self) -> &str {
        "bash"
    }

    fn normalize(&self, surface: &str) -> String {
        STRAY_SEMICOLON.replace_all(surface, " \\; ").into_owned()
    }

    fn parse(&self, text: &str) -> Option<Tree> {
        let words = lex(text)?;
        if words.is_empty() {
            return None;
        }

        let mut children = Vec::new();
        let mut segment: Vec<&Word> = Vec::new();
        for word in &words {
            if word.is_operator() {
                if segment.is_empty() {
                    return None;
                }
                children.push(self.parse_command(&segment)?);
                children.push(Node::new(NodeKind::Operator, word.raw.clone()));
                segment.clear();
            } else {
                segment.push(word);
            }
        }
        if segment.is_empty() {
            return None;
        }
        children.push(self.parse_command(&segment)?);
        Some(Tree::new(children))
    }

    fn render(&self, tree: &Tree) -> String {
        self.render_words(tree, false)
    }

    fn template_of(&self, tree: &Tree) -> String {
        self.render_words(tree, true)
    }

    fn quote(&self, literal: &str) -> String {
        if let Some(words) = lex(literal) {
            if words.len() == 1 && !words[0].is_operator() {
                return literal.to_string();
            }
        }
        let cleaned = literal.replace('\0', "");
        match shlex::try_quote(&cleaned) {
            Ok(quoted) => quoted.into_owned(),
            Err(_) => cleaned,
        }
    }

    fn abstracts_arguments(&self) -> bool {
        true
    }
}
