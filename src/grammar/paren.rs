//! Parenthesized Expression Grammar
//!
//! Accepts a single balanced s-expression such as `(and (a b) (not c))`.
//! Empty lists, bare atoms at top level and trailing input are rejected.

use super::tree::{Node, NodeKind, Tree};
use super::Grammar;

fn lex(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    for chunk in text.split_whitespace() {
        let mut start = 0;
        for (i, c) in chunk.char_indices() {
            if c == '(' || c == ')' {
                if start < i {
                    tokens.push(&chunk[start..i]);
                }
                tokens.push(&chunk[i..i + 1]);
                start = i + 1;
            }
        }
        if start < chunk.len() {
            tokens.push(&chunk[start..]);
        }
    }
    tokens
}

/// S-expression grammar
#[derive(Debug, Clone, Default)]
pub struct ParenGrammar;

impl ParenGrammar {
    pub fn new() -> Self {
        Self
    }

    /// Parse a list starting at `tokens[*pos] == "("`
    fn parse_list(&self, tokens: &[&str], pos: &mut usize) -> Option<Node> {
        if tokens.get(*pos) != Some(&"(") {
            return None;
        }
        *pos += 1;
        let mut list = Node::new(NodeKind::List, "");
        loop {
            match *tokens.get(*pos)? {
                ")" => {
                    *pos += 1;
                    break;
                }
                "(" => list.push(self.parse_list(tokens, pos)?),
                atom => {
                    list.push(Node::new(NodeKind::Atom, atom));
                    *pos += 1;
                }
            }
        }
        if list.children.is_empty() {
            return None;
        }
        Some(list)
    }

    fn render_node(&self, node: &Node, out: &mut String) {
        match node.kind {
            NodeKind::List => {
                out.push('(');
                for (i, child) in node.children.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    self.render_node(child, out);
                }
                out.push(')');
            }
            _ => out.push_str(&node.value),
        }
    }
}

impl Grammar for ParenGrammar {
    fn name(&self) -> &str {
        "paren"
    }

    fn parse(&self, text: &str) -> Option<Tree> {
        let tokens = lex(text);
        let mut pos = 0;
        let list = self.parse_list(&tokens, &mut pos)?;
        if pos != tokens.len() {
            return None;
        }
        Some(Tree::new(vec![list]))
    }

    fn render(&self, tree: &Tree) -> String {
        let mut out = String::new();
        for child in &tree.root.children {
            self.render_node(child, &mut out);
        }
        out
    }

    fn template_of(&self, tree: &Tree) -> String {
        self.render(tree)
    }

    fn abstracts_arguments(&self) -> bool {
        false
    }
}
