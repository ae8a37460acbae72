//! Syntax Trees
//!
//! Minimal owned tree shared by all grammar backends. Backends decide which
//! node kinds they produce; the decode pipeline only ever passes trees back
//! to the backend that built them.

/// Node kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Tree root
    Root,
    /// Shell command; value is the head utility
    Command,
    /// Shell flag; children hold a nested `-exec` command, if any
    Flag,
    /// Shell argument; value is the raw (possibly quoted) word
    Argument,
    /// Command separator (`|`, `&&`, `||`, `;`)
    Operator,
    /// Terminator of a nested command (`\;` or `+`)
    Terminator,
    /// Parenthesized list
    List,
    /// List atom
    Atom,
}

/// Tree node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    pub value: String,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(kind: NodeKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub fn push(&mut self, child: Node) {
        self.children.push(child);
    }

    /// Pre-order traversal
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Node)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// Number of nodes of a kind in this subtree
    pub fn count(&self, kind: NodeKind) -> usize {
        let mut n = 0;
        self.walk(&mut |node| {
            if node.kind == kind {
                n += 1;
            }
        });
        n
    }
}

/// Parsed syntax tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    pub root: Node,
}

impl Tree {
    pub fn new(children: Vec<Node>) -> Self {
        Self {
            root: Node::new(NodeKind::Root, "").with_children(children),
        }
    }

    pub fn count(&self, kind: NodeKind) -> usize {
        self.root.count(kind)
    }
}
