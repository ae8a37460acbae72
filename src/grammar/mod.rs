//! Grammar Backends
//!
//! The decode pipeline validates candidates through a [`Grammar`]: parse a
//! surface string into a [`Tree`] (or reject it), render a tree back to
//! text, and render the argument-abstracted template of a tree.
//!
//! The pipeline never branches on which backend is active; it only selects
//! one via [`GrammarKind`].
//!
//! # Backends
//!
//! | Backend | Input | Templates |
//! |---------|-------|-----------|
//! | [`BashGrammar`] | shell commands | arguments → category placeholders |
//! | [`BashGrammar::restricted`] | shell commands, known utilities only | as above |
//! | [`ParenGrammar`] | s-expressions | identical to rendering |

pub mod bash;
pub mod gazetteer;
pub mod paren;
pub mod tree;

pub use bash::BashGrammar;
pub use paren::ParenGrammar;
pub use tree::{Node, NodeKind, Tree};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Grammar round-trip capability
///
/// Implementations must be pure: the same text always yields the same tree,
/// and `render(parse(render(t)))` equals `render(t)`.
pub trait Grammar: Send + Sync {
    /// Backend name
    fn name(&self) -> &str;

    /// Rewrite decoded surface text before parsing
    fn normalize(&self, surface: &str) -> String {
        surface.to_string()
    }

    /// Parse text; `None` means the text is not grammatical
    fn parse(&self, text: &str) -> Option<Tree>;

    /// Render a tree back to text
    fn render(&self, tree: &Tree) -> String;

    /// Render a tree with arguments abstracted into placeholders
    fn template_of(&self, tree: &Tree) -> String;

    /// Make a literal safe to splice into a token sequence as one word
    fn quote(&self, literal: &str) -> String {
        literal.to_string()
    }

    /// Whether templates carry argument slots that can be filled
    fn abstracts_arguments(&self) -> bool;
}

/// Available grammar backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrammarKind {
    #[default]
    Bash,
    /// Shell grammar rejecting commands headed by unknown utilities
    BashStrict,
    Paren,
}

impl GrammarKind {
    /// Instantiate the backend
    pub fn build(self) -> Box<dyn Grammar> {
        match self {
            GrammarKind::Bash => Box::new(BashGrammar::new()),
            GrammarKind::BashStrict => Box::new(BashGrammar::restricted()),
            GrammarKind::Paren => Box::new(ParenGrammar::new()),
        }
    }
}

impl fmt::Display for GrammarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarKind::Bash => write!(f, "bash"),
            GrammarKind::BashStrict => write!(f, "bash_strict"),
            GrammarKind::Paren => write!(f, "paren"),
        }
    }
}

impl std::str::FromStr for GrammarKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bash" | "shell" => Ok(GrammarKind::Bash),
            "bash_strict" | "bash-strict" | "strict" => Ok(GrammarKind::BashStrict),
            "paren" | "sexp" => Ok(GrammarKind::Paren),
            other => Err(format!("unknown grammar '{}'", other)),
        }
    }
}
