//! Slot Types
//!
//! Entity categories, extracted fillers, argument slot candidates and the
//! filler → slot assignment produced by the aligner.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::vocab::ARG_UNK;

/// Category of an argument value
///
/// Each category has a placeholder token that appears in decoded templates
/// (e.g. `_TIMESPAN`). `Generic` is the untyped `ARGUMENT_UNK` slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityCategory {
    Generic,
    File,
    Directory,
    Path,
    Regex,
    Permission,
    Size,
    Timespan,
    DateTime,
    Number,
    Username,
    Groupname,
}

impl EntityCategory {
    /// All categories, in placeholder-table order
    pub const ALL: [EntityCategory; 12] = [
        EntityCategory::Generic,
        EntityCategory::File,
        EntityCategory::Directory,
        EntityCategory::Path,
        EntityCategory::Regex,
        EntityCategory::Permission,
        EntityCategory::Size,
        EntityCategory::Timespan,
        EntityCategory::DateTime,
        EntityCategory::Number,
        EntityCategory::Username,
        EntityCategory::Groupname,
    ];

    /// Placeholder token for this category
    pub fn placeholder(self) -> &'static str {
        match self {
            EntityCategory::Generic => ARG_UNK,
            EntityCategory::File => "_FILE",
            EntityCategory::Directory => "_DIRECTORY",
            EntityCategory::Path => "_PATH",
            EntityCategory::Regex => "_REGEX",
            EntityCategory::Permission => "_PERMISSION",
            EntityCategory::Size => "_SIZE",
            EntityCategory::Timespan => "_TIMESPAN",
            EntityCategory::DateTime => "_DATETIME",
            EntityCategory::Number => "_NUMBER",
            EntityCategory::Username => "_USERNAME",
            EntityCategory::Groupname => "_GROUPNAME",
        }
    }

    /// Category named by a placeholder token
    pub fn from_placeholder(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.placeholder() == token)
    }

    /// Whether a slot of this category may hold a filler of `other`
    ///
    /// The generic category accepts everything; `Path` accepts files and
    /// directories; otherwise categories must match exactly.
    pub fn subsumes(self, other: EntityCategory) -> bool {
        match (self, other) {
            (a, b) if a == b => true,
            (EntityCategory::Generic, _) => true,
            (EntityCategory::Path, EntityCategory::File | EntityCategory::Directory) => true,
            _ => false,
        }
    }
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.placeholder())
    }
}

/// Whether a token is a duration flag (`-mmin`, `-atime`, ...)
///
/// The argument following such a flag is always a timespan, whatever its
/// own placeholder says.
pub fn is_duration_flag(token: &str) -> bool {
    let Some(rest) = token.strip_prefix('-') else {
        return false;
    };
    let mut chars = rest.chars();
    matches!(chars.next(), Some('a' | 'm' | 'c')) && matches!(chars.as_str(), "min" | "time")
}

/// An entity value extracted from the natural-language input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityFiller {
    /// Surface text to substitute into the command
    pub text: String,
    /// Entity category
    pub category: EntityCategory,
    /// Token position in the input sentence (indexes encoder states)
    #[serde(default)]
    pub source_position: Option<usize>,
}

impl EntityFiller {
    pub fn new(text: impl Into<String>, category: EntityCategory) -> Self {
        Self {
            text: text.into(),
            category,
            source_position: None,
        }
    }

    /// Attach the input token position
    pub fn at(mut self, position: usize) -> Self {
        self.source_position = Some(position);
        self
    }
}

/// An argument position in a decoded sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotCandidate {
    /// Index in the decoded token sequence
    pub position: usize,
    /// Placeholder token at that position
    pub surface: String,
    /// Effective category (duration-flag context applied)
    pub category: EntityCategory,
}

/// Filler → slot mapping
///
/// Admissible only when every filler is mapped and no slot is used twice;
/// the aligner never returns anything else.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Assignment {
    /// `(filler index, slot position)` in filler order
    pub pairs: Vec<(usize, usize)>,
}

impl Assignment {
    /// Slot position assigned to a filler
    pub fn slot_of(&self, filler: usize) -> Option<usize> {
        self.pairs
            .iter()
            .find(|(f, _)| *f == filler)
            .map(|(_, s)| *s)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Every filler mapped exactly once, every slot used at most once
    pub fn is_admissible(&self, filler_count: usize) -> bool {
        let mut fillers: Vec<usize> = self.pairs.iter().map(|(f, _)| *f).collect();
        let mut slots: Vec<usize> = self.pairs.iter().map(|(_, s)| *s).collect();
        fillers.sort_unstable();
        fillers.dedup();
        slots.sort_unstable();
        slots.dedup();
        fillers.len() == filler_count
            && self.pairs.len() == filler_count
            && slots.len() == filler_count
    }
}
