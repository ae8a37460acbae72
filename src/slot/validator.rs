//! Candidate Validator
//!
//! Checks a decoded sequence against the active grammar and derives its
//! [`Template`]: the slot set, the validated tree and the output text.
//! Rejection is a value, never an error; the beam manager skips rejected
//! hypotheses and moves on.

use serde::Serialize;
use std::fmt;

use super::types::SlotCandidate;
use crate::grammar::{Grammar, Tree};
use crate::inference::decoder::DecodedSequence;

/// A validated candidate
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    /// Decoded token texts
    pub tokens: Vec<String>,
    /// Argument slots, positions increasing
    pub slots: Vec<SlotCandidate>,
    /// Parsed tree; `None` when the text was passed through unparsed
    pub tree: Option<Tree>,
    /// Output text: the argument-abstracted template when the grammar
    /// abstracts arguments, the surface text otherwise
    pub text: String,
}

impl Template {
    /// Whether the candidate was parsed (not passed through)
    pub fn is_parsed(&self) -> bool {
        self.tree.is_some()
    }
}

/// Why a candidate was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Not grammatical under strict validation
    ParseError,
    /// Nothing but whitespace to validate
    EmptyOutput,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::ParseError => write!(f, "parse error"),
            RejectReason::EmptyOutput => write!(f, "empty output"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejected {
    pub reason: RejectReason,
}

impl Rejected {
    fn new(reason: RejectReason) -> Self {
        Self { reason }
    }
}

/// Grammar-backed candidate validator
pub struct CandidateValidator<'g> {
    grammar: &'g dyn Grammar,
    /// Accept any non-empty surface text without parsing
    explain: bool,
}

impl<'g> CandidateValidator<'g> {
    pub fn new(grammar: &'g dyn Grammar) -> Self {
        Self {
            grammar,
            explain: false,
        }
    }

    pub fn explain(mut self, explain: bool) -> Self {
        self.explain = explain;
        self
    }

    /// Validate a decoded sequence
    ///
    /// Under `strict`, ungrammatical text is rejected; otherwise it is passed
    /// through with no tree.
    pub fn validate(&self, seq: &DecodedSequence, strict: bool) -> Result<Template, Rejected> {
        let surface = seq.surface();
        if surface.trim().is_empty() {
            return Err(Rejected::new(RejectReason::EmptyOutput));
        }
        let tokens: Vec<String> = seq.texts().into_iter().map(str::to_string).collect();

        if self.explain {
            return Ok(Template {
                tokens,
                slots: Vec::new(),
                tree: None,
                text: surface,
            });
        }

        let normalized = self.grammar.normalize(&surface);
        let slots = seq.slots();
        match self.grammar.parse(&normalized) {
            Some(tree) => {
                let text = if self.grammar.abstracts_arguments() {
                    self.grammar.template_of(&tree)
                } else {
                    normalized
                };
                Ok(Template {
                    tokens,
                    slots,
                    tree: Some(tree),
                    text,
                })
            }
            None if strict => Err(Rejected::new(RejectReason::ParseError)),
            None => Ok(Template {
                tokens,
                slots,
                tree: None,
                text: normalized,
            }),
        }
    }
}
