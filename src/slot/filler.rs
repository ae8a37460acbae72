//! Slot-Fill Aligner
//!
//! Places extracted entity fillers into the argument slots of a validated
//! template. Assignment is all-or-nothing: either every filler lands in a
//! distinct, category-compatible slot and the filled command re-parses, or
//! the hypothesis is declined.
//!
//! ```text
//! template slots ─┐
//!                 ├─> count check ─> score table ─> stable match ─> substitute ─> re-parse
//! fillers ────────┘   (no scoring)
//! ```

use thiserror::Error;

use super::classifier::Compatibility;
use super::matching::{stable_match, MatchOutcome, ScoreTable};
use super::types::{Assignment, EntityFiller};
use super::validator::Template;
use crate::grammar::Grammar;

/// Why an alignment was declined
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlignError {
    #[error("{slots} slots cannot hold {fillers} fillers")]
    SlotCount { slots: usize, fillers: usize },

    #[error("filler {filler} has no feasible slot")]
    Unassignable { filler: usize },

    #[error("filled command is not grammatical")]
    Ungrammatical,
}

/// Stable filler → slot aligner
pub struct SlotAligner<'g> {
    grammar: &'g dyn Grammar,
}

impl<'g> SlotAligner<'g> {
    pub fn new(grammar: &'g dyn Grammar) -> Self {
        Self { grammar }
    }

    /// Align `fillers` to the slots of `template`
    ///
    /// Returns the assignment and the filled template. The compatibility
    /// function is never called when there are fewer slots than fillers, nor
    /// for pairs whose categories are incompatible.
    pub fn align<C>(
        &self,
        template: &Template,
        fillers: &[EntityFiller],
        compat: &C,
    ) -> Result<(Assignment, Template), AlignError>
    where
        C: Compatibility + ?Sized,
    {
        let slots = &template.slots;
        if slots.len() < fillers.len() {
            return Err(AlignError::SlotCount {
                slots: slots.len(),
                fillers: fillers.len(),
            });
        }

        let table = ScoreTable::from_fn(fillers.len(), slots.len(), |f, s| {
            if slots[s].category.subsumes(fillers[f].category) {
                compat.score(&fillers[f], &slots[s])
            } else {
                f32::NEG_INFINITY
            }
        });
        let slot_of = match stable_match(&table) {
            MatchOutcome::Complete(slot_of) => slot_of,
            MatchOutcome::Unmatched(filler) => return Err(AlignError::Unassignable { filler }),
        };

        let mut tokens = template.tokens.clone();
        let mut pairs = Vec::with_capacity(fillers.len());
        for (f, &s) in slot_of.iter().enumerate() {
            let position = slots[s].position;
            tokens[position] = self.grammar.quote(&fillers[f].text);
            pairs.push((f, position));
        }
        let remaining = slots
            .iter()
            .enumerate()
            .filter(|(s, _)| !slot_of.contains(s))
            .map(|(_, slot)| slot.clone())
            .collect();

        let normalized = self.grammar.normalize(&tokens.join(" "));
        let (tree, text) = match self.grammar.parse(&normalized) {
            Some(tree) => {
                let text = self.grammar.render(&tree);
                (Some(tree), text)
            }
            // Unparsed templates stay unparsed once filled
            None if !template.is_parsed() => (None, normalized),
            None => return Err(AlignError::Ungrammatical),
        };

        let filled = Template {
            tokens,
            slots: remaining,
            tree,
            text,
        };
        Ok((Assignment { pairs }, filled))
    }
}
