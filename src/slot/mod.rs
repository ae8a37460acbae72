//! Argument Slot Filling
//!
//! Validated command templates carry argument slots (entity-category
//! placeholders such as `_FILE` or `_TIMESPAN`). This module validates
//! candidates into templates and fills their slots with entity values
//! extracted from the natural-language input.
//!
//! # Architecture
//!
//! ```text
//! DecodedSequence ─> CandidateValidator ─> Template { slots }
//!                                              │
//!                  EntityFiller list ──────────┤
//!                                              ▼
//!                                         SlotAligner ─> (Assignment, filled Template)
//!                                              │
//!                                    Compatibility scorer
//!                        (CategoryAffinity | HiddenStateCompatibility + KnnClassifier)
//! ```
//!
//! # Key Concepts
//!
//! - **EntityCategory**: placeholder type with a subsumption order
//! - **Duration flags**: `-mmin`, `-atime`, ... force the next slot to `_TIMESPAN`
//! - **Stable matching**: Gale–Shapley over the compatibility score table

pub mod classifier;
pub mod filler;
pub mod matching;
pub mod types;
pub mod validator;

// Re-export commonly used types
pub use classifier::{
    CategoryAffinity, ClassifierError, Compatibility, FeatureScorer, HiddenStateCompatibility,
    KnnClassifier,
};
pub use filler::{AlignError, SlotAligner};
pub use matching::{stable_match, MatchOutcome, ScoreTable};
pub use types::{is_duration_flag, Assignment, EntityCategory, EntityFiller, SlotCandidate};
pub use validator::{CandidateValidator, RejectReason, Rejected, Template};
