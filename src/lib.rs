//! nl2cmd - Natural Language to Shell Command Decoding
//!
//! Turns the ranked output beams of a natural-language → shell-command model
//! into validated command strings, optionally filling entity values from the
//! input sentence into argument slots.
//!
//! # Features
//!
//! - **Sequence decoding**: EOS truncation, subword merging, unknown-id substitution
//! - **Grammar validation**: pluggable shell and s-expression grammars
//! - **Templates**: arguments abstracted into typed placeholders (`_FILE`, `_TIMESPAN`, ...)
//! - **Slot filling**: stable matching of extracted entities to argument slots
//! - **Batch cap**: decoding stops after a fixed number of accepted hypotheses
//! - **Persistence**: prediction store with graceful encoding fallback
//!
//! # Example
//!
//! ```rust
//! use nl2cmd::grammar::BashGrammar;
//! use nl2cmd::inference::{BeamPipeline, ExampleInput, PipelineOptions, RawHypothesis};
//! use nl2cmd::vocab::Vocabulary;
//!
//! // Ids 9.. follow the reserved entries
//! let vocab = Vocabulary::with_reserved(["find", ".", "-name", "_REGEX"]);
//! let grammar = BashGrammar::new();
//! let pipeline = BeamPipeline::new(&vocab, &grammar, PipelineOptions::default());
//!
//! let example = ExampleInput {
//!     beam: vec![RawHypothesis::new(vec![9, 10, 11, 12, 1], -0.3)],
//!     ..ExampleInput::default()
//! };
//! let output = pipeline.decode_batch(&[example]).unwrap();
//! let best = output.results.sets()[0].best().unwrap();
//! assert_eq!(best.text, "find . -name _REGEX");
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   Model beams   │  symbol ids + scores (+ hidden states)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ SequenceDecoder │  ids → tokens
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │    Validator    │  grammar parse → template + slots
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   SlotAligner   │  fillers → slots (stable matching)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   ResultSets    │  report / store
//! └─────────────────┘
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod grammar;
pub mod inference;
pub mod slot;
pub mod store;
pub mod vocab;

// Re-export commonly used types
pub use config::{ConfigError, Nl2CmdConfig};
pub use grammar::{BashGrammar, Grammar, GrammarKind, ParenGrammar, Tree};
pub use inference::{
    BatchInput, BatchOutput, BatchStats, BeamPipeline, DecodeMode, DecodedSequence, ExampleInput,
    Hypothesis, PipelineError, PipelineOptions, RawHypothesis, ReportFormatter, ResultSet, Results,
    SequenceDecoder, NO_TRANSLATION,
};
pub use slot::{
    AlignError, Assignment, CandidateValidator, CategoryAffinity, Compatibility, EntityCategory,
    EntityFiller, KnnClassifier, SlotAligner, SlotCandidate, Template,
};
pub use store::{
    record_prediction, JsonlStore, MemoryStore, PredictionRecord, PredictionStore, RecordOutcome,
    StoreError,
};
pub use vocab::{SymbolId, VocabError, Vocabulary};
