//! Inference Output Decoding
//!
//! Turns model output beams into validated shell commands.
//!
//! ```text
//! BatchInput (beams of symbol ids, fillers, hidden states)
//!       │
//!       ▼
//! BeamPipeline ── SequenceDecoder ── CandidateValidator ── SlotAligner
//!       │
//!       ▼
//! BatchOutput { results, stats } ──> ReportFormatter
//! ```
//!
//! The model itself is upstream: this module only consumes its output ids,
//! scores and hidden states.

pub mod decoder;
pub mod formatter;
pub mod pipeline;

pub use decoder::{CharDecoder, DecodedSequence, SequenceDecoder, Token, TokenKind};
pub use formatter::{ReportFormatter, DEFAULT_DISPLAY_CAP, NO_TRANSLATION};
pub use pipeline::{
    BatchInput, BatchOutput, BatchStats, BeamPipeline, DecodeMode, ExampleInput, Hypothesis,
    PipelineError, PipelineOptions, RawHypothesis, Rejection, ResultSet, Results, DEFAULT_CAP,
};
