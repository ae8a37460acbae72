//! Beam Manager
//!
//! Drives every hypothesis of a beam through the decode pipeline, best
//! first, and collects the survivors into result sets.
//!
//! # Architecture
//!
//! ```text
//! RawHypothesis { ids, score }
//!       │
//!       ▼
//! ┌─────────────────────────────────┐
//! │     SequenceDecoder             │  DecodeEmpty
//! └─────────────┬───────────────────┘
//!               │  slot-count check    SlotCountInfeasible
//!               ▼
//! ┌─────────────────────────────────┐
//! │     CandidateValidator          │  ParseRejected
//! └─────────────┬───────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────┐
//! │     SlotAligner (fillers only)  │  AssignmentInfeasible
//! └─────────────┬───────────────────┘
//!               │
//!               ▼
//!         Hypothesis → ResultSet
//! ```
//!
//! A rejection at any stage skips to the next hypothesis. Accepted
//! hypotheses are counted across the whole batch; once the cap is reached no
//! further hypothesis is decoded.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::grammar::Grammar;
use crate::inference::decoder::{CharDecoder, DecodedSequence, SequenceDecoder};
use crate::slot::{
    AlignError, Assignment, CandidateValidator, CategoryAffinity, EntityFiller, FeatureScorer,
    HiddenStateCompatibility, RejectReason, SlotAligner, Template,
};
use crate::vocab::{SymbolId, Vocabulary};

/// Accepted hypotheses per batch before decoding stops
pub const DEFAULT_CAP: usize = 20;

/// Longest character word read from a character grid row
pub const DEFAULT_MAX_CHAR_WORD_LEN: usize = 24;

/// Pipeline errors
///
/// Only caller mistakes surface here; hypothesis-level failures are counted
/// in [`BatchStats`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid batch input: {0}")]
    Input(#[from] serde_json::Error),

    #[error("Character outputs requested but no character vocabulary loaded")]
    MissingCharVocabulary,
}

/// Token decoding algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeMode {
    /// One hypothesis per example, results flattened across the batch
    Greedy,
    /// Ranked beam per example, one result set per example
    #[default]
    BeamSearch,
}

impl fmt::Display for DecodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeMode::Greedy => write!(f, "greedy"),
            DecodeMode::BeamSearch => write!(f, "beam_search"),
        }
    }
}

impl std::str::FromStr for DecodeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "greedy" => Ok(DecodeMode::Greedy),
            "beam_search" | "beam-search" | "beam" => Ok(DecodeMode::BeamSearch),
            other => Err(format!("unknown decoding algorithm '{}'", other)),
        }
    }
}

/// One model output hypothesis
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawHypothesis {
    /// Output symbol ids
    pub ids: Vec<SymbolId>,
    /// Model score
    #[serde(default)]
    pub score: f32,
    /// Character ids per output word, for companion outputs
    #[serde(default)]
    pub char_grid: Vec<Vec<SymbolId>>,
    /// Decoder hidden state per output position
    #[serde(default)]
    pub decoder_states: Vec<Vec<f32>>,
}

impl RawHypothesis {
    pub fn new(ids: Vec<SymbolId>, score: f32) -> Self {
        Self {
            ids,
            score,
            ..Self::default()
        }
    }
}

/// One input example and its beam
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExampleInput {
    /// Natural-language input text
    #[serde(default)]
    pub input: String,
    /// Hypotheses, best first
    pub beam: Vec<RawHypothesis>,
    /// Extracted entity values; `None` disables slot filling
    #[serde(default)]
    pub fillers: Option<Vec<EntityFiller>>,
    /// Encoder hidden state per input token
    #[serde(default)]
    pub encoder_states: Vec<Vec<f32>>,
}

/// A batch of examples
///
/// Reads either a JSON array of examples or `{ "examples": [...] }`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchInput {
    pub examples: Vec<ExampleInput>,
}

impl BatchInput {
    pub fn from_json(text: &str) -> Result<Self, PipelineError> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape {
            List(Vec<ExampleInput>),
            Wrapped { examples: Vec<ExampleInput> },
        }

        let examples = match serde_json::from_str::<Shape>(text)? {
            Shape::List(examples) => examples,
            Shape::Wrapped { examples } => examples,
        };
        Ok(Self { examples })
    }
}

/// Pipeline options
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub mode: DecodeMode,
    /// Accepted hypotheses per batch
    pub cap: usize,
    /// Reject ungrammatical candidates instead of passing them through
    pub strict: bool,
    /// Accept any non-empty surface text without parsing
    pub explain: bool,
    /// Target vocabulary is character-level
    pub char_mode: bool,
    /// Attach character-grid reconstructions to accepted hypotheses
    pub char_outputs: bool,
    /// Fill argument slots when fillers are supplied
    pub fill_slots: bool,
    pub max_char_word_len: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            mode: DecodeMode::BeamSearch,
            cap: DEFAULT_CAP,
            strict: true,
            explain: false,
            char_mode: false,
            char_outputs: false,
            fill_slots: true,
            max_char_word_len: DEFAULT_MAX_CHAR_WORD_LEN,
        }
    }
}

/// An accepted hypothesis
#[derive(Debug, Clone, Serialize)]
pub struct Hypothesis {
    /// Index of the example in the batch
    pub example: usize,
    /// Position in the input beam
    pub rank: usize,
    /// Output text
    pub text: String,
    pub score: f32,
    pub raw_ids: Vec<SymbolId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment: Option<Assignment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub char_output: Option<String>,
    #[serde(skip)]
    pub sequence: DecodedSequence,
    #[serde(skip)]
    pub template: Option<Template>,
}

/// Accepted hypotheses for one example, in beam order
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ResultSet {
    hypotheses: Vec<Hypothesis>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, hypothesis: Hypothesis) {
        self.hypotheses.push(hypothesis);
    }

    pub fn len(&self) -> usize {
        self.hypotheses.len()
    }

    /// Empty means "no translation", not an error
    pub fn is_empty(&self) -> bool {
        self.hypotheses.is_empty()
    }

    pub fn hypotheses(&self) -> &[Hypothesis] {
        &self.hypotheses
    }

    pub fn best(&self) -> Option<&Hypothesis> {
        self.hypotheses.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Hypothesis> {
        self.hypotheses.iter()
    }

    fn append(&mut self, other: ResultSet) {
        self.hypotheses.extend(other.hypotheses);
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Hypothesis;
    type IntoIter = std::slice::Iter<'a, Hypothesis>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Batch results
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Results {
    /// Greedy decoding: one set across all examples
    Flat(ResultSet),
    /// Beam search: one set per example, by example index
    Nested(Vec<ResultSet>),
}

impl Results {
    pub fn sets(&self) -> &[ResultSet] {
        match self {
            Results::Flat(set) => std::slice::from_ref(set),
            Results::Nested(sets) => sets,
        }
    }

    /// Total accepted hypotheses
    pub fn total(&self) -> usize {
        self.sets().iter().map(ResultSet::len).sum()
    }
}

/// Why a hypothesis was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    DecodeEmpty,
    ParseRejected,
    SlotCountInfeasible,
    AssignmentInfeasible,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::DecodeEmpty => write!(f, "decoded to nothing"),
            Rejection::ParseRejected => write!(f, "not grammatical"),
            Rejection::SlotCountInfeasible => write!(f, "fewer slots than fillers"),
            Rejection::AssignmentInfeasible => write!(f, "no feasible slot assignment"),
        }
    }
}

impl From<AlignError> for Rejection {
    fn from(err: AlignError) -> Self {
        match err {
            AlignError::SlotCount { .. } => Rejection::SlotCountInfeasible,
            AlignError::Unassignable { .. } | AlignError::Ungrammatical => {
                Rejection::AssignmentInfeasible
            }
        }
    }
}

/// Batch statistics, accumulated per call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub examples: usize,
    /// Hypotheses that entered the decoder
    pub decoded: usize,
    pub accepted: usize,
    pub decode_empty: usize,
    pub parse_rejected: usize,
    pub slot_count_infeasible: usize,
    pub assignment_infeasible: usize,
    /// Longest decoded token sequence
    pub max_token_len: usize,
    /// Longest character-level output, in characters
    pub max_char_len: usize,
    pub cap_hit: bool,
}

impl BatchStats {
    fn reject(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::DecodeEmpty => self.decode_empty += 1,
            Rejection::ParseRejected => self.parse_rejected += 1,
            Rejection::SlotCountInfeasible => self.slot_count_infeasible += 1,
            Rejection::AssignmentInfeasible => self.assignment_infeasible += 1,
        }
    }

    /// Total dropped hypotheses
    pub fn rejected(&self) -> usize {
        self.decode_empty + self.parse_rejected + self.slot_count_infeasible + self.assignment_infeasible
    }
}

/// Output of [`BeamPipeline::decode_batch`]
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutput {
    pub results: Results,
    pub stats: BatchStats,
}

/// Decode-and-align pipeline over a batch of beams
pub struct BeamPipeline<'a> {
    vocab: &'a Vocabulary,
    char_vocab: Option<&'a Vocabulary>,
    grammar: &'a dyn Grammar,
    scorer: Option<&'a dyn FeatureScorer>,
    options: PipelineOptions,
}

impl<'a> BeamPipeline<'a> {
    pub fn new(vocab: &'a Vocabulary, grammar: &'a dyn Grammar, options: PipelineOptions) -> Self {
        Self {
            vocab,
            char_vocab: None,
            grammar,
            scorer: None,
            options,
        }
    }

    /// Character vocabulary for companion outputs
    pub fn with_char_vocab(mut self, char_vocab: &'a Vocabulary) -> Self {
        self.char_vocab = Some(char_vocab);
        self
    }

    /// Hidden-state scorer for slot filling; without one, fillers are
    /// aligned on category affinity alone
    pub fn with_scorer(mut self, scorer: &'a dyn FeatureScorer) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Decode a batch
    pub fn decode_batch(&self, batch: &[ExampleInput]) -> Result<BatchOutput, PipelineError> {
        if self.options.char_outputs && self.char_vocab.is_none() {
            return Err(PipelineError::MissingCharVocabulary);
        }

        let mut stats = BatchStats {
            examples: batch.len(),
            ..BatchStats::default()
        };
        let mut flat = ResultSet::new();
        let mut nested = Vec::with_capacity(batch.len());

        for (index, example) in batch.iter().enumerate() {
            let set = self.decode_example(index, example, &mut stats);
            match self.options.mode {
                DecodeMode::Greedy => flat.append(set),
                DecodeMode::BeamSearch => nested.push(set),
            }
        }

        tracing::debug!(
            examples = stats.examples,
            decoded = stats.decoded,
            accepted = stats.accepted,
            rejected = stats.rejected(),
            cap_hit = stats.cap_hit,
            "batch decoded"
        );

        let results = match self.options.mode {
            DecodeMode::Greedy => Results::Flat(flat),
            DecodeMode::BeamSearch => Results::Nested(nested),
        };
        Ok(BatchOutput { results, stats })
    }

    fn decode_example(&self, index: usize, example: &ExampleInput, stats: &mut BatchStats) -> ResultSet {
        let mut set = ResultSet::new();
        let beam = match self.options.mode {
            DecodeMode::Greedy => &example.beam[..example.beam.len().min(1)],
            DecodeMode::BeamSearch => &example.beam[..],
        };

        for (rank, raw) in beam.iter().enumerate() {
            if stats.accepted >= self.options.cap {
                stats.cap_hit = true;
                break;
            }
            match self.process(index, example, rank, raw, stats) {
                Ok(hypothesis) => {
                    set.push(hypothesis);
                    stats.accepted += 1;
                    if stats.accepted >= self.options.cap {
                        stats.cap_hit = true;
                        tracing::debug!(example = index, rank, cap = self.options.cap, "decode cap reached");
                    }
                }
                Err(rejection) => {
                    stats.reject(rejection);
                    tracing::debug!(example = index, rank, reason = %rejection, "hypothesis rejected");
                }
            }
        }
        set
    }

    /// Run one hypothesis through every stage
    fn process(
        &self,
        index: usize,
        example: &ExampleInput,
        rank: usize,
        raw: &RawHypothesis,
        stats: &mut BatchStats,
    ) -> Result<Hypothesis, Rejection> {
        stats.decoded += 1;
        let decoder = SequenceDecoder::new(self.vocab);
        let sequence = if self.options.char_mode {
            let text = decoder.decode_chars(&raw.ids);
            stats.max_char_len = stats.max_char_len.max(text.chars().count());
            DecodedSequence::from_surface(&text)
        } else {
            decoder.decode(&raw.ids)
        };
        stats.max_token_len = stats.max_token_len.max(sequence.len());
        if sequence.is_empty() {
            return Err(Rejection::DecodeEmpty);
        }

        let fillers = self.fillers_for(example);
        if let Some(fillers) = fillers {
            // Cheap check before parsing and scoring
            if sequence.slots().len() < fillers.len() {
                return Err(Rejection::SlotCountInfeasible);
            }
        }

        let validator = CandidateValidator::new(self.grammar).explain(self.options.explain);
        let template = validator
            .validate(&sequence, self.options.strict)
            .map_err(|rejected| match rejected.reason {
                RejectReason::EmptyOutput => Rejection::DecodeEmpty,
                RejectReason::ParseError => Rejection::ParseRejected,
            })?;

        let (template, assignment) = match fillers {
            Some(fillers) => {
                let aligner = SlotAligner::new(self.grammar);
                let aligned = match self.scorer {
                    Some(scorer) => {
                        // Slot positions count decoded tokens, states count raw ids
                        let decoder_states = raw
                            .decoder_states
                            .get(sequence.raw_offset()..)
                            .unwrap_or(&[]);
                        let compat = HiddenStateCompatibility::new(
                            scorer,
                            &example.encoder_states,
                            decoder_states,
                        );
                        aligner.align(&template, fillers, &compat)
                    }
                    None => aligner.align(&template, fillers, &CategoryAffinity),
                };
                let (assignment, filled) = aligned.map_err(Rejection::from)?;
                (filled, Some(assignment))
            }
            None => (template, None),
        };

        let char_output = match (self.options.char_outputs, self.char_vocab) {
            (true, Some(char_vocab)) => {
                let text = CharDecoder::new(char_vocab)
                    .decode_grid(&raw.char_grid, self.options.max_char_word_len);
                stats.max_char_len = stats.max_char_len.max(text.chars().count());
                Some(text)
            }
            _ => None,
        };

        Ok(Hypothesis {
            example: index,
            rank,
            text: template.text.clone(),
            score: raw.score,
            raw_ids: raw.ids.clone(),
            assignment,
            char_output,
            sequence,
            template: Some(template),
        })
    }

    /// Fillers to align, if slot filling applies to this example
    ///
    /// Character-level decoding and explain mode never fill slots, nor do
    /// grammars whose templates carry no argument slots.
    fn fillers_for<'e>(&self, example: &'e ExampleInput) -> Option<&'e [EntityFiller]> {
        if !self.options.fill_slots
            || self.options.char_mode
            || self.options.explain
            || !self.grammar.abstracts_arguments()
        {
            return None;
        }
        example.fillers.as_deref().filter(|f| !f.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::BashGrammar;
    use crate::slot::EntityCategory;
    use crate::vocab::EOS_ID;

    // 9: find  10: .  11: -name  12: _REGEX  13: |  14: ls  15: _FILE  16: cat
    fn vocab() -> Vocabulary {
        Vocabulary::with_reserved(["find", ".", "-name", "_REGEX", "|", "ls", "_FILE", "cat"])
    }

    fn example(beam: Vec<Vec<SymbolId>>) -> ExampleInput {
        ExampleInput {
            beam: beam
                .into_iter()
                .enumerate()
                .map(|(i, ids)| RawHypothesis::new(ids, -(i as f32)))
                .collect(),
            ..ExampleInput::default()
        }
    }

    #[test]
    fn test_rejections_are_counted() {
        let v = vocab();
        let g = BashGrammar::new();
        let p = BeamPipeline::new(&v, &g, PipelineOptions::default());
        let batch = vec![example(vec![
            vec![EOS_ID, 9],
            vec![13, 14, EOS_ID],
            vec![9, 10, 11, 12, EOS_ID],
        ])];
        let out = p.decode_batch(&batch).unwrap();
        assert_eq!(out.stats.decode_empty, 1);
        assert_eq!(out.stats.parse_rejected, 1);
        assert_eq!(out.stats.accepted, 1);
        assert_eq!(out.stats.max_token_len, 4);

        let Results::Nested(sets) = &out.results else {
            panic!("beam search yields nested results");
        };
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].best().unwrap().text, "find . -name _REGEX");
        assert_eq!(sets[0].best().unwrap().rank, 2);
    }

    #[test]
    fn test_lenient_mode_passes_through() {
        let v = vocab();
        let g = BashGrammar::new();
        let options = PipelineOptions {
            strict: false,
            ..PipelineOptions::default()
        };
        let p = BeamPipeline::new(&v, &g, options);
        let out = p.decode_batch(&[example(vec![vec![13, 14]])]).unwrap();
        assert_eq!(out.results.total(), 1);
        assert_eq!(out.results.sets()[0].best().unwrap().text, "| ls");
    }

    #[test]
    fn test_slot_count_checked_before_parsing() {
        let v = vocab();
        let g = BashGrammar::new();
        let p = BeamPipeline::new(&v, &g, PipelineOptions::default());
        let mut ex = example(vec![vec![13, 15], vec![16, 15]]);
        ex.fillers = Some(vec![
            EntityFiller::new("a.txt", EntityCategory::File),
            EntityFiller::new("b.txt", EntityCategory::File),
        ]);
        let out = p.decode_batch(&[ex]).unwrap();
        // Ungrammatical first hypothesis fails the count check, not the parse
        assert_eq!(out.stats.slot_count_infeasible, 2);
        assert_eq!(out.stats.parse_rejected, 0);
        assert_eq!(out.results.total(), 0);
    }

    #[test]
    fn test_fillers_ignored_in_explain_mode() {
        let v = vocab();
        let g = BashGrammar::new();
        let options = PipelineOptions {
            explain: true,
            ..PipelineOptions::default()
        };
        let p = BeamPipeline::new(&v, &g, options);
        let mut ex = example(vec![vec![16, 15]]);
        ex.fillers = Some(vec![EntityFiller::new("a", EntityCategory::File); 3]);
        let out = p.decode_batch(&[ex]).unwrap();
        let best = out.results.sets()[0].best().unwrap();
        assert_eq!(best.text, "cat _FILE");
        assert!(best.assignment.is_none());
    }

    #[test]
    fn test_char_outputs_need_char_vocab() {
        let v = vocab();
        let g = BashGrammar::new();
        let options = PipelineOptions {
            char_outputs: true,
            ..PipelineOptions::default()
        };
        let p = BeamPipeline::new(&v, &g, options);
        assert!(matches!(
            p.decode_batch(&[]),
            Err(PipelineError::MissingCharVocabulary)
        ));
    }

    #[test]
    fn test_batch_input_shapes() {
        let list = r#"[{"beam": [{"ids": [9, 1]}]}]"#;
        let wrapped = r#"{"examples": [{"input": "find", "beam": [{"ids": [9], "score": -0.5}]}]}"#;
        assert_eq!(BatchInput::from_json(list).unwrap().examples.len(), 1);
        let batch = BatchInput::from_json(wrapped).unwrap();
        assert_eq!(batch.examples[0].beam[0].score, -0.5);
        assert!(batch.examples[0].fillers.is_none());
        assert!(BatchInput::from_json("{\"beam\": 3}").is_err());
    }

    #[test]
    fn test_decode_mode_from_str() {
        assert_eq!("greedy".parse::<DecodeMode>(), Ok(DecodeMode::Greedy));
        assert_eq!("beam_search".parse::<DecodeMode>(), Ok(DecodeMode::BeamSearch));
        assert!("sampling".parse::<DecodeMode>().is_err());
    }
}
