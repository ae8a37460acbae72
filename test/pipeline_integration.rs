//! Pipeline Integration Tests for nl2cmd
//!
//! Drives whole batches through the decode pipeline: sequence decoding,
//! grammar validation, slot filling, the batch cap and reporting.

use std::sync::atomic::{AtomicUsize, Ordering};

use nl2cmd::grammar::{BashGrammar, Grammar, ParenGrammar, Tree};
use nl2cmd::inference::{
    BeamPipeline, DecodeMode, ExampleInput, PipelineOptions, RawHypothesis, ReportFormatter,
    Results, NO_TRANSLATION,
};
use nl2cmd::slot::{EntityCategory, EntityFiller, FeatureScorer, KnnClassifier};
use nl2cmd::vocab::{SymbolId, Vocabulary, EOS_ID, GO_ID, PAD_ID};

/// Shell grammar that counts how often each capability is used
#[derive(Default)]
struct CountingGrammar {
    inner: BashGrammar,
    parses: AtomicUsize,
    quotes: AtomicUsize,
}

impl CountingGrammar {
    fn parses(&self) -> usize {
        self.parses.load(Ordering::SeqCst)
    }

    fn quotes(&self) -> usize {
        self.quotes.load(Ordering::SeqCst)
    }
}

impl Grammar for CountingGrammar {
    fn name(&self) -> &str {
        "counting"
    }

    fn normalize(&self, surface: &str) -> String {
        self.inner.normalize(surface)
    }

    fn parse(&self, text: &str) -> Option<Tree> {
        self.parses.fetch_add(1, Ordering::SeqCst);
        self.inner.parse(text)
    }

    fn render(&self, tree: &Tree) -> String {
        self.inner.render(tree)
    }

    fn template_of(&self, tree: &Tree) -> String {
        self.inner.template_of(tree)
    }

    fn quote(&self, literal: &str) -> String {
        self.quotes.fetch_add(1, Ordering::SeqCst);
        self.inner.quote(literal)
    }

    fn abstracts_arguments(&self) -> bool {
        true
    }
}

// 9: find  10: .  11: -name  12: _REGEX  13: -mmin  14: _NUMBER  15: cat
// 16: _FILE  17: cp  18: |  19: wc  20: -l  21: -maxdepth  22: ls  23: -a
fn shell_vocab() -> Vocabulary {
    Vocabulary::with_reserved([
        "find", ".", "-name", "_REGEX", "-mmin", "_NUMBER", "cat", "_FILE", "cp", "|", "wc", "-l",
        "-maxdepth", "ls", "-a",
    ])
}

fn example(beam: Vec<Vec<SymbolId>>) -> ExampleInput {
    ExampleInput {
        beam: beam
            .into_iter()
            .enumerate()
            .map(|(i, ids)| RawHypothesis::new(ids, 0.0 - 0.5 * i as f32))
            .collect(),
        ..ExampleInput::default()
    }
}

fn greedy() -> PipelineOptions {
    PipelineOptions {
        mode: DecodeMode::Greedy,
        ..PipelineOptions::default()
    }
}

// ============================================================================
// Greedy decoding
// ============================================================================

#[test]
fn test_greedy_single_token() {
    // Id 42 is "find"
    let mut tokens: Vec<String> = (9..42).map(|i| format!("tok{}", i)).collect();
    tokens.push("find".to_string());
    let vocab = Vocabulary::with_reserved(tokens);
    assert_eq!(vocab.id("find"), Some(42));

    let grammar = CountingGrammar::default();
    let pipeline = BeamPipeline::new(&vocab, &grammar, greedy());
    let batch = vec![example(vec![vec![GO_ID, 42, EOS_ID, PAD_ID, PAD_ID]])];
    let output = pipeline.decode_batch(&batch).unwrap();

    let Results::Flat(set) = &output.results else {
        panic!("greedy decoding yields a flat result set");
    };
    assert_eq!(set.len(), 1);
    let best = set.best().unwrap();
    assert_eq!(best.sequence.texts(), vec!["find"]);
    assert_eq!(best.text, "find");
    assert!(best.assignment.is_none());
    assert_eq!(grammar.quotes(), 0);
}

#[test]
fn test_greedy_uses_first_hypothesis_only() {
    let vocab = shell_vocab();
    let grammar = BashGrammar::new();
    let pipeline = BeamPipeline::new(&vocab, &grammar, greedy());
    let batch = vec![
        example(vec![vec![22, 23, EOS_ID], vec![15, 16, EOS_ID]]),
        // Ungrammatical first hypothesis: the valid second one is not used
        example(vec![vec![18, 19, EOS_ID], vec![22, EOS_ID]]),
        example(vec![vec![19, 20, EOS_ID]]),
    ];
    let output = pipeline.decode_batch(&batch).unwrap();

    let texts: Vec<&str> = output.results.sets()[0]
        .iter()
        .map(|h| h.text.as_str())
        .collect();
    assert_eq!(texts, vec!["ls -a", "wc -l"]);
    assert_eq!(output.results.sets()[0].hypotheses()[1].example, 2);
    assert_eq!(output.stats.decoded, 3);
    assert_eq!(output.stats.parse_rejected, 1);

    let report = ReportFormatter::new(1).format_batch(&batch, &output);
    assert_eq!(report, "ls -a (0)\nwc -l (0)\n");
}

// ============================================================================
// Batch cap
// ============================================================================

#[test]
fn test_cap_stops_decoding() {
    let vocab = shell_vocab();
    let grammar = CountingGrammar::default();
    let pipeline = BeamPipeline::new(&vocab, &grammar, PipelineOptions::default());
    let batch = vec![example(vec![vec![22, 23, EOS_ID]; 30])];
    let output = pipeline.decode_batch(&batch).unwrap();

    assert_eq!(output.results.total(), 20);
    assert_eq!(output.stats.accepted, 20);
    assert_eq!(output.stats.decoded, 20);
    assert!(output.stats.cap_hit);
    // Hypotheses after the 20th acceptance are never validated
    assert_eq!(grammar.parses(), 20);

    let ranks: Vec<usize> = output.results.sets()[0].iter().map(|h| h.rank).collect();
    assert_eq!(ranks, (0..20).collect::<Vec<_>>());
}

#[test]
fn test_cap_spans_examples() {
    let vocab = shell_vocab();
    let grammar = CountingGrammar::default();
    let options = PipelineOptions {
        cap: 5,
        ..PipelineOptions::default()
    };
    let pipeline = BeamPipeline::new(&vocab, &grammar, options);
    let batch = vec![
        example(vec![vec![22, EOS_ID]; 3]),
        example(vec![vec![22, 23, EOS_ID]; 4]),
        example(vec![vec![19, EOS_ID]; 2]),
    ];
    let output = pipeline.decode_batch(&batch).unwrap();

    let Results::Nested(sets) = &output.results else {
        panic!("beam search yields nested results");
    };
    let sizes: Vec<usize> = sets.iter().map(|s| s.len()).collect();
    assert_eq!(sizes, vec![3, 2, 0]);
    assert_eq!(grammar.parses(), 5);
    assert!(output.stats.cap_hit);
    assert_eq!(output.stats.examples, 3);
}

#[test]
fn test_rejections_do_not_count_towards_cap() {
    let vocab = shell_vocab();
    let grammar = BashGrammar::new();
    let options = PipelineOptions {
        cap: 2,
        ..PipelineOptions::default()
    };
    let pipeline = BeamPipeline::new(&vocab, &grammar, options);
    let batch = vec![example(vec![
        vec![EOS_ID],
        vec![18, EOS_ID],
        vec![22, EOS_ID],
        vec![18, 19],
        vec![19, 20, EOS_ID],
        vec![22, 23, EOS_ID],
    ])];
    let output = pipeline.decode_batch(&batch).unwrap();

    let ranks: Vec<usize> = output.results.sets()[0].iter().map(|h| h.rank).collect();
    assert_eq!(ranks, vec![2, 4]);
    assert_eq!(output.stats.decode_empty, 1);
    assert_eq!(output.stats.parse_rejected, 2);
    assert_eq!(output.stats.decoded, 5);
}

// ============================================================================
// Empty results
// ============================================================================

#[test]
fn test_empty_result_sets_keep_their_index() {
    let vocab = shell_vocab();
    let grammar = BashGrammar::new();
    let pipeline = BeamPipeline::new(&vocab, &grammar, PipelineOptions::default());
    let mut batch = vec![
        example(vec![]),
        example(vec![vec![EOS_ID], vec![18, EOS_ID]]),
        example(vec![vec![15, 16, EOS_ID]]),
    ];
    batch[2].input = "print the file".to_string();
    let output = pipeline.decode_batch(&batch).unwrap();

    let Results::Nested(sets) = &output.results else {
        panic!("beam search yields nested results");
    };
    assert_eq!(sets.len(), 3);
    assert!(sets[0].is_empty());
    assert!(sets[1].is_empty());
    assert_eq!(sets[2].best().unwrap().text, "cat _FILE");

    let report = ReportFormatter::new(100).format_batch(&batch, &output);
    let expected = format!(
        "Example 1:\n{0}\n\nExample 2:\n{0}\n\nExample 3: print the file\nPrediction 1: cat _FILE (0)\n\n",
        NO_TRANSLATION
    );
    assert_eq!(report, expected);
}

// ============================================================================
// Slot filling
// ============================================================================

#[test]
fn test_fill_slots_with_duration_context() {
    let vocab = shell_vocab();
    let grammar = BashGrammar::new();
    let pipeline = BeamPipeline::new(&vocab, &grammar, PipelineOptions::default());

    let mut ex = example(vec![
        // -maxdepth _NUMBER cannot hold a timespan
        vec![9, 10, 11, 12, 21, 14, EOS_ID],
        vec![9, 10, 11, 12, 13, 14, EOS_ID],
    ]);
    ex.fillers = Some(vec![
        EntityFiller::new("+45", EntityCategory::Timespan),
        EntityFiller::new("*.log", EntityCategory::Regex),
    ]);
    let output = pipeline.decode_batch(&[ex]).unwrap();

    assert_eq!(output.stats.assignment_infeasible, 1);
    let best = output.results.sets()[0].best().unwrap();
    assert_eq!(best.rank, 1);
    assert_eq!(best.text, "find . -name *.log -mmin +45");
    let assignment = best.assignment.as_ref().unwrap();
    assert_eq!(assignment.slot_of(0), Some(5));
    assert_eq!(assignment.slot_of(1), Some(3));
    assert!(assignment.is_admissible(2));
}

#[test]
fn test_fill_quotes_multi_word_values() {
    let vocab = shell_vocab();
    let grammar = BashGrammar::new();
    let pipeline = BeamPipeline::new(&vocab, &grammar, PipelineOptions::default());

    let mut ex = example(vec![vec![15, 16, EOS_ID]]);
    ex.fillers = Some(vec![EntityFiller::new("my notes.txt", EntityCategory::File)]);
    let output = pipeline.decode_batch(&[ex]).unwrap();

    let best = output.results.sets()[0].best().unwrap();
    assert_eq!(best.text, "cat 'my notes.txt'");
}

#[test]
fn test_too_few_slots_rejected_before_validation() {
    let vocab = shell_vocab();
    let grammar = CountingGrammar::default();
    let pipeline = BeamPipeline::new(&vocab, &grammar, PipelineOptions::default());

    let mut ex = example(vec![vec![15, 16, EOS_ID], vec![22, EOS_ID]]);
    ex.fillers = Some(vec![
        EntityFiller::new("a.txt", EntityCategory::File),
        EntityFiller::new("b.txt", EntityCategory::File),
    ]);
    let output = pipeline.decode_batch(&[ex]).unwrap();

    assert_eq!(output.stats.slot_count_infeasible, 2);
    assert_eq!(grammar.parses(), 0);
    assert!(output.results.sets()[0].is_empty());
}

#[test]
fn test_fill_with_hidden_state_classifier() {
    // Aligned pairs have matching encoder and decoder states
    let knn = KnnClassifier::new(
        1,
        vec![
            vec![1.0, 0.0, 1.0, 0.0],
            vec![0.0, 1.0, 0.0, 1.0],
            vec![1.0, 0.0, 0.0, 1.0],
            vec![0.0, 1.0, 1.0, 0.0],
        ],
        vec![1.0, 1.0, 0.0, 0.0],
    )
    .unwrap();

    let vocab = shell_vocab();
    let grammar = BashGrammar::new();
    let pipeline =
        BeamPipeline::new(&vocab, &grammar, PipelineOptions::default()).with_scorer(&knn);

    let mut hypothesis = RawHypothesis::new(vec![17, 16, 16, EOS_ID], -0.1);
    hypothesis.decoder_states = vec![vec![0.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0]];
    let ex = ExampleInput {
        input: "copy a.txt to b.txt".to_string(),
        beam: vec![hypothesis],
        fillers: Some(vec![
            EntityFiller::new("a.txt", EntityCategory::File).at(0),
            EntityFiller::new("b.txt", EntityCategory::File).at(1),
        ]),
        encoder_states: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
    };
    let output = pipeline.decode_batch(&[ex]).unwrap();

    let best = output.results.sets()[0].best().unwrap();
    assert_eq!(best.text, "cp b.txt a.txt");
    let assignment = best.assignment.as_ref().unwrap();
    assert_eq!(assignment.slot_of(0), Some(2));
    assert_eq!(assignment.slot_of(1), Some(1));
}

#[test]
fn test_missing_hidden_states_make_assignment_infeasible() {
    let knn = KnnClassifier::new(1, vec![vec![1.0, 1.0]], vec![1.0]).unwrap();
    let vocab = shell_vocab();
    let grammar = BashGrammar::new();
    let pipeline =
        BeamPipeline::new(&vocab, &grammar, PipelineOptions::default()).with_scorer(&knn);

    let mut ex = example(vec![vec![15, 16, EOS_ID]]);
    ex.fillers = Some(vec![EntityFiller::new("a.txt", EntityCategory::File)]);
    let output = pipeline.decode_batch(&[ex]).unwrap();

    assert_eq!(output.stats.assignment_infeasible, 1);
    assert_eq!(output.results.total(), 0);
}

/// Scores a pair by the first component of the slot's decoder state
struct DecoderStateScorer;

impl FeatureScorer for DecoderStateScorer {
    fn score_features(&self, _filler: &[f32], slot: &[f32]) -> f32 {
        slot.first().copied().unwrap_or(f32::NAN)
    }
}

#[test]
fn test_hidden_states_follow_start_symbol() {
    let vocab = shell_vocab();
    let grammar = BashGrammar::new();
    let pipeline = BeamPipeline::new(&vocab, &grammar, PipelineOptions::default())
        .with_scorer(&DecoderStateScorer);

    // Only the state emitted alongside _FILE is finite
    let mut plain = RawHypothesis::new(vec![15, 16, EOS_ID], -0.1);
    plain.decoder_states = vec![vec![f32::NAN], vec![1.0]];
    let mut started = RawHypothesis::new(vec![GO_ID, 15, 16, EOS_ID], -0.1);
    started.decoder_states = vec![vec![f32::NAN], vec![f32::NAN], vec![1.0]];

    let batch: Vec<ExampleInput> = [plain, started]
        .into_iter()
        .map(|hypothesis| ExampleInput {
            input: "show a.txt".to_string(),
            beam: vec![hypothesis],
            fillers: Some(vec![EntityFiller::new("a.txt", EntityCategory::File).at(0)]),
            encoder_states: vec![vec![0.0]],
        })
        .collect();
    let output = pipeline.decode_batch(&batch).unwrap();

    assert_eq!(output.stats.assignment_infeasible, 0);
    for set in output.results.sets() {
        let best = set.best().unwrap();
        assert_eq!(best.text, "cat a.txt");
        assert_eq!(best.assignment.as_ref().unwrap().slot_of(0), Some(1));
    }
}

#[test]
fn test_slot_filling_disabled() {
    let vocab = shell_vocab();
    let grammar = BashGrammar::new();
    let options = PipelineOptions {
        fill_slots: false,
        ..PipelineOptions::default()
    };
    let pipeline = BeamPipeline::new(&vocab, &grammar, options);

    let mut ex = example(vec![vec![15, 16, EOS_ID]]);
    ex.fillers = Some(vec![EntityFiller::new("a.txt", EntityCategory::File); 2]);
    let output = pipeline.decode_batch(&[ex]).unwrap();

    let best = output.results.sets()[0].best().unwrap();
    assert_eq!(best.text, "cat _FILE");
    assert!(best.assignment.is_none());
}

// ============================================================================
// Other backends and modes
// ============================================================================

#[test]
fn test_paren_grammar_backend() {
    // 9: (  10: )  11: and  12: a  13: b
    let vocab = Vocabulary::with_reserved(["(", ")", "and", "a", "b"]);
    let grammar = ParenGrammar::new();
    let pipeline = BeamPipeline::new(&vocab, &grammar, PipelineOptions::default());

    let mut ex = example(vec![
        vec![9, 11, 12, EOS_ID],
        vec![9, 11, 12, 13, 10, EOS_ID],
    ]);
    // No argument slots in s-expressions: fillers are ignored
    ex.fillers = Some(vec![EntityFiller::new("x", EntityCategory::Generic)]);
    let output = pipeline.decode_batch(&[ex]).unwrap();

    assert_eq!(output.stats.parse_rejected, 1);
    let best = output.results.sets()[0].best().unwrap();
    assert_eq!(best.text, "( and a b )");
    assert!(best.assignment.is_none());
}

#[test]
fn test_character_companion_outputs() {
    let vocab = shell_vocab();
    // 4: l  5: s  6: -  7: a
    let chars = Vocabulary::chars_with_reserved("ls-a".chars());
    let grammar = BashGrammar::new();
    let options = PipelineOptions {
        char_outputs: true,
        ..PipelineOptions::default()
    };
    let pipeline = BeamPipeline::new(&vocab, &grammar, options).with_char_vocab(&chars);

    let mut hypothesis = RawHypothesis::new(vec![22, 23, EOS_ID], -0.2);
    hypothesis.char_grid = vec![vec![4, 5, 1], vec![6, 7, 1, 0]];
    let ex = ExampleInput {
        beam: vec![hypothesis],
        ..ExampleInput::default()
    };
    let output = pipeline.decode_batch(std::slice::from_ref(&ex)).unwrap();

    let best = output.results.sets()[0].best().unwrap();
    assert_eq!(best.char_output.as_deref(), Some("ls -a"));
    assert_eq!(output.stats.max_char_len, 5);

    let report = ReportFormatter::new(10)
        .with_chars(true)
        .format_set(&output.results.sets()[0]);
    assert_eq!(
        report,
        "Prediction 1: ls -a (-0.2)\nCharacter-based prediction 1: ls -a\n"
    );
}

#[test]
fn test_character_level_decoding() {
    // 4: l  5: s  6: ' '  7: -  8: a
    let chars = Vocabulary::chars_with_reserved("ls -a".chars());
    let grammar = BashGrammar::new();
    let options = PipelineOptions {
        char_mode: true,
        ..PipelineOptions::default()
    };
    let pipeline = BeamPipeline::new(&chars, &grammar, options);

    let mut ex = example(vec![vec![4, 5, 6, 7, 8, EOS_ID, 4]]);
    ex.fillers = Some(vec![EntityFiller::new("x", EntityCategory::Generic); 4]);
    let output = pipeline.decode_batch(&[ex]).unwrap();

    let best = output.results.sets()[0].best().unwrap();
    assert_eq!(best.text, "ls -a");
    assert!(best.assignment.is_none());
    assert_eq!(output.stats.max_char_len, 5);
}

#[test]
fn test_decode_batch_from_json() {
    let json = r#"{
        "examples": [
            {
                "input": "show the contents of notes.txt",
                "beam": [{"ids": [15, 16, 1], "score": -0.25}],
                "fillers": [{"text": "notes.txt", "category": "File", "source_position": 4}]
            }
        ]
    }"#;
    let batch = nl2cmd::inference::BatchInput::from_json(json).unwrap();
    let vocab = shell_vocab();
    let grammar = BashGrammar::new();
    let pipeline = BeamPipeline::new(&vocab, &grammar, PipelineOptions::default());
    let output = pipeline.decode_batch(&batch.examples).unwrap();

    let best = output.results.sets()[0].best().unwrap();
    assert_eq!(best.text, "cat notes.txt");
    assert_eq!(best.score, -0.25);

    let json = serde_json::to_value(&output).unwrap();
    assert_eq!(json["results"]["nested"][0][0]["text"], "cat notes.txt");
    assert_eq!(json["stats"]["accepted"], 1);
}
