//! Prediction Report Formatter
//!
//! Renders batch results for people. Each result set is sliced to the
//! display limit (`min(beam_size, display_cap)`) after it was built; the
//! slice never feeds back into decoding.

use super::pipeline::{BatchOutput, ExampleInput, Hypothesis, ResultSet, Results};

/// Printed for an example with no surviving hypothesis
pub const NO_TRANSLATION: &str = "I'm very sorry, I can't translate this command at the moment.";

/// Default upper bound on displayed predictions per example
pub const DEFAULT_DISPLAY_CAP: usize = 10;

/// Formats result sets as text reports
#[derive(Debug, Clone)]
pub struct ReportFormatter {
    beam_size: usize,
    display_cap: usize,
    show_chars: bool,
}

impl ReportFormatter {
    pub fn new(beam_size: usize) -> Self {
        Self {
            beam_size,
            display_cap: DEFAULT_DISPLAY_CAP,
            show_chars: false,
        }
    }

    pub fn with_display_cap(mut self, display_cap: usize) -> Self {
        self.display_cap = display_cap;
        self
    }

    /// Also print character-based companion outputs
    pub fn with_chars(mut self, show_chars: bool) -> Self {
        self.show_chars = show_chars;
        self
    }

    pub fn display_limit(&self) -> usize {
        self.beam_size.min(self.display_cap)
    }

    /// The displayed prefix of a result set
    pub fn displayed<'r>(&self, set: &'r ResultSet) -> &'r [Hypothesis] {
        let hypotheses = set.hypotheses();
        &hypotheses[..hypotheses.len().min(self.display_limit())]
    }

    /// Greedy line: `{text} ({score})`
    pub fn format_greedy(&self, hypothesis: &Hypothesis) -> String {
        format!("{} ({})", hypothesis.text, hypothesis.score)
    }

    /// Ranked predictions of one example
    pub fn format_set(&self, set: &ResultSet) -> String {
        if set.is_empty() {
            return format!("{}\n", NO_TRANSLATION);
        }
        let mut out = String::new();
        for (j, h) in self.displayed(set).iter().enumerate() {
            out.push_str(&format!("Prediction {}: {} ({})\n", j + 1, h.text, h.score));
            if self.show_chars {
                if let Some(chars) = &h.char_output {
                    out.push_str(&format!("Character-based prediction {}: {}\n", j + 1, chars));
                }
            }
        }
        out
    }

    /// Full report for a decoded batch
    pub fn format_batch(&self, batch: &[ExampleInput], output: &BatchOutput) -> String {
        let mut out = String::new();
        match &output.results {
            Results::Flat(set) => {
                if set.is_empty() {
                    out.push_str(NO_TRANSLATION);
                    out.push('\n');
                }
                for h in set {
                    out.push_str(&self.format_greedy(h));
                    out.push('\n');
                }
            }
            Results::Nested(sets) => {
                for (i, set) in sets.iter().enumerate() {
                    out.push_str(&format!("Example {}:", i + 1));
                    match batch.get(i).map(|e| e.input.trim()) {
                        Some(input) if !input.is_empty() => {
                            out.push_str(&format!(" {}\n", input));
                        }
                        _ => out.push('\n'),
                    }
                    out.push_str(&self.format_set(set));
                    out.push('\n');
                }
            }
        }
        out
    }
}
