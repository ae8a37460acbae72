//! Filler/Slot Compatibility Scoring
//!
//! The aligner only needs a total order over filler/slot pairs. Scorers
//! implement [`Compatibility`]; any `Fn(&EntityFiller, &SlotCandidate) -> f32`
//! closure does too.
//!
//! - [`CategoryAffinity`] scores on categories alone (used when no hidden
//!   states are available).
//! - [`KnnClassifier`] scores a concatenated (encoder state, decoder state)
//!   feature vector against labelled training alignments.
//! - [`HiddenStateCompatibility`] looks up those states for a hypothesis.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use super::types::{EntityFiller, SlotCandidate};

/// Pairwise compatibility between a filler and a slot
///
/// Higher is better; non-finite scores mark the pair infeasible.
pub trait Compatibility {
    fn score(&self, filler: &EntityFiller, slot: &SlotCandidate) -> f32;
}

impl<F> Compatibility for F
where
    F: Fn(&EntityFiller, &SlotCandidate) -> f32,
{
    fn score(&self, filler: &EntityFiller, slot: &SlotCandidate) -> f32 {
        self(filler, slot)
    }
}

/// Category-only scorer: exact match 1.0, subsumed 0.5
#[derive(Debug, Clone, Copy, Default)]
pub struct CategoryAffinity;

impl Compatibility for CategoryAffinity {
    fn score(&self, filler: &EntityFiller, slot: &SlotCandidate) -> f32 {
        if slot.category == filler.category {
            1.0
        } else if slot.category.subsumes(filler.category) {
            0.5
        } else {
            f32::NEG_INFINITY
        }
    }
}

/// Scorer over raw feature vectors
pub trait FeatureScorer: Send + Sync {
    fn score_features(&self, filler: &[f32], slot: &[f32]) -> f32;
}

/// Classifier errors
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Failed to read classifier parameters: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse classifier parameters: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid classifier parameters: {0}")]
    Shape(String),
}

/// k-nearest-neighbour alignment classifier
///
/// `x[i]` is a training feature vector, `y[i]` its alignment label
/// (1.0 aligned, 0.0 not). Neighbours are ranked by cosine similarity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnClassifier {
    k: usize,
    x: Vec<Vec<f32>>,
    y: Vec<f32>,
    /// Euclidean length of each `x[i]`
    #[serde(skip)]
    norms: Vec<f32>,
}

impl KnnClassifier {
    pub fn new(k: usize, x: Vec<Vec<f32>>, y: Vec<f32>) -> Result<Self, ClassifierError> {
        Self {
            k,
            x,
            y,
            norms: Vec::new(),
        }
        .indexed()
    }

    /// Load `{ "k": .., "x": [[..]], "y": [..] }` from a JSON file
    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        let content = std::fs::read_to_string(path)?;
        let model: KnnClassifier = serde_json::from_str(&content)?;
        model.indexed()
    }

    fn indexed(mut self) -> Result<Self, ClassifierError> {
        self.check()?;
        self.norms = self.x.iter().map(|v| l2_norm(v)).collect();
        Ok(self)
    }

    fn check(&self) -> Result<(), ClassifierError> {
        if self.k == 0 {
            return Err(ClassifierError::Shape("k must be positive".to_string()));
        }
        if self.x.len() != self.y.len() {
            return Err(ClassifierError::Shape(format!(
                "{} feature vectors but {} labels",
                self.x.len(),
                self.y.len()
            )));
        }
        if self.x.is_empty() {
            return Err(ClassifierError::Shape("no training vectors".to_string()));
        }
        let dim = self.x[0].len();
        if let Some(i) = self.x.iter().position(|v| v.len() != dim) {
            return Err(ClassifierError::Shape(format!(
                "vector {} has dimension {}, expected {}",
                i,
                self.x[i].len(),
                dim
            )));
        }
        Ok(())
    }

    /// Feature dimension expected by [`predict`](Self::predict)
    pub fn dim(&self) -> usize {
        self.x[0].len()
    }

    /// Similarity-weighted vote of the `k` nearest training vectors
    pub fn predict(&self, features: &[f32]) -> f32 {
        if features.len() != self.dim() {
            return f32::NEG_INFINITY;
        }
        let query_norm = l2_norm(features);
        let mut neighbours: Vec<(f32, f32)> = self
            .x
            .iter()
            .zip(&self.norms)
            .zip(&self.y)
            .map(|((x, &norm), &y)| {
                let denom = query_norm * norm;
                let sim = if denom > 1e-8 {
                    features.iter().zip(x).map(|(a, b)| a * b).sum::<f32>() / denom
                } else {
                    0.0
                };
                (sim, y)
            })
            .collect();
        neighbours.sort_by(|a, b| b.0.total_cmp(&a.0));
        neighbours.truncate(self.k);

        let weight: f32 = neighbours.iter().map(|(sim, _)| sim.max(0.0)).sum();
        if weight > 1e-8 {
            neighbours
                .iter()
                .map(|(sim, y)| sim.max(0.0) * y)
                .sum::<f32>()
                / weight
        } else {
            neighbours.iter().map(|(_, y)| y).sum::<f32>() / neighbours.len() as f32
        }
    }
}

impl FeatureScorer for KnnClassifier {
    fn score_features(&self, filler: &[f32], slot: &[f32]) -> f32 {
        let mut features = Vec::with_capacity(filler.len() + slot.len());
        features.extend_from_slice(filler);
        features.extend_from_slice(slot);
        self.predict(&features)
    }
}

/// Compatibility from per-hypothesis hidden states
///
/// Fillers index `encoder` by their source position; slots index `decoder`
/// by their position in the decoded sequence. Missing states score −∞.
pub struct HiddenStateCompatibility<'a> {
    scorer: &'a dyn FeatureScorer,
    encoder: &'a [Vec<f32>],
    decoder: &'a [Vec<f32>],
}

impl<'a> HiddenStateCompatibility<'a> {
    pub fn new(
        scorer: &'a dyn FeatureScorer,
        encoder: &'a [Vec<f32>],
        decoder: &'a [Vec<f32>],
    ) -> Self {
        Self {
            scorer,
            encoder,
            decoder,
        }
    }
}

impl Compatibility for HiddenStateCompatibility<'_> {
    fn score(&self, filler: &EntityFiller, slot: &SlotCandidate) -> f32 {
        let encoder = filler.source_position.and_then(|p| self.encoder.get(p));
        match (encoder, self.decoder.get(slot.position)) {
            (Some(e), Some(d)) => self.scorer.score_features(e, d),
            _ => f32::NEG_INFINITY,
        }
    }
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}
