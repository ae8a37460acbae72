//! Prediction Persistence
//!
//! Decoded predictions can be recorded per model in a [`PredictionStore`].
//! Recording never aborts a batch: [`record_prediction`] retries text the
//! store cannot encode with an ASCII-escaped form, then with empty
//! placeholders, and reports which form was stored.
//!
//! # Backends
//!
//! | Backend | Storage |
//! |---------|---------|
//! | [`MemoryStore`] | in-process vector |
//! | [`JsonlStore`] | JSON-lines file, rewritten atomically on update |

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access prediction store: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to (de)serialize prediction record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store cannot encode the {field} text")]
    Encoding { field: &'static str },

    #[error("Prediction store schema has not been created")]
    NoSchema,

    #[error("Prediction score {0} is not a finite number")]
    NonFiniteScore(f32),
}

impl StoreError {
    pub fn is_encoding(&self) -> bool {
        matches!(self, StoreError::Encoding { .. })
    }
}

/// A stored prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub model_id: String,
    pub input: String,
    pub output: String,
    pub score: f32,
}

/// Persistence sink for predictions
pub trait PredictionStore {
    /// Create the backing storage if missing
    fn create_schema(&mut self) -> Result<(), StoreError>;

    /// Drop every record of a model; returns how many were removed
    fn remove_model(&mut self, model_id: &str) -> Result<usize, StoreError>;

    /// Record a prediction
    ///
    /// With `update_mode`, an existing record for the same model, input and
    /// output has its score replaced instead of gaining a duplicate.
    fn add_prediction(
        &mut self,
        model_id: &str,
        input: &str,
        output: &str,
        score: f32,
        update_mode: bool,
    ) -> Result<(), StoreError>;

    /// Records of a model, in insertion order
    fn predictions(&self, model_id: &str) -> Result<Vec<PredictionRecord>, StoreError>;
}

/// Which form of a prediction ended up stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    /// Original text
    Stored,
    /// ASCII-escaped text
    Escaped,
    /// Empty placeholders, score kept
    Placeholder,
    /// Nothing stored
    Failed,
}

/// Record a prediction, degrading the text instead of failing
pub fn record_prediction<S: PredictionStore + ?Sized>(
    store: &mut S,
    model_id: &str,
    input: &str,
    output: &str,
    score: f32,
    update_mode: bool,
) -> RecordOutcome {
    let err = match store.add_prediction(model_id, input, output, score, update_mode) {
        Ok(()) => return RecordOutcome::Stored,
        Err(err) if err.is_encoding() => err,
        Err(err) => return failed(err),
    };
    tracing::warn!(model_id, error = %err, "retrying prediction with escaped text");

    let (escaped_input, escaped_output) = (ascii_escape(input), ascii_escape(output));
    let err = match store.add_prediction(model_id, &escaped_input, &escaped_output, score, update_mode) {
        Ok(()) => return RecordOutcome::Escaped,
        Err(err) if err.is_encoding() => err,
        Err(err) => return failed(err),
    };
    tracing::warn!(model_id, error = %err, "storing prediction with empty text");

    match store.add_prediction(model_id, "", "", score, update_mode) {
        Ok(()) => RecordOutcome::Placeholder,
        Err(err) => failed(err),
    }
}

fn failed(err: StoreError) -> RecordOutcome {
    tracing::warn!(error = %err, "prediction not recorded");
    RecordOutcome::Failed
}

/// Replace every non-ASCII character with its `\u{..}` escape
pub fn ascii_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            out.extend(c.escape_unicode());
        }
    }
    out
}

fn check_score(score: f32) -> Result<(), StoreError> {
    if score.is_finite() {
        Ok(())
    } else {
        Err(StoreError::NonFiniteScore(score))
    }
}

fn check_ascii(ascii_only: bool, input: &str, output: &str) -> Result<(), StoreError> {
    if !ascii_only {
        return Ok(());
    }
    if !input.is_ascii() {
        return Err(StoreError::Encoding { field: "input" });
    }
    if !output.is_ascii() {
        return Err(StoreError::Encoding { field: "output" });
    }
    Ok(())
}

/// Insert or update in a record list
fn upsert(records: &mut Vec<PredictionRecord>, record: PredictionRecord, update_mode: bool) {
    if update_mode {
        let existing = records.iter_mut().find(|r| {
            r.model_id == record.model_id && r.input == record.input && r.output == record.output
        });
        if let Some(existing) = existing {
            existing.score = record.score;
            return;
        }
    }
    records.push(record);
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Vec<PredictionRecord>,
    schema: bool,
    ascii_only: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects non-ASCII text
    pub fn ascii_only() -> Self {
        Self {
            ascii_only: true,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl PredictionStore for MemoryStore {
    fn create_schema(&mut self) -> Result<(), StoreError> {
        self.schema = true;
        Ok(())
    }

    fn remove_model(&mut self, model_id: &str) -> Result<usize, StoreError> {
        let before = self.records.len();
        self.records.retain(|r| r.model_id != model_id);
        Ok(before - self.records.len())
    }

    fn add_prediction(
        &mut self,
        model_id: &str,
        input: &str,
        output: &str,
        score: f32,
        update_mode: bool,
    ) -> Result<(), StoreError> {
        if !self.schema {
            return Err(StoreError::NoSchema);
        }
        check_score(score)?;
        check_ascii(self.ascii_only, input, output)?;
        let record = PredictionRecord {
            model_id: model_id.to_string(),
            input: input.to_string(),
            output: output.to_string(),
            score,
        };
        upsert(&mut self.records, record, update_mode);
        Ok(())
    }

    fn predictions(&self, model_id: &str) -> Result<Vec<PredictionRecord>, StoreError> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.model_id == model_id)
            .cloned()
            .collect())
    }
}

/// JSON-lines file store
///
/// One [`PredictionRecord`] per line. Appends go straight to the file;
/// removals and updates rewrite it through a temporary file in the same
/// directory.
#[derive(Debug, Clone)]
pub struct JsonlStore {
    path: PathBuf,
    ascii_only: bool,
}

impl JsonlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ascii_only: false,
        }
    }

    pub fn with_ascii_only(mut self, ascii_only: bool) -> Self {
        self.ascii_only = ascii_only;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Vec<PredictionRecord>, StoreError> {
        if !self.path.exists() {
            return Err(StoreError::NoSchema);
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }

    fn write_all(&self, records: &[PredictionRecord]) -> Result<(), StoreError> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            for record in records {
                serde_json::to_writer(&mut writer, record)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl PredictionStore for JsonlStore {
    fn create_schema(&mut self) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        OpenOptions::new().create(true).append(true).open(&self.path)?;
        Ok(())
    }

    fn remove_model(&mut self, model_id: &str) -> Result<usize, StoreError> {
        let mut records = self.read_all()?;
        let before = records.len();
        records.retain(|r| r.model_id != model_id);
        let removed = before - records.len();
        if removed > 0 {
            self.write_all(&records)?;
        }
        Ok(removed)
    }

    fn add_prediction(
        &mut self,
        model_id: &str,
        input: &str,
        output: &str,
        score: f32,
        update_mode: bool,
    ) -> Result<(), StoreError> {
        if !self.path.exists() {
            return Err(StoreError::NoSchema);
        }
        check_score(score)?;
        check_ascii(self.ascii_only, input, output)?;
        let record = PredictionRecord {
            model_id: model_id.to_string(),
            input: input.to_string(),
            output: output.to_string(),
            score,
        };

        if update_mode {
            let mut records = self.read_all()?;
            upsert(&mut records, record, true);
            return self.write_all(&records);
        }

        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn predictions(&self, model_id: &str) -> Result<Vec<PredictionRecord>, StoreError> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|r| r.model_id == model_id)
            .collect())
    }
}
