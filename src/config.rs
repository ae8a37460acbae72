//! nl2cmd Configuration
//!
//! Handles parsing of nl2cmd.toml configuration files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::grammar::GrammarKind;
use crate::inference::formatter::DEFAULT_DISPLAY_CAP;
use crate::inference::pipeline::{
    DecodeMode, PipelineOptions, DEFAULT_CAP, DEFAULT_MAX_CHAR_WORD_LEN,
};

/// Config file name searched for by [`Nl2CmdConfig::find_and_load`].
pub const CONFIG_FILE: &str = "nl2cmd.toml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Root configuration structure matching nl2cmd.toml.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Nl2CmdConfig {
    /// Decoding settings
    #[serde(default)]
    pub decode: DecodeConfig,

    /// Argument slot filling
    #[serde(default)]
    pub slot_filling: SlotFillingConfig,

    /// Prediction persistence
    #[serde(default)]
    pub store: StoreConfig,
}

impl Nl2CmdConfig {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Nl2CmdConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the current directory or parents.
    pub fn load_from_cwd() -> ConfigResult<Self> {
        let cwd = std::env::current_dir().map_err(ConfigError::Io)?;
        Self::find_and_load(&cwd)
    }

    /// Find and load configuration by searching up from the given directory.
    pub fn find_and_load(start_dir: &Path) -> ConfigResult<Self> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                return Self::load(&config_path);
            }
            if !dir.pop() {
                // Reached root without finding config
                return Ok(Self::default());
            }
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.decode.beam_size == 0 {
            return Err(ConfigError::Invalid("decode.beam_size must be at least 1".into()));
        }
        if self.decode.cap == 0 {
            return Err(ConfigError::Invalid("decode.cap must be at least 1".into()));
        }
        if self.decode.char_outputs && self.decode.char_vocab.is_none() {
            return Err(ConfigError::Invalid(
                "decode.char_outputs requires decode.char_vocab".into(),
            ));
        }
        Ok(())
    }

    /// Pipeline options derived from the decode and slot-filling sections.
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            mode: self.decode.algorithm,
            cap: self.decode.cap,
            strict: self.decode.grammatical_only,
            explain: self.decode.explain,
            char_mode: self.decode.char_mode,
            char_outputs: self.decode.char_outputs,
            fill_slots: self.slot_filling.enabled,
            max_char_word_len: self.decode.max_char_word_len,
        }
    }
}

/// Decoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeConfig {
    /// `greedy` or `beam_search`
    #[serde(default)]
    pub algorithm: DecodeMode,

    /// Beam width the model was decoded with
    #[serde(default = "default_beam_size")]
    pub beam_size: usize,

    /// Accepted hypotheses per batch
    #[serde(default = "default_cap")]
    pub cap: usize,

    /// Upper bound on printed predictions per example
    #[serde(default = "default_display_cap")]
    pub display_cap: usize,

    /// Reject ungrammatical candidates
    #[serde(default = "default_true")]
    pub grammatical_only: bool,

    /// Natural-language output: accept any text
    #[serde(default)]
    pub explain: bool,

    #[serde(default)]
    pub grammar: GrammarKind,

    /// Target vocabulary is character-level
    #[serde(default)]
    pub char_mode: bool,

    /// Print character-based companion predictions
    #[serde(default)]
    pub char_outputs: bool,

    #[serde(default = "default_max_char_word_len")]
    pub max_char_word_len: usize,

    /// Target token vocabulary file
    #[serde(default = "default_target_vocab")]
    pub target_vocab: PathBuf,

    /// Target character vocabulary file
    #[serde(default)]
    pub char_vocab: Option<PathBuf>,

    /// Source (natural-language) vocabulary file
    #[serde(default = "default_source_vocab")]
    pub source_vocab: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_beam_size() -> usize {
    100
}

fn default_cap() -> usize {
    DEFAULT_CAP
}

fn default_display_cap() -> usize {
    DEFAULT_DISPLAY_CAP
}

fn default_max_char_word_len() -> usize {
    DEFAULT_MAX_CHAR_WORD_LEN
}

fn default_target_vocab() -> PathBuf {
    PathBuf::from("data/vocab.cm")
}

fn default_source_vocab() -> PathBuf {
    PathBuf::from("data/vocab.nl")
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            algorithm: DecodeMode::default(),
            beam_size: default_beam_size(),
            cap: default_cap(),
            display_cap: default_display_cap(),
            grammatical_only: true,
            explain: false,
            grammar: GrammarKind::default(),
            char_mode: false,
            char_outputs: false,
            max_char_word_len: default_max_char_word_len(),
            target_vocab: default_target_vocab(),
            char_vocab: None,
            source_vocab: default_source_vocab(),
        }
    }
}

/// Argument slot filling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotFillingConfig {
    /// Fill argument slots when fillers are supplied
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// k-NN classifier parameters (JSON); category affinity is used without
    #[serde(default)]
    pub classifier: Option<PathBuf>,
}

impl Default for SlotFillingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            classifier: None,
        }
    }
}

/// Prediction persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON-lines store file; predictions are not recorded without one
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Model identifier records are filed under
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Reject non-ASCII text (exercises the encoding fallback)
    #[serde(default)]
    pub ascii_only: bool,

    /// Update existing records instead of appending duplicates
    #[serde(default)]
    pub update_mode: bool,

    /// Drop the model's previous records before a run
    #[serde(default = "default_true")]
    pub fresh: bool,
}

fn default_model_id() -> String {
    "nl2cmd".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            model_id: default_model_id(),
            ascii_only: false,
            update_mode: false,
            fresh: true,
        }
    }
}
