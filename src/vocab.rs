//! Vocabulary Mapping
//!
//! Bidirectional id ↔ token lookup for the target token vocabulary and the
//! target character vocabulary. Vocabulary files hold one entry per line;
//! the line number is the id.
//!
//! Reserved entries always occupy the first ids of each vocabulary.

use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Integer identifier into a fixed vocabulary
pub type SymbolId = u32;

/// Special token symbols
pub const PAD: &str = "_PAD";
pub const EOS: &str = "_EOS";
pub const UNK: &str = "_UNK";
pub const ARG_UNK: &str = "ARGUMENT_UNK";
pub const UTL_UNK: &str = "HEADCOMMAND_UNK";
pub const FLAG_UNK: &str = "FLAG_UNK";
pub const NO_EXPAND: &str = "<NO_EXPAND>";
pub const GO: &str = "_GO";
pub const ROOT: &str = "ROOT_";

/// Reserved token ids, in vocabulary order
pub const PAD_ID: SymbolId = 0;
pub const EOS_ID: SymbolId = 1;
pub const UNK_ID: SymbolId = 2;
pub const ARG_ID: SymbolId = 3;
pub const UTL_ID: SymbolId = 4;
pub const FLAG_ID: SymbolId = 5;
pub const NO_EXPAND_ID: SymbolId = 6;
pub const GO_ID: SymbolId = 7;
pub const ROOT_ID: SymbolId = 8;

pub const START_VOCAB: [&str; 9] = [PAD, EOS, UNK, ARG_UNK, UTL_UNK, FLAG_UNK, NO_EXPAND, GO, ROOT];

/// Special character symbols
pub const CPAD: &str = "_CPAD";
pub const CEOS: &str = "_CEOS";
pub const CUNK: &str = "_CUNK";
pub const CATOM: &str = "_CATOM";

/// Reserved character ids
pub const CPAD_ID: SymbolId = 0;
pub const CEOS_ID: SymbolId = 1;
pub const CUNK_ID: SymbolId = 2;
pub const CATOM_ID: SymbolId = 3;

pub const START_CHAR_VOCAB: [&str; 4] = [CPAD, CEOS, CUNK, CATOM];

/// Marker separating subword fragments inside a vocabulary entry
pub const SUBWORD_MARKER: &str = "@@";

/// Replacement for digits during sentence encoding
const NUM: &str = "_NUM";

/// Vocabulary errors
#[derive(Debug, Error)]
pub enum VocabError {
    #[error("Failed to read vocabulary file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Vocabulary file not found: {0}")]
    NotFound(String),

    #[error("Vocabulary is missing reserved entry '{expected}' at id {id}")]
    MissingReserved { id: SymbolId, expected: &'static str },
}

/// Bidirectional id ↔ token mapping
#[derive(Debug, Clone)]
pub struct Vocabulary {
    tokens: Vec<String>,
    ids: HashMap<String, SymbolId>,
}

impl Vocabulary {
    /// Build from an ordered list of entries
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens: Vec<String> = tokens.into_iter().map(Into::into).collect();
        let ids = tokens
            .iter()
            .enumerate()
            .map(|(id, t)| (t.clone(), id as SymbolId))
            .collect();
        Self { tokens, ids }
    }

    /// Build a token vocabulary: reserved entries followed by `tokens`
    pub fn with_reserved<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let all = START_VOCAB
            .iter()
            .map(|s| s.to_string())
            .chain(tokens.into_iter().map(Into::into));
        Self::from_tokens(all)
    }

    /// Build a character vocabulary: reserved entries followed by `chars`
    pub fn chars_with_reserved(chars: impl IntoIterator<Item = char>) -> Self {
        let all = START_CHAR_VOCAB
            .iter()
            .map(|s| s.to_string())
            .chain(chars.into_iter().map(|c| c.to_string()));
        Self::from_tokens(all)
    }

    /// Parse vocabulary file contents (one entry per line)
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let tokens = bytes
            .split(|b| *b == b'\n')
            .map(|line| {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                String::from_utf8_lossy(line).trim().to_string()
            })
            .collect::<Vec<_>>();
        // A trailing newline produces one empty final entry
        let end = if tokens.last().is_some_and(|t| t.is_empty()) {
            tokens.len() - 1
        } else {
            tokens.len()
        };
        Self::from_tokens(tokens.into_iter().take(end))
    }

    /// Load a vocabulary file
    pub fn load(path: &Path) -> Result<Self, VocabError> {
        if !path.exists() {
            return Err(VocabError::NotFound(path.display().to_string()));
        }
        let bytes = std::fs::read(path)?;
        Ok(Self::from_bytes(&bytes))
    }

    /// Load a token vocabulary and check its reserved prefix
    pub fn load_tokens(path: &Path) -> Result<Self, VocabError> {
        let vocab = Self::load(path)?;
        vocab.check_reserved(&START_VOCAB)?;
        Ok(vocab)
    }

    /// Load a character vocabulary and check its reserved prefix
    pub fn load_chars(path: &Path) -> Result<Self, VocabError> {
        let vocab = Self::load(path)?;
        vocab.check_reserved(&START_CHAR_VOCAB)?;
        Ok(vocab)
    }

    fn check_reserved(&self, reserved: &[&'static str]) -> Result<(), VocabError> {
        for (id, expected) in reserved.iter().enumerate() {
            if self.tokens.get(id).map(String::as_str) != Some(*expected) {
                return Err(VocabError::MissingReserved {
                    id: id as SymbolId,
                    expected,
                });
            }
        }
        Ok(())
    }

    /// Token text for an id, `None` when out of range
    #[inline]
    pub fn token(&self, id: SymbolId) -> Option<&str> {
        self.tokens.get(id as usize).map(String::as_str)
    }

    /// Id for a token text
    #[inline]
    pub fn id(&self, token: &str) -> Option<SymbolId> {
        self.ids.get(token).copied()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Encode a whitespace-tokenized sentence into ids
    ///
    /// Digits are normalized to `_NUM` unless the word is an option. Words
    /// missing from the vocabulary become `_UNK`, or, with
    /// `substitute_type`, the reserved placeholder named by their type
    /// prefix (`FLAG_x` → `FLAG_UNK`, `HEADCOMMAND_x` → `HEADCOMMAND_UNK`,
    /// anything else → `ARGUMENT_UNK`).
    pub fn encode(&self, sentence: &str, substitute_type: bool) -> Vec<SymbolId> {
        sentence
            .split_whitespace()
            .map(|word| {
                let word = if is_option(word) {
                    word.to_string()
                } else {
                    normalize_digits(word)
                };
                match self.id(&word) {
                    Some(id) => id,
                    None if substitute_type => {
                        let kind = word.split('_').next().unwrap_or("").to_lowercase();
                        match kind.as_str() {
                            "flag" => FLAG_ID,
                            "headcommand" => UTL_ID,
                            _ => ARG_ID,
                        }
                    }
                    None => UNK_ID,
                }
            })
            .collect()
    }

    /// Render ids as a sentence, cut at the first `_EOS` and then the first `_PAD`
    pub fn ids_to_sentence(&self, ids: &[SymbolId]) -> String {
        let ids = cut_at(ids, EOS_ID);
        let ids = cut_at(ids, PAD_ID);
        ids.iter()
            .map(|&id| self.token(id).unwrap_or(UNK))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Whether a word is a command-line option
pub fn is_option(word: &str) -> bool {
    word.starts_with('-') || word.starts_with("FLAG_")
}

/// Prefix of `ids` before the first occurrence of `stop`
pub fn cut_at(ids: &[SymbolId], stop: SymbolId) -> &[SymbolId] {
    match ids.iter().position(|&id| id == stop) {
        Some(end) => &ids[..end],
        None => ids,
    }
}

fn normalize_digits(word: &str) -> String {
    if !word.chars().any(|c| c.is_ascii_digit()) {
        return word.to_string();
    }
    let mut out = String::with_capacity(word.len() + 8);
    for c in word.chars() {
        if c.is_ascii_digit() {
            out.push_str(NUM);
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> Vocabulary {
        Vocabulary::with_reserved(["find", "-name", "_NUM", "-mtime", "_NUM_NUM"])
    }

    #[test]
    fn test_reserved_ids() {
        let v = vocab();
        assert_eq!(v.id(EOS), Some(EOS_ID));
        assert_eq!(v.id(ARG_UNK), Some(ARG_ID));
        assert_eq!(v.id(ROOT), Some(ROOT_ID));
        assert_eq!(v.token(9), Some("find"));
        assert_eq!(v.token(999), None);
    }

    #[test]
    fn test_from_bytes_lossy_and_trailing_newline() {
        let v = Vocabulary::from_bytes(b"_PAD\n_EOS\r\nab\xffc\n");
        assert_eq!(v.len(), 3);
        assert_eq!(v.token(1), Some("_EOS"));
        assert_eq!(v.token(2), Some("ab\u{FFFD}c"));
    }

    #[test]
    fn test_check_reserved() {
        let good = Vocabulary::with_reserved(["ls"]);
        assert!(good.check_reserved(&START_VOCAB).is_ok());

        let bad = Vocabulary::from_tokens(["_PAD", "ls"]);
        assert!(matches!(
            bad.check_reserved(&START_VOCAB),
            Err(VocabError::MissingReserved { id: 1, .. })
        ));
    }

    #[test]
    fn test_encode_digits_and_options() {
        let v = vocab();
        let ids = v.encode("find -mtime 7 42", false);
        assert_eq!(ids, vec![9, 12, 11, 13]);
    }

    #[test]
    fn test_encode_unknown_substitution() {
        let v = vocab();
        assert_eq!(v.encode("grep", false), vec![UNK_ID]);
        assert_eq!(
            v.encode("FLAG_x HEADCOMMAND_y File_z", true),
            vec![FLAG_ID, UTL_ID, ARG_ID]
        );
    }

    #[test]
    fn test_ids_to_sentence_cuts() {
        let v = vocab();
        assert_eq!(v.ids_to_sentence(&[9, 10, EOS_ID, 11]), "find -name");
        assert_eq!(v.ids_to_sentence(&[9, PAD_ID, 10]), "find");
        assert_eq!(v.ids_to_sentence(&[9, 500]), "find _UNK");
    }

    #[test]
    fn test_char_vocab() {
        let v = Vocabulary::chars_with_reserved("abc".chars());
        assert_eq!(v.id(CATOM), Some(CATOM_ID));
        assert_eq!(v.id("a"), Some(4));
    }
}
