//! Symbol Decoding
//!
//! Turns raw model output ids back into text:
//!
//! - [`SequenceDecoder`] maps a token-id sequence to a [`DecodedSequence`],
//!   truncating at end-of-sequence, merging subword fragments and tagging
//!   entity placeholders as argument slots.
//! - [`CharDecoder`] rebuilds free-form words from a grid of character ids
//!   (one row per output word).
//!
//! Both are pure functions of their inputs.

use crate::slot::types::{is_duration_flag, EntityCategory, SlotCandidate};
use crate::vocab::{
    cut_at, SymbolId, Vocabulary, CATOM, CEOS_ID, CPAD_ID, CUNK, EOS_ID, GO_ID, PAD_ID,
    SUBWORD_MARKER, UNK, UNK_ID,
};

/// Kind of a decoded token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Literal surface text
    Literal,
    /// Entity-category placeholder (an argument slot)
    Entity(EntityCategory),
    /// Out-of-vocabulary or `_UNK` id
    Unknown,
}

/// A decoded token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub kind: TokenKind,
}

impl Token {
    /// Classify a token text
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let kind = if text == UNK {
            TokenKind::Unknown
        } else if let Some(category) = EntityCategory::from_placeholder(&text) {
            TokenKind::Entity(category)
        } else {
            TokenKind::Literal
        };
        Self { text, kind }
    }

    pub fn unknown() -> Self {
        Self {
            text: UNK.to_string(),
            kind: TokenKind::Unknown,
        }
    }
}

/// Token sequence decoded from one hypothesis
///
/// Never contains anything decoded from ids at or after the first
/// end-of-sequence id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedSequence {
    tokens: Vec<Token>,
    raw_offset: usize,
}

impl DecodedSequence {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            raw_offset: 0,
        }
    }

    /// Split a free-form surface string into literal tokens
    pub fn from_surface(surface: &str) -> Self {
        Self::new(surface.split_whitespace().map(Token::new).collect())
    }

    /// Number of raw ids skipped before the first token
    ///
    /// Token `i` was decoded from raw id `i + raw_offset()`.
    pub fn raw_offset(&self) -> usize {
        self.raw_offset
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn texts(&self) -> Vec<&str> {
        self.tokens.iter().map(|t| t.text.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Tokens joined by single spaces
    pub fn surface(&self) -> String {
        self.texts().join(" ")
    }

    /// Argument slots, in position order
    ///
    /// A placeholder immediately after a duration flag is a timespan slot
    /// regardless of its own category.
    pub fn slots(&self) -> Vec<SlotCandidate> {
        self.tokens
            .iter()
            .enumerate()
            .filter_map(|(i, token)| {
                let TokenKind::Entity(own) = token.kind else {
                    return None;
                };
                let category = if i > 0 && is_duration_flag(&self.tokens[i - 1].text) {
                    EntityCategory::Timespan
                } else {
                    own
                };
                Some(SlotCandidate {
                    position: i,
                    surface: token.text.clone(),
                    category,
                })
            })
            .collect()
    }
}

/// Token-level decoder over the target vocabulary
#[derive(Debug, Clone, Copy)]
pub struct SequenceDecoder<'v> {
    vocab: &'v Vocabulary,
}

impl<'v> SequenceDecoder<'v> {
    pub fn new(vocab: &'v Vocabulary) -> Self {
        Self { vocab }
    }

    /// Decode a raw id sequence
    ///
    /// A leading `_GO` start symbol is dropped and ids past the first `_EOS`
    /// are ignored. Vocabulary entries carrying a subword marker keep only
    /// the piece after the last marker; ids outside the vocabulary become
    /// `_UNK`.
    pub fn decode(&self, raw_ids: &[SymbolId]) -> DecodedSequence {
        let (raw_offset, raw_ids) = match raw_ids.strip_prefix(&[GO_ID]) {
            Some(rest) => (1, rest),
            None => (0, raw_ids),
        };
        let tokens = cut_at(raw_ids, EOS_ID)
            .iter()
            .map(|&id| match self.vocab.token(id) {
                Some(text) => Token::new(merge_subword(text)),
                None => Token::unknown(),
            })
            .collect();
        DecodedSequence { tokens, raw_offset }
    }

    /// Decode a sequence whose vocabulary entries are single characters
    ///
    /// Characters are concatenated directly; unknown ids, `_UNK` and padding
    /// each become one space.
    pub fn decode_chars(&self, raw_ids: &[SymbolId]) -> String {
        let mut out = String::new();
        for &id in cut_at(raw_ids, EOS_ID) {
            match self.vocab.token(id) {
                Some(_) if id == PAD_ID || id == UNK_ID => out.push(' '),
                Some(text) => out.push_str(text),
                None => out.push(' '),
            }
        }
        out
    }
}

fn merge_subword(text: &str) -> &str {
    match text.rfind(SUBWORD_MARKER) {
        Some(at) => &text[at + SUBWORD_MARKER.len()..],
        None => text,
    }
}

/// Character-level word decoder over the character vocabulary
#[derive(Debug, Clone, Copy)]
pub struct CharDecoder<'v> {
    vocab: &'v Vocabulary,
}

impl<'v> CharDecoder<'v> {
    pub fn new(vocab: &'v Vocabulary) -> Self {
        Self { vocab }
    }

    /// Glyph emitted for character ids outside the vocabulary
    pub fn unknown_glyph(&self) -> &str {
        CUNK
    }

    /// Rebuild one word from at most `max_len` character ids
    ///
    /// Stops at the first `_CEOS` or `_CPAD`.
    pub fn decode_word(&self, char_ids: &[SymbolId], max_len: usize) -> String {
        let mut word = String::new();
        for &id in char_ids.iter().take(max_len) {
            if id == CEOS_ID || id == CPAD_ID {
                break;
            }
            match self.vocab.token(id) {
                Some(text) => word.push_str(text),
                None => word.push_str(self.unknown_glyph()),
            }
        }
        word
    }

    /// Rebuild a phrase from a grid of per-word character ids
    ///
    /// Words are decoded independently, empty words are dropped, the rest
    /// are joined with single spaces and the phrase ends before the first
    /// `_CATOM` word.
    pub fn decode_grid(&self, grid: &[Vec<SymbolId>], max_len: usize) -> String {
        let words: Vec<String> = grid
            .iter()
            .map(|row| self.decode_word(row, max_len))
            .collect();
        let end = words.iter().position(|w| w == CATOM).unwrap_or(words.len());
        words[..end]
            .iter()
            .filter(|w| !w.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}
