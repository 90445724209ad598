//! Raw sentence ↔ id-sequence transformation and prediction output.

use std::io::Write;

use crate::error::{KotobaError, Result};
use crate::vocab::Vocabulary;

/// One sentence in id space: a word id per token, a char-id sequence per
/// token, and (at training time) a tag id per token.
///
/// `tags` is empty for inference-only batches. When present it must be as
/// long as `words`; the model enforces this before computing a loss.
#[derive(Debug, Clone)]
pub struct EncodedSentence {
    /// One word id per token.
    pub words: Vec<u32>,
    /// One char-id sequence per token, parallel to `words`.
    pub chars: Vec<Vec<u32>>,
    /// One gold tag id per token, or empty for inference.
    pub tags: Vec<u32>,
}

/// Maps raw token/tag sequences into [`EncodedSentence`]s and back.
pub struct DatasetTransformer<'a> {
    vocab: &'a Vocabulary,
}

impl<'a> DatasetTransformer<'a> {
    pub fn new(vocab: &'a Vocabulary) -> Self {
        Self { vocab }
    }

    /// Encode a training sentence. The tag sequence must be parallel to the
    /// token sequence.
    pub fn encode(&self, tokens: &[String], tags: &[String]) -> Result<EncodedSentence> {
        if tokens.len() != tags.len() {
            return Err(KotobaError::LengthMismatch {
                expected: tokens.len(),
                got: tags.len(),
            });
        }
        let mut encoded = self.encode_tokens(tokens)?;
        encoded.tags = tags
            .iter()
            .map(|t| self.vocab.tag_id(t))
            .collect::<Result<_>>()?;
        Ok(encoded)
    }

    /// Encode a sentence without gold tags (inference input).
    pub fn encode_tokens(&self, tokens: &[String]) -> Result<EncodedSentence> {
        let words = tokens.iter().map(|t| self.vocab.word_id(t)).collect();
        let chars = tokens
            .iter()
            .map(|t| t.chars().map(|c| self.vocab.char_id(c)).collect())
            .collect::<Result<_>>()?;
        Ok(EncodedSentence {
            words,
            chars,
            tags: Vec::new(),
        })
    }

    /// Inverse transform: word ids and tag ids back to strings.
    pub fn decode(&self, words: &[u32], tags: &[u32]) -> Result<(Vec<String>, Vec<String>)> {
        if words.len() != tags.len() {
            return Err(KotobaError::LengthMismatch {
                expected: words.len(),
                got: tags.len(),
            });
        }
        let tokens = words
            .iter()
            .map(|&id| self.vocab.word(id).map(str::to_string))
            .collect::<Result<_>>()?;
        let tags = tags
            .iter()
            .map(|&id| self.vocab.tag(id).map(str::to_string))
            .collect::<Result<_>>()?;
        Ok((tokens, tags))
    }
}

/// Write one tagged sentence in the standard evaluation layout: one
/// `token gold_tag predicted_tag` line per token, then a blank line.
pub fn write_prediction<W: Write>(
    out: &mut W,
    tokens: &[String],
    gold: &[String],
    predicted: &[String],
) -> Result<()> {
    if gold.len() != tokens.len() {
        return Err(KotobaError::LengthMismatch {
            expected: tokens.len(),
            got: gold.len(),
        });
    }
    if predicted.len() != tokens.len() {
        return Err(KotobaError::LengthMismatch {
            expected: tokens.len(),
            got: predicted.len(),
        });
    }
    for ((token, g), p) in tokens.iter().zip(gold).zip(predicted) {
        writeln!(out, "{token} {g} {p}")?;
    }
    writeln!(out)?;
    Ok(())
}
