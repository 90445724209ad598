//! Model hyperparameter configuration.

use serde::{Deserialize, Serialize};

use crate::error::{KotobaError, Result};

/// Hyperparameters controlling which sub-encoders exist and how wide they are.
///
/// Persisted as JSON next to the checkpoint so a saved model can be rebuilt
/// with the exact same parameter shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Word embedding dimension. `None` disables the word-level encoder.
    #[serde(default)]
    pub word_dim: Option<usize>,

    /// Character embedding dimension. `None` disables the char-level encoder.
    #[serde(default)]
    pub char_dim: Option<usize>,

    /// Hidden size of each direction of the sentence-level BiLSTM.
    pub word_hidden_dim: usize,

    /// Hidden size of each direction of the char-level BiLSTM.
    /// Required (non-zero) when `char_dim` is set.
    #[serde(default)]
    pub char_hidden_dim: usize,

    /// Dropout rate applied to the per-token feature vectors during training.
    #[serde(default)]
    pub dropout_rate: f32,
}

impl ModelConfig {
    /// Check that the configuration describes a buildable model.
    ///
    /// At least one of the word/char feature sources must be enabled; an
    /// emission extractor with no inputs is a configuration error, not
    /// something to discover at batch time.
    pub fn validate(&self) -> Result<()> {
        if self.word_dim.is_none() && self.char_dim.is_none() {
            return Err(KotobaError::Config(
                "at least one of word_dim / char_dim must be set".into(),
            ));
        }
        if self.word_dim == Some(0) {
            return Err(KotobaError::Config("word_dim must be non-zero".into()));
        }
        if self.char_dim == Some(0) {
            return Err(KotobaError::Config("char_dim must be non-zero".into()));
        }
        if self.char_dim.is_some() && self.char_hidden_dim == 0 {
            return Err(KotobaError::Config(
                "char_hidden_dim must be non-zero when char_dim is set".into(),
            ));
        }
        if self.word_hidden_dim == 0 {
            return Err(KotobaError::Config("word_hidden_dim must be non-zero".into()));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(KotobaError::Config(format!(
                "dropout_rate must be in [0, 1), got {}",
                self.dropout_rate
            )));
        }
        Ok(())
    }

    /// Input width of the sentence-level BiLSTM: the concatenation of every
    /// enabled per-token feature source.
    pub fn lstm_input_dim(&self) -> usize {
        let word = self.word_dim.unwrap_or(0);
        let char = if self.char_dim.is_some() {
            2 * self.char_hidden_dim
        } else {
            0
        };
        word + char
    }
}
