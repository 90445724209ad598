//! The BiLSTM-CRF tagger.
//!
//! Composition is explicit ownership: [`Tagger`] holds its sub-encoders as
//! named fields and every learned parameter flows through one `VarBuilder`,
//! so checkpointing is a flat traversal of the builder's `VarMap` with no
//! registration magic.

pub mod bilstm;
pub mod char;
pub mod crf;
pub mod dropout;

use candle_core::{Device, Module, Tensor};
use candle_nn::{embedding, linear, Embedding, Linear, VarBuilder};

pub use bilstm::BiLstm;
pub use char::CharEncoder;
pub use crf::Crf;
pub use dropout::Dropout;

use crate::config::ModelConfig;
use crate::dataset::EncodedSentence;
use crate::error::{KotobaError, Result};
use crate::packing;

/// Default dropout seed; override with [`Tagger::set_seed`] before training.
const DEFAULT_SEED: u64 = 42;

/// BiLSTM-CRF sequence labeler.
///
/// Per-token features (word embedding ⊕ char-level vector, whichever are
/// enabled) feed a sentence-level bidirectional recurrent pass, a linear
/// projection to per-tag emission scores, and a linear-chain CRF decoder.
pub struct Tagger {
    word_embed: Option<Embedding>,
    char_encoder: Option<CharEncoder>,
    bilstm: BiLstm,
    proj: Linear,
    crf: Crf,
    dropout: Dropout,
    num_words: usize,
    device: Device,
}

impl Tagger {
    /// Build a tagger with fresh parameters registered on `vb`.
    ///
    /// Fails if the configuration enables no feature source: at least one of
    /// `word_dim` / `char_dim` must be set.
    pub fn new(
        config: &ModelConfig,
        num_words: usize,
        num_chars: usize,
        num_tags: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        config.validate()?;
        tracing::debug!(
            word_dim = ?config.word_dim,
            char_dim = ?config.char_dim,
            word_hidden_dim = config.word_hidden_dim,
            char_hidden_dim = config.char_hidden_dim,
            dropout_rate = config.dropout_rate,
            "building tagger"
        );

        let device = vb.device().clone();
        let word_embed = match config.word_dim {
            Some(dim) => Some(embedding(num_words, dim, vb.pp("word_embed"))?),
            None => None,
        };
        let char_encoder = match config.char_dim {
            Some(dim) => Some(CharEncoder::new(
                num_chars,
                dim,
                config.char_hidden_dim,
                vb.pp("char_encoder"),
            )?),
            None => None,
        };
        let bilstm = BiLstm::new(config.lstm_input_dim(), config.word_hidden_dim, vb.pp("bilstm"))?;
        let proj = linear(2 * config.word_hidden_dim, num_tags, vb.pp("proj"))?;
        let crf = Crf::new(num_tags, vb.pp("crf"))?;

        Ok(Self {
            word_embed,
            char_encoder,
            bilstm,
            proj,
            crf,
            dropout: Dropout::new(config.dropout_rate, DEFAULT_SEED),
            num_words,
            device,
        })
    }

    /// Reseed the dropout mask RNG for reproducible training runs.
    pub fn set_seed(&self, seed: u64) {
        self.dropout.reseed(seed);
    }

    /// Training forward pass: mean negative log-likelihood of the gold paths.
    ///
    /// Every sentence must carry a gold tag path as long as its token
    /// sequence. Dropout is active.
    pub fn loss(&self, batch: &[EncodedSentence]) -> Result<Tensor> {
        for sentence in batch {
            if sentence.tags.len() != sentence.words.len() {
                return Err(KotobaError::LengthMismatch {
                    expected: sentence.words.len(),
                    got: sentence.tags.len(),
                });
            }
        }
        let emissions = self.extract(batch, true)?;
        let tags: Vec<Vec<u32>> = batch.iter().map(|s| s.tags.clone()).collect();
        self.crf.nll(&emissions, &tags)
    }

    /// Predict one tag path per sentence, in input order. Dropout inactive,
    /// so two calls on the same batch decode identically.
    pub fn predict(&self, batch: &[EncodedSentence]) -> Result<Vec<Vec<u32>>> {
        let emissions = self.extract(batch, false)?;
        self.crf.decode_batch(&emissions)
    }

    /// Feature extraction: per-token vectors packed sentence-by-sentence
    /// through the sentence BiLSTM and projected to emission scores.
    ///
    /// Characters pack at word granularity inside [`CharEncoder`]; emissions
    /// pack at sentence granularity here. The two offset tables are built
    /// independently so word boundaries never leak into the sentence-level
    /// recurrence.
    fn extract(&self, batch: &[EncodedSentence], train: bool) -> Result<Vec<Tensor>> {
        if batch.is_empty() {
            return Err(KotobaError::EmptySequence);
        }
        for sentence in batch {
            if sentence.words.is_empty() {
                return Err(KotobaError::EmptySequence);
            }
            if sentence.chars.len() != sentence.words.len() {
                return Err(KotobaError::LengthMismatch {
                    expected: sentence.words.len(),
                    got: sentence.chars.len(),
                });
            }
        }
        let lens: Vec<usize> = batch.iter().map(|s| s.words.len()).collect();
        let total: usize = lens.iter().sum();

        let mut parts = Vec::with_capacity(2);
        if let Some(embed) = &self.word_embed {
            let flat: Vec<u32> = batch.iter().flat_map(|s| s.words.iter().copied()).collect();
            for &id in &flat {
                if id as usize >= self.num_words {
                    return Err(KotobaError::OutOfVocab {
                        kind: "word",
                        id,
                        size: self.num_words,
                    });
                }
            }
            let ids = Tensor::from_vec(flat, total, &self.device)?;
            let words = embed.forward(&ids)?;
            parts.push(self.dropout.forward(&words, train)?);
        }
        if let Some(encoder) = &self.char_encoder {
            let words: Vec<Vec<u32>> = batch
                .iter()
                .flat_map(|s| s.chars.iter().cloned())
                .collect();
            let chars = encoder.forward(&words)?;
            parts.push(self.dropout.forward(&chars, train)?);
        }

        let inputs = match parts.as_slice() {
            [only] => only.clone(),
            [words, chars] => Tensor::cat(&[words, chars], 1)?,
            _ => {
                return Err(KotobaError::Config(
                    "no feature source enabled".into(),
                ))
            }
        };

        let mut emissions = Vec::with_capacity(batch.len());
        for block in packing::split_rows(&inputs, &lens)? {
            let hidden = self.bilstm.seq(&block.unsqueeze(0)?)?.squeeze(0)?;
            emissions.push(self.proj.forward(&hidden)?);
        }
        Ok(emissions)
    }
}
