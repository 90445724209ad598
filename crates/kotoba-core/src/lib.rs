//! # Kotoba Core
//!
//! A BiLSTM-CRF sequence labeler for named-entity recognition. Per-token
//! features (word embeddings and/or character-level BiLSTM vectors) feed a
//! sentence-level bidirectional recurrent pass whose outputs are projected to
//! per-tag emission scores; a linear-chain CRF then scores whole tag paths,
//! with exact training loss (forward algorithm) and exact decoding (Viterbi).
//!
//! Variable-length batches are handled without padding: flat buffers plus
//! explicit length tables, at both the character-in-word and the
//! token-in-sentence granularity.
//!
//! ## Quick Start
//!
//! ```rust
//! use candle_core::{DType, Device};
//! use candle_nn::{VarBuilder, VarMap};
//! use kotoba_core::{EncodedSentence, ModelConfig, Tagger};
//!
//! let device = Device::Cpu;
//! let varmap = VarMap::new();
//! let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
//!
//! let config = ModelConfig {
//!     word_dim: Some(8),
//!     char_dim: Some(4),
//!     word_hidden_dim: 8,
//!     char_hidden_dim: 4,
//!     dropout_rate: 0.0,
//! };
//! // 10 words, 20 characters, 3 tags in the vocabulary.
//! let tagger = Tagger::new(&config, 10, 20, 3, vb).unwrap();
//!
//! let sentence = EncodedSentence {
//!     words: vec![1, 2],
//!     chars: vec![vec![3], vec![4, 5]],
//!     tags: vec![],
//! };
//! let paths = tagger.predict(&[sentence]).unwrap();
//! assert_eq!(paths[0].len(), 2);
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod model;
pub mod packing;
pub mod vocab;

// Re-export primary API
pub use config::ModelConfig;
pub use dataset::{write_prediction, DatasetTransformer, EncodedSentence};
pub use error::{KotobaError, Result};
pub use model::{BiLstm, CharEncoder, Crf, Dropout, Tagger};
pub use vocab::{Vocabulary, UNK_WORD};
