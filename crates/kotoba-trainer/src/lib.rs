//! # Kotoba Trainer
//!
//! Training and tagging drivers for the kotoba BiLSTM-CRF sequence labeler:
//! corpus loading, vocabulary building, the epoch loop, checkpointing, and
//! the `train` / `tag` binaries.

pub mod data;
pub mod trainer;

pub use data::{build_vocabulary, load_corpus, RawSentence};
pub use trainer::{TrainOptions, Trainer};
