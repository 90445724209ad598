use thiserror::Error;

/// Errors that can occur during kotoba core operations.
#[derive(Debug, Error)]
pub enum KotobaError {
    /// The model configuration cannot produce a usable model.
    #[error("invalid model configuration: {0}")]
    Config(String),

    /// An integer id fell outside its declared vocabulary range.
    #[error("{kind} id {id} out of range for vocabulary of size {size}")]
    OutOfVocab {
        /// Which vocabulary was violated ("word", "char" or "tag").
        kind: &'static str,
        /// The offending id.
        id: u32,
        /// The declared vocabulary size.
        size: usize,
    },

    /// A string has no entry in the vocabulary and no fallback exists.
    #[error("unknown {kind}: {item:?}")]
    UnknownItem {
        /// Which vocabulary was consulted ("word", "char" or "tag").
        kind: &'static str,
        /// The string that could not be mapped.
        item: String,
    },

    /// A word with zero characters was fed to the char encoder.
    #[error("word at batch position {index} has an empty character sequence")]
    EmptyWord {
        /// Flattened word index within the batch.
        index: usize,
    },

    /// A zero-length sequence reached a recurrent or DP computation.
    #[error("empty sequence passed to a sequence computation")]
    EmptySequence,

    /// Two parallel sequences disagree on length (e.g. gold path vs tokens).
    #[error("length mismatch: expected {expected} positions, got {got}")]
    LengthMismatch {
        /// Length dictated by the reference sequence.
        expected: usize,
        /// Length actually provided.
        got: usize,
    },

    /// Candle tensor operation failed.
    #[error("tensor error: {0}")]
    Candle(#[from] candle_core::Error),

    /// Underlying I/O failure (corpus, vocabulary or prediction files).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Vocabulary or configuration (de)serialization failure.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result type alias for kotoba operations.
pub type Result<T> = std::result::Result<T, KotobaError>;
