use thiserror::Error;

/// Errors that can occur while preparing NER features.
#[derive(Debug, Error)]
pub enum MojinerError {
    /// The morphological analyzer could not be constructed.
    #[error("failed to initialize analyzer: {0}")]
    AnalyzerInit(String),

    /// `transform` was called before `fit`.
    #[error("preprocessor has not been fitted")]
    NotFitted,

    /// A label was not registered during fitting.
    #[error("unknown label: {0:?}")]
    UnknownLabel(String),

    /// An ID has no entry in the vocabulary being decoded.
    #[error("id {id} is not in the {vocab} vocabulary")]
    UnknownId {
        /// Vocabulary that was consulted.
        vocab: &'static str,
        /// The offending ID.
        id: u32,
    },

    /// The per-character feature streams of one document disagree in length.
    #[error(
        "feature streams of document {document} have lengths {lengths:?}, expected {expected}"
    )]
    FeatureLengthMismatch {
        /// Index of the document within the transformed slice.
        document: usize,
        /// Character count of the normalized text.
        expected: usize,
        /// Lengths of the word, char, bies, pos and char-type streams.
        lengths: [usize; 5],
    },

    /// A label sequence does not cover its document character for character.
    #[error("document {document} has {features} characters but {labels} labels")]
    LabelLengthMismatch {
        /// Index of the document within the transformed slice.
        document: usize,
        /// Number of characters after normalization.
        features: usize,
        /// Number of labels supplied.
        labels: usize,
    },

    /// Documents and label sequences were supplied in different numbers.
    #[error("got {documents} documents but {labels} label sequences")]
    DocumentCountMismatch {
        /// Number of documents.
        documents: usize,
        /// Number of label sequences.
        labels: usize,
    },

    /// A persisted vocabulary lists the same token twice.
    #[error("duplicate vocabulary entry: {0:?}")]
    DuplicateToken(String),

    /// A label ID does not fit in the one-hot width.
    #[error("label id {id} is out of range for {n_labels} labels")]
    LabelOutOfRange {
        /// The offending label ID.
        id: u32,
        /// Configured one-hot width.
        n_labels: usize,
    },

    /// Batches must contain at least one document.
    #[error("batch size must be positive")]
    InvalidBatchSize,

    /// A regex pattern failed to compile (should not happen with static patterns).
    #[error("regex compilation error: {0}")]
    Regex(#[from] regex::Error),

    /// Reading or writing a persisted preprocessor failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted preprocessor could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Candle tensor construction failed.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

/// Result type alias for mojiner operations.
pub type Result<T> = std::result::Result<T, MojinerError>;
