//! # Mojiner Core
//!
//! Feature extraction for character-level Japanese named entity recognition.
//! Turns raw documents into character-aligned word, character, BIES, POS and
//! character-type ID streams, and pads them into model-ready tensors.
//!
//! ## Quick Start
//!
//! ```rust
//! use mojiner_core::{DynamicPreprocessor, ScriptRunAnalyzer, StaticPreprocessor};
//!
//! let docs = vec![vec!["東京タワーへ".to_string()]];
//! let labels = vec![
//!     ["B-LOC", "I-LOC", "I-LOC", "I-LOC", "I-LOC", "O"]
//!         .map(String::from)
//!         .to_vec(),
//! ];
//!
//! let mut preprocessor = StaticPreprocessor::default();
//! let encoded = preprocessor
//!     .fit_transform(&ScriptRunAnalyzer, &docs, &labels)
//!     .unwrap();
//! assert_eq!(encoded.features[0].len(), 6);
//!
//! let dynamic = DynamicPreprocessor::new(preprocessor.n_labels());
//! let batch = dynamic
//!     .transform(&encoded.features, encoded.labels.as_deref())
//!     .unwrap();
//! assert_eq!(batch.dims().unwrap(), (1, 6));
//! ```
pub mod batch;
pub mod entities;
pub mod error;
pub mod features;
pub mod tokenizer;

// Re-export primary API
pub use batch::BatchIterator;
pub use entities::{get_entities, Entity};
pub use error::{MojinerError, Result};
pub use features::{
    normalize_number, pad_sequences, Batch, BiesTag, CharType, Document, DocumentFeatures,
    DynamicPreprocessor, Encoded, LabelSequence, StaticPreprocessor, Vocabulary, PAD, PAD_ID, UNK,
    UNK_ID,
};
pub use tokenizer::{pos_tag, Analyzer, Morpheme, ScriptRunAnalyzer, VibratoAnalyzer};
