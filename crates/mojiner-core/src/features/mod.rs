pub mod chars;
pub mod dynamic_preprocessor;
pub mod static_preprocessor;
pub mod vocab;

pub use chars::{normalize_number, BiesTag, CharType};
pub use dynamic_preprocessor::{pad_sequences, Batch, DynamicPreprocessor};
pub use static_preprocessor::{
    Document, DocumentFeatures, Encoded, LabelSequence, StaticPreprocessor,
};
pub use vocab::{Vocabulary, PAD, PAD_ID, UNK, UNK_ID};
