//! # Static Preprocessor
//!
//! Learns word, character, POS and label vocabularies from a training corpus
//! and encodes documents into five character-aligned ID streams.
//!
//! Word and POS IDs are repeated once per character of their word, so every
//! stream has one entry per character of the normalized text. The model can
//! then work over characters while still seeing word-level context.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::iter;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{MojinerError, Result};
use crate::features::chars::{normalize_number, BiesTag, CharType};
use crate::features::vocab::Vocabulary;
use crate::tokenizer::Analyzer;

/// A raw document: lines (or single characters) joined without separator.
pub type Document = Vec<String>;

/// Per-character label strings of one document.
pub type LabelSequence = Vec<String>;

/// The five character-aligned ID streams of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentFeatures {
    pub words: Vec<u32>,
    pub chars: Vec<u32>,
    pub bies: Vec<u32>,
    pub poses: Vec<u32>,
    pub char_types: Vec<u32>,
}

impl DocumentFeatures {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            words: Vec::with_capacity(capacity),
            chars: Vec::with_capacity(capacity),
            bies: Vec::with_capacity(capacity),
            poses: Vec::with_capacity(capacity),
            char_types: Vec::with_capacity(capacity),
        }
    }

    /// Number of character positions.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Streams in model input order: word, char, BIES, POS, char-type.
    pub fn streams(&self) -> [&[u32]; 5] {
        [
            &self.words,
            &self.chars,
            &self.bies,
            &self.poses,
            &self.char_types,
        ]
    }

    fn lengths(&self) -> [usize; 5] {
        self.streams().map(<[u32]>::len)
    }

    fn check_aligned(&self, document: usize, expected: usize) -> Result<()> {
        let lengths = self.lengths();
        if lengths.iter().any(|&len| len != expected) {
            return Err(MojinerError::FeatureLengthMismatch {
                document,
                expected,
                lengths,
            });
        }
        Ok(())
    }
}

/// Output of [`StaticPreprocessor::transform`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Encoded {
    /// Feature streams, one entry per document.
    pub features: Vec<DocumentFeatures>,
    /// Label IDs per document, present when labels were supplied.
    pub labels: Option<Vec<Vec<u32>>>,
}

/// Vocabulary-backed feature encoder.
///
/// Must be [`fit`](Self::fit) once before [`transform`](Self::transform).
/// Calling `fit` again extends the vocabularies instead of resetting them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticPreprocessor {
    lowercase: bool,
    normalize_digits: bool,
    fitted: bool,
    words: Vocabulary,
    chars: Vocabulary,
    poses: Vocabulary,
    labels: Vocabulary,
}

impl Default for StaticPreprocessor {
    fn default() -> Self {
        Self::new(true, true)
    }
}

impl StaticPreprocessor {
    /// Create an unfitted preprocessor.
    ///
    /// # Arguments
    /// * `lowercase` - Lowercase the text before analysis
    /// * `normalize_digits` - Map every decimal digit to `'0'` before analysis
    pub fn new(lowercase: bool, normalize_digits: bool) -> Self {
        Self {
            lowercase,
            normalize_digits,
            fitted: false,
            words: Vocabulary::with_unknown(),
            chars: Vocabulary::with_unknown(),
            poses: Vocabulary::with_unknown(),
            labels: Vocabulary::with_padding(),
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    pub fn lowercase(&self) -> bool {
        self.lowercase
    }

    pub fn normalize_digits(&self) -> bool {
        self.normalize_digits
    }

    pub fn word_vocab(&self) -> &Vocabulary {
        &self.words
    }

    pub fn char_vocab(&self) -> &Vocabulary {
        &self.chars
    }

    pub fn pos_vocab(&self) -> &Vocabulary {
        &self.poses
    }

    pub fn label_vocab(&self) -> &Vocabulary {
        &self.labels
    }

    /// Number of labels including the padding label.
    pub fn n_labels(&self) -> usize {
        self.labels.len()
    }

    /// Join, normalize and right-trim a document the way analysis expects it.
    pub fn prepare_text(&self, document: &[String]) -> String {
        let mut text = document.concat();
        if self.lowercase {
            text = text.to_lowercase();
        }
        if self.normalize_digits {
            text = normalize_number(&text).into_owned();
        }
        let trimmed = text.trim_end().len();
        text.truncate(trimmed);
        text
    }

    /// Register every word, character, POS tag and label in the corpus.
    ///
    /// New entries get IDs in first-occurrence order across documents.
    pub fn fit<A: Analyzer + ?Sized>(
        &mut self,
        analyzer: &A,
        documents: &[Document],
        labels: &[LabelSequence],
    ) -> Result<()> {
        let mut buf = [0u8; 4];
        for document in documents {
            let text = self.prepare_text(document);
            for morpheme in analyzer.analyze(&text)? {
                if !self.words.contains(&morpheme.surface) {
                    self.words.insert(&morpheme.surface);
                    for c in morpheme.surface.chars() {
                        self.chars.insert(c.encode_utf8(&mut buf));
                    }
                }
                self.poses.insert(&morpheme.pos);
            }
        }

        for label in labels.iter().flatten() {
            self.labels.insert(label);
        }

        self.fitted = true;
        info!(
            documents = documents.len(),
            words = self.words.len(),
            chars = self.chars.len(),
            poses = self.poses.len(),
            labels = self.labels.len(),
            "fitted vocabularies"
        );
        Ok(())
    }

    /// Encode documents, and optionally their labels, into ID streams.
    ///
    /// # Errors
    ///
    /// * `NotFitted` if [`fit`](Self::fit) has not run.
    /// * `UnknownLabel` if a label was not seen during fitting. Unknown
    ///   words, characters and POS tags map to the unknown sentinel instead.
    /// * `FeatureLengthMismatch` if the analyzer did not cover the text.
    /// * `DocumentCountMismatch`/`LabelLengthMismatch` if labels do not line
    ///   up with the documents.
    pub fn transform<A: Analyzer + ?Sized>(
        &self,
        analyzer: &A,
        documents: &[Document],
        labels: Option<&[LabelSequence]>,
    ) -> Result<Encoded> {
        if !self.fitted {
            return Err(MojinerError::NotFitted);
        }

        let features = documents
            .iter()
            .enumerate()
            .map(|(idx, document)| self.encode_document(analyzer, idx, document))
            .collect::<Result<Vec<_>>>()?;

        let labels = labels
            .map(|labels| self.encode_labels(&features, labels))
            .transpose()?;

        debug!(documents = documents.len(), "transformed documents");
        Ok(Encoded { features, labels })
    }

    /// [`fit`](Self::fit) followed by [`transform`](Self::transform) on the same data.
    pub fn fit_transform<A: Analyzer + ?Sized>(
        &mut self,
        analyzer: &A,
        documents: &[Document],
        labels: &[LabelSequence],
    ) -> Result<Encoded> {
        self.fit(analyzer, documents, labels)?;
        self.transform(analyzer, documents, Some(labels))
    }

    fn encode_document<A: Analyzer + ?Sized>(
        &self,
        analyzer: &A,
        idx: usize,
        document: &[String],
    ) -> Result<DocumentFeatures> {
        let text = self.prepare_text(document);
        let expected = text.chars().count();
        let mut features = DocumentFeatures::with_capacity(expected);
        let mut buf = [0u8; 4];

        for morpheme in analyzer.analyze(&text)? {
            let len = morpheme.surface.chars().count();
            let word_id = self.words.get_or_unk(&morpheme.surface);
            let pos_id = self.poses.get_or_unk(&morpheme.pos);

            features.words.extend(iter::repeat_n(word_id, len));
            features.poses.extend(iter::repeat_n(pos_id, len));
            for (i, c) in morpheme.surface.chars().enumerate() {
                features.chars.push(self.chars.get_or_unk(c.encode_utf8(&mut buf)));
                features.bies.push(BiesTag::at(i, len).code());
                features.char_types.push(CharType::of(c).code());
            }
        }

        features.check_aligned(idx, expected)?;
        Ok(features)
    }

    fn encode_labels(
        &self,
        features: &[DocumentFeatures],
        labels: &[LabelSequence],
    ) -> Result<Vec<Vec<u32>>> {
        if features.len() != labels.len() {
            return Err(MojinerError::DocumentCountMismatch {
                documents: features.len(),
                labels: labels.len(),
            });
        }

        features
            .iter()
            .zip(labels)
            .enumerate()
            .map(|(idx, (doc, sequence))| {
                if doc.len() != sequence.len() {
                    return Err(MojinerError::LabelLengthMismatch {
                        document: idx,
                        features: doc.len(),
                        labels: sequence.len(),
                    });
                }
                sequence
                    .iter()
                    .map(|label| {
                        self.labels
                            .get(label)
                            .ok_or_else(|| MojinerError::UnknownLabel(label.clone()))
                    })
                    .collect()
            })
            .collect()
    }

    /// Decode character ID sequences back into characters.
    pub fn inverse_chars<S: AsRef<[u32]>>(&self, sequences: &[S]) -> Result<Vec<Vec<&str>>> {
        decode(&self.chars, "char", sequences)
    }

    /// Decode label ID sequences back into label strings.
    pub fn inverse_labels<S: AsRef<[u32]>>(&self, sequences: &[S]) -> Result<Vec<Vec<&str>>> {
        decode(&self.labels, "label", sequences)
    }

    /// Write the whole preprocessor as one JSON document.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        info!(path = %path.as_ref().display(), "saved static preprocessor");
        Ok(())
    }

    /// Read a preprocessor written by [`save`](Self::save).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

fn decode<'v, S: AsRef<[u32]>>(
    vocab: &'v Vocabulary,
    name: &'static str,
    sequences: &[S],
) -> Result<Vec<Vec<&'v str>>> {
    sequences
        .iter()
        .map(|ids| {
            ids.as_ref()
                .iter()
                .map(|&id| {
                    vocab
                        .token(id)
                        .ok_or(MojinerError::UnknownId { vocab: name, id })
                })
                .collect()
        })
        .collect()
}
