//! # Dynamic Preprocessor
//!
//! Pads the variable-length streams of one batch into rectangular tensors and
//! one-hot encodes labels.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{MojinerError, Result};
use crate::features::static_preprocessor::DocumentFeatures;
use crate::features::vocab::PAD_ID;

/// Model-ready tensors for one minibatch.
///
/// Feature tensors are `u32` with shape `(batch, max_len)`; the label
/// tensor is `f32` with shape `(batch, max_len, n_labels)`.
#[derive(Debug, Clone)]
pub struct Batch {
    pub words: Tensor,
    pub chars: Tensor,
    pub bies: Tensor,
    pub poses: Tensor,
    pub char_types: Tensor,
    pub labels: Option<Tensor>,
}

impl Batch {
    /// Feature tensors in model input order: word, char, BIES, POS, char-type.
    pub fn inputs(&self) -> [&Tensor; 5] {
        [
            &self.words,
            &self.chars,
            &self.bies,
            &self.poses,
            &self.char_types,
        ]
    }

    /// `(batch, max_len)` shared by every tensor of the batch.
    pub fn dims(&self) -> Result<(usize, usize)> {
        Ok(self.words.dims2()?)
    }
}

/// Right-pad `sequences` with the padding ID to `max_len` and flatten row-major.
///
/// Sequences longer than `max_len` are kept whole; callers pass the batch
/// maximum so nothing is ever truncated.
pub fn pad_sequences<S: AsRef<[u32]>>(sequences: &[S], max_len: usize) -> Vec<u32> {
    let mut data = Vec::with_capacity(sequences.len() * max_len);
    for seq in sequences {
        let seq = seq.as_ref();
        data.extend_from_slice(seq);
        data.resize(data.len() + max_len.saturating_sub(seq.len()), PAD_ID);
    }
    data
}

fn default_device() -> Device {
    Device::Cpu
}

/// Stateless batch encoder parameterized by the label count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicPreprocessor {
    n_labels: usize,
    #[serde(skip, default = "default_device")]
    device: Device,
}

impl DynamicPreprocessor {
    /// Create a preprocessor producing CPU tensors.
    pub fn new(n_labels: usize) -> Self {
        Self {
            n_labels,
            device: default_device(),
        }
    }

    /// Place produced tensors on `device`.
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn n_labels(&self) -> usize {
        self.n_labels
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Pad one batch of features, and optionally labels, into tensors.
    ///
    /// All tensors share the leading `(batch, max_len)` dimensions, where
    /// `max_len` is the longest sequence of this batch.
    ///
    /// # Errors
    ///
    /// Returns `MojinerError::LabelOutOfRange` if a label ID does not fit the
    /// one-hot width, and `MojinerError::DocumentCountMismatch` if labels are
    /// given for a different number of documents.
    pub fn transform<L: AsRef<[u32]>>(
        &self,
        features: &[DocumentFeatures],
        labels: Option<&[L]>,
    ) -> Result<Batch> {
        let rows = features.len();
        if let Some(labels) = labels {
            if labels.len() != rows {
                return Err(MojinerError::DocumentCountMismatch {
                    documents: rows,
                    labels: labels.len(),
                });
            }
        }
        let feature_len = features.iter().map(DocumentFeatures::len).max();
        let label_len = labels
            .into_iter()
            .flatten()
            .map(|seq| seq.as_ref().len())
            .max();
        let max_len = feature_len.max(label_len).unwrap_or(0);

        let mut streams: [Vec<&[u32]>; 5] = Default::default();
        for doc in features {
            for (stream, ids) in streams.iter_mut().zip(doc.streams()) {
                stream.push(ids);
            }
        }
        let [words, chars, bies, poses, char_types] =
            streams.map(|stream| self.padded(&stream, rows, max_len));

        let labels = labels
            .map(|labels| self.one_hot(labels, max_len))
            .transpose()?;

        Ok(Batch {
            words: words?,
            chars: chars?,
            bies: bies?,
            poses: poses?,
            char_types: char_types?,
            labels,
        })
    }

    fn padded(&self, sequences: &[&[u32]], rows: usize, max_len: usize) -> Result<Tensor> {
        let data = pad_sequences(sequences, max_len);
        Ok(Tensor::from_vec(data, (rows, max_len), &self.device)?)
    }

    fn one_hot<L: AsRef<[u32]>>(&self, labels: &[L], max_len: usize) -> Result<Tensor> {
        let n = self.n_labels;
        let mut data = vec![0f32; labels.len() * max_len * n];

        for (row, seq) in labels.iter().enumerate() {
            let seq = seq.as_ref();
            for pos in 0..max_len {
                let id = seq.get(pos).copied().unwrap_or(PAD_ID);
                if id as usize >= n {
                    return Err(MojinerError::LabelOutOfRange { id, n_labels: n });
                }
                data[(row * max_len + pos) * n + id as usize] = 1.0;
            }
        }

        Ok(Tensor::from_vec(data, (labels.len(), max_len, n), &self.device)?)
    }

    /// Write the preprocessor as JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        info!(path = %path.as_ref().display(), "saved dynamic preprocessor");
        Ok(())
    }

    /// Read a preprocessor written by [`save`](Self::save); tensors go to the CPU.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}
