//! Sequence tagging models driven by the fit loop.
//!
//! [`SequenceTagger`] is the contract the training driver and callbacks work
//! against. [`CharacterTagger`] is the candle baseline: five embeddings
//! concatenated per character, a ReLU hidden layer and a linear emission
//! layer trained with masked softmax cross-entropy.

use std::path::Path;

use anyhow::{Context, Result};
use candle_core::{DType, Device, Module, Tensor, D};
use candle_nn::{AdamW, Embedding, Linear, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use mojiner_core::{Batch, BiesTag, CharType, StaticPreprocessor};
use tracing::{debug, info};

use crate::config::ModelConfig;

/// A trainable per-character label predictor.
pub trait SequenceTagger {
    /// Attach an optimizer with the given learning rate.
    fn compile(&mut self, learning_rate: f64) -> Result<()>;

    /// Run one optimization step on a labeled batch and return its loss.
    fn train_step(&mut self, batch: &Batch) -> Result<f32>;

    /// Most likely label ID for every position, padding included.
    fn predict(&self, batch: &Batch) -> Result<Vec<Vec<u32>>>;

    /// Persist the model weights.
    fn save(&self, path: &Path) -> Result<()>;
}

/// Input vocabulary sizes and label count of a fitted pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VocabSizes {
    pub words: usize,
    pub chars: usize,
    pub bies: usize,
    pub poses: usize,
    pub char_types: usize,
    pub labels: usize,
}

impl VocabSizes {
    pub fn from_preprocessor(preprocessor: &StaticPreprocessor) -> Self {
        Self {
            words: preprocessor.word_vocab().len(),
            chars: preprocessor.char_vocab().len(),
            bies: BiesTag::NUM_CODES,
            poses: preprocessor.pos_vocab().len(),
            char_types: CharType::NUM_CODES,
            labels: preprocessor.n_labels(),
        }
    }

    fn features(&self) -> [usize; 5] {
        [self.words, self.chars, self.bies, self.poses, self.char_types]
    }
}

const EMBEDDING_NAMES: [&str; 5] = [
    "word_embedding",
    "char_embedding",
    "bies_embedding",
    "pos_embedding",
    "char_type_embedding",
];

/// Embedding + feed-forward softmax tagger.
pub struct CharacterTagger {
    varmap: VarMap,
    embeddings: Vec<Embedding>,
    hidden: Linear,
    emission: Linear,
    optimizer: Option<AdamW>,
}

impl CharacterTagger {
    /// Build a freshly initialized model on `device`.
    pub fn new(config: &ModelConfig, sizes: &VocabSizes, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);

        let dims = config.embedding_dims();
        let embeddings = EMBEDDING_NAMES
            .iter()
            .zip(sizes.features())
            .zip(dims)
            .map(|((name, count), dim)| candle_nn::embedding(count, dim, vb.pp(*name)))
            .collect::<candle_core::Result<Vec<_>>>()?;

        let input_dim: usize = dims.iter().sum();
        let hidden = candle_nn::linear(input_dim, config.hidden_dim, vb.pp("hidden"))?;
        let emission = candle_nn::linear(config.hidden_dim, sizes.labels, vb.pp("classifier"))?;

        info!(
            input_dim,
            hidden_dim = config.hidden_dim,
            labels = sizes.labels,
            "built character tagger"
        );

        Ok(Self {
            varmap,
            embeddings,
            hidden,
            emission,
            optimizer: None,
        })
    }

    /// Emission scores with shape `(batch, max_len, n_labels)`.
    pub fn forward(&self, batch: &Batch) -> Result<Tensor> {
        let embedded = self
            .embeddings
            .iter()
            .zip(batch.inputs())
            .map(|(embedding, ids)| embedding.forward(ids))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let features = Tensor::cat(&embedded, D::Minus1)?;
        let hidden = self.hidden.forward(&features)?.relu()?;
        Ok(self.emission.forward(&hidden)?)
    }

    /// Mean cross-entropy over positions whose gold label is not padding.
    pub fn loss(&self, batch: &Batch) -> Result<Tensor> {
        let labels = batch
            .labels
            .as_ref()
            .context("training batch carries no labels")?;
        let log_probs = candle_nn::ops::log_softmax(&self.forward(batch)?, D::Minus1)?;

        // one-hot channel 0 marks padded positions
        let mask = labels
            .narrow(D::Minus1, 0, 1)?
            .squeeze(D::Minus1)?
            .affine(-1.0, 1.0)?;
        let nll = (labels * &log_probs)?.sum(D::Minus1)?.neg()?;
        let total = (nll * &mask)?.sum_all()?;
        let count = mask.sum_all()?.to_scalar::<f32>()?.max(1.0);
        Ok((total / count as f64)?)
    }

    /// Restore weights written by [`SequenceTagger::save`].
    pub fn load_weights<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.varmap
            .load(path)
            .with_context(|| format!("failed to load weights {}", path.display()))
    }
}

impl SequenceTagger for CharacterTagger {
    fn compile(&mut self, learning_rate: f64) -> Result<()> {
        let params = ParamsAdamW {
            lr: learning_rate,
            ..Default::default()
        };
        self.optimizer = Some(AdamW::new(self.varmap.all_vars(), params)?);
        Ok(())
    }

    fn train_step(&mut self, batch: &Batch) -> Result<f32> {
        let loss = self.loss(batch)?;
        let optimizer = self
            .optimizer
            .as_mut()
            .context("model must be compiled before training")?;
        optimizer.backward_step(&loss)?;

        let loss = loss.to_scalar::<f32>()?;
        debug!(loss, "train step");
        Ok(loss)
    }

    fn predict(&self, batch: &Batch) -> Result<Vec<Vec<u32>>> {
        Ok(self.forward(batch)?.argmax(D::Minus1)?.to_vec2::<u32>()?)
    }

    fn save(&self, path: &Path) -> Result<()> {
        self.varmap
            .save(path)
            .with_context(|| format!("failed to save weights {}", path.display()))?;
        info!(path = %path.display(), "saved model weights");
        Ok(())
    }
}
