//! Model and training hyperparameters.
//!
//! Both configs load from JSON; every field is optional and falls back to
//! its default.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Layer sizes of the baseline tagger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub word_embedding_dim: usize,
    pub char_embedding_dim: usize,
    pub bies_embedding_dim: usize,
    pub pos_embedding_dim: usize,
    pub char_type_embedding_dim: usize,
    pub hidden_dim: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            word_embedding_dim: 100,
            char_embedding_dim: 50,
            bies_embedding_dim: 10,
            pos_embedding_dim: 20,
            char_type_embedding_dim: 10,
            hidden_dim: 128,
        }
    }
}

impl ModelConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_json(path.as_ref())
    }

    /// Embedding widths in input order: word, char, BIES, POS, char-type.
    pub fn embedding_dims(&self) -> [usize; 5] {
        [
            self.word_embedding_dim,
            self.char_embedding_dim,
            self.bies_embedding_dim,
            self.pos_embedding_dim,
            self.char_type_embedding_dim,
        ]
    }
}

/// Optimizer and fit-loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub batch_size: usize,
    pub learning_rate: f64,
    pub max_epoch: usize,
    pub early_stopping: bool,
    pub patience: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            learning_rate: 0.001,
            max_epoch: 15,
            early_stopping: true,
            patience: 3,
        }
    }
}

impl TrainingConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_json(path.as_ref())
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("invalid config {}", path.display()))
}
