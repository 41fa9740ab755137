//! # Mojiner Trainer
//!
//! Training side of mojiner: corpus loading, hyperparameter configs, a
//! baseline candle tagger, epoch callbacks with entity-level metrics, and the
//! fit loop behind the `train` binary.

pub mod callbacks;
pub mod cli;
pub mod config;
pub mod data;
pub mod metrics;
pub mod model;
pub mod trainer;

pub use callbacks::{
    get_callbacks, Callback, Checkpoint, EarlyStopping, EpochLogs, MetricsLog, Validation,
};
pub use cli::{run_training, TrainArgs};
pub use config::{ModelConfig, TrainingConfig};
pub use data::{load_corpus, parse_corpus, Corpus};
pub use metrics::{entity_scores, f1_score, Scores};
pub use model::{CharacterTagger, SequenceTagger, VocabSizes};
pub use trainer::{fit_generator, Trainer, MODEL_FILE};
