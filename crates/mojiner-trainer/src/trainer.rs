//! Training driver: batch sources, model, callbacks and the fit loop.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mojiner_core::{
    Analyzer, Batch, BatchIterator, Document, DynamicPreprocessor, LabelSequence,
    StaticPreprocessor,
};
use tracing::info;

use crate::callbacks::{get_callbacks, Callback, EpochLogs, LOSS};
use crate::config::{ModelConfig, TrainingConfig};
use crate::model::{CharacterTagger, SequenceTagger, VocabSizes};

/// File name of the final weights inside the save directory.
pub const MODEL_FILE: &str = "model.safetensors";

/// Run `epochs` epochs of `steps` batches each, drawing from `batches`.
///
/// Every callback sees every epoch; the loop ends early once any callback
/// asks to stop. Returns the logs of each completed epoch.
pub fn fit_generator<I>(
    model: &mut dyn SequenceTagger,
    steps: usize,
    mut batches: I,
    epochs: usize,
    callbacks: &mut [Box<dyn Callback + '_>],
) -> Result<Vec<EpochLogs>>
where
    I: Iterator<Item = mojiner_core::Result<Batch>>,
{
    let mut history = Vec::with_capacity(epochs);

    for epoch in 1..=epochs {
        let mut total_loss = 0.0f64;
        for _ in 0..steps {
            let batch = batches.next().context("batch source exhausted")??;
            total_loss += f64::from(model.train_step(&batch)?);
        }

        let mut logs = EpochLogs::new();
        logs.insert(LOSS.into(), total_loss / steps.max(1) as f64);
        info!(epoch, epochs, loss = logs[LOSS], "epoch finished");

        for callback in callbacks.iter_mut() {
            callback.on_epoch_end(epoch, &*model, &mut logs)?;
        }
        history.push(logs);

        if callbacks.iter().any(|callback| callback.stop_training()) {
            info!(epoch, "training stopped by callback");
            break;
        }
    }

    Ok(history)
}

/// Drives one training run over a fitted pair of preprocessors.
pub struct Trainer<'a> {
    model_config: ModelConfig,
    training_config: TrainingConfig,
    log_dir: PathBuf,
    save_path: PathBuf,
    metrics_logging: bool,
    preprocessor: &'a StaticPreprocessor,
    dynamic: &'a DynamicPreprocessor,
}

impl<'a> Trainer<'a> {
    /// # Arguments
    /// * `log_dir` - Checkpoints and the metrics log go here
    /// * `save_path` - Directory receiving the final `model.safetensors`
    pub fn new(
        model_config: ModelConfig,
        training_config: TrainingConfig,
        log_dir: impl Into<PathBuf>,
        save_path: impl Into<PathBuf>,
        preprocessor: &'a StaticPreprocessor,
        dynamic: &'a DynamicPreprocessor,
    ) -> Self {
        Self {
            model_config,
            training_config,
            log_dir: log_dir.into(),
            save_path: save_path.into(),
            metrics_logging: true,
            preprocessor,
            dynamic,
        }
    }

    /// Enable or disable `metrics.jsonl` output.
    pub fn with_metrics_logging(mut self, enabled: bool) -> Self {
        self.metrics_logging = enabled;
        self
    }

    pub fn save_path(&self) -> &Path {
        &self.save_path
    }

    /// Train a fresh [`CharacterTagger`] sized by the fitted vocabularies.
    pub fn train(
        &self,
        analyzer: &dyn Analyzer,
        x_train: &[Document],
        y_train: &[LabelSequence],
        x_valid: Option<&[Document]>,
        y_valid: Option<&[LabelSequence]>,
    ) -> Result<Vec<EpochLogs>> {
        let sizes = VocabSizes::from_preprocessor(self.preprocessor);
        let mut model = CharacterTagger::new(&self.model_config, &sizes, self.dynamic.device())?;
        self.train_model(&mut model, analyzer, x_train, y_train, x_valid, y_valid)
    }

    /// Compile and fit `model`, then save it as `<save_path>/model.safetensors`.
    ///
    /// Validation only happens when both `x_valid` and `y_valid` are given.
    pub fn train_model(
        &self,
        model: &mut dyn SequenceTagger,
        analyzer: &dyn Analyzer,
        x_train: &[Document],
        y_train: &[LabelSequence],
        x_valid: Option<&[Document]>,
        y_valid: Option<&[LabelSequence]>,
    ) -> Result<Vec<EpochLogs>> {
        let config = &self.training_config;
        let train = BatchIterator::new(
            analyzer,
            self.preprocessor,
            self.dynamic,
            x_train,
            Some(y_train),
            config.batch_size,
        )?;

        let valid = match (x_valid, y_valid) {
            (Some(x), Some(y)) => {
                let batches = BatchIterator::new(
                    analyzer,
                    self.preprocessor,
                    self.dynamic,
                    x,
                    Some(y),
                    config.batch_size,
                )?;
                Some((batches.steps(), batches, self.preprocessor))
            }
            _ => None,
        };

        let valid = valid.filter(|(steps, _, _)| *steps > 0);
        info!(
            train_documents = train.document_count(),
            steps = train.steps(),
            validating = valid.is_some(),
            "starting training"
        );

        model.compile(config.learning_rate)?;
        let early_stopping = config.early_stopping.then_some(config.patience);
        let mut callbacks =
            get_callbacks(&self.log_dir, self.metrics_logging, early_stopping, valid)?;

        let history = fit_generator(
            model,
            train.steps(),
            train.cycle(),
            config.max_epoch,
            &mut callbacks,
        )?;

        fs::create_dir_all(&self.save_path)
            .with_context(|| format!("failed to create {}", self.save_path.display()))?;
        model.save(&self.save_path.join(MODEL_FILE))?;
        info!(epochs = history.len(), "training finished");

        Ok(history)
    }
}
