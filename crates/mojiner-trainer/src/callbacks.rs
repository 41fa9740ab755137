//! # Epoch Callbacks
//!
//! Hooks run by the fit loop after every epoch: validation scoring,
//! checkpointing, scalar metric logging and early stopping. Callbacks share
//! one [`EpochLogs`] map per epoch, so validation must run before the
//! callbacks that read its scores.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use candle_core::D;
use mojiner_core::{BatchIterator, StaticPreprocessor, PAD_ID};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::metrics::{entity_scores, Scores};
use crate::model::SequenceTagger;

/// Scalar values recorded for one epoch, keyed by metric name.
pub type EpochLogs = BTreeMap<String, f64>;

pub const LOSS: &str = "loss";
pub const VAL_F1: &str = "val_f1";
pub const VAL_PRECISION: &str = "val_precision";
pub const VAL_RECALL: &str = "val_recall";

/// Validation data handed to [`get_callbacks`]: steps, batches, preprocessor.
pub type ValidationData<'a> = (usize, BatchIterator<'a>, &'a StaticPreprocessor);

pub trait Callback {
    /// Called once after each epoch; `epoch` counts from 1.
    fn on_epoch_end(
        &mut self,
        epoch: usize,
        model: &dyn SequenceTagger,
        logs: &mut EpochLogs,
    ) -> Result<()>;

    /// Whether the fit loop should stop after the current epoch.
    fn stop_training(&self) -> bool {
        false
    }
}

/// Scores the model on held-out batches at the end of every epoch.
pub struct Validation<'a> {
    steps: usize,
    batches: BatchIterator<'a>,
    preprocessor: &'a StaticPreprocessor,
}

impl<'a> Validation<'a> {
    pub fn new(
        steps: usize,
        batches: BatchIterator<'a>,
        preprocessor: &'a StaticPreprocessor,
    ) -> Self {
        Self {
            steps,
            batches,
            preprocessor,
        }
    }

    /// Entity-level scores of `model` over the validation batches.
    pub fn evaluate(&self, model: &dyn SequenceTagger) -> Result<Scores> {
        let mut y_true = Vec::new();
        let mut y_pred = Vec::new();

        for step in 0..self.steps {
            let batch = self.batches.batch(step)?;
            let labels = batch
                .labels
                .as_ref()
                .context("validation batch carries no labels")?;
            let gold = labels.argmax(D::Minus1)?.to_vec2::<u32>()?;
            let predicted = model.predict(&batch)?;

            // a document ends at its first padded position
            let lengths: Vec<usize> = gold
                .iter()
                .map(|row| row.iter().position(|&id| id == PAD_ID).unwrap_or(row.len()))
                .collect();
            let gold: Vec<&[u32]> = gold
                .iter()
                .zip(&lengths)
                .map(|(row, &len)| &row[..len])
                .collect();
            let predicted: Vec<&[u32]> = predicted
                .iter()
                .zip(&lengths)
                .map(|(row, &len)| &row[..len.min(row.len())])
                .collect();

            y_true.extend(self.preprocessor.inverse_labels(&gold)?);
            y_pred.extend(self.preprocessor.inverse_labels(&predicted)?);
        }

        Ok(entity_scores(&y_true, &y_pred))
    }
}

impl Callback for Validation<'_> {
    fn on_epoch_end(
        &mut self,
        epoch: usize,
        model: &dyn SequenceTagger,
        logs: &mut EpochLogs,
    ) -> Result<()> {
        let scores = self.evaluate(model)?;
        info!(
            epoch,
            f1 = scores.f1,
            precision = scores.precision,
            recall = scores.recall,
            "validation"
        );
        logs.insert(VAL_F1.into(), scores.f1);
        logs.insert(VAL_PRECISION.into(), scores.precision);
        logs.insert(VAL_RECALL.into(), scores.recall);
        Ok(())
    }
}

/// Saves model weights into the log directory.
///
/// With `save_best_only` a checkpoint is written only when `val_f1`
/// improves; otherwise every epoch is saved.
pub struct Checkpoint {
    log_dir: PathBuf,
    save_best_only: bool,
    best: Option<f64>,
}

impl Checkpoint {
    pub fn new<P: AsRef<Path>>(log_dir: P, save_best_only: bool) -> Self {
        Self {
            log_dir: log_dir.as_ref().to_path_buf(),
            save_best_only,
            best: None,
        }
    }

    fn file_name(epoch: usize, f1: Option<f64>) -> String {
        match f1 {
            Some(f1) => format!("model_weights_{epoch:02}_{f1:.2}.safetensors"),
            None => format!("model_weights_{epoch:02}.safetensors"),
        }
    }
}

impl Callback for Checkpoint {
    fn on_epoch_end(
        &mut self,
        epoch: usize,
        model: &dyn SequenceTagger,
        logs: &mut EpochLogs,
    ) -> Result<()> {
        let f1 = logs.get(VAL_F1).copied();
        if self.save_best_only {
            let Some(current) = f1 else {
                warn!(epoch, monitor = VAL_F1, "checkpoint metric not logged");
                return Ok(());
            };
            if self.best.is_some_and(|best| current <= best) {
                return Ok(());
            }
            self.best = Some(current);
        }

        model.save(&self.log_dir.join(Self::file_name(epoch, f1)))
    }
}

/// Appends one JSON object per epoch to `metrics.jsonl`.
pub struct MetricsLog {
    path: PathBuf,
}

impl MetricsLog {
    pub fn new<P: AsRef<Path>>(log_dir: P) -> Self {
        Self {
            path: log_dir.as_ref().join("metrics.jsonl"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))
    }
}

impl Callback for MetricsLog {
    fn on_epoch_end(
        &mut self,
        epoch: usize,
        _model: &dyn SequenceTagger,
        logs: &mut EpochLogs,
    ) -> Result<()> {
        let mut record = Map::new();
        record.insert("epoch".into(), Value::from(epoch));
        for (name, value) in logs.iter() {
            record.insert(name.clone(), Value::from(*value));
        }

        let mut file = self.open()?;
        writeln!(file, "{}", Value::Object(record))?;
        Ok(())
    }
}

/// Stops training once a maximized metric stalls for `patience` epochs.
pub struct EarlyStopping {
    monitor: String,
    patience: usize,
    best: Option<f64>,
    wait: usize,
    stopped: bool,
}

impl EarlyStopping {
    pub fn new(monitor: impl Into<String>, patience: usize) -> Self {
        Self {
            monitor: monitor.into(),
            patience,
            best: None,
            wait: 0,
            stopped: false,
        }
    }
}

impl Callback for EarlyStopping {
    fn on_epoch_end(
        &mut self,
        epoch: usize,
        _model: &dyn SequenceTagger,
        logs: &mut EpochLogs,
    ) -> Result<()> {
        let Some(&current) = logs.get(&self.monitor) else {
            warn!(epoch, monitor = %self.monitor, "early stopping metric not logged");
            return Ok(());
        };

        if self.best.is_none_or(|best| current > best) {
            self.best = Some(current);
            self.wait = 0;
            return Ok(());
        }

        self.wait += 1;
        if self.wait >= self.patience {
            self.stopped = true;
            info!(epoch, monitor = %self.monitor, "no improvement, stopping early");
        }
        Ok(())
    }

    fn stop_training(&self) -> bool {
        self.stopped
    }
}

/// Assemble the callbacks of one training run.
///
/// Validation, checkpoint-on-improvement and early stopping (`Some(patience)`)
/// need `valid` with at least one step; otherwise only per-epoch checkpoints
/// and the optional metrics log are returned.
pub fn get_callbacks<'a>(
    log_dir: &Path,
    metrics_logging: bool,
    early_stopping: Option<usize>,
    valid: Option<ValidationData<'a>>,
) -> Result<Vec<Box<dyn Callback + 'a>>> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log dir {}", log_dir.display()))?;

    let valid = valid.filter(|(steps, _, _)| {
        if *steps == 0 {
            warn!("validation data is empty, skipping validation");
        }
        *steps > 0
    });

    let mut callbacks: Vec<Box<dyn Callback + 'a>> = Vec::new();
    let validating = valid.is_some();

    if let Some((steps, batches, preprocessor)) = valid {
        callbacks.push(Box::new(Validation::new(steps, batches, preprocessor)));
    }
    callbacks.push(Box::new(Checkpoint::new(log_dir, validating)));
    if metrics_logging {
        callbacks.push(Box::new(MetricsLog::new(log_dir)));
    }
    if let (true, Some(patience)) = (validating, early_stopping) {
        callbacks.push(Box::new(EarlyStopping::new(VAL_F1, patience)));
    }

    Ok(callbacks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mojiner_core::{Batch, Document, DynamicPreprocessor, LabelSequence, ScriptRunAnalyzer};

    /// Predicts the gold labels, or padding everywhere.
    struct Oracle {
        silent: bool,
    }

    impl SequenceTagger for Oracle {
        fn compile(&mut self, _learning_rate: f64) -> Result<()> {
            Ok(())
        }

        fn train_step(&mut self, _batch: &Batch) -> Result<f32> {
            Ok(0.0)
        }

        fn predict(&self, batch: &Batch) -> Result<Vec<Vec<u32>>> {
            let gold = batch.labels.as_ref().context("no labels")?;
            let ids = gold.argmax(D::Minus1)?.to_vec2::<u32>()?;
            if self.silent {
                return Ok(ids.iter().map(|row| vec![PAD_ID; row.len()]).collect());
            }
            Ok(ids)
        }

        fn save(&self, path: &Path) -> Result<()> {
            fs::write(path, b"weights")?;
            Ok(())
        }
    }

    fn corpus() -> (Vec<Document>, Vec<LabelSequence>) {
        let docs = vec![
            vec!["東京".to_string(), "へ".to_string()],
            vec!["大阪城".to_string()],
            vec!["行く".to_string()],
        ];
        let labels = [
            vec!["B-LOC", "I-LOC", "O"],
            vec!["B-LOC", "I-LOC", "I-LOC"],
            vec!["O", "O"],
        ]
        .iter()
        .map(|seq| seq.iter().map(|l| l.to_string()).collect())
        .collect();
        (docs, labels)
    }

    fn logs_with_f1(f1: f64) -> EpochLogs {
        EpochLogs::from([(VAL_F1.to_string(), f1)])
    }

    #[test]
    fn test_validation_scores() {
        let (docs, labels) = corpus();
        let mut p = StaticPreprocessor::default();
        p.fit(&ScriptRunAnalyzer, &docs, &labels).unwrap();
        let dp = DynamicPreprocessor::new(p.n_labels());
        let batches =
            BatchIterator::new(&ScriptRunAnalyzer, &p, &dp, &docs, Some(labels.as_slice()), 2)
                .unwrap();
        let mut validation = Validation::new(batches.steps(), batches, &p);

        let mut logs = EpochLogs::new();
        validation
            .on_epoch_end(1, &Oracle { silent: false }, &mut logs)
            .unwrap();
        assert_eq!(logs[VAL_F1], 1.0);
        assert_eq!(logs[VAL_PRECISION], 1.0);
        assert_eq!(logs[VAL_RECALL], 1.0);

        let scores = validation.evaluate(&Oracle { silent: true }).unwrap();
        assert_eq!(scores.f1, 0.0);
    }

    #[test]
    fn test_checkpoint_saves_only_improvements() {
        let dir = tempfile::tempdir().unwrap();
        let mut checkpoint = Checkpoint::new(dir.path(), true);
        let model = Oracle { silent: false };

        for (epoch, f1) in [(1, 0.5), (2, 0.4), (3, 0.7), (4, 0.7)] {
            checkpoint
                .on_epoch_end(epoch, &model, &mut logs_with_f1(f1))
                .unwrap();
        }

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "model_weights_01_0.50.safetensors",
                "model_weights_03_0.70.safetensors"
            ]
        );
    }

    #[test]
    fn test_checkpoint_every_epoch_without_validation() {
        let dir = tempfile::tempdir().unwrap();
        let mut checkpoint = Checkpoint::new(dir.path(), false);
        let model = Oracle { silent: false };

        for epoch in 1..=3 {
            checkpoint
                .on_epoch_end(epoch, &model, &mut EpochLogs::new())
                .unwrap();
        }
        assert!(dir.path().join("model_weights_03.safetensors").exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 3);
    }

    #[test]
    fn test_metrics_log_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = MetricsLog::new(dir.path());
        let model = Oracle { silent: false };

        let mut logs = logs_with_f1(0.25);
        logs.insert(LOSS.into(), 1.5);
        log.on_epoch_end(1, &model, &mut logs).unwrap();
        log.on_epoch_end(2, &model, &mut logs_with_f1(0.5)).unwrap();

        let content = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<Value> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["epoch"], 1);
        assert_eq!(lines[0]["loss"], 1.5);
        assert_eq!(lines[1]["val_f1"], 0.5);
    }

    #[test]
    fn test_early_stopping_after_patience() {
        let mut stopper = EarlyStopping::new(VAL_F1, 2);
        let model = Oracle { silent: false };

        let history = [0.5, 0.6, 0.55, 0.58];
        let mut stopped_at = None;
        for (i, f1) in history.into_iter().enumerate() {
            stopper
                .on_epoch_end(i + 1, &model, &mut logs_with_f1(f1))
                .unwrap();
            if stopper.stop_training() {
                stopped_at = Some(i + 1);
                break;
            }
        }
        assert_eq!(stopped_at, Some(4));
    }

    #[test]
    fn test_early_stopping_resets_on_improvement() {
        let mut stopper = EarlyStopping::new(VAL_F1, 2);
        let model = Oracle { silent: false };

        for (i, f1) in [0.5, 0.4, 0.6, 0.5].into_iter().enumerate() {
            stopper
                .on_epoch_end(i + 1, &model, &mut logs_with_f1(f1))
                .unwrap();
        }
        assert!(!stopper.stop_training());
    }

    #[test]
    fn test_get_callbacks_composition() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");

        let callbacks = get_callbacks(&log_dir, true, Some(3), None).unwrap();
        assert_eq!(callbacks.len(), 2);
        assert!(log_dir.is_dir());

        let (docs, labels) = corpus();
        let mut p = StaticPreprocessor::default();
        p.fit(&ScriptRunAnalyzer, &docs, &labels).unwrap();
        let dp = DynamicPreprocessor::new(p.n_labels());
        let batches =
            BatchIterator::new(&ScriptRunAnalyzer, &p, &dp, &docs, Some(labels.as_slice()), 2)
                .unwrap();

        let valid = Some((batches.steps(), batches, &p));
        let callbacks = get_callbacks(&log_dir, false, Some(3), valid).unwrap();
        assert_eq!(callbacks.len(), 3);
    }

    #[test]
    fn test_get_callbacks_ignores_empty_validation() {
        let dir = tempfile::tempdir().unwrap();
        let (docs, labels) = corpus();
        let mut p = StaticPreprocessor::default();
        p.fit(&ScriptRunAnalyzer, &docs, &labels).unwrap();
        let dp = DynamicPreprocessor::new(p.n_labels());
        let empty_docs: Vec<Document> = Vec::new();
        let empty_labels: Vec<LabelSequence> = Vec::new();
        let batches = BatchIterator::new(
            &ScriptRunAnalyzer,
            &p,
            &dp,
            &empty_docs,
            Some(empty_labels.as_slice()),
            2,
        )
        .unwrap();

        let valid = Some((batches.steps(), batches, &p));
        let callbacks = get_callbacks(dir.path(), false, Some(3), valid).unwrap();
        // only the every-epoch checkpoint remains
        assert_eq!(callbacks.len(), 1);
    }
}
