//! Command-line entry point of the `train` binary.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use mojiner_core::{
    Analyzer, DynamicPreprocessor, ScriptRunAnalyzer, StaticPreprocessor, VibratoAnalyzer,
};
use tracing::{info, warn};

use crate::config::{ModelConfig, TrainingConfig};
use crate::data::load_corpus;
use crate::trainer::Trainer;

/// File names of the persisted preprocessors inside the save directory.
pub const PREPROCESSOR_FILE: &str = "preprocessor.json";
pub const DYNAMIC_PREPROCESSOR_FILE: &str = "dynamic_preprocessor.json";

/// CLI arguments
#[derive(Debug, Parser)]
#[command(name = "train")]
#[command(about = "Train a character-level Japanese NER tagger")]
#[command(version)]
pub struct TrainArgs {
    /// Training corpus (`character<TAB>label` lines)
    #[arg(long)]
    pub train: PathBuf,

    /// Validation corpus in the same format
    #[arg(long)]
    pub valid: Option<PathBuf>,

    /// Compiled vibrato system dictionary; script-run segmentation without it
    #[arg(long, env = "MOJINER_DICT")]
    pub dict: Option<PathBuf>,

    /// Directory for the final model and preprocessors
    #[arg(long, default_value = "models")]
    pub save_dir: PathBuf,

    /// Directory for checkpoints and metrics
    #[arg(long, default_value = "logs")]
    pub log_dir: PathBuf,

    /// Model hyperparameters (JSON)
    #[arg(long)]
    pub model_config: Option<PathBuf>,

    /// Training hyperparameters (JSON)
    #[arg(long)]
    pub training_config: Option<PathBuf>,

    /// Do not write metrics.jsonl
    #[arg(long)]
    pub no_metrics_log: bool,

    /// Override the configured batch size
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Override the configured number of epochs
    #[arg(long)]
    pub epochs: Option<usize>,

    /// Keep the original letter case
    #[arg(long)]
    pub no_lowercase: bool,

    /// Keep digits as they are
    #[arg(long)]
    pub no_digit_norm: bool,
}

impl TrainArgs {
    fn configs(&self) -> Result<(ModelConfig, TrainingConfig)> {
        let model = match &self.model_config {
            Some(path) => ModelConfig::from_file(path)?,
            None => ModelConfig::default(),
        };
        let mut training = match &self.training_config {
            Some(path) => TrainingConfig::from_file(path)?,
            None => TrainingConfig::default(),
        };
        if let Some(batch_size) = self.batch_size {
            training.batch_size = batch_size;
        }
        if let Some(epochs) = self.epochs {
            training.max_epoch = epochs;
        }
        Ok((model, training))
    }

    fn analyzer(&self) -> Result<Box<dyn Analyzer>> {
        match &self.dict {
            Some(path) => Ok(Box::new(VibratoAnalyzer::from_path(path)?)),
            None => {
                warn!("no dictionary given, segmenting by script runs");
                Ok(Box::new(ScriptRunAnalyzer))
            }
        }
    }
}

/// Fit the preprocessors, train the tagger and persist every artifact.
pub fn run_training(args: &TrainArgs) -> Result<()> {
    let (model_config, training_config) = args.configs()?;
    let analyzer = args.analyzer()?;

    let train = load_corpus(&args.train)?;
    let valid = args.valid.as_ref().map(load_corpus).transpose()?;

    let mut preprocessor = StaticPreprocessor::new(!args.no_lowercase, !args.no_digit_norm);
    preprocessor.fit(analyzer.as_ref(), &train.documents, &train.labels)?;
    let dynamic = DynamicPreprocessor::new(preprocessor.n_labels());

    fs::create_dir_all(&args.save_dir)
        .with_context(|| format!("failed to create {}", args.save_dir.display()))?;
    preprocessor.save(args.save_dir.join(PREPROCESSOR_FILE))?;
    dynamic.save(args.save_dir.join(DYNAMIC_PREPROCESSOR_FILE))?;

    let trainer = Trainer::new(
        model_config,
        training_config,
        &args.log_dir,
        &args.save_dir,
        &preprocessor,
        &dynamic,
    )
    .with_metrics_logging(!args.no_metrics_log);

    let history = trainer.train(
        analyzer.as_ref(),
        &train.documents,
        &train.labels,
        valid.as_ref().map(|c| c.documents.as_slice()),
        valid.as_ref().map(|c| c.labels.as_slice()),
    )?;

    if let Some(last) = history.last() {
        info!(?last, "final epoch");
    }
    info!(save_dir = %args.save_dir.display(), "training complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trainer::MODEL_FILE;

    fn path_str(path: &std::path::Path) -> &str {
        path.to_str().unwrap()
    }

    const CORPUS: &str = "東\tB-LOC\n京\tI-LOC\nへ\tO\n\n大\tB-LOC\n阪\tI-LOC\nに\tO\n2\tO\n回\tO\n";

    #[test]
    fn test_parse_flags() {
        let args = TrainArgs::try_parse_from([
            "train",
            "--train",
            "train.tsv",
            "--epochs",
            "4",
            "--no-lowercase",
            "--no-metrics-log",
        ])
        .unwrap();

        assert_eq!(args.train, PathBuf::from("train.tsv"));
        assert_eq!(args.epochs, Some(4));
        assert!(args.no_lowercase);
        assert!(!args.no_digit_norm);
        assert!(args.no_metrics_log);
        assert_eq!(args.save_dir, PathBuf::from("models"));

        let (_, training) = args.configs().unwrap();
        assert_eq!(training.max_epoch, 4);
        assert_eq!(training.batch_size, 32);
    }

    #[test]
    fn test_train_is_required() {
        assert!(TrainArgs::try_parse_from(["train"]).is_err());
    }

    #[test]
    fn test_run_training_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("train.tsv");
        fs::write(&corpus, CORPUS).unwrap();
        let save_dir = dir.path().join("model");
        let log_dir = dir.path().join("logs");

        let args = TrainArgs::try_parse_from([
            "train",
            "--train",
            path_str(&corpus),
            "--valid",
            path_str(&corpus),
            "--save-dir",
            path_str(&save_dir),
            "--log-dir",
            path_str(&log_dir),
            "--epochs",
            "2",
            "--batch-size",
            "1",
        ])
        .unwrap();
        run_training(&args).unwrap();

        assert!(save_dir.join(MODEL_FILE).exists());
        assert!(save_dir.join(DYNAMIC_PREPROCESSOR_FILE).exists());
        assert!(log_dir.join("metrics.jsonl").exists());

        let preprocessor = StaticPreprocessor::load(save_dir.join(PREPROCESSOR_FILE)).unwrap();
        assert!(preprocessor.is_fitted());
        assert_eq!(preprocessor.n_labels(), 4);
    }

    #[test]
    fn test_document_ending_in_whitespace_trains() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("train.tsv");
        fs::write(&corpus, "東\tB-LOC\n京\tI-LOC\n\u{3000}\tO\n").unwrap();
        let save_dir = dir.path().join("model");

        let args = TrainArgs::try_parse_from([
            "train",
            "--train",
            path_str(&corpus),
            "--save-dir",
            path_str(&save_dir),
            "--log-dir",
            path_str(&dir.path().join("logs")),
            "--epochs",
            "1",
        ])
        .unwrap();
        run_training(&args).unwrap();
        assert!(save_dir.join(MODEL_FILE).exists());
    }

    #[test]
    fn test_missing_corpus_fails() {
        let dir = tempfile::tempdir().unwrap();
        let absent = dir.path().join("absent.tsv");
        let args = TrainArgs::try_parse_from(["train", "--train", path_str(&absent)]).unwrap();
        assert!(run_training(&args).is_err());
    }
}
