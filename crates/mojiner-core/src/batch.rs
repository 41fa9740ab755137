//! # Minibatch Generation
//!
//! Splits a dataset into consecutive fixed-size groups and runs both
//! preprocessors on each group.

use std::ops::Range;

use tracing::debug;

use crate::error::{MojinerError, Result};
use crate::features::{Batch, Document, DynamicPreprocessor, LabelSequence, StaticPreprocessor};
use crate::tokenizer::Analyzer;

/// Deterministic, restartable minibatch source.
///
/// Holds no cursor: every pass produced by [`epoch`](Self::epoch) or
/// [`cycle`](Self::cycle) starts at the first group.
pub struct BatchIterator<'a> {
    analyzer: &'a dyn Analyzer,
    preprocessor: &'a StaticPreprocessor,
    dynamic: &'a DynamicPreprocessor,
    documents: &'a [Document],
    labels: Option<&'a [LabelSequence]>,
    batch_size: usize,
}

impl<'a> BatchIterator<'a> {
    /// Create a batch source over `documents` and their optional labels.
    ///
    /// # Errors
    ///
    /// Returns `MojinerError::InvalidBatchSize` for a batch size of 0 and
    /// `MojinerError::DocumentCountMismatch` if labels are given for a
    /// different number of documents.
    pub fn new(
        analyzer: &'a dyn Analyzer,
        preprocessor: &'a StaticPreprocessor,
        dynamic: &'a DynamicPreprocessor,
        documents: &'a [Document],
        labels: Option<&'a [LabelSequence]>,
        batch_size: usize,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(MojinerError::InvalidBatchSize);
        }
        if let Some(labels) = labels {
            if labels.len() != documents.len() {
                return Err(MojinerError::DocumentCountMismatch {
                    documents: documents.len(),
                    labels: labels.len(),
                });
            }
        }

        Ok(Self {
            analyzer,
            preprocessor,
            dynamic,
            documents,
            labels,
            batch_size,
        })
    }

    /// Number of batches in one pass over the data.
    pub fn steps(&self) -> usize {
        self.documents.len().div_ceil(self.batch_size)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn preprocessor(&self) -> &'a StaticPreprocessor {
        self.preprocessor
    }

    /// Document indices covered by batch `step` (taken modulo [`steps`](Self::steps)).
    pub fn group(&self, step: usize) -> Range<usize> {
        let steps = self.steps().max(1);
        let start = (step % steps) * self.batch_size;
        let end = (start + self.batch_size).min(self.documents.len());
        start.min(end)..end
    }

    /// Label sequences of batch `step`, if labels were supplied.
    pub fn group_labels(&self, step: usize) -> Option<&'a [LabelSequence]> {
        let range = self.group(step);
        self.labels.map(|labels| &labels[range])
    }

    /// Build the tensors of batch `step`.
    pub fn batch(&self, step: usize) -> Result<Batch> {
        let range = self.group(step);
        debug!(step, documents = range.len(), "building batch");

        let documents = &self.documents[range.clone()];
        let labels = self.labels.map(|labels| &labels[range]);
        let encoded = self
            .preprocessor
            .transform(self.analyzer, documents, labels)?;
        self.dynamic
            .transform(&encoded.features, encoded.labels.as_deref())
    }

    /// One pass over the data, group by group.
    pub fn epoch(&self) -> impl Iterator<Item = Result<Batch>> + '_ {
        (0..self.steps()).map(move |step| self.batch(step))
    }

    /// Endless passes over the data; empty when there are no documents.
    pub fn cycle(&self) -> impl Iterator<Item = Result<Batch>> + '_ {
        (0..self.steps()).cycle().map(move |step| self.batch(step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::ScriptRunAnalyzer;

    fn dataset(n: usize) -> (Vec<Document>, Vec<LabelSequence>) {
        let docs: Vec<Document> = (0..n)
            .map(|i| "東京".repeat(i % 3 + 1).chars().map(String::from).collect())
            .collect();
        let labels = docs
            .iter()
            .map(|doc| doc.iter().map(|_| "O".to_string()).collect())
            .collect();
        (docs, labels)
    }

    fn fitted(docs: &[Document], labels: &[LabelSequence]) -> StaticPreprocessor {
        let mut p = StaticPreprocessor::default();
        p.fit(&ScriptRunAnalyzer, docs, labels).unwrap();
        p
    }

    #[test]
    fn test_steps_and_group_sizes() {
        let (docs, labels) = dataset(17);
        let p = fitted(&docs, &labels);
        let dp = DynamicPreprocessor::new(p.n_labels());
        let it = BatchIterator::new(&ScriptRunAnalyzer, &p, &dp, &docs, Some(labels.as_slice()), 5)
            .unwrap();

        assert_eq!(it.steps(), 4);
        let sizes: Vec<usize> = it
            .epoch()
            .map(|batch| batch.unwrap().dims().unwrap().0)
            .collect();
        assert_eq!(sizes, vec![5, 5, 5, 2]);
    }

    #[test]
    fn test_cycle_repeats_without_drift() {
        let (docs, labels) = dataset(17);
        let p = fitted(&docs, &labels);
        let dp = DynamicPreprocessor::new(p.n_labels());
        let it = BatchIterator::new(&ScriptRunAnalyzer, &p, &dp, &docs, Some(labels.as_slice()), 5)
            .unwrap();

        let sizes: Vec<usize> = it
            .cycle()
            .take(it.steps() * 3)
            .map(|batch| batch.unwrap().dims().unwrap().0)
            .collect();
        assert_eq!(sizes, [5usize, 5, 5, 2].repeat(3));

        let groups: Vec<Range<usize>> = (0..8).map(|s| it.group(s)).collect();
        assert_eq!(groups[0], groups[4]);
        assert_eq!(groups[3], 15..17);
        assert_eq!(groups[7], 15..17);
    }

    #[test]
    fn test_epochs_restart_from_first_group() {
        let (docs, labels) = dataset(7);
        let p = fitted(&docs, &labels);
        let dp = DynamicPreprocessor::new(p.n_labels());
        let it = BatchIterator::new(&ScriptRunAnalyzer, &p, &dp, &docs, None, 3).unwrap();

        let first: Vec<_> = it
            .epoch()
            .map(|b| b.unwrap().chars.to_vec2::<u32>().unwrap())
            .collect();
        let second: Vec<_> = it
            .epoch()
            .map(|b| b.unwrap().chars.to_vec2::<u32>().unwrap())
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_batches_carry_one_hot_labels() {
        let (docs, labels) = dataset(4);
        let p = fitted(&docs, &labels);
        let dp = DynamicPreprocessor::new(p.n_labels());
        let it = BatchIterator::new(&ScriptRunAnalyzer, &p, &dp, &docs, Some(labels.as_slice()), 4)
            .unwrap();

        let batch = it.batch(0).unwrap();
        let (rows, max_len) = batch.dims().unwrap();
        assert_eq!((rows, max_len), (4, 6));
        let one_hot = batch.labels.unwrap();
        assert_eq!(one_hot.dims3().unwrap(), (4, 6, p.n_labels()));
    }

    #[test]
    fn test_empty_dataset_yields_nothing() {
        let (docs, labels) = dataset(3);
        let p = fitted(&docs, &labels);
        let dp = DynamicPreprocessor::new(p.n_labels());
        let empty: Vec<Document> = Vec::new();
        let it = BatchIterator::new(&ScriptRunAnalyzer, &p, &dp, &empty, None, 5).unwrap();

        assert_eq!(it.steps(), 0);
        assert_eq!(it.epoch().count(), 0);
        assert_eq!(it.cycle().count(), 0);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let (docs, labels) = dataset(3);
        let p = fitted(&docs, &labels);
        let dp = DynamicPreprocessor::new(p.n_labels());
        let result = BatchIterator::new(&ScriptRunAnalyzer, &p, &dp, &docs, None, 0);
        assert!(matches!(result, Err(MojinerError::InvalidBatchSize)));
    }
}
