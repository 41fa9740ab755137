//! Entity-level precision, recall and F1.

use std::collections::HashSet;

use mojiner_core::get_entities;
use serde::Serialize;

/// Chunk-level scores over a set of documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Scores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Score predicted label sequences against gold ones.
///
/// An entity counts as correct only when its type and both boundaries match
/// a gold entity of the same document.
pub fn entity_scores<S: AsRef<str>>(y_true: &[Vec<S>], y_pred: &[Vec<S>]) -> Scores {
    let true_entities = collect(y_true);
    let pred_entities = collect(y_pred);
    let correct = true_entities.intersection(&pred_entities).count() as f64;

    let ratio = |n: usize| if n == 0 { 0.0 } else { correct / n as f64 };
    let precision = ratio(pred_entities.len());
    let recall = ratio(true_entities.len());
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    Scores {
        precision,
        recall,
        f1,
    }
}

/// F1 of [`entity_scores`].
pub fn f1_score<S: AsRef<str>>(y_true: &[Vec<S>], y_pred: &[Vec<S>]) -> f64 {
    entity_scores(y_true, y_pred).f1
}

fn collect<S: AsRef<str>>(sequences: &[Vec<S>]) -> HashSet<(usize, String, usize, usize)> {
    sequences
        .iter()
        .enumerate()
        .flat_map(|(doc, labels)| {
            get_entities(labels.as_slice())
                .into_iter()
                .map(move |e| (doc, e.entity_type, e.start, e.end))
        })
        .collect()
}
