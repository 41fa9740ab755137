//! Corpus loading for character-labeled training data.
//!
//! One `character<TAB>label` pair per line, blank lines between documents.
//! Lines starting with `#` that carry no tab are comments. Whitespace rows
//! at the end of a document are discarded.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, Context, Result};
use mojiner_core::{Document, LabelSequence};
use tracing::info;

/// Parallel documents and label sequences.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    pub documents: Vec<Document>,
    pub labels: Vec<LabelSequence>,
}

impl Corpus {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Close a document, dropping trailing whitespace rows with their labels.
    fn push(&mut self, document: &mut Document, labels: &mut LabelSequence) {
        while document.last().is_some_and(|token| token.trim().is_empty()) {
            document.pop();
            labels.pop();
        }
        if !document.is_empty() {
            self.documents.push(std::mem::take(document));
            self.labels.push(std::mem::take(labels));
        }
    }
}

/// Load a corpus file.
pub fn load_corpus<P: AsRef<Path>>(path: P) -> Result<Corpus> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("failed to open corpus {}", path.display()))?;
    let corpus = parse_corpus(BufReader::new(file))
        .with_context(|| format!("failed to parse corpus {}", path.display()))?;
    info!(path = %path.display(), documents = corpus.len(), "loaded corpus");
    Ok(corpus)
}

/// Parse corpus text from any buffered reader.
pub fn parse_corpus<R: BufRead>(reader: R) -> Result<Corpus> {
    let mut corpus = Corpus::default();
    let mut document = Document::new();
    let mut labels = LabelSequence::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_end_matches('\r');

        if line.trim().is_empty() {
            corpus.push(&mut document, &mut labels);
            continue;
        }

        if line.starts_with('#') && !line.contains('\t') {
            continue;
        }

        match line.split_once('\t') {
            Some((token, label)) if !token.is_empty() && is_label(label) => {
                document.push(token.to_string());
                labels.push(label.trim().to_string());
            }
            _ => bail!("line {}: expected `character<TAB>label`, got {:?}", idx + 1, line),
        }
    }

    corpus.push(&mut document, &mut labels);
    Ok(corpus)
}

fn is_label(label: &str) -> bool {
    let label = label.trim();
    !label.is_empty() && !label.contains('\t')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    #[test]
    fn test_parse_documents() {
        let text = "# corpus header\n東\tB-LOC\n京\tI-LOC\nへ\tO\n\n\n山\tB-PSN\n田\tI-PSN\n";
        let corpus = parse_corpus(Cursor::new(text)).unwrap();

        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.documents[0], vec!["東", "京", "へ"]);
        assert_eq!(corpus.labels[0], vec!["B-LOC", "I-LOC", "O"]);
        assert_eq!(corpus.documents[1], vec!["山", "田"]);
        assert_eq!(corpus.labels[1], vec!["B-PSN", "I-PSN"]);
    }

    #[test]
    fn test_last_document_without_blank_line() {
        let corpus = parse_corpus(Cursor::new("a\tO\r\nb\tO")).unwrap();
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.labels[0], vec!["O", "O"]);
    }

    #[test]
    fn test_hash_character_is_data() {
        let corpus = parse_corpus(Cursor::new("#\tO\nx\tO\n")).unwrap();
        assert_eq!(corpus.documents[0], vec!["#", "x"]);
    }

    #[test]
    fn test_trailing_whitespace_rows_dropped() {
        let text = "東\tB-LOC\n\u{3000}\tO\n京\tI-LOC\n\u{3000}\tO\n \tO\n\n\u{3000}\tO\n";
        let corpus = parse_corpus(Cursor::new(text)).unwrap();

        // inner whitespace stays, a whitespace-only document vanishes
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.documents[0], vec!["東", "\u{3000}", "京"]);
        assert_eq!(corpus.labels[0], vec!["B-LOC", "O", "I-LOC"]);
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let err = parse_corpus(Cursor::new("a\tO\nbroken\n")).unwrap_err();
        assert!(err.to_string().contains("line 2"));

        let err = parse_corpus(Cursor::new("a\t\n")).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_load_corpus_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "大\tB-LOC\n阪\tI-LOC").unwrap();

        let corpus = load_corpus(file.path()).unwrap();
        assert_eq!(corpus.documents, vec![vec!["大".to_string(), "阪".to_string()]]);
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_corpus(Cursor::new("")).unwrap().is_empty());
    }
}
