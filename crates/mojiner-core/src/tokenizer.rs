//! # Morphological Analyzer Adapter
//!
//! Splits raw Japanese text into surface words with part-of-speech tags.
//! The preprocessors only depend on the [`Analyzer`] trait; the concrete
//! analyzer is chosen when the pipeline is built.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tracing::info;
use vibrato::{Dictionary, Tokenizer};

use crate::error::{MojinerError, Result};
use crate::features::chars::CharType;

/// A surface word produced by an analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Morpheme {
    /// The surface form, exactly as it appears in the analyzed text
    pub surface: String,
    /// Composite part-of-speech tag
    pub pos: String,
}

impl Morpheme {
    /// Create a morpheme from a surface form and a POS tag.
    pub fn new(surface: impl Into<String>, pos: impl Into<String>) -> Self {
        Self {
            surface: surface.into(),
            pos: pos.into(),
        }
    }
}

/// Segments text into morphemes.
///
/// Implementations must cover the whole input: concatenating the surfaces of
/// the returned morphemes yields the input text again.
pub trait Analyzer {
    /// Analyze `text` into an ordered sequence of morphemes.
    fn analyze(&self, text: &str) -> Result<Vec<Morpheme>>;
}

/// Number of feature hierarchy levels folded into a POS tag.
const POS_DEPTH: usize = 3;

/// Build a composite POS tag from a MeCab-style feature string.
///
/// # Examples
/// ```
/// use mojiner_core::tokenizer::pos_tag;
///
/// assert_eq!(pos_tag("名詞,固有名詞,地域,一般,*,*,東京"), "名詞-固有名詞-地域");
/// assert_eq!(pos_tag("記号"), "記号");
/// ```
pub fn pos_tag(feature: &str) -> String {
    feature
        .split(',')
        .take(POS_DEPTH)
        .collect::<Vec<_>>()
        .join("-")
}

/// MeCab-compatible analyzer backed by a vibrato system dictionary.
pub struct VibratoAnalyzer {
    tokenizer: Tokenizer,
}

impl VibratoAnalyzer {
    /// Load a compiled (uncompressed) vibrato dictionary.
    ///
    /// # Errors
    ///
    /// Returns `MojinerError::AnalyzerInit` if the dictionary file is missing
    /// or cannot be decoded. No pipeline can run without it, so callers
    /// should treat this as fatal.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            MojinerError::AnalyzerInit(format!("cannot open {}: {}", path.display(), e))
        })?;
        let dict = Dictionary::read(BufReader::new(file)).map_err(|e| {
            MojinerError::AnalyzerInit(format!("cannot read {}: {}", path.display(), e))
        })?;

        info!(dictionary = %path.display(), "loaded analyzer dictionary");
        Ok(Self {
            tokenizer: Tokenizer::new(dict),
        })
    }
}

impl Analyzer for VibratoAnalyzer {
    fn analyze(&self, text: &str) -> Result<Vec<Morpheme>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let mut worker = self.tokenizer.new_worker();
        worker.reset_sentence(text);
        worker.tokenize();

        let morphemes = (0..worker.num_tokens())
            .map(|i| {
                let token = worker.token(i);
                Morpheme::new(token.surface(), pos_tag(token.feature()))
            })
            .collect();
        Ok(morphemes)
    }
}

/// Dictionary-free analyzer that groups maximal runs of one character type.
///
/// Each run becomes a word whose POS tag is the name of its character type,
/// so `"東京タワー2つ"` splits into `東京`, `タワー`, `2`, `つ`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptRunAnalyzer;

impl ScriptRunAnalyzer {
    /// Create a new script-run analyzer.
    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for ScriptRunAnalyzer {
    fn analyze(&self, text: &str) -> Result<Vec<Morpheme>> {
        let mut morphemes = Vec::new();
        let mut run_start = 0;
        let mut run_type: Option<CharType> = None;

        for (idx, c) in text.char_indices() {
            let char_type = CharType::of(c);
            match run_type {
                Some(current) if current == char_type => {}
                Some(current) => {
                    morphemes.push(Morpheme::new(&text[run_start..idx], current.name()));
                    run_start = idx;
                    run_type = Some(char_type);
                }
                None => run_type = Some(char_type),
            }
        }

        if let Some(current) = run_type {
            morphemes.push(Morpheme::new(&text[run_start..], current.name()));
        }

        Ok(morphemes)
    }
}
