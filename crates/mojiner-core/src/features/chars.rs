//! # Character-Level Features
//!
//! Fixed, vocabulary-independent per-character features: the character type
//! code, the BIES word-position tag and digit normalization.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

/// Reserved padding code shared by all fixed feature enumerations.
pub const PAD_CODE: u32 = 0;

/// Coarse character classification used as an auxiliary model feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CharType {
    /// Whitespace (e.g. ' ', '\t', U+3000)
    Whitespace = 1,
    /// Decimal digit, ASCII or full-width (e.g. 0, ９)
    Digit = 2,
    /// Lowercase letter (e.g. a, ｂ)
    Lowercase = 3,
    /// Uppercase letter (e.g. A, Ｂ)
    Uppercase = 4,
    /// Hiragana (U+3040..=U+309F)
    Hiragana = 5,
    /// Katakana (U+30A0..=U+30FF)
    Katakana = 6,
    /// Anything else, including kanji and punctuation
    Other = 7,
}

impl CharType {
    /// Number of codes including the padding code.
    pub const NUM_CODES: usize = 8;

    /// Classify a character.
    ///
    /// Classes are tested in a fixed priority order: whitespace, digit,
    /// lowercase, uppercase, hiragana, katakana, other.
    pub fn of(c: char) -> Self {
        if c.is_whitespace() {
            Self::Whitespace
        } else if is_decimal_digit(c) {
            Self::Digit
        } else if c.is_lowercase() {
            Self::Lowercase
        } else if c.is_uppercase() {
            Self::Uppercase
        } else if is_hiragana(c) {
            Self::Hiragana
        } else if is_katakana(c) {
            Self::Katakana
        } else {
            Self::Other
        }
    }

    /// Integer code fed to the model.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Lowercase name of the class.
    pub fn name(self) -> &'static str {
        match self {
            Self::Whitespace => "whitespace",
            Self::Digit => "digit",
            Self::Lowercase => "lowercase",
            Self::Uppercase => "uppercase",
            Self::Hiragana => "hiragana",
            Self::Katakana => "katakana",
            Self::Other => "other",
        }
    }
}

fn is_decimal_digit(c: char) -> bool {
    c.is_ascii_digit() || ('\u{FF10}'..='\u{FF19}').contains(&c)
}

fn is_hiragana(c: char) -> bool {
    ('\u{3040}'..='\u{309F}').contains(&c)
}

fn is_katakana(c: char) -> bool {
    ('\u{30A0}'..='\u{30FF}').contains(&c)
}

/// Position of a character inside its word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BiesTag {
    Begin = 1,
    Inside = 2,
    End = 3,
    Single = 4,
}

impl BiesTag {
    /// Number of codes including the padding code.
    pub const NUM_CODES: usize = 5;

    /// Tag for the character at `index` of a word spanning `len` characters.
    pub fn at(index: usize, len: usize) -> Self {
        if len == 1 {
            Self::Single
        } else if index == 0 {
            Self::Begin
        } else if index + 1 == len {
            Self::End
        } else {
            Self::Inside
        }
    }

    /// Tags for every character of `word`.
    pub fn for_word(word: &str) -> Vec<Self> {
        let len = word.chars().count();
        (0..len).map(|i| Self::at(i, len)).collect()
    }

    /// Integer code fed to the model.
    pub fn code(self) -> u32 {
        self as u32
    }
}

static DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[0-9０-９]").expect("digit pattern is valid"));

/// Replace every ASCII and full-width decimal digit with `'0'`.
///
/// # Examples
/// ```
/// use mojiner_core::features::normalize_number;
///
/// assert_eq!(normalize_number("令和５年の10月"), "令和0年の00月");
/// ```
pub fn normalize_number(text: &str) -> Cow<'_, str> {
    DIGITS.replace_all(text, "0")
}
