//! # Vocabularies
//!
//! Insertion-ordered string-to-ID dictionaries with reserved sentinels.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::MojinerError;

/// Padding sentinel, always ID 0.
pub const PAD: &str = "<PAD>";
/// Unknown-item sentinel, ID 1 in vocabularies that reserve it.
pub const UNK: &str = "<UNK>";

pub const PAD_ID: u32 = 0;
pub const UNK_ID: u32 = 1;

/// Injective mapping from tokens to contiguous IDs starting at 0.
///
/// IDs follow first-insertion order and entries are never removed.
/// Serializes as the ID-ordered token list; the lookup index is rebuilt
/// when deserializing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Vocabulary {
    tokens: Vec<String>,
    index: HashMap<String, u32>,
}

impl Vocabulary {
    /// Vocabulary holding only the padding sentinel.
    pub fn with_padding() -> Self {
        let mut vocab = Self {
            tokens: Vec::new(),
            index: HashMap::new(),
        };
        vocab.insert(PAD);
        vocab
    }

    /// Vocabulary holding the padding and unknown sentinels.
    pub fn with_unknown() -> Self {
        let mut vocab = Self::with_padding();
        vocab.insert(UNK);
        vocab
    }

    /// Register `token` if unseen and return its ID.
    pub fn insert(&mut self, token: &str) -> u32 {
        if let Some(&id) = self.index.get(token) {
            return id;
        }
        let id = self.tokens.len() as u32;
        self.tokens.push(token.to_owned());
        self.index.insert(token.to_owned(), id);
        id
    }

    /// Look up the ID of `token`.
    pub fn get(&self, token: &str) -> Option<u32> {
        self.index.get(token).copied()
    }

    /// Look up the ID of `token`, falling back to the unknown sentinel.
    pub fn get_or_unk(&self, token: &str) -> u32 {
        self.get(token).unwrap_or(UNK_ID)
    }

    /// Whether `token` has been registered.
    pub fn contains(&self, token: &str) -> bool {
        self.index.contains_key(token)
    }

    /// The token registered under `id`.
    pub fn token(&self, id: u32) -> Option<&str> {
        self.tokens.get(id as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Tokens in ID order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.tokens
            .iter()
            .enumerate()
            .map(|(id, token)| (id as u32, token.as_str()))
    }
}

impl TryFrom<Vec<String>> for Vocabulary {
    type Error = MojinerError;

    fn try_from(tokens: Vec<String>) -> Result<Self, Self::Error> {
        let mut index = HashMap::with_capacity(tokens.len());
        for (id, token) in tokens.iter().enumerate() {
            if index.insert(token.clone(), id as u32).is_some() {
                return Err(MojinerError::DuplicateToken(token.clone()));
            }
        }
        Ok(Self { tokens, index })
    }
}

impl From<Vocabulary> for Vec<String> {
    fn from(vocab: Vocabulary) -> Self {
        vocab.tokens
    }
}
