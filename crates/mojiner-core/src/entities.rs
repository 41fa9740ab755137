//! # Entity Chunks
//!
//! Recovers entity spans from per-character label strings. Understands the
//! BIO and BIOES families: `B-`, `I-`, `E-` and `S-` prefixes followed by an
//! entity type. `O` and reserved sentinels such as `<PAD>` are outside
//! labels; a bare label without prefix is treated as inside its own type.

use std::fmt;

/// An extracted entity spanning `start..end` character positions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entity {
    pub entity_type: String,
    pub start: usize,
    pub end: usize,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}..{})", self.entity_type, self.start, self.end)
    }
}

/// Chunk position prefix of a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prefix {
    Begin,
    Inside,
    End,
    Single,
    Outside,
}

fn split_label(label: &str) -> (Prefix, &str) {
    if label == "O" || label.starts_with('<') {
        return (Prefix::Outside, "");
    }
    match label.split_once('-') {
        Some(("B", ty)) => (Prefix::Begin, ty),
        Some(("I", ty)) => (Prefix::Inside, ty),
        Some(("E", ty)) => (Prefix::End, ty),
        Some(("S", ty)) => (Prefix::Single, ty),
        _ => (Prefix::Inside, label),
    }
}

fn ends_chunk(prev: (Prefix, &str), curr: (Prefix, &str)) -> bool {
    match (prev.0, curr.0) {
        (Prefix::Outside, _) => false,
        (Prefix::End | Prefix::Single, _) => true,
        (_, Prefix::Begin | Prefix::Single | Prefix::Outside) => true,
        _ => prev.1 != curr.1,
    }
}

fn starts_chunk(prev: (Prefix, &str), curr: (Prefix, &str)) -> bool {
    match (prev.0, curr.0) {
        (_, Prefix::Outside) => false,
        (_, Prefix::Begin | Prefix::Single) => true,
        (Prefix::Outside | Prefix::End | Prefix::Single, _) => true,
        _ => prev.1 != curr.1,
    }
}

/// Extract entity chunks from a label sequence.
///
/// # Examples
/// ```
/// use mojiner_core::entities::get_entities;
///
/// let entities = get_entities(&["B-LOC", "I-LOC", "O", "S-PSN"]);
/// assert_eq!(entities.len(), 2);
/// assert_eq!(entities[0].entity_type, "LOC");
/// assert_eq!((entities[0].start, entities[0].end), (0, 2));
/// ```
pub fn get_entities<S: AsRef<str>>(labels: &[S]) -> Vec<Entity> {
    let mut entities = Vec::new();
    let mut prev = (Prefix::Outside, "");
    let mut chunk_start = 0;

    let sentinel = (Prefix::Outside, "");
    let parsed = labels
        .iter()
        .map(|l| split_label(l.as_ref()))
        .chain(std::iter::once(sentinel));

    for (pos, curr) in parsed.enumerate() {
        if ends_chunk(prev, curr) {
            entities.push(Entity {
                entity_type: prev.1.to_string(),
                start: chunk_start,
                end: pos,
            });
        }
        if starts_chunk(prev, curr) {
            chunk_start = pos;
        }
        prev = curr;
    }

    entities
}
