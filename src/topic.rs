//! Topic filter / routing key parsing and word-sequence representation.

use std::fmt;

use crate::error::RouterError;

/// A single path segment of a filter or routing key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Word {
    Literal(Box<str>),
    /// `+` — matches exactly one level.
    Plus,
    /// `#` — matches the remainder, only legal as the last word of a filter.
    Hash,
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Word::Literal(s) => write!(f, "{s}"),
            Word::Plus => write!(f, "+"),
            Word::Hash => write!(f, "#"),
        }
    }
}

fn split_words(raw: &str) -> Vec<&str> {
    raw.split('/').collect()
}

/// A parsed, validated subscription filter.
///
/// Equality/hashing/ordering are derived from the original string so that
/// filters behave correctly as bag keys.
#[derive(Debug, Clone)]
pub struct Filter {
    raw: String,
    words: Vec<Word>,
}

impl Filter {
    /// Parses and validates a filter string. `#` is only legal as the final
    /// word; any other placement is rejected.
    pub fn parse(raw: &str) -> Result<Filter, RouterError> {
        let parts = split_words(raw);
        let mut words = Vec::with_capacity(parts.len());
        for (idx, part) in parts.iter().enumerate() {
            let word = match *part {
                "+" => Word::Plus,
                "#" => {
                    if idx != parts.len() - 1 {
                        return Err(RouterError::InvalidFilter(raw.to_owned()));
                    }
                    Word::Hash
                }
                other => Word::Literal(other.into()),
            };
            words.push(word);
        }
        Ok(Filter {
            raw: raw.to_owned(),
            words,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}
impl Eq for Filter {}

impl std::hash::Hash for Filter {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state)
    }
}

impl PartialOrd for Filter {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Filter {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// A concrete publication topic: no wildcard words permitted.
#[derive(Debug, Clone)]
pub struct RoutingKey {
    raw: String,
    words: Vec<Box<str>>,
}

impl RoutingKey {
    pub fn parse(raw: &str) -> Result<RoutingKey, RouterError> {
        if raw.contains('+') || raw.contains('#') {
            return Err(RouterError::InvalidRoutingKey(raw.to_owned()));
        }
        let words = split_words(raw).into_iter().map(Box::from).collect();
        Ok(RoutingKey {
            raw: raw.to_owned(),
            words,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn words(&self) -> &[Box<str>] {
        &self.words
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}
