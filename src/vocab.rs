use std::path::Path;

use crate::error::OcrError;

const ALPHANUMERIC: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Index-stable symbol table for the recognizer's output classes.
///
/// Class `i < len()` maps to `self[i]`; every class at or past `len()` is the
/// blank/padding token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    symbols: Box<[String]>,
}

impl Vocabulary {
    pub fn new(symbols: impl IntoIterator<Item = impl Into<String>>) -> Result<Self, OcrError> {
        let symbols = symbols.into_iter().map(Into::into).collect::<Box<[String]>>();
        if symbols.is_empty() {
            return Err(OcrError::InvalidVocabulary("no symbols".into()));
        }
        if let Some(i) = symbols.iter().position(String::is_empty) {
            return Err(OcrError::InvalidVocabulary(format!("symbol {i} is empty")));
        }
        Ok(Self { symbols })
    }

    /// One symbol per character.
    pub fn from_chars(chars: &str) -> Result<Self, OcrError> {
        Self::new(chars.chars().map(String::from))
    }

    /// One symbol per line.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, OcrError> {
        let keys = std::fs::read_to_string(path.as_ref())?;
        let vocab = Self::new(keys.lines())?;
        log::debug!("Loaded {} symbols from {:?}", vocab.len(), path.as_ref());
        Ok(vocab)
    }

    /// Digits followed by upper- and lowercase ASCII letters.
    pub fn alphanumeric() -> Self {
        Self {
            symbols: ALPHANUMERIC.chars().map(String::from).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.symbols.get(index).map(String::as_str)
    }

    /// Class count a matching recognizer emits: every symbol plus one blank.
    pub fn num_classes(&self) -> usize {
        self.len() + 1
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::alphanumeric()
    }
}
