//! Recognition dictionary
//!
//! Ordered symbol table used by the CTC decoders. Index 0 is the CTC blank and
//! is never emitted. Dictionary files carry the blank as their first line;
//! symbol lists built in code get the blank inserted by [`Dictionary::from_symbols`].

use std::path::Path;

use log::{debug, warn};

use crate::error::{OcrError, OcrResult};

/// Symbol table with the CTC blank at index 0
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dictionary {
    symbols: Vec<String>,
}

impl Dictionary {
    /// Load a newline-delimited dictionary file
    ///
    /// # Parameters
    /// - `path`: Dictionary file path (one symbol per line, blank first)
    pub fn load(path: impl AsRef<Path>) -> OcrResult<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            OcrError::CharsetError(format!(
                "Failed to read dictionary {}: {}",
                path.display(),
                e
            ))
        })?;
        let dict = Self::from_bytes(&data)?;
        debug!("Loaded {} dictionary entries from {}", dict.len(), path.display());
        Ok(dict)
    }

    /// Parse dictionary bytes (UTF-8, one symbol per line, blank first)
    pub fn from_bytes(data: &[u8]) -> OcrResult<Self> {
        let content = std::str::from_utf8(data)
            .map_err(|e| OcrError::CharsetError(format!("UTF-8 decode error: {}", e)))?;
        Self::parse(content)
    }

    /// Parse dictionary text
    ///
    /// Every line is one entry, line 0 being the blank. A trailing `\r` is
    /// stripped from each line; a final newline does not add an entry.
    pub fn parse(content: &str) -> OcrResult<Self> {
        let symbols: Vec<String> = content
            .lines()
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect();

        if symbols.is_empty() {
            return Err(OcrError::CharsetError("Dictionary is empty".to_string()));
        }

        let first = &symbols[0];
        let mut chars = first.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if c.is_alphanumeric() {
                warn!(
                    "Dictionary line 0 is '{}', which is treated as the CTC blank and never emitted",
                    first
                );
            }
        }

        Ok(Self { symbols })
    }

    /// Build a dictionary from symbols that do not include the blank
    ///
    /// The blank is inserted at index 0, so `symbols[i]` ends up at index `i + 1`.
    pub fn from_symbols<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let symbols = std::iter::once(String::new())
            .chain(symbols.into_iter().map(Into::into))
            .collect();
        Self { symbols }
    }

    /// Entry at `index`, including the blank at 0
    pub fn get(&self, index: usize) -> Option<&str> {
        self.symbols.get(index).map(String::as_str)
    }

    /// Number of entries, including the blank
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// All entries, including the blank
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }
}
