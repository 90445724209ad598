//! String ↔ id vocabularies for words, characters and tags.
//!
//! The model only ever sees integer ids; these tables are the boundary where
//! raw text is mapped in and predictions are mapped back out.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{KotobaError, Result};

/// Fallback token for words never seen at training time.
pub const UNK_WORD: &str = "<unk>";

/// One direction-indexed string table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Index {
    items: Vec<String>,
    ids: HashMap<String, u32>,
}

impl Index {
    fn intern(&mut self, item: &str) -> u32 {
        if let Some(&id) = self.ids.get(item) {
            return id;
        }
        let id = self.items.len() as u32;
        self.items.push(item.to_string());
        self.ids.insert(item.to_string(), id);
        id
    }

    fn id(&self, item: &str) -> Option<u32> {
        self.ids.get(item).copied()
    }

    fn item(&self, id: u32) -> Option<&str> {
        self.items.get(id as usize).map(String::as_str)
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Word, character and tag vocabularies built from a training corpus.
///
/// Unknown *words* at inference time map to [`UNK_WORD`]; unknown characters
/// or tags are data-contract errors and fail fast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vocabulary {
    words: Index,
    chars: Index,
    tags: Index,
}

impl Vocabulary {
    /// Create an empty vocabulary with the unknown-word entry reserved.
    pub fn new() -> Self {
        let mut words = Index::default();
        words.intern(UNK_WORD);
        Self {
            words,
            chars: Index::default(),
            tags: Index::default(),
        }
    }

    /// Intern a word, returning its id.
    pub fn add_word(&mut self, word: &str) -> u32 {
        self.words.intern(word)
    }

    /// Intern a character, returning its id.
    pub fn add_char(&mut self, ch: char) -> u32 {
        let mut buf = [0u8; 4];
        self.chars.intern(ch.encode_utf8(&mut buf))
    }

    /// Intern a tag, returning its id.
    pub fn add_tag(&mut self, tag: &str) -> u32 {
        self.tags.intern(tag)
    }

    /// Id of a word, falling back to the unknown-word id.
    pub fn word_id(&self, word: &str) -> u32 {
        self.words
            .id(word)
            .or_else(|| self.words.id(UNK_WORD))
            .unwrap_or(0)
    }

    /// Id of a character. Unknown characters are an encoding error.
    pub fn char_id(&self, ch: char) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.chars
            .id(ch.encode_utf8(&mut buf))
            .ok_or_else(|| KotobaError::UnknownItem {
                kind: "char",
                item: ch.to_string(),
            })
    }

    /// Id of a tag. Unknown tags are a data error.
    pub fn tag_id(&self, tag: &str) -> Result<u32> {
        self.tags.id(tag).ok_or_else(|| KotobaError::UnknownItem {
            kind: "tag",
            item: tag.to_string(),
        })
    }

    /// Inverse lookup of a word id.
    pub fn word(&self, id: u32) -> Result<&str> {
        self.words.item(id).ok_or(KotobaError::OutOfVocab {
            kind: "word",
            id,
            size: self.words.len(),
        })
    }

    /// Inverse lookup of a tag id.
    pub fn tag(&self, id: u32) -> Result<&str> {
        self.tags.item(id).ok_or(KotobaError::OutOfVocab {
            kind: "tag",
            id,
            size: self.tags.len(),
        })
    }

    /// Number of distinct words (including [`UNK_WORD`]).
    pub fn num_words(&self) -> usize {
        self.words.len()
    }

    /// Number of distinct characters.
    pub fn num_chars(&self) -> usize {
        self.chars.len()
    }

    /// Number of distinct tags.
    pub fn num_tags(&self) -> usize {
        self.tags.len()
    }

    /// Persist the vocabulary as JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    /// Restore a vocabulary saved with [`Vocabulary::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new()
    }
}
