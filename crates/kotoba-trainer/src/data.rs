//! Corpus loading and vocabulary building.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use kotoba_core::Vocabulary;

/// A raw training sentence: parallel token and tag strings.
#[derive(Debug, Clone)]
pub struct RawSentence {
    pub tokens: Vec<String>,
    pub tags: Vec<String>,
}

/// Load a `token tag` corpus.
///
/// One whitespace-separated `token tag` pair per line, blank line between
/// sentences, `#` lines skipped. A line with the wrong number of fields is a
/// data error, not something to skip silently.
pub fn load_corpus<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<RawSentence>> {
    let file = File::open(path.as_ref())
        .map_err(|e| anyhow::anyhow!("cannot open corpus {}: {e}", path.as_ref().display()))?;
    parse_corpus(BufReader::new(file))
}

fn parse_corpus<R: BufRead>(reader: R) -> anyhow::Result<Vec<RawSentence>> {
    let mut sentences = Vec::new();
    let mut tokens = Vec::new();
    let mut tags = Vec::new();

    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();

        if line.is_empty() {
            if !tokens.is_empty() {
                sentences.push(RawSentence {
                    tokens: std::mem::take(&mut tokens),
                    tags: std::mem::take(&mut tags),
                });
            }
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(token), Some(tag), None) => {
                tokens.push(token.to_string());
                tags.push(tag.to_string());
            }
            _ => anyhow::bail!("malformed corpus line {}: {:?}", number + 1, line),
        }
    }

    // Don't forget the last sentence
    if !tokens.is_empty() {
        sentences.push(RawSentence { tokens, tags });
    }

    Ok(sentences)
}

/// Build the word/char/tag vocabularies from a training corpus.
pub fn build_vocabulary(corpus: &[RawSentence]) -> Vocabulary {
    let mut vocab = Vocabulary::new();
    for sentence in corpus {
        for token in &sentence.tokens {
            vocab.add_word(token);
            for ch in token.chars() {
                vocab.add_char(ch);
            }
        }
        for tag in &sentence.tags {
            vocab.add_tag(tag);
        }
    }
    vocab
}
