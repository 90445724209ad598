//! Character-level word encoder.

use candle_core::{Device, Module, Tensor};
use candle_nn::{embedding, Embedding, VarBuilder};

use crate::error::{KotobaError, Result};
use crate::model::bilstm::BiLstm;
use crate::packing;

/// Encodes each word of a batch into one fixed-size vector from its
/// characters.
///
/// All character ids of the batch are embedded in a single lookup over the
/// flattened concatenation, split back at the recorded word boundaries, and
/// each word then gets its own bidirectional recurrent pass. The word vector
/// is the concatenation of the final forward and backward hidden states.
pub struct CharEncoder {
    embed: Embedding,
    bilstm: BiLstm,
    num_chars: usize,
    device: Device,
}

impl CharEncoder {
    pub fn new(
        num_chars: usize,
        char_dim: usize,
        hidden_dim: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let device = vb.device().clone();
        let embed = embedding(num_chars, char_dim, vb.pp("embed"))?;
        let bilstm = BiLstm::new(char_dim, hidden_dim, vb.pp("bilstm"))?;
        Ok(Self {
            embed,
            bilstm,
            num_chars,
            device,
        })
    }

    /// Output width: `2 * hidden_dim`.
    pub fn output_dim(&self) -> usize {
        2 * self.bilstm.hidden_dim()
    }

    /// One vector per word: `(num_words, 2 * hidden_dim)`.
    ///
    /// `words` holds the character-id sequence of every word in the batch,
    /// flattened across sentences in order. Every word must have at least one
    /// character, and every id must be inside the character vocabulary.
    pub fn forward(&self, words: &[Vec<u32>]) -> Result<Tensor> {
        for (index, word) in words.iter().enumerate() {
            if word.is_empty() {
                return Err(KotobaError::EmptyWord { index });
            }
            for &id in word {
                if id as usize >= self.num_chars {
                    return Err(KotobaError::OutOfVocab {
                        kind: "char",
                        id,
                        size: self.num_chars,
                    });
                }
            }
        }
        if words.is_empty() {
            return Err(KotobaError::EmptySequence);
        }

        let lens: Vec<usize> = words.iter().map(Vec::len).collect();
        let flat: Vec<u32> = words.iter().flatten().copied().collect();
        let total = flat.len();

        let ids = Tensor::from_vec(flat, total, &self.device)?;
        let embedded = self.embed.forward(&ids)?;

        let mut vectors = Vec::with_capacity(words.len());
        for block in packing::split_rows(&embedded, &lens)? {
            let h = self.bilstm.final_hidden(&block.unsqueeze(0)?)?;
            vectors.push(h.squeeze(0)?);
        }
        Ok(Tensor::stack(&vectors, 0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::{VarBuilder, VarMap};

    fn build(num_chars: usize, char_dim: usize, hidden_dim: usize) -> CharEncoder {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        CharEncoder::new(num_chars, char_dim, hidden_dim, vb).unwrap()
    }

    #[test]
    fn one_vector_per_word() {
        let encoder = build(10, 4, 3);
        // Words with 1, 3 and 2 characters, as in the packing round-trip.
        let words = vec![vec![0], vec![1, 2, 3], vec![4, 5]];
        let out = encoder.forward(&words).unwrap();
        assert_eq!(out.dims2().unwrap(), (3, 6));
    }

    #[test]
    fn single_char_word_is_valid() {
        let encoder = build(10, 4, 3);
        let out = encoder.forward(&[vec![7]]).unwrap();
        assert_eq!(out.dims2().unwrap(), (1, 6));
    }

    #[test]
    fn empty_word_fails_fast() {
        let encoder = build(10, 4, 3);
        let err = encoder.forward(&[vec![1], vec![]]).unwrap_err();
        assert!(matches!(err, KotobaError::EmptyWord { index: 1 }));
    }

    #[test]
    fn out_of_range_char_id_fails_fast() {
        let encoder = build(10, 4, 3);
        let err = encoder.forward(&[vec![1, 10]]).unwrap_err();
        assert!(matches!(
            err,
            KotobaError::OutOfVocab { kind: "char", id: 10, size: 10 }
        ));
    }

    #[test]
    fn word_vectors_are_independent_of_batch_company() {
        // Packing words together must not leak across word boundaries: a
        // word's vector is the same alone and inside a larger batch.
        let encoder = build(10, 4, 3);
        let alone = encoder.forward(&[vec![1, 2, 3]]).unwrap();
        let batched = encoder
            .forward(&[vec![5], vec![1, 2, 3], vec![6, 7]])
            .unwrap();
        let alone = alone.to_vec2::<f32>().unwrap();
        let batched = batched.to_vec2::<f32>().unwrap();
        for (a, b) in alone[0].iter().zip(&batched[1]) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
