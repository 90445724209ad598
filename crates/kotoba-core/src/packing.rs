//! Flat-buffer packing for variable-length sequences.
//!
//! Sentences in a batch (and characters in a word) have different lengths.
//! Instead of padding, everything is concatenated into one flat buffer along
//! with an explicit length table; these helpers split the buffer back at the
//! recorded boundaries. The same scheme is used at both granularities:
//! characters within a word and tokens within a sentence.

use candle_core::Tensor;

use crate::error::{KotobaError, Result};

/// Cumulative end offsets of a length table.
///
/// `offsets(&[1, 3, 2]) == [1, 4, 6]`: block `i` spans
/// `offsets[i-1]..offsets[i]` of the flat buffer (with `offsets[-1]` read
/// as 0).
pub fn offsets(lens: &[usize]) -> Vec<usize> {
    let mut acc = 0;
    lens.iter()
        .map(|len| {
            acc += len;
            acc
        })
        .collect()
}

/// Split a `(total, dim)` tensor into per-sequence `(len_i, dim)` blocks.
///
/// The length table must account for every row of the flat buffer; anything
/// else indicates the buffer and the table were built from different inputs.
pub fn split_rows(flat: &Tensor, lens: &[usize]) -> Result<Vec<Tensor>> {
    let ends = offsets(lens);
    let total = ends.last().copied().unwrap_or(0);
    let rows = flat.dim(0)?;
    if total != rows {
        return Err(KotobaError::LengthMismatch {
            expected: rows,
            got: total,
        });
    }
    let mut blocks = Vec::with_capacity(lens.len());
    let mut start = 0;
    for &end in &ends {
        blocks.push(flat.narrow(0, start, end - start)?);
        start = end;
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn offsets_accumulate() {
        assert_eq!(offsets(&[1, 3, 2]), vec![1, 4, 6]);
        assert_eq!(offsets(&[]), Vec::<usize>::new());
        assert_eq!(offsets(&[5]), vec![5]);
    }

    #[test]
    fn split_recovers_concatenated_blocks() {
        let device = Device::Cpu;
        // Three "words" with 1, 3 and 2 "characters", 2 features each.
        let blocks = [
            Tensor::from_vec(vec![0.0f32, 1.0], (1, 2), &device).unwrap(),
            Tensor::from_vec(vec![2.0f32, 3.0, 4.0, 5.0, 6.0, 7.0], (3, 2), &device).unwrap(),
            Tensor::from_vec(vec![8.0f32, 9.0, 10.0, 11.0], (2, 2), &device).unwrap(),
        ];
        let flat = Tensor::cat(&[&blocks[0], &blocks[1], &blocks[2]], 0).unwrap();

        let split = split_rows(&flat, &[1, 3, 2]).unwrap();
        assert_eq!(split.len(), 3);
        for (original, recovered) in blocks.iter().zip(&split) {
            assert_eq!(
                original.to_vec2::<f32>().unwrap(),
                recovered.to_vec2::<f32>().unwrap()
            );
        }
    }

    #[test]
    fn split_rejects_inconsistent_lengths() {
        let device = Device::Cpu;
        let flat = Tensor::zeros((6, 2), candle_core::DType::F32, &device).unwrap();
        let err = split_rows(&flat, &[1, 3]).unwrap_err();
        assert!(matches!(err, KotobaError::LengthMismatch { expected: 6, got: 4 }));
    }
}
