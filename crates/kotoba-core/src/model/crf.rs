//! Linear-chain conditional random field.
//!
//! Scores a tag path as the sum, over positions, of the emission score of the
//! chosen tag plus the transition score between adjacent tags. Training uses
//! the forward algorithm for the log-partition function; inference uses
//! Viterbi decoding. Both are the same dynamic-programming recurrence with a
//! different reduction over the previous tag, so they cannot drift apart.

use candle_core::{IndexOp, Tensor};
use candle_nn::VarBuilder;

use crate::error::{KotobaError, Result};

/// Linear-chain CRF over a fixed tag vocabulary.
///
/// Owns the learned `(num_tags, num_tags)` transition matrix;
/// `transitions[i][j]` scores tag `i` followed by tag `j` at any adjacent
/// pair of positions (the chain is homogeneous). The first position of a
/// sentence is scored by its emission alone.
pub struct Crf {
    num_tags: usize,
    transitions: Tensor,
}

impl Crf {
    pub fn new(num_tags: usize, vb: VarBuilder) -> Result<Self> {
        if num_tags == 0 {
            return Err(KotobaError::Config("num_tags must be non-zero".into()));
        }
        let transitions = vb.get_with_hints(
            (num_tags, num_tags),
            "transitions",
            candle_nn::Init::Uniform { lo: -0.1, up: 0.1 },
        )?;
        Ok(Self {
            num_tags,
            transitions,
        })
    }

    pub fn num_tags(&self) -> usize {
        self.num_tags
    }

    /// Negative log-likelihood of the gold paths, mean-reduced over the batch.
    ///
    /// Mean (not sum) reduction keeps the loss scale independent of batch
    /// size, so the learning rate does not interact with batching. Each
    /// sentence contributes `log Z − score(gold)`, which is non-negative
    /// because the gold path is one of the paths summed into `Z`.
    pub fn nll(&self, emissions: &[Tensor], tags: &[Vec<u32>]) -> Result<Tensor> {
        if emissions.is_empty() {
            return Err(KotobaError::EmptySequence);
        }
        if emissions.len() != tags.len() {
            return Err(KotobaError::LengthMismatch {
                expected: emissions.len(),
                got: tags.len(),
            });
        }
        let mut losses = Vec::with_capacity(emissions.len());
        for (emission, path) in emissions.iter().zip(tags) {
            losses.push(self.sentence_nll(emission, path)?);
        }
        Ok(Tensor::stack(&losses, 0)?.mean_all()?)
    }

    /// Most probable tag path for one sentence's `(len, num_tags)` emissions.
    ///
    /// When several previous tags tie for the maximum, the lowest tag id
    /// wins (`argmax` keeps the first maximum), so degenerate inputs still
    /// decode reproducibly.
    pub fn decode(&self, emissions: &Tensor) -> Result<Vec<u32>> {
        self.validate(emissions)?;
        let (score, history) = self.recurrence(emissions, |next| {
            Ok((next.max(0)?, Some(next.argmax(0)?)))
        })?;

        let mut tag = score.argmax(0)?.to_scalar::<u32>()?;
        let mut path = vec![tag];
        for back in history.iter().rev() {
            tag = back.i(tag as usize)?.to_scalar::<u32>()?;
            path.push(tag);
        }
        path.reverse();
        Ok(path)
    }

    /// [`Crf::decode`] over a batch, preserving input order.
    pub fn decode_batch(&self, emissions: &[Tensor]) -> Result<Vec<Vec<u32>>> {
        emissions.iter().map(|e| self.decode(e)).collect()
    }

    /// `log Z − score(gold)` for one sentence.
    fn sentence_nll(&self, emissions: &Tensor, tags: &[u32]) -> Result<Tensor> {
        let len = self.validate(emissions)?;
        if tags.len() != len {
            return Err(KotobaError::LengthMismatch {
                expected: len,
                got: tags.len(),
            });
        }
        for &tag in tags {
            if tag as usize >= self.num_tags {
                return Err(KotobaError::OutOfVocab {
                    kind: "tag",
                    id: tag,
                    size: self.num_tags,
                });
            }
        }

        let gold = self.path_score(emissions, tags)?;
        let (score, _) = self.recurrence(emissions, |next| Ok((next.log_sum_exp(0)?, None)))?;
        let log_z = score.log_sum_exp(0)?;
        Ok((log_z - gold)?)
    }

    /// Score of one explicit path, kept as tensor ops so gradients flow into
    /// the emissions and the transition matrix.
    fn path_score(&self, emissions: &Tensor, tags: &[u32]) -> Result<Tensor> {
        let len = tags.len();
        let device = emissions.device();

        let idx = Tensor::from_vec(tags.to_vec(), (len, 1), device)?;
        let emit = emissions.gather(&idx, 1)?.sum_all()?;
        if len == 1 {
            return Ok(emit);
        }

        let prev = Tensor::from_vec(tags[..len - 1].to_vec(), len - 1, device)?;
        let next = Tensor::from_vec(tags[1..].to_vec(), (len - 1, 1), device)?;
        let trans = self
            .transitions
            .index_select(&prev, 0)?
            .gather(&next, 1)?
            .sum_all()?;
        Ok((emit + trans)?)
    }

    /// The shared chain recurrence.
    ///
    /// Maintains a `(num_tags,)` score vector; at each position the candidate
    /// matrix `next[i][j] = score[i] + transitions[i][j] + emission[t][j]` is
    /// reduced over the previous tag `i` by `reduce`, which may also emit a
    /// back-pointer row. `log_sum_exp` here yields the forward algorithm,
    /// `max`/`argmax` yields Viterbi. A length-1 sentence never enters the
    /// loop and takes no transition terms.
    fn recurrence<F>(&self, emissions: &Tensor, mut reduce: F) -> Result<(Tensor, Vec<Tensor>)>
    where
        F: FnMut(&Tensor) -> Result<(Tensor, Option<Tensor>)>,
    {
        let (len, _) = emissions.dims2()?;
        let mut score = emissions.i(0)?;
        let mut history = Vec::with_capacity(len.saturating_sub(1));
        for t in 1..len {
            let next = score
                .unsqueeze(1)?
                .broadcast_add(&self.transitions)?
                .broadcast_add(&emissions.i(t)?.unsqueeze(0)?)?;
            let (reduced, back) = reduce(&next)?;
            if let Some(back) = back {
                history.push(back);
            }
            score = reduced;
        }
        Ok((score, history))
    }

    fn validate(&self, emissions: &Tensor) -> Result<usize> {
        let (len, width) = emissions.dims2()?;
        if width != self.num_tags {
            return Err(KotobaError::LengthMismatch {
                expected: self.num_tags,
                got: width,
            });
        }
        if len == 0 {
            return Err(KotobaError::EmptySequence);
        }
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    const TOLERANCE: f64 = 1e-4;

    /// Build a CRF with a fixed transition matrix, bypassing random init.
    fn crf(transitions: Vec<f32>, num_tags: usize) -> Crf {
        let transitions =
            Tensor::from_vec(transitions, (num_tags, num_tags), &Device::Cpu).unwrap();
        Crf {
            num_tags,
            transitions,
        }
    }

    fn emissions(rows: Vec<f32>, len: usize, num_tags: usize) -> Tensor {
        Tensor::from_vec(rows, (len, num_tags), &Device::Cpu).unwrap()
    }

    /// Score of one explicit path, computed scalar-by-scalar.
    fn manual_score(emissions: &[Vec<f32>], transitions: &[Vec<f32>], path: &[usize]) -> f64 {
        let mut score = emissions[0][path[0]] as f64;
        for t in 1..path.len() {
            score += transitions[path[t - 1]][path[t]] as f64;
            score += emissions[t][path[t]] as f64;
        }
        score
    }

    /// Every tag path of the given length.
    fn all_paths(num_tags: usize, len: usize) -> Vec<Vec<usize>> {
        let mut paths: Vec<Vec<usize>> = (0..num_tags).map(|t| vec![t]).collect();
        for _ in 1..len {
            paths = paths
                .iter()
                .flat_map(|p| {
                    (0..num_tags).map(move |t| {
                        let mut q = p.clone();
                        q.push(t);
                        q
                    })
                })
                .collect();
        }
        paths
    }

    fn small_instance() -> (Crf, Tensor, Vec<Vec<f32>>, Vec<Vec<f32>>) {
        let trans = vec![
            vec![0.3f32, -0.2, 0.1],
            vec![-0.5, 0.4, 0.2],
            vec![0.1, 0.6, -0.3],
        ];
        let emit = vec![
            vec![0.7f32, -0.1, 0.4],
            vec![0.2, 0.9, -0.6],
            vec![-0.3, 0.5, 0.8],
            vec![1.1, 0.0, -0.2],
        ];
        let crf = crf(trans.iter().flatten().copied().collect(), 3);
        let emissions = emissions(emit.iter().flatten().copied().collect(), 4, 3);
        (crf, emissions, emit, trans)
    }

    #[test]
    fn partition_function_matches_brute_force() {
        let (crf, emissions, emit, trans) = small_instance();

        let (score, _) = crf
            .recurrence(&emissions, |next| Ok((next.log_sum_exp(0).unwrap(), None)))
            .unwrap();
        let log_z = score.log_sum_exp(0).unwrap().to_scalar::<f32>().unwrap() as f64;

        let brute: f64 = all_paths(3, 4)
            .iter()
            .map(|p| manual_score(&emit, &trans, p).exp())
            .sum::<f64>()
            .ln();

        assert!((log_z - brute).abs() < TOLERANCE, "{log_z} vs {brute}");
    }

    #[test]
    fn viterbi_matches_brute_force() {
        let (crf, emissions, emit, trans) = small_instance();

        let decoded = crf.decode(&emissions).unwrap();
        let decoded_score = manual_score(
            &emit,
            &trans,
            &decoded.iter().map(|&t| t as usize).collect::<Vec<_>>(),
        );

        let best = all_paths(3, 4)
            .into_iter()
            .max_by(|a, b| {
                manual_score(&emit, &trans, a)
                    .partial_cmp(&manual_score(&emit, &trans, b))
                    .unwrap()
            })
            .unwrap();
        let best_score = manual_score(&emit, &trans, &best);

        assert!((decoded_score - best_score).abs() < TOLERANCE);
        assert_eq!(
            decoded,
            best.iter().map(|&t| t as u32).collect::<Vec<u32>>()
        );
    }

    #[test]
    fn nll_matches_brute_force() {
        let (crf, emissions, emit, trans) = small_instance();
        let gold = vec![0u32, 1, 1, 2];

        let loss = crf
            .nll(&[emissions], &[gold.clone()])
            .unwrap()
            .to_scalar::<f32>()
            .unwrap() as f64;

        let gold_score = manual_score(
            &emit,
            &trans,
            &gold.iter().map(|&t| t as usize).collect::<Vec<_>>(),
        );
        let log_z: f64 = all_paths(3, 4)
            .iter()
            .map(|p| manual_score(&emit, &trans, p).exp())
            .sum::<f64>()
            .ln();

        assert!((loss - (log_z - gold_score)).abs() < TOLERANCE);
        assert!(loss >= 0.0);
    }

    #[test]
    fn length_one_sentence_uses_emission_only() {
        let crf = crf(vec![5.0, 5.0, 5.0, 5.0], 2);
        let emissions = emissions(vec![0.2, 1.3], 1, 2);

        assert_eq!(crf.decode(&emissions).unwrap(), vec![1]);

        let loss = crf
            .nll(&[emissions], &[vec![1]])
            .unwrap()
            .to_scalar::<f32>()
            .unwrap() as f64;
        // log(e^0.2 + e^1.3) - 1.3, no transition terms despite the huge
        // transition scores.
        let expected = ((0.2f64).exp() + (1.3f64).exp()).ln() - 1.3;
        assert!((loss - expected).abs() < TOLERANCE);
    }

    #[test]
    fn ties_break_toward_the_lowest_tag_id() {
        // All scores equal: every path ties, so the decoded path must be the
        // all-zeros one.
        let crf = crf(vec![0.0; 9], 3);
        let emissions = emissions(vec![0.0; 12], 4, 3);
        assert_eq!(crf.decode(&emissions).unwrap(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn gold_path_length_mismatch_fails() {
        let (crf, emissions, _, _) = small_instance();
        let err = crf.nll(&[emissions], &[vec![0, 1]]).unwrap_err();
        assert!(matches!(err, KotobaError::LengthMismatch { expected: 4, got: 2 }));
    }

    #[test]
    fn out_of_range_gold_tag_fails() {
        let (crf, emissions, _, _) = small_instance();
        let err = crf.nll(&[emissions], &[vec![0, 1, 2, 3]]).unwrap_err();
        assert!(matches!(err, KotobaError::OutOfVocab { kind: "tag", id: 3, .. }));
    }

    #[test]
    fn empty_emissions_fail() {
        let crf = crf(vec![0.0; 4], 2);
        let empty = Tensor::zeros((0, 2), candle_core::DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(crf.decode(&empty), Err(KotobaError::EmptySequence)));
    }

    #[test]
    fn long_sequence_loss_stays_finite() {
        // Length 200 with large scores: the max-shifted log-sum-exp must not
        // overflow.
        let num_tags = 5;
        let len = 200;
        let crf = crf(
            (0..num_tags * num_tags).map(|i| (i % 7) as f32 - 3.0).collect(),
            num_tags,
        );
        let rows: Vec<f32> = (0..len * num_tags)
            .map(|i| ((i % 11) as f32 - 5.0) * 10.0)
            .collect();
        let emissions = emissions(rows, len, num_tags);
        let gold: Vec<u32> = (0..len as u32).map(|t| t % num_tags as u32).collect();

        let loss = crf
            .nll(&[emissions.clone()], &[gold])
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!(loss.is_finite());
        assert!(loss >= 0.0);

        let path = crf.decode(&emissions).unwrap();
        assert_eq!(path.len(), len);
    }

    #[test]
    fn batch_loss_is_the_mean_of_sentence_losses() {
        let (crf, emissions, _, _) = small_instance();
        let short = Tensor::from_vec(vec![0.4f32, -0.2, 0.1], (1, 3), &Device::Cpu).unwrap();

        let a = crf
            .nll(&[emissions.clone()], &[vec![0, 1, 1, 2]])
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        let b = crf
            .nll(&[short.clone()], &[vec![2]])
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        let both = crf
            .nll(&[emissions, short], &[vec![0, 1, 1, 2], vec![2]])
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();

        assert!((both - (a + b) / 2.0).abs() < TOLERANCE as f32);
    }
}
