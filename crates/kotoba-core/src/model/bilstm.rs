//! Bidirectional recurrent pass over one packed sequence.

use candle_core::{Tensor, D};
use candle_nn::{lstm, LSTMConfig, VarBuilder, LSTM, RNN};

use crate::error::{KotobaError, Result};

type LstmState = <LSTM as RNN>::State;

/// Two independent LSTMs, one per direction. The backward direction runs over
/// the time-reversed sequence and its outputs are re-reversed, so both output
/// views are aligned position-by-position.
pub struct BiLstm {
    fwd: LSTM,
    bwd: LSTM,
    hidden_dim: usize,
}

impl BiLstm {
    pub fn new(in_dim: usize, hidden_dim: usize, vb: VarBuilder) -> Result<Self> {
        let fwd = lstm(in_dim, hidden_dim, LSTMConfig::default(), vb.pp("fwd"))?;
        let bwd = lstm(in_dim, hidden_dim, LSTMConfig::default(), vb.pp("bwd"))?;
        Ok(Self {
            fwd,
            bwd,
            hidden_dim,
        })
    }

    /// Hidden size of each direction.
    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    /// Per-position hidden states of both directions, concatenated.
    ///
    /// `xs` is `(1, t, in_dim)` with `t >= 1`; the result is
    /// `(1, t, 2 * hidden_dim)`.
    pub fn seq(&self, xs: &Tensor) -> Result<Tensor> {
        let (fwd, bwd) = self.run(xs)?;
        let fwd = stack_hidden(&fwd)?;
        let bwd = reverse_time(&stack_hidden(&bwd)?)?;
        Ok(Tensor::cat(&[&fwd, &bwd], D::Minus1)?)
    }

    /// Final hidden states of both directions, concatenated: `(1, 2 * hidden_dim)`.
    ///
    /// The backward final state corresponds to the first position of the
    /// original sequence, so together the two states summarize the whole
    /// sequence from both ends.
    pub fn final_hidden(&self, xs: &Tensor) -> Result<Tensor> {
        let (fwd, bwd) = self.run(xs)?;
        let h_fwd = fwd.last().ok_or(KotobaError::EmptySequence)?.h().clone();
        let h_bwd = bwd.last().ok_or(KotobaError::EmptySequence)?.h().clone();
        Ok(Tensor::cat(&[&h_fwd, &h_bwd], D::Minus1)?)
    }

    fn run(&self, xs: &Tensor) -> Result<(Vec<LstmState>, Vec<LstmState>)> {
        if xs.dim(1)? == 0 {
            return Err(KotobaError::EmptySequence);
        }
        let fwd = self.fwd.seq(xs)?;
        let bwd = self.bwd.seq(&reverse_time(xs)?)?;
        Ok((fwd, bwd))
    }
}

/// Stack per-step hidden states into `(batch, t, hidden)`.
fn stack_hidden(states: &[LstmState]) -> Result<Tensor> {
    let hs: Vec<Tensor> = states.iter().map(|s| s.h().clone()).collect();
    Ok(Tensor::stack(&hs, 1)?)
}

/// Reverse a `(batch, t, features)` tensor along its time axis.
fn reverse_time(xs: &Tensor) -> Result<Tensor> {
    let t = xs.dim(1)?;
    let idx: Vec<u32> = (0..t as u32).rev().collect();
    let idx = Tensor::from_vec(idx, t, xs.device())?;
    Ok(xs.index_select(&idx, 1)?)
}
