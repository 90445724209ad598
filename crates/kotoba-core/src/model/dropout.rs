//! Seeded inverted dropout.

use std::cell::RefCell;

use candle_core::Tensor;

use crate::error::Result;

/// Inverted dropout with an owned, reseedable RNG.
///
/// The mask is drawn host-side from an `oorandom` generator and lifted into a
/// tensor, so a single `u64` seed makes training runs reproducible. Kept
/// positions are scaled by `1 / (1 - rate)` so evaluation needs no rescaling.
pub struct Dropout {
    rate: f32,
    rng: RefCell<oorandom::Rand32>,
}

impl Dropout {
    pub fn new(rate: f32, seed: u64) -> Self {
        Self {
            rate,
            rng: RefCell::new(oorandom::Rand32::new(seed)),
        }
    }

    /// Reset the mask RNG. Two runs with the same seed and the same batch
    /// order draw identical masks.
    pub fn reseed(&self, seed: u64) {
        *self.rng.borrow_mut() = oorandom::Rand32::new(seed);
    }

    /// Apply dropout when `train` is set; identity otherwise.
    pub fn forward(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        if !train || self.rate == 0.0 {
            return Ok(xs.clone());
        }
        let keep = 1.0 - self.rate;
        let scale = 1.0 / keep;
        let mut rng = self.rng.borrow_mut();
        let mask: Vec<f32> = (0..xs.elem_count())
            .map(|_| if rng.rand_float() < self.rate { 0.0 } else { scale })
            .collect();
        let mask = Tensor::from_vec(mask, xs.dims(), xs.device())?;
        Ok(xs.mul(&mask)?)
    }
}
