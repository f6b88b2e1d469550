//! Capsule-style margin loss over flat class logits.
//!
//! For logits `v` and one-hot targets `T`:
//!
//! ```text
//! L_k = T_k * max(0, m+ - v_k)^2 + lambda * (1 - T_k) * max(0, v_k - m-)^2
//! ```
//!
//! summed over classes and averaged over the batch.

use candle_core::{Result, Tensor};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarginLoss {
    /// Lower bound the true-class logit should reach.
    pub m_pos: f64,
    /// Upper bound every other logit should stay under.
    pub m_neg: f64,
    /// Down-weighting of the absent-class term.
    pub lambda: f64,
}

impl Default for MarginLoss {
    fn default() -> Self {
        Self {
            m_pos: 0.9,
            m_neg: 0.1,
            lambda: 0.5,
        }
    }
}

impl MarginLoss {
    /// `logits`, `targets`: `[batch, num_class]`. Returns a scalar.
    pub fn forward(&self, logits: &Tensor, targets: &Tensor) -> Result<Tensor> {
        let present = logits.affine(-1.0, self.m_pos)?.relu()?.sqr()?;
        let absent = logits.affine(1.0, -self.m_neg)?.relu()?.sqr()?;

        let absent_weight = targets.affine(-self.lambda, self.lambda)?;
        let loss = (targets.mul(&present)? + absent_weight.mul(&absent)?)?;
        loss.sum(1)?.mean_all()
    }
}

#[cfg(test)]
mod tests {
    use candle_core::Device;

    use super::*;

    fn tensor<const M: usize>(rows: &[[f32; 3]; M]) -> Tensor {
        Tensor::new(rows, &Device::Cpu).unwrap()
    }

    fn scalar(t: Tensor) -> f32 {
        t.to_scalar::<f32>().unwrap()
    }

    #[test]
    fn test_zero_when_margins_satisfied() {
        let loss = MarginLoss::default();
        let logits = tensor(&[[0.95, 0.05, -0.3], [0.1, 0.0, 1.2]]);
        let targets = tensor(&[[1.0, 0.0, 0.0], [0.0, 0.0, 1.0]]);
        assert_eq!(scalar(loss.forward(&logits, &targets).unwrap()), 0.0);
    }

    #[test]
    fn test_penalises_weak_true_class() {
        let loss = MarginLoss::default();
        let logits = tensor(&[[0.5, 0.0, 0.0]]);
        let targets = tensor(&[[1.0, 0.0, 0.0]]);
        // (0.9 - 0.5)^2
        let value = scalar(loss.forward(&logits, &targets).unwrap());
        assert!((value - 0.16).abs() < 1e-6);
    }

    #[test]
    fn test_penalises_strong_wrong_class_with_lambda() {
        let loss = MarginLoss::default();
        let logits = tensor(&[[1.0, 0.6, 0.1]]);
        let targets = tensor(&[[1.0, 0.0, 0.0]]);
        // 0.5 * (0.6 - 0.1)^2
        let value = scalar(loss.forward(&logits, &targets).unwrap());
        assert!((value - 0.125).abs() < 1e-6);
    }

    #[test]
    fn test_mean_over_batch() {
        let loss = MarginLoss::default();
        let logits = tensor(&[[0.5, 0.0, 0.0], [0.9, 0.0, 0.0]]);
        let targets = tensor(&[[1.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);
        let value = scalar(loss.forward(&logits, &targets).unwrap());
        assert!((value - 0.08).abs() < 1e-6);
    }
}
