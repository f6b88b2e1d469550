//! Running metric accumulators, reset at the start of every phase.

/// Mean and sample standard deviation of a stream of scalars.
#[derive(Debug, Clone, Default)]
pub struct AverageValueMeter {
    n: usize,
    sum: f64,
    sum_sq: f64,
}

impl AverageValueMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        self.n += 1;
        self.sum += value;
        self.sum_sq += value * value;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn count(&self) -> usize {
        self.n
    }

    /// Mean of added values, `NaN` when empty.
    pub fn mean(&self) -> f64 {
        if self.n == 0 {
            f64::NAN
        } else {
            self.sum / self.n as f64
        }
    }

    /// Unbiased standard deviation; zero with fewer than two values.
    pub fn std(&self) -> f64 {
        if self.n < 2 {
            return 0.0;
        }
        let n = self.n as f64;
        let var = (self.sum_sq - self.sum * self.sum / n) / (n - 1.0);
        var.max(0.0).sqrt()
    }
}

/// Top-1 classification accuracy in percent.
#[derive(Debug, Clone, Default)]
pub struct ClassAccuracyMeter {
    correct: usize,
    total: usize,
}

impl ClassAccuracyMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, predictions: &[usize], targets: &[u32]) {
        self.correct += predictions
            .iter()
            .zip(targets)
            .filter(|&(&p, &t)| p == t as usize)
            .count();
        self.total += predictions.len().min(targets.len());
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Percentage of correct predictions, 0 when empty.
    pub fn value(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            100.0 * self.correct as f64 / self.total as f64
        }
    }
}

/// `k x k` confusion matrix; rows are targets, columns predictions.
#[derive(Debug, Clone)]
pub struct ConfusionMeter {
    k: usize,
    normalized: bool,
    counts: Vec<u64>,
}

impl ConfusionMeter {
    pub fn new(k: usize, normalized: bool) -> Self {
        Self {
            k,
            normalized,
            counts: vec![0; k * k],
        }
    }

    pub fn add(&mut self, predictions: &[usize], targets: &[u32]) {
        for (&p, &t) in predictions.iter().zip(targets) {
            let t = t as usize;
            if p < self.k && t < self.k {
                self.counts[t * self.k + p] += 1;
            }
        }
    }

    pub fn reset(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
    }

    pub fn num_classes(&self) -> usize {
        self.k
    }

    /// Matrix rows; normalized rows sum to one unless empty.
    pub fn value(&self) -> Vec<Vec<f64>> {
        self.counts
            .chunks(self.k.max(1))
            .take(self.k)
            .map(|row| {
                let total: u64 = row.iter().sum();
                row.iter()
                    .map(|&c| {
                        if !self.normalized {
                            c as f64
                        } else if total == 0 {
                            0.0
                        } else {
                            c as f64 / total as f64
                        }
                    })
                    .collect()
            })
            .collect()
    }
}
