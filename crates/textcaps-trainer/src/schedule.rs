//! Milestone schedulers for the learning rate and the routing iterations.
//!
//! Both are stepped once at the end of every epoch. After `n` steps, every
//! milestone equal to `n` fires once.

use candle_nn::Optimizer;
use tracing::info;

use textcaps_core::TextClassifier;

/// Epoch counter that reports milestone hits.
#[derive(Debug, Clone)]
pub struct MultiStep {
    milestones: Vec<usize>,
    last_epoch: usize,
}

impl MultiStep {
    pub fn new(milestones: &[usize]) -> Self {
        let mut milestones = milestones.to_vec();
        milestones.sort_unstable();
        Self {
            milestones,
            last_epoch: 0,
        }
    }

    /// Advance one epoch; returns how many milestones fire at the new epoch.
    pub fn step(&mut self) -> usize {
        self.last_epoch += 1;
        self.hits_at(self.last_epoch)
    }

    pub fn last_epoch(&self) -> usize {
        self.last_epoch
    }

    fn hits_at(&self, epoch: usize) -> usize {
        self.milestones.iter().filter(|&&m| m == epoch).count()
    }

    /// Milestones fired after `epoch` steps.
    pub fn hits_through(&self, epoch: usize) -> usize {
        self.milestones.iter().filter(|&&m| m <= epoch).count()
    }
}

/// Multiplies the optimizer's learning rate by `gamma` at each milestone.
#[derive(Debug, Clone)]
pub struct MultiStepLr {
    schedule: MultiStep,
    gamma: f64,
    base_lr: f64,
}

impl MultiStepLr {
    pub fn new(base_lr: f64, milestones: &[usize], gamma: f64) -> Self {
        Self {
            schedule: MultiStep::new(milestones),
            gamma,
            base_lr,
        }
    }

    pub fn step<O: Optimizer>(&mut self, optimizer: &mut O) {
        let hits = self.schedule.step();
        if hits > 0 {
            let lr = optimizer.learning_rate() * self.gamma.powi(hits as i32);
            optimizer.set_learning_rate(lr);
            info!(epoch = self.schedule.last_epoch(), lr, "Learning rate decayed");
        }
    }

    /// Learning rate in effect after `epoch` steps.
    pub fn lr_at(&self, epoch: usize) -> f64 {
        self.base_lr * self.gamma.powi(self.schedule.hits_through(epoch) as i32)
    }
}

/// Models whose routing iteration count can be scheduled.
pub trait RoutingIterations {
    fn num_iterations(&self) -> usize;
    fn set_num_iterations(&mut self, num_iterations: usize);
}

impl RoutingIterations for TextClassifier {
    fn num_iterations(&self) -> usize {
        TextClassifier::num_iterations(self)
    }

    fn set_num_iterations(&mut self, num_iterations: usize) {
        TextClassifier::set_num_iterations(self, num_iterations);
    }
}

/// Adds `step_size` routing iterations at each milestone.
#[derive(Debug, Clone)]
pub struct MultiStepRouting {
    schedule: MultiStep,
    step_size: usize,
    initial: usize,
}

impl MultiStepRouting {
    pub fn new(initial: usize, milestones: &[usize]) -> Self {
        Self {
            schedule: MultiStep::new(milestones),
            step_size: 1,
            initial,
        }
    }

    pub fn with_step_size(mut self, step_size: usize) -> Self {
        self.step_size = step_size;
        self
    }

    pub fn step<M: RoutingIterations>(&mut self, model: &mut M) {
        let hits = self.schedule.step();
        if hits > 0 {
            let iterations = model.num_iterations() + hits * self.step_size;
            model.set_num_iterations(iterations);
            info!(
                epoch = self.schedule.last_epoch(),
                iterations, "Routing iterations increased"
            );
        }
    }

    /// Routing iterations in effect after `epoch` steps.
    pub fn iterations_at(&self, epoch: usize) -> usize {
        self.initial + self.schedule.hits_through(epoch) * self.step_size
    }
}
