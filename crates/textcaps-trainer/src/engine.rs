//! # Epoch engine
//!
//! Drives training as a fixed sequence of phases per epoch: a training pass
//! over the train loader (forward, backward and optimizer step per batch),
//! then a full testing pass over the test loader, then the end-of-epoch hook.
//! Lifecycle events are delivered to a [`Hooks`] implementation; the actual
//! forward computation and optimizer step are delegated to a [`Task`].

use anyhow::Result;
use candle_core::Tensor;

use textcaps_core::data::{Batch, DataLoader};

/// Which pass the engine is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Training,
    Testing,
}

impl Phase {
    pub fn is_training(self) -> bool {
        self == Phase::Training
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Training => "train",
            Phase::Testing => "test",
        }
    }
}

/// Snapshot of engine progress handed to every hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineState {
    /// 1-based epoch; 0 for a standalone test pass.
    pub epoch: usize,
    pub max_epoch: usize,
    /// Optimizer steps taken so far.
    pub iteration: usize,
    /// Batches seen in the current phase.
    pub batch: usize,
    /// Batches in the current phase.
    pub num_batches: usize,
    pub phase: Phase,
}

/// Result of one forward pass.
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// Scalar loss.
    pub loss: Tensor,
    /// `[batch, num_class]` scores.
    pub logits: Tensor,
}

/// The computation the engine drives.
pub trait Task {
    /// Forward pass and loss for one batch.
    fn process(&mut self, batch: &Batch, training: bool) -> Result<StepOutput>;

    /// Backward pass and parameter update.
    fn optimize(&mut self, loss: &Tensor) -> Result<()>;
}

/// Lifecycle callbacks. Every method defaults to a no-op.
pub trait Hooks {
    fn on_start(&mut self, _state: &EngineState) -> Result<()> {
        Ok(())
    }

    fn on_start_phase(&mut self, _state: &EngineState) -> Result<()> {
        Ok(())
    }

    fn on_sample(&mut self, _state: &EngineState, _batch: &Batch) -> Result<()> {
        Ok(())
    }

    fn on_forward(
        &mut self,
        _state: &EngineState,
        _batch: &Batch,
        _output: &StepOutput,
    ) -> Result<()> {
        Ok(())
    }

    /// After the optimizer step of a training batch.
    fn on_update(&mut self, _state: &EngineState) -> Result<()> {
        Ok(())
    }

    fn on_end_phase(&mut self, _state: &EngineState) -> Result<()> {
        Ok(())
    }

    /// After both passes of an epoch.
    fn on_end_epoch(&mut self, _state: &EngineState) -> Result<()> {
        Ok(())
    }

    fn on_end(&mut self, _state: &EngineState) -> Result<()> {
        Ok(())
    }
}

pub struct Engine;

impl Engine {
    /// Run `max_epoch` epochs of training, each followed by a test pass.
    pub fn train<S: Task + Hooks>(
        session: &mut S,
        train: &DataLoader<'_>,
        test: &DataLoader<'_>,
        max_epoch: usize,
    ) -> Result<EngineState> {
        let mut state = EngineState {
            epoch: 0,
            max_epoch,
            iteration: 0,
            batch: 0,
            num_batches: 0,
            phase: Phase::Training,
        };
        session.on_start(&state)?;

        while state.epoch < max_epoch {
            state.epoch += 1;

            state.phase = Phase::Training;
            Self::run_phase(session, train, &mut state)?;

            state.phase = Phase::Testing;
            Self::run_phase(session, test, &mut state)?;

            session.on_end_epoch(&state)?;
        }

        session.on_end(&state)?;
        Ok(state)
    }

    /// One standalone pass over `loader` without parameter updates.
    pub fn test<S: Task + Hooks>(session: &mut S, loader: &DataLoader<'_>) -> Result<EngineState> {
        let mut state = EngineState {
            epoch: 0,
            max_epoch: 0,
            iteration: 0,
            batch: 0,
            num_batches: 0,
            phase: Phase::Testing,
        };
        session.on_start(&state)?;
        Self::run_phase(session, loader, &mut state)?;
        session.on_end(&state)?;
        Ok(state)
    }

    fn run_phase<S: Task + Hooks>(
        session: &mut S,
        loader: &DataLoader<'_>,
        state: &mut EngineState,
    ) -> Result<()> {
        let training = state.phase.is_training();
        state.batch = 0;
        state.num_batches = loader.len();
        session.on_start_phase(state)?;

        for batch in loader.iter(state.epoch) {
            let batch = batch?;
            state.batch += 1;
            session.on_sample(state, &batch)?;

            let output = session.process(&batch, training)?;
            if training {
                session.optimize(&output.loss)?;
                state.iteration += 1;
            }
            session.on_forward(state, &batch, &output)?;
            if training {
                session.on_update(state)?;
            }
        }

        session.on_end_phase(state)
    }
}
