//! # TextCaps Trainer
//!
//! Training loop for the margin-loss text classifier: epoch engine with
//! lifecycle hooks, running meters, milestone schedulers for the learning
//! rate and routing iterations, best-model checkpointing, and metric sinks
//! (tracing or Visdom).

pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod meters;
pub mod schedule;
pub mod session;
pub mod sink;

pub use checkpoint::{CheckpointMeta, CheckpointStore};
pub use config::TrainConfig;
pub use engine::{Engine, EngineState, Hooks, Phase, StepOutput, Task};
pub use session::{
    EpochSummary, EvaluationReport, PhaseSummary, TrainingReport, TrainingSession, run_evaluation,
    run_training,
};
pub use sink::{MetricSink, Series, TracingSink, VisdomSink};
