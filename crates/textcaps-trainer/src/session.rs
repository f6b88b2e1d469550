//! # Training session
//!
//! Owns everything one run mutates: the model and its variables, the
//! optimizer, the running meters, both schedulers, the best test accuracy and
//! the checkpoint store. The session is the engine's [`Task`] and [`Hooks`].

use anyhow::{Context, Result, anyhow, bail};
use candle_core::{D, DType, Device, Tensor, Var};
use candle_nn::{AdamW, ModuleT, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use serde::Serialize;
use tracing::info;

use textcaps_core::data::{Batch, DataLoader, LoadedData, SamplerOptions, Vocab, load_data};
use textcaps_core::model::EMBEDDING_PREFIX;
use textcaps_core::{MarginLoss, ModelConfig, TextClassifier, WordVectors};
use textcaps_visdom::VisdomClient;

use crate::checkpoint::{CheckpointMeta, CheckpointStore};
use crate::config::TrainConfig;
use crate::engine::{Engine, EngineState, Hooks, Phase, StepOutput, Task};
use crate::meters::{AverageValueMeter, ClassAccuracyMeter, ConfusionMeter};
use crate::schedule::{MultiStepLr, MultiStepRouting};
use crate::sink::{MetricSink, Series, TracingSink, VisdomSink};

/// Loss and accuracy of one pass.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PhaseSummary {
    pub loss: f64,
    /// Percent.
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochSummary {
    pub epoch: usize,
    pub train: PhaseSummary,
    pub test: PhaseSummary,
    /// Best test accuracy after this epoch.
    pub best_accuracy: f64,
    pub learning_rate: f64,
    pub num_iterations: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub run_name: String,
    pub epochs: Vec<EpochSummary>,
    pub best_accuracy: f64,
    pub best_epoch: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub run_name: String,
    pub summary: PhaseSummary,
    pub labels: Vec<String>,
    pub confusion: Vec<Vec<f64>>,
}

/// Names and sizes of everything the optimizer updates.
struct Parameters {
    trainable: Vec<Var>,
    count: usize,
}

pub struct TrainingSession {
    run_name: String,
    model: TextClassifier,
    varmap: VarMap,
    optimizer: AdamW,
    loss: MarginLoss,
    num_class: usize,
    labels: Vec<String>,
    vocab: Vocab,

    meter_loss: AverageValueMeter,
    meter_accuracy: ClassAccuracyMeter,
    meter_confusion: ConfusionMeter,

    routing: MultiStepRouting,
    lr_schedule: MultiStepLr,

    train_summary: PhaseSummary,
    test_summary: PhaseSummary,
    best_accuracy: f64,
    best_epoch: Option<usize>,
    history: Vec<EpochSummary>,

    sink: Box<dyn MetricSink>,
    checkpoints: Option<CheckpointStore>,
    log_every: usize,
}

impl TrainingSession {
    /// Build a freshly initialised session for `data`.
    pub fn new(
        config: &TrainConfig,
        data: &LoadedData,
        device: &Device,
        sink: Box<dyn MetricSink>,
    ) -> Result<Self> {
        let vectors = config
            .vectors
            .as_ref()
            .map(|path| WordVectors::load(path, Some(&data.vocab)))
            .transpose()?;

        let mut model_config = config.model_config(data.vocab_size(), data.num_class());
        if let Some(v) = &vectors {
            model_config.embed_dim = v.dim();
        }
        model_config.validate()?;

        let varmap = VarMap::new();
        let model = TextClassifier::new(
            &model_config,
            VarBuilder::from_varmap(&varmap, DType::F32, device),
        )?;

        if let Some(v) = &vectors {
            let hits = load_embedding(&varmap, v, &data.vocab, device)?;
            info!(
                hits,
                vocab = data.vocab_size(),
                "Initialised frozen embedding from pretrained vectors"
            );
        }

        let params = collect_parameters(&varmap, vectors.is_some())?;
        info!("# trainable parameters: {}", params.count);

        let mut session = Self::assemble(
            config,
            model,
            varmap,
            params,
            data.labels.clone(),
            data.vocab.clone(),
            sink,
        )?;
        session.checkpoints = Some(CheckpointStore::new(&config.output_dir, config.run_name()));
        Ok(session)
    }

    /// Rebuild a session from a saved checkpoint, for evaluation.
    pub fn restore(config: &TrainConfig, store: &CheckpointStore, device: &Device) -> Result<Self> {
        let meta = store.load_meta()?;
        let mut varmap = VarMap::new();
        let mut model = TextClassifier::new(
            &meta.model,
            VarBuilder::from_varmap(&varmap, DType::F32, device),
        )?;
        store.load_weights(&mut varmap)?;
        model.set_num_iterations(meta.num_iterations);
        info!(
            epoch = meta.epoch,
            accuracy = meta.accuracy,
            "Restored checkpoint"
        );

        let params = collect_parameters(&varmap, false)?;
        Self::assemble(
            config,
            model,
            varmap,
            params,
            meta.labels,
            meta.vocab,
            Box::new(TracingSink),
        )
    }

    fn assemble(
        config: &TrainConfig,
        model: TextClassifier,
        varmap: VarMap,
        params: Parameters,
        labels: Vec<String>,
        vocab: Vocab,
        sink: Box<dyn MetricSink>,
    ) -> Result<Self> {
        let optimizer = AdamW::new(
            params.trainable,
            ParamsAdamW {
                lr: config.learning_rate,
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;
        let num_class = labels.len();

        Ok(Self {
            run_name: config.run_name(),
            routing: MultiStepRouting::new(model.num_iterations(), &config.routing_milestones),
            lr_schedule: MultiStepLr::new(
                config.learning_rate,
                &config.learning_milestones,
                config.lr_gamma,
            ),
            model,
            varmap,
            optimizer,
            loss: MarginLoss::default(),
            num_class,
            labels,
            vocab,
            meter_loss: AverageValueMeter::new(),
            meter_accuracy: ClassAccuracyMeter::new(),
            meter_confusion: ConfusionMeter::new(num_class, true),
            train_summary: PhaseSummary::default(),
            test_summary: PhaseSummary::default(),
            best_accuracy: 0.0,
            best_epoch: None,
            history: Vec::new(),
            sink,
            checkpoints: None,
            log_every: config.log_every.max(1),
        })
    }

    pub fn model(&self) -> &TextClassifier {
        &self.model
    }

    pub fn model_config(&self) -> &ModelConfig {
        self.model.config()
    }

    pub fn learning_rate(&self) -> f64 {
        self.optimizer.learning_rate()
    }

    pub fn best_accuracy(&self) -> f64 {
        self.best_accuracy
    }

    pub fn history(&self) -> &[EpochSummary] {
        &self.history
    }

    pub fn report(&self) -> TrainingReport {
        TrainingReport {
            run_name: self.run_name.clone(),
            epochs: self.history.clone(),
            best_accuracy: self.best_accuracy,
            best_epoch: self.best_epoch,
        }
    }

    fn reset_meters(&mut self) {
        self.meter_loss.reset();
        self.meter_accuracy.reset();
        self.meter_confusion.reset();
    }

    fn phase_summary(&self) -> PhaseSummary {
        PhaseSummary {
            loss: self.meter_loss.mean(),
            accuracy: self.meter_accuracy.value(),
        }
    }

    fn save_checkpoint(&self, epoch: usize) -> Result<()> {
        let Some(store) = &self.checkpoints else {
            return Ok(());
        };
        let meta = CheckpointMeta {
            run_name: self.run_name.clone(),
            model: self.model.config().clone(),
            num_iterations: self.model.num_iterations(),
            epoch,
            accuracy: self.best_accuracy,
            labels: self.labels.clone(),
            vocab: self.vocab.clone(),
        };
        store.save(&self.varmap, &meta)
    }
}

/// Copy pretrained rows into the embedding table.
fn load_embedding(varmap: &VarMap, vectors: &WordVectors, vocab: &Vocab, device: &Device) -> Result<usize> {
    let name = format!("{EMBEDDING_PREFIX}.weight");
    let data = varmap
        .data()
        .lock()
        .map_err(|e| anyhow!("variable map poisoned: {e}"))?;
    let var = data
        .get(&name)
        .ok_or_else(|| anyhow!("model has no {name} parameter"))?;

    let mut table = var.flatten_all()?.to_vec1::<f32>()?;
    let hits = vectors.fill_rows(vocab, &mut table)?;
    let weights = Tensor::from_vec(table, (vocab.len(), vectors.dim()), device)?;
    var.set(&weights)?;
    Ok(hits)
}

/// Trainable variables, leaving out the embedding when it is frozen.
fn collect_parameters(varmap: &VarMap, freeze_embedding: bool) -> Result<Parameters> {
    let data = varmap
        .data()
        .lock()
        .map_err(|e| anyhow!("variable map poisoned: {e}"))?;
    let frozen_prefix = format!("{EMBEDDING_PREFIX}.");

    let mut names: Vec<&String> = data.keys().collect();
    names.sort();
    let trainable: Vec<Var> = names
        .into_iter()
        .filter(|name| !(freeze_embedding && name.starts_with(&frozen_prefix)))
        .map(|name| data[name].clone())
        .collect();
    let count = trainable.iter().map(|v| v.elem_count()).sum();
    Ok(Parameters { trainable, count })
}

impl Task for TrainingSession {
    fn process(&mut self, batch: &Batch, training: bool) -> Result<StepOutput> {
        let logits = self.model.forward_t(&batch.tokens, training)?;
        let targets = batch.one_hot(self.num_class)?;
        let loss = self.loss.forward(&logits, &targets)?;
        Ok(StepOutput { loss, logits })
    }

    fn optimize(&mut self, loss: &Tensor) -> Result<()> {
        self.optimizer.backward_step(loss)?;
        Ok(())
    }
}

impl Hooks for TrainingSession {
    fn on_start_phase(&mut self, _state: &EngineState) -> Result<()> {
        self.reset_meters();
        Ok(())
    }

    fn on_forward(&mut self, _state: &EngineState, batch: &Batch, output: &StepOutput) -> Result<()> {
        let loss = output.loss.to_dtype(DType::F64)?.to_scalar::<f64>()?;
        let predictions: Vec<usize> = output
            .logits
            .argmax(D::Minus1)?
            .to_vec1::<u32>()?
            .into_iter()
            .map(|p| p as usize)
            .collect();

        self.meter_loss.add(loss);
        self.meter_accuracy.add(&predictions, &batch.targets);
        self.meter_confusion.add(&predictions, &batch.targets);
        Ok(())
    }

    fn on_update(&mut self, state: &EngineState) -> Result<()> {
        if state.iteration % self.log_every == 0 {
            info!(
                "[Epoch {}/{}] Step {}/{} Loss: {:.4} Accuracy: {:.2}%",
                state.epoch,
                state.max_epoch,
                state.batch,
                state.num_batches,
                self.meter_loss.mean(),
                self.meter_accuracy.value()
            );
        }
        Ok(())
    }

    fn on_end_phase(&mut self, state: &EngineState) -> Result<()> {
        let summary = self.phase_summary();
        match state.phase {
            Phase::Training => {
                self.train_summary = summary;
                self.sink.scalar(Series::TrainLoss, state.epoch, summary.loss)?;
                self.sink.scalar(Series::TrainAccuracy, state.epoch, summary.accuracy)?;
                info!(
                    "[Epoch {}] Training Loss: {:.4} Accuracy: {:.2}%",
                    state.epoch, summary.loss, summary.accuracy
                );
            }
            Phase::Testing => {
                self.test_summary = summary;
                self.sink.scalar(Series::TestLoss, state.epoch, summary.loss)?;
                self.sink.scalar(Series::TestAccuracy, state.epoch, summary.accuracy)?;
                self.sink.heatmap(&self.meter_confusion.value(), &self.labels)?;
            }
        }
        Ok(())
    }

    fn on_end_epoch(&mut self, state: &EngineState) -> Result<()> {
        self.routing.step(&mut self.model);
        self.lr_schedule.step(&mut self.optimizer);

        let accuracy = self.test_summary.accuracy;
        if accuracy > self.best_accuracy {
            self.best_accuracy = accuracy;
            self.best_epoch = Some(state.epoch);
            self.save_checkpoint(state.epoch)?;
        }

        info!(
            "[Epoch {}] Testing Loss: {:.4} Accuracy: {:.2}% Best Accuracy: {:.2}%",
            state.epoch, self.test_summary.loss, accuracy, self.best_accuracy
        );

        self.history.push(EpochSummary {
            epoch: state.epoch,
            train: self.train_summary,
            test: self.test_summary,
            best_accuracy: self.best_accuracy,
            learning_rate: self.optimizer.learning_rate(),
            num_iterations: self.model.num_iterations(),
        });
        Ok(())
    }
}

fn build_sink(config: &TrainConfig) -> Result<Box<dyn MetricSink>> {
    match &config.visdom_url {
        Some(url) => {
            let client = VisdomClient::new(url.clone())?;
            info!(url = %client.base_url(), env = %config.run_name(), "Streaming plots to visdom");
            Ok(Box::new(VisdomSink::new(client, &config.run_name())))
        }
        None => Ok(Box::new(TracingSink)),
    }
}

/// Load data, train for `num_epochs`, and checkpoint the best model.
pub fn run_training(config: &TrainConfig) -> Result<TrainingReport> {
    config.validate()?;
    let device = config.device()?;
    info!(config = %serde_json::to_string(config)?, "Starting training");

    let data = load_data(&config.data).context("loading dataset")?;
    info!("[!] vocab_size: {}, num_class: {}", data.vocab_size(), data.num_class());

    let train_loader = DataLoader::new(
        &data.train,
        SamplerOptions::shuffled(config.batch_size, config.seed),
        &device,
    )?;
    let test_loader = DataLoader::new(&data.test, SamplerOptions::sequential(config.batch_size), &device)?;

    let mut session = TrainingSession::new(config, &data, &device, build_sink(config)?)?;
    Engine::train(&mut session, &train_loader, &test_loader, config.num_epochs)?;

    let report = session.report();
    match report.best_epoch {
        Some(epoch) => info!(
            best_accuracy = report.best_accuracy,
            epoch, "Training complete"
        ),
        None => info!("Training complete without a checkpoint"),
    }
    Ok(report)
}

/// Run one test pass with the saved best model for `config`'s run.
pub fn run_evaluation(config: &TrainConfig) -> Result<EvaluationReport> {
    let device = config.device()?;
    let store = CheckpointStore::new(&config.output_dir, config.run_name());
    if !store.exists() {
        bail!(
            "no checkpoint for {} in {}",
            config.run_name(),
            config.output_dir.display()
        );
    }

    let mut session = TrainingSession::restore(config, &store, &device)?;
    let data = load_data(&config.data).context("loading dataset")?;
    if data.vocab != session.vocab || data.labels != session.labels {
        bail!(
            "dataset cache for {} does not match the checkpoint vocabulary; rebuild the cache with the training settings",
            config.run_name()
        );
    }

    let loader = DataLoader::new(&data.test, SamplerOptions::sequential(config.batch_size), &device)?;
    Engine::test(&mut session, &loader)?;

    let summary = session.test_summary;
    info!(
        "[{}] Testing Loss: {:.4} Accuracy: {:.2}%",
        config.run_name(),
        summary.loss,
        summary.accuracy
    );
    Ok(EvaluationReport {
        run_name: config.run_name(),
        summary,
        labels: session.labels.clone(),
        confusion: session.meter_confusion.value(),
    })
}
