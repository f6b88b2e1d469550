//! Destinations for per-epoch curves and the confusion heatmap.

use anyhow::Result;
use tracing::{debug, warn};

use textcaps_visdom::{HeatmapLogger, PlotLogger, VisdomClient};

/// Scalar windows streamed once per epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Series {
    TrainLoss,
    TrainAccuracy,
    TestLoss,
    TestAccuracy,
}

impl Series {
    pub const ALL: [Series; 4] = [
        Series::TrainLoss,
        Series::TrainAccuracy,
        Series::TestLoss,
        Series::TestAccuracy,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Series::TrainLoss => "Train Loss",
            Series::TrainAccuracy => "Train Accuracy",
            Series::TestLoss => "Test Loss",
            Series::TestAccuracy => "Test Accuracy",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

pub const CONFUSION_TITLE: &str = "Confusion Matrix";

pub trait MetricSink {
    fn scalar(&mut self, series: Series, epoch: usize, value: f64) -> Result<()>;

    /// `labels` name the rows and columns of `matrix`.
    fn heatmap(&mut self, matrix: &[Vec<f64>], labels: &[String]) -> Result<()>;
}

/// Writes metrics to the log at `debug` level.
#[derive(Debug, Default)]
pub struct TracingSink;

impl MetricSink for TracingSink {
    fn scalar(&mut self, series: Series, epoch: usize, value: f64) -> Result<()> {
        debug!(series = series.title(), epoch, value, "metric");
        Ok(())
    }

    fn heatmap(&mut self, matrix: &[Vec<f64>], labels: &[String]) -> Result<()> {
        for (label, row) in labels.iter().zip(matrix) {
            let cells: Vec<String> = row.iter().map(|v| format!("{v:.3}")).collect();
            debug!(target_label = %label, row = %cells.join(" "), "confusion");
        }
        Ok(())
    }
}

/// Streams plots to a Visdom server under one environment.
///
/// Transport failures are logged and swallowed so that a missing plot server
/// never interrupts training.
pub struct VisdomSink {
    plots: Vec<PlotLogger>,
    confusion: HeatmapLogger,
}

impl VisdomSink {
    pub fn new(client: VisdomClient, env: &str) -> Self {
        let plots = Series::ALL
            .iter()
            .map(|s| PlotLogger::new(client.clone(), env, s.title()))
            .collect();
        Self {
            plots,
            confusion: HeatmapLogger::new(client, env, CONFUSION_TITLE),
        }
    }
}

impl MetricSink for VisdomSink {
    fn scalar(&mut self, series: Series, epoch: usize, value: f64) -> Result<()> {
        let plot = &mut self.plots[series.index()];
        if let Err(e) = plot.log(epoch as f64, value) {
            warn!(window = plot.title(), error = %e, "Failed to push plot");
        }
        Ok(())
    }

    fn heatmap(&mut self, matrix: &[Vec<f64>], labels: &[String]) -> Result<()> {
        if let Err(e) = self.confusion.log(matrix, Some(labels)) {
            warn!(window = CONFUSION_TITLE, error = %e, "Failed to push heatmap");
        }
        Ok(())
    }
}
