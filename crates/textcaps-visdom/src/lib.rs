//! # textcaps Visdom
//!
//! A small blocking client for a [Visdom](https://github.com/fossasia/visdom)
//! server. Supports the two plot kinds a training run streams: line plots
//! appended one point per epoch, and heatmaps replaced on every update.

use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

/// Errors talking to the Visdom server.
#[derive(Debug, Error)]
pub enum VisdomError {
    /// The request could not be sent or the response not read.
    #[error("visdom request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("visdom returned {status}: {body}")]
    Status { status: u16, body: String },
}

pub type Result<T> = std::result::Result<T, VisdomError>;

/// Default server address used by the Python client.
pub const DEFAULT_URL: &str = "http://localhost:8097";

#[derive(Debug, Serialize)]
struct Message<'a> {
    data: Vec<Value>,
    win: &'a str,
    eid: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    layout: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    opts: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    append: Option<bool>,
}

/// Connection to one Visdom server.
#[derive(Debug, Clone)]
pub struct VisdomClient {
    base_url: String,
    http: Client,
}

impl VisdomClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn send(&self, endpoint: &str, message: &Message<'_>) -> Result<()> {
        let url = format!("{}/{endpoint}", self.base_url);
        debug!(%url, win = message.win, env = message.eid, "visdom send");
        let response = self.http.post(&url).json(message).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(VisdomError::Status {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }
        Ok(())
    }
}

/// Window id derived from a plot title.
pub fn window_id(title: &str) -> String {
    title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

/// A line plot that grows by one point per call.
#[derive(Debug, Clone)]
pub struct PlotLogger {
    client: VisdomClient,
    env: String,
    title: String,
    win: String,
    created: bool,
}

impl PlotLogger {
    pub fn new(client: VisdomClient, env: impl Into<String>, title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            client,
            env: env.into(),
            win: window_id(&title),
            title,
            created: false,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Add the point `(x, y)`; the first call creates the window.
    pub fn log(&mut self, x: f64, y: f64) -> Result<()> {
        let message = line_message(&self.env, &self.win, &self.title, x, y, self.created);
        let endpoint = if self.created { "update" } else { "events" };
        self.client.send(endpoint, &message)?;
        self.created = true;
        Ok(())
    }
}

fn line_message<'a>(env: &'a str, win: &'a str, title: &str, x: f64, y: f64, append: bool) -> Message<'a> {
    if append {
        Message {
            data: vec![json!({ "x": [x], "y": [y] })],
            win,
            eid: env,
            layout: None,
            opts: None,
            append: Some(true),
        }
    } else {
        Message {
            data: vec![json!({
                "x": [x],
                "y": [y],
                "type": "scatter",
                "mode": "lines",
            })],
            win,
            eid: env,
            layout: Some(json!({ "title": title, "showlegend": false })),
            opts: Some(json!({ "title": title })),
            append: None,
        }
    }
}

/// A heatmap window redrawn on every call.
#[derive(Debug, Clone)]
pub struct HeatmapLogger {
    client: VisdomClient,
    env: String,
    title: String,
    win: String,
}

impl HeatmapLogger {
    pub fn new(client: VisdomClient, env: impl Into<String>, title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            client,
            env: env.into(),
            win: window_id(&title),
            title,
        }
    }

    /// Replace the heatmap with `matrix` (row-major, rows drawn top to bottom).
    pub fn log(&mut self, matrix: &[Vec<f64>], labels: Option<&[String]>) -> Result<()> {
        let message = heatmap_message(&self.env, &self.win, &self.title, matrix, labels);
        self.client.send("events", &message)
    }
}

fn heatmap_message<'a>(
    env: &'a str,
    win: &'a str,
    title: &str,
    matrix: &[Vec<f64>],
    labels: Option<&[String]>,
) -> Message<'a> {
    let (zmin, zmax) = matrix
        .iter()
        .flatten()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let (zmin, zmax) = if zmin.is_finite() { (zmin, zmax) } else { (0.0, 0.0) };

    let mut trace = json!({
        "z": matrix,
        "zmin": zmin,
        "zmax": zmax,
        "type": "heatmap",
        "colorscale": "Viridis",
    });
    if let Some(labels) = labels {
        trace["x"] = json!(labels);
        trace["y"] = json!(labels);
    }

    Message {
        data: vec![trace],
        win,
        eid: env,
        layout: Some(json!({
            "title": title,
            "xaxis": { "title": "Predicted" },
            "yaxis": { "title": "Target", "autorange": "reversed" },
        })),
        opts: Some(json!({ "title": title })),
        append: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_id() {
        assert_eq!(window_id("Train Loss"), "train_loss");
        assert_eq!(window_id("Confusion Matrix"), "confusion_matrix");
    }

    #[test]
    fn test_first_line_point_creates_window() {
        let msg = serde_json::to_value(line_message("imdb", "test_loss", "Test Loss", 1.0, 0.5, false)).unwrap();
        assert_eq!(msg["eid"], "imdb");
        assert_eq!(msg["win"], "test_loss");
        assert_eq!(msg["data"][0]["type"], "scatter");
        assert_eq!(msg["layout"]["title"], "Test Loss");
        assert!(msg.get("append").is_none());
    }

    #[test]
    fn test_later_line_points_append() {
        let msg = serde_json::to_value(line_message("imdb", "test_loss", "Test Loss", 2.0, 0.4, true)).unwrap();
        assert_eq!(msg["append"], true);
        assert_eq!(msg["data"][0]["x"][0], 2.0);
        assert!(msg.get("layout").is_none());
    }

    #[test]
    fn test_heatmap_message() {
        let matrix = vec![vec![0.75, 0.25], vec![0.0, 1.0]];
        let labels = vec!["neg".to_string(), "pos".to_string()];
        let msg = serde_json::to_value(heatmap_message("yelp", "cm", "Confusion Matrix", &matrix, Some(&labels))).unwrap();

        let trace = &msg["data"][0];
        assert_eq!(trace["type"], "heatmap");
        assert_eq!(trace["zmin"], 0.0);
        assert_eq!(trace["zmax"], 1.0);
        assert_eq!(trace["z"][0][1], 0.25);
        assert_eq!(trace["x"][1], "pos");
    }

    #[test]
    fn test_empty_heatmap_has_finite_bounds() {
        let msg = serde_json::to_value(heatmap_message("e", "w", "t", &[], None)).unwrap();
        assert_eq!(msg["data"][0]["zmin"], 0.0);
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = VisdomClient::new("http://localhost:8097/").unwrap();
        assert_eq!(client.base_url(), DEFAULT_URL);
    }
}
