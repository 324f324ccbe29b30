//! Experiment tracking
//!
//! A run registers one experiment (name, hyperparameters, tags) and then
//! reports scalar metrics once per epoch. `LocalTracker` keeps everything in
//! the save directory; `HttpTracker` forwards the same events to a remote
//! service. Failures are returned to the caller unchanged.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::ExperimentParams;

pub const TOKEN_ENV: &str = "BIREAL_TRACKING_TOKEN";

pub trait ExperimentTracker {
    fn create_experiment(&mut self, name: &str, params: &ExperimentParams, tags: &[String]) -> Result<()>;
    fn log_metric(&mut self, name: &str, value: f64) -> Result<()>;
}

#[derive(Serialize)]
struct ExperimentRecord<'a> {
    name: &'a str,
    params: &'a ExperimentParams,
    tags: &'a [String],
    created_at: String,
}

#[derive(Serialize)]
struct MetricRecord<'a> {
    experiment: &'a str,
    name: &'a str,
    value: f64,
    time: String,
}

/// Writes `experiment.json` and appends to `metrics.jsonl`.
pub struct LocalTracker {
    dir: PathBuf,
    experiment: String,
    metrics: Option<File>,
}

impl LocalTracker {
    pub const EXPERIMENT_FILE: &'static str = "experiment.json";
    pub const METRICS_FILE: &'static str = "metrics.jsonl";

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            experiment: String::new(),
            metrics: None,
        }
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.dir.join(Self::METRICS_FILE)
    }
}

impl ExperimentTracker for LocalTracker {
    fn create_experiment(&mut self, name: &str, params: &ExperimentParams, tags: &[String]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let record = ExperimentRecord {
            name,
            params,
            tags,
            created_at: chrono::Local::now().to_rfc3339(),
        };
        let path = self.dir.join(Self::EXPERIMENT_FILE);
        let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, &record)?;

        let metrics_path = self.metrics_path();
        let metrics = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&metrics_path)
            .with_context(|| format!("Failed to open {}", metrics_path.display()))?;
        self.metrics = Some(metrics);
        self.experiment = name.to_string();
        Ok(())
    }

    fn log_metric(&mut self, name: &str, value: f64) -> Result<()> {
        let file = self
            .metrics
            .as_mut()
            .context("log_metric called before create_experiment")?;
        let record = MetricRecord {
            experiment: &self.experiment,
            name,
            value,
            time: chrono::Local::now().to_rfc3339(),
        };
        serde_json::to_writer(&mut *file, &record)?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(())
    }
}

/// POSTs experiment and metric events as JSON.
///
/// `{url}/experiments` receives the experiment record, `{url}/metrics` one
/// request per metric.
pub struct HttpTracker {
    url: String,
    token: Option<String>,
    experiment: String,
}

impl HttpTracker {
    pub fn new(url: &str, token: Option<String>) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            token,
            experiment: String::new(),
        }
    }

    /// Token taken from `BIREAL_TRACKING_TOKEN` when set.
    pub fn from_env(url: &str) -> Self {
        Self::new(url, std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty()))
    }

    fn post(&self, route: &str, body: impl Serialize) -> Result<()> {
        let endpoint = format!("{}/{}", self.url, route);
        let mut request = ureq::post(&endpoint);
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        request
            .send_json(body)
            .with_context(|| format!("Tracking request to {endpoint} failed"))?;
        Ok(())
    }
}

impl ExperimentTracker for HttpTracker {
    fn create_experiment(&mut self, name: &str, params: &ExperimentParams, tags: &[String]) -> Result<()> {
        self.experiment = name.to_string();
        self.post(
            "experiments",
            ExperimentRecord {
                name,
                params,
                tags,
                created_at: chrono::Local::now().to_rfc3339(),
            },
        )
    }

    fn log_metric(&mut self, name: &str, value: f64) -> Result<()> {
        self.post(
            "metrics",
            MetricRecord {
                experiment: &self.experiment,
                name,
                value,
                time: chrono::Local::now().to_rfc3339(),
            },
        )
    }
}

/// Fans every call out to all trackers; the first error aborts.
#[derive(Default)]
pub struct Experiment {
    trackers: Vec<Box<dyn ExperimentTracker>>,
}

impl Experiment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Local tracker in `save_dir`, plus a remote one when `url` is given.
    pub fn for_run(save_dir: &Path, url: Option<&str>) -> Self {
        let mut experiment = Self::new().with(LocalTracker::new(save_dir));
        if let Some(url) = url {
            experiment = experiment.with(HttpTracker::from_env(url));
        }
        experiment
    }

    pub fn with(mut self, tracker: impl ExperimentTracker + 'static) -> Self {
        self.trackers.push(Box::new(tracker));
        self
    }

    pub fn log_metrics(&mut self, metrics: &[(&str, f64)]) -> Result<()> {
        for (name, value) in metrics {
            self.log_metric(name, *value)?;
        }
        Ok(())
    }
}

impl ExperimentTracker for Experiment {
    fn create_experiment(&mut self, name: &str, params: &ExperimentParams, tags: &[String]) -> Result<()> {
        for tracker in &mut self.trackers {
            tracker.create_experiment(name, params, tags)?;
        }
        Ok(())
    }

    fn log_metric(&mut self, name: &str, value: f64) -> Result<()> {
        for tracker in &mut self.trackers {
            tracker.log_metric(name, value)?;
        }
        Ok(())
    }
}
