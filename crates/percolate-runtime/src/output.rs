//! Output sinks.
//!
//! The driver reports through the [`OutputSink`] trait: per-sample state
//! counts, on-demand network snapshots, the resolved run configuration, and
//! the terminal completed/failed report. [`MemorySink`] collects everything
//! in memory for tests; [`FileSink`] writes a run directory with CSV count
//! tables, JSON snapshots, and a manifest.

use indexmap::IndexMap;
use percolate_network::Graph;
use serde::Serialize;
use serde_json::json;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization: {0}")]
    Json(#[from] serde_json::Error),
}

/// Counts emitted for one sampled iteration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSample {
    pub iteration: usize,
    pub time: f64,
    /// Mean-field target text to entity count
    pub counts: IndexMap<String, usize>,
    /// Mean-field target text to entities that entered it this iteration
    pub influx: IndexMap<String, u64>,
    /// `from -> to` transition text to occurrence count this iteration
    pub transitions: IndexMap<String, u64>,
}

/// Receiver for everything a run produces
pub trait OutputSink {
    /// A copy of the fully resolved run configuration, before iteration 0
    fn resolved_config(&mut self, text: &str) -> Result<(), SinkError>;

    fn state_sample(&mut self, sample: &StateSample) -> Result<(), SinkError>;

    fn network_snapshot(&mut self, iteration: usize, graph: &Graph) -> Result<(), SinkError>;

    fn run_completed(&mut self, iterations: usize) -> Result<(), SinkError>;

    fn run_failed(&mut self, iteration: usize, error: &str) -> Result<(), SinkError>;
}

/// In-memory sink for tests and embedding
#[derive(Debug, Default)]
pub struct MemorySink {
    pub config: Option<String>,
    pub samples: Vec<StateSample>,
    pub snapshots: Vec<(usize, Graph)>,
    pub completed: Option<usize>,
    pub failed: Option<(usize, String)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputSink for MemorySink {
    fn resolved_config(&mut self, text: &str) -> Result<(), SinkError> {
        self.config = Some(text.to_string());
        Ok(())
    }

    fn state_sample(&mut self, sample: &StateSample) -> Result<(), SinkError> {
        self.samples.push(sample.clone());
        Ok(())
    }

    fn network_snapshot(&mut self, iteration: usize, graph: &Graph) -> Result<(), SinkError> {
        self.snapshots.push((iteration, graph.clone()));
        Ok(())
    }

    fn run_completed(&mut self, iterations: usize) -> Result<(), SinkError> {
        self.completed = Some(iterations);
        Ok(())
    }

    fn run_failed(&mut self, iteration: usize, error: &str) -> Result<(), SinkError> {
        self.failed = Some((iteration, error.to_string()));
        Ok(())
    }
}

/// Identity of a run, written as `manifest.json`
#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub seed: u64,
    pub iterations: usize,
    pub dt: f64,
    pub network: String,
    pub process: String,
}

/// Directory-backed sink: count tables as CSV, snapshots as JSON
pub struct FileSink {
    dir: PathBuf,
    states: BufWriter<File>,
    influx: BufWriter<File>,
    transitions: BufWriter<File>,
    /// Column order fixed by the first sample
    columns: Option<Vec<String>>,
}

impl FileSink {
    pub fn create(dir: &Path, manifest: &RunManifest) -> Result<Self, SinkError> {
        fs::create_dir_all(dir)?;

        let manifest_file = File::create(dir.join("manifest.json"))?;
        serde_json::to_writer_pretty(BufWriter::new(manifest_file), manifest)?;

        let states = BufWriter::new(File::create(dir.join("states.csv"))?);
        let influx = BufWriter::new(File::create(dir.join("influx.csv"))?);
        let transitions = BufWriter::new(File::create(dir.join("transitions.jsonl"))?);

        info!(dir = %dir.display(), "run directory created");
        Ok(Self {
            dir: dir.to_path_buf(),
            states,
            influx,
            transitions,
            columns: None,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_result(&mut self, value: serde_json::Value) -> Result<(), SinkError> {
        let file = File::create(self.dir.join("result.json"))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &value)?;
        self.states.flush()?;
        self.influx.flush()?;
        self.transitions.flush()?;
        Ok(())
    }
}

impl OutputSink for FileSink {
    fn resolved_config(&mut self, text: &str) -> Result<(), SinkError> {
        fs::write(self.dir.join("config.ini"), text)?;
        Ok(())
    }

    fn state_sample(&mut self, sample: &StateSample) -> Result<(), SinkError> {
        if self.columns.is_none() {
            let columns: Vec<String> = sample.counts.keys().cloned().collect();
            let header = format!("iteration,time,{}", columns.join(","));
            writeln!(self.states, "{header}")?;
            writeln!(self.influx, "{header}")?;
            self.columns = Some(columns);
        }

        let counts: Vec<String> = sample.counts.values().map(|c| c.to_string()).collect();
        writeln!(
            self.states,
            "{},{},{}",
            sample.iteration,
            sample.time,
            counts.join(",")
        )?;

        let influx: Vec<String> = sample.influx.values().map(|c| c.to_string()).collect();
        writeln!(
            self.influx,
            "{},{},{}",
            sample.iteration,
            sample.time,
            influx.join(",")
        )?;

        let line = json!({
            "iteration": sample.iteration,
            "time": sample.time,
            "transitions": sample.transitions,
        });
        writeln!(self.transitions, "{line}")?;
        Ok(())
    }

    fn network_snapshot(&mut self, iteration: usize, graph: &Graph) -> Result<(), SinkError> {
        let path = self.dir.join(format!("network_{iteration:06}.json"));
        let file = File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), graph)?;
        Ok(())
    }

    fn run_completed(&mut self, iterations: usize) -> Result<(), SinkError> {
        self.write_result(json!({
            "status": "completed",
            "iterations": iterations,
        }))
    }

    fn run_failed(&mut self, iteration: usize, error: &str) -> Result<(), SinkError> {
        self.write_result(json!({
            "status": "failed",
            "iteration": iteration,
            "error": error,
        }))
    }
}
