//! Simulation configuration file.
//!
//! Sections:
//!
//! - `[Simulation]` — `iterations`, `dt`, `seed` (optional, default 0),
//!   `process` (path to the process definition), `network` (generator name).
//! - `[NetworkParameters]` — typed parameters for the generator.
//! - `[ProcessParameters]` — numeric bindings for the rules' free parameters.
//! - `[NodeStateDistribution]` / `[EdgeStateDistribution]` — optional,
//!   `partial-state = weight` lines; omitted means even partition.
//! - `[Output]` — `directory`, `sample_interval` (default 1),
//!   `snapshot_interval` (optional).

use indexmap::IndexMap;
use percolate_dsl::{ConfigFile, PartialStateExpr, parse_partial_state_str};
use percolate_network::{GeneratorParams, ParamValue};
use percolate_runtime::{Error, Result};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct Settings {
    pub iterations: usize,
    pub dt: f64,
    pub seed: u64,
    pub process_file: PathBuf,
    pub network: String,
    pub network_params: GeneratorParams,
    pub process_params: IndexMap<String, f64>,
    pub node_distribution: Option<Vec<(PartialStateExpr, f64)>>,
    pub edge_distribution: Option<Vec<(PartialStateExpr, f64)>>,
    pub output_dir: PathBuf,
    pub sample_interval: usize,
    pub snapshot_interval: Option<usize>,
    /// The parsed file rendered back to text, for the run's config copy
    pub resolved_text: String,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!("cannot read '{}': {e}", path.display()))
        })?;
        let mut settings = Self::parse(&text)?;

        // the process file is resolved relative to the configuration file
        if settings.process_file.is_relative() {
            if let Some(parent) = path.parent() {
                settings.process_file = parent.join(&settings.process_file);
            }
        }
        Ok(settings)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let cfg = ConfigFile::parse(text)?;

        let iterations: usize = require(&cfg, "Simulation", "iterations")?;
        let dt: f64 = require(&cfg, "Simulation", "dt")?;
        let seed: u64 = optional(&cfg, "Simulation", "seed")?.unwrap_or(0);
        let process_file = PathBuf::from(require_str(&cfg, "Simulation", "process")?);
        let network = require_str(&cfg, "Simulation", "network")?.to_string();

        let mut network_params = GeneratorParams::new();
        if let Some(section) = cfg.section("NetworkParameters") {
            for entry in &section.entries {
                let Some(value) = &entry.value else {
                    return Err(Error::configuration(format!(
                        "network parameter '{}' has no value",
                        entry.key
                    )));
                };
                network_params.insert(entry.key.clone(), ParamValue::parse(value));
            }
        }

        let mut process_params = IndexMap::new();
        if let Some(section) = cfg.section("ProcessParameters") {
            for entry in &section.entries {
                let value = entry.value.as_deref().ok_or_else(|| {
                    Error::configuration(format!(
                        "process parameter '{}' has no value",
                        entry.key
                    ))
                })?;
                let value: f64 = value.parse().map_err(|_| {
                    Error::configuration(format!(
                        "process parameter '{}' must be numeric, found '{value}'",
                        entry.key
                    ))
                })?;
                process_params.insert(entry.key.clone(), value);
            }
        }

        let node_distribution = distribution(&cfg, "NodeStateDistribution")?;
        let edge_distribution = distribution(&cfg, "EdgeStateDistribution")?;

        let output_dir = PathBuf::from(
            cfg.get("Output", "directory").unwrap_or("runs"),
        );
        let sample_interval: usize = optional(&cfg, "Output", "sample_interval")?.unwrap_or(1);
        let snapshot_interval: Option<usize> = optional(&cfg, "Output", "snapshot_interval")?;

        Ok(Self {
            iterations,
            dt,
            seed,
            process_file,
            network,
            network_params,
            process_params,
            node_distribution,
            edge_distribution,
            output_dir,
            sample_interval,
            snapshot_interval,
            resolved_text: cfg.to_text(),
        })
    }
}

fn require_str<'a>(cfg: &'a ConfigFile, section: &str, key: &str) -> Result<&'a str> {
    cfg.get(section, key).ok_or_else(|| {
        Error::configuration(format!("missing option '{key}' in section [{section}]"))
    })
}

fn require<T: std::str::FromStr>(cfg: &ConfigFile, section: &str, key: &str) -> Result<T> {
    let text = require_str(cfg, section, key)?;
    text.parse().map_err(|_| {
        Error::configuration(format!(
            "option '{key}' in section [{section}] has invalid value '{text}'"
        ))
    })
}

fn optional<T: std::str::FromStr>(
    cfg: &ConfigFile,
    section: &str,
    key: &str,
) -> Result<Option<T>> {
    match cfg.get(section, key) {
        None => Ok(None),
        Some(text) => text.parse().map(Some).map_err(|_| {
            Error::configuration(format!(
                "option '{key}' in section [{section}] has invalid value '{text}'"
            ))
        }),
    }
}

fn distribution(
    cfg: &ConfigFile,
    section_name: &str,
) -> Result<Option<Vec<(PartialStateExpr, f64)>>> {
    let Some(section) = cfg.section(section_name) else {
        return Ok(None);
    };
    let mut entries = Vec::with_capacity(section.entries.len());
    for entry in &section.entries {
        let target = parse_partial_state_str(&entry.key)?;
        let value = entry.value.as_deref().ok_or_else(|| {
            Error::configuration(format!(
                "[{section_name}]: '{}' has no weight",
                entry.key
            ))
        })?;
        let weight: f64 = value.parse().map_err(|_| {
            Error::configuration(format!(
                "[{section_name}]: weight for '{}' must be numeric, found '{value}'",
                entry.key
            ))
        })?;
        entries.push((target, weight));
    }
    Ok(Some(entries))
}
