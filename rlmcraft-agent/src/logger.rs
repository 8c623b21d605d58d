//! Trajectory log
//!
//! A run is written as JSON lines: one `metadata` entry, then one
//! `iteration` entry per iteration. Each line is flushed as it is written so
//! a crashed run still leaves a readable log.

use rlmcraft_core::error::{self, Error, Result};
use rlmcraft_core::{Iteration, RunMetadata};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Appends a run's trajectory to a JSONL file
pub struct TrajectoryLogger {
    path: PathBuf,
    writer: BufWriter<File>,
    iterations: usize,
}

impl TrajectoryLogger {
    /// Open `path` for appending, creating parent directories
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::from(e).with_operation("logger::new"))?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                Error::from(e)
                    .with_operation("logger::new")
                    .with_context("path", path.display().to_string())
            })?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            iterations: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log_metadata(&mut self, metadata: &RunMetadata) -> Result<()> {
        self.write_entry("metadata", None, metadata)
    }

    pub fn log_iteration(&mut self, iteration: &Iteration) -> Result<()> {
        self.iterations += 1;
        let index = self.iterations;
        self.write_entry("iteration", Some(index), iteration)
    }

    fn write_entry<T: Serialize>(&mut self, kind: &str, index: Option<usize>, record: &T) -> Result<()> {
        let body = serde_json::to_value(record).map_err(|e| {
            error::serialization_error(format!("failed to export {} entry", kind))
                .with_operation("logger::write_entry")
                .set_source(e)
        })?;

        let mut entry = Map::new();
        entry.insert("type".into(), Value::from(kind));
        if let Some(index) = index {
            entry.insert("iteration".into(), Value::from(index));
        }
        entry.insert("timestamp".into(), Value::from(unix_timestamp()));
        if let Value::Object(fields) = body {
            entry.extend(fields);
        }

        serde_json::to_writer(&mut self.writer, &Value::Object(entry)).map_err(|e| {
            error::serialization_error("failed to write log entry")
                .with_operation("logger::write_entry")
                .set_source(e)
        })?;
        self.writer
            .write_all(b"\n")
            .and_then(|_| self.writer.flush())
            .map_err(|e| Error::from(e).with_operation("logger::write_entry"))?;
        Ok(())
    }
}

/// Read a trajectory log back as raw entries, skipping blank lines
pub fn read_trajectory(path: impl AsRef<Path>) -> Result<Vec<Value>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| {
        Error::from(e)
            .with_operation("logger::read_trajectory")
            .with_context("path", path.display().to_string())
    })?;

    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| {
                Error::parse_failed("invalid trajectory entry")
                    .with_operation("logger::read_trajectory")
                    .with_context("line", (i + 1).to_string())
                    .set_source(e)
            })
        })
        .collect()
}

fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
