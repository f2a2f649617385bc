//! Scalar metric sinks
//!
//! The training loop reports `(series, value, step)` triples to a
//! [`ScalarSink`]. Sinks are append-only: a recorded point is never
//! rewritten.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::error::{CatDogError, Result};

/// Series names used by the training pipeline
pub mod series {
    /// Loss of the last training batch of the epoch
    pub const TRAIN_LOSS: &str = "train/loss";
    pub const TRAIN_MEAN_LOSS: &str = "train/mean_loss";
    pub const TRAIN_ACCURACY: &str = "train/accuracy";
    pub const VALIDATION_LOSS: &str = "validation/loss";
    pub const VALIDATION_ACCURACY: &str = "validation/accuracy";
    pub const TEST_LOSS: &str = "test/loss";
    pub const TEST_ACCURACY: &str = "test/accuracy";
}

/// Append-only scalar time-series logger
pub trait ScalarSink {
    /// Append `value` to `series` at `step`
    fn record(&mut self, series: &str, value: f64, step: usize) -> Result<()>;

    /// Push buffered points to their destination
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: ScalarSink + ?Sized> ScalarSink for &mut S {
    fn record(&mut self, series: &str, value: f64, step: usize) -> Result<()> {
        (**self).record(series, value, step)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// One recorded point, also the JSON-lines wire format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarRecord {
    pub series: String,
    pub step: usize,
    pub value: f64,
}

/// In-process sink keeping every series in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    series: BTreeMap<String, Vec<(usize, f64)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points of one series in recording order
    pub fn series(&self, name: &str) -> &[(usize, f64)] {
        self.series.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Values of one series, dropping the steps
    pub fn values(&self, name: &str) -> Vec<f64> {
        self.series(name).iter().map(|&(_, v)| v).collect()
    }

    /// Names of all recorded series, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Rebuild a sink from a JSON-lines log written by [`JsonlSink`]
    pub fn from_jsonl(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut sink = Self::new();

        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: ScalarRecord = serde_json::from_str(&line).map_err(|e| {
                CatDogError::Serialization(format!(
                    "{}:{}: {}",
                    path.display(),
                    line_no + 1,
                    e
                ))
            })?;
            sink.record(&record.series, record.value, record.step)?;
        }

        Ok(sink)
    }
}

impl ScalarSink for MemorySink {
    fn record(&mut self, series: &str, value: f64, step: usize) -> Result<()> {
        self.series
            .entry(series.to_string())
            .or_default()
            .push((step, value));
        Ok(())
    }
}

/// Sink appending one JSON object per line to a file
pub struct JsonlSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlSink {
    /// Open `path` for appending, creating parent directories
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_options(path.as_ref(), OpenOptions::new().create(true).append(true))
    }

    /// Start a fresh log at `path`, discarding any earlier points
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_options(
            path.as_ref(),
            OpenOptions::new().create(true).write(true).truncate(true),
        )
    }

    fn with_options(path: &Path, options: &OpenOptions) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = options.open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ScalarSink for JsonlSink {
    fn record(&mut self, series: &str, value: f64, step: usize) -> Result<()> {
        let record = ScalarRecord {
            series: series.to_string(),
            step,
            value,
        };
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        // Points must survive an interrupted run
        self.writer.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Fan-out to two sinks
pub struct Tee<A, B> {
    pub first: A,
    pub second: B,
}

impl<A: ScalarSink, B: ScalarSink> Tee<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: ScalarSink, B: ScalarSink> ScalarSink for Tee<A, B> {
    fn record(&mut self, series: &str, value: f64, step: usize) -> Result<()> {
        self.first.record(series, value, step)?;
        self.second.record(series, value, step)
    }

    fn flush(&mut self) -> Result<()> {
        self.first.flush()?;
        self.second.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_keeps_order() {
        let mut sink = MemorySink::new();
        sink.record(series::TRAIN_LOSS, 0.9, 0).unwrap();
        sink.record(series::TRAIN_LOSS, 0.7, 1).unwrap();
        sink.record(series::VALIDATION_ACCURACY, 55.0, 0).unwrap();

        assert_eq!(sink.series(series::TRAIN_LOSS), &[(0, 0.9), (1, 0.7)]);
        assert_eq!(sink.values(series::VALIDATION_ACCURACY), vec![55.0]);
        assert!(sink.series("missing").is_empty());
        assert_eq!(sink.names().count(), 2);
    }

    #[test]
    fn test_jsonl_sink_appends_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("scalars.jsonl");

        {
            let mut sink = JsonlSink::open(&path).unwrap();
            sink.record(series::VALIDATION_LOSS, 0.5, 0).unwrap();
        }
        {
            let mut sink = JsonlSink::open(&path).unwrap();
            sink.record(series::VALIDATION_LOSS, 0.4, 1).unwrap();
        }

        let reloaded = MemorySink::from_jsonl(&path).unwrap();
        assert_eq!(reloaded.series(series::VALIDATION_LOSS), &[(0, 0.5), (1, 0.4)]);
    }

    #[test]
    fn test_jsonl_sink_create_discards_previous_points() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scalars.jsonl");

        for value in [0.9, 0.8] {
            let mut sink = JsonlSink::create(&path).unwrap();
            sink.record(series::TRAIN_LOSS, value, 0).unwrap();
            sink.record(series::TRAIN_LOSS, value / 2.0, 1).unwrap();
        }

        let reloaded = MemorySink::from_jsonl(&path).unwrap();
        assert_eq!(reloaded.series(series::TRAIN_LOSS), &[(0, 0.8), (1, 0.4)]);
    }

    #[test]
    fn test_from_jsonl_reports_bad_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "{\"series\":\"a\",\"step\":0,\"value\":1.0}\nnot json\n").unwrap();

        let err = MemorySink::from_jsonl(&path).unwrap_err();
        assert!(err.to_string().contains(":2:"));
    }

    #[test]
    fn test_tee_writes_both() {
        let mut tee = Tee::new(MemorySink::new(), MemorySink::new());
        tee.record("x", 1.0, 3).unwrap();
        assert_eq!(tee.first.series("x"), &[(3, 1.0)]);
        assert_eq!(tee.second.series("x"), &[(3, 1.0)]);
    }
}
