//! Persistence of experiment results
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResultsError {
    #[error("file error {0}")]
    Io(#[from] std::io::Error),
    #[error("(de)serialization error {0}")]
    Json(#[from] serde_json::Error),
}

/// Append-only storage of numeric result sequences.
pub trait ResultSink {
    /// Store a per-run metric sequence (such as `J` or `TD_error`).
    fn save_run(&mut self, run: u64, metric: &str, values: &[f64]) -> Result<(), ResultsError>;

    /// Store a cross-run summary sequence (such as `mean` or `interval`).
    fn save_summary(&mut self, name: &str, values: &[f64]) -> Result<(), ResultsError>;
}

/// Sink that discards everything.
impl ResultSink for () {
    fn save_run(&mut self, _: u64, _: &str, _: &[f64]) -> Result<(), ResultsError> {
        Ok(())
    }
    fn save_summary(&mut self, _: &str, _: &[f64]) -> Result<(), ResultsError> {
        Ok(())
    }
}

impl<T: ResultSink + ?Sized> ResultSink for &mut T {
    fn save_run(&mut self, run: u64, metric: &str, values: &[f64]) -> Result<(), ResultsError> {
        T::save_run(self, run, metric, values)
    }
    fn save_summary(&mut self, name: &str, values: &[f64]) -> Result<(), ResultsError> {
        T::save_summary(self, name, values)
    }
}

/// Write JSON files under a root directory.
///
/// Run metrics go to `{root}/run{i}/{metric}.json`, summaries to `{root}/{name}.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    /// Create a sink writing under `root`, creating the directory if necessary.
    pub fn new<P: Into<PathBuf>>(root: P) -> Result<Self, ResultsError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a per-run metric file.
    pub fn run_path(&self, run: u64, metric: &str) -> PathBuf {
        self.root
            .join(format!("run{}", run))
            .join(format!("{}.json", metric))
    }

    /// Path of a summary file.
    pub fn summary_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.json", name))
    }

    /// Store any serializable value (such as the experiment configuration) as `{name}.json`.
    pub fn save_value<T: Serialize + ?Sized>(
        &self,
        name: &str,
        value: &T,
    ) -> Result<(), ResultsError> {
        save_json(self.summary_path(name), value)
    }
}

impl ResultSink for DirectorySink {
    fn save_run(&mut self, run: u64, metric: &str, values: &[f64]) -> Result<(), ResultsError> {
        let path = self.run_path(run, metric);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        save_json(path, values)
    }

    fn save_summary(&mut self, name: &str, values: &[f64]) -> Result<(), ResultsError> {
        save_json(self.summary_path(name), values)
    }
}

/// Keep results in memory.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MemorySink {
    pub runs: BTreeMap<(u64, String), Vec<f64>>,
    pub summaries: BTreeMap<String, Vec<f64>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(&self, run: u64, metric: &str) -> Option<&[f64]> {
        self.runs
            .get(&(run, metric.to_owned()))
            .map(Vec::as_slice)
    }

    pub fn summary(&self, name: &str) -> Option<&[f64]> {
        self.summaries.get(name).map(Vec::as_slice)
    }
}

impl ResultSink for MemorySink {
    fn save_run(&mut self, run: u64, metric: &str, values: &[f64]) -> Result<(), ResultsError> {
        self.runs.insert((run, metric.to_owned()), values.to_vec());
        Ok(())
    }

    fn save_summary(&mut self, name: &str, values: &[f64]) -> Result<(), ResultsError> {
        self.summaries.insert(name.to_owned(), values.to_vec());
        Ok(())
    }
}

/// Serialize a value to a JSON file.
pub fn save_json<P: AsRef<Path>, T: Serialize + ?Sized>(
    path: P,
    value: &T,
) -> Result<(), ResultsError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

/// Deserialize a value from a JSON file.
pub fn load_json<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> Result<T, ResultsError> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Load a saved numeric sequence.
pub fn load_values<P: AsRef<Path>>(path: P) -> Result<Vec<f64>, ResultsError> {
    load_json(path)
}
