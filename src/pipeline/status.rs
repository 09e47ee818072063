//! Per-(sample, step) status records. A record is written before a step starts and after it finishes,
//! so an interrupted run leaves a `running` record instead of silently incomplete output.

use std::{
    fmt,
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
};
use crate::{
    ext,
    err::{Error, add_path},
    steps::StepKind,
};
use super::metrics::Metrics;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum State {
    Pending,
    Running,
    Complete,
    Failed,
    Skipped,
}

impl State {
    pub fn to_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl FromStr for State {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "complete" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            _ => Err(format!("Unknown state {:?}", s)),
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.to_str())
    }
}

#[derive(Clone, Debug)]
pub struct StatusRecord {
    pub sample: String,
    pub step: StepKind,
    pub state: State,
    pub started: Option<String>,
    pub finished: Option<String>,
    pub exit_code: Option<i32>,
    pub message: Option<String>,
    pub metrics: Metrics,
}

impl StatusRecord {
    pub fn new(sample: &str, step: StepKind, state: State) -> Self {
        Self {
            sample: sample.to_owned(),
            step, state,
            started: None,
            finished: None,
            exit_code: None,
            message: None,
            metrics: Metrics::new(),
        }
    }

    pub fn to_json(&self) -> json::JsonValue {
        let mut metrics = json::JsonValue::new_object();
        for (key, value) in self.metrics.iter() {
            metrics[key] = value.into();
        }
        json::object!{
            sample: self.sample.as_str(),
            step: self.step.name(),
            state: self.state.to_str(),
            started: self.started.as_deref(),
            finished: self.finished.as_deref(),
            exit_code: self.exit_code,
            message: self.message.as_deref(),
            metrics: metrics,
        }
    }

    pub fn from_json(obj: &json::JsonValue) -> Result<Self, Error> {
        let get_str = |key: &str| obj[key].as_str()
            .ok_or_else(|| Error::JsonLoad(format!("Status record has no string field {:?}", key)));
        let step: StepKind = get_str("step")?.parse().map_err(Error::JsonLoad)?;
        let state: State = get_str("state")?.parse().map_err(Error::JsonLoad)?;
        let mut record = Self::new(get_str("sample")?, step, state);
        record.started = obj["started"].as_str().map(String::from);
        record.finished = obj["finished"].as_str().map(String::from);
        record.exit_code = obj["exit_code"].as_i32();
        record.message = obj["message"].as_str().map(String::from);
        for (key, value) in obj["metrics"].entries() {
            let value = value.as_str()
                .ok_or_else(|| Error::JsonLoad(format!("Metric {:?} is not a string", key)))?;
            record.metrics.push(key, value);
        }
        Ok(record)
    }
}

/// Status records are stored in `<output>/.status/<step>/<sample>.json`.
pub struct StatusStore {
    root: PathBuf,
}

impl StatusStore {
    pub fn new(output_dir: &Path) -> Self {
        Self { root: output_dir.join(".status") }
    }

    pub fn path(&self, step: StepKind, sample: &str) -> PathBuf {
        self.root.join(step.name()).join(format!("{}.json", sample))
    }

    /// Loads the record. Unreadable records are reported and treated as absent.
    pub fn load(&self, step: StepKind, sample: &str) -> Option<StatusRecord> {
        let path = self.path(step, sample);
        if !path.exists() {
            return None;
        }
        match ext::sys::load_json(&path).and_then(|obj| StatusRecord::from_json(&obj)) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("Cannot read status record {}: {}", ext::fmt::path(&path), e);
                None
            }
        }
    }

    /// Loads records of all samples that were ever processed by the step, sorted by sample name.
    pub fn load_all(&self, step: StepKind) -> Result<Vec<StatusRecord>, Error> {
        let dir = self.root.join(step.name());
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let paths = ext::sys::filenames_with_ext(&dir, "json").map_err(add_path!(dir))?;
        Ok(paths.iter()
            .filter_map(|path| path.file_stem().and_then(|stem| stem.to_str()))
            .filter_map(|sample| self.load(step, sample))
            .collect())
    }

    /// Atomically replaces the record.
    pub fn save(&self, record: &StatusRecord) -> Result<(), Error> {
        let path = self.path(record.step, &record.sample);
        if let Some(parent) = path.parent() {
            ext::sys::mkdir(parent)?;
        }
        let contents = record.to_json().pretty(4);
        ext::sys::write_atomic(&path, |w| writeln!(w, "{}", contents))
    }
}

/// Rerun mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rerun {
    /// Rerun everything.
    All,
    /// Only run samples without a complete record.
    None,
}

impl Rerun {
    pub fn to_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::None => "none",
        }
    }

    /// Returns true if the step needs to be run for the sample.
    /// A complete record is trusted only if all expected outputs are still present.
    pub fn need_analysis(self, record: Option<&StatusRecord>, outputs: &[PathBuf]) -> bool {
        let record = match (self, record) {
            (Self::All, _) | (_, None) => return true,
            (Self::None, Some(record)) => record,
        };
        let prefix = format!("[{}] {}:", record.sample, record.step.title());
        match record.state {
            State::Complete => {
                if let Some(missing) = outputs.iter().find(|path| !path.exists()) {
                    log::warn!("{} completed previously, but {} is missing, rerunning",
                        prefix, ext::fmt::path(missing));
                    true
                } else {
                    false
                }
            }
            State::Running => {
                log::warn!("{} previous run was interrupted, rerunning", prefix);
                true
            }
            State::Failed => {
                log::info!("{} previous run failed, rerunning", prefix);
                true
            }
            State::Pending | State::Skipped => true,
        }
    }
}

impl FromStr for Rerun {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match &s.to_lowercase() as &str {
            "all" | "full" => Ok(Self::All),
            "none" | "no" => Ok(Self::None),
            _ => Err(format!("Unknown rerun mode {:?} (allowed values: all, none)", s)),
        }
    }
}

impl fmt::Display for Rerun {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.to_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn store_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = StatusStore::new(dir.path());
        let mut record = StatusRecord::new("s1", StepKind::Qc, State::Complete);
        record.started = Some("2024-01-01 10:00:00".to_string());
        record.metrics.push("Raw reads", 1000);
        record.metrics.push("Retention rate", "95.00%");
        store.save(&record).unwrap();

        let loaded = store.load(StepKind::Qc, "s1").unwrap();
        assert_eq!(loaded.state, State::Complete);
        assert_eq!(loaded.started.as_deref(), Some("2024-01-01 10:00:00"));
        assert_eq!(loaded.exit_code, None);
        assert_eq!(loaded.metrics, record.metrics);
        assert!(store.load(StepKind::Host, "s1").is_none());
    }

    #[test]
    fn all_records_of_step() {
        let dir = tempfile::tempdir().unwrap();
        let store = StatusStore::new(dir.path());
        assert!(store.load_all(StepKind::Qc).unwrap().is_empty());
        for sample in ["s2", "s10", "s1"] {
            store.save(&StatusRecord::new(sample, StepKind::Qc, State::Complete)).unwrap();
        }
        store.save(&StatusRecord::new("s3", StepKind::Host, State::Failed)).unwrap();
        fs::write(store.path(StepKind::Qc, "s1").with_extension("json.tmp"), "{").unwrap();

        let samples: Vec<_> = store.load_all(StepKind::Qc).unwrap().into_iter().map(|r| r.sample).collect();
        assert_eq!(samples, vec!["s1", "s10", "s2"]);
        assert_eq!(store.load_all(StepKind::Host).unwrap().len(), 1);
    }

    #[test]
    fn corrupt_record_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = StatusStore::new(dir.path());
        let path = store.path(StepKind::Assembly, "s2");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{\"sample\": \"s2\", ").unwrap();
        assert!(store.load(StepKind::Assembly, "s2").is_none());
    }

    #[test]
    fn rerun_decisions() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("s_contigs.fa");
        let outputs = vec![output.clone()];
        let complete = StatusRecord::new("s", StepKind::Assembly, State::Complete);
        let running = StatusRecord::new("s", StepKind::Assembly, State::Running);
        let failed = StatusRecord::new("s", StepKind::Assembly, State::Failed);

        assert!(Rerun::None.need_analysis(None, &outputs));
        // Output is missing.
        assert!(Rerun::None.need_analysis(Some(&complete), &outputs));
        fs::write(&output, ">c1\nACGT\n").unwrap();
        assert!(!Rerun::None.need_analysis(Some(&complete), &outputs));
        assert!(Rerun::All.need_analysis(Some(&complete), &outputs));
        assert!(Rerun::None.need_analysis(Some(&running), &outputs));
        assert!(Rerun::None.need_analysis(Some(&failed), &outputs));
    }
}
