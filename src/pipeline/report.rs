//! Plain-text step summaries and the final sample × step status table.

use std::{
    fmt::Write as FmtWrite,
    io::Write,
    collections::HashMap,
    path::Path,
};
use colored::Colorize;
use crate::{
    ext,
    err::Error,
    steps::StepKind,
};
use super::status::{State, StatusRecord};

/// Name of the per-step summary file.
pub const SUMMARY: &str = "summary.txt";
/// Name of the status table in the output directory.
pub const STATUS_TABLE: &str = "pipeline_status.tsv";

/// Formats the summary of a step. Output depends only on the records, so it is identical between reruns.
pub fn format_summary(step: StepKind, records: &[StatusRecord]) -> String {
    let count = |state: State| records.iter().filter(|r| r.state == state).count();
    let mut s = String::new();
    writeln!(s, "{}", step.title()).unwrap();
    writeln!(s, "{}", "=".repeat(step.title().len())).unwrap();
    writeln!(s, "Samples: {} (complete {}, failed {}, skipped {})",
        records.len(), count(State::Complete), count(State::Failed), count(State::Skipped)).unwrap();
    for record in records.iter() {
        writeln!(s, "\n[{}]", record.sample).unwrap();
        match record.state {
            State::Complete if record.metrics.is_empty() => writeln!(s, "COMPLETE").unwrap(),
            State::Complete => {
                for (key, value) in record.metrics.iter() {
                    writeln!(s, "{}: {}", key, value).unwrap();
                }
            }
            state => {
                write!(s, "{}", state.to_str().to_uppercase()).unwrap();
                if let Some(msg) = &record.message {
                    write!(s, ": {}", msg.lines().next().unwrap_or("")).unwrap();
                }
                writeln!(s).unwrap();
            }
        }
    }
    s
}

/// Writes `summary.txt` into the step directory.
pub fn write_summary(step_dir: &Path, step: StepKind, records: &[StatusRecord]) -> Result<(), Error> {
    ext::sys::mkdir(step_dir)?;
    let text = format_summary(step, records);
    ext::sys::write_atomic(&step_dir.join(SUMMARY), |w| w.write_all(text.as_bytes()))
}

/// Final state of every (sample, step) of the run.
pub struct StatusTable {
    steps: Vec<StepKind>,
    samples: Vec<String>,
    cells: HashMap<(String, StepKind), State>,
}

impl StatusTable {
    pub fn new(steps: &[StepKind]) -> Self {
        Self {
            steps: steps.to_vec(),
            samples: Vec::new(),
            cells: HashMap::new(),
        }
    }

    pub fn set(&mut self, sample: &str, step: StepKind, state: State) {
        if !self.samples.iter().any(|s| s == sample) {
            self.samples.push(sample.to_owned());
        }
        self.cells.insert((sample.to_owned(), step), state);
    }

    /// State of the cell, None if the step was not attempted.
    pub fn get(&self, sample: &str, step: StepKind) -> Option<State> {
        self.cells.get(&(sample.to_owned(), step)).copied()
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    /// Samples with at least one failed step.
    pub fn failed_samples(&self) -> Vec<&str> {
        self.samples.iter()
            .filter(|sample| self.steps.iter().any(|&step| self.get(sample, step) == Some(State::Failed)))
            .map(String::as_str)
            .collect()
    }

    fn cell(&self, sample: &str, step: StepKind) -> &'static str {
        self.get(sample, step).map(State::to_str).unwrap_or("-")
    }

    pub fn write_tsv<W: Write>(&self, mut f: W) -> std::io::Result<()> {
        write!(f, "sample")?;
        for step in self.steps.iter() {
            write!(f, "\t{}", step.name())?;
        }
        writeln!(f)?;
        for sample in self.samples.iter() {
            write!(f, "{}", sample)?;
            for &step in self.steps.iter() {
                write!(f, "\t{}", self.cell(sample, step))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }

    pub fn save(&self, output_dir: &Path) -> Result<(), Error> {
        ext::sys::write_atomic(&output_dir.join(STATUS_TABLE), |w| self.write_tsv(w))
    }

    /// Prints an aligned table into the log.
    pub fn log(&self) {
        let width = self.samples.iter().map(String::len).max().unwrap_or(0).max("sample".len());
        let mut header = format!("{:width$}", "sample");
        for step in self.steps.iter() {
            write!(header, "  {:10}", step.name()).unwrap();
        }
        log::info!("{}", header.bold());
        for sample in self.samples.iter() {
            let mut line = format!("{:width$}", sample);
            for &step in self.steps.iter() {
                let cell = format!("{:10}", self.cell(sample, step));
                let cell = match self.get(sample, step) {
                    Some(State::Complete) => cell.green(),
                    Some(State::Failed) => cell.red(),
                    Some(State::Skipped) | Some(State::Running) => cell.yellow(),
                    Some(State::Pending) | None => cell.normal(),
                };
                write!(line, "  {}", cell).unwrap();
            }
            log::info!("{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_text() {
        let mut ok = StatusRecord::new("s1", StepKind::Qc, State::Complete);
        ok.metrics.push("Raw reads", 1000);
        ok.metrics.push("Retention rate", "95.00%");
        let mut failed = StatusRecord::new("s2", StepKind::Qc, State::Failed);
        failed.message = Some("fastp exited with code 2\n    bad input".to_string());
        let text = format_summary(StepKind::Qc, &[ok, failed]);
        assert!(text.contains("Samples: 2 (complete 1, failed 1, skipped 0)"));
        assert!(text.contains("[s1]\nRaw reads: 1000\nRetention rate: 95.00%\n"));
        assert!(text.contains("[s2]\nFAILED: fastp exited with code 2\n"));
    }

    #[test]
    fn status_table() {
        let mut table = StatusTable::new(&[StepKind::Qc, StepKind::Host]);
        table.set("sampleA", StepKind::Qc, State::Complete);
        table.set("sampleA", StepKind::Host, State::Failed);
        table.set("sampleB", StepKind::Qc, State::Skipped);
        assert_eq!(table.failed_samples(), vec!["sampleA"]);

        let mut buf = Vec::new();
        table.write_tsv(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(),
            "sample\tqc\thost\nsampleA\tcomplete\tfailed\nsampleB\tskipped\t-\n");
    }
}
