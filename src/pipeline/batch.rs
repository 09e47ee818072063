//! Runs a sequence of steps over a list of samples.
//! Samples are processed one after another; a failing step stops the later steps of the same sample,
//! but other samples continue unless `fail_fast` is set.

use std::{
    path::PathBuf,
    time::Instant,
};
use crate::{
    ext,
    err::Error,
    steps::{self, Step, StepKind},
};
use super::{
    config::Config,
    runner::ToolRunner,
    report::{self, StatusTable},
    status::{State, StatusRecord, StatusStore},
};

pub struct Pipeline<'a> {
    config: &'a Config,
    steps: Vec<Box<dyn Step>>,
    store: StatusStore,
    fail_fast: bool,
}

impl<'a> Pipeline<'a> {
    /// Prepares all steps. Missing required executables and databases are reported here, before any sample runs.
    pub fn new(config: &'a Config, kinds: &[StepKind], fail_fast: bool) -> Result<Self, Error> {
        let steps = kinds.iter().map(|&kind| steps::prepare(kind, config)).collect::<Result<Vec<_>, _>>()?;
        ext::sys::mkdir(&config.output_dir)?;
        Ok(Self {
            config, steps,
            store: StatusStore::new(&config.output_dir),
            fail_fast,
        })
    }

    pub fn kinds(&self) -> Vec<StepKind> {
        self.steps.iter().map(|step| step.kind()).collect()
    }

    /// Samples, available to the first step.
    pub fn discover(&self) -> Result<Vec<String>, Error> {
        match self.steps.first() {
            Some(step) => step.discover(self.config),
            None => Ok(Vec::new()),
        }
    }

    /// Runs all steps for every sample, writes summaries and the status table.
    /// Tool failures do not produce an error here, they are reported in the returned table.
    pub fn run(&self, samples: &[String]) -> Result<StatusTable, Error> {
        let timer = Instant::now();
        let kinds = self.kinds();
        let mut table = StatusTable::new(&kinds);
        let n = samples.len();
        for (i, sample) in samples.iter().enumerate() {
            log::info!("Sample {} ({}/{})", sample, i + 1, n);
            let failed = self.run_sample(sample, &mut table)?;
            if failed && self.fail_fast {
                log::error!("Stopping after the first failure (--fail-fast)");
                break;
            }
        }

        for step in self.steps.iter() {
            self.finish_step(step.as_ref())?;
        }
        table.save(&self.config.output_dir)?;
        table.log();
        log::info!("Processed {} sample(s) in {}", table.samples().len(), ext::fmt::Duration(timer.elapsed()));
        Ok(table)
    }

    /// Runs all steps for one sample. Returns true if one of the steps failed.
    fn run_sample(&self, sample: &str, table: &mut StatusTable) -> Result<bool, Error> {
        for (i, step) in self.steps.iter().enumerate() {
            let state = self.run_step(step.as_ref(), sample)?;
            table.set(sample, step.kind(), state);
            if state == State::Failed {
                let later: Vec<&str> = self.steps[i + 1..].iter().map(|s| s.kind().name()).collect();
                if !later.is_empty() {
                    log::warn!("[{}] Later steps ({}) are not run", sample, later.join(", "));
                }
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn run_step(&self, step: &dyn Step, sample: &str) -> Result<State, Error> {
        let config = self.config;
        let kind = step.kind();
        let prefix = format!("[{}] {}", sample, kind.title());

        let old_record = self.store.load(kind, sample);
        let outputs = step.expected_outputs(config, sample);
        if !config.rerun.need_analysis(old_record.as_ref(), &outputs) {
            log::info!("{}: already complete, skipping", prefix);
            return Ok(State::Complete);
        }
        if let Err(reason) = step.check_inputs(config, sample) {
            log::warn!("{}: skipping, {}", prefix, reason);
            let mut record = StatusRecord::new(sample, kind, State::Skipped);
            record.message = Some(reason);
            self.store.save(&record)?;
            return Ok(State::Skipped);
        }

        let mut record = StatusRecord::new(sample, kind, State::Running);
        record.started = Some(ext::fmt::timestamp());
        self.store.save(&record)?;
        log::info!("{}", prefix);
        let timer = Instant::now();
        let res = ToolRunner::new(config.log_path(kind, sample))
            .and_then(|runner| step.run(config, sample, &runner))
            .and_then(|metrics| check_outputs(&outputs).map(|_| metrics));
        record.finished = Some(ext::fmt::timestamp());
        match res {
            Ok(metrics) => {
                record.state = State::Complete;
                record.metrics = metrics;
                self.store.save(&record)?;
                log::info!("{}: done in {}", prefix, ext::fmt::Duration(timer.elapsed()));
                for (key, value) in record.metrics.iter() {
                    log::debug!("        {}: {}", key, value);
                }
                Ok(State::Complete)
            }
            Err(e) => {
                log::error!("{}: {}", prefix, e.display());
                record.state = State::Failed;
                if let Error::Tool(failure) = &e {
                    record.exit_code = failure.exit_code;
                }
                record.message = Some(e.to_string());
                self.store.save(&record)?;
                Ok(State::Failed)
            }
        }
    }

    /// Writes the step summary and step-wide merged tables.
    /// They cover every sample with a status record, including samples from earlier runs.
    fn finish_step(&self, step: &dyn Step) -> Result<(), Error> {
        let kind = step.kind();
        let records = self.store.load_all(kind)?;
        if records.is_empty() {
            return Ok(());
        }
        let step_dir = self.config.step_dir(kind);
        report::write_summary(&step_dir, kind, &records)?;
        log::debug!("Summary written to {}", ext::fmt::path(&step_dir.join(report::SUMMARY)));

        let complete: Vec<String> = records.iter()
            .filter(|record| record.state == State::Complete
                && step.expected_outputs(self.config, &record.sample).iter().all(|path| path.exists()))
            .map(|record| record.sample.clone())
            .collect();
        step.finalize(self.config, &complete)
    }
}

fn check_outputs(outputs: &[PathBuf]) -> Result<(), Error> {
    match outputs.iter().find(|path| !path.exists()) {
        Some(missing) => Err(Error::InvalidData(format!("Expected output {} was not created",
            ext::fmt::path(missing)))),
        None => Ok(()),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::{
        fs::{self, File},
        io::Write,
        os::unix::fs::PermissionsExt,
        path::Path,
    };
    use flate2::{write::GzEncoder, Compression};
    use crate::pipeline::{config::ConfigBuilder, status::Rerun};

    /// Writes a FASTQ file with `n` reads.
    fn write_reads(path: &Path, n: usize) {
        let mut enc = GzEncoder::new(File::create(path).unwrap(), Compression::fast());
        for i in 0..n {
            write!(enc, "@read{}\nACGTACGTAC\n+\nIIIIIIIIII\n", i).unwrap();
        }
        enc.finish().unwrap();
    }

    fn write_script(path: &Path, body: &str) {
        fs::write(path, format!("#!/bin/sh\n{}", body)).unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// Fake fastp: records the call and keeps the first 950 reads of each input.
    /// Fails if the input name contains `bad`.
    fn fake_fastp(dir: &Path, calls: &Path) -> PathBuf {
        let path = dir.join("fastp");
        write_script(&path, &format!("\
echo \"$2\" >> '{}'
while [ $# -gt 0 ]; do
  case \"$1\" in
    -i) IN1=\"$2\" ;;
    -I) IN2=\"$2\" ;;
    -o) OUT1=\"$2\" ;;
    -O) OUT2=\"$2\" ;;
  esac
  shift
done
case \"$IN1\" in *bad*) echo 'ERROR: sequence and quality have different length' >&2; exit 2 ;; esac
gzip -dc \"$IN1\" | head -n 3800 | gzip -c > \"$OUT1\" && gzip -dc \"$IN2\" | head -n 3800 | gzip -c > \"$OUT2\"
", calls.display()));
        path
    }

    struct Setup {
        dir: tempfile::TempDir,
        calls: PathBuf,
    }

    impl Setup {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            fs::create_dir(dir.path().join("input")).unwrap();
            fs::create_dir(dir.path().join("bin")).unwrap();
            let calls = dir.path().join("calls.txt");
            Self { dir, calls }
        }

        fn input(&self) -> PathBuf {
            self.dir.path().join("input")
        }

        fn output(&self) -> PathBuf {
            self.dir.path().join("output")
        }

        fn add_sample(&self, name: &str, n: usize) {
            write_reads(&self.input().join(format!("{}_1.fastq.gz", name)), n);
            write_reads(&self.input().join(format!("{}_2.fastq.gz", name)), n);
        }

        /// Configuration with a fake fastp, bowtie2 that always fails, and disabled FastQC.
        fn config(&self) -> Config {
            let bin = self.dir.path().join("bin");
            let fastp = fake_fastp(&bin, &self.calls);
            let bowtie2 = bin.join("bowtie2");
            write_script(&bowtie2, "echo 'Error: could not open index' >&2\nexit 1\n");
            let index = self.dir.path().join("host");
            fs::write(ext::sys::append_path(&index, ".1.bt2"), "").unwrap();
            ConfigBuilder::new()
                .set("INPUT_DIR", self.input().to_str().unwrap())
                .set("OUTPUT_DIR", self.output().to_str().unwrap())
                .set("THREADS", "2")
                .set("FASTQC_EXE", "none")
                .set("FASTP_EXE", fastp.to_str().unwrap())
                .set("BOWTIE2_EXE", bowtie2.to_str().unwrap())
                .set("HOST_INDEX", index.to_str().unwrap())
                .build().unwrap()
        }

        fn calls(&self) -> Vec<String> {
            fs::read_to_string(&self.calls).unwrap_or_default().lines().map(String::from).collect()
        }
    }

    #[test]
    fn qc_in_sorted_order() {
        let setup = Setup::new();
        setup.add_sample("sample2", 10);
        setup.add_sample("sample1", 1000);
        // Orphan forward file.
        write_reads(&setup.input().join("sample3_1.fastq.gz"), 10);
        let config = setup.config();
        let pipeline = Pipeline::new(&config, &[StepKind::Qc], false).unwrap();
        let samples = pipeline.discover().unwrap();
        assert_eq!(samples, vec!["sample1", "sample2"]);
        let table = pipeline.run(&samples).unwrap();
        assert!(table.failed_samples().is_empty());

        let calls = setup.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].ends_with("sample1_1.fastq.gz") && calls[1].ends_with("sample2_1.fastq.gz"));

        let qc_dir = setup.output().join("01_qc");
        assert!(qc_dir.join("sample1_1.trimmed.fastq.gz").exists());
        let summary = fs::read_to_string(qc_dir.join(report::SUMMARY)).unwrap();
        assert!(summary.contains("[sample1]\nRaw reads: 1000\nTrimmed reads: 950\nRetention rate: 95.00%\n"));
        assert!(summary.contains("[sample2]\nRaw reads: 10\nTrimmed reads: 10\nRetention rate: 100.00%\n"));
        let status = fs::read_to_string(setup.output().join(report::STATUS_TABLE)).unwrap();
        assert_eq!(status, "sample\tqc\nsample1\tcomplete\nsample2\tcomplete\n");
    }

    #[test]
    fn rerun_skips_complete() {
        let setup = Setup::new();
        setup.add_sample("s1", 20);
        let config = setup.config();
        let pipeline = Pipeline::new(&config, &[StepKind::Qc], false).unwrap();
        pipeline.run(&["s1".to_string()]).unwrap();
        let trimmed = setup.output().join("01_qc").join("s1_1.trimmed.fastq.gz");
        let before = fs::read(&trimmed).unwrap();
        let summary_before = fs::read_to_string(setup.output().join("01_qc").join(report::SUMMARY)).unwrap();

        let table = pipeline.run(&["s1".to_string()]).unwrap();
        assert_eq!(table.get("s1", StepKind::Qc), Some(State::Complete));
        assert_eq!(setup.calls().len(), 1);
        assert_eq!(fs::read(&trimmed).unwrap(), before);
        assert_eq!(fs::read_to_string(setup.output().join("01_qc").join(report::SUMMARY)).unwrap(), summary_before);

        // Interrupted run is detected and repeated.
        let store = StatusStore::new(&config.output_dir);
        let mut record = store.load(StepKind::Qc, "s1").unwrap();
        record.state = State::Running;
        store.save(&record).unwrap();
        pipeline.run(&["s1".to_string()]).unwrap();
        assert_eq!(setup.calls().len(), 2);
    }

    #[test]
    fn summary_keeps_earlier_samples() {
        let setup = Setup::new();
        setup.add_sample("s1", 20);
        setup.add_sample("s2", 30);
        let config = setup.config();
        let pipeline = Pipeline::new(&config, &[StepKind::Qc], false).unwrap();
        pipeline.run(&pipeline.discover().unwrap()).unwrap();

        let mut rerun_config = config.clone();
        rerun_config.rerun = Rerun::All;
        let pipeline = Pipeline::new(&rerun_config, &[StepKind::Qc], false).unwrap();
        let table = pipeline.run(&["s1".to_string()]).unwrap();
        assert_eq!(table.samples(), &["s1".to_string()]);
        assert_eq!(setup.calls().len(), 3);

        let summary = fs::read_to_string(setup.output().join("01_qc").join(report::SUMMARY)).unwrap();
        assert!(summary.contains("[s1]\nRaw reads: 20\n"));
        assert!(summary.contains("[s2]\nRaw reads: 30\n"));
        // The status table describes the current run only.
        let status = fs::read_to_string(setup.output().join(report::STATUS_TABLE)).unwrap();
        assert_eq!(status, "sample\tqc\ns1\tcomplete\n");
    }

    #[test]
    fn failure_stops_sample_only() {
        let setup = Setup::new();
        setup.add_sample("a_bad", 10);
        setup.add_sample("b_good", 10);
        let config = setup.config();
        let pipeline = Pipeline::new(&config, &[StepKind::Qc, StepKind::Host], false).unwrap();
        let samples = pipeline.discover().unwrap();
        let table = pipeline.run(&samples).unwrap();

        assert_eq!(table.get("a_bad", StepKind::Qc), Some(State::Failed));
        assert_eq!(table.get("a_bad", StepKind::Host), None);
        assert_eq!(table.get("b_good", StepKind::Qc), Some(State::Complete));
        // Fake bowtie2 always fails.
        assert_eq!(table.get("b_good", StepKind::Host), Some(State::Failed));
        assert_eq!(table.failed_samples(), vec!["a_bad", "b_good"]);

        let record = StatusStore::new(&config.output_dir).load(StepKind::Qc, "a_bad").unwrap();
        assert_eq!(record.exit_code, Some(2));
        assert!(record.message.unwrap().contains("different length"));
        let log = fs::read_to_string(config.log_path(StepKind::Qc, "a_bad")).unwrap();
        assert!(log.contains("different length"));
    }

    #[test]
    fn fail_fast_stops_batch() {
        let setup = Setup::new();
        setup.add_sample("a_bad", 10);
        setup.add_sample("b_good", 10);
        let config = setup.config();
        let pipeline = Pipeline::new(&config, &[StepKind::Qc], true).unwrap();
        let table = pipeline.run(&["a_bad".to_string(), "b_good".to_string()]).unwrap();
        assert_eq!(table.samples(), &["a_bad".to_string()]);
        assert_eq!(setup.calls().len(), 1);
    }

    #[test]
    fn missing_sample_is_skipped() {
        let setup = Setup::new();
        setup.add_sample("sampleA", 10);
        let config = setup.config();
        let pipeline = Pipeline::new(&config, &[StepKind::Qc], false).unwrap();
        let table = pipeline.run(&["sampleA".to_string(), "sampleB".to_string()]).unwrap();
        assert_eq!(table.get("sampleA", StepKind::Qc), Some(State::Complete));
        assert_eq!(table.get("sampleB", StepKind::Qc), Some(State::Skipped));
        assert!(table.failed_samples().is_empty());
        let summary = fs::read_to_string(setup.output().join("01_qc").join(report::SUMMARY)).unwrap();
        assert!(summary.contains("[sampleB]\nSKIPPED: "));
    }

    #[test]
    fn missing_required_database_is_fatal() {
        let setup = Setup::new();
        let mut config = setup.config();
        config.databases.host_index = None;
        assert!(matches!(Pipeline::new(&config, &[StepKind::Qc, StepKind::Host], false), Err(Error::InvalidInput(_))));
        assert!(!setup.calls.exists());
    }
}
