//! Read quality control (FastQC) and adapter/quality trimming (fastp).

use std::{
    path::PathBuf,
    process::Command,
};
use crate::{
    ext,
    err::Error,
    parse::{fastx, fastp::FastpReport},
    pipeline::{
        tools,
        config::Config,
        metrics::Metrics,
        runner::ToolRunner,
        sample::{self, PairPattern},
    },
};
use super::{Step, StepKind};

pub struct QcStep {
    fastp: PathBuf,
    fastqc: Option<PathBuf>,
}

impl QcStep {
    pub fn new(config: &Config) -> Result<Self, Error> {
        Ok(Self {
            fastp: config.tools.require(tools::FASTP)?,
            fastqc: config.tools.optional(tools::FASTQC),
        })
    }
}

fn fastp_json(config: &Config, sample: &str) -> PathBuf {
    config.step_dir(StepKind::Qc).join(format!("{}_fastp.json", sample))
}

impl Step for QcStep {
    fn kind(&self) -> StepKind {
        StepKind::Qc
    }

    fn discover(&self, config: &Config) -> Result<Vec<String>, Error> {
        sample::discover(&config.input_dir, &PairPattern::RAW)
    }

    fn check_inputs(&self, config: &Config, sample: &str) -> Result<(), String> {
        PairPattern::RAW.locate(&config.input_dir, sample).map(|_| ())
    }

    fn expected_outputs(&self, config: &Config, sample: &str) -> Vec<PathBuf> {
        let (out1, out2) = PairPattern::TRIMMED.paths(&config.step_dir(StepKind::Qc), sample);
        vec![out1, out2]
    }

    fn run(&self, config: &Config, sample: &str, runner: &ToolRunner) -> Result<Metrics, Error> {
        let pair = PairPattern::RAW.locate(&config.input_dir, sample).map_err(Error::InvalidInput)?;
        let out_dir = config.step_dir(StepKind::Qc);
        ext::sys::mkdir(&out_dir)?;
        let threads = config.threads.to_string();

        if let Some(fastqc) = &self.fastqc {
            let fastqc_dir = out_dir.join("fastqc");
            ext::sys::mkdir(&fastqc_dir)?;
            let mut cmd = Command::new(fastqc);
            cmd.arg("-t").arg(&threads).arg("--quiet").arg("-o").arg(&fastqc_dir).arg(&pair.fwd).arg(&pair.rev);
            runner.run(&mut cmd)?;
        }

        let (out1, out2) = PairPattern::TRIMMED.paths(&out_dir, sample);
        let json_path = fastp_json(config, sample);
        let mut cmd = Command::new(&self.fastp);
        cmd.arg("-i").arg(&pair.fwd).arg("-I").arg(&pair.rev)
            .arg("-o").arg(&out1).arg("-O").arg(&out2)
            .arg("-q").arg(config.min_quality.to_string())
            .arg("-l").arg(config.min_length.to_string())
            .arg("-w").arg(&threads)
            .arg("--detect_adapter_for_pe")
            .arg("-j").arg(&json_path)
            .arg("-h").arg(out_dir.join(format!("{}_fastp.html", sample)));
        runner.run(&mut cmd)?;

        let raw_reads = fastx::count_reads(&pair.fwd)?;
        let trimmed_reads = fastx::count_reads(&out1)?;
        let mut metrics = Metrics::new();
        metrics.push("Raw reads", raw_reads);
        metrics.push("Trimmed reads", trimmed_reads);
        metrics.push_percent("Retention rate", trimmed_reads, raw_reads);
        match FastpReport::load(&json_path) {
            Ok(report) => {
                // fastp counts both mates.
                if report.reads_before != 2 * raw_reads || report.reads_after != 2 * trimmed_reads {
                    log::warn!("[{}] fastp reports {} -> {} reads, but the FASTQ files contain {} -> {} read pairs",
                        sample, report.reads_before, report.reads_after, raw_reads, trimmed_reads);
                }
                if let Some(q30) = report.q30_after {
                    metrics.push("Q30 after filtering", q30);
                }
            }
            Err(e) => log::debug!("[{}] Cannot use fastp report: {}", sample, e),
        }
        Ok(metrics)
    }
}
