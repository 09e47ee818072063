//! Removal of host reads: trimmed pairs are aligned to the host genome, and only concordantly unaligned pairs are kept.

use std::{
    path::PathBuf,
    process::Command,
};
use crate::{
    ext,
    err::Error,
    parse::{fastx, bowtie2::Bowtie2Summary},
    pipeline::{
        tools,
        config::Config,
        metrics::Metrics,
        runner::ToolRunner,
        sample::{self, PairPattern},
    },
};
use super::{Step, StepKind};

pub struct HostStep {
    bowtie2: PathBuf,
    index: PathBuf,
}

impl HostStep {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let index = super::require_db(&config.databases.host_index, "HOST_INDEX", StepKind::Host)?.clone();
        Ok(Self {
            bowtie2: config.tools.require(tools::BOWTIE2)?,
            index,
        })
    }
}

impl Step for HostStep {
    fn kind(&self) -> StepKind {
        StepKind::Host
    }

    fn discover(&self, config: &Config) -> Result<Vec<String>, Error> {
        sample::discover(&config.step_dir(StepKind::Qc), &PairPattern::TRIMMED)
    }

    fn check_inputs(&self, config: &Config, sample: &str) -> Result<(), String> {
        PairPattern::TRIMMED.locate(&config.step_dir(StepKind::Qc), sample).map(|_| ())
    }

    fn expected_outputs(&self, config: &Config, sample: &str) -> Vec<PathBuf> {
        let (out1, out2) = PairPattern::NONHOST.paths(&config.step_dir(StepKind::Host), sample);
        vec![out1, out2]
    }

    fn run(&self, config: &Config, sample: &str, runner: &ToolRunner) -> Result<Metrics, Error> {
        let pair = PairPattern::TRIMMED.locate(&config.step_dir(StepKind::Qc), sample).map_err(Error::InvalidInput)?;
        let out_dir = config.step_dir(StepKind::Host);
        ext::sys::mkdir(&out_dir)?;

        // Bowtie2 replaces % with the mate number.
        let unaligned = out_dir.join(format!("{}_%.nonhost.fastq.gz", sample));
        let mut cmd = Command::new(&self.bowtie2);
        cmd.arg("-p").arg(config.threads.to_string())
            .arg("-x").arg(&self.index)
            .arg("-1").arg(&pair.fwd).arg("-2").arg(&pair.rev)
            .arg("--very-sensitive")
            .arg("--un-conc-gz").arg(&unaligned)
            .args(["-S", "/dev/null"]);
        let output = runner.run(&mut cmd)?;
        let summary = Bowtie2Summary::parse(&output)?;

        let (out1, _) = PairPattern::NONHOST.paths(&out_dir, sample);
        let nonhost = fastx::count_reads(&out1)?;
        let mut metrics = Metrics::new();
        metrics.push("Input read pairs", summary.reads);
        metrics.push("Non-host read pairs", nonhost);
        metrics.push_percent("Host reads", summary.reads.saturating_sub(nonhost), summary.reads);
        metrics.push("Overall alignment rate", summary.overall_rate);
        Ok(metrics)
    }
}
