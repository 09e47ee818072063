//! Functional profiling with HUMAnN. HUMAnN does not use pairing information, so both mates are concatenated.

use std::{
    path::PathBuf,
    process::Command,
};
use crate::{
    ext,
    err::Error,
    parse::{humann, table::MergedTable},
    pipeline::{
        tools,
        config::Config,
        metrics::Metrics,
        runner::ToolRunner,
        sample::{self, PairPattern},
    },
};
use super::{Step, StepKind};

pub const MERGED_PATHWAYS: &str = "merged_pathabundance.tsv";

pub struct FunctionalStep {
    humann: PathBuf,
    nucleotide_db: Option<PathBuf>,
    protein_db: Option<PathBuf>,
}

impl FunctionalStep {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let dbs = &config.databases;
        if dbs.humann_nucleotide.is_none() || dbs.humann_protein.is_none() {
            log::info!("HUMAnN databases are not fully configured, HUMAnN defaults will be used");
        }
        Ok(Self {
            humann: config.tools.require(tools::HUMANN)?,
            nucleotide_db: dbs.humann_nucleotide.clone(),
            protein_db: dbs.humann_protein.clone(),
        })
    }
}

fn sample_dir(config: &Config, sample: &str) -> PathBuf {
    config.step_dir(StepKind::Functional).join(sample)
}

fn table_path(config: &Config, sample: &str, table: &str) -> PathBuf {
    sample_dir(config, sample).join(format!("{}_{}.tsv", sample, table))
}

impl Step for FunctionalStep {
    fn kind(&self) -> StepKind {
        StepKind::Functional
    }

    fn discover(&self, config: &Config) -> Result<Vec<String>, Error> {
        sample::discover(&config.step_dir(StepKind::Host), &PairPattern::NONHOST)
    }

    fn check_inputs(&self, config: &Config, sample: &str) -> Result<(), String> {
        PairPattern::NONHOST.locate(&config.step_dir(StepKind::Host), sample).map(|_| ())
    }

    fn expected_outputs(&self, config: &Config, sample: &str) -> Vec<PathBuf> {
        vec![table_path(config, sample, "genefamilies"), table_path(config, sample, "pathabundance")]
    }

    fn run(&self, config: &Config, sample: &str, runner: &ToolRunner) -> Result<Metrics, Error> {
        let pair = PairPattern::NONHOST.locate(&config.step_dir(StepKind::Host), sample)
            .map_err(Error::InvalidInput)?;
        let sdir = sample_dir(config, sample);
        ext::sys::mkdir(&sdir)?;
        let concat = sdir.join(format!("{}_concat.fastq.gz", sample));
        ext::sys::concat_files(&[pair.fwd.as_path(), pair.rev.as_path()], &concat)?;

        let mut cmd = Command::new(&self.humann);
        cmd.arg("--input").arg(&concat)
            .arg("--output").arg(&sdir)
            .arg("--threads").arg(config.threads.to_string())
            .arg("--output-basename").arg(sample);
        if let Some(db) = &self.nucleotide_db {
            cmd.arg("--nucleotide-database").arg(db);
        }
        if let Some(db) = &self.protein_db {
            cmd.arg("--protein-database").arg(db);
        }
        cmd.arg("--remove-temp-output");
        let res = runner.run(&mut cmd);
        if !config.keep_tmp {
            ext::sys::remove_path(&concat)?;
        }
        res?;

        let mut metrics = Metrics::new();
        metrics.push("Gene families", humann::count_features(&table_path(config, sample, "genefamilies"))?);
        metrics.push("Pathways", humann::count_features(&table_path(config, sample, "pathabundance"))?);
        Ok(metrics)
    }

    fn finalize(&self, config: &Config, samples: &[String]) -> Result<(), Error> {
        if samples.is_empty() {
            return Ok(());
        }
        let mut table = MergedTable::new();
        for sample in samples {
            table.add_sample(sample, humann::load_unstratified(&table_path(config, sample, "pathabundance"))?);
        }
        let path = config.step_dir(StepKind::Functional).join(MERGED_PATHWAYS);
        table.save(&path, "pathway", "0")?;
        log::info!("Merged {} pathways across {} samples into {}", table.n_features(), samples.len(),
            ext::fmt::path(&path));
        Ok(())
    }
}
