//! Taxonomic profiling with Kraken2, optionally refined by Bracken, and MetaPhlAn marker-gene profiling.

use std::{
    path::{Path, PathBuf},
    process::Command,
};
use crate::{
    ext,
    err::Error,
    parse::{
        kraken::{self, KrakenReport},
        table::MergedTable,
    },
    pipeline::{
        tools,
        config::Config,
        metrics::Metrics,
        runner::ToolRunner,
        sample::{self, PairPattern},
    },
};
use super::{Step, StepKind};

/// Name of the species × sample table.
pub const MERGED_SPECIES: &str = "merged_species.tsv";

struct Metaphlan {
    exe: PathBuf,
    db: PathBuf,
}

pub struct TaxonomyStep {
    kraken2: PathBuf,
    kraken_db: PathBuf,
    bracken: Option<PathBuf>,
    metaphlan: Option<Metaphlan>,
}

impl TaxonomyStep {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let kraken_db = super::require_db(&config.databases.kraken2, "KRAKEN2_DB", StepKind::Taxonomy)?.clone();
        let metaphlan = match config.tools.optional(tools::METAPHLAN) {
            Some(exe) => super::optional_db(&config.databases.metaphlan, "METAPHLAN_DB", "MetaPhlAn profiling")
                .map(|db| Metaphlan { exe, db }),
            None => None,
        };
        Ok(Self {
            kraken2: config.tools.require(tools::KRAKEN2)?,
            kraken_db,
            bracken: config.tools.optional(tools::BRACKEN),
            metaphlan,
        })
    }
}

fn sample_dir(config: &Config, sample: &str) -> PathBuf {
    config.step_dir(StepKind::Taxonomy).join(sample)
}

fn kraken_report(config: &Config, sample: &str) -> PathBuf {
    sample_dir(config, sample).join(format!("{}.kraken2.report", sample))
}

fn bracken_output(config: &Config, sample: &str) -> PathBuf {
    sample_dir(config, sample).join(format!("{}.bracken", sample))
}

/// Species abundances of the sample: Bracken estimates if available, Kraken2 clade counts otherwise.
fn load_species(config: &Config, sample: &str) -> Result<Vec<(String, u64)>, Error> {
    let bracken_path = bracken_output(config, sample);
    if bracken_path.exists() {
        kraken::load_bracken(&bracken_path)
    } else {
        let report = KrakenReport::load(&kraken_report(config, sample))?;
        Ok(report.species().map(|(name, reads)| (name.to_owned(), reads)).collect())
    }
}

impl TaxonomyStep {
    fn run_bracken(&self, bracken: &Path, config: &Config, sample: &str, runner: &ToolRunner) -> Result<(), Error> {
        let sdir = sample_dir(config, sample);
        let mut cmd = Command::new(bracken);
        cmd.arg("-d").arg(&self.kraken_db)
            .arg("-i").arg(kraken_report(config, sample))
            .arg("-o").arg(bracken_output(config, sample))
            .arg("-w").arg(sdir.join(format!("{}.bracken.report", sample)))
            .arg("-r").arg(config.bracken_read_len.to_string())
            .args(["-l", "S", "-t", "10"]);
        runner.run(&mut cmd)?;
        Ok(())
    }

    fn run_metaphlan(&self, metaphlan: &Metaphlan, config: &Config, sample: &str, fwd: &Path, rev: &Path,
        runner: &ToolRunner,
    ) -> Result<(), Error> {
        let sdir = sample_dir(config, sample);
        // MetaPhlAn refuses to overwrite its intermediate alignment file.
        let bt2_out = sdir.join(format!("{}.metaphlan.bowtie2.bz2", sample));
        ext::sys::remove_path(&bt2_out)?;
        let mut input = fwd.as_os_str().to_owned();
        input.push(",");
        input.push(rev.as_os_str());

        let mut cmd = Command::new(&metaphlan.exe);
        cmd.arg(&input)
            .args(["--input_type", "fastq"])
            .arg("--nproc").arg(config.threads.to_string())
            .arg("--bowtie2db").arg(&metaphlan.db)
            .arg("--bowtie2out").arg(&bt2_out)
            .arg("-o").arg(sdir.join(format!("{}_metaphlan.txt", sample)));
        runner.run(&mut cmd)?;
        if !config.keep_tmp {
            ext::sys::remove_path(&bt2_out)?;
        }
        Ok(())
    }
}

impl Step for TaxonomyStep {
    fn kind(&self) -> StepKind {
        StepKind::Taxonomy
    }

    fn discover(&self, config: &Config) -> Result<Vec<String>, Error> {
        sample::discover(&config.step_dir(StepKind::Host), &PairPattern::NONHOST)
    }

    fn check_inputs(&self, config: &Config, sample: &str) -> Result<(), String> {
        PairPattern::NONHOST.locate(&config.step_dir(StepKind::Host), sample).map(|_| ())
    }

    fn expected_outputs(&self, config: &Config, sample: &str) -> Vec<PathBuf> {
        vec![kraken_report(config, sample)]
    }

    fn run(&self, config: &Config, sample: &str, runner: &ToolRunner) -> Result<Metrics, Error> {
        let pair = PairPattern::NONHOST.locate(&config.step_dir(StepKind::Host), sample)
            .map_err(Error::InvalidInput)?;
        let sdir = sample_dir(config, sample);
        ext::sys::mkdir(&sdir)?;

        let report_path = kraken_report(config, sample);
        let per_read = sdir.join(format!("{}.kraken2.output", sample));
        let mut cmd = Command::new(&self.kraken2);
        cmd.arg("--db").arg(&self.kraken_db)
            .arg("--threads").arg(config.threads.to_string())
            .args(["--paired", "--gzip-compressed"])
            .arg("--report").arg(&report_path)
            .arg("--output").arg(&per_read)
            .arg(&pair.fwd).arg(&pair.rev);
        runner.run(&mut cmd)?;
        if !config.keep_tmp {
            ext::sys::remove_path(&per_read)?;
        }

        ext::sys::remove_path(&bracken_output(config, sample))?;
        if let Some(bracken) = &self.bracken {
            self.run_bracken(bracken, config, sample, runner)?;
        }
        if let Some(metaphlan) = &self.metaphlan {
            self.run_metaphlan(metaphlan, config, sample, &pair.fwd, &pair.rev, runner)?;
        }

        let report = KrakenReport::load(&report_path)?;
        let species = load_species(config, sample)?;
        let mut metrics = Metrics::new();
        metrics.push("Total reads", report.total());
        metrics.push("Classified reads", report.classified());
        metrics.push_percent("Classified", report.classified(), report.total());
        metrics.push("Species detected", species.iter().filter(|(_, reads)| *reads > 0).count());
        if let Some((name, reads)) = kraken::top_species(species.iter().map(|(name, reads)| (name.as_str(), *reads))) {
            metrics.push("Top species", format!("{} ({} reads)", name, reads));
        }
        Ok(metrics)
    }

    fn finalize(&self, config: &Config, samples: &[String]) -> Result<(), Error> {
        if samples.is_empty() {
            return Ok(());
        }
        let mut table = MergedTable::new();
        for sample in samples {
            let species = load_species(config, sample)?;
            table.add_sample(sample, species.into_iter().map(|(name, reads)| (name, reads.to_string())));
        }
        let path = config.step_dir(StepKind::Taxonomy).join(MERGED_SPECIES);
        table.save(&path, "species", "0")?;
        log::info!("Merged {} species across {} samples into {}", table.n_features(), samples.len(),
            ext::fmt::path(&path));
        Ok(())
    }
}
