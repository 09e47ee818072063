//! Genome binning. Non-host reads are mapped back to the primary assembly, contig depths are summarized,
//! and contigs are binned with MetaBAT2 (and MaxBin2, if available).
//! MetaBAT2 bins are evaluated with CheckM and classified with GTDB-Tk when these tools are available.

use std::{
    path::{Path, PathBuf},
    process::Command,
};
use crate::{
    ext,
    err::{Error, add_path},
    parse::{depth, table, checkm::{self, BinQuality}},
    pipeline::{
        tools,
        config::Config,
        metrics::Metrics,
        runner::ToolRunner,
        sample::{self, PairPattern},
    },
};
use super::{Step, StepKind, assembly};

/// Minimal contig length for MetaBAT2.
const METABAT_MIN_CONTIG: u32 = 1500;

struct WithDb {
    exe: PathBuf,
    db: Option<PathBuf>,
}

pub struct BinningStep {
    bowtie2_build: PathBuf,
    bowtie2: PathBuf,
    samtools: PathBuf,
    jgi_depths: PathBuf,
    metabat2: PathBuf,
    maxbin2: Option<PathBuf>,
    checkm: Option<WithDb>,
    gtdbtk: Option<WithDb>,
}

impl BinningStep {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let dbs = &config.databases;
        let gtdbtk = match config.tools.optional(tools::GTDBTK) {
            Some(exe) => super::optional_db(&dbs.gtdbtk, "GTDBTK_DATA_PATH", "GTDB-Tk classification")
                .map(|db| WithDb { exe, db: Some(db) }),
            None => None,
        };
        Ok(Self {
            bowtie2_build: config.tools.require(tools::BOWTIE2_BUILD)?,
            bowtie2: config.tools.require(tools::BOWTIE2)?,
            samtools: config.tools.require(tools::SAMTOOLS)?,
            jgi_depths: config.tools.require(tools::JGI_DEPTHS)?,
            metabat2: config.tools.require(tools::METABAT2)?,
            maxbin2: config.tools.optional(tools::MAXBIN2),
            // CheckM can use its own data root, configured with `checkm data setRoot`.
            checkm: config.tools.optional(tools::CHECKM).map(|exe| WithDb { exe, db: dbs.checkm.clone() }),
            gtdbtk,
        })
    }
}

fn sample_dir(config: &Config, sample: &str) -> PathBuf {
    config.step_dir(StepKind::Binning).join(sample)
}

/// Number of bins (files with the extension) in the directory.
fn count_bins(dir: &Path, extension: &str) -> Result<usize, Error> {
    ext::sys::filenames_with_ext(dir, extension).map(|v| v.len()).map_err(add_path!(dir))
}

impl BinningStep {
    /// Maps reads to the contigs and writes the depth table.
    fn summarize_depth(&self, config: &Config, sample: &str, contigs: &Path, runner: &ToolRunner,
    ) -> Result<PathBuf, Error> {
        let pair = PairPattern::NONHOST.locate(&config.step_dir(StepKind::Host), sample)
            .map_err(Error::InvalidInput)?;
        let sdir = sample_dir(config, sample);
        let threads = config.threads.to_string();

        let index_dir = sdir.join("index");
        ext::sys::mkdir(&index_dir)?;
        let index = index_dir.join("contigs");
        let mut cmd = Command::new(&self.bowtie2_build);
        cmd.arg("--threads").arg(&threads).arg(contigs).arg(&index);
        runner.run(&mut cmd)?;

        let bam = sdir.join(format!("{}.sorted.bam", sample));
        let mut bowtie2 = Command::new(&self.bowtie2);
        bowtie2.arg("-p").arg(&threads)
            .arg("-x").arg(&index)
            .arg("-1").arg(&pair.fwd).arg("-2").arg(&pair.rev)
            .arg("--no-unal");
        let mut sort = Command::new(&self.samtools);
        sort.arg("sort").arg("-@").arg(&threads).arg("-o").arg(&bam).arg("-");
        runner.run_piped(&mut bowtie2, &mut sort)?;

        let mut cmd = Command::new(&self.samtools);
        cmd.arg("index").arg(&bam);
        runner.run(&mut cmd)?;

        let depth = sdir.join("depth.txt");
        let mut cmd = Command::new(&self.jgi_depths);
        cmd.arg("--outputDepth").arg(&depth).arg(&bam);
        runner.run(&mut cmd)?;

        if !config.keep_tmp {
            ext::sys::remove_path(&index_dir)?;
            ext::sys::remove_path(&bam)?;
            ext::sys::remove_path(&ext::sys::append_path(&bam, ".bai"))?;
        }
        Ok(depth)
    }

    fn run_maxbin(&self, exe: &Path, config: &Config, sample: &str, contigs: &Path, depth: &Path,
        runner: &ToolRunner,
    ) -> Result<usize, Error> {
        let sdir = sample_dir(config, sample);
        let abundance = sdir.join("abundance.txt");
        depth::write_abundance(depth, &abundance)?;
        let out_dir = sdir.join("maxbin2");
        ext::sys::remove_path(&out_dir)?;
        ext::sys::mkdir(&out_dir)?;
        let mut cmd = Command::new(exe);
        cmd.arg("-contig").arg(contigs)
            .arg("-abund").arg(&abundance)
            .arg("-out").arg(out_dir.join("bin"))
            .arg("-thread").arg(config.threads.to_string());
        runner.run(&mut cmd)?;
        count_bins(&out_dir, "fasta")
    }

    /// Returns the number of high- and medium-quality bins.
    fn run_checkm(&self, checkm: &WithDb, config: &Config, sample: &str, bins_dir: &Path, runner: &ToolRunner,
    ) -> Result<(usize, usize), Error> {
        let sdir = sample_dir(config, sample);
        let work_dir = sdir.join("checkm");
        ext::sys::remove_path(&work_dir)?;
        let table_path = sdir.join("checkm.tsv");
        let mut cmd = Command::new(&checkm.exe);
        if let Some(db) = &checkm.db {
            cmd.env("CHECKM_DATA_PATH", db);
        }
        cmd.arg("lineage_wf")
            .arg("-t").arg(config.threads.to_string())
            .args(["-x", "fa", "--tab_table"])
            .arg("-f").arg(&table_path)
            .arg(bins_dir).arg(&work_dir);
        runner.run(&mut cmd)?;
        if !config.keep_tmp {
            ext::sys::remove_path(&work_dir)?;
        }

        let bins = checkm::load_bins(&table_path)?;
        for bin in bins.iter() {
            log::debug!("[{}] {}: completeness {}, contamination {}, {:?} quality",
                sample, bin.id, bin.completeness, bin.contamination, bin.quality());
        }
        let high = bins.iter().filter(|b| b.quality() == BinQuality::High).count();
        let medium = bins.iter().filter(|b| b.quality() == BinQuality::Medium).count();
        Ok((high, medium))
    }

    /// Returns the number of classified bins.
    fn run_gtdbtk(&self, gtdbtk: &WithDb, config: &Config, sample: &str, bins_dir: &Path, runner: &ToolRunner,
    ) -> Result<u64, Error> {
        let out_dir = sample_dir(config, sample).join("gtdbtk");
        let mut cmd = Command::new(&gtdbtk.exe);
        if let Some(db) = &gtdbtk.db {
            cmd.env("GTDBTK_DATA_PATH", db);
        }
        cmd.arg("classify_wf")
            .arg("--genome_dir").arg(bins_dir)
            .arg("--out_dir").arg(&out_dir)
            .args(["--extension", "fa", "--skip_ani_screen"])
            .arg("--cpus").arg(config.threads.to_string());
        runner.run(&mut cmd)?;
        let mut classified = 0;
        for domain in ["bac120", "ar53"] {
            let summary = out_dir.join(format!("gtdbtk.{}.summary.tsv", domain));
            if summary.exists() {
                classified += table::count_rows(&summary, true)?;
            }
        }
        Ok(classified)
    }
}

impl Step for BinningStep {
    fn kind(&self) -> StepKind {
        StepKind::Binning
    }

    fn discover(&self, config: &Config) -> Result<Vec<String>, Error> {
        let samples = sample::discover(&config.step_dir(StepKind::Host), &PairPattern::NONHOST)?;
        Ok(samples.into_iter().filter(|s| assembly::contigs_path(config, s).is_file()).collect())
    }

    fn check_inputs(&self, config: &Config, sample: &str) -> Result<(), String> {
        PairPattern::NONHOST.locate(&config.step_dir(StepKind::Host), sample)?;
        let contigs = assembly::contigs_path(config, sample);
        if contigs.is_file() {
            Ok(())
        } else {
            Err(format!("{} not found", ext::fmt::path(&contigs)))
        }
    }

    fn expected_outputs(&self, config: &Config, sample: &str) -> Vec<PathBuf> {
        let sdir = sample_dir(config, sample);
        vec![sdir.join("depth.txt"), sdir.join("metabat2")]
    }

    fn run(&self, config: &Config, sample: &str, runner: &ToolRunner) -> Result<Metrics, Error> {
        let contigs = assembly::contigs_path(config, sample);
        let sdir = sample_dir(config, sample);
        ext::sys::mkdir(&sdir)?;
        let depth = self.summarize_depth(config, sample, &contigs, runner)?;

        let bins_dir = sdir.join("metabat2");
        ext::sys::remove_path(&bins_dir)?;
        ext::sys::mkdir(&bins_dir)?;
        let mut cmd = Command::new(&self.metabat2);
        cmd.arg("-i").arg(&contigs)
            .arg("-a").arg(&depth)
            .arg("-o").arg(bins_dir.join("bin"))
            .arg("-t").arg(config.threads.to_string())
            .arg("-m").arg(METABAT_MIN_CONTIG.to_string());
        runner.run(&mut cmd)?;
        let n_metabat = count_bins(&bins_dir, "fa")?;

        let mut metrics = Metrics::new();
        metrics.push("MetaBAT2 bins", n_metabat);
        if let Some(maxbin2) = &self.maxbin2 {
            let n_maxbin = self.run_maxbin(maxbin2, config, sample, &contigs, &depth, runner)?;
            metrics.push("MaxBin2 bins", n_maxbin);
        }
        if n_metabat == 0 {
            log::warn!("[{}] MetaBAT2 produced no bins, bin evaluation is skipped", sample);
            return Ok(metrics);
        }
        if let Some(checkm) = &self.checkm {
            let (high, medium) = self.run_checkm(checkm, config, sample, &bins_dir, runner)?;
            metrics.push("High-quality bins", high);
            metrics.push("Medium-quality bins", medium);
        }
        if let Some(gtdbtk) = &self.gtdbtk {
            let classified = self.run_gtdbtk(gtdbtk, config, sample, &bins_dir, runner)?;
            metrics.push("GTDB-Tk classified bins", classified);
        }
        Ok(metrics)
    }
}
