//! Annotation of antimicrobial resistance genes, virulence factors and mobile genetic elements
//! on the primary assembly. Every tool is optional, but at least one of them must be available.

use std::{
    path::{Path, PathBuf},
    process::Command,
};
use crate::{
    ext,
    err::Error,
    parse::table,
    pipeline::{
        tools,
        config::Config,
        metrics::Metrics,
        runner::ToolRunner,
        sample,
    },
};
use super::{Step, StepKind, assembly};

struct WithDb {
    exe: PathBuf,
    db: PathBuf,
}

pub struct AnnotationStep {
    abricate: Option<PathBuf>,
    amrfinder: Option<PathBuf>,
    amrfinder_db: Option<PathBuf>,
    rgi: Option<WithDb>,
    genomad: Option<WithDb>,
    plasmidfinder: Option<WithDb>,
}

fn with_db(config: &Config, name: &'static str, db: &Option<PathBuf>, key: &str, what: &str) -> Option<WithDb> {
    let exe = config.tools.optional(name)?;
    super::optional_db(db, key, what).map(|db| WithDb { exe, db })
}

impl AnnotationStep {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let dbs = &config.databases;
        let step = Self {
            abricate: config.tools.optional(tools::ABRICATE),
            amrfinder: config.tools.optional(tools::AMRFINDER),
            amrfinder_db: dbs.amrfinder.clone(),
            rgi: with_db(config, tools::RGI, &dbs.card_json, "CARD_JSON", "RGI annotation"),
            genomad: with_db(config, tools::GENOMAD, &dbs.genomad, "GENOMAD_DB", "geNomad annotation"),
            plasmidfinder: with_db(config, tools::PLASMIDFINDER, &dbs.plasmidfinder, "PLASMIDFINDER_DB",
                "PlasmidFinder annotation"),
        };
        if step.abricate.is_none() && step.amrfinder.is_none() && step.rgi.is_none() && step.genomad.is_none()
                && step.plasmidfinder.is_none() {
            return Err(Error::InvalidInput(format!("{}: no annotation tool is available", StepKind::Annotation.title())));
        }
        if step.abricate.is_some() && config.abricate_dbs.is_empty() {
            log::warn!("No Abricate databases selected (see ABRICATE_DBS)");
        }
        Ok(step)
    }
}

fn sample_dir(config: &Config, sample: &str) -> PathBuf {
    config.step_dir(StepKind::Annotation).join(sample)
}

fn abricate_path(config: &Config, sample: &str, db: &str) -> PathBuf {
    sample_dir(config, sample).join(format!("{}_abricate_{}.tsv", sample, db))
}

impl AnnotationStep {
    fn run_abricate(&self, exe: &Path, config: &Config, sample: &str, contigs: &Path, runner: &ToolRunner,
        metrics: &mut Metrics,
    ) -> Result<(), Error> {
        for db in config.abricate_dbs.iter() {
            let out = abricate_path(config, sample, db);
            let mut cmd = Command::new(exe);
            cmd.arg("--db").arg(db)
                .arg("--threads").arg(config.threads.to_string())
                .arg("--nopath")
                .arg(contigs);
            runner.run_to_file(&mut cmd, &out)?;
            metrics.push(format!("Abricate {} hits", db), table::count_rows(&out, false)?);
        }
        Ok(())
    }

    fn run_amrfinder(&self, exe: &Path, config: &Config, sample: &str, contigs: &Path, runner: &ToolRunner,
    ) -> Result<u64, Error> {
        let out = sample_dir(config, sample).join(format!("{}_amrfinder.tsv", sample));
        let mut cmd = Command::new(exe);
        cmd.arg("-n").arg(contigs)
            .arg("-o").arg(&out)
            .arg("--threads").arg(config.threads.to_string());
        if let Some(db) = &self.amrfinder_db {
            cmd.arg("-d").arg(db);
        }
        runner.run(&mut cmd)?;
        table::count_rows(&out, true)
    }

    /// RGI keeps the loaded database in the working directory, so both commands run inside the sample directory.
    fn run_rgi(&self, rgi: &WithDb, config: &Config, sample: &str, contigs: &Path, runner: &ToolRunner,
    ) -> Result<u64, Error> {
        let sdir = ext::sys::absolute(&sample_dir(config, sample))?;
        let card = ext::sys::absolute(&rgi.db)?;
        let mut cmd = Command::new(&rgi.exe);
        cmd.current_dir(&sdir).arg("load").arg("--card_json").arg(&card).arg("--local");
        runner.run(&mut cmd)?;

        let out_prefix = sdir.join(format!("{}_rgi", sample));
        let mut cmd = Command::new(&rgi.exe);
        cmd.current_dir(&sdir).arg("main")
            .arg("--input_sequence").arg(ext::sys::absolute(contigs)?)
            .arg("--output_file").arg(&out_prefix)
            .args(["--input_type", "contig", "--local", "--clean"])
            .arg("-n").arg(config.threads.to_string());
        runner.run(&mut cmd)?;
        if !config.keep_tmp {
            ext::sys::remove_path(&sdir.join("localDB"))?;
        }
        table::count_rows(&ext::sys::append_path(&out_prefix, ".txt"), true)
    }

    /// Returns the number of viruses and plasmids.
    fn run_genomad(&self, genomad: &WithDb, config: &Config, sample: &str, contigs: &Path, runner: &ToolRunner,
    ) -> Result<(u64, u64), Error> {
        let out_dir = sample_dir(config, sample).join("genomad");
        let mut cmd = Command::new(&genomad.exe);
        cmd.args(["end-to-end", "--cleanup"])
            .arg("--threads").arg(config.threads.to_string())
            .arg(contigs).arg(&out_dir).arg(&genomad.db);
        runner.run(&mut cmd)?;

        // geNomad names outputs after the input file.
        let stem = contigs.file_stem().and_then(|s| s.to_str()).unwrap_or("contigs");
        let summary_dir = out_dir.join(format!("{}_summary", stem));
        let count = |kind: &str| {
            let path = summary_dir.join(format!("{}_{}_summary.tsv", stem, kind));
            if path.exists() { table::count_rows(&path, true) } else { Ok(0) }
        };
        Ok((count("virus")?, count("plasmid")?))
    }

    fn run_plasmidfinder(&self, pf: &WithDb, config: &Config, sample: &str, contigs: &Path, runner: &ToolRunner,
    ) -> Result<u64, Error> {
        let out_dir = sample_dir(config, sample).join("plasmidfinder");
        ext::sys::mkdir(&out_dir)?;
        let mut cmd = Command::new(&pf.exe);
        cmd.arg("-i").arg(contigs)
            .arg("-o").arg(&out_dir)
            .arg("-p").arg(&pf.db)
            .arg("-x");
        runner.run(&mut cmd)?;
        let results = out_dir.join("results_tab.tsv");
        if results.exists() {
            table::count_rows(&results, true)
        } else {
            Err(Error::InvalidData(format!("PlasmidFinder did not produce {}", ext::fmt::path(&results))))
        }
    }
}

impl Step for AnnotationStep {
    fn kind(&self) -> StepKind {
        StepKind::Annotation
    }

    fn discover(&self, config: &Config) -> Result<Vec<String>, Error> {
        sample::discover_contigs(&config.step_dir(StepKind::Assembly))
    }

    fn check_inputs(&self, config: &Config, sample: &str) -> Result<(), String> {
        let contigs = assembly::contigs_path(config, sample);
        if contigs.is_file() {
            Ok(())
        } else {
            Err(format!("{} not found", ext::fmt::path(&contigs)))
        }
    }

    fn expected_outputs(&self, config: &Config, sample: &str) -> Vec<PathBuf> {
        let mut outputs = vec![sample_dir(config, sample)];
        if self.abricate.is_some() {
            outputs.extend(config.abricate_dbs.iter().map(|db| abricate_path(config, sample, db)));
        }
        outputs
    }

    fn run(&self, config: &Config, sample: &str, runner: &ToolRunner) -> Result<Metrics, Error> {
        let contigs = assembly::contigs_path(config, sample);
        ext::sys::mkdir(&sample_dir(config, sample))?;
        let mut metrics = Metrics::new();
        if let Some(abricate) = &self.abricate {
            self.run_abricate(abricate, config, sample, &contigs, runner, &mut metrics)?;
        }
        if let Some(amrfinder) = &self.amrfinder {
            metrics.push("AMRFinderPlus hits", self.run_amrfinder(amrfinder, config, sample, &contigs, runner)?);
        }
        if let Some(rgi) = &self.rgi {
            metrics.push("RGI hits", self.run_rgi(rgi, config, sample, &contigs, runner)?);
        }
        if let Some(genomad) = &self.genomad {
            let (viruses, plasmids) = self.run_genomad(genomad, config, sample, &contigs, runner)?;
            metrics.push("geNomad viruses", viruses);
            metrics.push("geNomad plasmids", plasmids);
        }
        if let Some(pf) = &self.plasmidfinder {
            metrics.push("PlasmidFinder hits", self.run_plasmidfinder(pf, config, sample, &contigs, runner)?);
        }
        Ok(metrics)
    }

    fn finalize(&self, config: &Config, samples: &[String]) -> Result<(), Error> {
        if self.abricate.is_none() || samples.is_empty() {
            return Ok(());
        }
        for db in config.abricate_dbs.iter() {
            let paths: Vec<(String, PathBuf)> = samples.iter()
                .map(|sample| (sample.clone(), abricate_path(config, sample, db)))
                .collect();
            let inputs: Vec<(String, &Path)> = paths.iter().map(|(s, p)| (s.clone(), p.as_path())).collect();
            let out = config.step_dir(StepKind::Annotation).join(format!("merged_abricate_{}.tsv", db));
            let n_hits = table::concat_with_sample(&inputs, &out)?;
            log::info!("Merged {} Abricate {} hits into {}", n_hits, db, ext::fmt::path(&out));
        }
        Ok(())
    }
}

