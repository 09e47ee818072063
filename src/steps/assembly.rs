//! Metagenome assembly with MEGAHIT and/or metaSPAdes.
//! Contigs shorter than the minimal length are removed; the primary assembly `{sample}_contigs.fa`
//! is the MEGAHIT assembly if it was produced, and the metaSPAdes assembly otherwise.

use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};
use crate::{
    ext,
    err::{Error, add_path},
    parse::fastx::{self, ContigStats},
    pipeline::{
        tools,
        config::Config,
        metrics::Metrics,
        runner::ToolRunner,
        sample::{self, PairPattern, ReadPair},
    },
};
use super::{Step, StepKind};

pub struct AssemblyStep {
    megahit: Option<PathBuf>,
    spades: Option<PathBuf>,
}

impl AssemblyStep {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let megahit = if config.assembler.runs_megahit() { Some(config.tools.require(tools::MEGAHIT)?) } else { None };
        let spades = if config.assembler.runs_spades() { Some(config.tools.require(tools::METASPADES)?) } else { None };
        Ok(Self { megahit, spades })
    }

    fn run_megahit(&self, exe: &Path, config: &Config, pair: &ReadPair, work_dir: &Path, runner: &ToolRunner,
    ) -> Result<PathBuf, Error> {
        let out_dir = work_dir.join("megahit");
        // MEGAHIT fails if the output directory exists.
        ext::sys::remove_path(&out_dir)?;
        let mut cmd = Command::new(exe);
        cmd.arg("-1").arg(&pair.fwd).arg("-2").arg(&pair.rev)
            .arg("-o").arg(&out_dir)
            .arg("-t").arg(config.threads.to_string())
            .arg("-m").arg(config.memory_bytes().to_string())
            .arg("--min-contig-len").arg(config.min_contig_len.to_string());
        runner.run(&mut cmd)?;
        Ok(out_dir.join("final.contigs.fa"))
    }

    fn run_spades(&self, exe: &Path, config: &Config, pair: &ReadPair, work_dir: &Path, runner: &ToolRunner,
    ) -> Result<PathBuf, Error> {
        let out_dir = work_dir.join("metaspades");
        // Leftovers of an interrupted run would make metaSPAdes continue from them.
        ext::sys::remove_path(&out_dir)?;
        let mut cmd = Command::new(exe);
        cmd.arg("-1").arg(&pair.fwd).arg("-2").arg(&pair.rev)
            .arg("-o").arg(&out_dir)
            .arg("-t").arg(config.threads.to_string())
            .arg("-m").arg(config.memory_gb.to_string());
        runner.run(&mut cmd)?;
        Ok(out_dir.join("contigs.fasta"))
    }
}

/// Primary assembly of the sample.
pub fn contigs_path(config: &Config, sample: &str) -> PathBuf {
    config.step_dir(StepKind::Assembly).join(format!("{}_contigs.fa", sample))
}

fn assembler_contigs(config: &Config, sample: &str, assembler: &str) -> PathBuf {
    config.step_dir(StepKind::Assembly).join(format!("{}_{}_contigs.fa", sample, assembler))
}

fn push_stats(metrics: &mut Metrics, prefix: &str, stats: &ContigStats) {
    metrics.push(format!("{}Contigs", prefix), stats.n_contigs);
    metrics.push(format!("{}Total length", prefix), stats.total_len);
    metrics.push(format!("{}N50", prefix), stats.n50);
    metrics.push(format!("{}Longest contig", prefix), stats.longest);
}

impl Step for AssemblyStep {
    fn kind(&self) -> StepKind {
        StepKind::Assembly
    }

    fn discover(&self, config: &Config) -> Result<Vec<String>, Error> {
        sample::discover(&config.step_dir(StepKind::Host), &PairPattern::NONHOST)
    }

    fn check_inputs(&self, config: &Config, sample: &str) -> Result<(), String> {
        PairPattern::NONHOST.locate(&config.step_dir(StepKind::Host), sample).map(|_| ())
    }

    fn expected_outputs(&self, config: &Config, sample: &str) -> Vec<PathBuf> {
        let mut outputs = vec![contigs_path(config, sample)];
        if self.megahit.is_some() {
            outputs.push(assembler_contigs(config, sample, "megahit"));
        }
        if self.spades.is_some() {
            outputs.push(assembler_contigs(config, sample, "spades"));
        }
        outputs
    }

    fn run(&self, config: &Config, sample: &str, runner: &ToolRunner) -> Result<Metrics, Error> {
        let pair = PairPattern::NONHOST.locate(&config.step_dir(StepKind::Host), sample)
            .map_err(Error::InvalidInput)?;
        let work_dir = config.step_dir(StepKind::Assembly).join(sample);
        ext::sys::mkdir(&work_dir)?;
        let min_len = u64::from(config.min_contig_len);

        let mut assemblies: Vec<(&str, PathBuf, ContigStats)> = Vec::new();
        if let Some(exe) = &self.megahit {
            let raw = self.run_megahit(exe, config, &pair, &work_dir, runner)?;
            let filtered = assembler_contigs(config, sample, "megahit");
            let stats = fastx::filter_by_length(&raw, &filtered, min_len)?;
            assemblies.push(("MEGAHIT", filtered, stats));
        }
        if let Some(exe) = &self.spades {
            let raw = self.run_spades(exe, config, &pair, &work_dir, runner)?;
            let filtered = assembler_contigs(config, sample, "spades");
            let stats = fastx::filter_by_length(&raw, &filtered, min_len)?;
            assemblies.push(("metaSPAdes", filtered, stats));
        }

        let (primary_name, primary_path, primary_stats) = assemblies.first()
            .ok_or_else(|| Error::RuntimeError("No assembler selected".to_string()))?;
        let contigs = contigs_path(config, sample);
        let tmp_contigs = ext::sys::append_path(&contigs, ".tmp");
        fs::copy(primary_path, &tmp_contigs).map_err(add_path!(primary_path, tmp_contigs))?;
        fs::rename(&tmp_contigs, &contigs).map_err(add_path!(tmp_contigs, contigs))?;
        if primary_stats.n_contigs == 0 {
            log::warn!("[{}] {} produced no contigs of length >= {}", sample, primary_name, min_len);
        }

        let mut metrics = Metrics::new();
        metrics.push("Assembler", primary_name);
        push_stats(&mut metrics, "", primary_stats);
        for (name, _, stats) in assemblies.iter().skip(1) {
            push_stats(&mut metrics, &format!("{} ", name), stats);
        }
        if !config.keep_tmp {
            ext::sys::remove_path(&work_dir)?;
        }
        Ok(metrics)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use crate::pipeline::config::ConfigBuilder;

    /// Fake metaSPAdes that refuses to start in an existing output directory.
    fn fake_spades(path: &Path) {
        fs::write(path, "#!/bin/sh
while [ $# -gt 0 ]; do
  case \"$1\" in
    -o) OUT=\"$2\" ;;
  esac
  shift
done
if [ -e \"$OUT\" ]; then echo \"$OUT already exists\" >&2; exit 1; fi
mkdir -p \"$OUT\"
printf '>NODE_1_length_8\\nACGTACGT\\n>NODE_2_length_2\\nAC\\n>NODE_3_length_6\\nAAACCC\\n' > \"$OUT/contigs.fasta\"
").unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn stale_spades_output_is_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let spades = dir.path().join("metaspades.py");
        fake_spades(&spades);
        let output = dir.path().join("out");
        let config = ConfigBuilder::new()
            .set("INPUT_DIR", dir.path().to_str().unwrap())
            .set("OUTPUT_DIR", output.to_str().unwrap())
            .set("ASSEMBLER", "spades")
            .set("MIN_CONTIG_LEN", "5")
            .set(tools::exe_key(tools::METASPADES), spades.to_str().unwrap())
            .build().unwrap();
        let host_dir = config.step_dir(StepKind::Host);
        fs::create_dir_all(&host_dir).unwrap();
        let (fwd, rev) = PairPattern::NONHOST.paths(&host_dir, "s1");
        fs::write(&fwd, "").unwrap();
        fs::write(&rev, "").unwrap();
        // Output of an interrupted run.
        let stale_dir = config.step_dir(StepKind::Assembly).join("s1").join("metaspades");
        fs::create_dir_all(&stale_dir).unwrap();
        fs::write(stale_dir.join("params.txt"), "old").unwrap();

        let step = AssemblyStep::new(&config).unwrap();
        let runner = ToolRunner::new(config.log_path(StepKind::Assembly, "s1")).unwrap();
        let metrics = step.run(&config, "s1", &runner).unwrap();
        assert_eq!(metrics.get("Assembler"), Some("metaSPAdes"));
        assert_eq!(metrics.get("Contigs"), Some("2"));
        assert_eq!(metrics.get("N50"), Some("8"));
        assert_eq!(fs::read_to_string(contigs_path(&config, "s1")).unwrap(),
            ">NODE_1_length_8\nACGTACGT\n>NODE_3_length_6\nAAACCC\n");
        for path in step.expected_outputs(&config, "s1") {
            assert!(path.exists(), "{} is missing", path.display());
        }
        // Working directory is removed without KEEP_TMP.
        assert!(!stale_dir.exists());
    }
}
