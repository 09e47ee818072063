//! Names of the external executables and their resolution.

use std::{
    collections::BTreeMap,
    path::PathBuf,
};
use crate::{
    Error,
    ext,
};

pub const FASTQC: &str = "fastqc";
pub const FASTP: &str = "fastp";
pub const BOWTIE2: &str = "bowtie2";
pub const BOWTIE2_BUILD: &str = "bowtie2-build";
pub const SAMTOOLS: &str = "samtools";
pub const KRAKEN2: &str = "kraken2";
pub const BRACKEN: &str = "bracken";
pub const METAPHLAN: &str = "metaphlan";
pub const HUMANN: &str = "humann";
pub const MEGAHIT: &str = "megahit";
pub const METASPADES: &str = "metaspades.py";
pub const JGI_DEPTHS: &str = "jgi_summarize_bam_contig_depths";
pub const METABAT2: &str = "metabat2";
pub const MAXBIN2: &str = "run_MaxBin.pl";
pub const CHECKM: &str = "checkm";
pub const GTDBTK: &str = "gtdbtk";
pub const ABRICATE: &str = "abricate";
pub const AMRFINDER: &str = "amrfinder";
pub const RGI: &str = "rgi";
pub const GENOMAD: &str = "genomad";
pub const PLASMIDFINDER: &str = "plasmidfinder.py";

/// All executables, in the order of pipeline steps.
pub const ALL: [&str; 21] = [
    FASTQC, FASTP, BOWTIE2, BOWTIE2_BUILD, SAMTOOLS, KRAKEN2, BRACKEN, METAPHLAN, HUMANN, MEGAHIT, METASPADES,
    JGI_DEPTHS, METABAT2, MAXBIN2, CHECKM, GTDBTK, ABRICATE, AMRFINDER, RGI, GENOMAD, PLASMIDFINDER,
];

/// Configuration key, that overrides the executable: `bowtie2-build` -> `BOWTIE2_BUILD_EXE`.
pub fn exe_key(name: &str) -> String {
    let mut key: String = name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    key.push_str("_EXE");
    key
}

#[derive(Clone, Debug)]
enum Override {
    Path(PathBuf),
    /// Executable is explicitly turned off (value `none`).
    Disabled,
}

/// Executables, possibly redirected to user-provided paths.
#[derive(Clone, Debug, Default)]
pub struct Tools {
    overrides: BTreeMap<&'static str, Override>,
}

impl Tools {
    /// Sets executable from a configuration key (see `exe_key`).
    /// Returns false if the key does not correspond to any executable.
    pub fn set_from_key(&mut self, key: &str, value: &str) -> bool {
        match ALL.iter().find(|name| exe_key(name) == key) {
            Some(&name) => {
                self.set(name, value);
                true
            }
            None => false,
        }
    }

    /// Sets executable by its name. Returns false if the name is unknown.
    pub fn set_from_name(&mut self, name: &str, value: &str) -> bool {
        match ALL.iter().find(|&&known| known == name) {
            Some(&name) => {
                self.set(name, value);
                true
            }
            None => false,
        }
    }

    fn set(&mut self, name: &'static str, value: &str) {
        let value = value.trim();
        let over = if value.eq_ignore_ascii_case("none") || value.is_empty() {
            Override::Disabled
        } else {
            Override::Path(PathBuf::from(value))
        };
        self.overrides.insert(name, over);
    }

    /// Finds the executable, returns error if it is not available or disabled.
    pub fn require(&self, name: &'static str) -> Result<PathBuf, Error> {
        match self.overrides.get(name) {
            Some(Override::Path(path)) => ext::sys::find_exe(path),
            Some(Override::Disabled) => Err(Error::InvalidInput(format!(
                "Executable {} is required, but was disabled via {}", name, exe_key(name)))),
            None => ext::sys::find_exe(name),
        }
    }

    /// Finds the executable, but only warns if it is not available.
    pub fn optional(&self, name: &'static str) -> Option<PathBuf> {
        if let Some(Override::Disabled) = self.overrides.get(name) {
            log::debug!("Executable {} is disabled", name);
            return None;
        }
        match self.require(name) {
            Ok(path) => Some(path),
            Err(_) => {
                log::warn!("Executable {} is not found, corresponding analysis will be skipped", name);
                None
            }
        }
    }

    /// Describes where each executable would be taken from.
    pub fn describe(&self) -> Vec<(&'static str, Result<PathBuf, Error>)> {
        ALL.iter().map(|&name| (name, self.require(name))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys() {
        assert_eq!(exe_key(BOWTIE2_BUILD), "BOWTIE2_BUILD_EXE");
        assert_eq!(exe_key(METASPADES), "METASPADES_PY_EXE");
        assert_eq!(exe_key(MAXBIN2), "RUN_MAXBIN_PL_EXE");
    }

    #[test]
    fn disabled_tools() {
        let mut tools = Tools::default();
        assert!(tools.set_from_key("FASTQC_EXE", "none"));
        assert!(!tools.set_from_key("FASTQ_EXE", "none"));
        assert!(tools.optional(FASTQC).is_none());
        assert!(tools.require(FASTQC).is_err());
        assert!(tools.set_from_name(FASTP, "/nonexistent/dir/fastp"));
        assert!(matches!(tools.require(FASTP), Err(Error::NoExec(_))));
    }
}
