//! Pipeline steps. Each step processes one sample at a time, reading the output of the previous steps.

pub mod qc;
pub mod host;
pub mod taxonomy;
pub mod functional;
pub mod assembly;
pub mod binning;
pub mod annotation;

use std::{
    fmt,
    path::PathBuf,
    str::FromStr,
};
use crate::{
    err::Error,
    pipeline::{
        config::Config,
        metrics::Metrics,
        runner::ToolRunner,
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StepKind {
    Qc,
    Host,
    Taxonomy,
    Functional,
    Assembly,
    Binning,
    Annotation,
}

impl StepKind {
    /// All steps in the order of execution.
    pub const ALL: [StepKind; 7] = [
        Self::Qc, Self::Host, Self::Taxonomy, Self::Functional, Self::Assembly, Self::Binning, Self::Annotation,
    ];

    /// Short name, used on the command line and in status records.
    pub fn name(self) -> &'static str {
        match self {
            Self::Qc => "qc",
            Self::Host => "host",
            Self::Taxonomy => "taxonomy",
            Self::Functional => "functional",
            Self::Assembly => "assembly",
            Self::Binning => "binning",
            Self::Annotation => "annotation",
        }
    }

    /// Output subdirectory.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Qc => "01_qc",
            Self::Host => "02_host_removal",
            Self::Taxonomy => "03_taxonomy",
            Self::Functional => "04_functional",
            Self::Assembly => "05_assembly",
            Self::Binning => "06_binning",
            Self::Annotation => "07_annotation",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Qc => "Quality control and trimming",
            Self::Host => "Host read removal",
            Self::Taxonomy => "Taxonomic profiling",
            Self::Functional => "Functional profiling",
            Self::Assembly => "Metagenome assembly",
            Self::Binning => "Genome binning",
            Self::Annotation => "ARG, virulence and MGE annotation",
        }
    }

    /// Parses comma-separated list of steps, `all` selects every step.
    /// Steps are returned in the order of execution, without duplicates.
    pub fn parse_list(s: &str) -> Result<Vec<Self>, String> {
        let mut steps = Vec::new();
        for part in s.split(',').map(str::trim).filter(|part| !part.is_empty()) {
            if part.eq_ignore_ascii_case("all") {
                steps.extend_from_slice(&Self::ALL);
            } else {
                steps.push(part.parse()?);
            }
        }
        if steps.is_empty() {
            return Err(format!("No steps selected in {:?}", s));
        }
        steps.sort();
        steps.dedup();
        Ok(steps)
    }
}

impl FromStr for StepKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match &s.to_lowercase() as &str {
            "qc" | "1" | "01_qc" | "trim" => Ok(Self::Qc),
            "host" | "2" | "02_host_removal" | "host_removal" => Ok(Self::Host),
            "taxonomy" | "3" | "03_taxonomy" | "tax" => Ok(Self::Taxonomy),
            "functional" | "4" | "04_functional" | "func" => Ok(Self::Functional),
            "assembly" | "5" | "05_assembly" | "asm" => Ok(Self::Assembly),
            "binning" | "6" | "06_binning" | "bins" => Ok(Self::Binning),
            "annotation" | "7" | "07_annotation" | "arg" | "amr" => Ok(Self::Annotation),
            _ => Err(format!("Unknown step {:?} (allowed values: {})", s,
                Self::ALL.iter().map(|step| step.name()).collect::<Vec<_>>().join(", "))),
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One pipeline step with its executables already resolved.
pub trait Step {
    fn kind(&self) -> StepKind;

    /// Finds all samples, available in the input directory of the step, in filename-sorted order.
    fn discover(&self, config: &Config) -> Result<Vec<String>, Error>;

    /// Checks that all inputs of the sample are present. Returns the reason otherwise.
    fn check_inputs(&self, config: &Config, sample: &str) -> Result<(), String>;

    /// Files, that must exist after a successful run.
    fn expected_outputs(&self, config: &Config, sample: &str) -> Vec<PathBuf>;

    /// Runs the step on a single sample and returns derived metrics.
    fn run(&self, config: &Config, sample: &str, runner: &ToolRunner) -> Result<Metrics, Error>;

    /// Called once after all samples were processed, with the list of successfully completed samples.
    fn finalize(&self, _config: &Config, _samples: &[String]) -> Result<(), Error> {
        Ok(())
    }
}

/// Resolves executables and databases of the step.
/// Fails if a required executable or database is not available.
pub fn prepare(kind: StepKind, config: &Config) -> Result<Box<dyn Step>, Error> {
    Ok(match kind {
        StepKind::Qc => Box::new(qc::QcStep::new(config)?),
        StepKind::Host => Box::new(host::HostStep::new(config)?),
        StepKind::Taxonomy => Box::new(taxonomy::TaxonomyStep::new(config)?),
        StepKind::Functional => Box::new(functional::FunctionalStep::new(config)?),
        StepKind::Assembly => Box::new(assembly::AssemblyStep::new(config)?),
        StepKind::Binning => Box::new(binning::BinningStep::new(config)?),
        StepKind::Annotation => Box::new(annotation::AnnotationStep::new(config)?),
    })
}

/// Returns the database or a fatal error, if it was not configured.
fn require_db<'a>(db: &'a Option<PathBuf>, key: &str, step: StepKind) -> Result<&'a PathBuf, Error> {
    db.as_ref().ok_or_else(|| Error::InvalidInput(format!(
        "{} requires database {} (set it in the configuration file or with --set {}=PATH)",
        step.title(), key, key)))
}

/// Returns the database, if it is configured, and warns otherwise.
fn optional_db(db: &Option<PathBuf>, key: &str, what: &str) -> Option<PathBuf> {
    if db.is_none() {
        log::warn!("Database {} is not set, {} will be skipped", key, what);
    }
    db.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_names() {
        for step in StepKind::ALL {
            assert_eq!(step.name().parse::<StepKind>().unwrap(), step);
            assert_eq!(step.dir_name().parse::<StepKind>().unwrap(), step);
        }
        assert_eq!(StepKind::parse_list("assembly, qc,qc").unwrap(), vec![StepKind::Qc, StepKind::Assembly]);
        assert_eq!(StepKind::parse_list("all").unwrap().len(), 7);
        assert!(StepKind::parse_list("qc,fold").is_err());
        assert!(StepKind::parse_list(",").is_err());
    }
}
