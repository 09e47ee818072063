//! Sample discovery by the file naming convention.

use std::{
    fs,
    collections::HashSet,
    path::{Path, PathBuf},
};
use crate::{
    ext,
    err::{Error, add_path},
};

/// Pair of read files of one sample.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadPair {
    pub name: String,
    pub fwd: PathBuf,
    pub rev: PathBuf,
}

/// Naming convention of paired read files: `{sample}{fwd_suffix}` and `{sample}{rev_suffix}`.
#[derive(Clone, Copy, Debug)]
pub struct PairPattern {
    pub fwd_suffix: &'static str,
    pub rev_suffix: &'static str,
}

impl PairPattern {
    pub const RAW: Self = Self { fwd_suffix: "_1.fastq.gz", rev_suffix: "_2.fastq.gz" };
    pub const TRIMMED: Self = Self { fwd_suffix: "_1.trimmed.fastq.gz", rev_suffix: "_2.trimmed.fastq.gz" };
    pub const NONHOST: Self = Self { fwd_suffix: "_1.nonhost.fastq.gz", rev_suffix: "_2.nonhost.fastq.gz" };

    /// Paths of both mates, whether they exist or not.
    pub fn paths(&self, dir: &Path, sample: &str) -> (PathBuf, PathBuf) {
        (dir.join(format!("{}{}", sample, self.fwd_suffix)), dir.join(format!("{}{}", sample, self.rev_suffix)))
    }

    /// Returns the pair, or the description of the missing file.
    pub fn locate(&self, dir: &Path, sample: &str) -> Result<ReadPair, String> {
        let (fwd, rev) = self.paths(dir, sample);
        for path in [&fwd, &rev] {
            if !path.is_file() {
                return Err(format!("{} not found", ext::fmt::path(path)));
            }
        }
        Ok(ReadPair { name: sample.to_owned(), fwd, rev })
    }
}

/// Finds all samples with forward reads in `dir`, in filename-sorted order.
/// Samples without the reverse mate are skipped with a warning.
pub fn discover(dir: &Path, pattern: &PairPattern) -> Result<Vec<String>, Error> {
    let names = names_with_suffix(dir, pattern.fwd_suffix)?;
    let mut samples = Vec::with_capacity(names.len());
    for name in names {
        let (_, rev) = pattern.paths(dir, &name);
        if rev.is_file() {
            samples.push(name);
        } else {
            log::warn!("[{}] Mate file {} is missing, skipping sample", name, ext::fmt::path(&rev));
        }
    }
    Ok(samples)
}

/// Finds all samples with primary assemblies `{sample}_contigs.fa`.
/// Assembler-specific files (`_megahit_contigs.fa`, `_spades_contigs.fa`) are not samples on their own.
pub fn discover_contigs(dir: &Path) -> Result<Vec<String>, Error> {
    Ok(names_with_suffix(dir, "_contigs.fa")?.into_iter()
        .filter(|name| !name.ends_with("_megahit") && !name.ends_with("_spades"))
        .collect())
}

/// Sorted prefixes of all files `{prefix}{suffix}` in the directory.
fn names_with_suffix(dir: &Path, suffix: &str) -> Result<Vec<String>, Error> {
    if !dir.is_dir() {
        return Err(Error::InvalidInput(format!("Input directory {} does not exist", ext::fmt::path(dir))));
    }
    let pattern = format!("{}/*{}", glob::Pattern::escape(&dir.to_string_lossy()), suffix);
    let entries = glob::glob(&pattern)
        .map_err(|e| Error::RuntimeError(format!("Invalid glob pattern {:?}: {}", pattern, e)))?;
    let mut names = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| {
            let path = e.path().to_owned();
            Error::Io(e.into(), vec![path])
        })?;
        if !path.is_file() {
            continue;
        }
        let name = path.file_name().and_then(|s| s.to_str()).and_then(|s| s.strip_suffix(suffix));
        match name {
            Some(name) if !name.is_empty() => names.push(name.to_owned()),
            _ => log::warn!("Cannot extract sample name from {}", ext::fmt::path(&path)),
        }
    }
    names.sort();
    Ok(names)
}

/// Checks that the sample name can be safely used as a file prefix.
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        Err("Sample name is empty".to_string())
    } else if name.starts_with('.') || name.starts_with('-') {
        Err(format!("Sample name {:?} must not start with '.' or '-'", name))
    } else if name.contains(|c: char| c == '/' || c == '\\' || c.is_whitespace()) {
        Err(format!("Sample name {:?} contains path separators or whitespace", name))
    } else {
        Ok(())
    }
}

/// Reads newline-delimited sample names. Empty lines and `#` comments are ignored,
/// duplicates are removed with a warning.
pub fn read_sample_list(path: &Path) -> Result<Vec<String>, Error> {
    let text = fs::read_to_string(path).map_err(add_path!(path))?;
    let mut seen = HashSet::new();
    let mut samples = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let name = line.trim();
        if name.is_empty() || name.starts_with('#') {
            continue;
        }
        validate_name(name).map_err(|e| Error::InvalidInput(format!("{}:{}: {}", ext::fmt::path(path), i + 1, e)))?;
        if seen.insert(name.to_owned()) {
            samples.push(name.to_owned());
        } else {
            log::warn!("Sample {} appears in {} several times", name, ext::fmt::path(path));
        }
    }
    if samples.is_empty() {
        log::warn!("Sample list {} is empty", ext::fmt::path(path));
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), "").unwrap();
    }

    #[test]
    fn discover_pairs() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["s2_1.fastq.gz", "s2_2.fastq.gz", "s1_1.fastq.gz", "s1_2.fastq.gz", "s3_1.fastq.gz",
                "s4_2.fastq.gz", "notes.txt"] {
            touch(dir.path(), name);
        }
        let samples = discover(dir.path(), &PairPattern::RAW).unwrap();
        assert_eq!(samples, vec!["s1", "s2"]);
        assert!(PairPattern::RAW.locate(dir.path(), "s3").is_err());
        let pair = PairPattern::RAW.locate(dir.path(), "s1").unwrap();
        assert_eq!(pair.rev, dir.path().join("s1_2.fastq.gz"));
        assert!(discover(&dir.path().join("absent"), &PairPattern::RAW).is_err());
    }

    #[test]
    fn trimmed_names_are_not_raw() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a_1.trimmed.fastq.gz");
        touch(dir.path(), "a_2.trimmed.fastq.gz");
        assert!(discover(dir.path(), &PairPattern::RAW).unwrap().is_empty());
        assert_eq!(discover(dir.path(), &PairPattern::TRIMMED).unwrap(), vec!["a"]);
    }

    #[test]
    fn contigs() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b_contigs.fa", "b_megahit_contigs.fa", "a_spades_contigs.fa", "a_contigs.fa"] {
            touch(dir.path(), name);
        }
        assert_eq!(discover_contigs(dir.path()).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn sample_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.txt");
        fs::write(&path, "# cohort 1\nsampleA\n\n  sampleB \nsampleA\n").unwrap();
        assert_eq!(read_sample_list(&path).unwrap(), vec!["sampleA", "sampleB"]);
        fs::write(&path, "../etc\n").unwrap();
        assert!(matches!(read_sample_list(&path), Err(Error::InvalidInput(_))));
    }
}
