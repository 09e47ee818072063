//! Kraken2 report and Bracken abundance table.

use std::{
    io::BufRead,
    path::Path,
};
use crate::{
    ext,
    err::{Error, add_path},
};

/// One line of the Kraken2 report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaxonEntry {
    /// Reads, assigned to the clade rooted at this taxon.
    pub clade_reads: u64,
    /// Rank code: `U`, `R`, `D`, ..., `S`, possibly with a depth suffix (`S1`).
    pub rank: String,
    pub taxid: u64,
    pub name: String,
}

/// Parsed Kraken2 report. Both standard (6 columns) and `--report-minimizer-data` (8 columns) layouts are supported.
#[derive(Clone, Debug, Default)]
pub struct KrakenReport {
    pub entries: Vec<TaxonEntry>,
}

impl KrakenReport {
    pub fn parse<R: BufRead>(stream: R) -> Result<Self, Error> {
        let mut entries = Vec::new();
        for (i, line) in stream.lines().enumerate() {
            let line = line.map_err(add_path!(!))?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let (rank_col, taxid_col, name_col) = match fields.len() {
                6 => (3, 4, 5),
                8 => (5, 6, 7),
                n => return Err(Error::ParsingError(format!(
                    "Kraken2 report line {}: expected 6 or 8 columns, found {}", i + 1, n))),
            };
            let parse_u64 = |s: &str| s.trim().parse::<u64>().map_err(|_| Error::ParsingError(
                format!("Kraken2 report line {}: cannot parse number {:?}", i + 1, s)));
            entries.push(TaxonEntry {
                clade_reads: parse_u64(fields[1])?,
                rank: fields[rank_col].trim().to_string(),
                taxid: parse_u64(fields[taxid_col])?,
                name: fields[name_col].trim().to_string(),
            });
        }
        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let stream = ext::sys::open(path).map_err(add_path!(path))?;
        Self::parse(stream).map_err(super::in_file(path))
    }

    pub fn unclassified(&self) -> u64 {
        self.entries.iter().filter(|e| e.rank == "U").map(|e| e.clade_reads).sum()
    }

    pub fn classified(&self) -> u64 {
        self.entries.iter().find(|e| e.taxid == 1).map(|e| e.clade_reads).unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.unclassified() + self.classified()
    }

    /// Species-level entries (rank exactly `S`), with their clade read counts.
    pub fn species(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.entries.iter().filter(|e| e.rank == "S").map(|e| (e.name.as_str(), e.clade_reads))
    }
}

/// Parses Bracken output: `name, taxonomy_id, taxonomy_lvl, kraken_assigned_reads, added_reads, new_est_reads, ...`.
/// Returns pairs (name, estimated reads).
pub fn load_bracken(path: &Path) -> Result<Vec<(String, u64)>, Error> {
    let stream = ext::sys::open(path).map_err(add_path!(path))?;
    let mut res = Vec::new();
    for (i, line) in stream.lines().enumerate() {
        let line = line.map_err(add_path!(path))?;
        if i == 0 || line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        let reads = fields.get(5).and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| Error::ParsingError(format!("{}:{}: cannot parse Bracken estimate",
                ext::fmt::path(path), i + 1)))?;
        res.push((fields[0].to_string(), reads));
    }
    Ok(res)
}

/// Top species by the number of reads. Ties are resolved by name.
pub fn top_species<'a>(species: impl Iterator<Item = (&'a str, u64)>) -> Option<(&'a str, u64)> {
    species.max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "\
 40.00\t400\t400\tU\t0\tunclassified
 60.00\t600\t10\tR\t1\troot
 59.00\t590\t5\tD\t2\t  Bacteria
 30.00\t300\t300\tS\t562\t            Escherichia coli
 10.00\t100\t90\tS\t1280\t            Staphylococcus aureus
  1.00\t10\t10\tS1\t1281\t              Staphylococcus aureus subsp. aureus
";

    #[test]
    fn report() {
        let report = KrakenReport::parse(REPORT.as_bytes()).unwrap();
        assert_eq!(report.classified(), 600);
        assert_eq!(report.total(), 1000);
        let species: Vec<_> = report.species().collect();
        assert_eq!(species, vec![("Escherichia coli", 300), ("Staphylococcus aureus", 100)]);
        assert_eq!(top_species(report.species()), Some(("Escherichia coli", 300)));
    }

    #[test]
    fn minimizer_columns() {
        let text = "100.00\t5\t5\t20\t18\tU\t0\tunclassified\n";
        let report = KrakenReport::parse(text.as_bytes()).unwrap();
        assert_eq!(report.unclassified(), 5);
        assert_eq!(report.classified(), 0);
        assert!(KrakenReport::parse("1\t2\t3\n".as_bytes()).is_err());
    }

    #[test]
    fn bracken() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.bracken");
        std::fs::write(&path, "name\ttaxonomy_id\ttaxonomy_lvl\tkraken_assigned_reads\tadded_reads\t\
            new_est_reads\tfraction_total_reads\nEscherichia coli\t562\tS\t300\t12\t312\t0.75\n").unwrap();
        assert_eq!(load_bracken(&path).unwrap(), vec![("Escherichia coli".to_string(), 312)]);
    }
}
