//! CheckM `--tab_table` output.

use std::{
    io::BufRead,
    path::Path,
};
use crate::{
    ext,
    err::{Error, add_path},
    pipeline::metrics::Percent,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinQuality {
    /// Completeness >= 90%, contamination < 5%.
    High,
    /// Completeness >= 50%, contamination < 10%.
    Medium,
    Low,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinEntry {
    pub id: String,
    pub completeness: Percent,
    pub contamination: Percent,
}

impl BinEntry {
    pub fn quality(&self) -> BinQuality {
        let compl = self.completeness.hundredths();
        let contam = self.contamination.hundredths();
        if compl >= 90_00 && contam < 5_00 {
            BinQuality::High
        } else if compl >= 50_00 && contam < 10_00 {
            BinQuality::Medium
        } else {
            BinQuality::Low
        }
    }
}

/// Parses the table, columns are found by their names.
pub fn parse_bins<R: BufRead>(stream: R) -> Result<Vec<BinEntry>, Error> {
    let mut lines = stream.lines();
    let header = match lines.next() {
        Some(line) => line.map_err(add_path!(!))?,
        None => return Ok(Vec::new()),
    };
    let columns: Vec<&str> = header.split('\t').map(str::trim).collect();
    let find = |name: &str| columns.iter().position(|&c| c == name)
        .ok_or_else(|| Error::ParsingError(format!("CheckM table has no column {:?}", name)));
    let id_col = find("Bin Id")?;
    let compl_col = find("Completeness")?;
    let contam_col = find("Contamination")?;

    let mut bins = Vec::new();
    for line in lines {
        let line = line.map_err(add_path!(!))?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        let get = |col: usize| fields.get(col).copied()
            .ok_or_else(|| Error::ParsingError(format!("Too few columns in CheckM line {:?}", line)));
        bins.push(BinEntry {
            id: get(id_col)?.to_string(),
            completeness: get(compl_col)?.parse().map_err(Error::ParsingError)?,
            contamination: get(contam_col)?.parse().map_err(Error::ParsingError)?,
        });
    }
    Ok(bins)
}

pub fn load_bins(path: &Path) -> Result<Vec<BinEntry>, Error> {
    let stream = ext::sys::open(path).map_err(add_path!(path))?;
    parse_bins(stream).map_err(super::in_file(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bins() {
        let text = "Bin Id\tMarker lineage\t# genomes\tCompleteness\tContamination\tStrain heterogeneity\n\
            bin.1\tk__Bacteria (UID203)\t5449\t95.12\t1.30\t0.00\n\
            bin.2\to__Clostridiales (UID1212)\t172\t67.40\t9.99\t50.00\n\
            bin.3\tk__Bacteria (UID203)\t5449\t91.00\t5.00\t0.00\n\
            bin.4\troot (UID1)\t5656\t12.07\t0.00\t0.00\n";
        let bins = parse_bins(text.as_bytes()).unwrap();
        let qualities: Vec<_> = bins.iter().map(BinEntry::quality).collect();
        assert_eq!(qualities, vec![BinQuality::High, BinQuality::Medium, BinQuality::Medium, BinQuality::Low]);
        assert!(parse_bins("Bin Id\tCompleteness\n".as_bytes()).is_err());
    }
}
