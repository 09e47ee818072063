//! HUMAnN gene family and pathway abundance tables.

use std::{
    io::BufRead,
    path::Path,
};
use crate::{
    ext,
    err::{Error, add_path},
};

/// Special HUMAnN features, that do not correspond to real gene families or pathways.
const SPECIAL: [&str; 3] = ["UNMAPPED", "UNINTEGRATED", "UNGROUPED"];

fn is_special(feature: &str) -> bool {
    SPECIAL.iter().any(|prefix| feature.starts_with(prefix))
}

/// Returns unstratified features (without `|taxon` suffix) and their abundances.
/// Special features are excluded.
pub fn unstratified<R: BufRead>(stream: R) -> Result<Vec<(String, String)>, Error> {
    let mut res = Vec::new();
    for line in stream.lines() {
        let line = line.map_err(add_path!(!))?;
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let (feature, abundance) = line.split_once('\t')
            .ok_or_else(|| Error::ParsingError(format!("Cannot parse HUMAnN line {:?}", line)))?;
        if feature.contains('|') || is_special(feature) {
            continue;
        }
        let abundance = abundance.split('\t').next().unwrap_or("").trim();
        res.push((feature.to_string(), abundance.to_string()));
    }
    Ok(res)
}

pub fn load_unstratified(path: &Path) -> Result<Vec<(String, String)>, Error> {
    let stream = ext::sys::open(path).map_err(add_path!(path))?;
    unstratified(stream).map_err(super::in_file(path))
}

/// Number of unstratified features in the table.
pub fn count_features(path: &Path) -> Result<u64, Error> {
    load_unstratified(path).map(|v| v.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pathways() {
        let text = "# Pathway\ts_Abundance\n\
            UNMAPPED\t1200.0\n\
            UNINTEGRATED\t800.0\n\
            UNINTEGRATED|g__Escherichia.s__Escherichia_coli\t500.0\n\
            PWY-5101: L-isoleucine biosynthesis II\t12.5\n\
            PWY-5101: L-isoleucine biosynthesis II|g__Escherichia.s__Escherichia_coli\t12.5\n\
            PWY-7111: pyruvate fermentation to isobutanol\t3.25\n";
        let features = unstratified(text.as_bytes()).unwrap();
        assert_eq!(features, vec![
            ("PWY-5101: L-isoleucine biosynthesis II".to_string(), "12.5".to_string()),
            ("PWY-7111: pyruvate fermentation to isobutanol".to_string(), "3.25".to_string()),
        ]);
    }
}
