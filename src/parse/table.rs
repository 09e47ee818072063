//! Generic tab-separated tables: hit counting, per-sample concatenation and feature × sample merging.

use std::{
    io::{BufRead, Write},
    collections::BTreeMap,
    path::Path,
};
use crate::{
    ext,
    err::{Error, add_path},
};

/// Counts data rows in a tab-separated file. Lines starting with `#` and empty lines are ignored,
/// and, if `header` is true, the first remaining line is ignored as well.
pub fn count_rows(path: &Path, header: bool) -> Result<u64, Error> {
    let stream = ext::sys::open(path).map_err(add_path!(path))?;
    let mut count = 0;
    let mut skip = header;
    for line in stream.lines() {
        let line = line.map_err(add_path!(path))?;
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        if skip {
            skip = false;
        } else {
            count += 1;
        }
    }
    Ok(count)
}

/// Concatenates per-sample tables, adding the sample name as the first column.
/// The header (first line) is taken from the first table and written once. Absent tables are skipped.
/// Returns the number of written data rows.
pub fn concat_with_sample(inputs: &[(String, &Path)], output: &Path) -> Result<u64, Error> {
    let mut header_written = false;
    let mut count = 0;
    let mut contents = Vec::new();
    for (sample, path) in inputs.iter() {
        if !path.exists() {
            log::warn!("[{}] Table {} is missing, not included into {}", sample, ext::fmt::path(path),
                ext::fmt::path(output));
            continue;
        }
        let stream = ext::sys::open(path).map_err(add_path!(path))?;
        for (i, line) in stream.lines().enumerate() {
            let line = line.map_err(add_path!(path))?;
            if line.trim().is_empty() {
                continue;
            }
            if i == 0 {
                if !header_written {
                    contents.push(format!("sample\t{}", line.trim_start_matches('#')));
                    header_written = true;
                }
            } else {
                contents.push(format!("{}\t{}", sample, line));
                count += 1;
            }
        }
    }
    ext::sys::write_atomic(output, |w| {
        for line in contents.iter() {
            writeln!(w, "{}", line)?;
        }
        Ok(())
    })?;
    Ok(count)
}

/// Feature × sample table, for example species read counts across samples.
#[derive(Default)]
pub struct MergedTable {
    samples: Vec<String>,
    rows: BTreeMap<String, Vec<Option<String>>>,
}

impl MergedTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a new sample column.
    pub fn add_sample(&mut self, sample: &str, values: impl IntoIterator<Item = (String, String)>) {
        let col = self.samples.len();
        self.samples.push(sample.to_owned());
        for row in self.rows.values_mut() {
            row.push(None);
        }
        for (feature, value) in values {
            let row = self.rows.entry(feature).or_insert_with(|| vec![None; col + 1]);
            row[col] = Some(value);
        }
    }

    pub fn n_features(&self) -> usize {
        self.rows.len()
    }

    /// Writes the table, absent values are replaced with `missing`.
    pub fn write<W: Write>(&self, mut f: W, first_column: &str, missing: &str) -> std::io::Result<()> {
        write!(f, "{}", first_column)?;
        for sample in self.samples.iter() {
            write!(f, "\t{}", sample)?;
        }
        writeln!(f)?;
        for (feature, row) in self.rows.iter() {
            write!(f, "{}", feature)?;
            for value in row.iter() {
                write!(f, "\t{}", value.as_deref().unwrap_or(missing))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }

    pub fn save(&self, path: &Path, first_column: &str, missing: &str) -> Result<(), Error> {
        ext::sys::write_atomic(path, |w| self.write(w, first_column, missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn counting_and_concat() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a_card.tsv");
        let b = dir.path().join("b_card.tsv");
        fs::write(&a, "#FILE\tSEQUENCE\tGENE\na_contigs.fa\tk141_1\tblaTEM-1\na_contigs.fa\tk141_9\ttet(A)\n").unwrap();
        fs::write(&b, "#FILE\tSEQUENCE\tGENE\n").unwrap();
        assert_eq!(count_rows(&a, false).unwrap(), 2);
        assert_eq!(count_rows(&b, false).unwrap(), 0);

        let c = dir.path().join("c_card.tsv");
        let out = dir.path().join("merged_abricate_card.tsv");
        let inputs = vec![("a".to_string(), a.as_path()), ("b".to_string(), b.as_path()), ("c".to_string(), c.as_path())];
        assert_eq!(concat_with_sample(&inputs, &out).unwrap(), 2);
        assert_eq!(fs::read_to_string(&out).unwrap(), "sample\tFILE\tSEQUENCE\tGENE\n\
            a\ta_contigs.fa\tk141_1\tblaTEM-1\na\ta_contigs.fa\tk141_9\ttet(A)\n");
    }

    #[test]
    fn merged() {
        let mut table = MergedTable::new();
        table.add_sample("s1", vec![("E. coli".to_string(), "300".to_string())]);
        table.add_sample("s2", vec![("S. aureus".to_string(), "5".to_string()), ("E. coli".to_string(), "7".to_string())]);
        let mut buf = Vec::new();
        table.write(&mut buf, "species", "0").unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "species\ts1\ts2\nE. coli\t300\t7\nS. aureus\t0\t5\n");
    }
}
