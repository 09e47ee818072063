//! Contig depth table of `jgi_summarize_bam_contig_depths`.

use std::{
    io::{BufRead, Write},
    path::Path,
};
use crate::{
    ext,
    err::{Error, add_path},
};

/// Reads pairs (contig, average depth) from the depth table.
pub fn average_depths<R: BufRead>(stream: R) -> Result<Vec<(String, String)>, Error> {
    let mut lines = stream.lines();
    let header = match lines.next() {
        Some(line) => line.map_err(add_path!(!))?,
        None => return Ok(Vec::new()),
    };
    let columns: Vec<&str> = header.split('\t').collect();
    let name_col = columns.iter().position(|&c| c == "contigName");
    let depth_col = columns.iter().position(|&c| c == "totalAvgDepth");
    let (name_col, depth_col) = name_col.zip(depth_col).ok_or_else(|| Error::ParsingError(
        "Depth table has no contigName/totalAvgDepth columns".to_string()))?;

    let mut res = Vec::new();
    for line in lines {
        let line = line.map_err(add_path!(!))?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        match (fields.get(name_col), fields.get(depth_col)) {
            (Some(name), Some(depth)) => res.push((name.to_string(), depth.to_string())),
            _ => return Err(Error::ParsingError(format!("Cannot parse depth line {:?}", line))),
        }
    }
    Ok(res)
}

/// Converts the depth table into a two-column abundance file for MaxBin2, returns the number of contigs.
pub fn write_abundance(depth_path: &Path, out_path: &Path) -> Result<u64, Error> {
    let stream = ext::sys::open(depth_path).map_err(add_path!(depth_path))?;
    let depths = average_depths(stream).map_err(super::in_file(depth_path))?;
    ext::sys::write_atomic(out_path, |w| {
        for (contig, depth) in depths.iter() {
            writeln!(w, "{}\t{}", contig, depth)?;
        }
        Ok(())
    })?;
    Ok(depths.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depths() {
        let text = "contigName\tcontigLen\ttotalAvgDepth\ts.bam\ts.bam-var\n\
            k141_1\t2500\t12.3\t12.3\t4.1\n\
            k141_2\t1800\t0.5\t0.5\t0.2\n";
        let res = average_depths(text.as_bytes()).unwrap();
        assert_eq!(res, vec![("k141_1".to_string(), "12.3".to_string()), ("k141_2".to_string(), "0.5".to_string())]);
        assert!(average_depths("name\tdepth\n".as_bytes()).is_err());

        let dir = tempfile::tempdir().unwrap();
        let depth_path = dir.path().join("depth.txt");
        std::fs::write(&depth_path, text).unwrap();
        let abund_path = dir.path().join("abundance.txt");
        assert_eq!(write_abundance(&depth_path, &abund_path).unwrap(), 2);
        assert_eq!(std::fs::read_to_string(&abund_path).unwrap(), "k141_1\t12.3\nk141_2\t0.5\n");
    }
}
