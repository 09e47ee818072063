//! Alignment summary, that Bowtie2 writes to stderr.

use regex::Regex;
use crate::{
    err::Error,
    pipeline::metrics::Percent,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bowtie2Summary {
    /// Number of input reads (read pairs for paired-end input).
    pub reads: u64,
    pub overall_rate: Percent,
}

impl Bowtie2Summary {
    /// Parses the summary from the tool output. Other lines (such as warnings) are ignored.
    pub fn parse(text: &str) -> Result<Self, Error> {
        lazy_static::lazy_static!{
            static ref READS: Regex = Regex::new(r"(?m)^([0-9]+) reads; of these:").unwrap();
            static ref RATE: Regex = Regex::new(r"(?m)^([0-9]+(?:\.[0-9]+)?)% overall alignment rate").unwrap();
        }
        let reads = READS.captures_iter(text).last()
            .ok_or_else(|| Error::ParsingError("Bowtie2 output contains no read count".to_string()))?;
        let rate = RATE.captures_iter(text).last()
            .ok_or_else(|| Error::ParsingError("Bowtie2 output contains no overall alignment rate".to_string()))?;
        Ok(Self {
            reads: reads[1].parse().map_err(|_| Error::ParsingError(format!("Cannot parse read count {}", &reads[1])))?,
            overall_rate: rate[1].parse().map_err(Error::ParsingError)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paired_summary() {
        let text = "Warning: skipping read 'r5' because it was < 2 characters long\n\
            10000 reads; of these:\n\
            \x20 10000 (100.00%) were paired; of these:\n\
            \x20   9500 (95.00%) aligned concordantly 0 times\n\
            \x20   450 (4.50%) aligned concordantly exactly 1 time\n\
            \x20   50 (0.50%) aligned concordantly >1 times\n\
            5.31% overall alignment rate\n";
        let summary = Bowtie2Summary::parse(text).unwrap();
        assert_eq!(summary.reads, 10000);
        assert_eq!(summary.overall_rate.to_string(), "5.31%");
        assert!(Bowtie2Summary::parse("Error: index not found\n").is_err());
    }
}
