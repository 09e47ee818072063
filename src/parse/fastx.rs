//! Read counting in FASTQ files and contig statistics of FASTA assemblies.

use std::{
    io::{self, BufRead, Read, Write},
    cmp::min,
    path::Path,
};
use bio::io::{fasta, fastq};
use crate::{
    ext,
    err::{Error, add_path},
};

/// Passes the stream unchanged, except for blank lines at the very end, which are dropped.
/// Blank lines followed by any other line are kept.
struct TrimBlankTail<R> {
    inner: R,
    blank: Vec<u8>,
    line: Vec<u8>,
    pos: usize,
}

impl<R: BufRead> TrimBlankTail<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            blank: Vec::new(),
            line: Vec::new(),
            pos: 0,
        }
    }
}

impl<R: BufRead> Read for TrimBlankTail<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos == self.line.len() {
            self.line.clear();
            self.pos = 0;
            if self.inner.read_until(b'\n', &mut self.line)? == 0 {
                return Ok(0);
            }
            if self.line.iter().all(u8::is_ascii_whitespace) {
                self.blank.append(&mut self.line);
            } else if !self.blank.is_empty() {
                self.blank.append(&mut self.line);
                std::mem::swap(&mut self.blank, &mut self.line);
            }
        }
        let n = min(buf.len(), self.line.len() - self.pos);
        buf[..n].copy_from_slice(&self.line[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

fn fastq_error(e: fastq::Error) -> io::Error {
    match e {
        fastq::Error::FileOpen { source, .. } => source,
        fastq::Error::ReadError(err) => err,
        e => io::Error::new(io::ErrorKind::InvalidData, format!("Failed to process FASTQ file: {}", e)),
    }
}

/// Counts reads in a (possibly gzipped) FASTQ file.
pub fn count_reads(path: &Path) -> Result<u64, Error> {
    let stream = ext::sys::open(path).map_err(add_path!(path))?;
    let mut reader = fastq::Reader::new(TrimBlankTail::new(stream));
    let mut record = fastq::Record::new();
    let mut count = 0;
    loop {
        fastq::FastqRead::read(&mut reader, &mut record).map_err(|e| Error::Io(fastq_error(e), vec![path.to_owned()]))?;
        if record.is_empty() {
            return Ok(count);
        }
        count += 1;
    }
}

/// Summary of an assembly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContigStats {
    pub n_contigs: u64,
    pub total_len: u64,
    pub n50: u64,
    pub longest: u64,
}

impl ContigStats {
    pub fn from_lengths(mut lengths: Vec<u64>) -> Self {
        lengths.sort_unstable_by(|a, b| b.cmp(a));
        let total_len: u64 = lengths.iter().sum();
        let mut n50 = 0;
        let mut cumul = 0;
        for &len in lengths.iter() {
            cumul += len;
            if 2 * cumul >= total_len {
                n50 = len;
                break;
            }
        }
        Self {
            n_contigs: lengths.len() as u64,
            total_len, n50,
            longest: lengths.first().copied().unwrap_or(0),
        }
    }
}

/// Writes a single FASTA record, sequence is split into lines of fixed width.
fn write_fasta<W: Write>(mut writer: W, record: &fasta::Record) -> io::Result<()> {
    write!(writer, ">{}", record.id())?;
    if let Some(desc) = record.desc() {
        write!(writer, " {}", desc)?;
    }
    writer.write_all(b"\n")?;

    const WIDTH: usize = 120;
    let seq = record.seq();
    let n = seq.len();
    for i in (0..n).step_by(WIDTH) {
        writer.write_all(&seq[i..min(i + WIDTH, n)])?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

/// Copies contigs of length at least `min_len` from `input` to `output`, returns statistics of the copied contigs.
pub fn filter_by_length(input: &Path, output: &Path, min_len: u64) -> Result<ContigStats, Error> {
    let stream = ext::sys::open(input).map_err(add_path!(input))?;
    let mut reader = fasta::Reader::new(TrimBlankTail::new(stream));
    let mut record = fasta::Record::new();
    let mut lengths = Vec::new();
    ext::sys::write_atomic(output, |writer| {
        loop {
            fasta::FastaRead::read(&mut reader, &mut record)?;
            if record.is_empty() {
                return Ok(());
            }
            let len = record.seq().len() as u64;
            if len >= min_len {
                lengths.push(len);
                write_fasta(&mut *writer, &record)?;
            }
        }
    }).map_err(|e| match e {
        Error::Io(e, _) => Error::Io(e, vec![input.to_owned(), output.to_owned()]),
        e => e,
    })?;
    Ok(ContigStats::from_lengths(lengths))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn n50() {
        let stats = ContigStats::from_lengths(vec![2000, 5000, 1000, 3000]);
        // Total 11000, 5000 + 3000 >= 5500.
        assert_eq!(stats, ContigStats { n_contigs: 4, total_len: 11000, n50: 3000, longest: 5000 });
        assert_eq!(ContigStats::from_lengths(Vec::new()), ContigStats::default());
    }

    #[test]
    fn filter_contigs() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("final.contigs.fa");
        fs::write(&input, ">k141_1 flag=1 multi=2.0 len=6\nACGT\nAC\n>k141_2 len=3\nACG\n\n>k141_3\nAAAAAAAA\n").unwrap();
        let output = dir.path().join("s_contigs.fa");
        let stats = filter_by_length(&input, &output, 5).unwrap();
        assert_eq!(stats, ContigStats { n_contigs: 2, total_len: 14, n50: 8, longest: 8 });
        assert_eq!(fs::read_to_string(&output).unwrap(), ">k141_1 flag=1 multi=2.0 len=6\nACGTAC\n>k141_3\nAAAAAAAA\n");

        // Filtering the output again keeps everything.
        let again = dir.path().join("again.fa");
        assert_eq!(filter_by_length(&output, &again, 5).unwrap(), stats);
        assert_eq!(fs::read(&again).unwrap(), fs::read(&output).unwrap());
    }

    #[test]
    fn long_contigs_are_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("contigs.fa");
        let seq = "A".repeat(150);
        fs::write(&input, format!(">c1\n{}\n", seq)).unwrap();
        let output = dir.path().join("filtered.fa");
        filter_by_length(&input, &output, 100).unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), format!(">c1\n{}\n{}\n", &seq[..120], &seq[120..]));
    }

    #[test]
    fn fastq_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.fastq");
        fs::write(&path, "@r1\nACGT\n+\nIIII\n@r2\nACGT\n+\nIIII\n").unwrap();
        assert_eq!(count_reads(&path).unwrap(), 2);
        fs::write(&path, "@r1\nACGT\n+\nIIII\n@r2\nACGT\n+\nIIII\n\n\n").unwrap();
        assert_eq!(count_reads(&path).unwrap(), 2);
        fs::write(&path, "").unwrap();
        assert_eq!(count_reads(&path).unwrap(), 0);
        fs::write(&path, "r1\nACGT\n+\nIIII\n").unwrap();
        assert!(count_reads(&path).is_err());
    }

    #[test]
    fn blank_tail_is_dropped() {
        let read_all = |s: &str| {
            let mut out = String::new();
            TrimBlankTail::new(s.as_bytes()).read_to_string(&mut out).unwrap();
            out
        };
        assert_eq!(read_all("a\n\nb\n\n \n"), "a\n\nb\n");
        assert_eq!(read_all("\n\n"), "");
        assert_eq!(read_all("a"), "a");
    }
}
