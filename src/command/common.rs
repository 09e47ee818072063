//! Arguments, shared by `run`, `batch` and `interactive` commands.

use std::path::{Path, PathBuf};
use colored::Colorize;
use const_format::str_repeat;
use crate::{
    err::{Error, validate_param, error},
    pipeline::{
        tools,
        config::{self, Config, ConfigBuilder},
        report::{self, StatusTable},
    },
    steps::StepKind,
};

#[derive(Clone, Copy, PartialEq, Eq)]
pub(super) enum Mode {
    Run,
    Batch,
    Interactive,
}

impl Mode {
    fn name(self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Batch => "batch",
            Self::Interactive => "interactive",
        }
    }
}

pub(super) struct Args {
    pub config_file: Option<PathBuf>,
    pub samples: Vec<String>,
    pub sample_list: Option<PathBuf>,
    pub steps: Vec<StepKind>,
    pub fail_fast: bool,
    /// Configuration entries from the command line, in order.
    pub entries: Vec<(String, String)>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config_file: None,
            samples: Vec::new(),
            sample_list: None,
            steps: StepKind::ALL.to_vec(),
            fail_fast: false,
            entries: Vec::new(),
        }
    }
}

impl Args {
    fn set(&mut self, key: &str, value: String) {
        self.entries.push((key.to_owned(), value));
    }

    /// Checks arguments, that are specific to the command.
    pub fn validate(self, mode: Mode) -> Result<Self, Error> {
        match mode {
            Mode::Run => validate_param!(self.sample_list.is_none(),
                "Sample list (-l) can only be used with {}", "batch".red()),
            Mode::Batch => {
                validate_param!(self.sample_list.is_some(), "Sample list is not provided (see -l/--list)");
                validate_param!(self.samples.is_empty(), "Samples (-s) cannot be used together with a sample list (-l)");
            }
            Mode::Interactive => validate_param!(self.sample_list.is_none() && self.samples.is_empty(),
                "Interactive mode runs all discovered samples, -s and -l are not supported"),
        }
        for (key, _) in self.entries.iter() {
            if let Some(name) = key.strip_prefix("EXE:") {
                validate_param!(tools::ALL.contains(&name), "Unknown executable {:?} (allowed: {})",
                    name, tools::ALL.join(", "));
            }
        }
        Ok(self)
    }

    /// Loads configuration: `-c` file (or `database_config.txt` in the current directory, if present),
    /// followed by the command-line entries.
    pub fn build_config(&self) -> Result<Config, Error> {
        let mut builder = ConfigBuilder::new();
        match &self.config_file {
            Some(path) => { builder.load_file(path)?; }
            None => {
                let default = Path::new(config::DB_CONFIG);
                if default.is_file() {
                    log::info!("Using configuration file {}", config::DB_CONFIG);
                    builder.load_file(default)?;
                }
            }
        }
        for (key, value) in self.entries.iter() {
            match key.strip_prefix("EXE:") {
                Some(name) => builder.set(tools::exe_key(name), value.clone()),
                None => builder.set(key.clone(), value.clone()),
            };
        }
        builder.build()
    }
}

/// Splits `KEY=VALUE`.
pub(super) fn split_key_value(s: &str) -> Result<(String, String), lexopt::Error> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_owned(), value.trim().to_owned())),
        _ => Err(lexopt::Error::Custom(format!("Cannot parse {:?}, expected KEY=VALUE", s).into())),
    }
}

pub(super) fn print_help(mode: Mode) {
    const KEY: usize = 18;
    const VAL: usize = 8;
    const EMPTY: &'static str = str_repeat!(" ", KEY + VAL + 5);

    let defaults = Args::default();
    match mode {
        Mode::Run => println!("{}", "Run pipeline steps over discovered (or selected) samples.".yellow()),
        Mode::Batch => println!("{}", "Run pipeline steps over samples from a list.".yellow()),
        Mode::Interactive => println!("{}", "Confirm and run pipeline steps one by one.".yellow()),
    }
    let usage_extra = match mode {
        Mode::Run => " [-s sample]",
        Mode::Batch => " -l samples.txt",
        Mode::Interactive => "",
    };
    println!("\n{} {} {} -i in_dir -o out_dir{} [arguments]",
        "Usage:".bold(), super::PROGRAM, mode.name(), usage_extra);

    println!("\n{}", "Input/output arguments:".bold());
    println!("    {:KEY$} {:VAL$}  Directory with raw reads {}/{}.",
        "-i, --input".green(), "DIR".yellow(), "{sample}_1.fastq.gz".cyan(), "_2.fastq.gz".cyan());
    println!("    {:KEY$} {:VAL$}  Output directory.",
        "-o, --output".green(), "DIR".yellow());
    println!("    {:KEY$} {:VAL$}  Configuration file with {} lines [{}].\n\
        {EMPTY}  Command-line arguments take precedence over the file.",
        "-c, --config".green(), "FILE".yellow(), "KEY=value".cyan(), super::fmt_def(config::DB_CONFIG));
    match mode {
        Mode::Run => println!("    {:KEY$} {:VAL$}  Process only this sample (can be repeated).\n\
            {EMPTY}  By default, all samples in the input directory are processed.",
            "-s, --sample".green(), "STR".yellow()),
        Mode::Batch => println!("    {:KEY$} {:VAL$}  File with sample names, one per line.\n\
            {EMPTY}  Empty lines and lines starting with # are ignored.",
            "-l, --list".green(), "FILE".yellow()),
        Mode::Interactive => {}
    }
    println!("    {:KEY$} {:VAL$}  Comma-separated steps [{}]:\n\
        {EMPTY}  {}.",
        "-S, --steps".green(), "STR".yellow(), super::fmt_def("all"),
        defaults.steps.iter().map(|step| step.name()).collect::<Vec<_>>().join(", "));

    println!("\n{}", "Tool parameters:".bold());
    println!("    {:KEY$} {:VAL$}  Number of threads [{}].",
        "-@, --threads".green(), "INT".yellow(), super::fmt_def(8));
    println!("    {:KEY$} {:VAL$}  Memory budget in gigabytes [{}].",
        "-m, --memory".green(), "INT".yellow(), super::fmt_def(16));
    println!("    {:KEY$} {:VAL$}  fastp: minimal base quality [{}].",
        "-q, --min-quality".green(), "INT".yellow(), super::fmt_def(20));
    println!("    {:KEY$} {:VAL$}  fastp: minimal read length after trimming [{}].",
        "    --min-length".green(), "INT".yellow(), super::fmt_def(50));
    println!("    {:KEY$} {:VAL$}  Minimal contig length [{}].",
        "    --min-contig".green(), "INT".yellow(), super::fmt_def(1000));
    println!("    {:KEY$} {:VAL$}  Assembler: {}, {} or {} [{}].",
        "-a, --assembler".green(), "STR".yellow(),
        "megahit".yellow(), "spades".yellow(), "both".yellow(), super::fmt_def("megahit"));
    println!("    {:KEY$} {:VAL$}  Bowtie2 index prefix of the host genome.",
        "    --host-index".green(), "PREFIX".yellow());
    println!("    {:KEY$} {:VAL$}  Kraken2 database.",
        "    --kraken-db".green(), "DIR".yellow());
    println!("    {:KEY$} {:VAL$}  Set any configuration key, for example {}.",
        "    --set".green(), "KEY=VAL".yellow(), "CHECKM_DB=/data/checkm".cyan());
    println!("    {:KEY$} {:VAL$}  Use this executable for the tool, or {} to disable an optional tool.\n\
        {EMPTY}  For example, {}.",
        "    --exe".green(), "NAME=EXE".yellow(), "none".yellow(), "fastqc=none".cyan());

    println!("\n{}", "Execution parameters:".bold());
    println!("    {:KEY$} {:VAL$}  Rerun mode [{}]. Rerun everything ({}) or\n\
        {EMPTY}  only steps without a complete status record ({}).",
        "    --rerun".green(), "STR".yellow(), super::fmt_def("none"), "all".yellow(), "none".yellow());
    println!("    {:KEY$} {:VAL$}  Keep intermediate files (alignments, concatenated reads).",
        "    --keep-tmp".green(), super::flag());
    println!("    {:KEY$} {:VAL$}  Stop after the first failed sample.",
        "    --fail-fast".green(), super::flag());

    println!("\n{}", "Other parameters:".bold());
    println!("    {:KEY$} {:VAL$}  Show this help message.", "-h, --help".green(), "");
    println!("    {:KEY$} {:VAL$}  Show version.", "-V, --version".green(), "");
}

pub(super) fn parse_args(argv: &[String], mode: Mode) -> Result<Args, lexopt::Error> {
    if argv.is_empty() {
        print_help(mode);
        std::process::exit(1);
    }
    use lexopt::prelude::*;
    let mut args = Args::default();
    let mut parser = lexopt::Parser::from_args(argv);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('i') | Long("input") => args.set("INPUT_DIR", parser.value()?.string()?),
            Short('o') | Long("output") => args.set("OUTPUT_DIR", parser.value()?.string()?),
            Short('c') | Long("config") => args.config_file = Some(parser.value()?.parse()?),
            Short('s') | Long("sample") => args.samples.push(parser.value()?.string()?),
            Short('l') | Long("list") | Long("sample-list") => args.sample_list = Some(parser.value()?.parse()?),
            Short('S') | Long("steps") => args.steps = parser.value()?.parse_with(StepKind::parse_list)?,

            Short('@') | Long("threads") => args.set("THREADS", parser.value()?.string()?),
            Short('m') | Long("memory") => args.set("MEMORY_GB", parser.value()?.string()?),
            Short('q') | Long("min-quality") => args.set("MIN_QUALITY", parser.value()?.string()?),
            Long("min-length") => args.set("MIN_LENGTH", parser.value()?.string()?),
            Long("min-contig") | Long("min-contig-len") => args.set("MIN_CONTIG_LEN", parser.value()?.string()?),
            Short('a') | Long("assembler") => args.set("ASSEMBLER", parser.value()?.string()?),
            Long("host-index") => args.set("HOST_INDEX", parser.value()?.string()?),
            Long("kraken-db") => args.set("KRAKEN2_DB", parser.value()?.string()?),
            Long("set") => {
                let (key, value) = split_key_value(&parser.value()?.string()?)?;
                args.entries.push((key, value));
            }
            Long("exe") => {
                let (name, value) = split_key_value(&parser.value()?.string()?)?;
                args.entries.push((format!("EXE:{}", name), value));
            }

            Long("rerun") => args.set("RERUN", parser.value()?.string()?),
            Long("keep-tmp") => args.set("KEEP_TMP", "true".to_owned()),
            Long("fail-fast") => args.fail_fast = true,

            Short('V') | Long("version") => {
                super::print_version();
                std::process::exit(0);
            }
            Short('h') | Long("help") => {
                print_help(mode);
                std::process::exit(0);
            }
            _ => Err(arg.unexpected())?,
        }
    }
    Ok(args)
}

/// Reports failed samples, returns error if there are any.
pub(super) fn check_failures(table: &StatusTable) -> Result<(), Error> {
    let failed = table.failed_samples();
    if failed.is_empty() {
        log::info!("{}", "All samples finished successfully".green());
        Ok(())
    } else {
        Err(error!(RuntimeError, "{} sample(s) failed: {} (see {})", failed.len(), failed.join(", "),
            report::STATUS_TABLE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn parse_entries() {
        let parsed = parse_args(&args("-i in -o out -@ 4 --set CHECKM_DB=/db/checkm --exe fastqc=none -S qc,host"),
            Mode::Run).unwrap();
        assert_eq!(parsed.steps, vec![StepKind::Qc, StepKind::Host]);
        assert_eq!(parsed.entries[2], ("THREADS".to_string(), "4".to_string()));
        assert_eq!(parsed.entries[3], ("CHECKM_DB".to_string(), "/db/checkm".to_string()));
        assert_eq!(parsed.entries[4], ("EXE:fastqc".to_string(), "none".to_string()));
        assert!(parsed.validate(Mode::Run).is_ok());

        assert!(parse_args(&args("-i in --set NOEQUALS"), Mode::Run).is_err());
        assert!(parse_args(&args("-i in -S qc,unknown"), Mode::Run).is_err());
        let batch = parse_args(&args("-i in -o out"), Mode::Batch).unwrap();
        assert!(batch.validate(Mode::Batch).is_err());
        let bad_exe = parse_args(&args("-i in --exe fastq=/bin/true"), Mode::Run).unwrap();
        assert!(bad_exe.validate(Mode::Run).is_err());
    }
}
