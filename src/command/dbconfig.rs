//! Records database locations in a `KEY=value` configuration file.

use std::{
    io::Write,
    path::{Path, PathBuf},
    fs,
};
use colored::Colorize;
use const_format::str_repeat;
use crate::{
    ext,
    err::{Error, validate_param, add_path},
    pipeline::config::{self, Databases},
};

struct Args {
    output: PathBuf,
    entries: Vec<(String, String)>,
    force: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            output: PathBuf::from(config::DB_CONFIG),
            entries: Vec::new(),
            force: false,
        }
    }
}

impl Args {
    fn validate(self) -> Result<Self, Error> {
        validate_param!(!self.entries.is_empty(), "No databases provided, expected KEY=PATH arguments");
        for (key, path) in self.entries.iter() {
            validate_param!(Databases::default().set(key, path), "Unknown database {} (allowed: {})",
                key, config::DB_KEYS.join(", "));
            validate_param!(self.force || config::database_exists(key, Path::new(path)),
                "Database {} = {} does not exist", key, ext::fmt::path(Path::new(path)));
        }
        Ok(self)
    }
}

fn print_help() {
    const KEY: usize = 16;
    const VAL: usize = 6;
    const EMPTY: &'static str = str_repeat!(" ", KEY + VAL + 5);

    let defaults = Args::default();
    println!("{}", "Record database locations in a configuration file.".yellow());
    println!("\n{} {} dbconfig [-o {}] KEY=PATH [KEY=PATH ...]",
        "Usage:".bold(), super::PROGRAM, config::DB_CONFIG);

    println!("\n{}", "Arguments:".bold());
    println!("    {:KEY$} {:VAL$}  Configuration file [{}].\n\
        {EMPTY}  Existing entries are kept, unless overwritten.",
        "-o, --output".green(), "FILE".yellow(), super::fmt_def(defaults.output.display()));
    println!("    {:KEY$} {:VAL$}  Do not check that the databases exist.",
        "-F, --force".green(), super::flag());
    println!("    {:KEY$} {:VAL$}  Database location. Allowed keys:\n\
        {EMPTY}  {}.",
        "KEY=PATH".green(), "", config::DB_KEYS.join(", "));

    println!("\n{}", "Other parameters:".bold());
    println!("    {:KEY$} {:VAL$}  Show this help message.", "-h, --help".green(), "");
    println!("    {:KEY$} {:VAL$}  Show version.", "-V, --version".green(), "");
}

fn parse_args(argv: &[String]) -> Result<Args, lexopt::Error> {
    if argv.is_empty() {
        print_help();
        std::process::exit(1);
    }
    use lexopt::prelude::*;
    let mut args = Args::default();
    let mut parser = lexopt::Parser::from_args(argv);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('o') | Long("output") => args.output = parser.value()?.parse()?,
            Short('F') | Long("force") => args.force = true,
            Value(val) => args.entries.push(super::common::split_key_value(&val.string()?)?),
            Short('V') | Long("version") => {
                super::print_version();
                std::process::exit(0);
            }
            Short('h') | Long("help") => {
                print_help();
                std::process::exit(0);
            }
            _ => Err(arg.unexpected())?,
        }
    }
    Ok(args)
}

/// Replaces values of existing keys in place, appends new keys at the end.
fn update_entries(mut existing: Vec<(String, String)>, new: &[(String, String)]) -> Vec<(String, String)> {
    for (key, value) in new {
        match existing.iter_mut().find(|(old_key, _)| old_key == key) {
            Some(entry) => entry.1 = value.clone(),
            None => existing.push((key.clone(), value.clone())),
        }
    }
    existing
}

pub(super) fn run(argv: &[String]) -> Result<(), Error> {
    let args = parse_args(argv)?.validate()?;
    let existing = if args.output.exists() {
        let text = fs::read_to_string(&args.output).map_err(add_path!(args.output))?;
        config::parse_key_values(&text)
            .map_err(|e| Error::ParsingError(format!("{}: {}", ext::fmt::path(&args.output), e)))?
    } else {
        Vec::new()
    };
    let n_existing = existing.len();
    let entries = update_entries(existing, &args.entries);

    ext::sys::write_atomic(&args.output, |f| {
        writeln!(f, "# {} configuration, created by {} v{}", super::PROGRAM, super::PROGRAM,
            env!("CARGO_PKG_VERSION"))?;
        for (key, value) in entries.iter() {
            writeln!(f, "{}={}", key, value)?;
        }
        Ok(())
    })?;
    for (key, path) in args.entries.iter() {
        log::info!("    {} = {}", key.green(), path);
    }
    log::info!("Saved {} entries ({} new) to {}", entries.len(), entries.len() - n_existing,
        ext::fmt::path(&args.output));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(v: &[(&str, &str)]) -> Vec<(String, String)> {
        v.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn update() {
        let existing = pairs(&[("THREADS", "4"), ("KRAKEN2_DB", "/old/kraken")]);
        let new = pairs(&[("KRAKEN2_DB", "/new/kraken"), ("CARD_JSON", "/db/card.json")]);
        assert_eq!(update_entries(existing, &new),
            pairs(&[("THREADS", "4"), ("KRAKEN2_DB", "/new/kraken"), ("CARD_JSON", "/db/card.json")]));
    }

    #[test]
    fn check_databases() {
        let dir = tempfile::tempdir().unwrap();
        let kraken = dir.path().join("kraken");
        fs::create_dir(&kraken).unwrap();
        let args = |entries: &[(&str, &str)], force| Args {
            output: dir.path().join(config::DB_CONFIG),
            entries: pairs(entries),
            force,
        };
        let kraken_str = kraken.to_str().unwrap();
        assert!(args(&[("KRAKEN2_DB", kraken_str)], false).validate().is_ok());
        assert!(args(&[("KRAKEN2_DB", "/nonexistent/kraken")], false).validate().is_err());
        assert!(args(&[("KRAKEN2_DB", "/nonexistent/kraken")], true).validate().is_ok());
        assert!(args(&[("THREADS", "4")], false).validate().is_err());
        assert!(args(&[], false).validate().is_err());
    }
}
