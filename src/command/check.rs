//! Reports where every executable and database is taken from.

use std::{
    fs,
    path::{Path, PathBuf},
};
use colored::Colorize;
use const_format::str_repeat;
use crate::{
    ext,
    err::{Error, validate_param, add_path},
    pipeline::{
        tools::{self, Tools},
        config::{self, Databases},
    },
};

struct Args {
    config_file: Option<PathBuf>,
    executables: Vec<(String, String)>,
}

fn print_help() {
    const KEY: usize = 16;
    const VAL: usize = 8;
    const EMPTY: &'static str = str_repeat!(" ", KEY + VAL + 5);

    println!("{}", "Check executables and databases.".yellow());
    println!("\n{} {} check [-c {}] [arguments]", "Usage:".bold(), super::PROGRAM, config::DB_CONFIG);

    println!("\n{}", "Arguments:".bold());
    println!("    {:KEY$} {:VAL$}  Configuration file [{}].",
        "-c, --config".green(), "FILE".yellow(), super::fmt_def(config::DB_CONFIG));
    println!("    {:KEY$} {:VAL$}  Use this executable for the tool, or {} to disable it.\n\
        {EMPTY}  Can be repeated.",
        "    --exe".green(), "NAME=EXE".yellow(), "none".yellow());

    println!("\n{}", "Other parameters:".bold());
    println!("    {:KEY$} {:VAL$}  Show this help message.", "-h, --help".green(), "");
    println!("    {:KEY$} {:VAL$}  Show version.", "-V, --version".green(), "");
}

fn parse_args(argv: &[String]) -> Result<Args, lexopt::Error> {
    use lexopt::prelude::*;
    let mut args = Args { config_file: None, executables: Vec::new() };
    let mut parser = lexopt::Parser::from_args(argv);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('c') | Long("config") => args.config_file = Some(parser.value()?.parse()?),
            Long("exe") => args.executables.push(super::common::split_key_value(&parser.value()?.string()?)?),
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

/// Loads executables and databases from the configuration file. Other keys are ignored.
fn load_config(path: &Path, tools: &mut Tools, dbs: &mut Databases) -> Result<(), Error> {
    let text = fs::read_to_string(path).map_err(add_path!(path))?;
    let pairs = config::parse_key_values(&text)
        .map_err(|e| Error::ParsingError(format!("{}: {}", ext::fmt::path(path), e)))?;
    for (key, value) in pairs {
        if !dbs.set(&key, &value) {
            tools.set_from_key(&key, &value);
        }
    }
    Ok(())
}

pub(super) fn run(argv: &[String]) -> Result<(), Error> {
    let args = parse_args(argv)?;
    let mut tools = Tools::default();
    let mut dbs = Databases::default();
    match &args.config_file {
        Some(path) => load_config(path, &mut tools, &mut dbs)?,
        None => {
            let default = Path::new(config::DB_CONFIG);
            if default.is_file() {
                load_config(default, &mut tools, &mut dbs)?;
            }
        }
    }
    for (name, value) in args.executables.iter() {
        validate_param!(tools.set_from_name(name, value), "Unknown executable {:?} (allowed: {})",
            name, tools::ALL.join(", "));
    }
    if dbs.gtdbtk.is_none() {
        dbs.gtdbtk = std::env::var_os("GTDBTK_DATA_PATH").map(PathBuf::from);
    }

    const WIDTH: usize = 32;
    println!("{}", "Executables:".bold());
    let mut n_found = 0;
    for (name, res) in tools.describe() {
        match res {
            Ok(path) => {
                n_found += 1;
                println!("    {:WIDTH$} {}", name, ext::fmt::path(&path).green());
            }
            Err(Error::NoExec(_)) => println!("    {:WIDTH$} {}", name, "not found".red()),
            Err(_) => println!("    {:WIDTH$} {}", name, "disabled".yellow()),
        }
    }

    println!("\n{}", "Databases:".bold());
    let entries = dbs.entries();
    for &key in config::DB_KEYS.iter() {
        match entries.iter().find(|(entry_key, _)| *entry_key == key) {
            Some((_, path)) if config::database_exists(key, path) =>
                println!("    {:WIDTH$} {}", key, ext::fmt::path(path).green()),
            Some((_, path)) => println!("    {:WIDTH$} {} ({})", key, ext::fmt::path(path), "missing".red()),
            None => println!("    {:WIDTH$} {}", key, "not set".yellow()),
        }
    }
    log::info!("Found {} out of {} executables", n_found, tools::ALL.len());
    Ok(())
}
