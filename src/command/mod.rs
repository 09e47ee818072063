mod common;
mod run;
mod batch;
mod interactive;
mod dbconfig;
mod check;

use std::fmt::Display;
use colored::{Colorize, ColoredString};
use crate::{Error, err::error};

const PROGRAM: &str = env!("CARGO_PKG_NAME");

/// Print tool version and authors.
fn print_version() {
    println!("{} {}", PROGRAM.underline(), format!("v{}", env!("CARGO_PKG_VERSION")).green());
    let authors: Vec<_> = env!("CARGO_PKG_AUTHORS").split(':').filter(|s| !s.is_empty()).collect();
    let n = authors.len();
    if n == 0 {
        return;
    }
    print!("Created by ");
    for (i, author) in authors.iter().enumerate() {
        if i == 0 {
            print!("{}", author.bright_blue());
        } else if i < n - 1 {
            print!(", {}", author.bright_blue());
        } else {
            print!(" and {}", author.bright_blue());
        }
    }
    println!();
}

/// Formats default value for the help message.
fn fmt_def(val: impl Display) -> ColoredString {
    val.to_string().cyan()
}

/// Placeholder for arguments without values.
fn flag() -> ColoredString {
    "".normal()
}

fn print_help() {
    print_version();
    println!("\n{} {} command [arguments]", "Usage:".bold(), PROGRAM);

    println!("\n{}", "[ Running the pipeline ]".bold());
    println!("    {:<11}  Run steps over all samples in the input directory.", "run".red());
    println!("    {:<11}  Run steps over samples from a list.", "batch".red());
    println!("    {:<11}  Confirm each step before running it.", "interactive".red());

    println!("\n{}", "[ Setting up ]".bold());
    println!("    {:<11}  Record database locations.", "dbconfig".red());
    println!("    {:<11}  Check executables and databases.", "check".red());

    println!("\n{}", "[ General help ]".bold());
    println!("    {:<11}  Show this help message.", "help".red());
    println!("    {:<11}  Show version.", "version".red());
}

pub fn run(argv: &[String]) -> Result<(), Error> {
    if argv.len() <= 1 {
        print_help();
        std::process::exit(1);
    }
    match &argv[1] as &str {
        "run" => run::run(&argv[2..])?,
        "batch" => batch::run(&argv[2..])?,
        "interactive" | "i" => interactive::run(&argv[2..])?,
        "dbconfig" | "db" => dbconfig::run(&argv[2..])?,
        "check" => check::run(&argv[2..])?,
        "help" | "h" | "--help" | "-h" => print_help(),
        "version" | "--version" | "-V" => print_version(),
        cmd => {
            print_help();
            return Err(error!(InvalidInput, "Unknown command {:?}", cmd));
        }
    }
    Ok(())
}
