//! Asks for confirmation before each step, then runs the step over all discovered samples.

use std::io::{self, BufRead, Write};
use colored::Colorize;
use crate::{
    err::{Error, error, add_path},
    pipeline::Pipeline,
};
use super::common::{self, Mode};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Answer {
    Yes,
    No,
    Quit,
}

/// Asks a `[y/N/q]` question until the answer is recognized. End of input counts as quit.
fn confirm<R: BufRead, W: Write>(mut input: R, mut output: W, question: &str) -> io::Result<Answer> {
    let mut line = String::new();
    loop {
        write!(output, "{} [y/N/q] ", question)?;
        output.flush()?;
        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            return Ok(Answer::Quit);
        }
        match &line.trim().to_lowercase() as &str {
            "y" | "yes" => return Ok(Answer::Yes),
            "" | "n" | "no" => return Ok(Answer::No),
            "q" | "quit" | "exit" => return Ok(Answer::Quit),
            other => writeln!(output, "Unexpected answer {:?}", other)?,
        }
    }
}

pub(super) fn run(argv: &[String]) -> Result<(), Error> {
    let args = common::parse_args(argv, Mode::Interactive)?.validate(Mode::Interactive)?;
    let config = args.build_config()?;
    let stdin = io::stdin();
    let mut failed = Vec::new();
    for &kind in args.steps.iter() {
        let question = format!("Run {} ({})?", kind.title().bold(), kind.dir_name());
        match confirm(stdin.lock(), io::stderr(), &question).map_err(add_path!(!))? {
            Answer::Yes => {}
            Answer::No => {
                log::info!("Step {} is not selected", kind);
                continue;
            }
            Answer::Quit => {
                log::info!("Quitting");
                break;
            }
        }
        let pipeline = Pipeline::new(&config, &[kind], args.fail_fast)?;
        let samples = pipeline.discover()?;
        if samples.is_empty() {
            log::warn!("{}: no samples found", kind.title());
            continue;
        }
        let table = pipeline.run(&samples)?;
        failed.extend(table.failed_samples().into_iter().map(|sample| format!("{}/{}", sample, kind)));
        if args.fail_fast && !failed.is_empty() {
            break;
        }
    }
    if failed.is_empty() {
        Ok(())
    } else {
        Err(error!(RuntimeError, "Failed: {}", failed.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ask(input: &str) -> (Answer, String) {
        let mut output = Vec::new();
        let answer = confirm(input.as_bytes(), &mut output, "Run step?").unwrap();
        (answer, String::from_utf8(output).unwrap())
    }

    #[test]
    fn answers() {
        assert_eq!(ask("y\n").0, Answer::Yes);
        assert_eq!(ask(" YES \n").0, Answer::Yes);
        assert_eq!(ask("\n").0, Answer::No);
        assert_eq!(ask("n\n").0, Answer::No);
        assert_eq!(ask("q\n").0, Answer::Quit);
        assert_eq!(ask("").0, Answer::Quit);

        let (answer, output) = ask("maybe\ny\n");
        assert_eq!(answer, Answer::Yes);
        assert_eq!(output.matches("[y/N/q]").count(), 2);
        assert!(output.contains("Unexpected answer \"maybe\""));
    }
}
