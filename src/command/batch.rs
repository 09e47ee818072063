//! Runs selected steps over samples from a list file.

use crate::{
    ext,
    err::Error,
    pipeline::{Pipeline, sample},
};
use super::common::{self, Mode};

pub(super) fn run(argv: &[String]) -> Result<(), Error> {
    let args = common::parse_args(argv, Mode::Batch)?.validate(Mode::Batch)?;
    let list = args.sample_list.as_ref()
        .ok_or_else(|| Error::InvalidInput("Sample list is not provided (see -l/--list)".to_string()))?;
    let samples = sample::read_sample_list(list)?;
    if samples.is_empty() {
        return Err(Error::InvalidInput(format!("Sample list {} is empty", ext::fmt::path(list))));
    }
    let config = args.build_config()?;
    let pipeline = Pipeline::new(&config, &args.steps, args.fail_fast)?;
    log::info!("Processing {} sample(s) from {}", samples.len(), ext::fmt::path(list));
    let table = pipeline.run(&samples)?;
    common::check_failures(&table)
}
