//! Runs selected steps over all samples in the input directory, or over samples given with `-s`.

use crate::{
    ext,
    err::{Error, error},
    pipeline::{Pipeline, sample},
};
use super::common::{self, Mode};

pub(super) fn run(argv: &[String]) -> Result<(), Error> {
    let args = common::parse_args(argv, Mode::Run)?.validate(Mode::Run)?;
    let config = args.build_config()?;
    let pipeline = Pipeline::new(&config, &args.steps, args.fail_fast)?;

    let samples = if args.samples.is_empty() {
        pipeline.discover()?
    } else {
        for name in args.samples.iter() {
            sample::validate_name(name).map_err(Error::InvalidInput)?;
        }
        let mut samples = args.samples.clone();
        samples.sort();
        samples.dedup();
        samples
    };
    if samples.is_empty() {
        return Err(error!(InvalidInput, "No samples found in {}", ext::fmt::path(&config.input_dir)));
    }
    log::info!("Processing {} sample(s) through {} step(s)", samples.len(), args.steps.len());
    let table = pipeline.run(&samples)?;
    common::check_failures(&table)
}
