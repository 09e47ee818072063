//! Narrow parsers of external tool outputs, one module per format.

pub mod fastx;
pub mod fastp;
pub mod bowtie2;
pub mod kraken;
pub mod humann;
pub mod depth;
pub mod checkm;
pub mod table;

use std::path::Path;
use crate::{
    ext,
    err::Error,
};

/// Attaches the filename to errors, produced while parsing an anonymous stream.
pub(crate) fn in_file(path: &Path) -> impl Fn(Error) -> Error + '_ {
    move |e| match e {
        Error::Io(e, _) => Error::Io(e, vec![path.to_owned()]),
        Error::ParsingError(s) => Error::ParsingError(format!("{}: {}", ext::fmt::path(path), s)),
        e => e,
    }
}
