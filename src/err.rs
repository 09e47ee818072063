use std::{
    io, fmt,
    path::PathBuf,
};
use colored::Colorize;
use crate::{
    ext,
    pipeline::runner::ToolFailure,
};

/// General enum, representing possible errors.
#[derive(Debug)]
pub enum Error {
    Io(io::Error, Vec<PathBuf>),
    /// Error, produced by an argument parser.
    Lexopt(lexopt::Error),
    /// Executable not found.
    NoExec(PathBuf),
    /// External tool finished with a non-zero exit code.
    Tool(ToolFailure),
    InvalidInput(String),
    InvalidData(String),
    ParsingError(String),
    RuntimeError(String),
    JsonLoad(String),
}

impl From<lexopt::Error> for Error {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}

impl From<json::JsonError> for Error {
    fn from(e: json::JsonError) -> Self {
        Self::JsonLoad(e.to_string())
    }
}

impl From<ToolFailure> for Error {
    fn from(e: ToolFailure) -> Self {
        Self::Tool(e)
    }
}

impl Error {
    fn label(&self) -> &'static str {
        match self {
            Self::Io(..) => "Input/Output error",
            Self::Lexopt(_) => "Failed to parse command-line arguments",
            Self::NoExec(_) => "Could not find executable",
            Self::Tool(_) => "External tool failed",
            Self::InvalidInput(_) => "Invalid input",
            Self::InvalidData(_) => "Invalid data",
            Self::ParsingError(_) => "Parsing error",
            Self::RuntimeError(_) => "Runtime error",
            Self::JsonLoad(_) => "Could not load JSON",
        }
    }

    fn details(&self) -> String {
        match self {
            Self::Io(e, files) => {
                let mut s = if files.is_empty() {
                    "unnamed streams".to_string()
                } else {
                    ext::fmt::paths(files)
                };
                s.push_str(&format!(": {}", e.kind()));
                if let Some(e2) = e.get_ref() {
                    s.push_str(&format!(", {}", e2));
                }
                s
            }
            Self::Lexopt(e) => e.to_string(),
            Self::NoExec(path) => ext::fmt::path(path),
            Self::Tool(e) => e.to_string(),
            Self::InvalidInput(e) | Self::InvalidData(e) | Self::ParsingError(e) | Self::RuntimeError(e)
                | Self::JsonLoad(e) => e.clone(),
        }
    }

    /// Format error message with colors, for the terminal.
    pub fn display(&self) -> String {
        match self {
            Self::Io(..) => format!("{} in relation to {}", self.label().red(), self.details()),
            Self::NoExec(path) => format!("{} at {}", self.label().red(), ext::fmt::path(path).cyan()),
            Self::Tool(e) => format!("{}: {}", self.label().red(), e),
            _ => format!("{}: {}", self.label().red(), self.details()),
        }
    }
}

/// Plain formatting, used in status records and summaries.
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(..) => write!(f, "{} in relation to {}", self.label(), self.details()),
            Self::NoExec(_) => write!(f, "{} at {}", self.label(), self.details()),
            _ => write!(f, "{}: {}", self.label(), self.details()),
        }
    }
}

macro_rules! validate_param {
    ($cond:expr, $($arg:expr),+) => {{
        if !($cond) {
            (
                Err($crate::Error::InvalidInput(format!($($arg),+)))
            ?)
        }
    }};
}
pub(crate) use validate_param;

macro_rules! add_path {
    (!) => {
        |e| $crate::Error::Io(e, Vec::new())
    };
    ($path:expr) => {
        |e| $crate::Error::Io(e, vec![std::convert::AsRef::<std::path::Path>::as_ref(&$path).to_owned()])
    };
    ($($path:expr),+) => {
        |e| {
            let mut v = Vec::new();
            $(
                v.push(std::convert::AsRef::<std::path::Path>::as_ref(&$path).to_owned());
            )*
            $crate::Error::Io(e, v)
        }
    };
}
pub(crate) use add_path;

macro_rules! error {
    ($var:ident, $($arg:expr),+ $(,)?) => {
        $crate::Error::$var(format!($($arg),+))
    }
}
pub(crate) use error;
