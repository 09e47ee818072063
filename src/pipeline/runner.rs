//! Invocation of external tools. Every tool writes its stdout and stderr into the append-only log
//! of the (sample, step); failures are returned as values with the exit code and the last log lines.

use std::{
    fmt,
    fs::{self, File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
    time::Instant,
};
use crate::{
    ext,
    err::{Error, add_path},
};

/// Number of log lines, reported on failure.
const TAIL_LINES: usize = 8;

/// External tool finished unsuccessfully.
#[derive(Debug, Clone)]
pub struct ToolFailure {
    pub tool: String,
    /// None if the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub log: PathBuf,
    pub tail: Vec<String>,
}

impl ToolFailure {
    fn new(cmd: &Command, status: ExitStatus, log: &Path, output: &str) -> Self {
        let lines: Vec<&str> = output.lines().filter(|line| !line.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(TAIL_LINES);
        Self {
            tool: ext::fmt::program_name(cmd),
            exit_code: status.code(),
            log: log.to_owned(),
            tail: lines[start..].iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "{} exited with code {}", self.tool, code)?,
            None => write!(f, "{} was terminated by a signal", self.tool)?,
        }
        write!(f, " (see {})", ext::fmt::path(&self.log))?;
        for line in self.tail.iter() {
            write!(f, "\n    {}", line)?;
        }
        Ok(())
    }
}

/// Runs commands, appending their output to a single log file.
pub struct ToolRunner {
    log_path: PathBuf,
}

impl ToolRunner {
    pub fn new(log_path: PathBuf) -> Result<Self, Error> {
        if let Some(parent) = log_path.parent() {
            ext::sys::mkdir(parent)?;
        }
        Ok(Self { log_path })
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Opens the log for appending, writes the command header, and returns the file together with
    /// the offset, from which the command output starts.
    fn open_log(&self, header: &str) -> Result<(File, u64), Error> {
        let mut log = OpenOptions::new().create(true).append(true).open(&self.log_path)
            .map_err(add_path!(self.log_path))?;
        writeln!(log, "### [{}] {}", ext::fmt::timestamp(), header).map_err(add_path!(self.log_path))?;
        let offset = log.metadata().map_err(add_path!(self.log_path))?.len();
        Ok((log, offset))
    }

    fn log_handle(&self, log: &File) -> Result<Stdio, Error> {
        log.try_clone().map(Stdio::from).map_err(add_path!(self.log_path))
    }

    /// Reads everything that was appended to the log after `offset`.
    fn read_since(&self, offset: u64) -> Result<String, Error> {
        let mut file = File::open(&self.log_path).map_err(add_path!(self.log_path))?;
        file.seek(SeekFrom::Start(offset)).map_err(add_path!(self.log_path))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(add_path!(self.log_path))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn finish(&self, cmd: &Command, status: ExitStatus, offset: u64, start: Instant) -> Result<String, Error> {
        let output = self.read_since(offset)?;
        log::debug!("        Finished in {}", ext::fmt::Duration(start.elapsed()));
        if status.success() {
            Ok(output)
        } else {
            Err(Error::Tool(ToolFailure::new(cmd, status, &self.log_path, &output)))
        }
    }

    /// Runs the command, stdout and stderr go to the log.
    /// Returns the text, that the command wrote.
    pub fn run(&self, cmd: &mut Command) -> Result<String, Error> {
        let cmd_str = ext::fmt::command(cmd);
        log::debug!("        {}", cmd_str);
        let (log, offset) = self.open_log(&cmd_str)?;
        cmd.stdin(Stdio::null()).stdout(self.log_handle(&log)?).stderr(self.log_handle(&log)?);
        let start = Instant::now();
        let status = cmd.status().map_err(|e| spawn_error(cmd, e))?;
        self.finish(cmd, status, offset, start)
    }

    /// Runs the command, stdout is written to `out_path` (through a temporary file), stderr goes to the log.
    pub fn run_to_file(&self, cmd: &mut Command, out_path: &Path) -> Result<String, Error> {
        let cmd_str = format!("{} > {}", ext::fmt::command(cmd), ext::fmt::path(out_path));
        log::debug!("        {}", cmd_str);
        let (log, offset) = self.open_log(&cmd_str)?;
        let stderr = self.log_handle(&log)?;
        let tmp_path = ext::sys::append_path(out_path, ".tmp");
        let out_file = File::create(&tmp_path).map_err(add_path!(tmp_path))?;
        cmd.stdin(Stdio::null()).stdout(Stdio::from(out_file)).stderr(stderr);
        let start = Instant::now();
        let res = cmd.status().map_err(|e| spawn_error(cmd, e))
            .and_then(|status| self.finish(cmd, status, offset, start));
        match res {
            Ok(output) => {
                fs::rename(&tmp_path, out_path).map_err(add_path!(tmp_path, out_path))?;
                Ok(output)
            }
            Err(e) => {
                if let Err(rm_err) = ext::sys::remove_path(&tmp_path) {
                    log::warn!("Cannot remove {}: {}", ext::fmt::path(&tmp_path), rm_err.display());
                }
                Err(e)
            }
        }
    }

    /// Runs `first | second`. Stderr of both commands, as well as stdout of the second command, go to the log.
    pub fn run_piped(&self, first: &mut Command, second: &mut Command) -> Result<String, Error> {
        let cmd_str = format!("{} | {}", ext::fmt::command(first), ext::fmt::command(second));
        log::debug!("        {}", cmd_str);
        let (log, offset) = self.open_log(&cmd_str)?;
        first.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(self.log_handle(&log)?);
        let start = Instant::now();
        let mut first_child = first.spawn().map_err(|e| spawn_error(first, e))?;
        let first_stdout = first_child.stdout.take();
        let mut guard = ext::sys::ChildGuard::new(first_child);
        let first_stdout = first_stdout.ok_or_else(||
            Error::RuntimeError(format!("Cannot capture stdout of {}", ext::fmt::program_name(first))))?;

        second.stdin(Stdio::from(first_stdout)).stdout(self.log_handle(&log)?).stderr(self.log_handle(&log)?);
        let second_status = second.status().map_err(|e| spawn_error(second, e))?;
        let first_status = guard.wait().map_err(add_path!(!))?;
        if !first_status.success() {
            return self.finish(first, first_status, offset, start);
        }
        self.finish(second, second_status, offset, start)
    }
}

fn spawn_error(cmd: &Command, e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::NotFound {
        Error::NoExec(PathBuf::from(cmd.get_program()))
    } else {
        Error::Io(e, vec![PathBuf::from(cmd.get_program())])
    }
}
