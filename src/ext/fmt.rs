use std::{
    fmt::{self, Display, Debug},
    path::{Path, PathBuf},
    process::Command,
    ffi::OsStr,
};

/// Pretty path formatting: replace $HOME with ~, put quotes around if needed.
pub fn path(path: &Path) -> String {
    lazy_static::lazy_static!{
        static ref HOME: Option<PathBuf> = std::env::var_os("HOME").map(PathBuf::from);
    }
    if let Some(home) = (*HOME).as_ref() {
        if let Ok(suffix) = path.strip_prefix(home) {
            let tilde_path = Path::new("~").join(suffix);
            return quote_if_needed(&tilde_path.to_string_lossy());
        }
    }
    quote_if_needed(&path.to_string_lossy())
}

fn quote_if_needed(s: &str) -> String {
    if s.contains(char::is_whitespace) { format!("'{}'", s) } else { s.to_owned() }
}

/// Formats multiple paths, separated by comma.
pub fn paths<T: AsRef<Path>>(paths: &[T]) -> String {
    paths.iter().map(|p| path(p.as_ref())).collect::<Vec<_>>().join(", ")
}

/// Converts command into a string, removing quotes if argument has no whitespace, and replacing HOME with ~.
/// Environment variables, set for the command, are written in front.
pub fn command(cmd: &Command) -> String {
    let envs = cmd.get_envs()
        .filter_map(|(key, val)| val.map(|v| format!("{}={}", key.to_string_lossy(), path(Path::new(v)))));
    let args = std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(OsStr::as_ref)
        .map(path);
    envs.chain(args).collect::<Vec<_>>().join(" ")
}

/// Name of the executable, without parent directories.
pub fn program_name(cmd: &Command) -> String {
    let program = Path::new(cmd.get_program());
    program.file_name().unwrap_or(program.as_os_str()).to_string_lossy().into_owned()
}

/// Formats duration as `HH:MM:SS.SSS`.
pub struct Duration(pub std::time::Duration);

impl Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        const IN_HOUR: u64 = 3600;
        const IN_MINUTE: u64 = 60;
        let mut seconds = self.0.as_secs();
        write!(f, "{}:", seconds / IN_HOUR)?;
        seconds %= IN_HOUR;
        write!(f, "{:02}:", seconds / IN_MINUTE)?;
        seconds %= IN_MINUTE;
        write!(f, "{:02}.{:03}", seconds, self.0.subsec_millis())?;
        Ok(())
    }
}

impl Debug for Duration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Current local time, as written into status records.
pub fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_format() {
        let d = Duration(std::time::Duration::from_millis(3_723_045));
        assert_eq!(d.to_string(), "1:02:03.045");
    }

    #[test]
    fn command_with_env() {
        let mut cmd = Command::new("tools/checkm");
        cmd.env("CHECKM_DATA_PATH", "db/checkm").args(["lineage_wf", "-t", "4"]);
        assert_eq!(command(&cmd), "CHECKM_DATA_PATH=db/checkm tools/checkm lineage_wf -t 4");
        assert_eq!(program_name(&cmd), "checkm");
    }

    #[test]
    fn quotes_whitespace() {
        assert_eq!(path(Path::new("data/my reads.fq")), "'data/my reads.fq'");
    }
}
