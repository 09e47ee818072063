use std::{
    io::{self, Read, BufRead, BufReader, Write, BufWriter, stdin},
    fs::{self, File},
    path::{Path, PathBuf},
    ffi::OsStr,
    process::{Child, ExitStatus},
};
use flate2::bufread::MultiGzDecoder;
use crate::err::{Error, add_path};

/// Finds an executable, and returns Error, if executable is not available.
pub fn find_exe(p: impl AsRef<Path>) -> Result<PathBuf, Error> {
    which::which(p.as_ref()).map_err(|_| Error::NoExec(p.as_ref().to_owned()))
}

/// Returns
/// - stdin if filename is `-`,
/// - gzip reader if the file starts with the gzip magic number,
/// - regular text file otherwise.
pub fn open(filename: &Path) -> io::Result<Box<dyn BufRead + Send>> {
    if filename == OsStr::new("-") || filename == OsStr::new("/dev/stdin") {
        Ok(Box::new(BufReader::new(stdin())))
    } else {
        let mut stream = BufReader::new(File::open(filename)?);
        let mut two_bytes = [0_u8; 2];
        let bytes_read = stream.read(&mut two_bytes)?;
        stream.seek_relative(-(bytes_read as i64))?;
        // Check gzip magic number.
        if bytes_read == 2 && two_bytes[0] == 0x1f && two_bytes[1] == 0x8b {
            Ok(Box::new(BufReader::new(MultiGzDecoder::new(stream))))
        } else {
            Ok(Box::new(stream))
        }
    }
}

/// Creates a buffered file.
pub fn create_file(filename: &Path) -> Result<BufWriter<File>, Error> {
    File::create(filename).map_err(add_path!(filename)).map(BufWriter::new)
}

/// Writes the file through a temporary `<filename>.tmp`, which is renamed at the end.
/// This way, the file is either absent, or complete.
pub fn write_atomic<F>(filename: &Path, write: F) -> Result<(), Error>
where F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let tmp_filename = append_path(filename, ".tmp");
    let mut writer = create_file(&tmp_filename)?;
    write(&mut writer).map_err(add_path!(tmp_filename))?;
    let file = writer.into_inner().map_err(|e| Error::Io(e.into_error(), vec![tmp_filename.clone()]))?;
    file.sync_all().map_err(add_path!(tmp_filename))?;
    fs::rename(&tmp_filename, filename).map_err(add_path!(tmp_filename, filename))
}

/// Loads full JSON contents from a file.
pub fn load_json(filename: &Path) -> Result<json::JsonValue, Error> {
    let mut s = String::new();
    open(filename).and_then(|mut stream| stream.read_to_string(&mut s)).map_err(add_path!(filename))?;
    json::parse(&s).map_err(|e| Error::JsonLoad(format!("{} ({})", e, super::fmt::path(filename))))
}

/// Finds all filenames with appropriate extension in the directory, sorted by name.
pub fn filenames_with_ext(dir: &Path, ext: impl AsRef<OsStr>) -> io::Result<Vec<PathBuf>> {
    let mut res = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && path.extension() == Some(ext.as_ref()) {
            res.push(path);
        }
    }
    res.sort();
    Ok(res)
}

/// Returns a path with a new suffix appended to the end.
pub fn append_path(path: &Path, suffix: impl AsRef<OsStr>) -> PathBuf {
    let mut os_string = path.as_os_str().to_owned();
    os_string.push(suffix.as_ref());
    os_string.into()
}

/// Makes the path absolute (relative to the current directory) without resolving symbolic links.
pub fn absolute(path: &Path) -> Result<PathBuf, Error> {
    if path.is_absolute() {
        Ok(path.to_owned())
    } else {
        std::env::current_dir().map(|dir| dir.join(path)).map_err(add_path!(path))
    }
}

/// Create directory together with its parents, if it does not exist yet.
pub fn mkdir(path: impl AsRef<Path>) -> Result<(), Error> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path).map_err(add_path!(path))
    } else {
        Ok(())
    }
}

/// Removes file or directory, if it exists.
pub fn remove_path(path: &Path) -> Result<(), Error> {
    match fs::symlink_metadata(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(e, vec![path.to_owned()])),
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path).map_err(add_path!(path)),
        Ok(_) => fs::remove_file(path).map_err(add_path!(path)),
    }
}

/// Concatenates files byte by byte.
/// Concatenation of gzip files is a valid multi-member gzip file.
pub fn concat_files(inputs: &[&Path], output: &Path) -> Result<u64, Error> {
    let mut writer = create_file(output)?;
    let mut total = 0;
    for &input in inputs {
        let mut reader = File::open(input).map_err(add_path!(input))?;
        total += io::copy(&mut reader, &mut writer).map_err(add_path!(input, output))?;
    }
    writer.flush().map_err(add_path!(output))?;
    Ok(total)
}

/// RAII child wrapper, that kills the child if it gets dropped.
pub struct ChildGuard {
    child: Child,
    armed: bool,
}

impl ChildGuard {
    pub fn new(child: Child) -> Self {
        Self {
            child,
            armed: true,
        }
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Waits for the child to finish, after that the child no longer needs to be killed.
    pub fn wait(&mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait()?;
        self.disarm();
        Ok(status)
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if self.armed {
            match self.child.kill() {
                Err(e) => {
                    // InvalidInput means that the process exited already.
                    if e.kind() != io::ErrorKind::InvalidInput {
                        log::error!("Could not kill child process: {}", e);
                    }
                }
                Ok(_) => log::error!("Successfully killed child process"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};

    fn read_all(path: &Path) -> String {
        let mut s = String::new();
        open(path).unwrap().read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn open_detects_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plain.txt");
        fs::write(&plain, "x\ny\n").unwrap();
        let gz = dir.path().join("packed");
        let mut enc = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        enc.write_all(b"x\ny\nz\n").unwrap();
        enc.finish().unwrap();

        assert_eq!(read_all(&plain), "x\ny\n");
        assert_eq!(read_all(&gz), "x\ny\nz\n");
    }

    #[test]
    fn concatenated_gzip_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let mut parts = Vec::new();
        for (i, text) in ["a\nb\n", "c\n"].iter().enumerate() {
            let path = dir.path().join(format!("{}.gz", i));
            let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
            enc.write_all(text.as_bytes()).unwrap();
            enc.finish().unwrap();
            parts.push(path);
        }
        let out = dir.path().join("all.gz");
        let inputs: Vec<&Path> = parts.iter().map(PathBuf::as_path).collect();
        concat_files(&inputs, &out).unwrap();
        assert_eq!(read_all(&out), "a\nb\nc\n");
    }

    #[test]
    fn atomic_write_leaves_no_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.json");
        write_atomic(&path, |w| w.write_all(b"{}")).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
        assert!(!append_path(&path, ".tmp").exists());
    }

    #[test]
    fn remove_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        remove_path(&sub).unwrap();
        mkdir(sub.join("inner")).unwrap();
        remove_path(&sub).unwrap();
        assert!(!sub.exists());
    }
}
