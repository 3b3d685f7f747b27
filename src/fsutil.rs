use std::ffi::CString;
use std::fs::File;
use std::io::{self, BufReader};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Error that occurs when opening a file fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to open file `{path}`: {source}")]
pub struct FileOpenError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Opens a file at the given path and wraps it in a [`BufReader`].
///
/// # Errors
///
/// Returns a [`FileOpenError`] if the file cannot be opened.
///
/// # Example
/// ```no_run
/// # use creo_collector::fsutil;
/// let reader = fsutil::open_file_reader("/some/file.txt")?;
/// # Ok::<(), fsutil::FileOpenError>(())
/// ```
pub fn open_file_reader(path: impl AsRef<Path>) -> Result<BufReader<File>, FileOpenError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| FileOpenError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Splits a `dev_t` into its major and minor numbers.
pub fn split_device(dev: u64) -> (u64, u64) {
    let dev = dev as libc::dev_t;
    (u64::from(libc::major(dev)), u64::from(libc::minor(dev)))
}

/// Total size in bytes of the filesystem containing `path`, as reported by `statvfs(3)`.
pub fn fs_capacity(path: impl AsRef<Path>) -> io::Result<u64> {
    let path = CString::new(path.as_ref().as_os_str().as_bytes())
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
    let mut stat = std::mem::MaybeUninit::<libc::statvfs>::zeroed();
    // SAFETY: `path` is NUL-terminated and `stat` points to writable memory of the right size.
    let ret = unsafe { libc::statvfs(path.as_ptr(), stat.as_mut_ptr()) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: `statvfs` returned success, so the struct is initialized.
    let stat = unsafe { stat.assume_init() };
    Ok(stat.f_blocks as u64 * stat.f_frsize as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_file_reader_reads_lines() {
        use std::io::BufRead;

        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "8 0 sda\n8 1 sda1\n").unwrap();
        let lines: Vec<String> = open_file_reader(tmp.path())
            .unwrap()
            .lines()
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(lines, vec!["8 0 sda", "8 1 sda1"]);
    }

    #[test]
    fn test_open_file_reader_reports_path() {
        let err = open_file_reader("/definitely/does/not/exist").unwrap_err();
        assert_eq!(err.path, PathBuf::from("/definitely/does/not/exist"));
        assert_eq!(err.source.kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("/definitely/does/not/exist"));
    }

    #[test]
    fn test_split_device() {
        assert_eq!(split_device(0x0801), (8, 1));
        assert_eq!(split_device(0xfd00), (253, 0));
        assert_eq!(split_device(libc::makedev(259, 65536) as u64), (259, 65536));
    }

    #[test]
    fn test_fs_capacity() {
        let dir = tempfile::tempdir().unwrap();
        assert!(fs_capacity(dir.path()).unwrap() > 0);
        assert!(fs_capacity("/definitely/does/not/exist").is_err());
    }
}
