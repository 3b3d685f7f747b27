use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::fsutil;

use super::parser::{parse_mount_info_line, unescape_octal};
use super::{Error, MountEntry, Result, SUPPORTED_SUBSYSTEMS};

/// Reads every entry of a Linux `mountinfo` file.
///
/// # Errors
///
/// - [`Error::FileOpen`] if the file can't be opened.
/// - [`Error::ReadLine`] if reading from the file fails.
/// - [`Error::Parse`] if parsing any line fails.
///
/// # Example
///
/// ```no_run
/// use creo_collector::mountinfo::read_mount_entries;
///
/// let entries = read_mount_entries("/proc/self/mountinfo").unwrap();
/// println!("{} mounts", entries.len());
/// ```
pub fn read_mount_entries(path: impl AsRef<Path>) -> Result<Vec<MountEntry>> {
    let path = path.as_ref();
    let buf = fsutil::open_file_reader(path)?;

    read_mount_entries_from_reader(buf, path)
}

fn read_mount_entries_from_reader<R: BufRead>(
    mut reader: R,
    origin: &Path,
) -> Result<Vec<MountEntry>> {
    let mut line = String::with_capacity(256);
    let mut line_no = 0;
    let mut entries = Vec::new();

    while reader
        .read_line(&mut line)
        .map_err(|source| Error::ReadLine {
            path: origin.to_path_buf(),
            source,
        })?
        != 0
    {
        line_no += 1;
        let trimmed = line.trim_end();
        if !trimmed.is_empty() {
            let parse_error = |source| Error::Parse {
                path: origin.to_path_buf(),
                line: line_no,
                source,
            };
            let info = parse_mount_info_line(trimmed).map_err(parse_error)?;
            let (major, minor) = info.device_numbers().map_err(parse_error)?;
            entries.push(MountEntry {
                major,
                minor,
                root: PathBuf::from(unescape_octal(info.root)),
                mount_point: PathBuf::from(unescape_octal(info.mount_point)),
                fs_type: info.fs_type.to_owned(),
                source: unescape_octal(info.source),
                super_options: info.super_options.to_owned(),
            });
        }

        line.clear();
    }

    Ok(entries)
}

/// Maps every supported cgroup subsystem to the mount point of its hierarchy.
///
/// Cgroup v1 controller mounts take precedence. Only if no v1 controller is mounted
/// does the first cgroup v2 (unified) mount serve all supported subsystems.
pub fn cgroup_mount_points(entries: &[MountEntry]) -> HashMap<String, PathBuf> {
    let mut mounts = HashMap::new();

    for entry in entries.iter().filter(|e| e.fs_type == "cgroup") {
        for option in entry.super_options.split(',') {
            if SUPPORTED_SUBSYSTEMS.contains(&option) {
                mounts
                    .entry(option.to_owned())
                    .or_insert_with(|| entry.mount_point.clone());
            }
        }
    }
    if !mounts.is_empty() {
        return mounts;
    }

    if let Some(unified) = entries.iter().find(|e| e.fs_type == "cgroup2") {
        log::debug!(
            "using cgroup2 mount `{}` for all subsystems",
            unified.mount_point.display()
        );
        for subsystem in SUPPORTED_SUBSYSTEMS {
            mounts.insert((*subsystem).to_owned(), unified.mount_point.clone());
        }
    }

    mounts
}

/// Finds the mount whose device numbers match. Bind mounts of the same device are
/// skipped in favour of the one mounting the filesystem root.
pub fn find_by_device(entries: &[MountEntry], major: u64, minor: u64) -> Option<&MountEntry> {
    let mut matching = entries
        .iter()
        .filter(|e| e.major == major && e.minor == minor);
    let first = matching.next()?;
    if first.root == Path::new("/") {
        return Some(first);
    }
    matching.find(|e| e.root == Path::new("/")).or(Some(first))
}
