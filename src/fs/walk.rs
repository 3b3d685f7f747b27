use std::collections::HashSet;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use super::{Error, Result};

/// Size of the unit `st_blocks` is counted in.
const BLOCK_SIZE: u64 = 512;

/// Disk usage of a directory tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirUsage {
    /// Allocated bytes.
    pub bytes: u64,
    /// Number of entries, the root included.
    pub inodes: u64,
}

/// Measures the allocated size of the tree rooted at `root`.
///
/// Stays on the filesystem of `root` and does not follow symlinks. Files with
/// several hard links inside the tree are counted once. Entries removed while
/// walking are skipped.
///
/// # Errors
///
/// Returns [`Error::Walk`] if `root` cannot be inspected or a directory cannot be
/// listed.
pub fn dir_usage(root: &Path) -> Result<DirUsage> {
    let walk_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| Error::Walk { path, source }
    };

    let meta = std::fs::symlink_metadata(root).map_err(walk_error(root))?;
    let device = meta.dev();
    let mut usage = DirUsage {
        bytes: meta.blocks() * BLOCK_SIZE,
        inodes: 1,
    };
    if !meta.is_dir() {
        return Ok(usage);
    }

    let mut seen_links = HashSet::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(err) => return Err(walk_error(&dir)(err)),
        };
        for entry in entries {
            let entry = entry.map_err(walk_error(&dir))?;
            // DirEntry::metadata does not traverse symlinks.
            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(walk_error(&entry.path())(err)),
            };
            if meta.dev() != device {
                continue;
            }
            if meta.nlink() > 1 && !meta.is_dir() && !seen_links.insert((meta.dev(), meta.ino())) {
                continue;
            }

            usage.bytes += meta.blocks() * BLOCK_SIZE;
            usage.inodes += 1;
            if meta.is_dir() {
                stack.push(entry.path());
            }
        }
    }

    Ok(usage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_entries_and_blocks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/data"), vec![1u8; 64 * 1024]).unwrap();
        std::fs::write(dir.path().join("empty"), b"").unwrap();

        let usage = dir_usage(dir.path()).unwrap();
        assert_eq!(usage.inodes, 4);
        assert!(usage.bytes >= 64 * 1024);
    }

    #[test]
    fn test_hard_links_counted_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), vec![1u8; 16 * 1024]).unwrap();
        let single = dir_usage(dir.path()).unwrap();

        std::fs::hard_link(dir.path().join("a"), dir.path().join("b")).unwrap();
        let linked = dir_usage(dir.path()).unwrap();
        assert_eq!(linked.bytes, single.bytes);
        assert_eq!(linked.inodes, single.inodes);
    }

    #[test]
    fn test_symlinks_not_followed() {
        let target = tempfile::tempdir().unwrap();
        std::fs::write(target.path().join("big"), vec![1u8; 256 * 1024]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(target.path(), dir.path().join("link")).unwrap();

        let usage = dir_usage(dir.path()).unwrap();
        assert_eq!(usage.inodes, 2);
        assert!(usage.bytes < 256 * 1024);
    }

    #[test]
    fn test_missing_root() {
        let err = dir_usage(Path::new("/definitely/does/not/exist")).unwrap_err();
        assert!(matches!(err, Error::Walk { .. }));
    }
}
