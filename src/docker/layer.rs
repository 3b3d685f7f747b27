//! Mapping from cgroup names and storage drivers to on-disk container layout.

use std::path::{Path, PathBuf};

use super::{Error, Result, StorageDriver};

const DOCKER_ID_LEN: usize = 64;

/// Directory below the storage dir holding per-container state and logs.
pub const CONTAINERS_DIR: &str = "containers";

fn is_id_char(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit()
}

/// Finds the first run of 64 lowercase alphanumeric characters.
fn find_docker_id(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    let mut run_start = 0;
    for (i, &b) in bytes.iter().enumerate() {
        if !is_id_char(b) {
            run_start = i + 1;
        } else if i + 1 - run_start == DOCKER_ID_LEN {
            return Some(&s[run_start..=i]);
        }
    }
    None
}

fn base_name(name: &str) -> &str {
    let trimmed = name.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Extracts the Docker container id from a cgroup name.
///
/// Handles both `/docker/<id>` and systemd's `/system.slice/docker-<id>.scope`. If
/// the last component carries no id, it is returned as is.
pub fn container_name_to_docker_id(name: &str) -> String {
    let base = base_name(name);
    find_docker_id(base).unwrap_or(base).to_owned()
}

/// Whether the cgroup name looks like a Docker container.
pub fn is_container_name(name: &str) -> bool {
    // Mount units share the scope's id but belong to systemd.
    if name.ends_with(".mount") {
        return false;
    }
    find_docker_id(base_name(name)).is_some()
}

/// Id of the container's read-write layer.
///
/// Docker 1.10 introduced random layer ids; from then on the id is read from the
/// layer database's `mount-id` file.
///
/// # Errors
///
/// Returns [`Error::ReadMountId`] if the `mount-id` file cannot be read.
pub fn rw_layer_id(
    container_id: &str,
    storage_dir: &Path,
    driver: &StorageDriver,
    version: [u64; 3],
) -> Result<String> {
    if version[0] <= 1 && version[1] < 10 {
        return Ok(container_id.to_owned());
    }

    let path = storage_dir
        .join("image")
        .join(driver.as_str())
        .join("layerdb/mounts")
        .join(container_id)
        .join("mount-id");
    let id = std::fs::read_to_string(&path).map_err(|source| Error::ReadMountId { path, source })?;
    Ok(id.trim().to_owned())
}

/// Directory holding the container's writable layer, for drivers that have one.
pub fn rootfs_storage_dir(storage_dir: &Path, driver: &StorageDriver, rw_layer_id: &str) -> Option<PathBuf> {
    let layer_dir = match driver {
        StorageDriver::Aufs => storage_dir.join("aufs/diff").join(rw_layer_id),
        StorageDriver::Overlay => storage_dir.join("overlay").join(rw_layer_id).join("upper"),
        StorageDriver::Overlay2 => storage_dir.join("overlay2").join(rw_layer_id).join("diff"),
        StorageDriver::Devicemapper | StorageDriver::Zfs | StorageDriver::Other(_) => return None,
    };
    Some(layer_dir)
}

/// ZFS dataset of the container's writable layer.
pub fn zfs_filesystem(parent_dataset: &str, rw_layer_id: &str) -> String {
    format!("{parent_dataset}/{rw_layer_id}")
}

/// Directory of the container's logs and config.
pub fn log_dir(storage_dir: &Path, container_id: &str) -> PathBuf {
    storage_dir.join(CONTAINERS_DIR).join(container_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "4f1a2b3c4d5e6f708192a3b4c5d6e7f8091a2b3c4d5e6f708192a3b4c5d6e7f8";

    #[test]
    fn test_docker_id_from_cgroup_names() {
        assert_eq!(container_name_to_docker_id(&format!("/docker/{ID}")), ID);
        assert_eq!(
            container_name_to_docker_id(&format!("/system.slice/docker-{ID}.scope")),
            ID
        );
        assert_eq!(container_name_to_docker_id("/docker/abc123"), "abc123");
        assert_eq!(container_name_to_docker_id("/"), "");
    }

    #[test]
    fn test_is_container_name() {
        assert!(is_container_name(&format!("/docker/{ID}")));
        assert!(is_container_name(&format!("/system.slice/docker-{ID}.scope")));
        assert!(!is_container_name(&format!(
            "/system.slice/var-lib-docker-containers-{ID}-mounts-shm.mount"
        )));
        assert!(!is_container_name("/system.slice/sshd.service"));
        assert!(!is_container_name(&format!("/docker/{}", &ID[..63])));
        assert!(!is_container_name(&format!("/docker/{}", ID.to_uppercase())));
    }

    #[test]
    fn test_layer_id_before_random_ids() {
        let dir = tempfile::tempdir().unwrap();
        for version in [[1, 9, 1], [0, 12, 0]] {
            let id = rw_layer_id("abc123", dir.path(), &StorageDriver::Aufs, version).unwrap();
            assert_eq!(id, "abc123");
        }
    }

    #[test]
    fn test_layer_id_from_mount_id_file() {
        let storage = tempfile::tempdir().unwrap();
        let mounts = storage.path().join("image/overlay2/layerdb/mounts/abc123");
        std::fs::create_dir_all(&mounts).unwrap();
        std::fs::write(mounts.join("mount-id"), "f00dcafe\n").unwrap();

        let layer = rw_layer_id("abc123", storage.path(), &StorageDriver::Overlay2, [1, 11, 0]).unwrap();
        assert_eq!(layer, "f00dcafe");
        assert_eq!(
            rootfs_storage_dir(storage.path(), &StorageDriver::Overlay2, &layer),
            Some(storage.path().join("overlay2/f00dcafe/diff"))
        );

        // 2.x releases read the file as well.
        let layer = rw_layer_id("abc123", storage.path(), &StorageDriver::Overlay2, [2, 0, 0]).unwrap();
        assert_eq!(layer, "f00dcafe");
    }

    #[test]
    fn test_layer_id_missing_mount_id_file() {
        let storage = tempfile::tempdir().unwrap();
        let err = rw_layer_id("abc123", storage.path(), &StorageDriver::Overlay2, [20, 10, 7]).unwrap_err();
        assert!(matches!(err, Error::ReadMountId { .. }));
    }

    #[test]
    fn test_rootfs_layout_per_driver() {
        let storage = Path::new("/var/lib/docker");
        assert_eq!(
            rootfs_storage_dir(storage, &StorageDriver::Aufs, "l1"),
            Some(PathBuf::from("/var/lib/docker/aufs/diff/l1"))
        );
        assert_eq!(
            rootfs_storage_dir(storage, &StorageDriver::Overlay, "l1"),
            Some(PathBuf::from("/var/lib/docker/overlay/l1/upper"))
        );
        assert_eq!(
            rootfs_storage_dir(storage, &StorageDriver::Overlay2, "l1"),
            Some(PathBuf::from("/var/lib/docker/overlay2/l1/diff"))
        );
        assert_eq!(rootfs_storage_dir(storage, &StorageDriver::Devicemapper, "l1"), None);
        assert_eq!(rootfs_storage_dir(storage, &StorageDriver::Zfs, "l1"), None);
        assert_eq!(
            rootfs_storage_dir(storage, &StorageDriver::Other("btrfs".to_owned()), "l1"),
            None
        );
        assert_eq!(zfs_filesystem("tank/docker", "l1"), "tank/docker/l1");
        assert_eq!(
            log_dir(storage, "abc"),
            PathBuf::from("/var/lib/docker/containers/abc")
        );
    }
}
