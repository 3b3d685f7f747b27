//! Mountinfo line parser for Linux systems.
//!
//! Parses lines in `/proc/[pid]/mountinfo` format. See
//! [`proc_pid_mountinfo(5)`](https://man7.org/linux/man-pages/man5/proc_pid_mountinfo.5.html)
//! for details on the structure.

/// Represents a parsed mountinfo line.
#[derive(Debug, PartialEq, Eq)]
pub struct MountInfo<'a> {
    pub mount_id: &'a str,
    pub parent_id: &'a str,
    /// `major:minor` of the device backing the mount.
    pub major_minor: &'a str,
    /// Root of the mount within the filesystem.
    pub root: &'a str,
    /// Mount point relative to the process's root, octal escapes not yet decoded.
    pub mount_point: &'a str,
    pub optional_fields: Vec<&'a str>,
    pub fs_type: &'a str,
    /// Source of the mount (e.g., device).
    pub source: &'a str,
    pub super_options: &'a str,
}

impl MountInfo<'_> {
    /// Splits the `major:minor` field into its numbers.
    pub fn device_numbers(&self) -> Result<(u64, u64), ParseError> {
        let invalid = || ParseError::InvalidMajorMinor(self.major_minor.to_owned());
        let (major, minor) = self.major_minor.split_once(':').ok_or_else(invalid)?;
        Ok((
            major.parse().map_err(|_| invalid())?,
            minor.parse().map_err(|_| invalid())?,
        ))
    }
}

/// Named fields in a mountinfo line.
#[derive(Debug, Clone, Copy)]
pub enum MountInfoField {
    MountId,
    ParentId,
    MajorMinor,
    Root,
    MountPoint,
    FsType,
    Source,
    SuperOptions,
}

impl std::fmt::Display for MountInfoField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MountInfoField::MountId => "mount_id",
            MountInfoField::ParentId => "parent_id",
            MountInfoField::MajorMinor => "major:minor",
            MountInfoField::Root => "root",
            MountInfoField::MountPoint => "mount_point",
            MountInfoField::FsType => "fs_type",
            MountInfoField::Source => "source",
            MountInfoField::SuperOptions => "super_options",
        };
        write!(f, "{name}")
    }
}

/// Errors that may occur when parsing a mountinfo line.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("missing separator ` - ` in line: `{0}`")]
    MissingSeparator(String),

    #[error("missing `{field}` in pre-separator section of line: `{line}`")]
    MissingPreSeparatorField { field: MountInfoField, line: String },

    #[error("missing `{field}` in post-separator section of line: `{line}`")]
    MissingPostSeparatorField { field: MountInfoField, line: String },

    #[error("invalid `major:minor` field `{0}`")]
    InvalidMajorMinor(String),
}

/// Parses a single line of mountinfo data.
///
/// # Errors
///
/// Returns [`ParseError`] variants for a missing separator or missing required fields.
pub fn parse_mount_info_line(line: &str) -> Result<MountInfo<'_>, ParseError> {
    let (pre, post) = line
        .split_once(" - ")
        .ok_or_else(|| ParseError::MissingSeparator(line.to_owned()))?;

    let mut pre_fields = pre.split_whitespace();
    let mut pre_field = |field| {
        pre_fields
            .next()
            .ok_or_else(|| ParseError::MissingPreSeparatorField {
                field,
                line: line.to_owned(),
            })
    };
    let mount_id = pre_field(MountInfoField::MountId)?;
    let parent_id = pre_field(MountInfoField::ParentId)?;
    let major_minor = pre_field(MountInfoField::MajorMinor)?;
    let root = pre_field(MountInfoField::Root)?;
    let mount_point = pre_field(MountInfoField::MountPoint)?;
    let optional_fields: Vec<&str> = pre_fields.collect();

    let mut post_fields = post.split_whitespace();
    let mut post_field = |field| {
        post_fields
            .next()
            .ok_or_else(|| ParseError::MissingPostSeparatorField {
                field,
                line: line.to_owned(),
            })
    };
    let fs_type = post_field(MountInfoField::FsType)?;
    let source = post_field(MountInfoField::Source)?;
    let super_options = post_field(MountInfoField::SuperOptions)?;

    Ok(MountInfo {
        mount_id,
        parent_id,
        major_minor,
        root,
        mount_point,
        optional_fields,
        fs_type,
        source,
        super_options,
    })
}

/// Decodes the `\ooo` octal escapes the kernel uses for spaces, tabs, newlines and
/// backslashes in mount paths.
pub fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                if let Ok(byte) = u8::try_from(value) {
                    out.push(byte);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cgroup_v1_line() {
        let line = "30 24 0:26 / /sys/fs/cgroup/cpu,cpuacct rw,nosuid shared:12 - cgroup cgroup rw,cpu,cpuacct";
        let result = parse_mount_info_line(line).unwrap();

        assert_eq!(result.mount_point, "/sys/fs/cgroup/cpu,cpuacct");
        assert_eq!(result.fs_type, "cgroup");
        assert_eq!(result.super_options, "rw,cpu,cpuacct");
        assert_eq!(result.optional_fields, vec!["rw,nosuid", "shared:12"]);
        assert_eq!(result.device_numbers().unwrap(), (0, 26));
    }

    #[test]
    fn parses_block_device_line() {
        let line = "70 56 8:1 / /var/lib/docker rw,relatime - ext4 /dev/sda1 rw,errors=remount-ro";
        let result = parse_mount_info_line(line).unwrap();
        assert_eq!(result.source, "/dev/sda1");
        assert_eq!(result.device_numbers().unwrap(), (8, 1));
    }

    #[test]
    fn error_on_missing_separator() {
        let line = "42 35 0:22 / /mnt rw,nosuid ext4 /dev/sda1 rw";
        let err = parse_mount_info_line(line).unwrap_err();
        assert!(matches!(err, ParseError::MissingSeparator(_)));
    }

    #[test]
    fn error_on_missing_mount_point() {
        let line = "42 35 0:22 / - ext4 /dev/sda1 rw";
        match parse_mount_info_line(line).unwrap_err() {
            ParseError::MissingPreSeparatorField { field, .. } => {
                assert_eq!(field.to_string(), "mount_point");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn error_on_missing_post_separator_fields() {
        let line = "42 35 0:22 / /mnt - ext4 /dev/sda1";
        match parse_mount_info_line(line).unwrap_err() {
            ParseError::MissingPostSeparatorField { field, .. } => {
                assert_eq!(field.to_string(), "super_options");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn error_on_invalid_device_numbers() {
        let line = "42 35 zero / /mnt - ext4 /dev/sda1 rw";
        let info = parse_mount_info_line(line).unwrap();
        assert!(matches!(
            info.device_numbers(),
            Err(ParseError::InvalidMajorMinor(_))
        ));
    }

    #[test]
    fn unescapes_octal_sequences() {
        assert_eq!(unescape_octal(r"/mnt/my\040disk"), "/mnt/my disk");
        assert_eq!(unescape_octal(r"/a\134b"), r"/a\b");
        assert_eq!(unescape_octal(r"/plain"), "/plain");
        assert_eq!(unescape_octal(r"/trailing\04"), r"/trailing\04");
    }
}
