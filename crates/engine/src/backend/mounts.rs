//! Mount table parsing
//!
//! Reads the `/proc/self/mounts` format: whitespace separated fields with
//! spaces, tabs, newlines and backslashes in paths escaped as octal.

use std::fs;
use std::path::Path;

/// Default mount table location
pub const PROC_MOUNTS: &str = "/proc/self/mounts";

/// One line of the mount table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Mounted source, e.g. `/dev/sdb1`
    pub source: String,
    /// Mount directory
    pub mount_point: String,
    /// Filesystem type
    pub fs_type: String,
}

/// Parse mount table content, skipping malformed lines
pub fn parse_mount_table(content: &str) -> Vec<MountEntry> {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let source = fields.next()?;
            let mount_point = fields.next()?;
            let fs_type = fields.next().unwrap_or_default();

            Some(MountEntry {
                source: unescape(source),
                mount_point: unescape(mount_point),
                fs_type: fs_type.to_string(),
            })
        })
        .collect()
}

/// Read and parse a mount table file
pub fn read_mount_table(path: &Path) -> common::Result<Vec<MountEntry>> {
    let content = fs::read_to_string(path).map_err(|e| {
        common::Error::Mount(format!("Failed to read {}: {}", path.display(), e))
    })?;

    Ok(parse_mount_table(&content))
}

/// First mount point of any of `names`, tried in order
///
/// Names are kernel block device names (`sdb`, `sdb1`), matched against
/// `/dev/<name>` sources.
pub fn find_mount_point(entries: &[MountEntry], names: &[String]) -> Option<String> {
    names.iter().find_map(|name| {
        let source = format!("/dev/{}", name);
        entries
            .iter()
            .find(|e| e.source == source)
            .map(|e| e.mount_point.clone())
    })
}

/// Decode `\NNN` octal escapes
pub fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && is_octal_escape(&bytes[i + 1..i + 4]) {
            let value = (bytes[i + 1] - b'0') * 64 + (bytes[i + 2] - b'0') * 8 + (bytes[i + 3] - b'0');
            out.push(value);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn is_octal_escape(digits: &[u8]) -> bool {
    digits.len() == 3
        && (b'0'..=b'3').contains(&digits[0])
        && digits[1..].iter().all(|d| (b'0'..=b'7').contains(d))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
sysfs /sys sysfs rw,nosuid,nodev,noexec,relatime 0 0
/dev/nvme0n1p2 / ext4 rw,relatime 0 0
/dev/sdb1 /media/user/My\\040Drive vfat rw,nosuid,nodev 0 0
/dev/sdc /media/user/RAW exfat rw 0 0
broken
";

    #[test]
    fn test_parse_mount_table() {
        let entries = parse_mount_table(TABLE);

        assert_eq!(entries.len(), 4);
        assert_eq!(entries[2].source, "/dev/sdb1");
        assert_eq!(entries[2].mount_point, "/media/user/My Drive");
        assert_eq!(entries[2].fs_type, "vfat");
    }

    #[test]
    fn test_find_mount_point_order() {
        let entries = parse_mount_table(TABLE);
        let names = vec!["sdb".to_string(), "sdb1".to_string()];

        assert_eq!(
            find_mount_point(&entries, &names).as_deref(),
            Some("/media/user/My Drive")
        );
    }

    #[test]
    fn test_whole_disk_mount() {
        let entries = parse_mount_table(TABLE);
        let names = vec!["sdc".to_string()];

        assert_eq!(
            find_mount_point(&entries, &names).as_deref(),
            Some("/media/user/RAW")
        );
    }

    #[test]
    fn test_unmounted_device() {
        let entries = parse_mount_table(TABLE);
        assert_eq!(find_mount_point(&entries, &["sdd1".to_string()]), None);
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("a\\040b\\011c"), "a b\tc");
        assert_eq!(unescape("back\\134slash"), "back\\slash");
        assert_eq!(unescape("trailing\\04"), "trailing\\04");
        assert_eq!(unescape("\\999"), "\\999");
    }

    #[test]
    fn test_read_mount_table_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_mount_table(&dir.path().join("mounts")).is_err());
    }
}
