use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

static SNAP_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^backup\.([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})\.snap\.([0-9]+)\.([0-9]+)$")
        .unwrap()
});

/// Width of the zero padded seconds part of a snapshot name.
const TIMESTAMP_WIDTH: usize = 10;
/// Width of the zero padded microseconds part of a snapshot name.
const SEQUENCE_WIDTH: usize = 6;

/// Name of a backup snapshot: `backup.<backup_id>.snap.<timestamp>.<sequence>`.
///
/// Ordering is the ordering of `(timestamp, sequence)` where each part is
/// compared as a digit string, width first. For the zero padded names this
/// crate produces that is the plain string order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotName {
    pub backup_id: Uuid,
    pub timestamp: String,
    pub sequence: String,
}

impl SnapshotName {
    pub fn new(backup_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            backup_id,
            timestamp: format!("{:0width$}", at.timestamp(), width = TIMESTAMP_WIDTH),
            sequence: format!("{:0width$}", at.timestamp_subsec_micros(), width = SEQUENCE_WIDTH),
        }
    }

    /// Parse a snapshot name, rejecting anything that isn't exactly a backup snapshot.
    pub fn parse(name: &str) -> Option<Self> {
        let captures = SNAP_NAME.captures(name)?;
        Some(Self {
            backup_id: Uuid::parse_str(&captures[1]).ok()?,
            timestamp: captures[2].to_owned(),
            sequence: captures[3].to_owned(),
        })
    }
}

fn cmp_digits(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.trim_start_matches('0'), b.trim_start_matches('0'));
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

impl Ord for SnapshotName {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_digits(&self.timestamp, &other.timestamp)
            .then_with(|| cmp_digits(&self.sequence, &other.sequence))
            .then_with(|| self.backup_id.cmp(&other.backup_id))
    }
}

impl PartialOrd for SnapshotName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SnapshotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "backup.{}.snap.{}.{}", self.backup_id, self.timestamp, self.sequence)
    }
}

/// Base image anchoring the differential chain of a volume.
pub fn base_image_name(volume_id: Uuid) -> String {
    format!("volume-{volume_id}.backup.base")
}

/// Image holding one full-format backup.
pub fn backup_image_name(volume_id: Uuid, backup_id: Uuid) -> String {
    format!("volume-{volume_id}.backup.{backup_id}")
}

/// Object holding the metadata container of a backup.
pub fn metadata_object_name(backup_id: Uuid) -> String {
    format!("backup.{backup_id}.meta")
}

/// Name primary storage gives the image of a volume.
pub fn source_image_name(volume_id: Uuid) -> String {
    format!("volume-{volume_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ID: &str = "0a4e1e06-6a36-4d8e-8e9c-3a1f6f0a2b11";

    #[test]
    fn name_is_zero_padded() {
        let id = Uuid::parse_str(ID).unwrap();
        let at = Utc.timestamp_opt(12, 3_000).unwrap();
        let name = SnapshotName::new(id, at);
        assert_eq!(name.to_string(), format!("backup.{ID}.snap.0000000012.000003"));
        assert_eq!(SnapshotName::parse(&name.to_string()), Some(name));
    }

    #[test]
    fn look_alikes_are_rejected() {
        for name in [
            format!("backup.{ID}.snap.1700000000"),
            format!("backup.{ID}.snap.1700000000.12.3"),
            format!("backup.{ID}.snap..1700000000.12"),
            format!("backup..{ID}.snap.1700000000.12"),
            format!("backup.{ID}snap.1700000000.12"),
            format!("backupx{ID}.snap.1700000000.12"),
            format!("backup.{ID}.snap.1700000000.12x"),
            "backup.not-a-uuid.snap.1700000000.12".to_string(),
            "snap1".to_string(),
        ] {
            assert_eq!(SnapshotName::parse(&name), None, "{name}");
        }
    }

    #[test]
    fn ordering_is_by_timestamp_then_sequence() {
        let id = Uuid::parse_str(ID).unwrap();
        let parse = |ts: &str, seq: &str| {
            SnapshotName::parse(&format!("backup.{id}.snap.{ts}.{seq}")).unwrap()
        };
        assert!(parse("1700000000", "000002") > parse("1700000000", "000001"));
        assert!(parse("1700000001", "000000") > parse("1700000000", "999999"));
        // Unpadded names still order numerically.
        assert!(parse("10", "1") > parse("9", "5"));
        assert!(parse("0000000010", "1") > parse("9", "5"));
    }

    #[test]
    fn image_names() {
        let vid = Uuid::parse_str(ID).unwrap();
        assert_eq!(base_image_name(vid), format!("volume-{ID}.backup.base"));
        assert_eq!(backup_image_name(vid, vid), format!("volume-{ID}.backup.{ID}"));
        assert_eq!(metadata_object_name(vid), format!("backup.{ID}.meta"));
    }
}
