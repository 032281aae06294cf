use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const GIB: u64 = 1024 * 1024 * 1024;

/// Volume owned by primary storage, only read and status-updated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub id: Uuid,
    /// Size in GiB.
    pub size: u64,
    pub status: VolumeStatus,
    pub display_name: Option<String>,
    pub display_description: Option<String>,
    pub encryption_key_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeStatus {
    #[serde(rename = "creating")]
    Creating,
    #[serde(rename = "available")]
    Available,
    #[serde(rename = "in-use")]
    InUse,
    #[serde(rename = "backing-up")]
    BackingUp,
    #[serde(rename = "restoring-backup")]
    RestoringBackup,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "error_restoring")]
    ErrorRestoring,
}

impl Volume {
    pub fn size_in_bytes(&self) -> u64 {
        self.size * GIB
    }
}
