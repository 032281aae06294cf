use base64::{engine::general_purpose, Engine};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::exception::{BackupException, BackupResult};
use crate::model::vo::ServiceMetadata;

/// Backup record.
///
/// Every field takes part in the export envelope, so the serialized names are
/// the record format itself and must not be renamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    /// Backup id.
    pub id: Uuid,
    pub user_id: String,
    pub project_id: String,
    /// Source volume id.
    pub volume_id: Uuid,
    pub host: Option<String>,
    pub availability_zone: Option<String>,
    pub display_name: Option<String>,
    pub display_description: Option<String>,
    /// Backend container (pool) holding the backup objects.
    pub container: Option<String>,
    pub status: BackupStatus,
    pub fail_reason: Option<String>,
    /// Driver private json, see [`ServiceMetadata`].
    pub service_metadata: Option<String>,
    /// Driver that produced the backup.
    pub service: Option<String>,
    /// Size in bytes.
    pub size: u64,
    pub object_count: u64,
}

/// Backup status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    Creating,
    Available,
    Restoring,
    Deleting,
    Error,
    ErrorDeleting,
}

impl Backup {
    /// Encode the whole record as base64 encoded json.
    pub fn encode_record(&self) -> BackupResult<String> {
        let json = serde_json::to_vec(self)?;
        Ok(general_purpose::STANDARD.encode(json))
    }

    /// Decode a record produced by [`Backup::encode_record`].
    pub fn decode_record(record: &str) -> BackupResult<Self> {
        let json = general_purpose::STANDARD.decode(record.trim()).map_err(|e| {
            BackupException::invalid_parameter(format!("backup record is not base64: {e}"))
        })?;
        serde_json::from_slice(&json).map_err(|e| {
            BackupException::invalid_parameter(format!("backup record is malformed: {e}"))
        })
    }

    /// Parse the driver private metadata, `None` for backups made before it was recorded.
    pub fn parsed_service_metadata(&self) -> BackupResult<Option<ServiceMetadata>> {
        self.service_metadata.as_deref().map(ServiceMetadata::parse).transpose()
    }
}
