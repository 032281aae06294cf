use uuid::Uuid;

pub type BackupResult<T> = Result<T, BackupException>;

#[derive(Debug, thiserror::Error)]
pub enum BackupException {
    #[error("Invalid parameter value: {reason}")]
    InvalidParameterValue { reason: String },

    #[error("Invalid backup: {reason}")]
    InvalidBackup { reason: String },

    #[error("Backend object: {name} not found.")]
    NotFound { name: String },

    #[error("Backend object: {name} is still busy after {attempts} attempt(s).")]
    Busy { name: String, attempts: u32 },

    #[error("Unsupported backup metadata version: {version}, newest supported is: {supported}.")]
    BackupMetadataUnsupportedVersion { version: u32, supported: u32 },

    #[error("Backup operation failed: {reason}")]
    BackupOperation { reason: String },

    #[error("Backup: {backup_id} can't be verified by this driver.")]
    VerifyNotImplemented { backup_id: Uuid },

    #[error("Backup internal error: {source}")]
    InternalError {
        #[source]
        source: anyhow::Error,
    },
}

impl BackupException {
    pub fn invalid_backup(reason: impl ToString) -> Self {
        Self::InvalidBackup {
            reason: reason.to_string(),
        }
    }

    pub fn invalid_parameter(reason: impl ToString) -> Self {
        Self::InvalidParameterValue {
            reason: reason.to_string(),
        }
    }
}

impl From<anyhow::Error> for BackupException {
    fn from(e: anyhow::Error) -> Self {
        BackupException::InternalError { source: e }
    }
}

impl From<serde_json::Error> for BackupException {
    fn from(e: serde_json::Error) -> Self {
        BackupException::InternalError { source: e.into() }
    }
}
