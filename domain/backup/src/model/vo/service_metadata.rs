use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ImageRef;
use crate::exception::{BackupException, BackupResult};

/// How the data of a backup is laid out on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupMode {
    /// One snapshot of the volume's differential base image.
    Incremental,
    /// A dedicated image holding the whole volume.
    Full,
}

impl FromStr for BackupMode {
    type Err = BackupException;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incremental" => Ok(Self::Incremental),
            "full" => Ok(Self::Full),
            other => Err(BackupException::invalid_backup(format!(
                "unrecognized backup mode: {other}"
            ))),
        }
    }
}

impl fmt::Display for BackupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackupMode::Incremental => "incremental",
            BackupMode::Full => "full",
        })
    }
}

/// Driver private part of a backup record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceMetadata {
    pub backup_mode: BackupMode,
    /// `pool/image` holding the data.
    pub backup_path: String,
    /// `pool/image` of the volume a differential backup was taken from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
}

impl ServiceMetadata {
    pub fn parse(json: &str) -> BackupResult<Self> {
        let value: serde_json::Value = serde_json::from_str(json).map_err(|e| {
            BackupException::invalid_backup(format!("service metadata is not json: {e}"))
        })?;
        let field = |name: &str| {
            value.get(name).and_then(|v| v.as_str()).ok_or_else(|| {
                BackupException::invalid_backup(format!("service metadata has no {name}"))
            })
        };
        Ok(Self {
            backup_mode: field("backup_mode")?.parse()?,
            backup_path: field("backup_path")?.to_owned(),
            source_path: value
                .get("source_path")
                .and_then(|v| v.as_str())
                .map(str::to_owned),
        })
    }

    /// Image holding the data.
    pub fn backup_image(&self) -> BackupResult<ImageRef> {
        ImageRef::from_path(&self.backup_path).ok_or_else(|| {
            BackupException::invalid_backup(format!("malformed backup path: {}", self.backup_path))
        })
    }

    /// Source volume image, when it was recorded.
    pub fn source_image(&self) -> Option<ImageRef> {
        self.source_path.as_deref().and_then(ImageRef::from_path)
    }

    pub fn to_json(&self) -> BackupResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_modes() {
        let meta = ServiceMetadata {
            backup_mode: BackupMode::Incremental,
            backup_path: "backups/volume-x.backup.base".into(),
            source_path: Some("volumes/volume-x".into()),
        };
        assert_eq!(ServiceMetadata::parse(&meta.to_json().unwrap()).unwrap(), meta);
        assert_eq!(
            meta.source_image(),
            Some(ImageRef::new("volumes", "volume-x"))
        );
        assert_eq!(
            meta.backup_image().unwrap(),
            ImageRef::new("backups", "volume-x.backup.base")
        );
    }

    #[test]
    fn records_without_source_path() {
        let meta =
            ServiceMetadata::parse(r#"{"backup_mode":"full","backup_path":"backups/b"}"#).unwrap();
        assert_eq!(meta.source_path, None);
        assert!(meta.source_image().is_none());
        assert!(!meta.to_json().unwrap().contains("source_path"));

        let malformed = ServiceMetadata {
            backup_path: "no-pool".into(),
            ..meta
        };
        assert!(matches!(
            malformed.backup_image(),
            Err(BackupException::InvalidBackup { .. })
        ));
    }

    #[test]
    fn unknown_mode_is_invalid_backup() {
        let err = ServiceMetadata::parse(r#"{"backup_mode":"tape","backup_path":"a/b"}"#)
            .unwrap_err();
        assert!(matches!(err, BackupException::InvalidBackup { .. }));
    }
}
