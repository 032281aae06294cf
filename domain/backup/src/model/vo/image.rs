use std::fmt;

use serde::{Deserialize, Serialize};

use super::BackendFeatures;

/// An image (or an image snapshot) inside a backend pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    pub pool: String,
    pub name: String,
    pub snapshot: Option<String>,
}

impl ImageRef {
    pub fn new(pool: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            pool: pool.into(),
            name: name.into(),
            snapshot: None,
        }
    }

    pub fn at_snapshot(&self, snapshot: impl Into<String>) -> Self {
        Self {
            snapshot: Some(snapshot.into()),
            ..self.clone()
        }
    }

    /// The image itself, without snapshot.
    pub fn head(&self) -> Self {
        Self {
            snapshot: None,
            ..self.clone()
        }
    }

    /// Parse a `pool/name` path.
    pub fn from_path(path: &str) -> Option<Self> {
        match path.split_once('/') {
            Some((pool, name)) if !pool.is_empty() && !name.is_empty() => {
                Some(Self::new(pool, name))
            }
            _ => None,
        }
    }

    /// `pool/name`, the path recorded in backup metadata.
    pub fn path(&self) -> String {
        format!("{}/{}", self.pool, self.name)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.snapshot {
            Some(snapshot) => write!(f, "{}/{}@{}", self.pool, self.name, snapshot),
            None => write!(f, "{}/{}", self.pool, self.name),
        }
    }
}

/// Identity of an endpoint that is an image of a snapshot capable backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockImage {
    pub backend_type: String,
    pub image: ImageRef,
}

/// Parameters of a new image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
    pub size: u64,
    pub features: BackendFeatures,
    /// Zero means backend default.
    pub stripe_unit: u64,
    /// Zero means backend default.
    pub stripe_count: u64,
}

/// Differential copy between two images: every extent that changed in
/// `source` since `from_snap` (everything when `None`) is applied to
/// `destination`. When `source` names a snapshot, a snapshot of the same
/// name is created on `destination` once applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffTransfer {
    pub source: ImageRef,
    pub from_snap: Option<String>,
    pub destination: ImageRef,
}
