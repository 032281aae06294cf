use std::collections::BTreeMap;
use std::fmt;

use serde::ser::Error as _;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Newest metadata container version this crate writes and understands.
pub const METADATA_VERSION: u32 = 2;

/// Classes of volume metadata kept in a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MetadataTag {
    /// Volume record fields.
    VolumeBase,
    /// User supplied key/value metadata.
    VolumeUser,
    /// Image metadata the volume was created from.
    VolumeGlance,
}

impl MetadataTag {
    pub const ALL: [MetadataTag; 3] = [Self::VolumeBase, Self::VolumeUser, Self::VolumeGlance];

    pub fn as_str(self) -> &'static str {
        match self {
            MetadataTag::VolumeBase => "volume-base-meta",
            MetadataTag::VolumeUser => "volume-user-meta",
            MetadataTag::VolumeGlance => "volume-glance-meta",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }
}

impl fmt::Display for MetadataTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metadata value as primary storage hands it out.
///
/// Not every value has a json form: opaque blobs and non-finite numbers fail
/// to serialize and are left out of backups.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Opaque(Vec<u8>),
}

impl Serialize for MetaValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MetaValue::Null => serializer.serialize_unit(),
            MetaValue::Bool(b) => serializer.serialize_bool(*b),
            MetaValue::Integer(i) => serializer.serialize_i64(*i),
            MetaValue::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            MetaValue::Float(f) => Err(S::Error::custom(format!("{f} has no json form"))),
            MetaValue::Text(s) => serializer.serialize_str(s),
            MetaValue::Opaque(bytes) => Err(S::Error::custom(format!(
                "opaque value of {} bytes has no json form",
                bytes.len()
            ))),
        }
    }
}

/// Only scalars convert. Nested arrays and objects, and integers past
/// `i64::MAX`, have no lossless `MetaValue` and are rejected.
impl TryFrom<&Value> for MetaValue {
    type Error = String;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(MetaValue::Null),
            Value::Bool(b) => Ok(MetaValue::Bool(*b)),
            Value::Number(n) => match (n.as_i64(), n.is_f64()) {
                (Some(i), _) => Ok(MetaValue::Integer(i)),
                (None, true) => n
                    .as_f64()
                    .map(MetaValue::Float)
                    .ok_or_else(|| format!("{n} is not a finite number")),
                (None, false) => Err(format!("{n} is out of integer range")),
            },
            Value::String(s) => Ok(MetaValue::Text(s.to_owned())),
            Value::Array(_) => Err("arrays are not metadata values".to_string()),
            Value::Object(_) => Err("objects are not metadata values".to_string()),
        }
    }
}

pub type MetaMap = BTreeMap<String, MetaValue>;

/// Versioned, tag partitioned snapshot of a volume's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataContainer {
    pub version: u32,
    /// Sections keyed by tag. Unknown tags are kept so newer containers pass through.
    #[serde(flatten)]
    pub sections: BTreeMap<String, Value>,
}

impl MetadataContainer {
    pub fn new() -> Self {
        Self {
            version: METADATA_VERSION,
            sections: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, tag: MetadataTag, section: Map<String, Value>) {
        self.sections.insert(tag.as_str().to_owned(), Value::Object(section));
    }

    pub fn section(&self, tag: MetadataTag) -> Option<&Map<String, Value>> {
        self.sections.get(tag.as_str()).and_then(Value::as_object)
    }
}

impl Default for MetadataContainer {
    fn default() -> Self {
        Self::new()
    }
}
