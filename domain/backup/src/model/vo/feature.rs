use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};

/// Image features a snapshot capable backend may support, valued by their bit.
#[derive(FromPrimitive, ToPrimitive, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageFeature {
    Layering = 1,
    StripingV2 = 2,
    ExclusiveLock = 4,
    ObjectMap = 8,
    FastDiff = 16,
    DeepFlatten = 32,
    Journaling = 64,
}

impl ImageFeature {
    pub fn bit(self) -> u64 {
        self.to_u64().unwrap_or_default()
    }

    /// Feature name as the backend tools spell it.
    pub fn as_str(self) -> &'static str {
        match self {
            ImageFeature::Layering => "layering",
            ImageFeature::StripingV2 => "striping",
            ImageFeature::ExclusiveLock => "exclusive-lock",
            ImageFeature::ObjectMap => "object-map",
            ImageFeature::FastDiff => "fast-diff",
            ImageFeature::DeepFlatten => "deep-flatten",
            ImageFeature::Journaling => "journaling",
        }
    }
}

/// Outcome of feature detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendFeatures {
    /// No layering or striping support, images must use the old format.
    pub old_format: bool,
    pub bitmask: u64,
}

impl Default for BackendFeatures {
    fn default() -> Self {
        Self {
            old_format: true,
            bitmask: 0,
        }
    }
}

impl BackendFeatures {
    pub fn contains(&self, feature: ImageFeature) -> bool {
        self.bitmask & feature.bit() != 0
    }

    /// Features set in the bitmask, lowest bit first.
    pub fn features(&self) -> Vec<ImageFeature> {
        (0..u64::BITS)
            .map(|shift| 1u64 << shift)
            .filter(|bit| self.bitmask & bit != 0)
            .filter_map(ImageFeature::from_u64)
            .collect()
    }
}
