use domain_backup::model::vo::ImageFeature;
use serde::*;
use service_backup::RetryPolicy;

use super::telemetry::TelemetryConfig;

const MIB: usize = 1024 * 1024;

#[derive(Default, Deserialize, Serialize, Clone, Debug)]
pub struct BackupEngineConfig {
    #[serde(default)]
    pub driver: DriverConfig,
    /// Retry of deletions the cluster reports as busy.
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub ceph: CephConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl BackupEngineConfig {
    pub fn load(config: config::Config) -> anyhow::Result<Self> {
        Ok(config.try_deserialize()?)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct DriverConfig {
    /// Bytes per chunk of a chunked transfer.
    #[serde(default = "DriverConfig::default_chunk_size")]
    pub chunk_size: usize,
    /// Discard what is left of a destination after a short source.
    #[serde(default = "DriverConfig::default_enabled")]
    pub restore_discard_excess_bytes: bool,
    /// Store volume metadata with every backup.
    #[serde(default = "DriverConfig::default_enabled")]
    pub backup_metadata: bool,
}

impl DriverConfig {
    fn default_chunk_size() -> usize {
        128 * MIB
    }
    fn default_enabled() -> bool {
        true
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            chunk_size: Self::default_chunk_size(),
            restore_discard_excess_bytes: Self::default_enabled(),
            backup_metadata: Self::default_enabled(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct CephConfig {
    /// Pool backup images and metadata objects are stored in.
    #[serde(default = "CephConfig::default_pool")]
    pub pool: String,
    #[serde(default = "CephConfig::default_user")]
    pub user: String,
    #[serde(default = "CephConfig::default_conf")]
    pub conf: String,
    /// Zero leaves striping to the cluster.
    #[serde(default)]
    pub stripe_unit: u64,
    #[serde(default)]
    pub stripe_count: u64,
    /// Create backup images with journaling enabled.
    #[serde(default)]
    pub image_journals: bool,
    /// Features the cluster supports, empty for old format images only.
    #[serde(default = "CephConfig::default_features")]
    pub features: Vec<ImageFeature>,
    #[serde(default = "CephConfig::default_rbd")]
    pub rbd: String,
    #[serde(default = "CephConfig::default_rados")]
    pub rados: String,
}

impl CephConfig {
    fn default_pool() -> String {
        "backups".to_string()
    }
    fn default_user() -> String {
        "cinder".to_string()
    }
    fn default_conf() -> String {
        "/etc/ceph/ceph.conf".to_string()
    }
    fn default_features() -> Vec<ImageFeature> {
        vec![ImageFeature::Layering, ImageFeature::StripingV2]
    }
    fn default_rbd() -> String {
        "rbd".to_string()
    }
    fn default_rados() -> String {
        "rados".to_string()
    }
}

impl Default for CephConfig {
    fn default() -> Self {
        Self {
            pool: Self::default_pool(),
            user: Self::default_user(),
            conf: Self::default_conf(),
            stripe_unit: Default::default(),
            stripe_count: Default::default(),
            image_journals: Default::default(),
            features: Self::default_features(),
            rbd: Self::default_rbd(),
            rados: Self::default_rados(),
        }
    }
}

/// Layered configuration: `config.yaml` in the working directory, every
/// yaml file named on the command line, then `BACKUP__*` environment variables.
pub fn build_config() -> anyhow::Result<config::Config> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = config::Config::builder().add_source(
        config::File::with_name("config")
            .required(false)
            .format(config::FileFormat::Yaml),
    );
    for arg in args {
        if arg.ends_with("yaml") || arg.ends_with("yml") {
            config = config.add_source(
                config::File::from(std::path::Path::new(arg.as_str()))
                    .format(config::FileFormat::Yaml)
                    .required(false),
            );
        }
    }
    config = config.add_source(
        config::Environment::with_prefix("BACKUP")
            .separator("__")
            .try_parsing(true),
    );
    Ok(config.build()?)
}
