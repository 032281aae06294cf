use std::sync::Arc;

use async_trait::async_trait;
use domain_backup::{
    exception::{BackupException, BackupResult},
    model::vo::{MetaMap, MetaValue, MetadataContainer, MetadataTag, METADATA_VERSION},
    repository::VolumeMetadataRepo,
    service::BackupMetadataService,
};
use serde_json::{Map, Value};
use typed_builder::TypedBuilder;
use uuid::Uuid;

const BASE_KEYS_V1: &[&str] = &["display_name", "display_description"];
const BASE_KEYS_V2: &[&str] = &["display_name", "display_description", "encryption_key_id"];

/// Keys of a metadata class restored by a container version, empty means all.
fn allow_list(version: u32, tag: MetadataTag) -> &'static [&'static str] {
    match (version, tag) {
        (1, MetadataTag::VolumeBase) => BASE_KEYS_V1,
        (_, MetadataTag::VolumeBase) => BASE_KEYS_V2,
        _ => &[],
    }
}

/// Keep the keys of `allow_list` found in `metadata`. An empty list keeps everything.
pub fn filter(metadata: Map<String, Value>, allow_list: &[&str]) -> Map<String, Value> {
    if allow_list.is_empty() {
        return metadata;
    }
    metadata
        .into_iter()
        .filter(|(key, _)| allow_list.contains(&key.as_str()))
        .collect()
}

fn to_section(volume_id: Uuid, tag: MetadataTag, metadata: MetaMap) -> Map<String, Value> {
    let mut section = Map::new();
    for (key, value) in metadata {
        match serde_json::to_value(&value) {
            Ok(value) => {
                section.insert(key, value);
            }
            Err(e) => tracing::info!(
                "Value with key: {key} of {tag} of volume: {volume_id} cannot be serialized into json, skipping it: {e}"
            ),
        }
    }
    section
}

fn to_meta_map(volume_id: Uuid, tag: MetadataTag, section: Map<String, Value>) -> MetaMap {
    let mut metadata = MetaMap::new();
    for (key, value) in &section {
        match MetaValue::try_from(value) {
            Ok(value) => {
                metadata.insert(key.to_owned(), value);
            }
            Err(e) => tracing::info!(
                "Value with key: {key} of {tag} for volume: {volume_id} is not a metadata value, skipping it: {e}"
            ),
        }
    }
    metadata
}

#[derive(TypedBuilder)]
pub struct BackupMetadataServiceImpl {
    repo: Arc<dyn VolumeMetadataRepo>,
}

#[async_trait]
impl BackupMetadataService for BackupMetadataServiceImpl {
    async fn get(&self, volume_id: Uuid) -> BackupResult<MetadataContainer> {
        let mut container = MetadataContainer::new();
        for tag in MetadataTag::ALL {
            let metadata = match tag {
                MetadataTag::VolumeBase => self.repo.get_base(volume_id).await?,
                MetadataTag::VolumeUser => self.repo.get_user(volume_id).await?,
                MetadataTag::VolumeGlance => self.repo.get_glance(volume_id).await?,
            };
            let section = to_section(volume_id, tag, metadata);
            if tag == MetadataTag::VolumeBase || !section.is_empty() {
                container.insert(tag, section);
            }
        }
        Ok(container)
    }

    async fn put(&self, volume_id: Uuid, container: &str) -> BackupResult<()> {
        let container: MetadataContainer = serde_json::from_str(container).map_err(|e| {
            BackupException::invalid_parameter(format!("metadata container is not valid: {e}"))
        })?;
        if container.version == 0 || container.version > METADATA_VERSION {
            return Err(BackupException::BackupMetadataUnsupportedVersion {
                version: container.version,
                supported: METADATA_VERSION,
            });
        }
        for key in container.sections.keys() {
            if MetadataTag::from_tag(key).is_none() {
                tracing::debug!("Ignoring unknown metadata class: {key}.");
            }
        }
        for tag in MetadataTag::ALL {
            let Some(section) = container.section(tag) else {
                continue;
            };
            let metadata = to_meta_map(
                volume_id,
                tag,
                filter(section.to_owned(), allow_list(container.version, tag)),
            );
            match tag {
                MetadataTag::VolumeBase => self.repo.update_base(volume_id, metadata).await?,
                MetadataTag::VolumeUser => self.repo.update_user(volume_id, metadata).await?,
                MetadataTag::VolumeGlance => self.repo.update_glance(volume_id, metadata).await?,
            }
        }
        Ok(())
    }
}
