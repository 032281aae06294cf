#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use domain_backup::{
    model::{
        entity::{Backup, BackupStatus, Volume, VolumeStatus},
        vo::{
            BlockImage, DeleteOutcome, DiffTransfer, ImageFeature, ImageRef, ImageSpec, MetaMap,
        },
    },
    repository::{BackupRepo, VolumeMetadataRepo, VolumeRepo},
    service::{SnapshotCapableBackend, TransferEndpoint},
};
use rand::RngCore;
use service_backup::{
    BackupMetadataServiceImpl, BackupServiceImpl, ChunkedTransferServiceImpl,
    IncrementalBackupDriver, RetryPolicy, SnapshotChainServiceImpl,
};
use uuid::Uuid;

pub const BACKEND_TYPE: &str = "memory";
pub const VOLUME_POOL: &str = "volumes";
pub const BACKUP_POOL: &str = "backups";

type Key = (String, String);

fn key(image: &ImageRef) -> Key {
    (image.pool.to_owned(), image.name.to_owned())
}

#[derive(Default)]
struct Image {
    data: Vec<u8>,
    written: bool,
    snapshots: Vec<(String, Vec<u8>)>,
}

impl Image {
    fn snapshot(&self, name: &str) -> Option<&Vec<u8>> {
        self.snapshots
            .iter()
            .find(|(snapshot, _)| snapshot == name)
            .map(|(_, data)| data)
    }
}

#[derive(Default)]
struct State {
    images: HashMap<Key, Image>,
    objects: HashMap<Key, Vec<u8>>,
    busy: HashMap<Key, u32>,
    fail_next_diff: bool,
    diff_transfers: u32,
}

/// Snapshot capable backend keeping everything in memory.
///
/// Differential transfers behave like export-diff piped into import-diff:
/// without a start snapshot only non-zero bytes travel, with one only the
/// bytes that changed since it.
#[derive(Default, Clone)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

impl MemoryBackend {
    pub fn put_image(&self, image: &ImageRef, data: Vec<u8>) {
        self.state.lock().unwrap().images.insert(
            key(image),
            Image {
                written: data.iter().any(|b| *b != 0),
                data,
                snapshots: vec![],
            },
        );
    }

    pub fn create_empty(&self, image: &ImageRef, size: usize) {
        self.put_image(image, vec![0; size]);
    }

    pub fn write_at(&self, image: &ImageRef, offset: usize, data: &[u8]) {
        let mut state = self.state.lock().unwrap();
        let image = state.images.get_mut(&key(image)).unwrap();
        image.data[offset..offset + data.len()].copy_from_slice(data);
        image.written = true;
    }

    pub fn read_image(&self, image: &ImageRef) -> Vec<u8> {
        let state = self.state.lock().unwrap();
        let stored = &state.images[&key(image)];
        match &image.snapshot {
            Some(snapshot) => stored.snapshot(snapshot).unwrap().to_owned(),
            None => stored.data.to_owned(),
        }
    }

    pub fn exists(&self, image: &ImageRef) -> bool {
        self.state.lock().unwrap().images.contains_key(&key(image))
    }

    pub fn images_in(&self, pool: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut names: Vec<_> = state
            .images
            .keys()
            .filter(|(p, _)| p == pool)
            .map(|(_, name)| name.to_owned())
            .collect();
        names.sort();
        names
    }

    pub fn snapshots_of(&self, image: &ImageRef) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .images
            .get(&key(image))
            .map(|image| image.snapshots.iter().map(|(name, _)| name.to_owned()).collect())
            .unwrap_or_default()
    }

    pub fn object_names(&self, pool: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .objects
            .keys()
            .filter(|(p, _)| p == pool)
            .map(|(_, name)| name.to_owned())
            .collect()
    }

    /// Report the image as busy for the next `times` removals.
    pub fn set_busy(&self, image: &ImageRef, times: u32) {
        self.state.lock().unwrap().busy.insert(key(image), times);
    }

    pub fn fail_next_diff(&self) {
        self.state.lock().unwrap().fail_next_diff = true;
    }

    pub fn diff_transfers(&self) -> u32 {
        self.state.lock().unwrap().diff_transfers
    }

    pub fn endpoint(&self, image: &ImageRef) -> MemoryImageEndpoint {
        MemoryImageEndpoint {
            state: self.state.clone(),
            image: image.to_owned(),
        }
    }
}

#[async_trait]
impl SnapshotCapableBackend for MemoryBackend {
    fn backend_type(&self) -> String {
        BACKEND_TYPE.to_string()
    }

    fn supported_features(&self) -> Vec<ImageFeature> {
        vec![ImageFeature::Layering, ImageFeature::StripingV2]
    }

    async fn image_exists(&self, image: &ImageRef) -> anyhow::Result<bool> {
        Ok(self.exists(image))
    }

    async fn create_image(&self, image: &ImageRef, spec: &ImageSpec) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        anyhow::ensure!(!state.images.contains_key(&key(image)), "{image} already exists");
        state.images.insert(
            key(image),
            Image {
                data: vec![0; spec.size as usize],
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn image_size(&self, image: &ImageRef) -> anyhow::Result<u64> {
        let state = self.state.lock().unwrap();
        match state.images.get(&key(image)) {
            Some(stored) => Ok(stored.data.len() as u64),
            None => anyhow::bail!("{image} not found"),
        }
    }

    async fn resize_image(&self, image: &ImageRef, size: u64) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.images.get_mut(&key(image)) {
            Some(stored) => {
                stored.data.resize(size as usize, 0);
                Ok(())
            }
            None => anyhow::bail!("{image} not found"),
        }
    }

    async fn remove_image(&self, image: &ImageRef) -> anyhow::Result<DeleteOutcome> {
        let mut state = self.state.lock().unwrap();
        if let Some(times) = state.busy.get_mut(&key(image)).filter(|times| **times > 0) {
            *times -= 1;
            return Ok(DeleteOutcome::Busy);
        }
        let Some(stored) = state.images.get(&key(image)) else {
            return Ok(DeleteOutcome::NotFound);
        };
        if !stored.snapshots.is_empty() {
            return Ok(DeleteOutcome::Busy);
        }
        state.images.remove(&key(image));
        Ok(DeleteOutcome::Deleted)
    }

    async fn list_snapshots(&self, image: &ImageRef) -> anyhow::Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        match state.images.get(&key(image)) {
            Some(stored) => Ok(stored.snapshots.iter().map(|(name, _)| name.to_owned()).collect()),
            None => anyhow::bail!("{image} not found"),
        }
    }

    async fn create_snapshot(&self, image: &ImageRef, snapshot: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        let Some(stored) = state.images.get_mut(&key(image)) else {
            anyhow::bail!("{image} not found");
        };
        anyhow::ensure!(stored.snapshot(snapshot).is_none(), "{image}@{snapshot} already exists");
        let data = stored.data.to_owned();
        stored.snapshots.push((snapshot.to_owned(), data));
        Ok(())
    }

    async fn remove_snapshot(
        &self,
        image: &ImageRef,
        snapshot: &str,
    ) -> anyhow::Result<DeleteOutcome> {
        let mut state = self.state.lock().unwrap();
        let Some(stored) = state.images.get_mut(&key(image)) else {
            return Ok(DeleteOutcome::NotFound);
        };
        let before = stored.snapshots.len();
        stored.snapshots.retain(|(name, _)| name != snapshot);
        Ok(if stored.snapshots.len() < before {
            DeleteOutcome::Deleted
        } else {
            DeleteOutcome::NotFound
        })
    }

    async fn has_extents(&self, image: &ImageRef) -> anyhow::Result<bool> {
        let state = self.state.lock().unwrap();
        Ok(state
            .images
            .get(&key(image))
            .map(|stored| stored.written)
            .unwrap_or_default())
    }

    async fn open_image(&self, image: &ImageRef) -> anyhow::Result<Box<dyn TransferEndpoint>> {
        anyhow::ensure!(self.exists(image), "{image} not found");
        Ok(Box::new(self.endpoint(image)))
    }

    async fn diff_transfer(&self, transfer: &DiffTransfer) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.fail_next_diff) {
            anyhow::bail!("injected failure of diff transfer from {}", transfer.source);
        }
        let end = transfer
            .source
            .snapshot
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("export-diff needs a snapshot"))?;
        let source = state
            .images
            .get(&key(&transfer.source))
            .ok_or_else(|| anyhow::anyhow!("{} not found", transfer.source))?;
        let end_data = source
            .snapshot(end)
            .ok_or_else(|| anyhow::anyhow!("{} not found", transfer.source))?
            .to_owned();
        let start_data = match &transfer.from_snap {
            Some(from) => Some(
                source
                    .snapshot(from)
                    .ok_or_else(|| anyhow::anyhow!("start snapshot {from} not found on source"))?
                    .to_owned(),
            ),
            None => None,
        };

        let destination = state
            .images
            .get_mut(&key(&transfer.destination))
            .ok_or_else(|| anyhow::anyhow!("{} not found", transfer.destination))?;
        if let Some(from) = &transfer.from_snap {
            anyhow::ensure!(
                destination.snapshot(from).is_some(),
                "start snapshot {from} not found on {}",
                transfer.destination
            );
        }
        anyhow::ensure!(
            destination.snapshot(end).is_none(),
            "end snapshot {end} already exists on {}",
            transfer.destination
        );
        destination.data.resize(end_data.len(), 0);
        for (i, byte) in end_data.iter().enumerate() {
            let changed = match &start_data {
                Some(start) => start.get(i) != Some(byte),
                None => *byte != 0,
            };
            if changed {
                destination.data[i] = *byte;
                destination.written = true;
            }
        }
        let data = destination.data.to_owned();
        destination.snapshots.push((end.to_owned(), data));
        state.diff_transfers += 1;
        Ok(())
    }

    async fn write_object(&self, pool: &str, name: &str, data: &[u8]) -> anyhow::Result<()> {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert((pool.to_owned(), name.to_owned()), data.to_vec());
        Ok(())
    }

    async fn read_object(&self, pool: &str, name: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .objects
            .get(&(pool.to_owned(), name.to_owned()))
            .cloned())
    }

    async fn remove_object(&self, pool: &str, name: &str) -> anyhow::Result<DeleteOutcome> {
        Ok(
            match self
                .state
                .lock()
                .unwrap()
                .objects
                .remove(&(pool.to_owned(), name.to_owned()))
            {
                Some(_) => DeleteOutcome::Deleted,
                None => DeleteOutcome::NotFound,
            },
        )
    }
}

/// Image of [`MemoryBackend`] opened for transfer, read only at a snapshot.
pub struct MemoryImageEndpoint {
    state: Arc<Mutex<State>>,
    image: ImageRef,
}

impl MemoryImageEndpoint {
    fn with_data<T>(&self, f: impl FnOnce(&[u8]) -> T) -> anyhow::Result<T> {
        let state = self.state.lock().unwrap();
        let stored = state
            .images
            .get(&key(&self.image))
            .ok_or_else(|| anyhow::anyhow!("{} not found", self.image))?;
        match &self.image.snapshot {
            Some(snapshot) => stored
                .snapshot(snapshot)
                .map(|data| f(data))
                .ok_or_else(|| anyhow::anyhow!("{} not found", self.image)),
            None => Ok(f(&stored.data)),
        }
    }

    fn with_head<T>(&self, f: impl FnOnce(&mut Image) -> anyhow::Result<T>) -> anyhow::Result<T> {
        anyhow::ensure!(self.image.snapshot.is_none(), "{} is read only", self.image);
        let mut state = self.state.lock().unwrap();
        let stored = state
            .images
            .get_mut(&key(&self.image))
            .ok_or_else(|| anyhow::anyhow!("{} not found", self.image))?;
        f(stored)
    }
}

#[async_trait]
impl TransferEndpoint for MemoryImageEndpoint {
    async fn size(&self) -> anyhow::Result<u64> {
        self.with_data(|data| data.len() as u64)
    }

    async fn read(&mut self, offset: u64, length: usize) -> anyhow::Result<Vec<u8>> {
        self.with_data(|data| {
            let start = (offset as usize).min(data.len());
            let end = (start + length).min(data.len());
            data[start..end].to_vec()
        })
    }

    async fn write(&mut self, data: &[u8], offset: u64) -> anyhow::Result<()> {
        self.with_head(|image| {
            let start = offset as usize;
            let end = start + data.len();
            anyhow::ensure!(end <= image.data.len(), "write past the end of the image");
            image.data[start..end].copy_from_slice(data);
            image.written = true;
            Ok(())
        })
    }

    async fn flush(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn supports_discard(&self) -> bool {
        true
    }

    async fn discard(&mut self, offset: u64, length: u64) -> anyhow::Result<()> {
        self.with_head(|image| {
            let start = (offset as usize).min(image.data.len());
            let end = (start + length as usize).min(image.data.len());
            image.data[start..end].fill(0);
            Ok(())
        })
    }

    fn block_image(&self) -> Option<BlockImage> {
        Some(BlockImage {
            backend_type: BACKEND_TYPE.to_string(),
            image: self.image.to_owned(),
        })
    }
}

#[derive(Default)]
pub struct MemoryBackupRepo {
    backups: Mutex<HashMap<Uuid, Backup>>,
}

impl MemoryBackupRepo {
    pub fn insert(&self, backup: Backup) {
        self.backups.lock().unwrap().insert(backup.id, backup);
    }

    pub fn get(&self, id: Uuid) -> Option<Backup> {
        self.backups.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl BackupRepo for MemoryBackupRepo {
    async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Backup> {
        self.get(id)
            .ok_or_else(|| anyhow::anyhow!("No backup with id: {id}"))
    }

    async fn get_all_by_volume_id(&self, volume_id: Uuid) -> anyhow::Result<Vec<Backup>> {
        Ok(self
            .backups
            .lock()
            .unwrap()
            .values()
            .filter(|backup| backup.volume_id == volume_id)
            .cloned()
            .collect())
    }

    async fn update(&self, backup: &Backup) -> anyhow::Result<()> {
        self.insert(backup.to_owned());
        Ok(())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: BackupStatus,
        fail_reason: Option<String>,
    ) -> anyhow::Result<()> {
        let mut backups = self.backups.lock().unwrap();
        let backup = backups
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("No backup with id: {id}"))?;
        backup.status = status;
        backup.fail_reason = fail_reason;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<()> {
        self.backups.lock().unwrap().remove(&id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryVolumeRepo {
    volumes: Mutex<HashMap<Uuid, Volume>>,
}

impl MemoryVolumeRepo {
    pub fn insert(&self, volume: Volume) {
        self.volumes.lock().unwrap().insert(volume.id, volume);
    }

    pub fn status(&self, id: Uuid) -> VolumeStatus {
        self.volumes.lock().unwrap()[&id].status
    }
}

#[async_trait]
impl VolumeRepo for MemoryVolumeRepo {
    async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Volume> {
        self.volumes
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No volume with id: {id}"))
    }

    async fn update_status(&self, id: Uuid, status: VolumeStatus) -> anyhow::Result<()> {
        let mut volumes = self.volumes.lock().unwrap();
        let volume = volumes
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("No volume with id: {id}"))?;
        volume.status = status;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryVolumeMetadataRepo {
    base: Mutex<HashMap<Uuid, MetaMap>>,
    user: Mutex<HashMap<Uuid, MetaMap>>,
    glance: Mutex<HashMap<Uuid, MetaMap>>,
}

impl MemoryVolumeMetadataRepo {
    fn get(map: &Mutex<HashMap<Uuid, MetaMap>>, volume_id: Uuid) -> MetaMap {
        map.lock()
            .unwrap()
            .get(&volume_id)
            .cloned()
            .unwrap_or_default()
    }

    fn merge(map: &Mutex<HashMap<Uuid, MetaMap>>, volume_id: Uuid, metadata: MetaMap) {
        map.lock()
            .unwrap()
            .entry(volume_id)
            .or_default()
            .extend(metadata);
    }

    pub fn base(&self, volume_id: Uuid) -> MetaMap {
        Self::get(&self.base, volume_id)
    }

    pub fn user(&self, volume_id: Uuid) -> MetaMap {
        Self::get(&self.user, volume_id)
    }
}

#[async_trait]
impl VolumeMetadataRepo for MemoryVolumeMetadataRepo {
    async fn get_base(&self, volume_id: Uuid) -> anyhow::Result<MetaMap> {
        Ok(Self::get(&self.base, volume_id))
    }

    async fn get_user(&self, volume_id: Uuid) -> anyhow::Result<MetaMap> {
        Ok(Self::get(&self.user, volume_id))
    }

    async fn get_glance(&self, volume_id: Uuid) -> anyhow::Result<MetaMap> {
        Ok(Self::get(&self.glance, volume_id))
    }

    async fn update_base(&self, volume_id: Uuid, metadata: MetaMap) -> anyhow::Result<()> {
        Self::merge(&self.base, volume_id, metadata);
        Ok(())
    }

    async fn update_user(&self, volume_id: Uuid, metadata: MetaMap) -> anyhow::Result<()> {
        Self::merge(&self.user, volume_id, metadata);
        Ok(())
    }

    async fn update_glance(&self, volume_id: Uuid, metadata: MetaMap) -> anyhow::Result<()> {
        Self::merge(&self.glance, volume_id, metadata);
        Ok(())
    }
}

/// Driver and service wired to in-memory collaborators.
pub struct Harness {
    pub backend: Arc<MemoryBackend>,
    pub backups: Arc<MemoryBackupRepo>,
    pub volumes: Arc<MemoryVolumeRepo>,
    pub metadata: Arc<MemoryVolumeMetadataRepo>,
    pub driver: Arc<IncrementalBackupDriver>,
    pub service: BackupServiceImpl,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_retries(3)
    }

    pub fn with_retries(retries: u32) -> Self {
        let retry = RetryPolicy {
            retries,
            delay_ms: 0,
            backoff: Default::default(),
        };
        let backend = Arc::new(MemoryBackend::default());
        let backups = Arc::new(MemoryBackupRepo::default());
        let volumes = Arc::new(MemoryVolumeRepo::default());
        let metadata = Arc::new(MemoryVolumeMetadataRepo::default());
        let chain = SnapshotChainServiceImpl::builder()
            .backend(backend.clone())
            .retry(retry.clone())
            .build();
        let driver = Arc::new(
            IncrementalBackupDriver::builder()
                .backend(backend.clone())
                .chain(Arc::new(chain))
                .transfer(Arc::new(
                    ChunkedTransferServiceImpl::builder().chunk_size(4096).build(),
                ))
                .metadata(Arc::new(
                    BackupMetadataServiceImpl::builder()
                        .repo(metadata.clone())
                        .build(),
                ))
                .volume_repo(volumes.clone())
                .pool(BACKUP_POOL)
                .retry(retry)
                .build(),
        );
        let service = BackupServiceImpl::builder()
            .backup_repo(backups.clone())
            .volume_repo(volumes.clone())
            .driver(driver.clone())
            .build();
        Self {
            backend,
            backups,
            volumes,
            metadata,
            driver,
            service,
        }
    }

    /// Register a volume and return the image backing it.
    pub fn volume(&self, content: Option<&[u8]>, size: usize) -> (Uuid, ImageRef) {
        let id = Uuid::new_v4();
        self.volumes.insert(Volume {
            id,
            size: 1,
            status: VolumeStatus::Available,
            display_name: Some(format!("volume {id}")),
            display_description: None,
            encryption_key_id: None,
        });
        let image = ImageRef::new(VOLUME_POOL, format!("volume-{id}"));
        match content {
            Some(content) => self.backend.put_image(&image, content.to_vec()),
            None => self.backend.create_empty(&image, size),
        }
        (id, image)
    }

    /// Register an accepted backup record.
    pub fn backup_record(&self, volume_id: Uuid, size: u64) -> Backup {
        let backup = new_backup(volume_id, size);
        self.backups.insert(backup.clone());
        backup
    }
}

pub fn new_backup(volume_id: Uuid, size: u64) -> Backup {
    Backup {
        id: Uuid::new_v4(),
        user_id: "user".into(),
        project_id: "project".into(),
        volume_id,
        host: Some("backup-host".into()),
        availability_zone: Some("nova".into()),
        display_name: Some("nightly".into()),
        display_description: None,
        container: None,
        status: BackupStatus::Creating,
        fail_reason: None,
        service_metadata: None,
        service: Some("incremental".into()),
        size,
        object_count: 0,
    }
}

/// Random content with a zeroed hole in the middle.
pub fn random_content(size: usize) -> Vec<u8> {
    let mut data = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut data);
    data[size / 3..size / 2].fill(0);
    data
}

pub fn scratch_path() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("backup-{}", Uuid::new_v4()))
}
