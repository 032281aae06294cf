use async_trait::async_trait;
use domain_backup::{
    model::vo::{BlockImage, DeleteOutcome, DiffTransfer, ImageFeature, ImageRef, ImageSpec},
    service::{SnapshotCapableBackend, TransferEndpoint},
};
use infrastructure_command::{
    CommandException, CommandResult, Pipeline, PipelineOutput, Stage, StageInput,
};
use serde::Deserialize;
use service_backup::FileEndpoint;

use crate::infrastructure::config::CephConfig;

pub const BACKEND_TYPE: &str = "ceph";

const NOT_FOUND: &[&str] = &["No such file or directory", "does not exist"];
const BUSY: &[&str] = &[
    "Device or resource busy",
    "image has snapshots",
    "image still has watchers",
    "snapshot is protected",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    NotFound,
    Busy,
    Other,
}

fn classify(stderr: &str) -> Failure {
    if NOT_FOUND.iter().any(|pattern| stderr.contains(pattern)) {
        Failure::NotFound
    } else if BUSY.iter().any(|pattern| stderr.contains(pattern)) {
        Failure::Busy
    } else {
        Failure::Other
    }
}

fn failure(e: &CommandException) -> Failure {
    e.stderr().map(classify).unwrap_or(Failure::Other)
}

fn delete_outcome(result: CommandResult<PipelineOutput>) -> anyhow::Result<DeleteOutcome> {
    match result {
        Ok(_) => Ok(DeleteOutcome::Deleted),
        Err(e) => match failure(&e) {
            Failure::NotFound => Ok(DeleteOutcome::NotFound),
            Failure::Busy => Ok(DeleteOutcome::Busy),
            Failure::Other => Err(e.into()),
        },
    }
}

#[derive(Deserialize)]
struct ImageInfo {
    size: u64,
}

#[derive(Deserialize)]
struct SnapshotInfo {
    name: String,
}

fn parse_image_size(stdout: &[u8]) -> anyhow::Result<u64> {
    let info: ImageInfo = serde_json::from_reader(stdout)?;
    Ok(info.size)
}

fn parse_snapshot_names(stdout: &[u8]) -> anyhow::Result<Vec<String>> {
    let snapshots: Vec<SnapshotInfo> = serde_json::from_reader(stdout)?;
    Ok(snapshots.into_iter().map(|snapshot| snapshot.name).collect())
}

fn parse_has_extents(stdout: &[u8]) -> anyhow::Result<bool> {
    let extents: Vec<serde_json::Value> = serde_json::from_reader(stdout)?;
    Ok(!extents.is_empty())
}

/// Ceph cluster driven through the `rbd` and `rados` command line tools.
pub struct RbdCliBackend {
    config: CephConfig,
}

impl RbdCliBackend {
    pub fn new(config: CephConfig) -> Self {
        Self { config }
    }

    fn rbd(&self) -> Stage {
        Stage::new(&self.config.rbd).args([
            "--conf",
            self.config.conf.as_str(),
            "--id",
            self.config.user.as_str(),
        ])
    }

    fn rados(&self, pool: &str) -> Stage {
        Stage::new(&self.config.rados).args([
            "--conf",
            self.config.conf.as_str(),
            "--id",
            self.config.user.as_str(),
            "-p",
            pool,
        ])
    }

    fn create_stage(&self, image: &ImageRef, spec: &ImageSpec) -> Stage {
        let mut stage = self
            .rbd()
            .args(["create", "--size"])
            .arg(format!("{}B", spec.size));
        if spec.features.old_format {
            stage = stage.args(["--image-format", "1"]);
        } else {
            stage = stage.args(["--image-format", "2"]);
            for feature in spec.features.features() {
                stage = stage.args(["--image-feature", feature.as_str()]);
            }
        }
        if spec.stripe_unit > 0 && spec.stripe_count > 0 {
            stage = stage
                .arg("--stripe-unit")
                .arg(spec.stripe_unit.to_string())
                .arg("--stripe-count")
                .arg(spec.stripe_count.to_string());
        }
        stage.arg(image.head().to_string())
    }

    fn diff_stages(&self, transfer: &DiffTransfer) -> (Stage, Stage) {
        let mut export = self.rbd().arg("export-diff");
        if let Some(from_snap) = &transfer.from_snap {
            export = export.args(["--from-snap", from_snap.as_str()]);
        }
        let export = export.arg(transfer.source.to_string()).arg("-");
        let import = self
            .rbd()
            .args(["import-diff", "-"])
            .arg(transfer.destination.head().to_string());
        (export, import)
    }

    async fn run(&self, stage: Stage) -> CommandResult<PipelineOutput> {
        Pipeline::single(stage).run().await
    }

    async fn unmap(&self, device: &str) -> anyhow::Result<()> {
        self.run(self.rbd().args(["device", "unmap", device])).await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotCapableBackend for RbdCliBackend {
    fn backend_type(&self) -> String {
        BACKEND_TYPE.to_string()
    }

    fn supported_features(&self) -> Vec<ImageFeature> {
        self.config.features.clone()
    }

    async fn image_exists(&self, image: &ImageRef) -> anyhow::Result<bool> {
        let info = self.rbd().args(["info", "--format", "json"]);
        match self.run(info.arg(image.head().to_string())).await {
            Ok(_) => Ok(true),
            Err(e) if failure(&e) == Failure::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_image(&self, image: &ImageRef, spec: &ImageSpec) -> anyhow::Result<()> {
        self.run(self.create_stage(image, spec)).await?;
        tracing::debug!("Created image: {image} of {} bytes.", spec.size);
        Ok(())
    }

    async fn image_size(&self, image: &ImageRef) -> anyhow::Result<u64> {
        let info = self.rbd().args(["info", "--format", "json"]);
        let output = self.run(info.arg(image.to_string())).await?;
        parse_image_size(&output.stdout)
    }

    async fn resize_image(&self, image: &ImageRef, size: u64) -> anyhow::Result<()> {
        let resize = self
            .rbd()
            .args(["resize", "--allow-shrink", "--size"])
            .arg(format!("{size}B"))
            .arg(image.head().to_string());
        self.run(resize).await?;
        Ok(())
    }

    async fn remove_image(&self, image: &ImageRef) -> anyhow::Result<DeleteOutcome> {
        delete_outcome(self.run(self.rbd().arg("rm").arg(image.head().to_string())).await)
    }

    async fn list_snapshots(&self, image: &ImageRef) -> anyhow::Result<Vec<String>> {
        let ls = self.rbd().args(["snap", "ls", "--format", "json"]);
        let output = self.run(ls.arg(image.head().to_string())).await?;
        parse_snapshot_names(&output.stdout)
    }

    async fn create_snapshot(&self, image: &ImageRef, snapshot: &str) -> anyhow::Result<()> {
        let create = self.rbd().args(["snap", "create"]);
        self.run(create.arg(image.at_snapshot(snapshot).to_string()))
            .await?;
        Ok(())
    }

    async fn remove_snapshot(
        &self,
        image: &ImageRef,
        snapshot: &str,
    ) -> anyhow::Result<DeleteOutcome> {
        let rm = self.rbd().args(["snap", "rm"]);
        delete_outcome(self.run(rm.arg(image.at_snapshot(snapshot).to_string())).await)
    }

    async fn has_extents(&self, image: &ImageRef) -> anyhow::Result<bool> {
        let diff = self.rbd().args(["diff", "--format", "json"]);
        let output = self.run(diff.arg(image.head().to_string())).await?;
        parse_has_extents(&output.stdout)
    }

    async fn open_image(&self, image: &ImageRef) -> anyhow::Result<Box<dyn TransferEndpoint>> {
        let read_only = image.snapshot.is_some();
        let size = self.image_size(image).await?;
        let mut map = self.rbd().args(["device", "map"]);
        if read_only {
            map = map.arg("--read-only");
        }
        let output = self.run(map.arg(image.to_string())).await?;
        let device = String::from_utf8_lossy(&output.stdout).trim().to_string();
        anyhow::ensure!(!device.is_empty(), "Mapping {image} returned no device.");
        let file = if read_only {
            FileEndpoint::open_read_only(&device).await
        } else {
            FileEndpoint::open(&device).await
        };
        let file = match file {
            Ok(file) => file,
            Err(e) => {
                if let Err(unmap) = self.unmap(&device).await {
                    tracing::warn!("Unable to unmap {device}: {unmap}");
                }
                return Err(e);
            }
        };
        tracing::debug!("Mapped {image} to {device}.");
        Ok(Box::new(MappedImageEndpoint {
            backend: RbdCliBackend::new(self.config.clone()),
            image: image.clone(),
            device,
            file,
            size,
            mapped: true,
        }))
    }

    async fn diff_transfer(&self, transfer: &DiffTransfer) -> anyhow::Result<()> {
        let (export, import) = self.diff_stages(transfer);
        Pipeline::piped(export, import).run().await?;
        Ok(())
    }

    async fn write_object(&self, pool: &str, name: &str, data: &[u8]) -> anyhow::Result<()> {
        let put = self.rados(pool).args(["put", name, "-"]);
        Pipeline::single(put)
            .stdin(StageInput::Bytes(data.to_vec()))
            .run()
            .await?;
        Ok(())
    }

    async fn read_object(&self, pool: &str, name: &str) -> anyhow::Result<Option<Vec<u8>>> {
        match self.run(self.rados(pool).args(["get", name, "-"])).await {
            Ok(output) => Ok(Some(output.stdout)),
            Err(e) if failure(&e) == Failure::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_object(&self, pool: &str, name: &str) -> anyhow::Result<DeleteOutcome> {
        delete_outcome(self.run(self.rados(pool).args(["rm", name])).await)
    }
}

/// Image mapped as a kernel block device. Unmapped on close.
struct MappedImageEndpoint {
    backend: RbdCliBackend,
    image: ImageRef,
    device: String,
    file: FileEndpoint,
    /// Device nodes report no length, the size is taken from the image.
    size: u64,
    mapped: bool,
}

#[async_trait]
impl TransferEndpoint for MappedImageEndpoint {
    async fn size(&self) -> anyhow::Result<u64> {
        Ok(self.size)
    }

    async fn read(&mut self, offset: u64, length: usize) -> anyhow::Result<Vec<u8>> {
        if offset >= self.size {
            return Ok(vec![]);
        }
        let length = length.min((self.size - offset) as usize);
        self.file.read(offset, length).await
    }

    async fn write(&mut self, data: &[u8], offset: u64) -> anyhow::Result<()> {
        self.file.write(data, offset).await
    }

    async fn flush(&mut self) -> anyhow::Result<()> {
        self.file.flush().await
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        if !self.mapped {
            return Ok(());
        }
        self.file.close().await?;
        self.backend.unmap(&self.device).await?;
        self.mapped = false;
        tracing::debug!("Unmapped {} from {}.", self.image, self.device);
        Ok(())
    }

    fn block_image(&self) -> Option<BlockImage> {
        Some(BlockImage {
            backend_type: BACKEND_TYPE.to_string(),
            image: self.image.head(),
        })
    }
}
