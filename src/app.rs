//! # High-Level Crop Operations
//!
//! This module ties the detection client, crop engine, job runner, and
//! storage together into the two operations the service exposes:
//!
//! - **ManualCropCommand**: the caller supplies the rectangle; cropping and
//!   persistence happen synchronously and the stored identifier is returned.
//! - **SmartCropCommand**: the rectangle comes from the external detector;
//!   the whole detect, crop, persist pipeline runs as a detached background
//!   job and only the identifier is returned to the caller.
//!
//! Both follow the builder style: construct from the raw bytes, chain the
//! optional pieces, then `execute` or `submit`.
//!
//! ## Error Handling
//!
//! Synchronous operations surface [`AppError`] to the caller. The background
//! pipeline's errors never reach the submitter; the job runner records them
//! in its tracker and logs them with the job identifier.

use crate::{
    crop::{CropBox, CropError, crop},
    detect::{DetectionError, Detector},
    jobs::{ImageJob, JobRunner},
    storage::{ImageId, Storage, StorageError},
};
use tracing::info;

/// Represents a command for cropping an image to a caller-supplied region.
pub struct ManualCropCommand {
    /// Raw uploaded image bytes.
    pub bytes: Vec<u8>,
    /// The rectangle to crop to.
    pub region: CropBox,
    /// Opaque product metadata, logged for correlation but not interpreted.
    pub product: serde_json::Value,
}

impl ManualCropCommand {
    /// Creates a new `ManualCropCommand` from raw bytes and a crop region.
    pub fn new(bytes: &[u8], region: CropBox) -> Self {
        ManualCropCommand {
            bytes: bytes.to_vec(),
            region,
            product: serde_json::Value::Null,
        }
    }

    /// Attaches product metadata to the command.
    pub fn with_product(mut self, product: serde_json::Value) -> Self {
        self.product = product;
        self
    }

    /// Crops the image and persists the derivative under a fresh identifier.
    ///
    /// # Returns
    ///
    /// The identifier the cropped image was stored under.
    pub fn execute(self, storage: &Storage) -> Result<ImageId, AppError> {
        let id = ImageId::generate();

        let cropped = crop(&self.bytes, self.region)?;
        storage.put(&id, &cropped)?;

        info!(image_id = %id, region = ?self.region, "manual crop stored");

        Ok(id)
    }
}

/// Represents a command for cropping an image to its detected main object.
///
/// Submission is fire-and-return: the identifier comes back immediately and
/// the pipeline runs on a detached task. Completion is observable through the
/// runner's tracker or by retrieving the identifier.
pub struct SmartCropCommand {
    /// Raw uploaded image bytes.
    pub bytes: Vec<u8>,
    /// Opaque product metadata carried along with the job.
    pub product: serde_json::Value,
}

impl SmartCropCommand {
    /// Creates a new `SmartCropCommand` from raw bytes.
    pub fn new(bytes: &[u8]) -> Self {
        SmartCropCommand {
            bytes: bytes.to_vec(),
            product: serde_json::Value::Null,
        }
    }

    /// Attaches product metadata to the command.
    pub fn with_product(mut self, product: serde_json::Value) -> Self {
        self.product = product;
        self
    }

    /// Generates an identifier, hands the pipeline to the runner, and
    /// returns the identifier without waiting for any of it.
    pub fn submit(self, runner: &JobRunner, detector: &Detector, storage: &Storage) -> ImageId {
        let id = ImageId::generate();
        let job = ImageJob::new(id, self.bytes, self.product);

        let detector = detector.clone();
        let storage = storage.clone();
        runner.submit(job, move |job| run_smart_crop(detector, storage, job));

        id
    }
}

/// The background smart-crop pipeline: detect, crop, persist.
///
/// Runs entirely off the request path. The returned error is for the job
/// runner's bookkeeping; by the time it can occur, the submitting caller is
/// long gone.
pub async fn run_smart_crop(
    detector: Detector,
    storage: Storage,
    job: ImageJob,
) -> Result<(), AppError> {
    let region = detector.detect(&job.bytes).await?;
    let cropped = crop(&job.bytes, region)?;
    storage.put(&job.id, &cropped)?;

    info!(image_id = %job.id, region = ?region, product = %job.product, "smart crop stored");

    Ok(())
}

/// Retrieves the stored derivative for an identifier.
///
/// Pending and failed jobs read exactly like unknown identifiers: not found.
pub fn fetch_image(storage: &Storage, id: &ImageId) -> Result<Vec<u8>, AppError> {
    Ok(storage.get(id)?)
}

/// Error types within the application, encapsulating detection, crop, and
/// storage errors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("detection error: {0}")]
    Detection(#[from] DetectionError),

    #[error("crop error: {0}")]
    Crop(#[from] CropError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
