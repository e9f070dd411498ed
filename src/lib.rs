//! # Product Image Crop Service
//!
//! This crate provides the building blocks for a product-image cropping
//! service: cropping an uploaded image to a caller-supplied region, or
//! delegating region selection to an external main-object detector and
//! performing the crop in the background.
//!
//! ## Features
//!
//! - **Manual Crop**: Crop an image to an explicit rectangle and persist the
//!   derivative under a fresh identifier.
//! - **Smart Crop**: Hand the image to a detached background job that asks an
//!   external detection service for the main object's bounding box, crops to
//!   it, and persists the result. The submitting caller gets the identifier
//!   back immediately.
//! - **Job Tracking**: Every background job is observable by identifier
//!   (pending, succeeded, or failed with its error message).
//! - **Retrieval**: Stored derivatives are fetched back by identifier.
//!
//! ## Usage
//!
//! The high-level entry points live in [`app`]: `ManualCropCommand` for the
//! synchronous path and `SmartCropCommand` for the asynchronous one.
//!
//! ```no_run
//! use kiru::app::SmartCropCommand;
//! use kiru::detect::Detector;
//! use kiru::jobs::JobRunner;
//! use kiru::storage::Storage;
//!
//! fn enqueue(runner: &JobRunner, detector: &Detector, storage: &Storage, bytes: &[u8]) {
//!     let id = SmartCropCommand::new(bytes)
//!         .with_product(serde_json::json!({ "product_id": "p1" }))
//!         .submit(runner, detector, storage);
//!     println!("accepted job {id}");
//! }
//! ```
//!
//! The submission returns before the detection call is even issued; poll the
//! runner's tracker or retrieve by identifier to observe completion.

pub mod app;
pub mod crop;
pub mod detect;
pub mod jobs;
pub mod storage;
