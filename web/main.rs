mod image;
mod mock;

use axum::{
    Router,
    routing::{get, post},
};
use kiru::{detect::Detector, jobs::JobRunner, storage::Storage};
use std::path::PathBuf;

#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub detector: Detector,
    pub runner: JobRunner,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let storage_root =
        std::env::var("KIRU_STORAGE_DIR").unwrap_or_else(|_| "./processed_images".to_string());
    let storage = Storage::new(PathBuf::from(storage_root));
    let detector = Detector::from_env().expect("failed to build detection client");
    let runner = JobRunner::new();

    let state = AppState {
        storage,
        detector,
        runner,
    };

    let app = Router::new()
        .route("/images/manual-crop", post(image::manual_crop))
        .route("/images/smart-crop", post(image::smart_crop))
        .route("/images/{id}", get(image::get_image))
        .route("/jobs/{id}", get(image::get_job))
        .with_state(state)
        .merge(mock::router(mock::MockDetectorConfig::from_env()));

    let bind = std::env::var("KIRU_BIND").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
