//! In-process stand-in for the external main-object detection service.
//!
//! Always reports the same bounding box after a configurable delay, which is
//! enough to exercise the full smart-crop pipeline without a real model
//! behind it. The delay is an async sleep, so waiting jobs do not tie up a
//! worker thread.

use axum::{Json, Router, extract::Multipart, extract::State, routing::post};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct MockDetectorConfig {
    /// Simulated model inference time.
    pub delay: Duration,
}

impl Default for MockDetectorConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(2),
        }
    }
}

impl MockDetectorConfig {
    /// Reads `MOCK_DETECTOR_DELAY_MS`, falling back to the default delay.
    pub fn from_env() -> Self {
        Self {
            delay: std::env::var("MOCK_DETECTOR_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(Self::default().delay),
        }
    }
}

pub fn router(config: MockDetectorConfig) -> Router {
    Router::new()
        .route("/mock-ai/find-main-object", post(find_main_object))
        .with_state(config)
}

async fn find_main_object(
    State(config): State<MockDetectorConfig>,
    mut multipart: Multipart,
) -> Json<serde_json::Value> {
    // Drain the upload; the mock never looks at the pixels.
    let mut received = 0usize;
    while let Some(field) = multipart.next_field().await.unwrap_or(None) {
        received += field.bytes().await.map(|b| b.len()).unwrap_or(0);
    }

    tokio::time::sleep(config.delay).await;
    debug!(received, "mock detector responding with fixed box");

    Json(json!({
        "bounding_box": { "x": 50, "y": 50, "width": 150, "height": 150 }
    }))
}
