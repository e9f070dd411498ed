//! Detection client: asks the external main-object detector for a bounding
//! box over raw image bytes.
//!
//! One outbound call per invocation, bounded by a fixed timeout, no retries.
//! Whether a failed detection is retried is the submitting pipeline's
//! decision, not this client's.

use crate::crop::CropBox;
use reqwest::multipart::{Form, Part};
use std::time::Duration;

/// Default deadline for one detection call.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the detection client.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Base URL of the detection service.
    pub base_url: String,
    /// Deadline for a single detection call.
    pub timeout: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000/mock-ai".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl DetectorConfig {
    /// Reads configuration from `DETECTOR_URL` and `DETECTOR_TIMEOUT_SECS`,
    /// falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("DETECTOR_URL").unwrap_or(defaults.base_url),
            timeout: std::env::var("DETECTOR_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }
}

/// Client for the external main-object detection service.
///
/// Stateless across calls; cloning shares the underlying connection pool.
#[derive(Debug, Clone)]
pub struct Detector {
    http: reqwest::Client,
    config: DetectorConfig,
}

/// Wire shape of the detector's reply. The box is validated during
/// deserialization, so a degenerate rectangle reads as a parse failure.
#[derive(Debug, serde::Deserialize)]
struct DetectResponse {
    bounding_box: CropBox,
}

impl Detector {
    /// Creates a detection client with the given configuration.
    pub fn new(config: DetectorConfig) -> Result<Detector, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Detector { http, config })
    }

    /// Creates a client configured from the environment.
    pub fn from_env() -> Result<Detector, reqwest::Error> {
        Self::new(DetectorConfig::from_env())
    }

    /// Sends the raw image to the detector and returns the main object's
    /// bounding box.
    ///
    /// # Errors
    /// - `DetectionError::Timeout` if the call exceeds the configured deadline.
    /// - `DetectionError::Unreachable` if the service cannot be reached.
    /// - `DetectionError::BadResponse` on a non-success status, an
    ///   unparsable payload, or a box violating the crop-box invariants.
    pub async fn detect(&self, image_bytes: &[u8]) -> Result<CropBox, DetectionError> {
        let url = format!(
            "{}/find-main-object",
            self.config.base_url.trim_end_matches('/')
        );

        let part = Part::bytes(image_bytes.to_vec())
            .file_name("image.jpg")
            .mime_str("image/jpeg")
            .expect("static mime type is valid");
        let form = Form::new().part("image_file", part);

        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.classify_transport_error(e))?;

        if !response.status().is_success() {
            return Err(DetectionError::BadResponse(format!(
                "detector returned status {}",
                response.status()
            )));
        }

        let payload: DetectResponse = response
            .json()
            .await
            .map_err(|e| self.classify_payload_error(e))?;

        Ok(payload.bounding_box)
    }

    fn classify_transport_error(&self, e: reqwest::Error) -> DetectionError {
        if e.is_timeout() {
            DetectionError::Timeout {
                limit: self.config.timeout,
            }
        } else {
            DetectionError::Unreachable(e)
        }
    }

    /// The body is read under the same deadline as the request, so a stalled
    /// body still surfaces as a timeout rather than a parse failure.
    fn classify_payload_error(&self, e: reqwest::Error) -> DetectionError {
        if e.is_timeout() {
            DetectionError::Timeout {
                limit: self.config.timeout,
            }
        } else {
            DetectionError::BadResponse(e.to_string())
        }
    }
}

/// Errors that can occur during a detection call.
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("detection call timed out after {limit:?}")]
    Timeout { limit: Duration },

    #[error("detection service unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    #[error("detection service returned an unusable response: {0}")]
    BadResponse(String),
}

#[cfg(test)]
mod tests {
    use super::{DetectionError, Detector, DetectorConfig};
    use axum::{Json, Router, routing::post};
    use serde_json::json;
    use std::time::Duration;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn detector(base_url: String, timeout: Duration) -> Detector {
        Detector::new(DetectorConfig { base_url, timeout }).unwrap()
    }

    #[tokio::test]
    async fn test_detect_parses_bounding_box() {
        let router = Router::new().route(
            "/find-main-object",
            post(|| async { Json(json!({ "bounding_box": { "x": 50, "y": 50, "width": 150, "height": 150 } })) }),
        );
        let base_url = serve(router).await;

        let region = detector(base_url, Duration::from_secs(2))
            .detect(b"fake image")
            .await
            .unwrap();

        assert_eq!((50, 50, 150, 150), (region.x, region.y, region.width, region.height));
    }

    #[tokio::test]
    async fn test_slow_detector_times_out() {
        let router = Router::new().route(
            "/find-main-object",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({ "bounding_box": { "x": 0, "y": 0, "width": 1, "height": 1 } }))
            }),
        );
        let base_url = serve(router).await;

        let result = detector(base_url, Duration::from_millis(200))
            .detect(b"fake image")
            .await;

        assert!(matches!(result, Err(DetectionError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_closed_port_is_unreachable() {
        // Bind and immediately drop to find a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let result = detector(base_url, Duration::from_secs(2))
            .detect(b"fake image")
            .await;

        assert!(matches!(result, Err(DetectionError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_non_json_payload_is_bad_response() {
        let router = Router::new().route("/find-main-object", post(|| async { "not json" }));
        let base_url = serve(router).await;

        let result = detector(base_url, Duration::from_secs(2))
            .detect(b"fake image")
            .await;

        assert!(matches!(result, Err(DetectionError::BadResponse(_))));
    }

    #[tokio::test]
    async fn test_degenerate_box_is_bad_response() {
        let router = Router::new().route(
            "/find-main-object",
            post(|| async { Json(json!({ "bounding_box": { "x": 0, "y": 0, "width": 0, "height": 150 } })) }),
        );
        let base_url = serve(router).await;

        let result = detector(base_url, Duration::from_secs(2))
            .detect(b"fake image")
            .await;

        assert!(matches!(result, Err(DetectionError::BadResponse(_))));
    }

    #[tokio::test]
    async fn test_error_status_is_bad_response() {
        let router = Router::new().route(
            "/find-main-object",
            post(|| async { axum::http::StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let base_url = serve(router).await;

        let result = detector(base_url, Duration::from_secs(2))
            .detect(b"fake image")
            .await;

        assert!(matches!(result, Err(DetectionError::BadResponse(_))));
    }
}
