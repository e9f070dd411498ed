use crate::AppState;
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use bytes::BytesMut;
use futures::TryStreamExt;
use kiru::{
    app::{AppError, ManualCropCommand, SmartCropCommand, fetch_image},
    crop::{CropBox, CropError},
    jobs::JobStatus,
    storage::{ImageId, StorageError},
};
use serde::Serialize;
use std::str::FromStr;

/// Response for a completed manual crop.
#[derive(Serialize, Debug)]
pub struct CropResponse {
    pub image_id: ImageId,
    pub retrieval_url: String,
}

/// Acknowledgment for an accepted smart-crop job. Processing happens later;
/// the identifier is the only handle the caller gets.
#[derive(Serialize, Debug)]
pub struct AcceptedResponse {
    pub image_id: ImageId,
    pub status: &'static str,
    pub retrieval_url: String,
}

#[derive(Serialize, Debug)]
pub struct JobResponse {
    pub image_id: ImageId,
    pub status: JobStatus,
    pub submitted_at: String,
    pub finished_at: Option<String>,
    pub error: Option<String>,
}

fn retrieval_url(id: &ImageId) -> String {
    format!("/images/{id}")
}

/// Multipart fields shared by the two upload endpoints.
#[derive(Default)]
struct Upload {
    source_image: Option<Vec<u8>>,
    product_info: Option<String>,
    crop_box: Option<String>,
}

async fn read_upload(mut multipart: Multipart) -> Upload {
    let mut upload = Upload::default();

    while let Some(field) = multipart.next_field().await.unwrap_or(None) {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "source_image" => {
                let mut data = BytesMut::new();
                let mut stream = field.into_stream();
                while let Some(chunk) = stream.try_next().await.unwrap_or(None) {
                    data.extend_from_slice(&chunk);
                }
                upload.source_image = Some(data.freeze().to_vec());
            }
            "product_info" => {
                upload.product_info = Some(field.text().await.unwrap_or_default());
            }
            "crop_box" => {
                upload.crop_box = Some(field.text().await.unwrap_or_default());
            }
            _ => {} // ignore
        }
    }

    upload
}

fn parse_product(text: &str) -> Result<serde_json::Value, ImageError> {
    serde_json::from_str(text)
        .map_err(|e| ImageError::BadRequest(format!("invalid product_info: {e}")))
}

pub async fn manual_crop(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<CropResponse>), ImageError> {
    let upload = read_upload(multipart).await;

    let bytes = upload
        .source_image
        .ok_or_else(|| ImageError::BadRequest("missing source_image".to_string()))?;
    let product = parse_product(
        &upload
            .product_info
            .ok_or_else(|| ImageError::BadRequest("missing product_info".to_string()))?,
    )?;
    let region: CropBox = serde_json::from_str(
        &upload
            .crop_box
            .ok_or_else(|| ImageError::BadRequest("missing crop_box".to_string()))?,
    )
    .map_err(|e| ImageError::BadRequest(format!("invalid crop_box: {e}")))?;

    let id = ManualCropCommand::new(&bytes, region)
        .with_product(product)
        .execute(&state.storage)?;

    Ok((
        StatusCode::CREATED,
        Json(CropResponse {
            image_id: id,
            retrieval_url: retrieval_url(&id),
        }),
    ))
}

pub async fn smart_crop(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<AcceptedResponse>), ImageError> {
    let upload = read_upload(multipart).await;

    let bytes = upload
        .source_image
        .ok_or_else(|| ImageError::BadRequest("missing source_image".to_string()))?;
    let product = parse_product(
        &upload
            .product_info
            .ok_or_else(|| ImageError::BadRequest("missing product_info".to_string()))?,
    )?;

    let id = SmartCropCommand::new(&bytes)
        .with_product(product)
        .submit(&state.runner, &state.detector, &state.storage);

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            image_id: id,
            status: "accepted",
            retrieval_url: retrieval_url(&id),
        }),
    ))
}

pub async fn get_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ImageError> {
    let id = ImageId::from_str(&id)
        .map_err(|e| ImageError::BadRequest(e.to_string()))?;

    let bytes = fetch_image(&state.storage, &id)?;

    // Stored derivatives are JPEG today; sniff anyway so the header stays
    // honest if the stored format ever changes.
    let content_type = infer::get(&bytes)
        .map(|kind| kind.mime_type())
        .unwrap_or("image/jpeg");

    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, ImageError> {
    let id = ImageId::from_str(&id)
        .map_err(|e| ImageError::BadRequest(e.to_string()))?;

    let record = state
        .runner
        .tracker()
        .get(&id)
        .ok_or(ImageError::JobNotFound(id))?;

    Ok(Json(JobResponse {
        image_id: id,
        status: record.status,
        submitted_at: record.submitted_at.to_rfc3339(),
        finished_at: record.finished_at.map(|t| t.to_rfc3339()),
        error: record.error,
    }))
}

pub enum ImageError {
    App(AppError),

    BadRequest(String),

    JobNotFound(ImageId),
}

impl From<AppError> for ImageError {
    fn from(value: AppError) -> Self {
        ImageError::App(value)
    }
}

impl IntoResponse for ImageError {
    fn into_response(self) -> axum::response::Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            message: String,
        }

        let (status, message) = match self {
            ImageError::App(app_error) => match app_error {
                AppError::Storage(storage_error) => match storage_error {
                    StorageError::NotFound { id } => (StatusCode::NOT_FOUND, id.to_string()),
                    StorageError::WriteFailed(error) | StorageError::ReadFailed(error) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
                    }
                },
                AppError::Crop(crop_error) => match crop_error {
                    CropError::DecodeFailed(_) => {
                        (StatusCode::BAD_REQUEST, crop_error.to_string())
                    }
                    CropError::OutOfBounds { .. } => {
                        (StatusCode::UNPROCESSABLE_ENTITY, crop_error.to_string())
                    }
                    CropError::EncodeFailed(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, crop_error.to_string())
                    }
                },
                // Detection runs inside background jobs, so this only shows
                // up if a synchronous caller ever invokes the pipeline.
                AppError::Detection(detection_error) => {
                    (StatusCode::BAD_GATEWAY, detection_error.to_string())
                }
            },
            ImageError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ImageError::JobNotFound(id) => (StatusCode::NOT_FOUND, id.to_string()),
        };

        (status, Json(ErrorResponse { message })).into_response()
    }
}
