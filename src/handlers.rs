// src/handlers.rs
use crate::{
    AppState,
    errors::{FieldError, SnapscribeError, ValidationErrors},
    models::*,
};
use actix_multipart::Multipart;
use actix_web::{HttpRequest, HttpResponse, error::JsonPayloadError, web};
use base64::{Engine as _, engine::general_purpose};
use bytes::BytesMut;
use futures_util::TryStreamExt;
use log::info;

pub fn configure_routes(cfg: &mut web::ServiceConfig, max_payload_bytes: usize) {
    cfg.app_data(
        web::JsonConfig::default()
            .limit(max_payload_bytes)
            .error_handler(json_error_handler),
    )
    .service(
        web::scope("/api/v1")
            .route("/images/analyze", web::post().to(analyze_image))
            .route("/images/upload", web::post().to(upload_image))
            .route("/health", web::get().to(health_check)),
    )
    .route("/health", web::get().to(health_check));
}

fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    SnapscribeError::InvalidRequest(ValidationErrors(vec![FieldError::new(
        "body",
        err.to_string(),
    )]))
    .into()
}

pub async fn analyze_image(
    body: web::Json<ImageAnalysisRequest>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, SnapscribeError> {
    let request = body.into_inner();
    let result = data.pipeline.process(&request).await?;
    Ok(HttpResponse::Ok().json(&result))
}

/// Multipart form: `file` (or `image`) plus optional `descriptionLength`,
/// `mode` and `fileName` text fields.
pub async fn upload_image(
    mut payload: Multipart,
    data: web::Data<AppState>,
) -> Result<HttpResponse, SnapscribeError> {
    let mut request = ImageAnalysisRequest::default();
    let mut errors = ValidationErrors::default();
    let mut received = 0usize;

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| SnapscribeError::Multipart(e.to_string()))?
    {
        let name = field.name().to_string();
        let filename = field
            .content_disposition()
            .get_filename()
            .map(|f| f.to_string());
        let content_type = field.content_type().map(|ct| ct.essence_str().to_string());

        let mut buffer = BytesMut::new();
        while let Some(chunk) = field
            .try_next()
            .await
            .map_err(|e| SnapscribeError::Multipart(e.to_string()))?
        {
            received += chunk.len();
            if received > data.max_payload_bytes {
                return Err(SnapscribeError::Multipart(format!(
                    "Upload exceeds {} bytes",
                    data.max_payload_bytes
                )));
            }
            buffer.extend_from_slice(&chunk);
        }

        match name.as_str() {
            "file" | "image" => {
                if request.file_name.is_empty() {
                    request.file_name = filename.unwrap_or_default();
                }
                request.content_type = content_type.unwrap_or_default();
                request.image_data = general_purpose::STANDARD.encode(&buffer);
            }
            "descriptionLength" => match text_field(&buffer).parse::<u32>() {
                Ok(length) => request.description_length = length,
                Err(_) => errors.push("descriptionLength", "must be a whole number"),
            },
            "mode" => match text_field(&buffer).parse::<ProcessingMode>() {
                Ok(mode) => request.mode = mode,
                Err(message) => errors.push("mode", message),
            },
            "fileName" => request.file_name = text_field(&buffer),
            other => info!("Ignoring unknown upload field '{}'", other),
        }
    }

    if !errors.is_empty() {
        return Err(errors.into());
    }

    let result = data.pipeline.process(&request).await?;
    Ok(HttpResponse::Ok().json(&result))
}

fn text_field(buffer: &[u8]) -> String {
    String::from_utf8_lossy(buffer).trim().to_string()
}

pub async fn health_check(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "snapscribe",
        "version": env!("CARGO_PKG_VERSION"),
        "visionProvider": data.vision_provider,
        "uptimeSeconds": data.started_at.elapsed().as_secs(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}
