use axum::{
    Extension, Json,
    body::Bytes,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::{StatusCode, header},
    response::IntoResponse,
};
use tracing::{debug, info};

use capsule_storage::{content_type_for, new_object_name, user_namespace, validate_object_name};
use capsule_types::api::{ObjectNamePayload, UploadResponse};

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath};
use crate::middleware::AuthUser;
use crate::state::AppState;

/// Largest accepted file.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Request body limit for the upload route: the file plus room for the
/// multipart framing around it.
pub const UPLOAD_BODY_LIMIT: usize = MAX_UPLOAD_BYTES + 64 * 1024;

const UPLOAD_FIELD: &str = "file";

fn multipart_error(e: MultipartError) -> ApiError {
    match e.status() {
        StatusCode::PAYLOAD_TOO_LARGE => ApiError::PayloadTooLarge(MAX_UPLOAD_BYTES),
        _ => ApiError::BadRequest(e.body_text()),
    }
}

/// Stores the `file` field of a multipart body in the caller's namespace and
/// returns the URL it is served from.
pub async fn upload(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            debug!("Skipping multipart field {:?}", field.name());
            continue;
        }

        let object_name = new_object_name(user.id, field.file_name());
        let mut data = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            if data.len() + chunk.len() > MAX_UPLOAD_BYTES {
                return Err(ApiError::PayloadTooLarge(MAX_UPLOAD_BYTES));
            }
            data.extend_from_slice(&chunk);
        }
        if data.is_empty() {
            return Err(ApiError::BadRequest("uploaded file is empty".into()));
        }

        let size = data.len();
        state.objects.put(&object_name, Bytes::from(data)).await?;
        info!("User {} uploaded {} ({} bytes)", user.id, object_name, size);

        return Ok(Json(UploadResponse {
            image_url: state.config.object_url(&object_name),
            object_name,
        }));
    }

    Err(ApiError::BadRequest(format!("missing multipart field '{UPLOAD_FIELD}'")))
}

/// Deletes one of the caller's own uploads.
pub async fn delete_file(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<ObjectNamePayload>,
) -> Result<StatusCode, ApiError> {
    validate_object_name(&req.object_name).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if !req.object_name.starts_with(&user_namespace(user.id)) {
        return Err(ApiError::Forbidden("cannot delete another user's file".into()));
    }

    if !state.objects.delete(&req.object_name).await? {
        return Err(ApiError::NotFound("file not found".into()));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Serves an object publicly by name.
pub async fn fetch_object(
    State(state): State<AppState>,
    ApiPath(object_name): ApiPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    if validate_object_name(&object_name).is_err() {
        return Err(ApiError::NotFound("object not found".into()));
    }

    let data = state
        .objects
        .get(&object_name)
        .await?
        .ok_or_else(|| ApiError::NotFound("object not found".into()))?;

    Ok(([(header::CONTENT_TYPE, content_type_for(&object_name))], data))
}
