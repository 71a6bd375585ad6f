use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::warn;

use capsule_types::api::{
    CapsuleDetail, CreateCapsuleRequest, CreateCapsuleResponse, DeleteCapsuleResponse,
    JoinCapsuleRequest, NameCapsuleRequest, SealCapsuleRequest,
};
use capsule_types::models::{CAPSULE_CODE_LEN, Capsule, CapsuleState, FileKind};

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath};
use crate::middleware::AuthUser;
use crate::state::{AppState, run_blocking};

const MAX_VESSEL_LEN: usize = 32;
const MAX_CAPSULE_NAME_LEN: usize = 255;

pub async fn list_capsules(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Capsule>>, ApiError> {
    let db = state.clone();
    let capsules = run_blocking(move || db.capsules.get_capsules(user.id)).await?;
    Ok(Json(capsules))
}

pub async fn create_capsule(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<CreateCapsuleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let vessel = req.vessel.trim().to_string();
    if vessel.is_empty() || vessel.chars().count() > MAX_VESSEL_LEN {
        return Err(ApiError::BadRequest(format!(
            "vessel must be between 1 and {MAX_VESSEL_LEN} characters"
        )));
    }

    let db = state.clone();
    let capsule_id =
        run_blocking(move || db.capsules.create_capsule(user.id, &vessel, req.public)).await?;

    Ok((StatusCode::CREATED, Json(CreateCapsuleResponse { capsule_id })))
}

pub async fn join_capsule(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<JoinCapsuleRequest>,
) -> Result<StatusCode, ApiError> {
    let code = req.code.trim().to_ascii_uppercase();
    if code.len() != CAPSULE_CODE_LEN {
        return Err(ApiError::BadRequest(format!(
            "code must be exactly {CAPSULE_CODE_LEN} characters"
        )));
    }

    let db = state.clone();
    run_blocking(move || db.capsules.join_capsule(user.id, &code)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// The capsule plus all of its content. Content stays hidden while sealed.
pub async fn get_capsule(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(capsule_id): ApiPath<i64>,
) -> Result<Json<CapsuleDetail>, ApiError> {
    let db = state.clone();
    let detail = run_blocking(move || {
        let capsule = db.capsules.get_capsule(user.id, capsule_id)?;
        let mut detail = CapsuleDetail {
            capsule,
            songs: vec![],
            question_answers: vec![],
            writings: vec![],
            photos: vec![],
            audios: vec![],
            doodles: vec![],
            misc_files: vec![],
        };
        if detail.capsule.sealed == CapsuleState::Sealed {
            return Ok(detail);
        }

        detail.songs = db.songs.get_songs(user.id, capsule_id)?;
        detail.question_answers = db.question_answers.get_question_answers(user.id, capsule_id)?;
        detail.writings = db.writings.get_writings(user.id, capsule_id)?;
        detail.photos = db.files.get_files(FileKind::Photo, user.id, capsule_id)?;
        detail.audios = db.files.get_files(FileKind::Audio, user.id, capsule_id)?;
        detail.doodles = db.files.get_files(FileKind::Doodle, user.id, capsule_id)?;
        detail.misc_files = db.files.get_files(FileKind::MiscFile, user.id, capsule_id)?;
        Ok(detail)
    })
    .await?;

    Ok(Json(detail))
}

pub async fn name_capsule(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(capsule_id): ApiPath<i64>,
    ApiJson(req): ApiJson<NameCapsuleRequest>,
) -> Result<StatusCode, ApiError> {
    let name = req.name.trim().to_string();
    if name.is_empty() || name.chars().count() > MAX_CAPSULE_NAME_LEN {
        return Err(ApiError::BadRequest(format!(
            "name must be between 1 and {MAX_CAPSULE_NAME_LEN} characters"
        )));
    }

    let db = state.clone();
    run_blocking(move || db.capsules.name_capsule(user.id, capsule_id, &name)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn seal_capsule(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(capsule_id): ApiPath<i64>,
    ApiJson(req): ApiJson<SealCapsuleRequest>,
) -> Result<StatusCode, ApiError> {
    let db = state.clone();
    let now = chrono::Utc::now();
    run_blocking(move || db.capsules.seal_capsule(user.id, capsule_id, req.date_to_open, now))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn open_capsule(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(capsule_id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    let db = state.clone();
    let now = chrono::Utc::now();
    run_blocking(move || db.capsules.open_capsule(user.id, capsule_id, now)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Deletes the capsule, then best-effort removes the objects its content
/// pointed at. Objects still attached to another capsule are kept. Object
/// failures are logged and skipped, never retried.
pub async fn delete_capsule(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(capsule_id): ApiPath<i64>,
) -> Result<Json<DeleteCapsuleResponse>, ApiError> {
    let db = state.clone();
    let object_names = run_blocking(move || db.capsules.delete_capsule(user.id, capsule_id)).await?;

    let db = state.clone();
    let names = object_names.clone();
    let orphaned = run_blocking(move || {
        let mut orphaned = Vec::with_capacity(names.len());
        for name in names {
            if !db.files.is_object_referenced(&name)? {
                orphaned.push(name);
            }
        }
        Ok(orphaned)
    })
    .await?;

    for name in &orphaned {
        if let Err(e) = state.objects.delete(name).await {
            warn!("Failed to delete object {} of capsule {}: {:#}", name, capsule_id, e);
        }
    }

    Ok(Json(DeleteCapsuleResponse { object_names }))
}
