use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, warn};

use capsule_storage::{user_namespace, validate_object_name};
use capsule_types::api::{
    CreateFileContentRequest, CreateSongRequest, CreatedResponse, ObjectNamePayload,
    QuestionAnswerRequest, WritingRequest,
};
use capsule_types::models::{FileContent, FileKind, QuestionAnswer, Song, Writing};

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath};
use crate::middleware::AuthUser;
use crate::state::{AppState, run_blocking};

const MAX_SHORT_TEXT_LEN: usize = 255;
const MAX_LONG_TEXT_LEN: usize = 1000;
const MAX_URL_LEN: usize = 2048;

fn validate_text(field: &str, value: &str, max: usize) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() || value.chars().count() > max {
        return Err(ApiError::BadRequest(format!(
            "{field} must be between 1 and {max} characters"
        )));
    }
    Ok(value.to_string())
}

fn created(id: i64) -> impl IntoResponse {
    (StatusCode::CREATED, Json(CreatedResponse { id }))
}

// -- Songs --

pub async fn list_songs(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(capsule_id): ApiPath<i64>,
) -> Result<Json<Vec<Song>>, ApiError> {
    let db = state.clone();
    let songs = run_blocking(move || db.songs.get_songs(user.id, capsule_id)).await?;
    Ok(Json(songs))
}

pub async fn create_song(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(capsule_id): ApiPath<i64>,
    ApiJson(req): ApiJson<CreateSongRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let spotify_id = validate_text("spotifyId", &req.spotify_id, MAX_SHORT_TEXT_LEN)?;
    let name = validate_text("name", &req.name, MAX_SHORT_TEXT_LEN)?;
    let artist_name = validate_text("artistName", &req.artist_name, MAX_SHORT_TEXT_LEN)?;
    let album_art_url = req.album_art_url.trim().to_string();
    if album_art_url.len() > MAX_URL_LEN {
        return Err(ApiError::BadRequest("albumArtURL is too long".into()));
    }

    let db = state.clone();
    let id = run_blocking(move || {
        db.songs
            .create_song(user.id, capsule_id, &spotify_id, &name, &artist_name, &album_art_url)
    })
    .await?;
    Ok(created(id))
}

pub async fn delete_song(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath((capsule_id, song_id)): ApiPath<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    let db = state.clone();
    run_blocking(move || db.songs.delete_song(user.id, capsule_id, song_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -- Question answers --

pub async fn list_question_answers(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(capsule_id): ApiPath<i64>,
) -> Result<Json<Vec<QuestionAnswer>>, ApiError> {
    let db = state.clone();
    let items =
        run_blocking(move || db.question_answers.get_question_answers(user.id, capsule_id)).await?;
    Ok(Json(items))
}

pub async fn create_question_answer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(capsule_id): ApiPath<i64>,
    ApiJson(req): ApiJson<QuestionAnswerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let prompt = validate_text("prompt", &req.prompt, MAX_SHORT_TEXT_LEN)?;
    let answer = validate_text("answer", &req.answer, MAX_LONG_TEXT_LEN)?;

    let db = state.clone();
    let id = run_blocking(move || {
        db.question_answers
            .create_question_answer(user.id, capsule_id, &prompt, &answer)
    })
    .await?;
    Ok(created(id))
}

pub async fn update_question_answer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath((capsule_id, question_answer_id)): ApiPath<(i64, i64)>,
    ApiJson(req): ApiJson<QuestionAnswerRequest>,
) -> Result<StatusCode, ApiError> {
    let prompt = validate_text("prompt", &req.prompt, MAX_SHORT_TEXT_LEN)?;
    let answer = validate_text("answer", &req.answer, MAX_LONG_TEXT_LEN)?;

    let db = state.clone();
    run_blocking(move || {
        db.question_answers.update_question_answer(
            user.id,
            capsule_id,
            question_answer_id,
            &prompt,
            &answer,
        )
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_question_answer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath((capsule_id, question_answer_id)): ApiPath<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    let db = state.clone();
    run_blocking(move || {
        db.question_answers
            .delete_question_answer(user.id, capsule_id, question_answer_id)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

// -- Writings --

pub async fn list_writings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(capsule_id): ApiPath<i64>,
) -> Result<Json<Vec<Writing>>, ApiError> {
    let db = state.clone();
    let writings = run_blocking(move || db.writings.get_writings(user.id, capsule_id)).await?;
    Ok(Json(writings))
}

pub async fn create_writing(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(capsule_id): ApiPath<i64>,
    ApiJson(req): ApiJson<WritingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let writing = validate_text("writing", &req.writing, MAX_LONG_TEXT_LEN)?;

    let db = state.clone();
    let id = run_blocking(move || db.writings.create_writing(user.id, capsule_id, &writing)).await?;
    Ok(created(id))
}

pub async fn update_writing(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath((capsule_id, writing_id)): ApiPath<(i64, i64)>,
    ApiJson(req): ApiJson<WritingRequest>,
) -> Result<StatusCode, ApiError> {
    let writing = validate_text("writing", &req.writing, MAX_LONG_TEXT_LEN)?;

    let db = state.clone();
    run_blocking(move || {
        db.writings
            .update_writing(user.id, capsule_id, writing_id, &writing)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_writing(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath((capsule_id, writing_id)): ApiPath<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    let db = state.clone();
    run_blocking(move || db.writings.delete_writing(user.id, capsule_id, writing_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -- Photos, audios, doodles, misc files --

pub async fn list_files(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath((capsule_id, kind)): ApiPath<(i64, FileKind)>,
) -> Result<Json<Vec<FileContent>>, ApiError> {
    let db = state.clone();
    let files = run_blocking(move || db.files.get_files(kind, user.id, capsule_id)).await?;
    Ok(Json(files))
}

/// Attaches an uploaded object to a capsule. Only objects from the caller's
/// own namespace can be attached.
pub async fn create_file(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath((capsule_id, kind)): ApiPath<(i64, FileKind)>,
    ApiJson(req): ApiJson<CreateFileContentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let object_name = req.object_name.trim().to_string();
    validate_object_name(&object_name).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if !object_name.starts_with(&user_namespace(user.id)) {
        return Err(ApiError::Forbidden(
            "objects can only be attached by their uploader".into(),
        ));
    }
    let file_url = req.file_url.trim().to_string();
    if file_url.is_empty() || file_url.len() > MAX_URL_LEN {
        return Err(ApiError::BadRequest(format!(
            "fileURL must be between 1 and {MAX_URL_LEN} characters"
        )));
    }

    let db = state.clone();
    let id = run_blocking(move || {
        db.files
            .create_file(kind, user.id, capsule_id, &object_name, &file_url)
    })
    .await?;
    Ok(created(id))
}

pub async fn delete_file(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath((capsule_id, kind, item_id)): ApiPath<(i64, FileKind, i64)>,
) -> Result<Json<ObjectNamePayload>, ApiError> {
    let db = state.clone();
    let (object_name, still_referenced) = run_blocking(move || {
        let object_name = db.files.delete_file(kind, user.id, capsule_id, item_id)?;
        let still_referenced = db.files.is_object_referenced(&object_name)?;
        Ok((object_name, still_referenced))
    })
    .await?;

    if still_referenced {
        debug!("Keeping object {}; another capsule still references it", object_name);
    } else if let Err(e) = state.objects.delete(&object_name).await {
        warn!("Failed to delete object {} for {} {}: {:#}", object_name, kind.label(), item_id, e);
    }

    Ok(Json(ObjectNamePayload { object_name }))
}
