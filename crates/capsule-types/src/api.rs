use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Capsule, FileContent, QuestionAnswer, Song, Writing};

// -- JWT Claims --

/// Claims carried in the bearer token. `sub` is the user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdatePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

// -- Capsules --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCapsuleRequest {
    pub vessel: String,
    #[serde(default)]
    pub public: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCapsuleResponse {
    pub capsule_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinCapsuleRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NameCapsuleRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SealCapsuleRequest {
    pub date_to_open: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCapsuleResponse {
    pub object_names: Vec<String>,
}

/// A capsule together with everything contributed to it. Content lists are
/// left empty while the capsule is sealed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapsuleDetail {
    pub capsule: Capsule,
    pub songs: Vec<Song>,
    pub question_answers: Vec<QuestionAnswer>,
    pub writings: Vec<Writing>,
    pub photos: Vec<FileContent>,
    pub audios: Vec<FileContent>,
    pub doodles: Vec<FileContent>,
    pub misc_files: Vec<FileContent>,
}

// -- Content --

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateSongRequest {
    pub spotify_id: String,
    pub name: String,
    pub artist_name: String,
    #[serde(rename = "albumArtURL", default)]
    pub album_art_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuestionAnswerRequest {
    pub prompt: String,
    pub answer: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WritingRequest {
    pub writing: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateFileContentRequest {
    pub object_name: String,
    #[serde(rename = "fileURL")]
    pub file_url: String,
}

// -- Files --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    #[serde(rename = "imageURL")]
    pub image_url: String,
    pub object_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ObjectNamePayload {
    pub object_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_request_uses_camel_case() {
        let req: RegisterRequest = serde_json::from_str(
            r#"{"firstName":"Ada","lastName":"Lovelace","email":"ada@example.com","password":"engine1"}"#,
        )
        .unwrap();
        assert_eq!(req.first_name, "Ada");
        assert_eq!(req.last_name, "Lovelace");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let res: Result<JoinCapsuleRequest, _> =
            serde_json::from_str(r#"{"code":"ABCDEFGHJK","extra":1}"#);
        assert!(res.is_err());
    }

    #[test]
    fn upload_response_field_names() {
        let json = serde_json::to_value(UploadResponse {
            image_url: "http://localhost/objects/a".into(),
            object_name: "a".into(),
        })
        .unwrap();
        assert_eq!(json["imageURL"], "http://localhost/objects/a");
        assert_eq!(json["objectName"], "a");
    }
}
