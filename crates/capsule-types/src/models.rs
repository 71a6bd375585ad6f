use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of non-owner members a capsule can hold.
pub const MAX_MEMBERS: usize = 3;

/// Length of the join code handed out at capsule creation.
pub const CAPSULE_CODE_LEN: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle of a capsule. Transitions only move forward:
/// `Unsealed -> Sealed -> Opened`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapsuleState {
    Unsealed,
    Sealed,
    Opened,
}

impl CapsuleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unsealed => "unsealed",
            Self::Sealed => "sealed",
            Self::Opened => "opened",
        }
    }
}

impl fmt::Display for CapsuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown capsule state '{0}'")]
pub struct UnknownCapsuleState(pub String);

impl FromStr for CapsuleState {
    type Err = UnknownCapsuleState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unsealed" => Ok(Self::Unsealed),
            "sealed" => Ok(Self::Sealed),
            "opened" => Ok(Self::Opened),
            other => Err(UnknownCapsuleState(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capsule {
    pub id: i64,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub public: bool,
    pub capsule_owner_id: i64,
    pub capsule_member1_id: Option<i64>,
    pub capsule_member2_id: Option<i64>,
    pub capsule_member3_id: Option<i64>,
    pub vessel: String,
    pub name: Option<String>,
    pub date_to_open: Option<DateTime<Utc>>,
    pub email_sent: bool,
    pub sealed: CapsuleState,
}

impl Capsule {
    pub fn members(&self) -> [Option<i64>; MAX_MEMBERS] {
        [
            self.capsule_member1_id,
            self.capsule_member2_id,
            self.capsule_member3_id,
        ]
    }

    pub fn is_owner(&self, user_id: i64) -> bool {
        self.capsule_owner_id == user_id
    }

    /// Owner or any filled member slot.
    pub fn is_participant(&self, user_id: i64) -> bool {
        self.is_owner(user_id) || self.members().contains(&Some(user_id))
    }

    /// Index (0-based) of the first empty member slot, if any.
    pub fn open_slot(&self) -> Option<usize> {
        self.members().iter().position(Option::is_none)
    }

    /// Participants may always read; strangers only when the capsule is public.
    pub fn can_view(&self, user_id: i64) -> bool {
        self.public || self.is_participant(user_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: i64,
    pub user_id: i64,
    pub capsule_id: i64,
    pub spotify_id: String,
    pub name: String,
    pub artist_name: String,
    #[serde(rename = "albumArtURL")]
    pub album_art_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionAnswer {
    pub id: i64,
    pub user_id: i64,
    pub capsule_id: i64,
    pub prompt: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Writing {
    pub id: i64,
    pub user_id: i64,
    pub capsule_id: i64,
    pub writing: String,
    pub created_at: DateTime<Utc>,
}

/// Photos, audio clips, doodles and misc files all share this shape: a row
/// pointing at an uploaded object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContent {
    pub id: i64,
    pub user_id: i64,
    pub capsule_id: i64,
    pub object_name: String,
    #[serde(rename = "fileURL")]
    pub file_url: String,
    pub created_at: DateTime<Utc>,
}

/// Which object-backed content table a [`FileContent`] lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    #[serde(rename = "photos")]
    Photo,
    #[serde(rename = "audios")]
    Audio,
    #[serde(rename = "doodles")]
    Doodle,
    #[serde(rename = "misc-files")]
    MiscFile,
}

impl FileKind {
    pub const ALL: [FileKind; 4] = [Self::Photo, Self::Audio, Self::Doodle, Self::MiscFile];

    pub fn table(&self) -> &'static str {
        match self {
            Self::Photo => "photos",
            Self::Audio => "audios",
            Self::Doodle => "doodles",
            Self::MiscFile => "misc_files",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Audio => "audio",
            Self::Doodle => "doodle",
            Self::MiscFile => "misc file",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capsule() -> Capsule {
        Capsule {
            id: 1,
            code: "ABCDEFGHJK".into(),
            created_at: Utc::now(),
            public: false,
            capsule_owner_id: 10,
            capsule_member1_id: Some(11),
            capsule_member2_id: None,
            capsule_member3_id: Some(13),
            vessel: "jar".into(),
            name: None,
            date_to_open: None,
            email_sent: false,
            sealed: CapsuleState::Unsealed,
        }
    }

    #[test]
    fn participants_and_slots() {
        let c = capsule();
        assert!(c.is_owner(10));
        assert!(c.is_participant(10));
        assert!(c.is_participant(13));
        assert!(!c.is_participant(12));
        assert_eq!(c.open_slot(), Some(1));
        assert!(!c.can_view(12));
    }

    #[test]
    fn full_capsule_has_no_slot() {
        let mut c = capsule();
        c.capsule_member2_id = Some(12);
        assert_eq!(c.open_slot(), None);
    }

    #[test]
    fn state_parses_its_own_names() {
        for state in [CapsuleState::Unsealed, CapsuleState::Sealed, CapsuleState::Opened] {
            assert_eq!(state.as_str().parse::<CapsuleState>().unwrap(), state);
        }
        let err = "buried".parse::<CapsuleState>().unwrap_err();
        assert_eq!(err.to_string(), "unknown capsule state 'buried'");
    }

    #[test]
    fn capsule_serializes_camel_case() {
        let json = serde_json::to_value(capsule()).unwrap();
        assert_eq!(json["capsuleOwnerId"], 10);
        assert_eq!(json["capsuleMember2Id"], serde_json::Value::Null);
        assert_eq!(json["sealed"], "unsealed");
    }

    #[test]
    fn file_kind_path_names() {
        let kind: FileKind = serde_json::from_str("\"misc-files\"").unwrap();
        assert_eq!(kind, FileKind::MiscFile);
        assert_eq!(kind.table(), "misc_files");
    }
}
