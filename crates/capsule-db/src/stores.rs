//! Capability traits, one per entity. [`crate::Database`] implements all of
//! them; handlers only ever see the traits.

use capsule_types::models::{Capsule, FileContent, FileKind, QuestionAnswer, Song, Writing};
use chrono::{DateTime, Utc};

use crate::Result;
use crate::models::UserRow;

pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` when the email is already registered.
    fn create_user(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<i64>;
    fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>>;
    fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>>;
    fn update_user(&self, id: i64, first_name: &str, last_name: &str, email: &str) -> Result<()>;
    fn update_user_password(&self, id: i64, password_hash: &str) -> Result<()>;
    /// Leaves capsules and content owned by the user in place.
    fn delete_user(&self, id: i64) -> Result<()>;
}

pub trait CapsuleStore: Send + Sync {
    /// Every capsule the user owns or has joined.
    fn get_capsules(&self, user_id: i64) -> Result<Vec<Capsule>>;
    /// Visible to participants, or to anyone when the capsule is public.
    fn get_capsule(&self, user_id: i64, capsule_id: i64) -> Result<Capsule>;
    fn create_capsule(&self, user_id: i64, vessel: &str, public: bool) -> Result<i64>;
    /// Returns the id of the joined capsule.
    fn join_capsule(&self, user_id: i64, code: &str) -> Result<i64>;
    fn name_capsule(&self, user_id: i64, capsule_id: i64, name: &str) -> Result<()>;
    fn seal_capsule(
        &self,
        user_id: i64,
        capsule_id: i64,
        date_to_open: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()>;
    fn open_capsule(&self, user_id: i64, capsule_id: i64, now: DateTime<Utc>) -> Result<()>;
    /// Removes the capsule and all its content. Returns the object names the
    /// deleted rows referenced, sorted and without duplicates.
    fn delete_capsule(&self, user_id: i64, capsule_id: i64) -> Result<Vec<String>>;
}

pub trait SongStore: Send + Sync {
    fn get_songs(&self, user_id: i64, capsule_id: i64) -> Result<Vec<Song>>;
    fn create_song(
        &self,
        user_id: i64,
        capsule_id: i64,
        spotify_id: &str,
        name: &str,
        artist_name: &str,
        album_art_url: &str,
    ) -> Result<i64>;
    fn delete_song(&self, user_id: i64, capsule_id: i64, song_id: i64) -> Result<()>;
}

pub trait QuestionAnswerStore: Send + Sync {
    fn get_question_answers(&self, user_id: i64, capsule_id: i64) -> Result<Vec<QuestionAnswer>>;
    fn create_question_answer(
        &self,
        user_id: i64,
        capsule_id: i64,
        prompt: &str,
        answer: &str,
    ) -> Result<i64>;
    fn update_question_answer(
        &self,
        user_id: i64,
        capsule_id: i64,
        question_answer_id: i64,
        prompt: &str,
        answer: &str,
    ) -> Result<()>;
    fn delete_question_answer(
        &self,
        user_id: i64,
        capsule_id: i64,
        question_answer_id: i64,
    ) -> Result<()>;
}

pub trait WritingStore: Send + Sync {
    fn get_writings(&self, user_id: i64, capsule_id: i64) -> Result<Vec<Writing>>;
    fn create_writing(&self, user_id: i64, capsule_id: i64, writing: &str) -> Result<i64>;
    fn update_writing(
        &self,
        user_id: i64,
        capsule_id: i64,
        writing_id: i64,
        writing: &str,
    ) -> Result<()>;
    fn delete_writing(&self, user_id: i64, capsule_id: i64, writing_id: i64) -> Result<()>;
}

/// Photos, audio, doodles and misc files.
pub trait FileContentStore: Send + Sync {
    fn get_files(&self, kind: FileKind, user_id: i64, capsule_id: i64) -> Result<Vec<FileContent>>;
    fn create_file(
        &self,
        kind: FileKind,
        user_id: i64,
        capsule_id: i64,
        object_name: &str,
        file_url: &str,
    ) -> Result<i64>;
    /// Returns the object name the deleted row pointed at.
    fn delete_file(
        &self,
        kind: FileKind,
        user_id: i64,
        capsule_id: i64,
        item_id: i64,
    ) -> Result<String>;
    /// Whether any row of any file kind still points at `object_name`.
    fn is_object_referenced(&self, object_name: &str) -> Result<bool>;
}
