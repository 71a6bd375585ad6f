use capsule_types::models::{CapsuleState, FileContent, FileKind, QuestionAnswer, Song, Writing};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::capsules::{require_participant, require_viewer};
use crate::stores::{FileContentStore, QuestionAnswerStore, SongStore, WritingStore};
use crate::{Database, Result, StoreError};

// -- Access rules --

/// Content of a sealed capsule stays hidden until it is opened.
fn require_readable(conn: &Connection, capsule_id: i64, user_id: i64) -> Result<()> {
    let capsule = require_viewer(conn, capsule_id, user_id)?;
    if capsule.sealed == CapsuleState::Sealed {
        return Err(StoreError::Forbidden("capsule is sealed".into()));
    }
    Ok(())
}

fn require_contributor(conn: &Connection, capsule_id: i64, user_id: i64) -> Result<()> {
    let capsule = require_participant(conn, capsule_id, user_id)?;
    if capsule.sealed != CapsuleState::Unsealed {
        return Err(StoreError::Conflict(format!(
            "capsule is {}; content can no longer change",
            capsule.sealed
        )));
    }
    Ok(())
}

/// Checks for update/delete: the caller participates in an unsealed capsule
/// and owns the row.
fn require_item_owner(
    conn: &Connection,
    table: &str,
    label: &str,
    capsule_id: i64,
    item_id: i64,
    user_id: i64,
) -> Result<()> {
    let capsule = require_participant(conn, capsule_id, user_id)?;

    let owner: Option<i64> = conn
        .query_row(
            &format!("SELECT user_id FROM {table} WHERE id = ?1 AND capsule_id = ?2"),
            [item_id, capsule_id],
            |row| row.get(0),
        )
        .optional()?;
    match owner {
        None => return Err(StoreError::NotFound(format!("{label} not found"))),
        Some(owner) if owner != user_id => {
            return Err(StoreError::Forbidden(format!("{label} belongs to another user")));
        }
        Some(_) => {}
    }

    if capsule.sealed != CapsuleState::Unsealed {
        return Err(StoreError::Conflict(format!(
            "capsule is {}; content can no longer change",
            capsule.sealed
        )));
    }
    Ok(())
}

fn delete_owned(conn: &Connection, table: &str, capsule_id: i64, item_id: i64, user_id: i64) -> Result<()> {
    conn.execute(
        &format!("DELETE FROM {table} WHERE id = ?1 AND capsule_id = ?2 AND user_id = ?3"),
        [item_id, capsule_id, user_id],
    )?;
    Ok(())
}

fn list<T>(
    conn: &Connection,
    sql: &str,
    capsule_id: i64,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([capsule_id], map)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// -- Songs --

impl SongStore for Database {
    fn get_songs(&self, user_id: i64, capsule_id: i64) -> Result<Vec<Song>> {
        self.with_conn(|conn| {
            require_readable(conn, capsule_id, user_id)?;
            list(
                conn,
                "SELECT id, user_id, capsule_id, spotify_id, name, artist_name, album_art_url, created_at
                 FROM songs WHERE capsule_id = ?1 ORDER BY id",
                capsule_id,
                |row| {
                    Ok(Song {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        capsule_id: row.get(2)?,
                        spotify_id: row.get(3)?,
                        name: row.get(4)?,
                        artist_name: row.get(5)?,
                        album_art_url: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                },
            )
        })
    }

    fn create_song(
        &self,
        user_id: i64,
        capsule_id: i64,
        spotify_id: &str,
        name: &str,
        artist_name: &str,
        album_art_url: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            require_contributor(conn, capsule_id, user_id)?;
            conn.execute(
                "INSERT INTO songs (user_id, capsule_id, spotify_id, name, artist_name, album_art_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    user_id,
                    capsule_id,
                    spotify_id,
                    name,
                    artist_name,
                    album_art_url,
                    Utc::now()
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn delete_song(&self, user_id: i64, capsule_id: i64, song_id: i64) -> Result<()> {
        self.with_conn(|conn| {
            require_item_owner(conn, "songs", "song", capsule_id, song_id, user_id)?;
            delete_owned(conn, "songs", capsule_id, song_id, user_id)
        })
    }
}

// -- Question / answer --

impl QuestionAnswerStore for Database {
    fn get_question_answers(&self, user_id: i64, capsule_id: i64) -> Result<Vec<QuestionAnswer>> {
        self.with_conn(|conn| {
            require_readable(conn, capsule_id, user_id)?;
            list(
                conn,
                "SELECT id, user_id, capsule_id, prompt, answer, created_at
                 FROM question_answers WHERE capsule_id = ?1 ORDER BY id",
                capsule_id,
                |row| {
                    Ok(QuestionAnswer {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        capsule_id: row.get(2)?,
                        prompt: row.get(3)?,
                        answer: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
        })
    }

    fn create_question_answer(
        &self,
        user_id: i64,
        capsule_id: i64,
        prompt: &str,
        answer: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            require_contributor(conn, capsule_id, user_id)?;
            conn.execute(
                "INSERT INTO question_answers (user_id, capsule_id, prompt, answer, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![user_id, capsule_id, prompt, answer, Utc::now()],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn update_question_answer(
        &self,
        user_id: i64,
        capsule_id: i64,
        question_answer_id: i64,
        prompt: &str,
        answer: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            require_item_owner(
                conn,
                "question_answers",
                "question answer",
                capsule_id,
                question_answer_id,
                user_id,
            )?;
            conn.execute(
                "UPDATE question_answers SET prompt = ?1, answer = ?2
                 WHERE id = ?3 AND capsule_id = ?4 AND user_id = ?5",
                rusqlite::params![prompt, answer, question_answer_id, capsule_id, user_id],
            )?;
            Ok(())
        })
    }

    fn delete_question_answer(
        &self,
        user_id: i64,
        capsule_id: i64,
        question_answer_id: i64,
    ) -> Result<()> {
        self.with_conn(|conn| {
            require_item_owner(
                conn,
                "question_answers",
                "question answer",
                capsule_id,
                question_answer_id,
                user_id,
            )?;
            delete_owned(conn, "question_answers", capsule_id, question_answer_id, user_id)
        })
    }
}

// -- Writings --

impl WritingStore for Database {
    fn get_writings(&self, user_id: i64, capsule_id: i64) -> Result<Vec<Writing>> {
        self.with_conn(|conn| {
            require_readable(conn, capsule_id, user_id)?;
            list(
                conn,
                "SELECT id, user_id, capsule_id, writing, created_at
                 FROM writings WHERE capsule_id = ?1 ORDER BY id",
                capsule_id,
                |row| {
                    Ok(Writing {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        capsule_id: row.get(2)?,
                        writing: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )
        })
    }

    fn create_writing(&self, user_id: i64, capsule_id: i64, writing: &str) -> Result<i64> {
        self.with_conn(|conn| {
            require_contributor(conn, capsule_id, user_id)?;
            conn.execute(
                "INSERT INTO writings (user_id, capsule_id, writing, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![user_id, capsule_id, writing, Utc::now()],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn update_writing(
        &self,
        user_id: i64,
        capsule_id: i64,
        writing_id: i64,
        writing: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            require_item_owner(conn, "writings", "writing", capsule_id, writing_id, user_id)?;
            conn.execute(
                "UPDATE writings SET writing = ?1 WHERE id = ?2 AND capsule_id = ?3 AND user_id = ?4",
                rusqlite::params![writing, writing_id, capsule_id, user_id],
            )?;
            Ok(())
        })
    }

    fn delete_writing(&self, user_id: i64, capsule_id: i64, writing_id: i64) -> Result<()> {
        self.with_conn(|conn| {
            require_item_owner(conn, "writings", "writing", capsule_id, writing_id, user_id)?;
            delete_owned(conn, "writings", capsule_id, writing_id, user_id)
        })
    }
}

// -- Object-backed content --

impl FileContentStore for Database {
    fn get_files(&self, kind: FileKind, user_id: i64, capsule_id: i64) -> Result<Vec<FileContent>> {
        self.with_conn(|conn| {
            require_readable(conn, capsule_id, user_id)?;
            list(
                conn,
                &format!(
                    "SELECT id, user_id, capsule_id, object_name, file_url, created_at
                     FROM {} WHERE capsule_id = ?1 ORDER BY id",
                    kind.table()
                ),
                capsule_id,
                |row| {
                    Ok(FileContent {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        capsule_id: row.get(2)?,
                        object_name: row.get(3)?,
                        file_url: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
        })
    }

    fn create_file(
        &self,
        kind: FileKind,
        user_id: i64,
        capsule_id: i64,
        object_name: &str,
        file_url: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            require_contributor(conn, capsule_id, user_id)?;
            conn.execute(
                &format!(
                    "INSERT INTO {} (user_id, capsule_id, object_name, file_url, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    kind.table()
                ),
                rusqlite::params![user_id, capsule_id, object_name, file_url, Utc::now()],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn delete_file(
        &self,
        kind: FileKind,
        user_id: i64,
        capsule_id: i64,
        item_id: i64,
    ) -> Result<String> {
        let table = kind.table();
        self.with_conn(|conn| {
            require_item_owner(conn, table, kind.label(), capsule_id, item_id, user_id)?;
            let object_name: String = conn.query_row(
                &format!("SELECT object_name FROM {table} WHERE id = ?1"),
                [item_id],
                |row| row.get(0),
            )?;
            delete_owned(conn, table, capsule_id, item_id, user_id)?;
            Ok(object_name)
        })
    }

    fn is_object_referenced(&self, object_name: &str) -> Result<bool> {
        self.with_conn(|conn| {
            for kind in FileKind::ALL {
                let found = conn
                    .query_row(
                        &format!("SELECT 1 FROM {} WHERE object_name = ?1 LIMIT 1", kind.table()),
                        [object_name],
                        |_| Ok(()),
                    )
                    .optional()?;
                if found.is_some() {
                    return Ok(true);
                }
            }
            Ok(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::{CapsuleStore, UserStore};
    use chrono::Duration;

    struct Fixture {
        db: Database,
        owner: i64,
        member: i64,
        stranger: i64,
        capsule: i64,
    }

    fn fixture() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let owner = db.create_user("Owner", "O", "owner@example.com", "h").unwrap();
        let member = db.create_user("Member", "M", "member@example.com", "h").unwrap();
        let stranger = db.create_user("Stranger", "S", "stranger@example.com", "h").unwrap();
        let capsule = db.create_capsule(owner, "jar", false).unwrap();
        let code = db.get_capsule(owner, capsule).unwrap().code;
        db.join_capsule(member, &code).unwrap();
        Fixture { db, owner, member, stranger, capsule }
    }

    fn is_forbidden<T: std::fmt::Debug>(r: Result<T>) -> bool {
        matches!(r, Err(StoreError::Forbidden(_)))
    }

    #[test]
    fn participants_add_and_list_songs() {
        let f = fixture();
        f.db.create_song(f.owner, f.capsule, "sp1", "One", "Artist", "http://art").unwrap();
        f.db.create_song(f.member, f.capsule, "sp2", "Two", "Artist", "").unwrap();

        let songs = f.db.get_songs(f.member, f.capsule).unwrap();
        assert_eq!(songs.len(), 2);
        assert_eq!(songs[0].name, "One");
        assert_eq!(songs[1].user_id, f.member);
    }

    #[test]
    fn stranger_cannot_touch_content() {
        let f = fixture();
        let qa = f.db.create_question_answer(f.owner, f.capsule, "Q?", "A").unwrap();
        let writing = f.db.create_writing(f.owner, f.capsule, "hello").unwrap();

        assert!(is_forbidden(f.db.create_song(f.stranger, f.capsule, "s", "n", "a", "")));
        assert!(is_forbidden(f.db.create_writing(f.stranger, f.capsule, "x")));
        assert!(is_forbidden(f.db.update_question_answer(f.stranger, f.capsule, qa, "Q", "B")));
        assert!(is_forbidden(f.db.delete_question_answer(f.stranger, f.capsule, qa)));
        assert!(is_forbidden(f.db.update_writing(f.stranger, f.capsule, writing, "y")));
        assert!(is_forbidden(f.db.delete_writing(f.stranger, f.capsule, writing)));
        assert!(is_forbidden(f.db.create_file(FileKind::Photo, f.stranger, f.capsule, "o", "u")));
        assert!(is_forbidden(f.db.get_writings(f.stranger, f.capsule)));
    }

    #[test]
    fn only_author_updates_or_deletes() {
        let f = fixture();
        let writing = f.db.create_writing(f.owner, f.capsule, "mine").unwrap();

        assert!(is_forbidden(f.db.update_writing(f.member, f.capsule, writing, "theirs")));
        assert!(is_forbidden(f.db.delete_writing(f.member, f.capsule, writing)));

        f.db.update_writing(f.owner, f.capsule, writing, "edited").unwrap();
        assert_eq!(f.db.get_writings(f.member, f.capsule).unwrap()[0].writing, "edited");

        f.db.delete_writing(f.owner, f.capsule, writing).unwrap();
        assert!(f.db.get_writings(f.owner, f.capsule).unwrap().is_empty());
        assert!(matches!(
            f.db.delete_writing(f.owner, f.capsule, writing),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn question_answers_update_in_place() {
        let f = fixture();
        let id = f.db.create_question_answer(f.member, f.capsule, "Best day?", "Today").unwrap();
        f.db.update_question_answer(f.member, f.capsule, id, "Best day?", "Tomorrow").unwrap();

        let qas = f.db.get_question_answers(f.owner, f.capsule).unwrap();
        assert_eq!(qas.len(), 1);
        assert_eq!(qas[0].answer, "Tomorrow");
    }

    #[test]
    fn item_must_belong_to_capsule() {
        let f = fixture();
        let other = f.db.create_capsule(f.owner, "box", false).unwrap();
        let song = f.db.create_song(f.owner, f.capsule, "s", "n", "a", "").unwrap();

        assert!(matches!(
            f.db.delete_song(f.owner, other, song),
            Err(StoreError::NotFound(_))
        ));
        f.db.delete_song(f.owner, f.capsule, song).unwrap();
    }

    #[test]
    fn file_delete_returns_object_name() {
        let f = fixture();
        let id = f
            .db
            .create_file(FileKind::Doodle, f.member, f.capsule, "user-2/x.png", "http://x")
            .unwrap();
        assert_eq!(f.db.get_files(FileKind::Doodle, f.owner, f.capsule).unwrap().len(), 1);
        assert!(f.db.get_files(FileKind::Photo, f.owner, f.capsule).unwrap().is_empty());

        let name = f.db.delete_file(FileKind::Doodle, f.member, f.capsule, id).unwrap();
        assert_eq!(name, "user-2/x.png");
        assert!(f.db.get_files(FileKind::Doodle, f.owner, f.capsule).unwrap().is_empty());
    }

    #[test]
    fn object_reference_spans_kinds_and_capsules() {
        let f = fixture();
        let other = f.db.create_capsule(f.member, "box", false).unwrap();
        let photo = f
            .db
            .create_file(FileKind::Photo, f.member, f.capsule, "user-2/shared.png", "u")
            .unwrap();
        f.db.create_file(FileKind::MiscFile, f.member, other, "user-2/shared.png", "u")
            .unwrap();

        f.db.delete_file(FileKind::Photo, f.member, f.capsule, photo).unwrap();
        assert!(f.db.is_object_referenced("user-2/shared.png").unwrap());

        f.db.delete_capsule(f.member, other).unwrap();
        assert!(!f.db.is_object_referenced("user-2/shared.png").unwrap());
    }

    #[test]
    fn sealed_capsule_freezes_content() {
        let f = fixture();
        let now = Utc::now();
        let writing = f.db.create_writing(f.member, f.capsule, "before").unwrap();
        let open_at = now + Duration::days(1);
        f.db.seal_capsule(f.owner, f.capsule, open_at, now).unwrap();

        assert!(matches!(
            f.db.create_writing(f.member, f.capsule, "after"),
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            f.db.delete_writing(f.member, f.capsule, writing),
            Err(StoreError::Conflict(_))
        ));
        assert!(is_forbidden(f.db.get_writings(f.member, f.capsule)));

        f.db.open_capsule(f.member, f.capsule, open_at).unwrap();
        assert_eq!(f.db.get_writings(f.member, f.capsule).unwrap().len(), 1);
    }
}
