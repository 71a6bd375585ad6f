use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        // User ids on capsules and content are deliberately not foreign keys:
        // deleting a user leaves whatever they owned in place.
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                first_name  TEXT NOT NULL,
                last_name   TEXT NOT NULL,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE capsules (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                code            TEXT NOT NULL UNIQUE,
                owner_id        INTEGER NOT NULL,
                member1_id      INTEGER,
                member2_id      INTEGER,
                member3_id      INTEGER,
                vessel          TEXT NOT NULL,
                name            TEXT,
                public          INTEGER NOT NULL DEFAULT 0,
                date_to_open    TEXT,
                email_sent      INTEGER NOT NULL DEFAULT 0,
                state           TEXT NOT NULL DEFAULT 'unsealed',
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_capsules_owner ON capsules(owner_id);

            CREATE TABLE songs (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         INTEGER NOT NULL,
                capsule_id      INTEGER NOT NULL REFERENCES capsules(id),
                spotify_id      TEXT NOT NULL,
                name            TEXT NOT NULL,
                artist_name     TEXT NOT NULL,
                album_art_url   TEXT NOT NULL DEFAULT '',
                created_at      TEXT NOT NULL
            );

            CREATE TABLE question_answers (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL,
                capsule_id  INTEGER NOT NULL REFERENCES capsules(id),
                prompt      TEXT NOT NULL,
                answer      TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE writings (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL,
                capsule_id  INTEGER NOT NULL REFERENCES capsules(id),
                writing     TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE photos (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL,
                capsule_id  INTEGER NOT NULL REFERENCES capsules(id),
                object_name TEXT NOT NULL,
                file_url    TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE audios (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL,
                capsule_id  INTEGER NOT NULL REFERENCES capsules(id),
                object_name TEXT NOT NULL,
                file_url    TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE doodles (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL,
                capsule_id  INTEGER NOT NULL REFERENCES capsules(id),
                object_name TEXT NOT NULL,
                file_url    TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE misc_files (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL,
                capsule_id  INTEGER NOT NULL REFERENCES capsules(id),
                object_name TEXT NOT NULL,
                file_url    TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_songs_capsule ON songs(capsule_id);
            CREATE INDEX idx_question_answers_capsule ON question_answers(capsule_id);
            CREATE INDEX idx_writings_capsule ON writings(capsule_id);
            CREATE INDEX idx_photos_capsule ON photos(capsule_id);
            CREATE INDEX idx_audios_capsule ON audios(capsule_id);
            CREATE INDEX idx_doodles_capsule ON doodles(capsule_id);
            CREATE INDEX idx_misc_files_capsule ON misc_files(capsule_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
