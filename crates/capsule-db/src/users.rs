use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::models::UserRow;
use crate::stores::UserStore;
use crate::{Database, Result, StoreError, is_unique_violation};

const USER_COLUMNS: &str = "id, first_name, last_name, email, password, created_at";

impl UserStore for Database {
    fn create_user(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (first_name, last_name, email, password, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![first_name, last_name, email, password_hash, Utc::now()],
            )
            .map_err(email_conflict)?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1", email))
    }

    fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", id))
    }

    fn update_user(&self, id: i64, first_name: &str, last_name: &str, email: &str) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE users SET first_name = ?1, last_name = ?2, email = ?3 WHERE id = ?4",
                    rusqlite::params![first_name, last_name, email, id],
                )
                .map_err(email_conflict)?;
            if changed == 0 {
                return Err(StoreError::NotFound("user not found".into()));
            }
            Ok(())
        })
    }

    fn update_user_password(&self, id: i64, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET password = ?1 WHERE id = ?2",
                rusqlite::params![password_hash, id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound("user not found".into()));
            }
            Ok(())
        })
    }

    fn delete_user(&self, id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            Ok(())
        })
    }
}

fn email_conflict(err: rusqlite::Error) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::Conflict("email is already registered".into())
    } else {
        err.into()
    }
}

fn query_user<P: rusqlite::ToSql>(
    conn: &Connection,
    filter: &str,
    value: P,
) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE {filter}"))?;
    let row = stmt.query_row([value], map_user).optional()?;
    Ok(row)
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        password: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn create_then_lookup_by_email() {
        let db = db();
        let id = db.create_user("Ada", "Lovelace", "ada@example.com", "hash").unwrap();

        let user = db.get_user_by_email("ada@example.com").unwrap().unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.first_name, "Ada");
        assert_eq!(user.password, "hash");

        let by_id = db.get_user_by_id(id).unwrap().unwrap();
        assert_eq!(by_id.email, "ada@example.com");
    }

    #[test]
    fn duplicate_email_is_a_conflict() {
        let db = db();
        db.create_user("Ada", "Lovelace", "ada@example.com", "hash").unwrap();
        let err = db.create_user("Other", "Person", "ada@example.com", "hash2").unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn unknown_user_is_none() {
        let db = db();
        assert!(db.get_user_by_email("nobody@example.com").unwrap().is_none());
        assert!(db.get_user_by_id(42).unwrap().is_none());
    }

    #[test]
    fn update_profile_and_password() {
        let db = db();
        let id = db.create_user("Ada", "Lovelace", "ada@example.com", "hash").unwrap();
        let other = db.create_user("Bob", "B", "bob@example.com", "hash").unwrap();

        db.update_user(id, "Augusta", "King", "augusta@example.com").unwrap();
        db.update_user_password(id, "new-hash").unwrap();

        let user = db.get_user_by_id(id).unwrap().unwrap();
        assert_eq!(user.first_name, "Augusta");
        assert_eq!(user.email, "augusta@example.com");
        assert_eq!(user.password, "new-hash");

        let err = db.update_user(other, "Bob", "B", "augusta@example.com").unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn delete_user_removes_row() {
        let db = db();
        let id = db.create_user("Ada", "Lovelace", "ada@example.com", "hash").unwrap();
        db.delete_user(id).unwrap();
        assert!(db.get_user_by_id(id).unwrap().is_none());
    }
}
