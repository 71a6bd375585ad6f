use std::collections::BTreeSet;

use capsule_types::models::{
    CAPSULE_CODE_LEN, Capsule, CapsuleState, FileKind, MAX_MEMBERS,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use rusqlite::{Connection, OptionalExtension, Row, types::Type};
use tracing::{info, warn};

use crate::stores::CapsuleStore;
use crate::{Database, Result, StoreError, is_unique_violation};

const CAPSULE_COLUMNS: &str = "id, code, created_at, public, owner_id, member1_id, member2_id, \
     member3_id, vessel, name, date_to_open, email_sent, state";

const MEMBER_COLUMNS: [&str; MAX_MEMBERS] = ["member1_id", "member2_id", "member3_id"];

/// Uppercase letters and digits minus the easily confused 0/O and 1/I.
const CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

const MAX_CODE_ATTEMPTS: usize = 5;

/// Tables holding plain content rows (no backing object).
const TEXT_CONTENT_TABLES: [&str; 3] = ["songs", "question_answers", "writings"];

pub fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CAPSULE_CODE_LEN)
        .map(|_| CODE_CHARSET[rng.random_range(0..CODE_CHARSET.len())] as char)
        .collect()
}

impl CapsuleStore for Database {
    fn get_capsules(&self, user_id: i64) -> Result<Vec<Capsule>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CAPSULE_COLUMNS} FROM capsules
                 WHERE owner_id = ?1 OR member1_id = ?1 OR member2_id = ?1 OR member3_id = ?1
                 ORDER BY created_at DESC, id DESC"
            ))?;
            let rows = stmt
                .query_map([user_id], map_capsule)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn get_capsule(&self, user_id: i64, capsule_id: i64) -> Result<Capsule> {
        self.with_conn(|conn| require_viewer(conn, capsule_id, user_id))
    }

    fn create_capsule(&self, user_id: i64, vessel: &str, public: bool) -> Result<i64> {
        self.with_conn(|conn| create_capsule_with(conn, user_id, vessel, public, &mut generate_code))
    }

    fn join_capsule(&self, user_id: i64, code: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let capsule = query_capsule(conn, "code = ?1", code)?
                .ok_or_else(|| StoreError::NotFound("no capsule with that code".into()))?;

            if capsule.sealed != CapsuleState::Unsealed {
                return Err(StoreError::Conflict("capsule is already sealed".into()));
            }
            if capsule.is_participant(user_id) {
                return Err(StoreError::Conflict("already a member of this capsule".into()));
            }
            let slot = capsule
                .open_slot()
                .ok_or_else(|| StoreError::Conflict("capsule is full".into()))?;

            let column = MEMBER_COLUMNS[slot];
            let changed = conn.execute(
                &format!(
                    "UPDATE capsules SET {column} = ?1
                     WHERE id = ?2 AND {column} IS NULL AND state = 'unsealed'"
                ),
                rusqlite::params![user_id, capsule.id],
            )?;
            if changed == 0 {
                return Err(StoreError::Conflict("capsule changed while joining".into()));
            }

            info!("User {} joined capsule {}", user_id, capsule.id);
            Ok(capsule.id)
        })
    }

    fn name_capsule(&self, user_id: i64, capsule_id: i64, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            let capsule = require_owner(conn, capsule_id, user_id)?;
            if capsule.sealed != CapsuleState::Unsealed {
                return Err(StoreError::Conflict("capsule is already sealed".into()));
            }
            conn.execute(
                "UPDATE capsules SET name = ?1 WHERE id = ?2",
                rusqlite::params![name, capsule_id],
            )?;
            Ok(())
        })
    }

    fn seal_capsule(
        &self,
        user_id: i64,
        capsule_id: i64,
        date_to_open: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            let capsule = require_owner(conn, capsule_id, user_id)?;
            if capsule.sealed != CapsuleState::Unsealed {
                return Err(StoreError::Conflict(format!("capsule is already {}", capsule.sealed)));
            }
            if date_to_open <= now {
                return Err(StoreError::Invalid("dateToOpen must be in the future".into()));
            }

            let changed = conn.execute(
                "UPDATE capsules SET state = 'sealed', date_to_open = ?1
                 WHERE id = ?2 AND state = 'unsealed'",
                rusqlite::params![date_to_open, capsule_id],
            )?;
            if changed == 0 {
                return Err(StoreError::Conflict("capsule is already sealed".into()));
            }

            info!("Capsule {} sealed until {}", capsule_id, date_to_open);
            Ok(())
        })
    }

    fn open_capsule(&self, user_id: i64, capsule_id: i64, now: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            let capsule = require_participant(conn, capsule_id, user_id)?;
            match capsule.sealed {
                CapsuleState::Opened => {
                    return Err(StoreError::Conflict("capsule is already opened".into()));
                }
                CapsuleState::Unsealed => {
                    return Err(StoreError::Conflict("capsule has not been sealed".into()));
                }
                CapsuleState::Sealed => {}
            }
            if let Some(date) = capsule.date_to_open {
                if now < date {
                    return Err(StoreError::Conflict(format!(
                        "capsule cannot be opened before {}",
                        date.to_rfc3339()
                    )));
                }
            }

            let changed = conn.execute(
                "UPDATE capsules SET state = 'opened' WHERE id = ?1 AND state = 'sealed'",
                [capsule_id],
            )?;
            if changed == 0 {
                return Err(StoreError::Conflict("capsule is already opened".into()));
            }

            info!("Capsule {} opened by user {}", capsule_id, user_id);
            Ok(())
        })
    }

    fn delete_capsule(&self, user_id: i64, capsule_id: i64) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            require_owner(conn, capsule_id, user_id)?;

            // Each statement commits on its own. A failure part-way through
            // leaves the remaining rows behind.
            let mut object_names = BTreeSet::new();
            for kind in FileKind::ALL {
                let table = kind.table();
                let mut stmt =
                    conn.prepare(&format!("SELECT object_name FROM {table} WHERE capsule_id = ?1"))?;
                let names = stmt
                    .query_map([capsule_id], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                object_names.extend(names);
                conn.execute(&format!("DELETE FROM {table} WHERE capsule_id = ?1"), [capsule_id])?;
            }
            for table in TEXT_CONTENT_TABLES {
                conn.execute(&format!("DELETE FROM {table} WHERE capsule_id = ?1"), [capsule_id])?;
            }
            conn.execute("DELETE FROM capsules WHERE id = ?1", [capsule_id])?;

            info!(
                "Capsule {} deleted by user {} ({} objects to remove)",
                capsule_id,
                user_id,
                object_names.len()
            );
            Ok(object_names.into_iter().collect())
        })
    }
}

/// Inserts a capsule, drawing join codes from `next_code` until one is not
/// already taken or the attempts run out.
fn create_capsule_with(
    conn: &Connection,
    user_id: i64,
    vessel: &str,
    public: bool,
    next_code: &mut impl FnMut() -> String,
) -> Result<i64> {
    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let code = next_code();
        let inserted = conn.execute(
            "INSERT INTO capsules (code, owner_id, vessel, public, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![code, user_id, vessel, public, Utc::now()],
        );
        match inserted {
            Ok(_) => {
                let id = conn.last_insert_rowid();
                info!("Capsule {} created by user {}", id, user_id);
                return Ok(id);
            }
            Err(e) if is_unique_violation(&e) => {
                warn!("Join code collision on attempt {}", attempt);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(StoreError::Conflict(
        "could not generate a unique capsule code".into(),
    ))
}

// -- Authorization helpers shared with the content stores --

pub(crate) fn require_capsule(conn: &Connection, capsule_id: i64) -> Result<Capsule> {
    query_capsule(conn, "id = ?1", capsule_id)?
        .ok_or_else(|| StoreError::NotFound("capsule not found".into()))
}

pub(crate) fn require_viewer(conn: &Connection, capsule_id: i64, user_id: i64) -> Result<Capsule> {
    let capsule = require_capsule(conn, capsule_id)?;
    if !capsule.can_view(user_id) {
        return Err(StoreError::Forbidden("not a member of this capsule".into()));
    }
    Ok(capsule)
}

pub(crate) fn require_participant(
    conn: &Connection,
    capsule_id: i64,
    user_id: i64,
) -> Result<Capsule> {
    let capsule = require_capsule(conn, capsule_id)?;
    if !capsule.is_participant(user_id) {
        return Err(StoreError::Forbidden("not a member of this capsule".into()));
    }
    Ok(capsule)
}

fn require_owner(conn: &Connection, capsule_id: i64, user_id: i64) -> Result<Capsule> {
    let capsule = require_capsule(conn, capsule_id)?;
    if !capsule.is_owner(user_id) {
        return Err(StoreError::Forbidden("only the capsule owner can do that".into()));
    }
    Ok(capsule)
}

fn query_capsule<P: rusqlite::ToSql>(
    conn: &Connection,
    filter: &str,
    value: P,
) -> Result<Option<Capsule>> {
    let mut stmt = conn.prepare(&format!("SELECT {CAPSULE_COLUMNS} FROM capsules WHERE {filter}"))?;
    let row = stmt.query_row([value], map_capsule).optional()?;
    Ok(row)
}

fn map_capsule(row: &Row<'_>) -> rusqlite::Result<Capsule> {
    let state: String = row.get(12)?;
    let sealed = state
        .parse::<CapsuleState>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(12, Type::Text, Box::new(e)))?;

    Ok(Capsule {
        id: row.get(0)?,
        code: row.get(1)?,
        created_at: row.get(2)?,
        public: row.get(3)?,
        capsule_owner_id: row.get(4)?,
        capsule_member1_id: row.get(5)?,
        capsule_member2_id: row.get(6)?,
        capsule_member3_id: row.get(7)?,
        vessel: row.get(8)?,
        name: row.get(9)?,
        date_to_open: row.get(10)?,
        email_sent: row.get(11)?,
        sealed,
    })
}
