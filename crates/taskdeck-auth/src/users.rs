use chrono::{DateTime, Utc};
use rusqlite::Row;
use secrecy::SecretString;

use taskdeck_core::UserId;
use taskdeck_store::{Database, StoreError};

use crate::credentials;

/// A stored account. Credential material never leaves this crate.
#[derive(Clone, Debug)]
pub struct UserRecord {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
    pub password_salt: String,
    pub email_verified: bool,
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Repository for user accounts.
pub struct UserRepo {
    db: Database,
}

impl UserRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create an account. Emails are stored lowercased; duplicates
    /// conflict.
    pub fn register(&self, email: &str, password: &SecretString) -> Result<UserRecord, StoreError> {
        let email = email.trim().to_lowercase();
        let id = UserId::new();
        let salt = credentials::generate_salt();
        let hash = credentials::hash_password(password, &salt);
        let now = Utc::now();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, password_hash, password_salt, email_verified, failed_attempts, locked_until, created_at)
                 VALUES (?1, ?2, ?3, ?4, 0, 0, NULL, ?5)",
                rusqlite::params![id.as_str(), email, hash, salt, now.to_rfc3339()],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StoreError::Conflict(format!("email already registered: {email}"))
                }
                other => StoreError::Database(other.to_string()),
            })?;

            Ok(UserRecord {
                id: id.clone(),
                email: email.clone(),
                password_hash: hash.clone(),
                password_salt: salt.clone(),
                email_verified: false,
                failed_attempts: 0,
                locked_until: None,
                created_at: now,
            })
        })
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let email = email.trim().to_lowercase();
        self.db.with_conn(|conn| {
            let result = conn.query_row(
                "SELECT id, email, password_hash, password_salt, email_verified, failed_attempts, locked_until, created_at
                 FROM users WHERE email = ?1",
                [email],
                row_to_user,
            );
            match result {
                Ok(user) => Ok(Some(user)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(StoreError::Database(e.to_string())),
            }
        })
    }

    /// Bump the failure counter, optionally locking the account.
    pub fn record_failure(
        &self,
        id: &UserId,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET failed_attempts = failed_attempts + 1, locked_until = ?2 WHERE id = ?1",
                rusqlite::params![id.as_str(), locked_until.map(|t| t.to_rfc3339())],
            )?;
            Ok(())
        })
    }

    /// Reset the failure counter and any lock after a successful sign-in.
    pub fn clear_failures(&self, id: &UserId) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET failed_attempts = 0, locked_until = NULL WHERE id = ?1",
                [id.as_str()],
            )?;
            Ok(())
        })
    }

    pub fn mark_verified(&self, id: &UserId) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let rows = conn.execute(
                "UPDATE users SET email_verified = 1 WHERE id = ?1",
                [id.as_str()],
            )?;
            if rows == 0 {
                return Err(StoreError::NotFound(format!("user {id}")));
            }
            Ok(())
        })
    }
}

fn row_to_user(row: &Row<'_>) -> Result<UserRecord, rusqlite::Error> {
    let locked_until: Option<String> = row.get(6)?;
    Ok(UserRecord {
        id: UserId::from_raw(row.get::<_, String>(0)?),
        email: row.get(1)?,
        password_hash: row.get(2)?,
        password_salt: row.get(3)?,
        email_verified: row.get::<_, i64>(4)? != 0,
        failed_attempts: row.get::<_, i64>(5)? as u32,
        locked_until: locked_until.and_then(|t| t.parse::<DateTime<Utc>>().ok()),
        created_at: row
            .get::<_, String>(7)?
            .parse::<DateTime<Utc>>()
            .unwrap_or_else(|_| Utc::now()),
    })
}
