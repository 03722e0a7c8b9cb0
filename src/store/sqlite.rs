use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens a private in-memory database, already initialized.
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.initialize()?;
        Ok(store)
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }

    /// Runs `f` as one atomic mutation: committed when it returns `Ok`,
    /// rolled back otherwise.
    pub fn mutation<T>(&self, f: impl FnOnce(&dyn Store) -> Result<T>) -> Result<T> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&Collections { conn: &tx })?;
        tx.commit()?;
        Ok(value)
    }

    /// Runs `f` against a consistent read snapshot.
    pub fn query<T>(&self, f: impl FnOnce(&dyn Store) -> Result<T>) -> Result<T> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let value = f(&Collections { conn: &tx })?;
        tx.finish()?;
        Ok(value)
    }
}

/// Store handle bound to an open transaction.
struct Collections<'a> {
    conn: &'a Connection,
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

/// Fixed-width UTC timestamps so text comparison orders chronologically.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

const ACCOUNT_COLUMNS: &str =
    "identity_subject, username_lower, username_display, email, image_url, created_at, updated_at";

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        identity_subject: row.get(0)?,
        username_lower: row.get(1)?,
        username_display: row.get(2)?,
        email: row.get(3)?,
        image_url: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        updated_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

const PENDING_COLUMNS: &str = "better_auth_user_id, email, email_lower, username_lower, \
     username_display, image_base64, created_at, expires_at";

fn pending_from_row(row: &Row<'_>) -> rusqlite::Result<PendingIdentity> {
    Ok(PendingIdentity {
        better_auth_user_id: row.get(0)?,
        email: row.get(1)?,
        email_lower: row.get(2)?,
        username_lower: row.get(3)?,
        username_display: row.get(4)?,
        image_base64: row.get(5)?,
        created_at: parse_datetime(&row.get::<_, String>(6)?),
        expires_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

const HOLD_COLUMNS: &str =
    "identity_subject, username_lower, username_display, created_at, release_at";

fn hold_from_row(row: &Row<'_>) -> rusqlite::Result<UsernameHold> {
    Ok(UsernameHold {
        identity_subject: row.get(0)?,
        username_lower: row.get(1)?,
        username_display: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
        release_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

const CRON_COLUMNS: &str = "id, name, handler, schedule, args, created_at, last_run_at";

fn cron_job_from_row(row: &Row<'_>) -> rusqlite::Result<CronJob> {
    Ok(CronJob {
        id: row.get(0)?,
        name: row.get(1)?,
        handler: row.get(2)?,
        schedule: json_column(row, 3)?,
        args: json_column(row, 4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        last_run_at: row.get::<_, Option<String>>(6)?.map(|s| parse_datetime(&s)),
    })
}

impl Collections<'_> {
    fn query_one<T>(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Option<T>> {
        self.conn
            .query_row(sql, params, map)
            .optional()
            .map_err(Error::from)
    }

    fn query_many<T>(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, map)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}

impl Store for Collections<'_> {
    // Account operations

    fn get_account(&self, subject: &str) -> Result<Option<Account>> {
        self.query_one(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE identity_subject = ?1"),
            params![subject],
            account_from_row,
        )
    }

    fn get_account_by_username(&self, username_lower: &str) -> Result<Option<Account>> {
        self.query_one(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username_lower = ?1"),
            params![username_lower],
            account_from_row,
        )
    }

    fn upsert_account_username(
        &self,
        subject: &str,
        username: &NormalizedUsername,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let result = self.conn.execute(
            "INSERT INTO accounts (identity_subject, username_lower, username_display, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(identity_subject) DO UPDATE SET
                 username_lower = excluded.username_lower,
                 username_display = excluded.username_display,
                 updated_at = excluded.updated_at",
            params![subject, username.lower, username.display, format_datetime(&now)],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::AlreadyExists),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn update_account_profile(
        &self,
        subject: &str,
        email: Option<&str>,
        image_url: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE accounts
             SET email = COALESCE(?2, email), image_url = COALESCE(?3, image_url), updated_at = ?4
             WHERE identity_subject = ?1",
            params![subject, email, image_url, format_datetime(&now)],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    // Pending identity operations

    fn get_pending_identity(&self, better_auth_user_id: &str) -> Result<Option<PendingIdentity>> {
        self.query_one(
            &format!("SELECT {PENDING_COLUMNS} FROM pending_identities WHERE better_auth_user_id = ?1"),
            params![better_auth_user_id],
            pending_from_row,
        )
    }

    fn get_pending_identity_by_username(
        &self,
        username_lower: &str,
    ) -> Result<Option<PendingIdentity>> {
        self.query_one(
            &format!("SELECT {PENDING_COLUMNS} FROM pending_identities WHERE username_lower = ?1"),
            params![username_lower],
            pending_from_row,
        )
    }

    fn get_pending_identity_by_email(&self, email_lower: &str) -> Result<Option<PendingIdentity>> {
        self.query_one(
            &format!("SELECT {PENDING_COLUMNS} FROM pending_identities WHERE email_lower = ?1"),
            params![email_lower],
            pending_from_row,
        )
    }

    fn insert_pending_identity(&self, pending: &PendingIdentity) -> Result<()> {
        let result = self.conn.execute(
            &format!("INSERT INTO pending_identities ({PENDING_COLUMNS})
                      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                pending.better_auth_user_id,
                pending.email,
                pending.email_lower,
                pending.username_lower,
                pending.username_display,
                pending.image_base64,
                format_datetime(&pending.created_at),
                format_datetime(&pending.expires_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::AlreadyExists),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn update_pending_identity(&self, pending: &PendingIdentity) -> Result<()> {
        let result = self.conn.execute(
            "UPDATE pending_identities
             SET email = ?2, email_lower = ?3, username_lower = ?4, username_display = ?5,
                 image_base64 = ?6, expires_at = ?7
             WHERE better_auth_user_id = ?1",
            params![
                pending.better_auth_user_id,
                pending.email,
                pending.email_lower,
                pending.username_lower,
                pending.username_display,
                pending.image_base64,
                format_datetime(&pending.expires_at),
            ],
        );

        match result {
            Ok(0) => Err(Error::NotFound),
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::AlreadyExists),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn delete_pending_identity(&self, better_auth_user_id: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM pending_identities WHERE better_auth_user_id = ?1",
            params![better_auth_user_id],
        )?;
        Ok(rows > 0)
    }

    fn list_expired_pending_identities(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PendingIdentity>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query_many(
            &format!(
                "SELECT {PENDING_COLUMNS} FROM pending_identities
                 WHERE expires_at <= ?1 ORDER BY expires_at LIMIT ?2"
            ),
            params![format_datetime(&now), limit],
            pending_from_row,
        )
    }

    // Username hold operations

    fn get_username_hold(&self, username_lower: &str) -> Result<Option<UsernameHold>> {
        self.query_one(
            &format!("SELECT {HOLD_COLUMNS} FROM username_holds WHERE username_lower = ?1"),
            params![username_lower],
            hold_from_row,
        )
    }

    fn upsert_username_hold(&self, hold: &UsernameHold) -> Result<()> {
        self.conn.execute(
            &format!("INSERT OR REPLACE INTO username_holds ({HOLD_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
            params![
                hold.identity_subject,
                hold.username_lower,
                hold.username_display,
                format_datetime(&hold.created_at),
                format_datetime(&hold.release_at),
            ],
        )?;
        Ok(())
    }

    fn delete_username_hold(&self, username_lower: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM username_holds WHERE username_lower = ?1",
            params![username_lower],
        )?;
        Ok(rows > 0)
    }

    fn list_expired_username_holds(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<UsernameHold>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query_many(
            &format!(
                "SELECT {HOLD_COLUMNS} FROM username_holds
                 WHERE release_at <= ?1 ORDER BY release_at LIMIT ?2"
            ),
            params![format_datetime(&now), limit],
            hold_from_row,
        )
    }

    // Cron job operations

    fn get_cron_job(&self, name: &str) -> Result<Option<CronJob>> {
        self.query_one(
            &format!("SELECT {CRON_COLUMNS} FROM cron_jobs WHERE name = ?1"),
            params![name],
            cron_job_from_row,
        )
    }

    fn list_cron_jobs(&self) -> Result<Vec<CronJob>> {
        self.query_many(
            &format!("SELECT {CRON_COLUMNS} FROM cron_jobs ORDER BY name"),
            [],
            cron_job_from_row,
        )
    }

    fn insert_cron_job(&self, job: &CronJob) -> Result<()> {
        let result = self.conn.execute(
            &format!("INSERT INTO cron_jobs ({CRON_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![
                job.id,
                job.name,
                job.handler,
                serde_json::to_string(&job.schedule)?,
                serde_json::to_string(&job.args)?,
                format_datetime(&job.created_at),
                job.last_run_at.as_ref().map(format_datetime),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::AlreadyExists),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn delete_cron_job(&self, name: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM cron_jobs WHERE name = ?1", params![name])?;
        Ok(rows > 0)
    }

    fn mark_cron_job_run(&self, name: &str, at: DateTime<Utc>) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE cron_jobs SET last_run_at = ?1 WHERE name = ?2",
            params![format_datetime(&at), name],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    // Token operations

    fn create_token(&self, token: &Token) -> Result<()> {
        let result = self.conn.execute(
            "INSERT INTO tokens (id, token_hash, token_lookup, is_trusted, subject, email, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                token.id,
                token.token_hash,
                token.token_lookup,
                token.is_trusted,
                token.subject,
                token.email,
                format_datetime(&token.created_at),
                token.expires_at.as_ref().map(format_datetime),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::TokenLookupCollision),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>> {
        self.query_one(
            "SELECT id, token_hash, token_lookup, is_trusted, subject, email, created_at, expires_at, last_used_at
             FROM tokens WHERE token_lookup = ?1",
            params![lookup],
            |row| {
                Ok(Token {
                    id: row.get(0)?,
                    token_hash: row.get(1)?,
                    token_lookup: row.get(2)?,
                    is_trusted: row.get(3)?,
                    subject: row.get(4)?,
                    email: row.get(5)?,
                    created_at: parse_datetime(&row.get::<_, String>(6)?),
                    expires_at: row.get::<_, Option<String>>(7)?.map(|s| parse_datetime(&s)),
                    last_used_at: row.get::<_, Option<String>>(8)?.map(|s| parse_datetime(&s)),
                })
            },
        )
    }

    fn update_token_last_used(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "UPDATE tokens SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&at), id],
        )?;
        Ok(())
    }

    fn has_trusted_token(&self) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tokens WHERE is_trusted = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn username(display: &str) -> NormalizedUsername {
        NormalizedUsername {
            lower: display.to_ascii_lowercase(),
            display: display.to_string(),
        }
    }

    fn pending(id: &str, name: &str, expires_at: DateTime<Utc>) -> PendingIdentity {
        PendingIdentity {
            better_auth_user_id: id.to_string(),
            email: format!("{name}@example.com"),
            email_lower: format!("{}@example.com", name.to_ascii_lowercase()),
            username_lower: name.to_ascii_lowercase(),
            username_display: name.to_string(),
            image_base64: None,
            created_at: expires_at - Duration::hours(24),
            expires_at,
        }
    }

    #[test]
    fn test_initialize_creates_tables() {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();

        let conn = store.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"accounts".to_string()));
        assert!(tables.contains(&"pending_identities".to_string()));
        assert!(tables.contains(&"username_holds".to_string()));
        assert!(tables.contains(&"cron_jobs".to_string()));
        assert!(tables.contains(&"tokens".to_string()));
    }

    #[test]
    fn test_account_upsert_and_rename() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();

        store
            .mutation(|s| s.upsert_account_username("sub-1", &username("Alex"), now))
            .unwrap();
        store
            .mutation(|s| s.upsert_account_username("sub-1", &username("Alexander"), now))
            .unwrap();

        let account = store.query(|s| s.get_account("sub-1")).unwrap().unwrap();
        assert_eq!(account.username_lower, "alexander");
        assert_eq!(account.username_display, "Alexander");
        assert!(store.query(|s| s.get_account_by_username("alex")).unwrap().is_none());
    }

    #[test]
    fn test_account_username_collision() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();

        store
            .mutation(|s| s.upsert_account_username("sub-1", &username("Alex"), now))
            .unwrap();
        let result = store.mutation(|s| s.upsert_account_username("sub-2", &username("ALEX"), now));
        assert!(matches!(result, Err(Error::AlreadyExists)));

        let owner = store.query(|s| s.get_account_by_username("alex")).unwrap().unwrap();
        assert_eq!(owner.identity_subject, "sub-1");
    }

    #[test]
    fn test_failed_mutation_rolls_back() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();

        let result: Result<()> = store.mutation(|s| {
            s.upsert_account_username("sub-1", &username("Alex"), now)?;
            Err(Error::UsernameTaken)
        });
        assert!(result.is_err());
        assert!(store.query(|s| s.get_account("sub-1")).unwrap().is_none());
    }

    #[test]
    fn test_expired_pending_scan_is_ordered_and_bounded() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();

        store
            .mutation(|s| {
                s.insert_pending_identity(&pending("u1", "Later", now - Duration::minutes(1)))?;
                s.insert_pending_identity(&pending("u2", "Earlier", now - Duration::hours(2)))?;
                s.insert_pending_identity(&pending("u3", "Live", now + Duration::hours(2)))
            })
            .unwrap();

        let expired = store
            .query(|s| s.list_expired_pending_identities(now, 10))
            .unwrap();
        let ids: Vec<&str> = expired.iter().map(|p| p.better_auth_user_id.as_str()).collect();
        assert_eq!(ids, vec!["u2", "u1"]);

        let first = store
            .query(|s| s.list_expired_pending_identities(now, 1))
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].better_auth_user_id, "u2");
    }

    #[test]
    fn test_hold_upsert_replaces() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();
        let hold = UsernameHold {
            identity_subject: "sub-1".to_string(),
            username_lower: "alpha".to_string(),
            username_display: "Alpha".to_string(),
            created_at: now,
            release_at: now + Duration::hours(24),
        };

        store.mutation(|s| s.upsert_username_hold(&hold)).unwrap();
        let replacement = UsernameHold {
            identity_subject: "sub-2".to_string(),
            ..hold.clone()
        };
        store.mutation(|s| s.upsert_username_hold(&replacement)).unwrap();

        let fetched = store.query(|s| s.get_username_hold("alpha")).unwrap().unwrap();
        assert_eq!(fetched.identity_subject, "sub-2");
        assert!(store.mutation(|s| s.delete_username_hold("alpha")).unwrap());
        assert!(!store.mutation(|s| s.delete_username_hold("alpha")).unwrap());
    }

    #[test]
    fn test_cron_job_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let job = CronJob {
            id: "job-1".to_string(),
            name: "cleanup".to_string(),
            handler: "cleanup_expired_username_holds".to_string(),
            schedule: Schedule::Cron {
                spec: "30 * * * *".to_string(),
            },
            args: serde_json::json!([]),
            created_at: Utc::now(),
            last_run_at: None,
        };

        store.mutation(|s| s.insert_cron_job(&job)).unwrap();
        let fetched = store.query(|s| s.get_cron_job("cleanup")).unwrap().unwrap();
        assert_eq!(fetched.schedule, job.schedule);
        assert_eq!(fetched.args, serde_json::json!([]));

        let duplicate = store.mutation(|s| s.insert_cron_job(&job));
        assert!(matches!(duplicate, Err(Error::AlreadyExists)));
    }

    #[test]
    fn test_token_lookup_collision() {
        let store = SqliteStore::open_in_memory().unwrap();

        let token1 = Token {
            id: "token-1".to_string(),
            token_hash: "hash1".to_string(),
            token_lookup: "lookup123".to_string(),
            is_trusted: true,
            subject: None,
            email: None,
            created_at: Utc::now(),
            expires_at: None,
            last_used_at: None,
        };
        store.mutation(|s| s.create_token(&token1)).unwrap();

        let token2 = Token {
            id: "token-2".to_string(),
            token_hash: "hash2".to_string(),
            ..token1.clone()
        };

        let result = store.mutation(|s| s.create_token(&token2));
        assert!(matches!(result, Err(Error::TokenLookupCollision)));
        assert!(store.query(|s| s.has_trusted_token()).unwrap());
    }
}
