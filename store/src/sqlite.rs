//! SQLite implementation of the `SessionStore` trait.
//!
//! The reference transactional backend: compound operations run inside one
//! transaction, conditional writes are plain `UPDATE ... WHERE` statements
//! whose affected-row count answers the compare-and-swap question, and
//! busy/locked failures come back as retryable conflicts.
//!
//! JSON blobs are stored as TEXT; timestamps as epoch milliseconds in
//! INTEGER columns so range comparisons in SQL stay exact.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};

use portcullis_core::domain::entities::{
    KeyKind, KeyValueRecord, PastTokenRecord, SessionRecord, SigningKeyRecord,
};
use portcullis_core::errors::{StoreError, StoreResult};
use portcullis_core::repositories::SessionStore;

/// Schema applied on connect; every statement is idempotent
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS session_info (
        session_handle TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        refresh_token_hash_2 TEXT NOT NULL,
        user_data_in_database TEXT NOT NULL,
        user_data_in_jwt TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        expires_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_session_info_user_id ON session_info (user_id)",
    "CREATE INDEX IF NOT EXISTS idx_session_info_expires_at ON session_info (expires_at)",
    r#"
    CREATE TABLE IF NOT EXISTS past_tokens (
        refresh_token_hash_2 TEXT PRIMARY KEY,
        session_handle TEXT NOT NULL,
        parent_refresh_token_hash_2 TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_past_tokens_session_handle ON past_tokens (session_handle)",
    r#"
    CREATE TABLE IF NOT EXISTS signing_keys (
        key_id TEXT PRIMARY KEY,
        kind TEXT NOT NULL,
        bucket INTEGER NOT NULL,
        algorithm TEXT NOT NULL,
        public_key TEXT NOT NULL,
        private_key TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        UNIQUE (kind, bucket)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS key_value (
        name TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
];

/// SQLite-backed session store.
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Connect to a SQLite database and apply the schema.
    ///
    /// # Arguments
    /// * `url` - A sqlx SQLite URL, e.g. `sqlite://sessions.db?mode=rwc`
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(map_sqlx)?;
        let store = Self { pool };
        store.init_schema().await?;
        info!("sqlite session store ready");
        Ok(store)
    }

    /// Open a private in-memory database, mainly for tests and demos.
    ///
    /// A single connection: every SQLite in-memory database is visible only
    /// to the connection that opened it.
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(map_sqlx)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// The underlying pool, for embedders that run their own queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
        }
        debug!("sqlite schema applied");
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn create_session(&self, session: SessionRecord) -> StoreResult<()> {
        let query = r#"
            INSERT INTO session_info (
                session_handle, user_id, refresh_token_hash_2,
                user_data_in_database, user_data_in_jwt, created_at, expires_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#;

        sqlx::query(query)
            .bind(&session.session_handle)
            .bind(&session.user_id)
            .bind(&session.refresh_token_hash2)
            .bind(session.user_data_in_database.to_string())
            .bind(session.user_data_in_jwt.to_string())
            .bind(session.created_at.timestamp_millis())
            .bind(session.expires_at.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn get_session(&self, session_handle: &str) -> StoreResult<Option<SessionRecord>> {
        let query = r#"
            SELECT session_handle, user_id, refresh_token_hash_2,
                   user_data_in_database, user_data_in_jwt, created_at, expires_at
            FROM session_info
            WHERE session_handle = ?
            LIMIT 1
        "#;

        let row = sqlx::query(query)
            .bind(session_handle)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

        match row {
            Some(row) => Ok(Some(row_to_session(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_session_count(&self) -> StoreResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM session_info")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;
        let count: i64 = column(&row, "count")?;
        Ok(count as u64)
    }

    async fn get_session_handles_for_user(&self, user_id: &str) -> StoreResult<Vec<String>> {
        let query = r#"
            SELECT session_handle
            FROM session_info
            WHERE user_id = ?
            ORDER BY created_at DESC
        "#;

        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

        rows.iter()
            .map(|row| column::<String>(row, "session_handle"))
            .collect()
    }

    async fn update_refresh_token_hash(
        &self,
        session_handle: &str,
        expected_hash2: &str,
        new_hash2: &str,
        new_expires_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let query = r#"
            UPDATE session_info
            SET refresh_token_hash_2 = ?, expires_at = ?
            WHERE session_handle = ? AND refresh_token_hash_2 = ?
        "#;

        let result = sqlx::query(query)
            .bind(new_hash2)
            .bind(new_expires_at.timestamp_millis())
            .bind(session_handle)
            .bind(expected_hash2)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_session_data(
        &self,
        session_handle: &str,
        user_data_in_database: Option<Value>,
        user_data_in_jwt: Option<Value>,
    ) -> StoreResult<bool> {
        let result = match (user_data_in_database, user_data_in_jwt) {
            (None, None) => return self.session_exists(session_handle).await,
            (Some(db_data), None) => {
                sqlx::query(
                    "UPDATE session_info SET user_data_in_database = ? WHERE session_handle = ?",
                )
                .bind(db_data.to_string())
                .bind(session_handle)
                .execute(&self.pool)
                .await
            }
            (None, Some(jwt_data)) => {
                sqlx::query(
                    "UPDATE session_info SET user_data_in_jwt = ? WHERE session_handle = ?",
                )
                .bind(jwt_data.to_string())
                .bind(session_handle)
                .execute(&self.pool)
                .await
            }
            (Some(db_data), Some(jwt_data)) => {
                sqlx::query(
                    r#"
                    UPDATE session_info
                    SET user_data_in_database = ?, user_data_in_jwt = ?
                    WHERE session_handle = ?
                    "#,
                )
                .bind(db_data.to_string())
                .bind(jwt_data.to_string())
                .bind(session_handle)
                .execute(&self.pool)
                .await
            }
        }
        .map_err(map_sqlx)?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_sessions(&self, session_handles: &[String]) -> StoreResult<Vec<String>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        let mut deleted = Vec::new();

        for handle in session_handles {
            let result = sqlx::query("DELETE FROM session_info WHERE session_handle = ?")
                .bind(handle)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
            if result.rows_affected() == 1 {
                deleted.push(handle.clone());
            }
        }

        tx.commit().await.map_err(map_sqlx)?;
        Ok(deleted)
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM session_info WHERE expires_at <= ?")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }

    async fn insert_past_token(&self, record: PastTokenRecord) -> StoreResult<()> {
        let query = r#"
            INSERT INTO past_tokens (
                refresh_token_hash_2, session_handle,
                parent_refresh_token_hash_2, created_at
            ) VALUES (?, ?, ?, ?)
        "#;

        sqlx::query(query)
            .bind(&record.refresh_token_hash2)
            .bind(&record.session_handle)
            .bind(&record.parent_refresh_token_hash2)
            .bind(record.created_at.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn get_past_token(
        &self,
        refresh_token_hash2: &str,
    ) -> StoreResult<Option<PastTokenRecord>> {
        let query = r#"
            SELECT refresh_token_hash_2, session_handle,
                   parent_refresh_token_hash_2, created_at
            FROM past_tokens
            WHERE refresh_token_hash_2 = ?
            LIMIT 1
        "#;

        let row = sqlx::query(query)
            .bind(refresh_token_hash2)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

        match row {
            Some(row) => Ok(Some(row_to_past_token(&row)?)),
            None => Ok(None),
        }
    }

    async fn count_past_tokens(&self) -> StoreResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM past_tokens")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;
        let count: i64 = column(&row, "count")?;
        Ok(count as u64)
    }

    async fn delete_orphaned_past_tokens(
        &self,
        created_before: DateTime<Utc>,
    ) -> StoreResult<u64> {
        // Rows whose session still exists are kept whatever their age; the
        // rotation race checks read them.
        let query = r#"
            DELETE FROM past_tokens
            WHERE created_at <= ?
              AND session_handle NOT IN (SELECT session_handle FROM session_info)
        "#;

        let result = sqlx::query(query)
            .bind(created_before.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }

    async fn get_signing_keys(&self, kind: KeyKind) -> StoreResult<Vec<SigningKeyRecord>> {
        let query = r#"
            SELECT key_id, kind, bucket, algorithm, public_key, private_key, created_at
            FROM signing_keys
            WHERE kind = ?
            ORDER BY created_at DESC
        "#;

        let rows = sqlx::query(query)
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

        rows.iter().map(row_to_signing_key).collect()
    }

    async fn insert_signing_key_if_absent(
        &self,
        record: SigningKeyRecord,
    ) -> StoreResult<SigningKeyRecord> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO signing_keys (
                key_id, kind, bucket, algorithm, public_key, private_key, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.key_id)
        .bind(record.kind.as_str())
        .bind(record.bucket)
        .bind(&record.algorithm)
        .bind(&record.public_key)
        .bind(&record.private_key)
        .bind(record.created_at.timestamp_millis())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        // Read back whichever row won the slot
        let row = sqlx::query(
            r#"
            SELECT key_id, kind, bucket, algorithm, public_key, private_key, created_at
            FROM signing_keys
            WHERE kind = ? AND bucket = ?
            LIMIT 1
            "#,
        )
        .bind(record.kind.as_str())
        .bind(record.bucket)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        row_to_signing_key(&row)
    }

    async fn get_key_value(&self, name: &str) -> StoreResult<Option<KeyValueRecord>> {
        let row = sqlx::query("SELECT name, value, created_at FROM key_value WHERE name = ? LIMIT 1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

        match row {
            Some(row) => Ok(Some(row_to_key_value(&row)?)),
            None => Ok(None),
        }
    }

    async fn set_key_value_if_absent(&self, record: KeyValueRecord) -> StoreResult<KeyValueRecord> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        sqlx::query("INSERT OR IGNORE INTO key_value (name, value, created_at) VALUES (?, ?, ?)")
            .bind(&record.name)
            .bind(&record.value)
            .bind(record.created_at.timestamp_millis())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        let row = sqlx::query("SELECT name, value, created_at FROM key_value WHERE name = ? LIMIT 1")
            .bind(&record.name)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        row_to_key_value(&row)
    }
}

/// Classify a sqlx failure: busy/locked handles are retryable conflicts,
/// everything else is a plain query failure
fn map_sqlx(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        let message = db_err.message();
        if message.contains("database is locked") || message.contains("database table is locked") {
            return StoreError::conflict(message);
        }
    }
    StoreError::query(err.to_string())
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get::<T, _>(name)
        .map_err(|err| StoreError::row_decode(format!("column {name}: {err}")))
}

fn parse_json(raw: String) -> StoreResult<Value> {
    serde_json::from_str(&raw).map_err(|err| StoreError::row_decode(format!("json blob: {err}")))
}

fn millis_to_datetime(millis: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::row_decode(format!("timestamp out of range: {millis}")))
}

fn parse_kind(raw: &str) -> StoreResult<KeyKind> {
    match raw {
        "static" => Ok(KeyKind::Static),
        "dynamic" => Ok(KeyKind::Dynamic),
        other => Err(StoreError::row_decode(format!("unknown key kind: {other}"))),
    }
}

fn row_to_session(row: &SqliteRow) -> StoreResult<SessionRecord> {
    Ok(SessionRecord {
        session_handle: column(row, "session_handle")?,
        user_id: column(row, "user_id")?,
        refresh_token_hash2: column(row, "refresh_token_hash_2")?,
        user_data_in_database: parse_json(column::<String>(row, "user_data_in_database")?)?,
        user_data_in_jwt: parse_json(column::<String>(row, "user_data_in_jwt")?)?,
        created_at: millis_to_datetime(column(row, "created_at")?)?,
        expires_at: millis_to_datetime(column(row, "expires_at")?)?,
    })
}

fn row_to_past_token(row: &SqliteRow) -> StoreResult<PastTokenRecord> {
    Ok(PastTokenRecord {
        refresh_token_hash2: column(row, "refresh_token_hash_2")?,
        session_handle: column(row, "session_handle")?,
        parent_refresh_token_hash2: column(row, "parent_refresh_token_hash_2")?,
        created_at: millis_to_datetime(column(row, "created_at")?)?,
    })
}

fn row_to_signing_key(row: &SqliteRow) -> StoreResult<SigningKeyRecord> {
    let kind: String = column(row, "kind")?;
    Ok(SigningKeyRecord {
        key_id: column(row, "key_id")?,
        kind: parse_kind(&kind)?,
        bucket: column(row, "bucket")?,
        algorithm: column(row, "algorithm")?,
        public_key: column(row, "public_key")?,
        private_key: column(row, "private_key")?,
        created_at: millis_to_datetime(column(row, "created_at")?)?,
    })
}

fn row_to_key_value(row: &SqliteRow) -> StoreResult<KeyValueRecord> {
    Ok(KeyValueRecord {
        name: column(row, "name")?,
        value: column(row, "value")?,
        created_at: millis_to_datetime(column(row, "created_at")?)?,
    })
}
