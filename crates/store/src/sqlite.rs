//! SQLite-backed durable store using sqlx.
//!
//! Holds the Qwen credential record, the provider catalog (providers,
//! config bags, model bindings), and the settings table. Column names are
//! load-bearing: external admin tooling reads the same database.

use qwengate_types::{
    GateError, ProviderKind, ProviderModel, ProviderRecord, QwenCredential, now_millis,
    traits::Result,
};
use sqlx::{
    Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::collections::HashMap;
use std::str::FromStr;

/// Statements run at open; `CREATE TABLE IF NOT EXISTS` keeps reopening a
/// populated database a no-op.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS qwen_credentials (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        token      TEXT NOT NULL,
        cookies    TEXT NOT NULL,
        expires_at INTEGER,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS providers (
        id          TEXT PRIMARY KEY,
        name        TEXT NOT NULL,
        type        TEXT NOT NULL,
        enabled     INTEGER NOT NULL DEFAULT 1,
        priority    INTEGER NOT NULL DEFAULT 0,
        description TEXT
    )",
    "CREATE TABLE IF NOT EXISTS provider_configs (
        provider_id  TEXT NOT NULL,
        key          TEXT NOT NULL,
        value        TEXT NOT NULL,
        is_sensitive INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (provider_id, key)
    )",
    "CREATE TABLE IF NOT EXISTS models (
        id           TEXT PRIMARY KEY,
        name         TEXT NOT NULL,
        description  TEXT,
        capabilities TEXT
    )",
    "CREATE TABLE IF NOT EXISTS provider_models (
        provider_id TEXT NOT NULL,
        model_id    TEXT NOT NULL,
        is_default  INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (provider_id, model_id)
    )",
    "CREATE TABLE IF NOT EXISTS settings (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
];

/// A persistent store backed by `SQLite`.
pub struct Store {
    /// Connection pool to the `SQLite` database.
    pool: SqlitePool,
}

/// `true` for the one storage-shape error credential reads must swallow.
fn is_missing_table(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.message().contains("no such table"))
}

impl Store {
    /// Connects to a `SQLite` database (e.g. `"sqlite:./qwengate.db"` or
    /// `"sqlite::memory:"`) and creates the schema if absent.
    ///
    /// # Errors
    ///
    /// Returns a [`sqlx::Error`] if the connection or schema creation fails.
    pub async fn new(database_url: &str) -> std::result::Result<Self, sqlx::Error> {
        let opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    // ── Credentials ───────────────────────────────────────────────────────

    /// Loads the most recent non-expired credential record.
    ///
    /// Absent row, expired row, and even a missing table all read as
    /// `None`; only genuine storage failures surface.
    pub async fn credential(&self) -> Result<Option<QwenCredential>> {
        let row = sqlx::query(
            "SELECT token, cookies, expires_at, created_at, updated_at
             FROM qwen_credentials ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await;

        let row = match row {
            Ok(r) => r,
            Err(e) if is_missing_table(&e) => return Ok(None),
            Err(e) => return Err(GateError::Storage(e.to_string())),
        };

        let Some(row) = row else { return Ok(None) };
        let cred = QwenCredential {
            token: row.get("token"),
            cookies: row.get("cookies"),
            expires_at: row.get("expires_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        };
        // expires_at is in seconds, per the persisted schema.
        if cred
            .expires_at
            .is_some_and(|e| e <= QwenCredential::now_seconds())
        {
            return Ok(None);
        }
        Ok(Some(cred))
    }

    /// Replaces the credential table's contents atomically
    /// (delete-then-insert in one transaction) and returns the new row id.
    pub async fn set_credential(
        &self,
        token: &str,
        cookies: &str,
        expires_at: Option<i64>,
    ) -> Result<i64> {
        let now = now_millis();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM qwen_credentials")
            .execute(&mut *tx)
            .await?;
        let res = sqlx::query(
            "INSERT INTO qwen_credentials (token, cookies, expires_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(token)
        .bind(cookies)
        .bind(expires_at)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(res.last_insert_rowid())
    }

    /// Deletes all credential rows; returns the number removed.
    pub async fn delete_credentials(&self) -> Result<u64> {
        let res = sqlx::query("DELETE FROM qwen_credentials")
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    // ── Provider catalog ──────────────────────────────────────────────────

    /// Loads a single catalog row by id.
    pub async fn provider(&self, id: &str) -> Result<Option<ProviderRecord>> {
        let row = sqlx::query(
            "SELECT id, name, type, enabled, priority, description
             FROM providers WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| record_from_row(&r)))
    }

    /// All enabled catalog rows, highest priority first, name ascending on
    /// ties — the registry's load order.
    pub async fn enabled_providers(&self) -> Result<Vec<ProviderRecord>> {
        let rows = sqlx::query(
            "SELECT id, name, type, enabled, priority, description
             FROM providers WHERE enabled = 1
             ORDER BY priority DESC, name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(record_from_row).collect())
    }

    /// A provider's config bag. Values are stored as strings; each one is
    /// opportunistically JSON-decoded, falling back to the raw string.
    pub async fn provider_config(&self, id: &str) -> Result<HashMap<String, serde_json::Value>> {
        let rows = sqlx::query("SELECT key, value FROM provider_configs WHERE provider_id = ?")
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        let mut bag = HashMap::with_capacity(rows.len());
        for row in rows {
            let key: String = row.get("key");
            let raw: String = row.get("value");
            let value = serde_json::from_str(&raw)
                .unwrap_or_else(|_| serde_json::Value::String(raw.clone()));
            bag.insert(key, value);
        }
        Ok(bag)
    }

    /// The models bound to a provider, default flag included.
    pub async fn provider_models(&self, id: &str) -> Result<Vec<ProviderModel>> {
        let rows = sqlx::query(
            "SELECT m.id, m.name, m.description, m.capabilities, pm.is_default
             FROM provider_models pm JOIN models m ON m.id = pm.model_id
             WHERE pm.provider_id = ?
             ORDER BY pm.is_default DESC, m.id ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| {
                let caps: Option<String> = r.get("capabilities");
                ProviderModel {
                    id: r.get("id"),
                    name: r.get("name"),
                    description: r.get("description"),
                    capabilities: caps
                        .and_then(|c| serde_json::from_str(&c).ok())
                        .unwrap_or_default(),
                    is_default: r.get::<i64, _>("is_default") != 0,
                }
            })
            .collect())
    }

    // ── Settings ──────────────────────────────────────────────────────────

    /// A single setting value, if present.
    pub async fn setting(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("value")))
    }

    /// The whole settings table as a map (startup-time resolution).
    pub async fn settings_map(&self) -> Result<HashMap<String, String>> {
        let rows = sqlx::query("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get("key"), r.get("value")))
            .collect())
    }

    /// Upserts a setting row.
    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ── Bootstrap / test helper ───────────────────────────────────────────

    /// Inserts a catalog row with its config bag and model bindings in one
    /// transaction. Used by first-run bootstrap and the test suites.
    pub async fn seed_provider(
        &self,
        record: &ProviderRecord,
        config: &[(&str, serde_json::Value, bool)],
        models: &[(&str, &str, bool)],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT OR REPLACE INTO providers (id, name, type, enabled, priority, description)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(record.kind.to_string())
        .bind(i64::from(record.enabled))
        .bind(record.priority)
        .bind(&record.description)
        .execute(&mut *tx)
        .await?;

        for (key, value, sensitive) in config {
            let stored = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            sqlx::query(
                "INSERT OR REPLACE INTO provider_configs (provider_id, key, value, is_sensitive)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&record.id)
            .bind(key)
            .bind(stored)
            .bind(i64::from(*sensitive))
            .execute(&mut *tx)
            .await?;
        }

        for (model_id, name, is_default) in models {
            sqlx::query(
                "INSERT OR REPLACE INTO models (id, name, description, capabilities)
                 VALUES (?, ?, NULL, ?)",
            )
            .bind(model_id)
            .bind(name)
            .bind(r#"["chat","streaming"]"#)
            .execute(&mut *tx)
            .await?;
            sqlx::query(
                "INSERT OR REPLACE INTO provider_models (provider_id, model_id, is_default)
                 VALUES (?, ?, ?)",
            )
            .bind(&record.id)
            .bind(model_id)
            .bind(i64::from(*is_default))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> ProviderRecord {
    ProviderRecord {
        id: row.get("id"),
        name: row.get("name"),
        kind: ProviderKind::from_catalog(&row.get::<String, _>("type")),
        enabled: row.get::<i64, _>("enabled") != 0,
        priority: row.get("priority"),
        description: row.get("description"),
    }
}
