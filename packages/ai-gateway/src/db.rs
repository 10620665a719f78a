use anyhow::Result;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::{path::Path, thread, time::Duration};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::models::{NewProvider, ProviderConfig};

const PROVIDER_COLUMNS: &str = "id, name, vendor, model, api_key, base_url, is_default, \
     is_visible_to_frontend, created_at, updated_at";

/**
 * \brief Open the SQLite file at `path`.
 */
pub fn open_db(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

/**
 * \brief Create the schema. Safe to run on every start.
 */
pub fn migrate(conn: &Connection) -> Result<()> {
    retry_on_locked(|| {
        conn.execute_batch(
            r#"
        PRAGMA journal_mode=WAL;
        CREATE TABLE IF NOT EXISTS providers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            vendor TEXT NOT NULL,
            model TEXT NOT NULL,
            api_key TEXT,
            base_url TEXT,
            is_default INTEGER NOT NULL DEFAULT 0,
            is_visible_to_frontend INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS app_config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
        )
    })?;
    Ok(())
}

fn set_bool_config(conn: &Connection, key: &str, value: bool) -> Result<()> {
    retry_on_locked(|| {
        conn.execute(
            "INSERT INTO app_config (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            params![key, if value { "1" } else { "0" }],
        )
    })?;
    Ok(())
}

fn get_bool_config(conn: &Connection, key: &str, default: bool) -> Result<bool> {
    let val = conn
        .query_row(
            "SELECT value FROM app_config WHERE key=?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(val.map(|s| s == "1").unwrap_or(default))
}

pub(crate) fn now_rfc3339() -> Result<String> {
    Ok(OffsetDateTime::now_utc().format(&Rfc3339)?)
}

fn map_provider(row: &Row<'_>) -> rusqlite::Result<ProviderConfig> {
    Ok(ProviderConfig {
        id: row.get(0)?,
        name: row.get(1)?,
        vendor: row.get(2)?,
        model: row.get(3)?,
        api_key: row.get(4)?,
        base_url: row.get(5)?,
        is_default: row.get(6)?,
        is_visible_to_frontend: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn query_providers(conn: &Connection, filter_and_order: &str) -> Result<Vec<ProviderConfig>> {
    let sql = format!("SELECT {} FROM providers {}", PROVIDER_COLUMNS, filter_and_order);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], map_provider)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/**
 * \brief Insert a provider. A default insert clears the flag on every other row first.
 */
pub fn insert_provider(conn: &Connection, input: &NewProvider) -> Result<i64> {
    let now = now_rfc3339()?;
    retry_on_locked(|| {
        let tx = conn.unchecked_transaction()?;
        if input.is_default {
            tx.execute("UPDATE providers SET is_default=0 WHERE is_default=1", [])?;
        }
        tx.execute(
            "INSERT INTO providers (name, vendor, model, api_key, base_url, is_default, is_visible_to_frontend, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                input.name,
                input.vendor,
                input.model,
                input.api_key,
                input.base_url,
                input.is_default,
                input.is_visible_to_frontend,
                now
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    })
}

/**
 * \brief Persist every mutable field of `provider`. Returns false when the row is gone.
 * \details Does not touch other rows' default flag; use [`set_default_provider`] for that.
 */
pub fn update_provider(conn: &Connection, provider: &ProviderConfig) -> Result<bool> {
    let now = now_rfc3339()?;
    let rows = retry_on_locked(|| {
        conn.execute(
            "UPDATE providers SET name=?1, model=?2, api_key=?3, base_url=?4, is_visible_to_frontend=?5, updated_at=?6 WHERE id=?7",
            params![
                provider.name,
                provider.model,
                provider.api_key,
                provider.base_url,
                provider.is_visible_to_frontend,
                now,
                provider.id
            ],
        )
    })?;
    Ok(rows > 0)
}

/**
 * \brief Delete a provider. Returns false when nothing matched.
 */
pub fn delete_provider(conn: &Connection, id: i64) -> Result<bool> {
    let rows = retry_on_locked(|| conn.execute("DELETE FROM providers WHERE id=?1", params![id]))?;
    Ok(rows > 0)
}

/**
 * \brief All providers ordered by name.
 */
pub fn list_providers(conn: &Connection) -> Result<Vec<ProviderConfig>> {
    query_providers(conn, "ORDER BY name ASC, id ASC")
}

/**
 * \brief Frontend-visible providers, default first, then by name.
 */
pub fn list_visible_providers(conn: &Connection) -> Result<Vec<ProviderConfig>> {
    query_providers(
        conn,
        "WHERE is_visible_to_frontend=1 ORDER BY is_default DESC, name ASC, id ASC",
    )
}

/**
 * \brief The provider answering frontend requests: the visible default, else the first
 *        visible provider by name.
 */
pub fn find_active_frontend_provider(conn: &Connection) -> Result<Option<ProviderConfig>> {
    let mut found = query_providers(
        conn,
        "WHERE is_visible_to_frontend=1 AND is_default=1 ORDER BY id ASC LIMIT 1",
    )?;
    if found.is_empty() {
        found = query_providers(
            conn,
            "WHERE is_visible_to_frontend=1 ORDER BY name ASC, id ASC LIMIT 1",
        )?;
    }
    Ok(found.into_iter().next())
}

pub fn get_provider_by_id(conn: &Connection, id: i64) -> Result<Option<ProviderConfig>> {
    conn.query_row(
        &format!("SELECT {} FROM providers WHERE id=?1", PROVIDER_COLUMNS),
        params![id],
        map_provider,
    )
    .optional()
    .map_err(Into::into)
}

/**
 * \brief Toggle frontend visibility. Returns false when the id is unknown.
 */
pub fn set_frontend_visibility(conn: &Connection, id: i64, visible: bool) -> Result<bool> {
    let now = now_rfc3339()?;
    let rows = retry_on_locked(|| {
        conn.execute(
            "UPDATE providers SET is_visible_to_frontend=?1, updated_at=?2 WHERE id=?3",
            params![visible, now, id],
        )
    })?;
    Ok(rows > 0)
}

/**
 * \brief Make `id` the single default provider.
 * \details Clear-then-set inside one transaction. An unknown id leaves existing flags alone
 *          and returns false.
 */
pub fn set_default_provider(conn: &Connection, id: i64) -> Result<bool> {
    let now = now_rfc3339()?;
    retry_on_locked(|| {
        let tx = conn.unchecked_transaction()?;
        let exists = tx
            .query_row("SELECT 1 FROM providers WHERE id=?1", params![id], |_| Ok(()))
            .optional()?
            .is_some();
        if !exists {
            return Ok(false);
        }
        tx.execute("UPDATE providers SET is_default=0 WHERE is_default=1", [])?;
        tx.execute(
            "UPDATE providers SET is_default=1, updated_at=?1 WHERE id=?2",
            params![now, id],
        )?;
        tx.commit()?;
        Ok(true)
    })
}

/**
 * \brief Clear the default flag on one row (used when an admin unsets it explicitly).
 */
pub fn clear_default_provider(conn: &Connection, id: i64) -> Result<()> {
    retry_on_locked(|| {
        conn.execute(
            "UPDATE providers SET is_default=0 WHERE id=?1",
            params![id],
        )
    })?;
    Ok(())
}

pub fn get_telemetry_enabled(conn: &Connection) -> Result<bool> {
    get_bool_config(conn, "telemetry_enabled", false)
}

pub fn set_telemetry_enabled(conn: &Connection, enabled: bool) -> Result<()> {
    set_bool_config(conn, "telemetry_enabled", enabled)
}

/**
 * \brief Retry helper for SQLite lock contention.
 * \details Retries `database is locked`/`database table is locked` with linear backoff, at most 6 attempts.
 */
fn retry_on_locked<T, F>(mut action: F) -> Result<T>
where
    F: FnMut() -> rusqlite::Result<T>,
{
    const MAX_RETRIES: usize = 5;
    let mut attempt = 0;
    loop {
        match action() {
            Ok(value) => return Ok(value),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if matches!(
                    err.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) && attempt < MAX_RETRIES =>
            {
                attempt += 1;
                thread::sleep(Duration::from_millis(200 * attempt as u64));
            }
            Err(e) => return Err(e.into()),
        }
    }
}
