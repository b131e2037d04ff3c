// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use admindesk_app::{EntityKind, PreferenceBackend, PreferenceKey, PreferenceKind, UserId};
use anyhow::{Context, Result, anyhow, bail};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;

pub const APP_NAME: &str = "admindesk";

const REQUIRED_SCHEMA: &[(&str, &[&str])] = &[(
    "column_preferences",
    &["user_id", "entity", "kind", "fields", "updated_at"],
)];

/// One persisted preference row, as reported by `admindesk --check`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPreference {
    pub entity: EntityKind,
    pub kind: PreferenceKind,
    pub fields: Vec<String>,
    pub updated_at: OffsetDateTime,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let printable = path.to_string_lossy().to_string();
        validate_db_path(&printable)?;
        let conn = Connection::open(path)
            .with_context(|| format!("open database at {}", path.display()))?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn raw_connection(&self) -> &Connection {
        &self.conn
    }

    pub fn bootstrap(&self) -> Result<()> {
        if has_user_tables(&self.conn)? {
            validate_schema(&self.conn)?;
        } else {
            self.conn
                .execute_batch(include_str!("sql/schema.sql"))
                .context("create schema")?;
        }
        Ok(())
    }

    pub fn get_preference(&self, key: &PreferenceKey) -> Result<Option<Vec<String>>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "
                SELECT fields
                FROM column_preferences
                WHERE user_id = ? AND entity = ? AND kind = ?
                ",
                params![key.user.as_str(), key.entity.as_str(), key.kind.as_str()],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("load {} preference", describe(key)))?;
        raw.map(|raw| decode_fields(key, &raw)).transpose()
    }

    pub fn put_preference(&self, key: &PreferenceKey, fields: &[String]) -> Result<()> {
        let encoded = serde_json::to_string(fields)
            .with_context(|| format!("encode {} preference", describe(key)))?;
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "
                INSERT INTO column_preferences (user_id, entity, kind, fields, updated_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(user_id, entity, kind)
                DO UPDATE SET fields = excluded.fields, updated_at = excluded.updated_at
                ",
                params![
                    key.user.as_str(),
                    key.entity.as_str(),
                    key.kind.as_str(),
                    encoded,
                    now
                ],
            )
            .with_context(|| format!("save {} preference", describe(key)))?;
        debug!(
            user = %key.user,
            entity = key.entity.as_str(),
            kind = key.kind.as_str(),
            "preference row written"
        );
        Ok(())
    }

    pub fn list_preferences(&self, user: &UserId) -> Result<Vec<StoredPreference>> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT entity, kind, fields, updated_at
                FROM column_preferences
                WHERE user_id = ?
                ORDER BY entity ASC, kind ASC
                ",
            )
            .context("prepare preference list query")?;
        let rows = stmt
            .query_map(params![user.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .context("query preferences")?;

        let mut preferences = Vec::new();
        for row in rows {
            let (entity, kind, fields, updated_at) = row.context("read preference row")?;
            let Some(entity) = EntityKind::parse(&entity) else {
                debug!(entity = %entity, "skipping preference for unknown entity");
                continue;
            };
            let kind = PreferenceKind::parse(&kind)
                .ok_or_else(|| anyhow!("unknown preference kind {kind:?} in column_preferences"))?;
            let key = PreferenceKey::new(user, entity, kind);
            preferences.push(StoredPreference {
                entity,
                kind,
                fields: decode_fields(&key, &fields)?,
                updated_at: OffsetDateTime::parse(&updated_at, &Rfc3339).with_context(|| {
                    format!("parse updated_at {updated_at:?} for {}", describe(&key))
                })?,
            });
        }
        Ok(preferences)
    }
}

impl PreferenceBackend for Store {
    fn get(&self, key: &PreferenceKey) -> Result<Option<Vec<String>>> {
        self.get_preference(key)
    }

    fn set(&self, key: &PreferenceKey, fields: &[String]) -> Result<()> {
        self.put_preference(key, fields)
    }
}

pub fn default_db_path() -> Result<PathBuf> {
    if let Some(override_path) = env::var_os("ADMINDESK_DB_PATH") {
        return Ok(PathBuf::from(override_path));
    }

    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!("cannot resolve data directory; set ADMINDESK_DB_PATH to a writable database path")
    })?;

    let app_dir = data_root.join(APP_NAME);
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("create data directory {}", app_dir.display()))?;
    Ok(app_dir.join("admindesk.db"))
}

pub fn validate_db_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("database path must not be empty");
    }
    if path == ":memory:" {
        return Ok(());
    }

    if let Some(index) = path.find("://")
        && index > 0
    {
        let scheme = &path[..index];
        if scheme.chars().all(char::is_alphabetic) {
            bail!(
                "database path {path:?} looks like a URI ({scheme}://); pass a filesystem path instead"
            );
        }
    }

    if path.starts_with("file:") {
        bail!("database path {path:?} uses file: URI syntax; pass a plain filesystem path");
    }

    if path.contains('?') {
        bail!(
            "database path {path:?} contains '?'; remove query parameters and use a plain file path"
        );
    }

    Ok(())
}

fn describe(key: &PreferenceKey) -> String {
    format!("{}/{}/{}", key.user, key.entity.as_str(), key.kind.as_str())
}

fn decode_fields(key: &PreferenceKey, raw: &str) -> Result<Vec<String>> {
    serde_json::from_str::<Vec<String>>(raw).with_context(|| {
        format!(
            "preference {} holds {raw:?}, not a JSON list of field names; save the column picker again to overwrite it",
            describe(key)
        )
    })
}

fn has_user_tables(conn: &Connection) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "
            SELECT COUNT(*)
            FROM sqlite_master
            WHERE type = 'table'
              AND name NOT LIKE 'sqlite_%'
            ",
            [],
            |row| row.get(0),
        )
        .context("count user tables")?;
    Ok(count > 0)
}

fn validate_schema(conn: &Connection) -> Result<()> {
    for (table, required_columns) in REQUIRED_SCHEMA {
        if !table_exists(conn, table)? {
            bail!(
                "database is missing required table `{table}`; point ADMINDESK_DB_PATH at an admindesk preferences database"
            );
        }

        let columns = table_columns(conn, table)?;
        let missing: Vec<&str> = required_columns
            .iter()
            .copied()
            .filter(|column| !columns.contains(*column))
            .collect();

        if !missing.is_empty() {
            bail!(
                "table `{table}` is missing required columns: {}; move the old database aside and relaunch",
                missing.join(", ")
            );
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "
            SELECT EXISTS(
              SELECT 1
              FROM sqlite_master
              WHERE type = 'table' AND name = ?
            )
            ",
            params![table],
            |row| row.get::<_, i64>(0),
        )
        .with_context(|| format!("check table existence for {table}"))?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .with_context(|| format!("inspect columns for {table}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .with_context(|| format!("query column info for {table}"))?;

    let names = rows
        .collect::<rusqlite::Result<BTreeSet<_>>>()
        .with_context(|| format!("collect columns for {table}"))?;
    Ok(names)
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .context("configure sqlite pragmas")
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("format current timestamp")
}

#[cfg(test)]
mod tests {
    use super::Store;
    use admindesk_app::{EntityKind, PreferenceKey, PreferenceKind, UserId};
    use anyhow::Result;

    #[test]
    fn corrupt_fields_are_actionable() -> Result<()> {
        let store = Store::open_memory()?;
        store.bootstrap()?;
        store.raw_connection().execute(
            "INSERT INTO column_preferences (user_id, entity, kind, fields, updated_at)
             VALUES ('u1', 'roles', 'hideFields', 'name,description', '2026-01-01T00:00:00Z')",
            [],
        )?;

        let key = PreferenceKey::new(
            &UserId::from("u1"),
            EntityKind::Roles,
            PreferenceKind::HideFields,
        );
        let error = store
            .get_preference(&key)
            .expect_err("comma list is not JSON");
        assert!(
            format!("{error:#}").contains("save the column picker again"),
            "unexpected error: {error:#}"
        );
        Ok(())
    }

    #[test]
    fn kind_column_rejects_unknown_values() -> Result<()> {
        let store = Store::open_memory()?;
        store.bootstrap()?;
        let result = store.raw_connection().execute(
            "INSERT INTO column_preferences (user_id, entity, kind, fields, updated_at)
             VALUES ('u1', 'roles', 'sortFields', '[]', '2026-01-01T00:00:00Z')",
            [],
        );
        assert!(result.is_err());
        Ok(())
    }
}
