//! SQLite-backed entity store.
//!
//! Writes go through a single connection behind a mutex, reads are spread
//! round-robin over a pool of read-only connections. The database runs in WAL
//! mode so readers never block the writer.

use super::models::EntityKind;
use super::patch::{apply_deltas, validate_field_name};
use super::schema::{key_columns, table_for, ENTITY_VERSIONED_SCHEMAS};
use super::trait_def::{
    Condition, EntityStore, FieldDelta, Query, SortOrder, StoreError, StoreResult,
};
use crate::sqlite_persistence::migrate_if_needed;
use anyhow::{Context, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Clone)]
pub struct SqliteEntityStore {
    read_pool: Vec<Arc<Mutex<Connection>>>,
    write_conn: Arc<Mutex<Connection>>,
    read_index: Arc<AtomicUsize>,
}

impl SqliteEntityStore {
    /// Opens (creating if needed) the database at `db_path`.
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    /// * `read_pool_size` - Number of connections for concurrent reads, at least 1
    pub fn new<P: AsRef<Path>>(db_path: P, read_pool_size: usize) -> Result<Self> {
        let db_path = db_path.as_ref();

        let mut write_conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open database {:?}", db_path))?;

        migrate_if_needed(&mut write_conn, ENTITY_VERSIONED_SCHEMAS)?;
        let _journal_mode: String =
            write_conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        write_conn.busy_timeout(std::time::Duration::from_secs(5))?;

        let read_pool_size = read_pool_size.max(1);
        let mut read_pool = Vec::with_capacity(read_pool_size);
        for _ in 0..read_pool_size {
            let read_conn = Connection::open_with_flags(
                db_path,
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            read_conn.busy_timeout(std::time::Duration::from_secs(5))?;
            read_pool.push(Arc::new(Mutex::new(read_conn)));
        }

        let store = SqliteEntityStore {
            read_pool,
            write_conn: Arc::new(Mutex::new(write_conn)),
            read_index: Arc::new(AtomicUsize::new(0)),
        };

        {
            let conn = store.write()?;
            for kind in [EntityKind::Artist, EntityKind::Album, EntityKind::Track] {
                let count = count_rows(&conn, kind)?;
                info!("Opened entity store with {} {} records", count, kind);
            }
        }

        Ok(store)
    }

    fn get_read_conn(&self) -> Arc<Mutex<Connection>> {
        let index = self.read_index.fetch_add(1, Ordering::SeqCst) % self.read_pool.len();
        self.read_pool[index].clone()
    }

    fn write(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.write_conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

// =============================================================================
// Row helpers
// =============================================================================

fn lock(conn: &Mutex<Connection>) -> StoreResult<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|_| StoreError::LockPoisoned)
}

fn count_rows(conn: &Connection, kind: EntityKind) -> StoreResult<usize> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", table_for(kind).name),
        [],
        |r| r.get(0),
    )?;
    Ok(count as usize)
}

fn to_sql_value(value: &Value) -> StoreResult<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => {
            return Err(StoreError::InvalidField(format!(
                "cannot compare against {}",
                value
            )))
        }
    })
}

fn document_id(kind: EntityKind, document: &Value) -> StoreResult<String> {
    match document.get("id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(StoreError::InvalidDocument {
            kind,
            reason: "missing id".to_string(),
        }),
    }
}

/// Values for the collection's key columns, extracted from the document.
fn key_values(kind: EntityKind, document: &Value) -> StoreResult<Vec<(&'static str, SqlValue)>> {
    key_columns(kind)
        .map(|column| match document.get(column.name) {
            Some(Value::String(s)) if !s.is_empty() => {
                Ok((column.name, SqlValue::Text(s.clone())))
            }
            _ => Err(StoreError::InvalidDocument {
                kind,
                reason: format!("{} must be a non-empty string", column.name),
            }),
        })
        .collect()
}

fn map_write_error(kind: EntityKind, err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, msg)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            StoreError::UniqueViolation {
                kind,
                detail: msg.clone().unwrap_or_else(|| e.to_string()),
            }
        }
        _ => err.into(),
    }
}

/// Inserts, or replaces the row with the same id while keeping its position.
fn upsert_row(conn: &Connection, kind: EntityKind, document: &Value) -> StoreResult<()> {
    let table = table_for(kind).name;
    let id = document_id(kind, document)?;
    let keys = key_values(kind, document)?;
    let body = serde_json::to_string(document)?;

    let mut columns = vec!["id"];
    let mut values = vec![SqlValue::Text(id)];
    for (name, value) in keys {
        columns.push(name);
        values.push(value);
    }
    columns.push("body");
    values.push(SqlValue::Text(body));

    let placeholders = vec!["?"; columns.len()].join(", ");
    let updates = columns[1..]
        .iter()
        .map(|c| format!("{c} = excluded.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders}) \
         ON CONFLICT(id) DO UPDATE SET {updates}, updated = cast(strftime('%s','now') as int)",
        columns.join(", ")
    );

    conn.execute(&sql, params_from_iter(values))
        .map_err(|e| map_write_error(kind, e))?;
    Ok(())
}

fn select_sql(kind: EntityKind, query: &Query) -> StoreResult<(String, Vec<SqlValue>)> {
    let table = table_for(kind);
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    for condition in &query.conditions {
        match condition {
            Condition::Eq(field, value) => {
                validate_field_name(field)?;
                let expr = if table.column(field).is_some() && field != "body" {
                    field.clone()
                } else {
                    format!("json_extract(body, '$.{}')", field)
                };
                if value.is_null() {
                    clauses.push(format!("{} IS NULL", expr));
                } else {
                    clauses.push(format!("{} = ?", expr));
                    values.push(to_sql_value(value)?);
                }
            }
            Condition::Contains(field, value) => {
                validate_field_name(field)?;
                clauses.push(format!(
                    "EXISTS (SELECT 1 FROM json_each({}.body, '$.{}') AS j WHERE j.value = ?)",
                    table.name, field
                ));
                values.push(to_sql_value(value)?);
            }
        }
    }

    let mut sql = format!("SELECT body FROM {}", table.name);
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    match &query.sort {
        SortOrder::Insertion => sql.push_str(" ORDER BY seq ASC"),
        SortOrder::NewestFirst => sql.push_str(" ORDER BY seq DESC"),
        SortOrder::Field { field, descending } => {
            validate_field_name(field)?;
            sql.push_str(&format!(
                " ORDER BY json_extract(body, '$.{}') {}, seq ASC",
                field,
                if *descending { "DESC" } else { "ASC" }
            ));
        }
    }
    sql.push_str(" LIMIT ? OFFSET ?");
    values.push(SqlValue::Integer(
        query.limit.map(|l| l as i64).unwrap_or(-1),
    ));
    values.push(SqlValue::Integer(query.offset as i64));

    Ok((sql, values))
}

fn parse_body(body: String) -> StoreResult<Value> {
    Ok(serde_json::from_str(&body)?)
}

// =============================================================================
// EntityStore impl
// =============================================================================

impl EntityStore for SqliteEntityStore {
    fn get(&self, kind: EntityKind, id: &str) -> StoreResult<Option<Value>> {
        let read_conn = self.get_read_conn();
        let conn = lock(&read_conn)?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT body FROM {} WHERE id = ?1",
            table_for(kind).name
        ))?;
        let body: Option<String> = stmt.query_row(params![id], |r| r.get(0)).optional()?;
        body.map(parse_body).transpose()
    }

    fn find(&self, kind: EntityKind, query: &Query) -> StoreResult<Vec<Value>> {
        let (sql, values) = select_sql(kind, query)?;
        let read_conn = self.get_read_conn();
        let conn = lock(&read_conn)?;
        let mut stmt = conn.prepare_cached(&sql)?;
        let bodies = stmt
            .query_map(params_from_iter(values), |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        bodies.into_iter().map(parse_body).collect()
    }

    fn insert(&self, kind: EntityKind, mut document: Value) -> StoreResult<Value> {
        let object = document
            .as_object_mut()
            .ok_or_else(|| StoreError::InvalidDocument {
                kind,
                reason: "document is not an object".to_string(),
            })?;
        let id = uuid::Uuid::new_v4().to_string();
        object.insert("id".to_string(), Value::String(id.clone()));

        let conn = self.write()?;
        upsert_row(&conn, kind, &document)?;
        debug!("Inserted {} {}", kind, id);
        Ok(document)
    }

    fn put(&self, kind: EntityKind, document: Value) -> StoreResult<Value> {
        if !document.is_object() {
            return Err(StoreError::InvalidDocument {
                kind,
                reason: "document is not an object".to_string(),
            });
        }
        let conn = self.write()?;
        upsert_row(&conn, kind, &document)?;
        Ok(document)
    }

    fn patch(
        &self,
        kind: EntityKind,
        id: &str,
        deltas: &[FieldDelta],
    ) -> StoreResult<Option<Value>> {
        let mut conn = self.write()?;
        let tx = conn.transaction()?;

        let body: Option<String> = tx
            .query_row(
                &format!("SELECT body FROM {} WHERE id = ?1", table_for(kind).name),
                params![id],
                |r| r.get(0),
            )
            .optional()?;
        let Some(body) = body else {
            return Ok(None);
        };

        let mut document = parse_body(body)?;
        apply_deltas(kind, &mut document, deltas)?;
        upsert_row(&tx, kind, &document)?;
        tx.commit()?;
        Ok(Some(document))
    }

    fn delete(&self, kind: EntityKind, id: &str) -> StoreResult<bool> {
        let conn = self.write()?;
        let removed = conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", table_for(kind).name),
            params![id],
        )?;
        if removed > 0 {
            debug!("Deleted {} {}", kind, id);
        }
        Ok(removed > 0)
    }

    fn count(&self, kind: EntityKind) -> StoreResult<usize> {
        let read_conn = self.get_read_conn();
        let conn = lock(&read_conn)?;
        count_rows(&conn, kind)
    }
}
