use super::BASE_DB_VERSION;
use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection};

pub const DEFAULT_TIMESTAMP: &str = "(cast(strftime('%s','now') as int))";

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            // Only mutated when optional field assignments are passed.
            #[allow(unused_mut)]
            let mut column = $crate::sqlite_persistence::Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                non_null: false,
                is_unique: false,
                default_value: None,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SqlType {
    Text,
    Integer,
    Real,
}

impl SqlType {
    fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
        }
    }

    fn from_sql(s: &str) -> Option<SqlType> {
        match s {
            "TEXT" => Some(SqlType::Text),
            "INTEGER" => Some(SqlType::Integer),
            "REAL" => Some(SqlType::Real),
            _ => None,
        }
    }
}

pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static SqlType,
    pub is_primary_key: bool,
    pub non_null: bool,
    pub is_unique: bool,
    pub default_value: Option<&'static str>,
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub indices: &'static [(&'static str, &'static str)],
    pub unique_constraints: &'static [&'static [&'static str]],
}

impl Table {
    pub fn create_sql(&self) -> String {
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|column| {
                let mut definition = format!("{} {}", column.name, column.sql_type.as_sql());
                if column.is_primary_key {
                    definition.push_str(" PRIMARY KEY");
                }
                if column.non_null {
                    definition.push_str(" NOT NULL");
                }
                if column.is_unique {
                    definition.push_str(" UNIQUE");
                }
                if let Some(default_value) = column.default_value {
                    definition.push_str(&format!(" DEFAULT {}", default_value));
                }
                definition
            })
            .collect();

        for unique_constraint in self.unique_constraints {
            parts.push(format!("UNIQUE ({})", unique_constraint.join(", ")));
        }

        format!("CREATE TABLE {} ({});", self.name, parts.join(", "))
    }

    pub fn create(&self, conn: &Connection) -> Result<()> {
        conn.execute(&self.create_sql(), params![])
            .with_context(|| format!("Failed to create table {}", self.name))?;

        for (index_name, column_name) in self.indices {
            conn.execute(
                &format!(
                    "CREATE INDEX {} ON {}({});",
                    index_name, self.name, column_name
                ),
                params![],
            )?;
        }
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn validate(&self, conn: &Connection) -> Result<()> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", self.name))?;
        let actual: Vec<(String, String, bool, bool)> = stmt
            .query_map(params![], |row| {
                Ok((
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i32>(3)? == 1,
                    row.get::<_, i32>(5)? > 0,
                ))
            })?
            .collect::<Result<_, _>>()?;

        if actual.len() != self.columns.len() {
            bail!(
                "Table {} has {} columns, expected {}. Found: {}, expected: {}",
                self.name,
                actual.len(),
                self.columns.len(),
                actual
                    .iter()
                    .map(|(name, ..)| name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                self.columns
                    .iter()
                    .map(|c| c.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        for ((name, sql_type, non_null, is_primary_key), expected) in
            actual.iter().zip(self.columns.iter())
        {
            if name != expected.name {
                bail!(
                    "Table {} column name mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    name
                );
            }
            if SqlType::from_sql(sql_type).as_ref() != Some(expected.sql_type) {
                bail!(
                    "Table {} column {} type mismatch: expected {:?}, got {}",
                    self.name,
                    expected.name,
                    expected.sql_type,
                    sql_type
                );
            }
            if *non_null != expected.non_null {
                bail!(
                    "Table {} column {} non-null mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    expected.non_null,
                    non_null
                );
            }
            if *is_primary_key != expected.is_primary_key {
                bail!(
                    "Table {} column {} primary key mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    expected.is_primary_key,
                    is_primary_key
                );
            }
        }
        Ok(())
    }
}

pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

impl VersionedSchema {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        conn.execute("PRAGMA foreign_keys = ON;", params![])?;
        for table in self.tables {
            table.create(conn)?;
        }
        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + self.version),
            [],
        )?;
        Ok(())
    }

    pub fn validate(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.validate(conn)?;
        }
        Ok(())
    }
}

/// Brings `conn` to the last schema in `schemas`.
///
/// An empty database gets the latest schema directly, an existing one is
/// validated against its recorded version and then walked through every
/// later migration inside a single transaction.
pub fn migrate_if_needed(conn: &mut Connection, schemas: &[VersionedSchema]) -> Result<()> {
    let latest = schemas.last().context("No schema versions defined")?;

    let table_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |r| r.get(0),
    )?;
    if table_count == 0 {
        tracing::info!("Creating db schema at version {}", latest.version);
        return latest.create(conn);
    }

    let db_version: i64 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .context("Failed to read database version")?;
    let version = db_version - BASE_DB_VERSION as i64;
    if version < 0 {
        bail!(
            "Database version {} does not contain base db version {}",
            db_version,
            BASE_DB_VERSION
        );
    }
    let version = version as usize;
    let current = schemas
        .get(version)
        .with_context(|| format!("Database version {} is too new", version))?;
    current.validate(conn)?;

    if version == latest.version {
        return Ok(());
    }

    let tx = conn.transaction()?;
    let mut latest_from = version;
    for schema in schemas.iter().skip(version + 1) {
        if let Some(migration_fn) = schema.migration {
            tracing::info!(
                "Migrating db from version {} to {}",
                latest_from,
                schema.version
            );
            migration_fn(&tx)?;
        }
        latest_from = schema.version;
    }
    tx.pragma_update(None, "user_version", (BASE_DB_VERSION + latest_from) as i64)?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite_column;

    const THINGS_V_0: Table = Table {
        name: "things",
        columns: &[
            sqlite_column!("seq", &SqlType::Integer, is_primary_key = true),
            sqlite_column!("id", &SqlType::Text, non_null = true, is_unique = true),
            sqlite_column!(
                "created",
                &SqlType::Integer,
                default_value = Some(DEFAULT_TIMESTAMP)
            ),
        ],
        indices: &[("idx_things_id", "id")],
        unique_constraints: &[],
    };

    const THINGS_V_1: Table = Table {
        name: "things",
        columns: &[
            sqlite_column!("seq", &SqlType::Integer, is_primary_key = true),
            sqlite_column!("id", &SqlType::Text, non_null = true, is_unique = true),
            sqlite_column!(
                "created",
                &SqlType::Integer,
                default_value = Some(DEFAULT_TIMESTAMP)
            ),
            sqlite_column!("owner", &SqlType::Text),
        ],
        indices: &[("idx_things_id", "id")],
        unique_constraints: &[&["id", "owner"]],
    };

    const SCHEMAS: &[VersionedSchema] = &[
        VersionedSchema {
            version: 0,
            tables: &[THINGS_V_0],
            migration: None,
        },
        VersionedSchema {
            version: 1,
            tables: &[THINGS_V_1],
            migration: Some(|conn: &Connection| {
                conn.execute("ALTER TABLE things ADD COLUMN owner TEXT", [])?;
                Ok(())
            }),
        },
    ];

    #[test]
    fn renders_create_statement() {
        let sql = THINGS_V_1.create_sql();
        assert_eq!(
            sql,
            "CREATE TABLE things (seq INTEGER PRIMARY KEY, id TEXT NOT NULL UNIQUE, \
             created INTEGER DEFAULT (cast(strftime('%s','now') as int)), owner TEXT, \
             UNIQUE (id, owner));"
        );
    }

    #[test]
    fn creates_latest_schema_on_empty_db() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate_if_needed(&mut conn, SCHEMAS).unwrap();

        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, (BASE_DB_VERSION + 1) as i64);
        SCHEMAS[1].validate(&conn).unwrap();
    }

    #[test]
    fn migrates_old_schema() {
        let mut conn = Connection::open_in_memory().unwrap();
        SCHEMAS[0].create(&conn).unwrap();
        conn.execute("INSERT INTO things (id) VALUES ('a')", [])
            .unwrap();

        migrate_if_needed(&mut conn, SCHEMAS).unwrap();

        SCHEMAS[1].validate(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM things", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn rejects_foreign_database() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE other (x INTEGER)", []).unwrap();
        assert!(migrate_if_needed(&mut conn, SCHEMAS).is_err());
    }

    #[test]
    fn validation_detects_column_mismatch() {
        let conn = Connection::open_in_memory().unwrap();
        SCHEMAS[0].create(&conn).unwrap();
        assert!(SCHEMAS[1].validate(&conn).is_err());
    }
}
