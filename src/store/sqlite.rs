//! SQLite persistence for the quality model.
//!
//! One load at the start of a merge run, one atomic save at its end. Saves
//! upsert the full state inside a single transaction and only touch rows
//! whose values actually changed, so an idempotent re-run leaves the
//! database bytes (including `updated_at`) untouched.

use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, Row, params};

use crate::error::Result;
use crate::model::{Characteristic, Edge, ModelState, Requirement, RuleIdentity};
use crate::store::migrations;

/// SQLite-backed model store.
pub struct ModelStore {
    conn: Connection,
    schema_version: u32,
}

impl std::fmt::Debug for ModelStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelStore")
            .field("schema_version", &self.schema_version)
            .finish_non_exhaustive()
    }
}

impl ModelStore {
    /// Open the store at the given path, creating schema as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// In-memory store, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        Self::configure_pragmas(&conn)?;
        let schema_version = migrations::run_migrations(&conn)?;
        Ok(Self {
            conn,
            schema_version,
        })
    }

    fn configure_pragmas(conn: &Connection) -> Result<()> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(())
    }

    /// Current schema version after migrations.
    #[must_use]
    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Load the full persisted model.
    pub fn load(&self) -> Result<ModelState> {
        let mut state = ModelState::default();

        let mut stmt = self.conn.prepare(
            "SELECT key, name, parent_key, enabled FROM characteristics ORDER BY key",
        )?;
        let rows = stmt.query_map([], characteristic_from_row)?;
        for row in rows {
            let c = row?;
            state.characteristics.insert(c.key.clone(), c);
        }

        let mut stmt = self.conn.prepare(
            "SELECT parent_key, child_key, ordinal FROM characteristic_edges \
             ORDER BY parent_key, ordinal",
        )?;
        let rows = stmt.query_map([], edge_from_row)?;
        for row in rows {
            let e = row?;
            state
                .edges
                .insert((e.parent_key.clone(), e.child_key.clone()), e);
        }

        let mut stmt = self.conn.prepare(
            "SELECT characteristic_key, repository_key, rule_key, rule_id, \
             properties_json, enabled FROM requirements \
             ORDER BY characteristic_key, repository_key, rule_key",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let r = requirement_from_row(row)?;
            state.requirements.insert(r.key(), r);
        }

        Ok(state)
    }

    /// Persist the full state as one atomic unit.
    ///
    /// Rows are upserted, never deleted; soft-deletion is just `enabled = 0`
    /// flowing through from the state.
    pub fn save(&mut self, state: &ModelState) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        // Characteristics may reference parents that sort after them; check
        // foreign keys at commit instead of per statement.
        tx.pragma_update(None, "defer_foreign_keys", "ON")?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO characteristics (key, name, parent_key, enabled, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5) \
                 ON CONFLICT(key) DO UPDATE SET \
                    name = excluded.name, \
                    parent_key = excluded.parent_key, \
                    enabled = excluded.enabled, \
                    updated_at = excluded.updated_at \
                 WHERE name IS NOT excluded.name \
                    OR parent_key IS NOT excluded.parent_key \
                    OR enabled IS NOT excluded.enabled",
            )?;
            for c in state.characteristics.values() {
                stmt.execute(params![c.key, c.name, c.parent_key, c.enabled, now])?;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO characteristic_edges (parent_key, child_key, ordinal) \
                 VALUES (?1, ?2, ?3) \
                 ON CONFLICT(parent_key, child_key) DO UPDATE SET \
                    ordinal = excluded.ordinal \
                 WHERE ordinal IS NOT excluded.ordinal",
            )?;
            for e in state.edges.values() {
                stmt.execute(params![e.parent_key, e.child_key, e.ordinal])?;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO requirements (characteristic_key, repository_key, rule_key, \
                    rule_id, properties_json, enabled, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7) \
                 ON CONFLICT(characteristic_key, repository_key, rule_key) DO UPDATE SET \
                    rule_id = excluded.rule_id, \
                    properties_json = excluded.properties_json, \
                    enabled = excluded.enabled, \
                    updated_at = excluded.updated_at \
                 WHERE rule_id IS NOT excluded.rule_id \
                    OR properties_json IS NOT excluded.properties_json \
                    OR enabled IS NOT excluded.enabled",
            )?;
            for r in state.requirements.values() {
                let properties_json = serde_json::to_string(&r.properties)?;
                stmt.execute(params![
                    r.characteristic_key,
                    r.rule.repository,
                    r.rule.key,
                    r.rule.id,
                    properties_json,
                    r.enabled,
                    now
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Get a reference to the connection, mostly for test assertions.
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

fn characteristic_from_row(row: &Row<'_>) -> rusqlite::Result<Characteristic> {
    Ok(Characteristic {
        key: row.get(0)?,
        name: row.get(1)?,
        parent_key: row.get(2)?,
        enabled: row.get(3)?,
    })
}

fn edge_from_row(row: &Row<'_>) -> rusqlite::Result<Edge> {
    Ok(Edge {
        parent_key: row.get(0)?,
        child_key: row.get(1)?,
        ordinal: row.get(2)?,
    })
}

fn requirement_from_row(row: &Row<'_>) -> Result<Requirement> {
    let properties_json: String = row.get(4)?;
    Ok(Requirement {
        characteristic_key: row.get(0)?,
        rule: RuleIdentity {
            repository: row.get(1)?,
            key: row.get(2)?,
            id: row.get(3)?,
        },
        properties: serde_json::from_str(&properties_json)?,
        enabled: row.get(5)?,
    })
}
