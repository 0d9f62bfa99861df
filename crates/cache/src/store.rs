//! SQLite durable tier (WAL mode). Each method is its own statement or
//! transaction; nothing spans two logical cache operations.

use crate::error::Result;
use crate::types::{AccessPattern, CoOccurrence};
use context_protocol::CacheCounters;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub struct DurableStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore").field("path", &self.path).finish()
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

impl DurableStore {
    /// Open (or create) the database, enable WAL mode and initialise the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        configure_connection(&conn)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Merkle trees ─────────────────────────────────────────────────────────

    pub fn save_tree(
        &self,
        workspace: &str,
        revision: &str,
        tree_json: &str,
        root_hash: &str,
        file_count: usize,
        now_ms: u64,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO merkle_trees (workspace, revision, tree_json, root_hash, file_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(workspace, revision) DO UPDATE SET
                tree_json = excluded.tree_json,
                root_hash = excluded.root_hash,
                file_count = excluded.file_count,
                created_at = excluded.created_at",
            params![
                workspace,
                revision,
                tree_json,
                root_hash,
                to_i64(file_count as u64),
                to_i64(now_ms)
            ],
        )?;
        Ok(())
    }

    pub fn load_tree(&self, workspace: &str, revision: &str) -> Result<Option<String>> {
        let row = self
            .conn()
            .query_row(
                "SELECT tree_json FROM merkle_trees WHERE workspace = ?1 AND revision = ?2",
                params![workspace, revision],
                |row| row.get(0),
            )
            .optional()?;
        Ok(row)
    }

    // ── Parsed files ─────────────────────────────────────────────────────────

    pub fn save_parsed(
        &self,
        path: &str,
        content_hash: &str,
        symbols_json: &str,
        language: &str,
        parse_duration_ms: u64,
        now_ms: u64,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO parsed_files
                (path, content_hash, symbols_json, language, parse_duration_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                path,
                content_hash,
                symbols_json,
                language,
                to_i64(parse_duration_ms),
                to_i64(now_ms)
            ],
        )?;
        Ok(())
    }

    pub fn load_parsed(&self, path: &str, content_hash: &str) -> Result<Option<String>> {
        let row = self
            .conn()
            .query_row(
                "SELECT symbols_json FROM parsed_files WHERE path = ?1 AND content_hash = ?2",
                params![path, content_hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(row)
    }

    pub fn delete_parsed_path(&self, path: &str) -> Result<usize> {
        Ok(self
            .conn()
            .execute("DELETE FROM parsed_files WHERE path = ?1", params![path])?)
    }

    // ── Code maps ────────────────────────────────────────────────────────────

    pub fn save_code_map(
        &self,
        workspace: &str,
        state_hash: &str,
        map_json: &str,
        file_count: usize,
        symbol_count: usize,
        now_ms: u64,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO code_maps
                (workspace, state_hash, map_json, file_count, symbol_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                workspace,
                state_hash,
                map_json,
                to_i64(file_count as u64),
                to_i64(symbol_count as u64),
                to_i64(now_ms)
            ],
        )?;
        Ok(())
    }

    pub fn load_code_map(&self, workspace: &str, state_hash: &str) -> Result<Option<String>> {
        let row = self
            .conn()
            .query_row(
                "SELECT map_json FROM code_maps WHERE workspace = ?1 AND state_hash = ?2",
                params![workspace, state_hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(row)
    }

    /// Drop trees and code maps for one workspace.
    pub fn delete_workspace(&self, workspace: &str) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let trees = tx.execute(
            "DELETE FROM merkle_trees WHERE workspace = ?1",
            params![workspace],
        )?;
        let maps = tx.execute("DELETE FROM code_maps WHERE workspace = ?1", params![workspace])?;
        tx.commit()?;
        Ok(trees + maps)
    }

    // ── Metrics ──────────────────────────────────────────────────────────────

    pub fn bump_metric(&self, operation: &str, hit: bool) -> Result<()> {
        let (hits, misses) = if hit { (1, 0) } else { (0, 1) };
        self.conn().execute(
            "INSERT INTO cache_metrics (operation, hit_count, miss_count) VALUES (?1, ?2, ?3)
             ON CONFLICT(operation) DO UPDATE SET
                hit_count = hit_count + excluded.hit_count,
                miss_count = miss_count + excluded.miss_count",
            params![operation, hits, misses],
        )?;
        Ok(())
    }

    pub fn load_metrics(&self) -> Result<Vec<(String, CacheCounters)>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT operation, hit_count, miss_count FROM cache_metrics")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                CacheCounters {
                    hits: to_u64(row.get(1)?),
                    misses: to_u64(row.get(2)?),
                },
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn reset_metrics(&self) -> Result<()> {
        self.conn().execute("DELETE FROM cache_metrics", [])?;
        Ok(())
    }

    // ── Learning history ─────────────────────────────────────────────────────

    /// Insert a pattern or bump the frequency of an identical (task, files) one.
    pub fn record_access_pattern(&self, files_json: &str, task: &str, now_ms: u64) -> Result<()> {
        self.conn().execute(
            "INSERT INTO access_patterns (files_json, task, frequency, first_seen, last_access)
             VALUES (?1, ?2, 1, ?3, ?3)
             ON CONFLICT(files_json, task) DO UPDATE SET
                frequency = frequency + 1,
                last_access = excluded.last_access",
            params![files_json, task, to_i64(now_ms)],
        )?;
        Ok(())
    }

    pub fn load_access_patterns(&self, limit: usize) -> Result<Vec<AccessPattern>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT files_json, task, frequency, first_seen, last_access
             FROM access_patterns ORDER BY last_access DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![to_i64(limit as u64)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (files_json, task, frequency, first_seen, last_access) = row?;
            let files: Vec<String> = match serde_json::from_str(&files_json) {
                Ok(files) => files,
                Err(err) => {
                    log::warn!("Skipping malformed access pattern: {err}");
                    continue;
                }
            };
            out.push(AccessPattern {
                files,
                task,
                frequency: u32::try_from(frequency).unwrap_or(u32::MAX),
                first_seen_ms: to_u64(first_seen),
                last_access_ms: to_u64(last_access),
            });
        }
        Ok(out)
    }

    pub fn prune_access_patterns(&self, older_than_ms: u64) -> Result<usize> {
        Ok(self.conn().execute(
            "DELETE FROM access_patterns WHERE last_access < ?1",
            params![to_i64(older_than_ms)],
        )?)
    }

    /// Increment every pair in one transaction; pairs must already be ordered.
    pub fn increment_cooccurrence(&self, pairs: &[(String, String)], now_ms: u64) -> Result<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO file_cooccurrence (file_a, file_b, count, updated_at)
                 VALUES (?1, ?2, 1, ?3)
                 ON CONFLICT(file_a, file_b) DO UPDATE SET
                    count = count + 1,
                    updated_at = excluded.updated_at",
            )?;
            for (a, b) in pairs {
                stmt.execute(params![a, b, to_i64(now_ms)])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_cooccurrence(&self) -> Result<Vec<CoOccurrence>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT file_a, file_b, count, updated_at FROM file_cooccurrence")?;
        let rows = stmt.query_map([], |row| {
            Ok(CoOccurrence {
                file_a: row.get(0)?,
                file_b: row.get(1)?,
                count: to_u64(row.get(2)?),
                updated_ms: to_u64(row.get(3)?),
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn clear_all(&self) -> Result<()> {
        self.conn().execute_batch(
            "DELETE FROM merkle_trees;
             DELETE FROM parsed_files;
             DELETE FROM code_maps;
             DELETE FROM cache_metrics;
             DELETE FROM access_patterns;
             DELETE FROM file_cooccurrence;",
        )?;
        Ok(())
    }
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         PRAGMA busy_timeout=2500;",
    )?;
    Ok(())
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS merkle_trees (
            workspace  TEXT    NOT NULL,
            revision   TEXT    NOT NULL,
            tree_json  TEXT    NOT NULL,
            root_hash  TEXT    NOT NULL,
            file_count INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (workspace, revision)
         );
         CREATE TABLE IF NOT EXISTS parsed_files (
            path              TEXT    NOT NULL,
            content_hash      TEXT    NOT NULL,
            symbols_json      TEXT    NOT NULL,
            language          TEXT    NOT NULL,
            parse_duration_ms INTEGER NOT NULL,
            created_at        INTEGER NOT NULL,
            PRIMARY KEY (path, content_hash)
         );
         CREATE TABLE IF NOT EXISTS code_maps (
            workspace    TEXT    NOT NULL,
            state_hash   TEXT    NOT NULL,
            map_json     TEXT    NOT NULL,
            file_count   INTEGER NOT NULL,
            symbol_count INTEGER NOT NULL,
            created_at   INTEGER NOT NULL,
            PRIMARY KEY (workspace, state_hash)
         );
         CREATE TABLE IF NOT EXISTS cache_metrics (
            operation  TEXT    PRIMARY KEY,
            hit_count  INTEGER NOT NULL DEFAULT 0,
            miss_count INTEGER NOT NULL DEFAULT 0
         );
         CREATE TABLE IF NOT EXISTS access_patterns (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            files_json  TEXT    NOT NULL,
            task        TEXT    NOT NULL,
            frequency   INTEGER NOT NULL DEFAULT 1,
            first_seen  INTEGER NOT NULL,
            last_access INTEGER NOT NULL,
            UNIQUE (files_json, task)
         );
         CREATE TABLE IF NOT EXISTS file_cooccurrence (
            file_a     TEXT    NOT NULL,
            file_b     TEXT    NOT NULL,
            count      INTEGER NOT NULL DEFAULT 0,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (file_a, file_b)
         );
         CREATE INDEX IF NOT EXISTS idx_parsed_path
             ON parsed_files(path);
         CREATE INDEX IF NOT EXISTS idx_access_last
             ON access_patterns(last_access);",
    )?;
    Ok(())
}
