use crate::config::Config;
use crate::embed;
use crate::model::{DbStats, Edge, Entity, Skeleton};
use crate::util;
use anyhow::{Context, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

mod migrations;

const ENTITY_COLUMNS: &str =
    "id, type, file_path, name, start_line, end_line, signature, docstring, last_updated";

#[derive(Debug)]
struct ConnectionCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.busy_timeout(Duration::from_secs(30))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        Ok(())
    }

    fn on_release(&self, _conn: Connection) {}
}

/// SQLite-backed graph store. One writer connection behind a mutex,
/// reads through an r2d2 pool; WAL keeps readers live during writes.
pub struct Db {
    db_path: PathBuf,
    write_conn: Arc<Mutex<Connection>>,
    read_pool: Pool<SqliteConnectionManager>,
}

impl Db {
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create db directory {}", parent.display()))?;
        }

        let config = Config::get();

        // Open write connection first and run migrations
        let write_conn = Connection::open(db_path)
            .with_context(|| format!("open sqlite db at {}", db_path.display()))?;
        write_conn.busy_timeout(Duration::from_secs(30))?;
        write_conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;
        migrations::migrate(&write_conn)?;

        let write_conn = Arc::new(Mutex::new(write_conn));

        let manager = SqliteConnectionManager::file(db_path);
        let read_pool = Pool::builder()
            .max_size(config.pool_size)
            .min_idle(Some(config.pool_min_idle))
            .connection_timeout(Duration::from_secs(30))
            .connection_customizer(Box::new(ConnectionCustomizer))
            .build(manager)
            .with_context(|| "create connection pool")?;

        Ok(Self {
            db_path: db_path.to_path_buf(),
            write_conn,
            read_pool,
        })
    }

    /// Get the database file path
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn read_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.read_pool
            .get()
            .with_context(|| "get read connection from pool")
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.write_conn.lock().unwrap()
    }

    pub fn upsert_entity(&self, entity: &Entity, embedding: Option<&[f32]>) -> Result<()> {
        let blob = embedding.map(embedding_to_blob);
        self.conn().execute(
            "INSERT OR REPLACE INTO entities
             (id, type, file_path, name, start_line, end_line, signature, docstring, embedding, last_updated)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                entity.id,
                entity.kind,
                entity.file_path,
                entity.name,
                entity.start_line,
                entity.end_line,
                entity.signature.as_deref(),
                entity.docstring.as_deref(),
                blob,
                util::unix_now(),
            ],
        )?;
        Ok(())
    }

    pub fn upsert_entities(&self, rows: &[(Entity, Option<Vec<f32>>)]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO entities
                 (id, type, file_path, name, start_line, end_line, signature, docstring, embedding, last_updated)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            let now = util::unix_now();
            for (entity, embedding) in rows {
                let blob = embedding.as_deref().map(embedding_to_blob);
                stmt.execute(params![
                    entity.id,
                    entity.kind,
                    entity.file_path,
                    entity.name,
                    entity.start_line,
                    entity.end_line,
                    entity.signature.as_deref(),
                    entity.docstring.as_deref(),
                    blob,
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_entity(&self, entity_id: &str) -> Result<Option<Entity>> {
        let conn = self.read_conn()?;
        let entity = conn
            .query_row(
                &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = ?"),
                params![entity_id],
                entity_from_row,
            )
            .optional()?;
        Ok(entity)
    }

    pub fn get_entities_by_file(&self, file_path: &str) -> Result<Vec<Entity>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE file_path = ? ORDER BY start_line"
        ))?;
        let rows = stmt.query_map(params![file_path], entity_from_row)?;
        let mut entities = Vec::new();
        for row in rows {
            entities.push(row?);
        }
        Ok(entities)
    }

    pub fn get_embedding(&self, entity_id: &str) -> Result<Option<Vec<f32>>> {
        let conn = self.read_conn()?;
        let blob: Option<Option<Vec<u8>>> = conn
            .query_row(
                "SELECT embedding FROM entities WHERE id = ?",
                params![entity_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(blob.flatten().map(|b| blob_to_embedding(&b)))
    }

    pub fn delete_entities_by_file(&self, file_path: &str) -> Result<usize> {
        let deleted = self.conn().execute(
            "DELETE FROM entities WHERE file_path = ?",
            params![file_path],
        )?;
        Ok(deleted)
    }

    /// Delete every edge whose source entity lives in the given file.
    /// Matches on the id prefix so edges survive even when their source
    /// row is already gone. Underscores are LIKE wildcards, hence the
    /// ESCAPE clause.
    pub fn delete_edges_by_file(&self, file_path: &str) -> Result<usize> {
        let escaped = escape_like(file_path);
        let deleted = self.conn().execute(
            "DELETE FROM edges
             WHERE source_id LIKE ? ESCAPE '\\'
                OR source_id LIKE ? ESCAPE '\\'
                OR source_id LIKE ? ESCAPE '\\'",
            params![
                format!("func:{escaped}:%"),
                format!("method:{escaped}:%"),
                format!("class:{escaped}:%"),
            ],
        )?;
        Ok(deleted)
    }

    pub fn upsert_edge(&self, edge: &Edge) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO edges (source_id, relation, target_id, context)
             VALUES (?, ?, ?, ?)",
            params![
                edge.source_id,
                edge.relation,
                edge.target_id,
                edge.context.as_deref()
            ],
        )?;
        Ok(())
    }

    pub fn upsert_edges(&self, edges: &[Edge]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO edges (source_id, relation, target_id, context)
                 VALUES (?, ?, ?, ?)",
            )?;
            for edge in edges {
                stmt.execute(params![
                    edge.source_id,
                    edge.relation,
                    edge.target_id,
                    edge.context.as_deref()
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_edges_by_source(
        &self,
        source_id: &str,
        relation: Option<&str>,
    ) -> Result<Vec<Edge>> {
        let conn = self.read_conn()?;
        let mut edges = Vec::new();
        match relation {
            Some(rel) => {
                let mut stmt = conn.prepare(
                    "SELECT source_id, relation, target_id, context
                     FROM edges WHERE source_id = ? AND relation = ?",
                )?;
                let rows = stmt.query_map(params![source_id, rel], edge_from_row)?;
                for row in rows {
                    edges.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT source_id, relation, target_id, context
                     FROM edges WHERE source_id = ?",
                )?;
                let rows = stmt.query_map(params![source_id], edge_from_row)?;
                for row in rows {
                    edges.push(row?);
                }
            }
        }
        Ok(edges)
    }

    pub fn get_edges_by_target(
        &self,
        target_id: &str,
        relation: Option<&str>,
    ) -> Result<Vec<Edge>> {
        let conn = self.read_conn()?;
        let mut edges = Vec::new();
        match relation {
            Some(rel) => {
                let mut stmt = conn.prepare(
                    "SELECT source_id, relation, target_id, context
                     FROM edges WHERE target_id = ? AND relation = ?",
                )?;
                let rows = stmt.query_map(params![target_id, rel], edge_from_row)?;
                for row in rows {
                    edges.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT source_id, relation, target_id, context
                     FROM edges WHERE target_id = ?",
                )?;
                let rows = stmt.query_map(params![target_id], edge_from_row)?;
                for row in rows {
                    edges.push(row?);
                }
            }
        }
        Ok(edges)
    }

    pub fn get_edges_by_relation(&self, relation: &str) -> Result<Vec<Edge>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(
            "SELECT source_id, relation, target_id, context
             FROM edges WHERE relation = ?",
        )?;
        let rows = stmt.query_map(params![relation], edge_from_row)?;
        let mut edges = Vec::new();
        for row in rows {
            edges.push(row?);
        }
        Ok(edges)
    }

    /// Cosine-similarity scan over all rows with a stored embedding.
    /// Zero-norm vectors on either side never rank.
    pub fn search_entities_by_embedding(
        &self,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<(Entity, f32)>> {
        let mut scored: Vec<(String, f32)> = Vec::new();
        {
            let conn = self.read_conn()?;
            let mut stmt =
                conn.prepare("SELECT id, embedding FROM entities WHERE embedding IS NOT NULL")?;
            let rows = stmt.query_map([], |row| {
                let id: String = row.get(0)?;
                let blob: Vec<u8> = row.get(1)?;
                Ok((id, blob))
            })?;
            for row in rows {
                let (id, blob) = row?;
                let embedding = blob_to_embedding(&blob);
                if let Some(score) = embed::cosine_similarity(query, &embedding) {
                    scored.push((id, score));
                }
            }
        }

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(limit);

        let mut results = Vec::with_capacity(scored.len());
        for (id, score) in scored {
            if let Some(entity) = self.get_entity(&id)? {
                results.push((entity, score));
            }
        }
        Ok(results)
    }

    pub fn upsert_skeleton(&self, file_path: &str, content: &str, last_modified: f64) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO skeletons (file_path, content, last_modified)
             VALUES (?, ?, ?)",
            params![file_path, content, last_modified],
        )?;
        Ok(())
    }

    pub fn get_skeleton(&self, file_path: &str) -> Result<Option<Skeleton>> {
        let conn = self.read_conn()?;
        let skeleton = conn
            .query_row(
                "SELECT file_path, content, last_modified FROM skeletons WHERE file_path = ?",
                params![file_path],
                |row| {
                    Ok(Skeleton {
                        file_path: row.get(0)?,
                        content: row.get(1)?,
                        last_modified: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(skeleton)
    }

    pub fn delete_skeleton(&self, file_path: &str) -> Result<()> {
        self.conn().execute(
            "DELETE FROM skeletons WHERE file_path = ?",
            params![file_path],
        )?;
        Ok(())
    }

    pub fn list_files(&self) -> Result<Vec<String>> {
        let conn = self.read_conn()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT file_path FROM entities ORDER BY file_path")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }

    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.read_conn()?;
        let entities: i64 = conn.query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))?;
        let edges: i64 = conn.query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?;
        let skeletons: i64 =
            conn.query_row("SELECT COUNT(*) FROM skeletons", [], |row| row.get(0))?;
        let files: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT file_path) FROM entities",
            [],
            |row| row.get(0),
        )?;

        let mut relations = BTreeMap::new();
        let mut stmt =
            conn.prepare("SELECT relation, COUNT(*) FROM edges GROUP BY relation")?;
        let rows = stmt.query_map([], |row| {
            let relation: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((relation, count))
        })?;
        for row in rows {
            let (relation, count) = row?;
            relations.insert(relation, count);
        }

        Ok(DbStats {
            entities,
            edges,
            skeletons,
            files,
            relations,
        })
    }
}

fn entity_from_row(row: &Row) -> rusqlite::Result<Entity> {
    Ok(Entity {
        id: row.get(0)?,
        kind: row.get(1)?,
        file_path: row.get(2)?,
        name: row.get(3)?,
        start_line: row.get(4)?,
        end_line: row.get(5)?,
        signature: row.get(6)?,
        docstring: row.get(7)?,
        last_updated: row.get(8)?,
    })
}

fn edge_from_row(row: &Row) -> rusqlite::Result<Edge> {
    Ok(Edge {
        source_id: row.get(0)?,
        relation: row.get(1)?,
        target_id: row.get(2)?,
        context: row.get(3)?,
    })
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Little-endian f32 encoding for the entities.embedding column.
pub fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

pub fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
