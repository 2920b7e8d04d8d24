use crate::db::Db;
use crate::embed::Embedder;
use crate::model::{BuildStats, Entity};
use crate::parser::PythonParser;
use crate::util;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::Instant;

mod scan;

pub use scan::{ScannedFile, is_indexable, scan_repo};

/// Keeps the graph store in sync with the files on disk. Owns its
/// parser; the store and embedder are shared with the other components.
pub struct GraphBuilder<'a> {
    db: &'a Db,
    embedder: &'a Embedder,
    parser: PythonParser,
    repo_root: PathBuf,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(db: &'a Db, embedder: &'a Embedder, repo_root: &Path) -> Result<Self> {
        Ok(GraphBuilder {
            db,
            embedder,
            parser: PythonParser::new()?,
            repo_root: repo_root.to_path_buf(),
        })
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Scan and index every Python file under the repo root.
    pub fn full_index(&mut self) -> Result<BuildStats> {
        let start = Instant::now();
        let files = scan::scan_repo(&self.repo_root)?;

        let mut stats = BuildStats::default();
        for file in &files {
            match self.index_file(&file.abs_path) {
                Ok(Some((entities, edges))) => {
                    stats.indexed += 1;
                    stats.entities += entities;
                    stats.edges += edges;
                }
                Ok(None) => stats.skipped += 1,
                Err(err) => {
                    eprintln!("cnav: error indexing {}: {err:#}", file.rel_path);
                    stats.errors += 1;
                }
            }
        }
        stats.duration_ms = start.elapsed().as_millis() as u64;
        Ok(stats)
    }

    /// Parse one file and replace its slice of the graph: old entities
    /// and edges go, fresh rows with embeddings come in, the skeleton
    /// cache row is invalidated. Returns the (entity, edge) counts, or
    /// None when the path is not an indexable Python file.
    pub fn index_file(&mut self, path: &Path) -> Result<Option<(usize, usize)>> {
        let Ok(rel_path) = util::normalize_rel_path(&self.repo_root, path) else {
            return Ok(None);
        };
        if !scan::is_indexable(&rel_path) {
            return Ok(None);
        }
        if !path.exists() {
            return Ok(None);
        }

        let source = util::read_to_string(path)?;
        let parsed = self.parser.parse_source(&rel_path, &source)?;

        self.db.delete_edges_by_file(&rel_path)?;
        self.db.delete_entities_by_file(&rel_path)?;

        let rows: Vec<(Entity, Option<Vec<f32>>)> = parsed
            .entities
            .into_iter()
            .map(|entity| {
                let embedding = self.embedder.embed_entity(&entity);
                (entity, Some(embedding))
            })
            .collect();
        let entity_count = rows.len();
        if !rows.is_empty() {
            self.db.upsert_entities(&rows)?;
        }

        let edge_count = parsed.edges.len();
        if !parsed.edges.is_empty() {
            self.db.upsert_edges(&parsed.edges)?;
        }

        self.db.delete_skeleton(&rel_path)?;

        Ok(Some((entity_count, edge_count)))
    }

    /// Drop everything recorded for a path: entities, edges, skeleton.
    pub fn remove_file(&self, path: &Path) -> Result<()> {
        let Ok(rel_path) = util::normalize_rel_path(&self.repo_root, path) else {
            return Ok(());
        };
        self.db.delete_edges_by_file(&rel_path)?;
        self.db.delete_entities_by_file(&rel_path)?;
        self.db.delete_skeleton(&rel_path)?;
        Ok(())
    }
}
