use crate::config::Config;
use crate::db::Db;
use crate::embed::Embedder;
use crate::graph::FlowEngine;
use crate::model::{CodeWindow, Entity, SearchResult};
use crate::parser::PythonParser;
use crate::search::SearchEngine;
use crate::util;
use anyhow::Result;
use clap::ValueEnum;
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
pub enum SearchMode {
    Hybrid,
    Lexical,
    Semantic,
}

#[derive(ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
pub enum TraceDirection {
    Upstream,
    Downstream,
    Inheritance,
}

/// The navigation surface behind the CLI: ranked search, causal traces,
/// cached skeletons, and per-entity source windows. File paths in and
/// out are repo-relative, matching the stored ids.
pub struct Tools<'a> {
    db: &'a Db,
    embedder: &'a Embedder,
    parser: PythonParser,
    repo_root: PathBuf,
}

impl<'a> Tools<'a> {
    pub fn new(db: &'a Db, embedder: &'a Embedder, repo_root: &Path) -> Result<Self> {
        Ok(Tools {
            db,
            embedder,
            parser: PythonParser::new()?,
            repo_root: repo_root.to_path_buf(),
        })
    }

    pub fn search(&self, query: &str, limit: usize, mode: SearchMode) -> Result<Vec<SearchResult>> {
        let engine = SearchEngine::new(self.db, self.embedder, &self.repo_root);
        let scored = match mode {
            SearchMode::Hybrid => engine.search(query, limit)?,
            SearchMode::Lexical => engine.lexical_only(query, limit)?,
            SearchMode::Semantic => engine.semantic_only(query, limit)?,
        };
        Ok(scored
            .iter()
            .map(|(entity, score)| search_result(entity, *score))
            .collect())
    }

    pub fn trace(&self, entity_id: &str, direction: TraceDirection, depth: u32) -> Result<Value> {
        let engine = FlowEngine::new(self.db);
        let value = match direction {
            TraceDirection::Upstream => {
                serde_json::to_value(engine.traverse_upstream(entity_id, depth)?)?
            }
            TraceDirection::Downstream => {
                serde_json::to_value(engine.traverse_downstream(entity_id, depth)?)?
            }
            TraceDirection::Inheritance => {
                serde_json::to_value(engine.inheritance_chain(entity_id)?)?
            }
        };
        Ok(value)
    }

    /// Skeleton for one file. The cached row is served as long as the
    /// file's mtime has not moved past the row's `last_modified`;
    /// otherwise the skeleton is regenerated and the cache refreshed.
    pub fn skeleton(&mut self, file: &Path) -> Result<String> {
        let rel = self.rel_path(file)?;
        let abs = util::to_abs_path(&self.repo_root, &rel);
        let mtime = util::file_mtime(&abs);

        if Config::get().skeleton_cache {
            if let Some(cached) = self.db.get_skeleton(&rel)? {
                if let Some(mtime) = mtime {
                    if mtime <= cached.last_modified {
                        return Ok(cached.content);
                    }
                }
            }
        }

        let source = util::read_to_string(&abs)?;
        let content = self.parser.generate_skeleton(&rel, &source)?;
        if let Some(mtime) = mtime {
            if let Err(err) = self.db.upsert_skeleton(&rel, &content, mtime) {
                eprintln!("cnav: skeleton cache write failed for {rel}: {err:#}");
            }
        }
        Ok(content)
    }

    /// The entity's source with `context_lines` of context either side,
    /// each line rendered `%4d | content`. None when the id has no
    /// stored row.
    pub fn window(&self, entity_id: &str, context_lines: i64) -> Result<Option<CodeWindow>> {
        let Some(entity) = self.db.get_entity(entity_id)? else {
            return Ok(None);
        };
        let abs = util::to_abs_path(&self.repo_root, &entity.file_path);
        let source = util::read_to_string(&abs)?;
        let lines: Vec<&str> = source.lines().collect();

        let context_end = ((entity.end_line + context_lines).max(0) as usize).min(lines.len());
        let context_start =
            ((entity.start_line - 1 - context_lines).max(0) as usize).min(context_end);

        let mut rendered = Vec::with_capacity(context_end - context_start);
        for (offset, line) in lines[context_start..context_end].iter().enumerate() {
            let line_num = context_start + offset + 1;
            rendered.push(format!("{line_num:4} | {line}"));
        }

        Ok(Some(CodeWindow {
            entity_id: entity_id.to_string(),
            file: entity.file_path,
            start: entity.start_line,
            end: entity.end_line,
            code: rendered.join("\n"),
        }))
    }

    fn rel_path(&self, path: &Path) -> Result<String> {
        if path.is_absolute() {
            util::normalize_rel_path(&self.repo_root, path)
        } else {
            Ok(util::normalize_path(path))
        }
    }
}

fn search_result(entity: &Entity, score: f64) -> SearchResult {
    SearchResult {
        id: entity.id.clone(),
        score: (score * 100.0).round() / 100.0,
        sig: entity.signature.clone().unwrap_or_default(),
        file: entity.file_path.clone(),
        line: entity.start_line,
    }
}
