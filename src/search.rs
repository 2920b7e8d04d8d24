use crate::config::Config;
use crate::db::Db;
use crate::embed::Embedder;
use crate::model::Entity;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

// Rank assigned to an entity absent from one stream; far beyond any
// real position so single-stream hits still score.
const MISSING_RANK: usize = 1000;

/// One line of `rg --json` output. Only `match` messages carry both a
/// path and a line number; everything else deserializes with gaps and
/// is skipped.
#[derive(Debug, Deserialize)]
struct RgMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: RgData,
}

#[derive(Debug, Default, Deserialize)]
struct RgData {
    path: Option<RgPath>,
    line_number: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RgPath {
    text: Option<String>,
}

/// Hybrid search over the graph store: ripgrep lexical hits fused with
/// embedding cosine ranks via Reciprocal Rank Fusion.
pub struct SearchEngine<'a> {
    db: &'a Db,
    embedder: &'a Embedder,
    repo_root: PathBuf,
    rrf_k: u32,
    timeout: Duration,
}

impl<'a> SearchEngine<'a> {
    pub fn new(db: &'a Db, embedder: &'a Embedder, repo_root: &Path) -> Self {
        let config = Config::get();
        SearchEngine {
            db,
            embedder,
            repo_root: repo_root.to_path_buf(),
            rrf_k: config.rrf_k,
            timeout: Duration::from_secs(u64::from(config.search_timeout_secs)),
        }
    }

    /// Fused search. Both streams run at `limit * 2`, ranks are fused,
    /// and the top `limit` ids are resolved against the store.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<(Entity, f64)>> {
        let wide = limit.saturating_mul(2);
        let lexical = self.lexical_search(query, wide)?;
        let semantic = self.semantic_search(query, wide)?;

        let lexical_ranks: HashMap<String, usize> = lexical
            .iter()
            .enumerate()
            .map(|(rank, (entity, _))| (entity.id.clone(), rank))
            .collect();
        let semantic_ranks: HashMap<String, usize> = semantic
            .iter()
            .enumerate()
            .map(|(rank, (entity, _))| (entity.id.clone(), rank))
            .collect();

        let fused = rrf_fuse(&lexical_ranks, &semantic_ranks, self.rrf_k);

        let mut results = Vec::new();
        for (entity_id, score) in fused.into_iter().take(limit) {
            if let Some(entity) = self.db.get_entity(&entity_id)? {
                results.push((entity, score));
            }
        }
        Ok(results)
    }

    pub fn lexical_only(&self, query: &str, limit: usize) -> Result<Vec<(Entity, f64)>> {
        self.lexical_search(query, limit)
    }

    pub fn semantic_only(&self, query: &str, limit: usize) -> Result<Vec<(Entity, f64)>> {
        self.semantic_search(query, limit)
    }

    /// Ripgrep over the repo, matches mapped onto entities by line
    /// range, scored by hit count. Any ripgrep failure degrades to an
    /// empty stream so semantic results still come back.
    fn lexical_search(&self, query: &str, limit: usize) -> Result<Vec<(Entity, f64)>> {
        let Some(stdout) = self.run_ripgrep(query)? else {
            return Ok(Vec::new());
        };

        let file_matches = parse_match_lines(&stdout);

        let mut entity_scores: HashMap<String, i64> = HashMap::new();
        for (file_path, line_nums) in &file_matches {
            let entities = self.db.get_entities_by_file(file_path)?;
            for entity in &entities {
                for line in line_nums {
                    if entity.start_line <= *line && *line <= entity.end_line {
                        *entity_scores.entry(entity.id.clone()).or_insert(0) += 1;
                    }
                }
            }
        }

        let mut ranked: Vec<(String, i64)> = entity_scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit);

        let mut results = Vec::new();
        for (entity_id, score) in ranked {
            if let Some(entity) = self.db.get_entity(&entity_id)? {
                results.push((entity, score as f64));
            }
        }
        Ok(results)
    }

    fn semantic_search(&self, query: &str, limit: usize) -> Result<Vec<(Entity, f64)>> {
        let query_embedding = self.embedder.embed_query(query);
        let hits = self.db.search_entities_by_embedding(&query_embedding, limit)?;
        Ok(hits
            .into_iter()
            .map(|(entity, score)| (entity, f64::from(score)))
            .collect())
    }

    /// Runs `rg --json -i <query> --type py` in the repo root. Returns
    /// None (degrade) when the binary is missing, the run times out, or
    /// it exits with anything other than 0 (found) / 1 (no matches).
    fn run_ripgrep(&self, query: &str) -> Result<Option<String>> {
        let spawned = Command::new("rg")
            .args(["--json", "-i", query, "--type", "py"])
            .current_dir(&self.repo_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                eprintln!("cnav: Warning: ripgrep not found, lexical search disabled");
                return Ok(None);
            }
            Err(err) => return Err(err).context("spawn ripgrep"),
        };

        let mut stdout = child.stdout.take().context("capture ripgrep stdout")?;
        let (tx, rx) = mpsc::channel();
        let reader = thread::spawn(move || {
            let mut buf = String::new();
            let _ = stdout.read_to_string(&mut buf);
            let _ = tx.send(buf);
        });

        let buf = match rx.recv_timeout(self.timeout) {
            Ok(buf) => buf,
            Err(_) => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = reader.join();
                eprintln!(
                    "cnav: Warning: ripgrep timed out after {}s, lexical results dropped",
                    self.timeout.as_secs()
                );
                return Ok(None);
            }
        };
        let _ = reader.join();
        let status = child.wait().context("wait for ripgrep")?;

        match status.code() {
            Some(0) | Some(1) => Ok(Some(buf)),
            code => {
                eprintln!("cnav: Warning: ripgrep exited with {code:?}, lexical results dropped");
                Ok(None)
            }
        }
    }
}

/// Collects matched line numbers per file from `rg --json` output.
fn parse_match_lines(stdout: &str) -> HashMap<String, Vec<i64>> {
    let mut file_matches: HashMap<String, Vec<i64>> = HashMap::new();
    for line in stdout.lines() {
        if line.is_empty() {
            continue;
        }
        let Ok(message) = serde_json::from_str::<RgMessage>(line) else {
            continue;
        };
        if message.kind != "match" {
            continue;
        }
        let Some(path) = message.data.path.and_then(|p| p.text) else {
            continue;
        };
        let Some(line_number) = message.data.line_number else {
            continue;
        };
        file_matches.entry(path).or_default().push(line_number);
    }
    file_matches
}

/// Reciprocal Rank Fusion: score(id) = 1/(k + rank_lex) + 1/(k + rank_sem)
/// with rank 1000 for the stream the id is missing from. Descending by
/// score, ties broken by id so output order is stable.
fn rrf_fuse(
    lexical_ranks: &HashMap<String, usize>,
    semantic_ranks: &HashMap<String, usize>,
    k: u32,
) -> Vec<(String, f64)> {
    let k = f64::from(k);
    let mut fused: Vec<(String, f64)> = lexical_ranks
        .keys()
        .chain(
            semantic_ranks
                .keys()
                .filter(|id| !lexical_ranks.contains_key(*id)),
        )
        .map(|id| {
            let lex = lexical_ranks.get(id).copied().unwrap_or(MISSING_RANK);
            let sem = semantic_ranks.get(id).copied().unwrap_or(MISSING_RANK);
            let score = 1.0 / (k + lex as f64) + 1.0 / (k + sem as f64);
            (id.clone(), score)
        })
        .collect();

    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    fused
}
