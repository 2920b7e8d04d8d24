use serde::Serialize;
use std::collections::BTreeMap;

// Edge relations. Stored verbatim in the edges.relation column.
pub const CALLS: &str = "CALLS";
pub const INHERITS: &str = "INHERITS";
pub const MUTATES: &str = "MUTATES";
pub const READS_CONFIG: &str = "READS_CONFIG";
pub const PROPAGATES_ERROR: &str = "PROPAGATES_ERROR";

// Entity kinds. Stored verbatim in the entities.type column; entity ids
// use the short prefixes func:/method:/class:.
pub const KIND_FUNCTION: &str = "function";
pub const KIND_METHOD: &str = "method";
pub const KIND_CLASS: &str = "class";

/// A stored function, method, or class.
///
/// Ids follow `prefix:file_path:name`, e.g. `func:src/auth.py:login`,
/// `method:src/auth.py:Session.refresh`, `class:src/auth.py:Session`.
#[derive(Debug, Serialize, Clone)]
pub struct Entity {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub file_path: String,
    pub name: String,
    pub start_line: i64,
    pub end_line: i64,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    #[serde(skip_serializing)]
    pub last_updated: f64,
}

/// Compact entity view attached to traversal results.
#[derive(Debug, Serialize, Clone)]
pub struct EntitySummary {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub file_path: String,
    pub signature: String,
}

impl From<&Entity> for EntitySummary {
    fn from(e: &Entity) -> Self {
        EntitySummary {
            id: e.id.clone(),
            kind: e.kind.clone(),
            name: e.name.clone(),
            file_path: e.file_path.clone(),
            signature: e.signature.clone().unwrap_or_default(),
        }
    }
}

/// A typed edge between two ids. Targets may be pseudo-entities
/// (`var:`, `attr:`, `config:env:`, `config:const:`, `exc:` or the
/// unresolved method wildcard `method:<file>:*.<attr>`) that have no
/// entity row of their own.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Edge {
    pub source_id: String,
    pub relation: String,
    pub target_id: String,
    pub context: Option<String>,
}

/// Cached per-file outline.
#[derive(Debug, Clone)]
pub struct Skeleton {
    pub file_path: String,
    pub content: String,
    pub last_modified: f64,
}

/// One neighbor reached during a causal traversal.
#[derive(Debug, Serialize, Clone)]
pub struct FlowNeighbor {
    pub target: String,
    pub relation: String,
}

/// Result of an upstream or downstream CALLS traversal. Every visited
/// id has an adjacency entry, possibly empty; `entities` only lists ids
/// that exist as stored rows.
#[derive(Debug, Serialize)]
pub struct FlowResult {
    pub root: String,
    pub direction: String,
    pub depth: u32,
    pub adjacency_list: BTreeMap<String, Vec<FlowNeighbor>>,
    pub entities: BTreeMap<String, EntitySummary>,
}

/// A class reached while walking INHERITS edges, with its hop distance
/// from the root (0 = immediate parent/child).
#[derive(Debug, Serialize, Clone)]
pub struct ChainEntry {
    pub id: String,
    pub depth: u32,
}

#[derive(Debug, Serialize)]
pub struct InheritanceResult {
    pub root: String,
    pub parents: Vec<ChainEntry>,
    pub children: Vec<ChainEntry>,
    pub entities: BTreeMap<String, EntitySummary>,
}

/// One fused search hit as printed by `cnav search`.
#[derive(Debug, Serialize, Clone)]
pub struct SearchResult {
    pub id: String,
    pub score: f64,
    pub sig: String,
    pub file: String,
    pub line: i64,
}

/// Entity source window as printed by `cnav window`. `start`/`end` are
/// the entity's own lines; `code` includes the surrounding context.
#[derive(Debug, Serialize)]
pub struct CodeWindow {
    pub entity_id: String,
    pub file: String,
    pub start: i64,
    pub end: i64,
    pub code: String,
}

/// Counters for one indexing pass.
#[derive(Debug, Serialize, Default, Clone)]
pub struct BuildStats {
    pub indexed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub entities: usize,
    pub edges: usize,
    pub duration_ms: u64,
}

/// Store statistics as printed by `cnav stats`.
#[derive(Debug, Serialize)]
pub struct DbStats {
    pub entities: i64,
    pub edges: i64,
    pub skeletons: i64,
    pub files: i64,
    pub relations: BTreeMap<String, i64>,
}
