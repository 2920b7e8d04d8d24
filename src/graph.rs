use crate::config::Config;
use crate::db::Db;
use crate::model::{
    CALLS, ChainEntry, EntitySummary, FlowNeighbor, FlowResult, INHERITS, InheritanceResult,
};
use anyhow::Result;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Upstream,
    Downstream,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::Upstream => "upstream",
            Direction::Downstream => "downstream",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ChainSide {
    Parents,
    Children,
}

/// Walks CALLS and INHERITS edges outward from a root entity. All
/// traversals are iterative with an explicit frontier and visited set,
/// so cyclic graphs terminate and stack depth stays flat.
pub struct FlowEngine<'a> {
    db: &'a Db,
    max_depth: u32,
}

impl<'a> FlowEngine<'a> {
    pub fn new(db: &'a Db) -> Self {
        FlowEngine {
            db,
            max_depth: Config::get().max_traversal_depth,
        }
    }

    pub fn with_max_depth(db: &'a Db, max_depth: u32) -> Self {
        FlowEngine { db, max_depth }
    }

    /// Who calls this entity, up to `depth` hops.
    pub fn traverse_upstream(&self, entity_id: &str, depth: u32) -> Result<FlowResult> {
        self.traverse(entity_id, depth, Direction::Upstream)
    }

    /// What this entity calls, up to `depth` hops.
    pub fn traverse_downstream(&self, entity_id: &str, depth: u32) -> Result<FlowResult> {
        self.traverse(entity_id, depth, Direction::Downstream)
    }

    fn traverse(&self, entity_id: &str, depth: u32, direction: Direction) -> Result<FlowResult> {
        let depth = depth.min(self.max_depth);
        let mut visited: HashSet<String> = HashSet::new();
        let mut adjacency_list: BTreeMap<String, Vec<FlowNeighbor>> = BTreeMap::new();
        let mut entities: BTreeMap<String, EntitySummary> = BTreeMap::new();

        let mut frontier: Vec<(String, u32)> = vec![(entity_id.to_string(), 0)];
        while let Some((current_id, hop)) = frontier.pop() {
            if hop > depth || visited.contains(&current_id) {
                continue;
            }
            visited.insert(current_id.clone());

            if let Some(entity) = self.db.get_entity(&current_id)? {
                entities.insert(current_id.clone(), EntitySummary::from(&entity));
            }

            let edges = match direction {
                Direction::Upstream => self.db.get_edges_by_target(&current_id, Some(CALLS))?,
                Direction::Downstream => self.db.get_edges_by_source(&current_id, Some(CALLS))?,
            };

            let neighbors = adjacency_list.entry(current_id).or_default();
            for edge in edges {
                let next_id = match direction {
                    Direction::Upstream => edge.source_id,
                    Direction::Downstream => edge.target_id,
                };
                neighbors.push(FlowNeighbor {
                    target: next_id.clone(),
                    relation: edge.relation,
                });
                frontier.push((next_id, hop + 1));
            }
        }

        Ok(FlowResult {
            root: entity_id.to_string(),
            direction: direction.as_str().to_string(),
            depth,
            adjacency_list,
            entities,
        })
    }

    /// Class hierarchy around a root: parents via outgoing INHERITS,
    /// children via incoming INHERITS. Ids without a stored entity row
    /// (external bases) are not listed and not expanded.
    pub fn inheritance_chain(&self, entity_id: &str) -> Result<InheritanceResult> {
        let mut entities: BTreeMap<String, EntitySummary> = BTreeMap::new();
        if let Some(entity) = self.db.get_entity(entity_id)? {
            entities.insert(entity_id.to_string(), EntitySummary::from(&entity));
        }

        let parents = self.walk_chain(entity_id, ChainSide::Parents, &mut entities)?;
        let children = self.walk_chain(entity_id, ChainSide::Children, &mut entities)?;

        Ok(InheritanceResult {
            root: entity_id.to_string(),
            parents,
            children,
            entities,
        })
    }

    fn walk_chain(
        &self,
        entity_id: &str,
        side: ChainSide,
        entities: &mut BTreeMap<String, EntitySummary>,
    ) -> Result<Vec<ChainEntry>> {
        let mut out = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();

        let mut frontier: Vec<(String, u32)> = vec![(entity_id.to_string(), 0)];
        while let Some((current_id, hop)) = frontier.pop() {
            if hop > self.max_depth || !visited.insert(current_id.clone()) {
                continue;
            }

            let edges = match side {
                // A class's parents sit at the target end of its
                // outgoing INHERITS edges.
                ChainSide::Parents => self.db.get_edges_by_source(&current_id, Some(INHERITS))?,
                ChainSide::Children => self.db.get_edges_by_target(&current_id, Some(INHERITS))?,
            };

            for edge in edges {
                let next_id = match side {
                    ChainSide::Parents => edge.target_id,
                    ChainSide::Children => edge.source_id,
                };
                if let Some(next) = self.db.get_entity(&next_id)? {
                    out.push(ChainEntry {
                        id: next_id.clone(),
                        depth: hop,
                    });
                    entities.insert(next_id.clone(), EntitySummary::from(&next));
                    frontier.push((next_id, hop + 1));
                }
            }
        }

        Ok(out)
    }

    /// First CALLS path from `source_id` to `target_id` found by
    /// depth-first search, or None. Hop budget defaults to the engine's
    /// max depth.
    pub fn trace_path(
        &self,
        source_id: &str,
        target_id: &str,
        max_depth: Option<u32>,
    ) -> Result<Option<Vec<String>>> {
        let limit = max_depth.unwrap_or(self.max_depth);
        let mut visited: HashSet<String> = HashSet::new();

        let mut frontier: Vec<(String, Vec<String>, u32)> =
            vec![(source_id.to_string(), Vec::new(), 0)];
        while let Some((current_id, path, hop)) = frontier.pop() {
            if hop > limit {
                continue;
            }
            if current_id == target_id {
                let mut full = path;
                full.push(current_id);
                return Ok(Some(full));
            }
            if !visited.insert(current_id.clone()) {
                continue;
            }

            let edges = self.db.get_edges_by_source(&current_id, Some(CALLS))?;
            let mut next_path = path;
            next_path.push(current_id);
            // Reverse push keeps expansion in edge order off the stack.
            for edge in edges.into_iter().rev() {
                frontier.push((edge.target_id, next_path.clone(), hop + 1));
            }
        }

        Ok(None)
    }
}
