use cnav::builder::GraphBuilder;
use cnav::db::Db;
use cnav::embed::{Embedder, quantize_binary};
use cnav::graph::FlowEngine;
use cnav::model::{BuildStats, CALLS, MUTATES, PROPAGATES_ERROR, READS_CONFIG};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const AUTH: &str = r#""""Login and session handling."""
import os

MAX_ATTEMPTS = 3


def login(username, password):
    """Authenticate a user and open a session."""
    secret = os.getenv("AUTH_SECRET")
    if password is None:
        raise ValueError("password required")
    return check(username, password, secret)


def check(username, password, secret):
    attempts = 0
    for _ in range(MAX_ATTEMPTS):
        if verify(password, secret):
            return True
        attempts += 1
    raise PermissionError(username)


def verify(password, secret):
    return password == secret


class Session:
    """An authenticated session."""

    def refresh(self):
        self.expires = extend()


class AdminSession(Session):
    def refresh(self):
        return extend()
"#;

const TASKS: &str = r#"import os


def schedule(job):
    queue = load_queue()
    queue.append(job)
    return queue


def load_queue():
    path = os.environ.get("QUEUE_PATH")
    if path is None:
        raise KeyError("QUEUE_PATH")
    return []
"#;

fn setup_repo() -> (TempDir, Db, Embedder, PathBuf) {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("repo");
    fs::create_dir_all(root.join("services")).unwrap();
    fs::write(root.join("services/auth.py"), AUTH).unwrap();
    fs::write(root.join("tasks.py"), TASKS).unwrap();

    let db = Db::new(&dir.path().join("cnav.sqlite")).unwrap();
    let embedder = Embedder::with_defaults();
    (dir, db, embedder, root)
}

fn index_repo(db: &Db, embedder: &Embedder, root: &Path) -> BuildStats {
    let mut builder = GraphBuilder::new(db, embedder, root).unwrap();
    builder.full_index().unwrap()
}

#[test]
fn full_index_builds_the_graph() {
    let (_dir, db, embedder, root) = setup_repo();
    let stats = index_repo(&db, &embedder, &root);

    assert_eq!(stats.indexed, 2);
    assert_eq!(stats.skipped, 0);
    assert_eq!(stats.errors, 0);
    assert_eq!(stats.entities, 9);

    let db_stats = db.stats().unwrap();
    assert_eq!(db_stats.entities, 9);
    assert_eq!(db_stats.files, 2);
    assert_eq!(db_stats.relations["INHERITS"], 1);
    for relation in [CALLS, MUTATES, READS_CONFIG, PROPAGATES_ERROR] {
        assert!(db_stats.relations[relation] > 0, "missing {relation} edges");
    }

    let login = db.get_entity("func:services/auth.py:login").unwrap().unwrap();
    assert_eq!(login.kind, "function");
    assert_eq!(login.file_path, "services/auth.py");
    assert_eq!(login.signature.as_deref(), Some("def login(username, password)"));
    assert_eq!(
        login.docstring.as_deref(),
        Some("Authenticate a user and open a session.")
    );
    assert_eq!(login.start_line, 7);
    assert_eq!(login.end_line, 12);

    let refresh = db
        .get_entity("method:services/auth.py:Session.refresh")
        .unwrap()
        .unwrap();
    assert_eq!(refresh.kind, "method");
    assert_eq!(refresh.name, "refresh");

    assert_eq!(db.list_files().unwrap(), vec!["services/auth.py", "tasks.py"]);
}

#[test]
fn downstream_walk_reaches_transitive_callees() {
    let (_dir, db, embedder, root) = setup_repo();
    index_repo(&db, &embedder, &root);

    let engine = FlowEngine::new(&db);
    let result = engine
        .traverse_downstream("func:services/auth.py:login", 3)
        .unwrap();

    assert_eq!(result.root, "func:services/auth.py:login");
    assert_eq!(result.direction, "downstream");
    assert_eq!(result.depth, 3);

    let login_neighbors = &result.adjacency_list["func:services/auth.py:login"];
    assert!(
        login_neighbors
            .iter()
            .any(|n| n.target == "func:services/auth.py:check" && n.relation == CALLS)
    );

    let check_neighbors = &result.adjacency_list["func:services/auth.py:check"];
    assert!(
        check_neighbors
            .iter()
            .any(|n| n.target == "func:services/auth.py:verify")
    );
    assert!(result.adjacency_list["func:services/auth.py:verify"].is_empty());

    let check = &result.entities["func:services/auth.py:check"];
    assert_eq!(check.signature, "def check(username, password, secret)");
    // `range` is reached as a call target but has no stored row
    assert!(!result.entities.contains_key("func:services/auth.py:range"));
}

#[test]
fn upstream_walk_finds_callers() {
    let (_dir, db, embedder, root) = setup_repo();
    index_repo(&db, &embedder, &root);

    let engine = FlowEngine::new(&db);
    let result = engine
        .traverse_upstream("func:services/auth.py:verify", 3)
        .unwrap();

    assert!(
        result.adjacency_list["func:services/auth.py:verify"]
            .iter()
            .any(|n| n.target == "func:services/auth.py:check")
    );
    assert!(
        result.adjacency_list["func:services/auth.py:check"]
            .iter()
            .any(|n| n.target == "func:services/auth.py:login")
    );
    assert!(result.entities.contains_key("func:services/auth.py:login"));
}

#[test]
fn trace_path_connects_login_to_verify() {
    let (_dir, db, embedder, root) = setup_repo();
    index_repo(&db, &embedder, &root);

    let engine = FlowEngine::new(&db);
    let path = engine
        .trace_path(
            "func:services/auth.py:login",
            "func:services/auth.py:verify",
            None,
        )
        .unwrap();
    assert_eq!(
        path,
        Some(vec![
            "func:services/auth.py:login".to_string(),
            "func:services/auth.py:check".to_string(),
            "func:services/auth.py:verify".to_string(),
        ])
    );
}

#[test]
fn inheritance_chain_lists_subclasses() {
    let (_dir, db, embedder, root) = setup_repo();
    index_repo(&db, &embedder, &root);

    let engine = FlowEngine::new(&db);
    let chain = engine
        .inheritance_chain("class:services/auth.py:Session")
        .unwrap();

    assert!(chain.parents.is_empty());
    assert_eq!(chain.children.len(), 1);
    assert_eq!(chain.children[0].id, "class:services/auth.py:AdminSession");
    assert_eq!(chain.children[0].depth, 0);
    assert!(chain.entities.contains_key("class:services/auth.py:Session"));
    assert!(
        chain
            .entities
            .contains_key("class:services/auth.py:AdminSession")
    );
}

#[test]
fn edge_contexts_record_line_and_accessor() {
    let (_dir, db, embedder, root) = setup_repo();
    index_repo(&db, &embedder, &root);

    let login_reads = db
        .get_edges_by_source("func:services/auth.py:login", Some(READS_CONFIG))
        .unwrap();
    assert!(login_reads.iter().any(|e| {
        e.target_id == "config:env:AUTH_SECRET"
            && e.context.as_deref() == Some("line:9 via:os.getenv")
    }));

    let check_reads = db
        .get_edges_by_source("func:services/auth.py:check", Some(READS_CONFIG))
        .unwrap();
    assert!(check_reads.iter().any(|e| {
        e.target_id == "config:const:MAX_ATTEMPTS"
            && e.context.as_deref() == Some("line:17 via:constant")
    }));

    let check_mutates = db
        .get_edges_by_source("func:services/auth.py:check", Some(MUTATES))
        .unwrap();
    assert!(check_mutates.iter().any(|e| {
        e.target_id == "var:services/auth.py:attempts"
            && e.context.as_deref() == Some("line:16 type:assignment")
    }));
    assert!(check_mutates.iter().any(|e| {
        e.target_id == "var:services/auth.py:attempts"
            && e.context.as_deref() == Some("line:20 type:augmented_assignment")
    }));

    let refresh_mutates = db
        .get_edges_by_source("method:services/auth.py:Session.refresh", Some(MUTATES))
        .unwrap();
    assert!(refresh_mutates.iter().any(|e| {
        e.target_id == "attr:services/auth.py:expires"
            && e.context.as_deref() == Some("line:32 type:assignment")
    }));

    let schedule_mutates = db
        .get_edges_by_source("func:tasks.py:schedule", Some(MUTATES))
        .unwrap();
    assert!(schedule_mutates.iter().any(|e| {
        e.target_id == "var:tasks.py:queue" && e.context.as_deref() == Some("line:5 type:assignment")
    }));
    assert!(schedule_mutates.iter().any(|e| {
        e.target_id == "var:tasks.py:queue"
            && e.context.as_deref() == Some("line:6 type:method_call")
    }));

    let queue_reads = db
        .get_edges_by_source("func:tasks.py:load_queue", Some(READS_CONFIG))
        .unwrap();
    assert_eq!(queue_reads.len(), 1);
    assert_eq!(queue_reads[0].target_id, "config:env:QUEUE_PATH");
    assert_eq!(
        queue_reads[0].context.as_deref(),
        Some("line:11 via:os.environ.get")
    );

    let login_errors = db
        .get_edges_by_source("func:services/auth.py:login", Some(PROPAGATES_ERROR))
        .unwrap();
    assert_eq!(login_errors.len(), 1);
    assert_eq!(login_errors[0].target_id, "exc:ValueError");
    assert_eq!(login_errors[0].context.as_deref(), Some("line:11 via:raise"));

    let queue_errors = db
        .get_edges_by_source("func:tasks.py:load_queue", Some(PROPAGATES_ERROR))
        .unwrap();
    assert_eq!(queue_errors.len(), 1);
    assert_eq!(queue_errors[0].target_id, "exc:KeyError");
    assert_eq!(queue_errors[0].context.as_deref(), Some("line:13 via:raise"));
}

#[test]
fn embeddings_survive_storage_round_trip() {
    let (_dir, db, embedder, root) = setup_repo();
    index_repo(&db, &embedder, &root);

    let embedding = db
        .get_embedding("func:services/auth.py:login")
        .unwrap()
        .unwrap();
    assert_eq!(embedding.len(), 256);
    let norm: f32 = embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5);

    assert_eq!(quantize_binary(&embedding).len(), 32);
}

#[test]
fn removing_a_file_drops_only_its_rows() {
    let (_dir, db, embedder, root) = setup_repo();
    index_repo(&db, &embedder, &root);

    let builder = GraphBuilder::new(&db, &embedder, &root).unwrap();
    builder.remove_file(&root.join("tasks.py")).unwrap();

    assert!(db.get_entity("func:tasks.py:schedule").unwrap().is_none());
    assert!(
        db.get_edges_by_source("func:tasks.py:load_queue", None)
            .unwrap()
            .is_empty()
    );

    let db_stats = db.stats().unwrap();
    assert_eq!(db_stats.files, 1);
    assert_eq!(db_stats.entities, 7);
    assert!(
        db.get_entity("func:services/auth.py:login")
            .unwrap()
            .is_some()
    );
}
