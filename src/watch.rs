use crate::builder::GraphBuilder;
use crate::db::Db;
use crate::embed::Embedder;
use anyhow::Result;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

/// What a queued filesystem event asks us to do at flush time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum PendingKind {
    Changed,
    Removed,
}

pub struct WatchHandle {
    stop: Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl WatchHandle {
    pub fn stop(mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        let _ = self.stop.send(());
    }
}

/// Start watching `repo_root` for Python file changes on a background
/// thread. Each change waits out a debounce window before the graph is
/// updated, so editor save bursts collapse into one re-index per file.
///
/// Startup failures (store unreachable, watch registration rejected)
/// are reported through a ready handshake rather than lost on a
/// detached thread.
pub fn start(repo_root: PathBuf, db_path: PathBuf, debounce_ms: u64) -> Result<WatchHandle> {
    let debounce = Duration::from_millis(debounce_ms.max(1));
    let (ready_tx, ready_rx) = mpsc::channel();
    let (stop_tx, stop_rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        if let Err(err) = run_loop(repo_root, db_path, debounce, stop_rx, ready_tx) {
            eprintln!("cnav: watch error: {err:#}");
        }
    });
    match ready_rx.recv_timeout(Duration::from_secs(2)) {
        Ok(Ok(())) => Ok(WatchHandle {
            stop: stop_tx,
            thread: Some(handle),
        }),
        Ok(Err(err)) => Err(err),
        Err(_) => Ok(WatchHandle {
            stop: stop_tx,
            thread: Some(handle),
        }),
    }
}

fn run_loop(
    repo_root: PathBuf,
    db_path: PathBuf,
    debounce: Duration,
    stop_rx: Receiver<()>,
    ready: Sender<Result<()>>,
) -> Result<()> {
    let repo_root = std::fs::canonicalize(&repo_root).unwrap_or(repo_root);
    let db = match Db::new(&db_path) {
        Ok(db) => db,
        Err(err) => {
            let _ = ready.send(Err(err));
            return Ok(());
        }
    };
    let embedder = Embedder::with_defaults();
    let mut builder = match GraphBuilder::new(&db, &embedder, &repo_root) {
        Ok(builder) => builder,
        Err(err) => {
            let _ = ready.send(Err(err));
            return Ok(());
        }
    };
    let (_watcher, event_rx) = match try_start_watcher(&repo_root) {
        Ok(parts) => parts,
        Err(err) => {
            let _ = ready.send(Err(err));
            return Ok(());
        }
    };
    let _ = ready.send(Ok(()));

    let mut pending: HashMap<PathBuf, (PendingKind, Instant)> = HashMap::new();
    let mut force_reindex = false;

    loop {
        if stop_requested(&stop_rx) {
            return Ok(());
        }

        match event_rx.recv_timeout(debounce) {
            Ok(Ok(event)) => {
                if event.need_rescan() {
                    force_reindex = true;
                    pending.clear();
                } else {
                    queue_event(&mut pending, &event);
                }
            }
            Ok(Err(err)) => eprintln!("cnav: watch error: {err}"),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => return Ok(()),
        }

        if force_reindex {
            match builder.full_index() {
                Ok(stats) => eprintln!(
                    "cnav: reindexed {} files ({} entities, {} edges)",
                    stats.indexed, stats.entities, stats.edges
                ),
                Err(err) => eprintln!("cnav: reindex failed: {err:#}"),
            }
            force_reindex = false;
            continue;
        }

        for (path, kind) in drain_ready(&mut pending, debounce) {
            apply_change(&mut builder, &path, kind);
        }
    }
}

fn apply_change(builder: &mut GraphBuilder<'_>, path: &Path, kind: PendingKind) {
    let outcome = match kind {
        PendingKind::Removed => builder.remove_file(path),
        // Editors that save via rename leave a Changed entry for a path
        // that is already gone by flush time.
        PendingKind::Changed if !path.exists() => builder.remove_file(path),
        PendingKind::Changed => builder.index_file(path).map(|_| ()),
    };
    if let Err(err) = outcome {
        eprintln!("cnav: watch update failed for {}: {err:#}", path.display());
    }
}

/// Fold one notify event into the pending map. The newest event wins
/// both the kind and the queued-at timestamp, so a path keeps waiting
/// while it is still being written to.
fn queue_event(pending: &mut HashMap<PathBuf, (PendingKind, Instant)>, event: &Event) {
    let kind = match event.kind {
        EventKind::Access(_) => return,
        EventKind::Remove(_) => PendingKind::Removed,
        _ => PendingKind::Changed,
    };
    for path in &event.paths {
        if !is_python_path(path) {
            continue;
        }
        pending.insert(path.clone(), (kind, Instant::now()));
    }
}

/// Remove and return every pending entry whose debounce window has
/// elapsed, in path order.
fn drain_ready(
    pending: &mut HashMap<PathBuf, (PendingKind, Instant)>,
    debounce: Duration,
) -> Vec<(PathBuf, PendingKind)> {
    let mut ready: Vec<(PathBuf, PendingKind)> = pending
        .iter()
        .filter(|(_, (_, queued_at))| queued_at.elapsed() >= debounce)
        .map(|(path, (kind, _))| (path.clone(), *kind))
        .collect();
    ready.sort_by(|a, b| a.0.cmp(&b.0));
    for (path, _) in &ready {
        pending.remove(path);
    }
    ready
}

fn is_python_path(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("py")
}

fn stop_requested(stop_rx: &Receiver<()>) -> bool {
    match stop_rx.try_recv() {
        Ok(()) => true,
        Err(TryRecvError::Disconnected) => true,
        Err(TryRecvError::Empty) => false,
    }
}

fn try_start_watcher(
    repo_root: &Path,
) -> Result<(RecommendedWatcher, Receiver<notify::Result<Event>>)> {
    let (event_tx, event_rx) = mpsc::channel();
    let handler = move |res| {
        let _ = event_tx.send(res);
    };
    let mut watcher = notify::recommended_watcher(handler)?;
    watcher.watch(repo_root, RecursiveMode::Recursive)?;
    Ok((watcher, event_rx))
}
