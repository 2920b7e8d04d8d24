use crate::util;
use anyhow::Result;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub rel_path: String,
    pub abs_path: PathBuf,
}

/// Collects every indexable Python file under the repo root, sorted by
/// relative path. Dot-named segments and `__pycache__` directories are
/// skipped; the root itself is exempt from the dot rule.
pub fn scan_repo(repo_root: &Path) -> Result<Vec<ScannedFile>> {
    let mut files = Vec::new();
    let walker = WalkBuilder::new(repo_root)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .parents(false)
        .hidden(false)
        .filter_entry(|entry| !is_ignored_entry(entry))
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(value) => value,
            Err(err) => {
                eprintln!("cnav: walk error: {err}");
                continue;
            }
        };
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("py") {
            continue;
        }
        let rel_path = util::normalize_rel_path(repo_root, path)?;
        files.push(ScannedFile {
            rel_path,
            abs_path: path.to_path_buf(),
        });
    }
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(files)
}

fn is_ignored_entry(entry: &ignore::DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || name == "__pycache__"
}

/// Same segment rules as `scan_repo`, applied to a single repo-relative
/// path. The watcher runs event paths through this before re-indexing.
pub fn is_indexable(rel_path: &str) -> bool {
    rel_path.ends_with(".py")
        && !rel_path
            .split('/')
            .any(|part| part.starts_with('.') || part == "__pycache__")
}
