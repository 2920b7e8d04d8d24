use crate::tools::{SearchMode, TraceDirection};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "cnav",
    version,
    about = "Causal code-structure index for Python repositories",
    after_help = r#"Examples:
  cnav init --repo .
  cnav search "token refresh" --limit 5
  cnav search "retry" --mode lexical
  cnav trace func:src/auth.py:login --direction downstream --depth 3
  cnav trace class:src/auth.py:Session --direction inheritance
  cnav skeleton src/auth.py
  cnav window method:src/auth.py:Session.refresh --context 8
  cnav watch --repo .
  cnav stats
"#
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Index the repository once and exit.
    Init {
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Rank entities by fused lexical and semantic relevance.
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Ranking mode: hybrid|lexical|semantic.
        #[arg(long, default_value = "hybrid")]
        mode: SearchMode,
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Walk the causal graph outward from an entity.
    Trace {
        entity_id: String,
        /// Traversal direction: upstream|downstream|inheritance.
        #[arg(long, default_value = "downstream")]
        direction: TraceDirection,
        /// Maximum hops from the root.
        #[arg(long, default_value_t = 3)]
        depth: u32,
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Print a file's outline: signatures and docstrings, bodies elided.
    Skeleton {
        file: PathBuf,
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Print an entity's source with line numbers and context.
    Window {
        entity_id: String,
        /// Context lines above and below the entity.
        #[arg(long, default_value_t = 5)]
        context: i64,
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Index once, then re-index on file changes until interrupted.
    Watch {
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
        /// Debounce window for filesystem events in milliseconds.
        #[arg(long)]
        debounce_ms: Option<u64>,
    },
    /// Print store statistics.
    Stats {
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
    },
}
