use anyhow::Result;
use clap::Parser;
use cnav::{builder, cli, config, db, embed, tools, watch};
use serde_json::json;
use std::path::{Path, PathBuf};

fn default_db_path(repo: &Path) -> PathBuf {
    repo.join(".cnav").join(".cnav.sqlite")
}

fn main() -> Result<()> {
    let args = cli::Args::parse();

    match args.command {
        cli::Command::Init { repo, db } => {
            let db_path = db.unwrap_or_else(|| default_db_path(&repo));
            let db = db::Db::new(&db_path)?;
            let embedder = embed::Embedder::with_defaults();
            let mut builder = builder::GraphBuilder::new(&db, &embedder, &repo)?;
            let stats = builder.full_index()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        cli::Command::Search {
            query,
            limit,
            mode,
            repo,
            db,
        } => {
            let db_path = db.unwrap_or_else(|| default_db_path(&repo));
            let db = db::Db::new(&db_path)?;
            let embedder = embed::Embedder::with_defaults();
            let tools = tools::Tools::new(&db, &embedder, &repo)?;
            let hits = tools.search(&query, limit, mode)?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
            Ok(())
        }
        cli::Command::Trace {
            entity_id,
            direction,
            depth,
            repo,
            db,
        } => {
            let db_path = db.unwrap_or_else(|| default_db_path(&repo));
            let db = db::Db::new(&db_path)?;
            let embedder = embed::Embedder::with_defaults();
            let tools = tools::Tools::new(&db, &embedder, &repo)?;
            let result = tools.trace(&entity_id, direction, depth)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        cli::Command::Skeleton { file, repo, db } => {
            let db_path = db.unwrap_or_else(|| default_db_path(&repo));
            let db = db::Db::new(&db_path)?;
            let embedder = embed::Embedder::with_defaults();
            let mut tools = tools::Tools::new(&db, &embedder, &repo)?;
            match tools.skeleton(&file) {
                Ok(content) => {
                    println!("{content}");
                    Ok(())
                }
                Err(err) => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&json!({ "error": format!("{err:#}") }))?
                    );
                    std::process::exit(1);
                }
            }
        }
        cli::Command::Window {
            entity_id,
            context,
            repo,
            db,
        } => {
            let db_path = db.unwrap_or_else(|| default_db_path(&repo));
            let db = db::Db::new(&db_path)?;
            let embedder = embed::Embedder::with_defaults();
            let tools = tools::Tools::new(&db, &embedder, &repo)?;
            match tools.window(&entity_id, context)? {
                Some(window) => {
                    println!("{}", serde_json::to_string_pretty(&window)?);
                    Ok(())
                }
                None => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(
                            &json!({ "error": format!("Entity not found: {entity_id}") })
                        )?
                    );
                    std::process::exit(1);
                }
            }
        }
        cli::Command::Watch {
            repo,
            db,
            debounce_ms,
        } => {
            let db_path = db.unwrap_or_else(|| default_db_path(&repo));
            {
                let db = db::Db::new(&db_path)?;
                let embedder = embed::Embedder::with_defaults();
                let mut builder = builder::GraphBuilder::new(&db, &embedder, &repo)?;
                let stats = builder.full_index()?;
                eprintln!(
                    "cnav: indexed {} files ({} entities, {} edges)",
                    stats.indexed, stats.entities, stats.edges
                );
            }
            let debounce =
                debounce_ms.unwrap_or_else(|| config::Config::get().watch_debounce_ms);
            let handle = watch::start(repo.clone(), db_path, debounce)?;
            eprintln!("cnav: watching {} (Ctrl-C to stop)", repo.display());
            let mut sink = String::new();
            while std::io::stdin().read_line(&mut sink)? > 0 {
                sink.clear();
            }
            handle.stop();
            Ok(())
        }
        cli::Command::Stats { repo, db } => {
            let db_path = db.unwrap_or_else(|| default_db_path(&repo));
            let db = db::Db::new(&db_path)?;
            let stats = db.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
    }
}
