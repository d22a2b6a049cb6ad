//! tabgroup: groups browser tabs by the ticket they are about.
//!
//! `run` drives a simulated browser from a JSON event stream; `map` and
//! `clear` inspect or reset the persisted ticket map.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tabgroup_browser::{JsonFileStore, KeyValueStore, SimulatedBrowser};
use tabgroup_core::TicketGroupMap;
use tabgroup_reconciler::Reconciler;
use tokio::io::BufReader;

mod cli;
mod config;
mod stream;

fn init_tracing() {
    let filter = std::env::var("TABGROUP_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    init_tracing();

    let file_config = match &args.config {
        Some(path) => config::FileConfig::load(path, true)?,
        None => match cli::default_config_path() {
            Some(path) => config::FileConfig::load(&path, false)?,
            None => config::FileConfig::default(),
        },
    };
    let store_path: PathBuf = args
        .store
        .clone()
        .or_else(|| file_config.store_path.clone())
        .unwrap_or_else(cli::default_store_path);
    let store = Arc::new(JsonFileStore::new(&store_path));

    match args.command {
        cli::Command::Run(opts) => {
            let reconciler_config = file_config.reconciler_config(&opts.domains);
            let mut browser = SimulatedBrowser::new();
            if opts.latency_ms > 0 {
                browser = browser.with_latency(Duration::from_millis(opts.latency_ms));
            }
            let reconciler = Arc::new(Reconciler::new(
                Arc::new(browser),
                store,
                reconciler_config,
            ));

            let restored = reconciler.load().await;
            tracing::info!(
                store = %store_path.display(),
                restored,
                domains = ?reconciler.config().gate.domains(),
                "tabgroup starting"
            );

            let mut stdout = std::io::stdout().lock();
            let summary = match &opts.events {
                Some(path) => {
                    let file = tokio::fs::File::open(path)
                        .await
                        .with_context(|| format!("cannot open {}", path.display()))?;
                    stream::run_stream(reconciler, BufReader::new(file), &mut stdout).await?
                }
                None => {
                    let stdin = BufReader::new(tokio::io::stdin());
                    stream::run_stream(reconciler, stdin, &mut stdout).await?
                }
            };
            serde_json::to_writer_pretty(&mut stdout, &summary)?;
            writeln!(stdout)?;
        }
        cli::Command::Map => {
            let raw = store.get(&file_config.storage_key).await?;
            let map = TicketGroupMap::from_stored(raw)
                .with_context(|| format!("corrupt ticket map in {}", store_path.display()))?;
            let object: serde_json::Map<String, serde_json::Value> = map
                .iter()
                .map(|(k, g)| (k.to_string(), serde_json::Value::from(g.0)))
                .collect();
            println!("{}", serde_json::to_string_pretty(&object)?);
        }
        cli::Command::Clear => {
            store.remove(&file_config.storage_key).await?;
            tracing::info!(store = %store_path.display(), "ticket map cleared");
        }
    }

    Ok(())
}
