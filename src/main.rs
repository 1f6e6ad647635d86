use anyhow::Context;
use certchain::api::ApiServer;
use certchain::blockchain::{Blockchain, LedgerMirror};
use certchain::metrics::{RegistrySummary, save_records_csv};
use certchain::pki::RegistryEngine;
use certchain::storage::{CachedArchive, LocalArchive};
use certchain::store::{JournalStore, RecordStore};
use certchain::verify::Resolver;
use certchain::Config;
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "certchain", version, about = "Certificate registry service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve,
    /// Write every record to a CSV audit file.
    Export {
        #[arg(short, long, default_value = "certificates.csv")]
        output: PathBuf,
    },
    /// Print per-issuer counts.
    Summary,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Config::from_env().context("loading configuration")?;

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Export { output } => {
            let store = open_store(&config).await?;
            let records = store.records().await?;
            save_records_csv(&records, &output)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("✓ {} records exported to {}", records.len(), output.display());
            Ok(())
        }
        Command::Summary => {
            let store = open_store(&config).await?;
            let records = store.records().await?;
            print!("{}", RegistrySummary::from_records(&records));
            Ok(())
        }
    }
}

async fn open_store(config: &Config) -> anyhow::Result<JournalStore> {
    JournalStore::open(config.journal_path())
        .await
        .with_context(|| format!("opening {}", config.journal_path().display()))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let journal = open_store(&config).await?;
    let local = LocalArchive::open(config.archive_dir())
        .await
        .with_context(|| format!("opening archive {}", config.archive_dir().display()))?;
    info!(
        "journal {} ({} records), archive {}",
        journal.path().display(),
        journal.len().await,
        local.root().display()
    );
    let store: Arc<dyn RecordStore> = Arc::new(journal);
    let archive = Arc::new(CachedArchive::new(local, config.archive_cache_entries));

    let issuers = config.load_issuers()?;
    if issuers.is_empty() {
        warn!("issuer directory is empty; every issuance will be refused");
    }

    let chain = Arc::new(Blockchain::new(config.ledger_difficulty));
    let (mirror, mirror_task) = LedgerMirror::spawn(chain.clone(), config.mirror_config());

    let engine = RegistryEngine::new(store.clone(), archive, config.registry_limits())
        .with_ledger(mirror.clone());
    let resolver = Resolver::new(store);

    info!(
        "{} issuers, ledger difficulty {}",
        issuers.len(),
        chain.difficulty()
    );

    let server = ApiServer::new(Arc::new(engine), Arc::new(resolver), issuers).with_ledger(mirror);
    server
        .run(config.bind_addr, async {
            if tokio::signal::ctrl_c().await.is_err() {
                warn!("could not listen for ctrl-c; shutting down");
            }
        })
        .await?;

    // the router's clones are gone; dropping ours lets the mirror drain
    drop(server);
    if let Err(e) = mirror_task.await {
        warn!("ledger mirror task ended abnormally: {}", e);
    }
    if let Err(e) = chain.verify_integrity().await {
        warn!("ledger integrity check failed on shutdown: {}", e);
    }
    info!("ledger holds {} blocks", chain.len().await);
    Ok(())
}
