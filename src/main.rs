//! # Aivis — AI answer-engine brand-visibility backend
//!
//! Runs the daily batch gateway: the trigger, guardians, manual recovery,
//! and status endpoints over one SQLite database.
//!
//! Usage:
//!   aivis                          # Start the gateway (default port 8642)
//!   aivis --port 9000              # Custom port
//!   aivis --sync-secret            # Push the configured cron secret into the store and exit
//!   aivis --seed-demo              # Seed a demo org/prompt/engine and exit

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use aivis_core::AivisConfig;
use aivis_store::BatchDb;

#[derive(Parser)]
#[command(
    name = "aivis",
    version,
    about = "📡 Aivis — brand visibility across AI answer engines"
)]
struct Cli {
    /// Gateway port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Config file path
    #[arg(long)]
    config: Option<String>,

    /// Database path (overrides config)
    #[arg(long)]
    db_path: Option<String>,

    /// Sync the configured cron secret into the settings store and exit
    #[arg(long)]
    sync_secret: bool,

    /// Seed a demo organization, prompt, and engine, then exit
    #[arg(long)]
    seed_demo: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "aivis=debug,tower_http=debug"
    } else {
        "aivis=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    // Load config
    let mut config = match &cli.config {
        Some(path) => AivisConfig::load_from(std::path::Path::new(&expand_path(path)))?,
        None => AivisConfig::load()?,
    };
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }
    if let Some(db_path) = &cli.db_path {
        config.store.db_path = db_path.clone();
    }

    // Ensure the database directory exists
    let db_path = PathBuf::from(expand_path(&config.store.db_path));
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // --sync-secret: copy the secret into the store and exit
    if cli.sync_secret {
        let db = BatchDb::open(&db_path)?;
        let secret = config.auth.resolve_cron_secret();
        let outcome = aivis_scheduler::sync_cron_secret(&db, &secret)?;
        println!("🔑 {}", outcome.message);
        return Ok(());
    }

    // --seed-demo: minimal catalog so a first run has something to do
    if cli.seed_demo {
        let db = BatchDb::open(&db_path)?;
        db.upsert_organization("org-demo", "Demo Co", true)?;
        db.upsert_prompt(
            "prompt-demo",
            "org-demo",
            "What is the best project management tool for small teams?",
            true,
        )?;
        db.upsert_engine("openai", "gpt-4o-mini", true)?;
        db.upsert_engine("perplexity", "sonar", true)?;
        println!("🌱 Demo catalog seeded: 1 org, 1 prompt, 2 engines");
        return Ok(());
    }

    if config.auth.resolve_cron_secret().is_empty() {
        tracing::warn!("⚠️  No cron secret configured — forced runs and guardian polls will be rejected. Set AIVIS_CRON_SECRET.");
    }

    // Sync the secret on boot so guardians and triggers agree from the start
    {
        let db = Arc::new(BatchDb::open(&db_path)?);
        let secret = config.auth.resolve_cron_secret();
        if !secret.is_empty() {
            aivis_scheduler::sync_cron_secret(&db, &secret).ok();
        }
    }

    println!("📡 Aivis v{}", env!("CARGO_PKG_VERSION"));
    println!("   🌐 Gateway:  http://{}:{}", config.gateway.host, config.gateway.port);
    println!("   🗄️  Database: {}", db_path.display());
    println!("   🕒 Timezone: {}", config.scheduler.timezone);
    println!();

    aivis_gateway::start(config, &db_path).await?;

    Ok(())
}
