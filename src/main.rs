use anyhow::Result;
use clap::{Parser, Subcommand};
use qwengate_config::Settings;
use qwengate_provider::{ProviderFactory, Registry};
use qwengate_proxy::AppState;
use qwengate_store::Store;
use std::{path::PathBuf, sync::Arc};

#[derive(Parser, Debug)]
#[command(name = "qwengate", about = "qwengate — OpenAI-compatible LLM provider router")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Common server arguments.
#[derive(clap::Args, Debug)]
struct ServerArgs {
    /// Override the listening port (default: 8143, or the stored setting).
    #[arg(short, long)]
    port: Option<u16>,
    /// Override the listening address (default: 127.0.0.1).
    #[arg(long)]
    host: Option<String>,
    /// SQLite database path (default: ~/.qwengate/qwengate.db).
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,
    /// Log file path; logs go to stdout when omitted.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the router (foreground).
    Serve {
        #[command(flatten)]
        server: ServerArgs,
    },
    /// Show credential and catalog status.
    Status {
        /// SQLite database path (default: ~/.qwengate/qwengate.db).
        #[arg(long, value_name = "PATH")]
        db: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { server } => cmd_serve(server).await,
        Commands::Status { db } => cmd_status(db).await,
    }
}

async fn cmd_serve(args: ServerArgs) -> Result<()> {
    let store = Arc::new(open_store(args.db).await?);

    // Resolution order: defaults ← QWENGATE_* env ← settings table.
    let mut settings = Settings::from_env().map_err(|e| anyhow::anyhow!("settings error: {e}"))?;
    settings.apply_db(
        &store
            .settings_map()
            .await
            .map_err(|e| anyhow::anyhow!("settings error: {e}"))?,
    );

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.logging.level));

    // _log_guard must be held until the server exits to flush buffered writes.
    let _log_guard: Option<tracing_appender::non_blocking::WorkerGuard>;
    if let Some(ref log_path) = args.log_file {
        let dir = log_path.parent().unwrap_or(std::path::Path::new("."));
        let filename = log_path
            .file_name()
            .unwrap_or(std::ffi::OsStr::new("qwengate.log"));
        let file_appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        _log_guard = Some(guard);
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(non_blocking)
            .init();
    } else {
        _log_guard = None;
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }

    let factory = ProviderFactory::new(Arc::clone(&store), rquest::Client::new());
    let registry = Arc::new(Registry::new(factory));
    match registry.load_all().await {
        Ok(n) => tracing::info!(providers = n, "registry loaded"),
        Err(e) => tracing::error!(error = %e, "registry load failed; serving with none"),
    }

    // CLI overrides for the listen address.
    let addr = format!(
        "{}:{}",
        args.host.as_deref().unwrap_or(&settings.host),
        args.port.unwrap_or(settings.port),
    );

    let state = AppState::new(registry, store, settings);
    let app = qwengate_proxy::make_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "qwengate listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn cmd_status(db: Option<PathBuf>) -> Result<()> {
    let store = open_store(db).await?;

    match store.credential().await {
        Ok(Some(cred)) if cred.is_valid() => println!("credentials: valid"),
        Ok(Some(_)) => println!("credentials: present but invalid"),
        Ok(None) => println!("credentials: not configured"),
        Err(e) => println!("credentials: error ({e})"),
    }

    let providers = store
        .enabled_providers()
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    if providers.is_empty() {
        println!("providers:   none enabled");
    } else {
        for p in &providers {
            println!("providers:   {} [{}] priority {}", p.id, p.kind, p.priority);
        }
    }

    let active = store
        .setting("active_provider")
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    println!(
        "active:      {}",
        active.as_deref().unwrap_or("(first registered)")
    );
    Ok(())
}

async fn open_store(db: Option<PathBuf>) -> Result<Store> {
    let path = db.unwrap_or_else(default_db_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let url = format!("sqlite://{}", path.display());
    Store::new(&url)
        .await
        .map_err(|e| anyhow::anyhow!("database error: {e}"))
}

fn default_db_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".qwengate").join("qwengate.db")
}
