use anyhow::Result;
use chrono::Utc;
use safemon_lookup::SafeBrowsingClient;
use safemon_notify::channels::TelegramChannel;
use safemon_notify::{NotificationChannel, NotificationManager};
use safemon_storage::{DomainRegistry, SqliteStore};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use safemon_server::app;
use safemon_server::cli::{parse_args, Command, USAGE};
use safemon_server::config::ServerConfig;
use safemon_server::scan::{ScanOrchestrator, ScanScheduler, ScanTrigger, TriggerError};
use safemon_server::state::AppState;

/// Snowflake node ids: the long-running server and one-shot CLI commands
/// never share one, so ids stay unique when both write to the same database.
const SERVER_NODE_ID: i32 = 1;
const CLI_NODE_ID: i32 = 2;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("{USAGE}");
}

fn load_config(path: &str, node_id: i32) -> Result<ServerConfig> {
    let config = ServerConfig::load(path)?;
    safemon_common::id::init(config.machine_id, node_id);
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("safemon=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(e) => {
            print_usage();
            anyhow::bail!(e);
        }
    };
    let node_id = if command.is_server() { SERVER_NODE_ID } else { CLI_NODE_ID };

    match command {
        Command::Help => {
            print_usage();
            Ok(())
        }
        Command::Serve { config_path } => run_server(load_config(&config_path, node_id)?).await,
        Command::AddDomain {
            config_path,
            hostname,
            notes,
            category_id,
        } => {
            let config = load_config(&config_path, node_id)?;
            run_add_domain(&config, &hostname, &notes, category_id.as_deref())
        }
        Command::RemoveDomain { config_path, id } => run_remove_domain(&load_config(&config_path, node_id)?, &id),
        Command::ListDomains { config_path } => run_list_domains(&load_config(&config_path, node_id)?),
        Command::ShowDomain { config_path, hostname } => {
            run_show_domain(&load_config(&config_path, node_id)?, &hostname)
        }
        Command::AddCategory {
            config_path,
            name,
            color,
        } => run_add_category(&load_config(&config_path, node_id)?, &name, color.as_deref()),
        Command::ListCategories { config_path } => run_list_categories(&load_config(&config_path, node_id)?),
        Command::UpdateCategory {
            config_path,
            id,
            name,
            color,
        } => {
            let config = load_config(&config_path, node_id)?;
            run_update_category(&config, &id, name.as_deref(), color.as_deref())
        }
        Command::DeleteCategory { config_path, id } => {
            run_delete_category(&load_config(&config_path, node_id)?, &id)
        }
        Command::Scan { config_path } => run_scan_once(&load_config(&config_path, node_id)?).await,
        Command::TestNotify { config_path } => run_test_notify(&load_config(&config_path, node_id)?).await,
    }
}

fn open_store(config: &ServerConfig) -> Result<Arc<SqliteStore>> {
    Ok(Arc::new(SqliteStore::new(Path::new(&config.data_dir))?))
}

fn build_notifier(config: &ServerConfig) -> Result<NotificationManager> {
    let channel: Option<Box<dyn NotificationChannel>> = match config.telegram.credentials() {
        Some((token, chat_id)) => Some(Box::new(TelegramChannel::new(
            token,
            chat_id,
            &config.telegram.api_base,
            config.telegram.timeout_secs,
        )?)),
        None => {
            tracing::warn!("Telegram not configured, flagged-domain alerts are disabled");
            None
        }
    };
    Ok(NotificationManager::new(channel, config.dashboard_url.clone()))
}

fn build_orchestrator(config: &ServerConfig, store: Arc<SqliteStore>) -> Result<ScanOrchestrator> {
    if !config.has_lookup_key() {
        tracing::warn!("No Safe Browsing API key configured; every scan cycle will fail until one is set");
    }
    let lookup = Arc::new(SafeBrowsingClient::new(config.safe_browsing_config())?);
    let notifier = Arc::new(build_notifier(config)?);
    Ok(
        ScanOrchestrator::new(store.clone(), store, lookup, notifier)
            .with_summary_notifications(config.scan.notify_summary),
    )
}

#[allow(clippy::print_stdout)]
fn run_add_domain(config: &ServerConfig, hostname: &str, notes: &str, category_id: Option<&str>) -> Result<()> {
    let store = open_store(config)?;
    let domain = store.add_domain(hostname, notes, category_id)?;
    println!("{}", serde_json::to_string_pretty(&domain)?);
    Ok(())
}

fn run_remove_domain(config: &ServerConfig, id: &str) -> Result<()> {
    let store = open_store(config)?;
    if !store.deactivate_domain(id)? {
        anyhow::bail!("domain '{id}' not found");
    }
    tracing::info!(domain_id = %id, "Domain deactivated");
    Ok(())
}

#[allow(clippy::print_stdout)]
fn run_list_domains(config: &ServerConfig) -> Result<()> {
    let store = open_store(config)?;
    for domain in store.list_active()? {
        println!(
            "{}\t{}\t{}\t{}",
            domain.id,
            domain.domain,
            domain.category_name.as_deref().unwrap_or("-"),
            domain.notes
        );
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
fn run_show_domain(config: &ServerConfig, hostname: &str) -> Result<()> {
    let store = open_store(config)?;
    match store.get_domain_by_name(hostname)? {
        Some(domain) => {
            println!("{}", serde_json::to_string_pretty(&domain)?);
            Ok(())
        }
        None => anyhow::bail!("domain '{hostname}' not registered"),
    }
}

#[allow(clippy::print_stdout)]
fn run_add_category(config: &ServerConfig, name: &str, color: Option<&str>) -> Result<()> {
    let store = open_store(config)?;
    let category = store.add_category(name, color)?;
    println!("{}", serde_json::to_string_pretty(&category)?);
    Ok(())
}

#[allow(clippy::print_stdout)]
fn run_list_categories(config: &ServerConfig) -> Result<()> {
    let store = open_store(config)?;
    for category in store.list_categories()? {
        println!("{}\t{}\t{}", category.id, category.name, category.color);
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
fn run_update_category(config: &ServerConfig, id: &str, name: Option<&str>, color: Option<&str>) -> Result<()> {
    let store = open_store(config)?;
    let category = store.update_category(id, name, color)?;
    println!("{}", serde_json::to_string_pretty(&category)?);
    Ok(())
}

fn run_delete_category(config: &ServerConfig, id: &str) -> Result<()> {
    let store = open_store(config)?;
    let unassigned = store.delete_category(id)?;
    tracing::info!(category_id = %id, unassigned, "Category deleted");
    Ok(())
}

/// Leased trigger over the configured store. The lease is shared with any
/// server process pointing at the same `data_dir`.
fn build_trigger(config: &ServerConfig, store: Arc<SqliteStore>) -> Result<ScanTrigger> {
    let orchestrator = Arc::new(build_orchestrator(config, store.clone())?);
    Ok(ScanTrigger::new(orchestrator).with_lease(store, config.scan.lease_secs))
}

#[allow(clippy::print_stdout)]
async fn run_scan_once(config: &ServerConfig) -> Result<()> {
    let store = open_store(config)?;
    let trigger = build_trigger(config, store)?;
    let result = match trigger.run_now().await {
        Ok(result) => result,
        Err(TriggerError::AlreadyRunning) => {
            anyhow::bail!("another scan cycle is running against '{}'", config.data_dir)
        }
        Err(TriggerError::Scan(e)) => return Err(e.into()),
    };
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn run_test_notify(config: &ServerConfig) -> Result<()> {
    let notifier = build_notifier(config)?;
    let username = notifier.verify().await?;
    tracing::info!(bot = %username, "Telegram bot verified");
    notifier.send_test_message().await?;
    tracing::info!("Test message sent");
    Ok(())
}

async fn run_server(config: ServerConfig) -> Result<()> {

    tracing::info!(
        http_port = config.http_port,
        data_dir = %config.data_dir,
        scan_enabled = config.scan.enabled,
        interval_secs = config.scan.interval_secs,
        "safemon-server starting"
    );
    if config.trigger.secret.is_none() {
        tracing::warn!("No trigger secret configured; protected endpoints will refuse every request");
    }

    let store = open_store(&config)?;
    let trigger = build_trigger(&config, store.clone())?;

    let state = AppState {
        registry: store.clone(),
        results: store,
        trigger: trigger.clone(),
        start_time: Utc::now(),
        config: Arc::new(config.clone()),
    };

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let app = app::build_http_app(state);
    let http_listener = tokio::net::TcpListener::bind(http_addr).await?;
    let http_server = axum::serve(http_listener, app);

    let scheduler_handle = if config.scan.enabled {
        let scheduler = ScanScheduler::new(trigger, config.scan.interval_secs, config.scan.run_on_startup);
        Some(tokio::spawn(async move {
            scheduler.run().await;
        }))
    } else {
        tracing::info!("Scan scheduler disabled");
        None
    };

    tracing::info!(http = %http_addr, "Server started");

    tokio::select! {
        result = http_server.with_graceful_shutdown(async { signal::ctrl_c().await.ok(); }) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server error");
            }
        }
        _ = signal::ctrl_c() => {
            tracing::info!("Shutting down gracefully");
        }
    }

    if let Some(h) = scheduler_handle {
        h.abort();
    }
    tracing::info!("Server stopped");

    Ok(())
}
