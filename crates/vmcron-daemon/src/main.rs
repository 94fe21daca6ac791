//! vmcron - scheduled power actions for Proxmox VE guests

mod sync;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use vmcron_core::config::VmcronConfig;
use vmcron_core::types::{GroupId, PowerAction};
use vmcron_proxmox::ProxmoxClient;
use vmcron_scheduler::{
    blackout, cron, wait_for_task, ActionDispatcher, CronExpr, EngineStore, FireRunner,
    ManualActions, PollPolicy, SqliteStore, SystemClock, TaskOutcome, TriggerRegistry,
};

#[derive(Parser)]
#[command(
    name = "vmcron",
    version,
    about = "Cron-driven power actions for Proxmox VE virtual machines and containers"
)]
struct Cli {
    /// Config file (defaults to $VMCRON_CONFIG, then ~/.vmcron/vmcron.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler until interrupted
    Run,
    /// Refresh the local inventory from the cluster once
    Sync,
    /// Run a power action on one guest now
    Action {
        vmid: u32,
        action: PowerAction,
        /// Poll the resulting task until it finishes
        #[arg(long)]
        wait: bool,
    },
    /// Run a power action on every member of a group now
    GroupAction { group_id: GroupId, action: PowerAction },
    /// List upcoming fires of enabled schedules
    Preview {
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
    /// Validate a cron expression and show its next fire times
    CheckCron {
        expression: String,
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = VmcronConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("Config load failed ({e}), using defaults");
        VmcronConfig::default()
    });

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("vmcron={}", config.log.level).into()),
        )
        .init();

    match cli.command {
        Commands::Run => run(config).await,
        Commands::Sync => {
            let store = open_store(&config)?;
            let client = build_client(&config)?;
            let stats = sync::sync_inventory(&client, &store).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Commands::Action { vmid, action, wait } => run_action(&config, vmid, action, wait).await,
        Commands::GroupAction { group_id, action } => {
            run_group_action(&config, group_id, action).await
        }
        Commands::Preview { hours } => preview(&config, hours),
        Commands::CheckCron { expression, count } => check_cron(&expression, count),
    }
}

async fn run(config: VmcronConfig) -> Result<()> {
    let store = open_store(&config)?;
    let client = Arc::new(build_client(&config)?);

    let runner = FireRunner::new(
        store.clone(),
        store.clone(),
        dispatcher(&config, client.clone()),
        Arc::new(SystemClock),
    );
    let registry = Arc::new(
        TriggerRegistry::new(runner).with_reload_interval(Duration::from_secs(
            config.scheduler.reload_interval_secs.max(1),
        )),
    );

    // Timers must exist for everything enabled before anything else runs.
    let report = registry.start()?;
    info!(
        registered = report.registered,
        skipped = report.skipped,
        "scheduler started"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reload = {
        let registry = registry.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { registry.run(shutdown).await })
    };

    let sync_loop = if config.sync.enabled {
        let interval = Duration::from_secs(config.sync.interval_minutes.max(1) * 60);
        Some(tokio::spawn(sync::run_sync_loop(
            client,
            store,
            interval,
            shutdown_rx,
        )))
    } else {
        info!("inventory sync disabled");
        None
    };

    wait_for_shutdown_signal().await;
    info!("shutdown requested");

    let _ = shutdown_tx.send(true);
    let _ = reload.await;
    if let Some(handle) = sync_loop {
        let _ = handle.await;
    }
    info!("vmcron stopped");
    Ok(())
}

async fn run_action(config: &VmcronConfig, vmid: u32, action: PowerAction, wait: bool) -> Result<()> {
    let store = open_store(config)?;
    let client = Arc::new(build_client(config)?);
    let actions = manual_actions(config, store, client.clone());

    let accepted = actions.run_on_resource(vmid, action).await?;
    println!(
        "{action} accepted for {} ({vmid}) on {}: {}",
        accepted.resource.name, accepted.resource.node, accepted.handle
    );

    if wait {
        let policy = PollPolicy::from_config(&config.scheduler);
        let outcome =
            wait_for_task(client.as_ref(), &accepted.resource.node, &accepted.handle, policy).await;
        match outcome {
            TaskOutcome::Completed => println!("task completed"),
            TaskOutcome::Failed(exit_status) => bail!("task failed: {exit_status}"),
            TaskOutcome::TimedOut => {
                bail!("task still running after {}s", policy.timeout.as_secs())
            }
        }
    }
    Ok(())
}

async fn run_group_action(config: &VmcronConfig, group_id: GroupId, action: PowerAction) -> Result<()> {
    let store = open_store(config)?;
    let client = Arc::new(build_client(config)?);
    let actions = manual_actions(config, store, client);

    let results = actions.run_on_group(group_id, action).await?;
    let mut failed = 0;
    for member in &results {
        match &member.result {
            Ok(handle) => println!("{:>6}  {:<24} ok      {handle}", member.resource.vmid, member.resource.name),
            Err(e) => {
                failed += 1;
                println!("{:>6}  {:<24} failed  {e}", member.resource.vmid, member.resource.name);
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} members failed", results.len());
    }
    Ok(())
}

fn preview(config: &VmcronConfig, hours: i64) -> Result<()> {
    if hours <= 0 {
        bail!("--hours must be positive");
    }
    let store = open_store(config)?;
    let now = Utc::now();
    let until = now + chrono::Duration::hours(hours);
    let blackouts = store.list_enabled_blackouts()?;

    let mut upcoming = Vec::new();
    for schedule in store.list_enabled_schedules()? {
        let expr = match CronExpr::parse(&schedule.cron_expression) {
            Ok(expr) => expr,
            Err(e) => {
                warn!(schedule_id = schedule.id, error = %e, "skipping schedule in preview");
                continue;
            }
        };
        for at in expr.upcoming(now, until) {
            upcoming.push((at, schedule.clone()));
        }
    }
    upcoming.sort_by_key(|(at, schedule)| (*at, schedule.id));

    if upcoming.is_empty() {
        println!("no fires in the next {hours}h");
        return Ok(());
    }
    for (at, schedule) in upcoming {
        let check = blackout::check(at, &blackouts);
        let note = if check.is_suppressed() {
            format!("  (blackout: {})", check.reason())
        } else {
            String::new()
        };
        println!(
            "{}  #{:<4} {:<24} {:<8} {}{note}",
            at.format("%Y-%m-%d %H:%M UTC"),
            schedule.id,
            schedule.name,
            schedule.action,
            schedule.target,
        );
    }
    Ok(())
}

fn check_cron(expression: &str, count: usize) -> Result<()> {
    let expr = CronExpr::parse(expression)?;
    println!("{}", cron::describe(expr.as_str()));

    let mut cursor = Utc::now();
    for _ in 0..count {
        match expr.next_after(cursor) {
            Some(next) => {
                println!("  {}", next.format("%Y-%m-%d %H:%M UTC"));
                cursor = next;
            }
            None => {
                println!("  (never fires)");
                break;
            }
        }
    }
    Ok(())
}

fn open_store(config: &VmcronConfig) -> Result<Arc<SqliteStore>> {
    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");
    let store = SqliteStore::open(db_path)
        .with_context(|| format!("failed to open database at {db_path}"))?;
    Ok(Arc::new(store))
}

fn build_client(config: &VmcronConfig) -> Result<ProxmoxClient> {
    if !config.proxmox.is_configured() {
        bail!("proxmox host, user, token_name and token_value must be configured");
    }
    Ok(ProxmoxClient::new(&config.proxmox)?)
}

fn dispatcher(config: &VmcronConfig, client: Arc<ProxmoxClient>) -> ActionDispatcher {
    ActionDispatcher::new(
        client,
        Duration::from_secs(config.scheduler.dispatch_timeout_secs.max(1)),
    )
}

fn manual_actions(
    config: &VmcronConfig,
    store: Arc<SqliteStore>,
    client: Arc<ProxmoxClient>,
) -> ManualActions {
    ManualActions::new(
        store.clone(),
        store,
        dispatcher(config, client),
        Arc::new(SystemClock),
    )
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
