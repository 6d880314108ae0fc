//! uptime-healer CLI
//!
//! Probes a URL, alerts on downtime, and opens AI-generated fix pull requests
//! when the site stays down.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use incidents::{IncidentClient, IncidentFilter, IncidentStatus, NewMonitor};
use notify::{Notifier, NotifyChannel, NotifyEvent, TelegramChannel};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use uptime_healer::ai::provider_from_env;
use uptime_healer::{
    CycleReport, Diagnoser, Driver, GitRemediator, MonitorArgs, Prober, RemediationConfig,
    RemediationOutcome, Settings, StateStore,
};

/// Uptime monitor with AI-assisted automatic remediation
#[derive(Parser)]
#[command(name = "uptime-healer")]
#[command(about = "Uptime monitor with AI-assisted automatic remediation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    monitor: MonitorArgs,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one check cycle (state carries over between invocations)
    Check,
    /// Check repeatedly until Ctrl+C / SIGTERM
    Watch {
        /// Stop after this many cycles
        #[arg(long)]
        max_cycles: Option<u64>,
    },
    /// Show the effective configuration with secrets redacted
    Config,
    /// Send a test chat notification
    NotifyTest,
    /// Reset the persisted escalation state
    ResetState,
    /// Query the incident API
    Incidents {
        #[command(subcommand)]
        command: IncidentsCommand,
    },
}

#[derive(Subcommand)]
enum IncidentsCommand {
    /// List incidents
    List {
        /// Only incidents with this status (open, investigating, resolved)
        #[arg(long)]
        status: Option<String>,

        #[arg(long, default_value = "50")]
        limit: u32,
    },
    /// Show one incident
    Show { incident_id: String },
    /// List registered monitors
    Monitors,
    /// Register the monitored URL as a monitor
    Register {
        /// Monitor name (default: the URL)
        #[arg(long)]
        name: Option<String>,
    },
    /// Show a monitor's status
    MonitorStatus { monitor_id: String },
    /// Delete a monitor
    Unregister { monitor_id: String },
    /// Check incident API connectivity
    Health,
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose {
        "uptime_healer=debug,notify=debug,incidents=debug"
    } else {
        "uptime_healer=info,notify=info,incidents=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_driver(settings: &Settings) -> Result<Driver> {
    let prober = Prober::new(settings.probe.clone()).context("Failed to build HTTP client")?;

    let mut driver = Driver::new(&settings.url, settings.down_threshold, prober, Notifier::from_env())
        .with_state_store(StateStore::new(&settings.state_file));

    let incidents = IncidentClient::from_env().context("Invalid incident API configuration")?;
    if incidents.enabled() {
        driver = driver.with_incidents(incidents);
    } else {
        info!("Incident API disabled (PORTIA_API_KEY not set)");
    }

    let provider = provider_from_env().context("Invalid AI provider configuration")?;
    driver = driver.with_diagnoser(Diagnoser::new(provider));

    match RemediationConfig::from_env(&settings.work_root)? {
        Some(config) => {
            let remediator = GitRemediator::new(config).context("Failed to set up remediation")?;
            driver = driver.with_remediator(Arc::new(remediator));
        }
        None => info!("GitHub integration disabled (GITHUB_TOKEN not set)"),
    }

    Ok(driver)
}

fn print_report(report: &CycleReport, threshold: u32) {
    let check = &report.check;
    if check.is_up() {
        let latency = check
            .latency_secs()
            .map_or_else(String::new, |s| format!(" in {s:.3}s"));
        println!("{} {}{}", "✓".green(), "UP".green().bold(), latency);
    } else {
        println!(
            "{} {} {} ({}/{})",
            "✗".red(),
            "DOWN".red().bold(),
            check.error(),
            report.state.consecutive_down_count,
            threshold
        );
        if report.state.is_escalated(threshold) {
            println!("  {} threshold reached", "!".red().bold());
        }
    }

    match &report.remediation {
        Some(RemediationOutcome::Opened(pr)) => {
            println!("  {} PR #{} {}", "→".cyan(), pr.number, pr.url.cyan());
        }
        Some(RemediationOutcome::Skipped(reason)) => {
            println!("  {} remediation skipped: {}", "→".yellow(), reason);
        }
        Some(RemediationOutcome::NotDiagnosed(reason) | RemediationOutcome::Failed(reason)) => {
            println!("  {} remediation failed: {}", "→".red(), reason);
        }
        Some(RemediationOutcome::AlreadyRunning) => {
            println!("  {} remediation already running", "→".yellow());
        }
        None => {}
    }

    if report.alerts_sent > 0 {
        println!("  {} alert sent", "→".dimmed());
    }
    if report.recovery_sent {
        println!("  {} recovery notice sent", "→".dimmed());
    }
}

async fn run_watch(mut driver: Driver, settings: &Settings, max_cycles: Option<u64>) {
    let resumed = &driver.state().escalation;
    info!(
        url = driver.url(),
        interval_secs = settings.interval.as_secs(),
        threshold = driver.threshold(),
        down_count = resumed.consecutive_down_count,
        escalated = resumed.is_escalated(driver.threshold()),
        "Starting continuous monitoring"
    );

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut cycles = 0_u64;
    loop {
        let report = driver.run_cycle().await;
        print_report(&report, driver.threshold());
        cycles += 1;

        if max_cycles.is_some_and(|max| cycles >= max) {
            info!(cycles, "Reached cycle limit");
            break;
        }

        tokio::select! {
            () = tokio::time::sleep(settings.interval) => {}
            () = &mut shutdown => break,
        }
    }
    info!(cycles, "Monitoring stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}

fn enabled(flag: bool) -> colored::ColoredString {
    if flag {
        "enabled".green()
    } else {
        "disabled".red()
    }
}

fn show_config(monitor: &MonitorArgs) -> Result<()> {
    println!("{}", "Monitor".bold());
    match Settings::from_args(monitor) {
        Ok(settings) => {
            println!("  url:              {}", settings.url);
            println!("  down threshold:   {}", settings.down_threshold);
            println!("  interval:         {}s", settings.interval.as_secs());
            println!(
                "  probe:            {} attempt(s), {}s timeout, {}ms delay",
                settings.probe.max_attempts,
                settings.probe.timeout.as_secs(),
                settings.probe.retry_delay.as_millis()
            );
            println!("  state file:       {}", settings.state_file.display());
            println!("  work root:        {}", settings.work_root.display());
        }
        Err(e) => println!("  {} {e}", "invalid:".red()),
    }

    println!("{}", "Collaborators".bold());
    println!("  telegram:         {}", enabled(TelegramChannel::from_env().enabled()));

    let provider = provider_from_env()?;
    println!(
        "  ai:               {} ({}, model {})",
        enabled(provider.is_configured()),
        provider.name(),
        provider.model()
    );

    let work_root = monitor
        .work_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("uptime-healer"));
    match RemediationConfig::from_env(work_root) {
        Ok(Some(config)) => println!("  github:           {} ({})", enabled(true), config.repo_path()),
        Ok(None) => println!("  github:           {}", enabled(false)),
        Err(e) => println!("  github:           {} {e}", "invalid:".red()),
    }

    let incidents = IncidentClient::from_env()?;
    let config = incidents.config();
    println!(
        "  incident api:     {} ({}, key {})",
        enabled(incidents.enabled()),
        config.base_url,
        config.redacted_key().unwrap_or_else(|| "none".to_string())
    );
    Ok(())
}

fn parse_status(status: &str) -> Result<IncidentStatus> {
    match status.to_ascii_lowercase().as_str() {
        "open" => Ok(IncidentStatus::Open),
        "investigating" => Ok(IncidentStatus::Investigating),
        "resolved" => Ok(IncidentStatus::Resolved),
        other => bail!("Unknown incident status '{other}'"),
    }
}

async fn run_incidents(command: IncidentsCommand, cli_monitor: &MonitorArgs) -> Result<()> {
    let client = IncidentClient::from_env()?;
    if !client.enabled() {
        bail!("Incident API is disabled: set PORTIA_API_KEY");
    }

    match command {
        IncidentsCommand::List { status, limit } => {
            let filter = IncidentFilter {
                status: status.as_deref().map(parse_status).transpose()?,
                limit,
                ..IncidentFilter::default()
            };
            let incidents = client.list_incidents(&filter).await?;
            if incidents.is_empty() {
                println!("No incidents");
            }
            for incident in incidents {
                println!(
                    "{}  {:<13} {:<8} {}",
                    incident.key().unwrap_or("-").bold(),
                    incident.status.as_deref().unwrap_or("-"),
                    incident.severity.as_deref().unwrap_or("-"),
                    incident.title.as_deref().unwrap_or("")
                );
            }
        }
        IncidentsCommand::Show { incident_id } => {
            let incident = client.get_incident(&incident_id).await?;
            println!("{}", serde_json::to_string_pretty(&incident)?);
        }
        IncidentsCommand::Monitors => {
            let monitors = client.list_monitors().await?;
            if monitors.is_empty() {
                println!("No monitors");
            }
            for monitor in monitors {
                println!(
                    "{}  {:<10} {}",
                    monitor.key().unwrap_or("-").bold(),
                    monitor.status.as_deref().unwrap_or("-"),
                    monitor.url.as_deref().unwrap_or("")
                );
            }
        }
        IncidentsCommand::Register { name } => {
            let settings = Settings::from_args(cli_monitor)?;
            let monitor = NewMonitor::new(
                name.unwrap_or_else(|| settings.url.clone()),
                &settings.url,
                settings.interval.as_secs(),
            );
            let created = client.create_monitor(&monitor).await?;
            println!("{} monitor {}", "✓".green(), created.key().unwrap_or("(no id)"));
        }
        IncidentsCommand::MonitorStatus { monitor_id } => {
            let status = client.monitor_status(&monitor_id).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        IncidentsCommand::Unregister { monitor_id } => {
            client.delete_monitor(&monitor_id).await?;
            println!("{} deleted monitor {monitor_id}", "✓".green());
        }
        IncidentsCommand::Health => {
            if client.health_check().await {
                println!("{} incident API reachable", "✓".green());
            } else {
                bail!("Incident API health check failed");
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; the environment may already be set.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json);

    match cli.command {
        Commands::Check => {
            let settings = Settings::from_args(&cli.monitor)?;
            let mut driver = build_driver(&settings)?;
            let report = driver.run_cycle().await;
            print_report(&report, driver.threshold());
        }
        Commands::Watch { max_cycles } => {
            let settings = Settings::from_args(&cli.monitor)?;
            let driver = build_driver(&settings)?;
            run_watch(driver, &settings, max_cycles).await;
        }
        Commands::Config => show_config(&cli.monitor)?,
        Commands::NotifyTest => {
            let notifier = Notifier::from_env();
            let delivered = notifier
                .notify(&NotifyEvent::Test {
                    timestamp: chrono::Utc::now(),
                })
                .await;
            if !delivered {
                bail!("Test notification was not delivered (check TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID)");
            }
            println!("{} test notification sent", "✓".green());
        }
        Commands::ResetState => {
            let store = StateStore::new(&cli.monitor.state_file);
            store
                .reset()
                .with_context(|| format!("Failed to reset {}", store.path().display()))?;
            println!("{} state reset", "✓".green());
        }
        Commands::Incidents { command } => run_incidents(command, &cli.monitor).await?,
    }

    Ok(())
}
