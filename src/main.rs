//! Main entry point for the matchmaker simulator
//!
//! Runs a set of peers against a shared in-memory directory. Every peer
//! calls join-or-create at the same time, then the simulator reports which
//! sessions formed once the run time is over.

use anyhow::Result;
use clap::Parser;
use peer_matchmaker::backend::{SessionEvents, SessionSummary, SimulatedBackend, SimulatedNetwork};
use peer_matchmaker::config::AppConfig;
use peer_matchmaker::coordinator::{CoordinatorPhase, MatchCoordinator};
use peer_matchmaker::directory::{InMemoryDirectory, InMemoryRegistry};
use peer_matchmaker::retry::{Timer, TokioTimer};
use peer_matchmaker::types::{LocalIdentity, SessionRole};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::signal;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Peer Matchmaker Simulator - racing peers converging on shared sessions
#[derive(Parser)]
#[command(
    name = "matchmaker-sim",
    version,
    about = "Simulate peers joining or hosting sessions through a shared directory",
    long_about = "Spins up a number of in-process peers that share one in-memory session \
                 directory. Each peer runs join-or-create; hosts that are still under-populated \
                 keep probing for a preferred host until the minimum population is reached."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Number of simulated peers
    #[arg(short, long, value_name = "COUNT", help = "Override number of peers")]
    peers: Option<usize>,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Run time override
    #[arg(long, value_name = "SECONDS", help = "Override simulation run time")]
    run_seconds: Option<u64>,

    /// Dry run mode (validate config and exit)
    #[arg(long, help = "Validate configuration and exit without simulating")]
    dry_run: bool,

    /// Print every peer's metrics after the run
    #[arg(long, help = "Print Prometheus metrics of every peer after the run")]
    metrics: bool,

    /// Emit the report as JSON
    #[arg(long, help = "Print the final report as JSON")]
    json: bool,
}

/// Final state of one simulated peer
#[derive(Debug, Serialize)]
struct PeerReport {
    identity: String,
    role: Option<SessionRole>,
    phase: CoordinatorPhase,
    connected_peers: usize,
    min_peers_attempts: u32,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    peers: Vec<PeerReport>,
    sessions: Vec<SessionSummary>,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Display startup banner with simulation information
fn display_startup_banner(config: &AppConfig) {
    info!("🎲 Peer Matchmaker Simulator");
    info!("   Service: {}", config.service.name);
    info!("   Game type: {}", config.matchmaking.game_type_key);
    info!(
        "   Peers: {} (limit {} per session, min {})",
        config.simulation.peers, config.matchmaking.peer_limit, config.matchmaking.min_peers
    );
    info!(
        "   Directory latency: {}ms",
        config.simulation.directory_latency_ms
    );
    info!("   Run time: {}s", config.simulation.run_seconds);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Load configuration and apply CLI overrides
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        info!("Loading configuration from: {}", config_path.display());
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if let Some(peers) = args.peers {
        config.simulation.peers = peers;
    }

    if let Some(run_seconds) = args.run_seconds {
        config.simulation.run_seconds = run_seconds;
    }

    peer_matchmaker::config::validate_config(&config)?;
    Ok(config)
}

/// Wait for SIGINT, returning early from the run
async fn wait_for_interrupt() {
    if let Err(e) = signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Build every peer and let them race
async fn run_simulation(config: &AppConfig, json: bool) -> Result<Vec<Arc<MatchCoordinator>>> {
    let directory = Arc::new(InMemoryDirectory::new());
    let network = Arc::new(SimulatedNetwork::new(
        Handle::current(),
        directory.clone(),
        &config.matchmaking.game_type_key,
    ));
    let timer: Arc<dyn Timer> = Arc::new(TokioTimer::try_current()?);

    let mut coordinators = Vec::with_capacity(config.simulation.peers);
    for _ in 0..config.simulation.peers {
        let identity = LocalIdentity::generate();
        let registry = Arc::new(InMemoryRegistry::new(
            directory.clone(),
            config.directory_latency(),
        ));
        let backend = Arc::new(SimulatedBackend::new(
            identity.clone(),
            network.clone(),
            config.simulation.public_address,
        ));

        let coordinator = MatchCoordinator::new(
            config.matchmaking.clone(),
            identity.clone(),
            registry,
            backend,
            timer.clone(),
        )?;
        let events = Arc::downgrade(&coordinator);
        let events: Weak<dyn SessionEvents> = events;
        network.attach(&identity, events);
        coordinators.push(coordinator);
    }

    for coordinator in &coordinators {
        coordinator.join_or_create_game()?;
    }

    tokio::select! {
        _ = sleep(config.run_duration()) => {
            info!("Simulation time elapsed");
        },
        _ = wait_for_interrupt() => {
            info!("Received SIGINT (Ctrl+C) signal, ending simulation early");
        },
    }

    for coordinator in &coordinators {
        coordinator.stop_auto_retry()?;
    }

    print_report(&coordinators, network.sessions(), config, json)?;
    Ok(coordinators)
}

fn print_report(
    coordinators: &[Arc<MatchCoordinator>],
    sessions: Vec<SessionSummary>,
    config: &AppConfig,
    json: bool,
) -> Result<()> {
    let mut peers = Vec::with_capacity(coordinators.len());
    for coordinator in coordinators {
        let state = coordinator.snapshot()?;
        peers.push(PeerReport {
            identity: coordinator.identity().to_string(),
            role: state.role,
            phase: state.phase,
            connected_peers: state.current_peer_count,
            min_peers_attempts: state.min_peers_attempts,
        });
    }
    let report = SimulationReport { peers, sessions };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Sessions formed: {}", report.sessions.len());
    for session in &report.sessions {
        let population = session.members.len() + 1;
        let marker = if population >= config.matchmaking.min_peers {
            "✅"
        } else {
            "⚠️ "
        };
        println!(
            "  {} host {} with {}/{} peers",
            marker, session.host, population, config.matchmaking.peer_limit
        );
        for member in &session.members {
            println!("       - {}", member);
        }
    }
    for peer in &report.peers {
        println!(
            "  peer {} role={:?} phase={} probes={}",
            peer.identity, peer.role, peer.phase, peer.min_peers_attempts
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration (CLI args can override environment/config file)
    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    // Initialize logging early (before any other operations)
    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without simulating");
        return Ok(());
    }

    display_startup_banner(&config);

    let coordinators = match run_simulation(&config, args.json).await {
        Ok(coordinators) => coordinators,
        Err(e) => {
            error!("Simulation failed: {}", e);
            std::process::exit(1);
        }
    };

    if args.metrics {
        for coordinator in &coordinators {
            println!("# peer {}", coordinator.identity());
            print!("{}", coordinator.metrics().gather_text()?);
        }
    }

    info!("🛑 Peer Matchmaker Simulator finished");
    Ok(())
}
