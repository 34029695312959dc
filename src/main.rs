//! Wingo round server
//!
//! Runs the round scheduler against an in-memory store until Ctrl-C.

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wingo::config::{ConfigLoader, LogLevel};
use wingo::engine::{GameEngine, PlaceBetRequest};
use wingo::games::types::RoundId;
use wingo::notify::GameEvent;
use wingo::scheduler::RoundScheduler;

#[derive(Parser, Debug)]
#[command(name = "wingo")]
#[command(about = "Wingo color/number round engine", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Betting window per round
    #[arg(long)]
    round_duration_secs: Option<u64>,

    /// Scheduler tick interval
    #[arg(long)]
    tick_interval_ms: Option<u64>,

    /// error, warn, info, debug or trace (RUST_LOG takes precedence)
    #[arg(long)]
    log_level: Option<String>,

    /// Funded demo wallets that bet on every round
    #[arg(long, default_value = "0")]
    demo_players: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loader = match &args.config {
        Some(path) => ConfigLoader::new().with_path(path),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load()?;
    if let Some(secs) = args.round_duration_secs {
        config.game.round_duration_secs = secs;
    }
    if let Some(ms) = args.tick_interval_ms {
        config.scheduler.tick_interval_ms = ms;
    }
    if let Some(level) = &args.log_level {
        config.monitoring.log_level = level.parse::<LogLevel>()?;
    }
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("wingo={}", config.monitoring.log_level.as_filter()).into()),
        )
        .init();

    info!(
        round_duration_secs = config.game.round_duration_secs,
        tick_interval_ms = config.scheduler.tick_interval_ms,
        max_loss = %config.risk.max_loss,
        profit_floor = %config.risk.profit_floor_percent,
        "Starting Wingo"
    );

    let engine = Arc::new(GameEngine::builder().with_config(config).build()?);

    let demo = if args.demo_players > 0 {
        Some(spawn_demo_players(engine.clone(), args.demo_players).await?)
    } else {
        None
    };

    let scheduler = RoundScheduler::new(engine.clone());
    scheduler.start().await;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    scheduler.stop().await;
    if let Some(handle) = demo {
        handle.abort();
    }

    Ok(())
}

/// Fund `players` wallets and have each place one random bet per round
async fn spawn_demo_players(
    engine: Arc<GameEngine>,
    players: usize,
) -> Result<JoinHandle<()>, Box<dyn std::error::Error>> {
    let users: Vec<String> = (1..=players).map(|i| format!("demo-{:03}", i)).collect();
    for user in &users {
        engine.credit_wallet(user, dec!(100000), "demo funding").await?;
    }
    info!(players, "Demo players funded");

    let mut events = engine.subscribe();
    Ok(tokio::spawn(async move {
        let mut rng = StdRng::from_entropy();
        loop {
            match events.recv().await {
                Ok(GameEvent::RoundOpened { round_id, .. }) => {
                    for user in &users {
                        let request = random_bet(&mut rng, user, round_id);
                        if let Err(e) = engine.place_bet(request).await {
                            debug!(user_id = %user, error = %e, "Demo bet rejected");
                        }
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Demo players lagged behind events"),
                Err(RecvError::Closed) => break,
            }
        }
    }))
}

fn random_bet(rng: &mut StdRng, user: &str, round_id: RoundId) -> PlaceBetRequest {
    const COLORS: [&str; 3] = ["GREEN", "RED", "VIOLET"];
    const SIZES: [&str; 2] = ["BIG", "SMALL"];

    let (bet_type, selection) = match rng.gen_range(0..3) {
        0 => ("COLOR", COLORS[rng.gen_range(0..COLORS.len())].to_string()),
        1 => ("NUMBER", rng.gen_range(0..10u8).to_string()),
        _ => ("SIZE", SIZES[rng.gen_range(0..SIZES.len())].to_string()),
    };

    PlaceBetRequest {
        user_id: user.to_string(),
        round_id,
        bet_type: bet_type.to_string(),
        selection,
        amount: Decimal::from(rng.gen_range(1..=20u32) * 10),
    }
}
