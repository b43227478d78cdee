//! Strictly Relay - Unified CLI
//!
//! Broker, coordinator, lobby and player processes for broker-mediated
//! tic-tac-toe.

#![warn(missing_docs)]

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command, Surface};
use std::time::Duration;
use strictly_relay::{
    Address, BoardSink, BrokerServer, ConsoleBoardSink, ConsoleMoveSource, Coordinator,
    FirstFreeMoveSource, KeypadMoveSource, Lobby, MemoryBroker, MessageChannel, MoveSource,
    PlayerAgent, RelayConfig, TcpChannel,
};
use tracing::{info, instrument, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    initialize_tracing();

    let config = RelayConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Broker { listen } => run_broker(&config, listen).await,
        Command::Coordinator => run_coordinator(&config).await,
        Command::Lobby { address } => run_lobby(&config, address).await,
        Command::Player {
            surface,
            via_lobby,
            think_ms,
        } => {
            let config = if via_lobby {
                config.with_register_via_lobby(true)
            } else {
                config
            };
            run_player(&config, surface, think_ms).await
        }
        Command::Local { surface, think_ms } => run_local(&config, surface, think_ms).await,
    }
}

/// Logs go to stderr so the console surfaces own stdout.
fn initialize_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,strictly_relay=debug")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Builds the move source for a surface.
fn move_source(surface: Surface, think_ms: u64) -> Box<dyn MoveSource> {
    match surface {
        Surface::Console => Box::new(ConsoleMoveSource::new()),
        Surface::Keypad => Box::new(KeypadMoveSource::new()),
        Surface::Auto => Box::new(FirstFreeMoveSource::with_think_time(
            Duration::from_millis(think_ms),
        )),
    }
}

fn board_sink() -> Box<dyn BoardSink> {
    Box::new(ConsoleBoardSink::new())
}

/// Run the TCP broker until interrupted
#[instrument(skip(config))]
async fn run_broker(config: &RelayConfig, listen: Option<String>) -> Result<()> {
    let listen = listen.unwrap_or_else(|| config.broker().clone());
    let server = BrokerServer::bind(&listen, MemoryBroker::new())
        .await
        .with_context(|| format!("binding broker to {listen}"))?;
    info!(addr = %server.local_addr()?, "Broker listening");

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Broker shutting down"),
    }
    Ok(())
}

async fn connect(config: &RelayConfig) -> Result<TcpChannel> {
    TcpChannel::connect(config.broker())
        .await
        .with_context(|| format!("connecting to broker at {}", config.broker()))
}

/// Run one coordinator session over the configured broker
#[instrument(skip(config), fields(broker = %config.broker()))]
async fn run_coordinator(config: &RelayConfig) -> Result<()> {
    let channel = connect(config).await?;
    let outcome = Coordinator::new(channel, config.coordinator_address().clone())
        .run()
        .await?;
    info!(
        result = %outcome.result(),
        board = %outcome.board().to_wire_string(),
        "Session finished"
    );
    println!("{}", outcome.board());
    println!("Result: {}", outcome.result());
    Ok(())
}

/// Run the lobby until the broker goes away
#[instrument(skip(config), fields(broker = %config.broker()))]
async fn run_lobby(config: &RelayConfig, address: Option<String>) -> Result<()> {
    let address = address
        .map(Address::from)
        .or_else(|| config.lobby_address().clone())
        .context("no lobby address given and none configured")?;
    let channel = connect(config).await?;
    let lobby = Lobby::new(channel, address, config.coordinator_address().clone());

    tokio::select! {
        result = lobby.run() => {
            let forwarded = result?;
            info!(forwarded, "Lobby stopped");
        }
        _ = tokio::signal::ctrl_c() => info!("Lobby shutting down"),
    }
    Ok(())
}

/// Join a session as a player over the configured broker
#[instrument(skip(config), fields(broker = %config.broker()))]
async fn run_player(config: &RelayConfig, surface: Surface, think_ms: u64) -> Result<()> {
    let channel = connect(config).await?;
    let register_at = config.registration_address()?;
    info!(%register_at, %surface, "Joining session");

    let agent = PlayerAgent::new(
        channel,
        register_at,
        config.coordinator_address().clone(),
        move_source(surface, think_ms),
        board_sink(),
    );
    let result = agent.run().await?;
    info!(%result, "Player finished");
    Ok(())
}

/// Run a coordinator and two agents in-process over the memory broker
#[instrument(skip(config))]
async fn run_local(config: &RelayConfig, surface: Surface, think_ms: u64) -> Result<()> {
    let broker = MemoryBroker::new();
    let queue = config.coordinator_address().clone();
    broker.declare(&queue).await?;

    let coordinator = Coordinator::new(broker.clone(), queue.clone()).run();
    let first = PlayerAgent::new(
        broker.clone(),
        queue.clone(),
        queue.clone(),
        move_source(surface, think_ms),
        board_sink(),
    )
    .run();
    let second = PlayerAgent::new(
        broker.clone(),
        queue.clone(),
        queue.clone(),
        move_source(Surface::Auto, think_ms),
        Box::new(QuietSink),
    )
    .run();

    let (outcome, first_result, second_result) =
        futures::future::try_join3(coordinator, first, second).await?;
    if first_result != second_result {
        warn!(%first_result, %second_result, "Players saw different results");
    }
    info!(result = %outcome.result(), discarded = outcome.discarded(), "Local session finished");
    Ok(())
}

/// Sink for the automatic opponent in local mode; the console already shows
/// the shared board.
struct QuietSink;

impl BoardSink for QuietSink {
    fn render(&mut self, _event: strictly_relay::SinkEvent<'_>) {}
}
