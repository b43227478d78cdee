//! Command-line interface for strictly_relay.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Strictly Relay - tic-tac-toe between two remote players over a message broker
#[derive(Parser, Debug)]
#[command(name = "strictly_relay")]
#[command(about = "Two-player tic-tac-toe coordinated over a message broker", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to the TOML config file (defaults to ./relay.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// How a player enters moves.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Surface {
    /// Type a cell index and press enter
    Console,
    /// Press 1-9, one key per move
    Keypad,
    /// Play the first free cell automatically
    Auto,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the message broker
    Broker {
        /// Address to listen on (defaults to the configured broker address)
        #[arg(long)]
        listen: Option<String>,
    },

    /// Run the coordinator for one session
    Coordinator,

    /// Run a lobby forwarding registrations to the coordinator
    Lobby {
        /// Lobby address (defaults to the configured lobby address)
        #[arg(long)]
        address: Option<String>,
    },

    /// Join a session as a player
    Player {
        /// Input surface
        #[arg(short, long, value_enum, default_value_t = Surface::Console)]
        surface: Surface,

        /// Register at the lobby instead of the coordinator
        #[arg(long)]
        via_lobby: bool,

        /// Delay before each automatic move, in milliseconds
        #[arg(long, default_value = "0")]
        think_ms: u64,
    },

    /// Run a coordinator and two players in one process, no broker needed
    Local {
        /// Surface for the first player (the second plays automatically)
        #[arg(short, long, value_enum, default_value_t = Surface::Console)]
        surface: Surface,

        /// Delay before each automatic move, in milliseconds
        #[arg(long, default_value = "300")]
        think_ms: u64,
    },
}
