//! Strictly Relay - tic-tac-toe between two remote players
//!
//! A coordinator owns the authoritative session and talks to two player
//! agents exclusively through an asynchronous message broker.
//!
//! # Architecture
//!
//! - **Protocol**: message vocabulary and envelopes carried by the broker
//! - **Channel**: the broker contract, an in-memory broker and a TCP transport
//! - **Coordinator**: session state machine, the service consuming it, and a
//!   registration lobby
//! - **Agent**: the player-side state machine and its input/render surfaces
//!
//! # Example
//!
//! ```no_run
//! use strictly_relay::{
//!     Address, Coordinator, FirstFreeMoveSource, MemoryBroker, PlayerAgent,
//!     testing::RecordingSink,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let broker = MemoryBroker::new();
//! let queue = Address::new("game_queue");
//!
//! let coordinator = tokio::spawn(Coordinator::new(broker.clone(), queue.clone()).run());
//! for _ in 0..2 {
//!     let agent = PlayerAgent::new(
//!         broker.clone(),
//!         queue.clone(),
//!         queue.clone(),
//!         Box::new(FirstFreeMoveSource::new()),
//!         Box::new(RecordingSink::new()),
//!     );
//!     tokio::spawn(agent.run());
//! }
//! let outcome = coordinator.await??;
//! println!("{}", outcome.result());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod agent;
pub mod channel;
mod config;
pub mod coordinator;
mod error;
mod protocol;
pub mod testing;

// Crate-level exports - Configuration
pub use config::{BROKER_ENV, ConfigError, DEFAULT_CONFIG_FILE, RelayConfig};

// Crate-level exports - Errors
pub use error::{RelayError, RelayErrorKind};

// Crate-level exports - Protocol
pub use protocol::{Address, Envelope, GameResult, Message, PlayerId};

// Crate-level exports - Channel
pub use channel::tcp::{BrokerServer, TcpChannel};
pub use channel::{ChannelError, Consumer, Delivery, MemoryBroker, MessageChannel, Subscription};

// Crate-level exports - Coordinator
pub use coordinator::{Coordinator, Lobby, Session, SessionOutcome, SessionStatus};

// Crate-level exports - Agent
pub use agent::{
    AgentFlow, AgentState, BoardSink, ConsoleBoardSink, ConsoleMoveSource, FirstFreeMoveSource,
    KeypadMoveSource, MoveSource, PlayerAgent, SinkEvent,
};

// Crate-level exports - Board
pub use strictly_tictactoe::{Board, Cell, Marker};
