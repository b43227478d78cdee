//! Client side: the player agent and its input/render surfaces.

mod auto;
mod console;
mod player;
mod surface;

pub use auto::FirstFreeMoveSource;
pub use console::{ConsoleBoardSink, ConsoleMoveSource, KeypadMoveSource};
pub use player::{AgentFlow, AgentState, PlayerAgent, parse_cell};
pub use surface::{BoardSink, MoveSource, SinkEvent};
