//! Pure tic-tac-toe board logic.
//!
//! The [`Board`] is a value type: nine cells, win/draw evaluation and a
//! 9-character wire encoding. No I/O and no async.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod rules;
mod types;
mod wire;

pub use error::{BoardError, BoardErrorKind, WireError, WireErrorKind};
pub use rules::{WINNING_TRIPLES, check_winner, is_full};
pub use types::{Board, CELL_COUNT, Cell, Marker};
