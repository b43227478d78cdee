//! Win and draw rules for tic-tac-toe.

mod draw;
mod win;

pub use draw::is_full;
pub use win::{WINNING_TRIPLES, check_winner};

use crate::{Board, Marker};

impl Board {
    /// First winning triple's marker, scanning rows, columns, then diagonals.
    pub fn winner(&self) -> Option<Marker> {
        check_winner(self)
    }

    /// True when no empty cell remains.
    pub fn is_full(&self) -> bool {
        is_full(self)
    }

    /// True when the board is full and nobody has won.
    ///
    /// The winner is evaluated first so a full board with a triple is a win.
    pub fn is_draw(&self) -> bool {
        self.winner().is_none() && self.is_full()
    }
}
