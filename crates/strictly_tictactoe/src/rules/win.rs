//! Win detection logic for tic-tac-toe.

use crate::{Board, Cell, Marker};
use tracing::instrument;

/// The eight winning index triples in evaluation order.
pub const WINNING_TRIPLES: [[usize; 3]; 8] = [
    // Rows
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    // Columns
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    // Diagonals
    [0, 4, 8],
    [2, 4, 6],
];

/// Checks if there is a winner on the board.
///
/// Returns the marker of the first triple holding three identical markers,
/// `None` otherwise.
#[instrument(skip(board))]
pub fn check_winner(board: &Board) -> Option<Marker> {
    let cells = board.cells();
    WINNING_TRIPLES.iter().find_map(|[a, b, c]| match cells[*a] {
        Cell::Marked(marker) if cells[*b] == cells[*a] && cells[*c] == cells[*a] => Some(marker),
        _ => None,
    })
}
