//! Nine-character board encoding used by board-state messages.
//!
//! One character per cell in row-major order: `' '` for empty, `'X'` and
//! `'O'` for markers.

use crate::error::{WireError, WireErrorKind};
use crate::{Board, CELL_COUNT, Cell, Marker};
use tracing::instrument;

const EMPTY: char = ' ';

impl Board {
    /// Encodes the board as a 9-character string.
    pub fn to_wire_string(&self) -> String {
        self.cells()
            .iter()
            .map(|cell| match cell {
                Cell::Empty => EMPTY,
                Cell::Marked(Marker::X) => 'X',
                Cell::Marked(Marker::O) => 'O',
            })
            .collect()
    }

    /// Decodes a 9-character board string.
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] when the length (in characters) is not nine or
    /// a character falls outside the `' '`, `'X'`, `'O'` alphabet.
    #[instrument]
    pub fn from_wire_string(s: &str) -> Result<Self, WireError> {
        let count = s.chars().count();
        if count != CELL_COUNT {
            return Err(WireError::new(WireErrorKind::WrongLength(count)));
        }

        let mut cells = [Cell::Empty; CELL_COUNT];
        for (index, ch) in s.chars().enumerate() {
            cells[index] = match ch {
                EMPTY => Cell::Empty,
                'X' => Cell::Marked(Marker::X),
                'O' => Cell::Marked(Marker::O),
                found => {
                    return Err(WireError::new(WireErrorKind::BadCharacter { index, found }));
                }
            };
        }
        Ok(Board::from_cells(cells))
    }
}
