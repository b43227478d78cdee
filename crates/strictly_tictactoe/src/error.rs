//! Board and wire-format error types.

use derive_more::{Display, Error};

/// What went wrong when mutating a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BoardErrorKind {
    /// Index outside 0-8.
    #[display("cell index {_0} is out of range (0-8)")]
    OutOfRange(usize),
    /// Cell already holds a marker.
    #[display("cell {_0} is already marked")]
    Occupied(usize),
}

/// Board mutation error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Board error: {} at {}:{}", kind, file, line)]
pub struct BoardError {
    /// Error kind.
    pub kind: BoardErrorKind,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl BoardError {
    /// Creates a new board error with caller location tracking.
    #[track_caller]
    pub fn new(kind: BoardErrorKind) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            line: loc.line(),
            file: loc.file(),
        }
    }

    #[track_caller]
    pub(crate) fn out_of_range(index: usize) -> Self {
        Self::new(BoardErrorKind::OutOfRange(index))
    }

    #[track_caller]
    pub(crate) fn occupied(index: usize) -> Self {
        Self::new(BoardErrorKind::Occupied(index))
    }

    /// True for [`BoardErrorKind::OutOfRange`].
    pub fn is_out_of_range(&self) -> bool {
        matches!(self.kind, BoardErrorKind::OutOfRange(_))
    }
}

/// Why a board-state string could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum WireErrorKind {
    /// Not exactly nine characters.
    #[display("expected 9 cells, got {_0}")]
    WrongLength(usize),
    /// Character outside `' '`, `'X'`, `'O'`.
    #[display("unexpected character {found:?} at cell {index}")]
    BadCharacter {
        /// Cell index of the offending character.
        index: usize,
        /// The character found.
        found: char,
    },
}

/// Malformed board-state string.
#[derive(Debug, Clone, Display, Error)]
#[display("Malformed board state: {} at {}:{}", kind, file, line)]
pub struct WireError {
    /// Error kind.
    pub kind: WireErrorKind,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl WireError {
    /// Creates a new wire error with caller location tracking.
    #[track_caller]
    pub fn new(kind: WireErrorKind) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
