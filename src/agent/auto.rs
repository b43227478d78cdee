//! Automatic move source.

use super::MoveSource;
use anyhow::Result;
use std::time::Duration;
use strictly_tictactoe::Board;
use tracing::debug;

/// Plays the first empty cell.
#[derive(Debug, Clone, Default)]
pub struct FirstFreeMoveSource {
    think_time: Duration,
}

impl FirstFreeMoveSource {
    /// Creates an automatic player that answers immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits `think_time` before each answer.
    pub fn with_think_time(think_time: Duration) -> Self {
        Self { think_time }
    }
}

#[async_trait::async_trait]
impl MoveSource for FirstFreeMoveSource {
    async fn request_move(&mut self, board: &Board) -> Result<String> {
        if !self.think_time.is_zero() {
            tokio::time::sleep(self.think_time).await;
        }

        let Some(cell) = board.empty_cells().next() else {
            anyhow::bail!("No valid moves available")
        };
        debug!(cell, "Automatic player chose cell");
        Ok(cell.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strictly_tictactoe::Marker;

    #[tokio::test]
    async fn test_picks_first_empty_cell() {
        let mut board = Board::new();
        board.apply(0, Marker::X).unwrap();
        board.apply(1, Marker::O).unwrap();
        let mut source = FirstFreeMoveSource::new();
        assert_eq!(source.request_move(&board).await.unwrap(), "2");
    }

    #[tokio::test]
    async fn test_full_board_is_an_error() {
        let board = Board::from_wire_string("XOXOXXOXO").unwrap();
        let mut source = FirstFreeMoveSource::new();
        assert!(source.request_move(&board).await.is_err());
    }
}
