//! Test doubles for the agent surfaces.

use crate::agent::{BoardSink, MoveSource, SinkEvent};
use anyhow::{Result, bail};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use strictly_tictactoe::{Board, Marker};

/// Replays a fixed list of inputs, one per request.
///
/// Fails once the script is exhausted.
#[derive(Debug, Clone, Default)]
pub struct ScriptedMoveSource {
    inputs: VecDeque<String>,
    requests: Arc<AtomicUsize>,
}

impl ScriptedMoveSource {
    /// Creates a source from raw inputs, valid or not.
    pub fn new<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            requests: Arc::default(),
        }
    }

    /// Shared counter of `request_move` calls, readable after the source is
    /// moved into an agent.
    pub fn requests(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.requests)
    }
}

#[async_trait::async_trait]
impl MoveSource for ScriptedMoveSource {
    async fn request_move(&mut self, _board: &Board) -> Result<String> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        match self.inputs.pop_front() {
            Some(input) => Ok(input),
            None => bail!("script exhausted"),
        }
    }
}

/// Owned copy of a [`SinkEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    /// Session started.
    Started {
        /// Assigned identifier.
        player_id: String,
        /// Assigned marker.
        marker: Marker,
    },
    /// Board rendered.
    Board(Board),
    /// Local input refused.
    BadInput(String),
    /// Move refused by the coordinator.
    Rejected,
    /// Result rendered.
    Finished(String),
    /// Registration refused.
    Refused(String),
}

impl From<SinkEvent<'_>> for Recorded {
    fn from(event: SinkEvent<'_>) -> Self {
        match event {
            SinkEvent::Started { player_id, marker } => Recorded::Started {
                player_id: player_id.to_string(),
                marker,
            },
            SinkEvent::Board(board) => Recorded::Board(board.clone()),
            SinkEvent::BadInput(input) => Recorded::BadInput(input.to_string()),
            SinkEvent::Rejected => Recorded::Rejected,
            SinkEvent::Finished(result) => Recorded::Finished(result.to_string()),
            SinkEvent::Refused(reason) => Recorded::Refused(reason.to_string()),
        }
    }
}

/// Records every rendered event into a shared log.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    log: Arc<Mutex<Vec<Recorded>>>,
}

impl RecordingSink {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything rendered so far.
    pub fn events(&self) -> Vec<Recorded> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Number of board renders so far.
    pub fn board_renders(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, Recorded::Board(_)))
            .count()
    }

    /// Last rendered result, if any.
    pub fn result(&self) -> Option<String> {
        self.events().into_iter().rev().find_map(|event| match event {
            Recorded::Finished(result) => Some(result),
            _ => None,
        })
    }
}

impl BoardSink for RecordingSink {
    fn render(&mut self, event: SinkEvent<'_>) {
        if let Ok(mut log) = self.log.lock() {
            log.push(event.into());
        }
    }
}
