//! Terminal surfaces: line prompt, keypad and styled board output.

use super::surface::{BoardSink, MoveSource, SinkEvent};
use anyhow::{Context, Result, bail};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::style::{StyledContent, Stylize};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::{self, Stdout, Write};
use strictly_tictactoe::{Board, CELL_COUNT, Cell, Marker};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tracing::{debug, instrument, warn};

/// Reads one line per move from stdin.
pub struct ConsoleMoveSource {
    lines: Lines<BufReader<Stdin>>,
}

impl ConsoleMoveSource {
    /// Wraps the process stdin.
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for ConsoleMoveSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MoveSource for ConsoleMoveSource {
    #[instrument(skip_all)]
    async fn request_move(&mut self, _board: &Board) -> Result<String> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(b"Your move (0-8): ").await?;
        stdout.flush().await?;

        match self.lines.next_line().await? {
            Some(line) => Ok(line),
            None => bail!("stdin closed while waiting for a move"),
        }
    }
}

/// Single keypress per move, keys 1-9 laid out like the board.
///
/// Key `n` selects cell `n - 1`. Esc or Ctrl-C abandons the game.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeypadMoveSource;

impl KeypadMoveSource {
    /// Creates the keypad source.
    pub fn new() -> Self {
        Self
    }
}

struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        enable_raw_mode().context("enabling raw mode")?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            warn!(error = %e, "Failed to restore terminal mode");
        }
    }
}

fn key_to_cell(code: KeyCode) -> Option<usize> {
    match code {
        KeyCode::Char(c @ '1'..='9') => c.to_digit(10).map(|d| d as usize - 1),
        _ => None,
    }
}

fn read_keypress() -> Result<String> {
    let _raw = RawModeGuard::enable()?;
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind == KeyEventKind::Release {
            continue;
        }
        if key.code == KeyCode::Esc
            || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
        {
            bail!("move input cancelled");
        }
        if let Some(cell) = key_to_cell(key.code) {
            return Ok(cell.to_string());
        }
        debug!(code = ?key.code, "Ignoring key");
    }
}

#[async_trait::async_trait]
impl MoveSource for KeypadMoveSource {
    #[instrument(skip_all)]
    async fn request_move(&mut self, _board: &Board) -> Result<String> {
        println!("Press 1-9 to place your marker (Esc to quit)");
        tokio::task::spawn_blocking(read_keypress)
            .await
            .context("keypad reader task failed")?
    }
}

/// Prints events as text, with colored markers.
pub struct ConsoleBoardSink<W = Stdout> {
    out: W,
}

impl ConsoleBoardSink<Stdout> {
    /// Sink writing to stdout.
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }
}

impl Default for ConsoleBoardSink<Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> ConsoleBoardSink<W> {
    /// Sink writing to any writer.
    pub fn with_writer(out: W) -> Self {
        Self { out }
    }

    /// Consumes the sink, returning the writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn styled_cell(index: usize, cell: Cell) -> StyledContent<String> {
        match cell {
            Cell::Marked(Marker::X) => "X".to_string().red().bold(),
            Cell::Marked(Marker::O) => "O".to_string().blue().bold(),
            Cell::Empty => index.to_string().dark_grey(),
        }
    }

    fn write_board(&mut self, board: &Board) -> io::Result<()> {
        let cells = board.cells();
        for row in 0..3 {
            let base = row * 3;
            writeln!(
                self.out,
                " {} | {} | {} ",
                Self::styled_cell(base, cells[base]),
                Self::styled_cell(base + 1, cells[base + 1]),
                Self::styled_cell(base + 2, cells[base + 2]),
            )?;
            if base + 3 < CELL_COUNT {
                writeln!(self.out, "---+---+---")?;
            }
        }
        Ok(())
    }

    fn write_event(&mut self, event: SinkEvent<'_>) -> io::Result<()> {
        match event {
            SinkEvent::Started { player_id, marker } => {
                writeln!(self.out, "Game started: you are {player_id} playing {marker}")?
            }
            SinkEvent::Board(board) => self.write_board(board)?,
            SinkEvent::BadInput(input) => writeln!(
                self.out,
                "{} {input:?} is not a cell number 0-8",
                "Invalid input:".yellow()
            )?,
            SinkEvent::Rejected => writeln!(
                self.out,
                "{}",
                "Invalid move, try again.".to_string().yellow()
            )?,
            SinkEvent::Finished(result) => {
                writeln!(self.out, "Game over: {}", result.to_string().bold())?
            }
            SinkEvent::Refused(reason) => {
                writeln!(self.out, "{} {reason}", "Could not join:".red())?
            }
        }
        self.out.flush()
    }
}

impl<W: Write + Send> BoardSink for ConsoleBoardSink<W> {
    fn render(&mut self, event: SinkEvent<'_>) {
        if let Err(e) = self.write_event(event) {
            warn!(error = %e, "Failed to render to console");
        }
    }
}
