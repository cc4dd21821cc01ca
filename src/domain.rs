use std::io::Error;
use std::path::PathBuf;

use derive_setters::Setters;
use polars::error::PolarsError;
use ratatui::crossterm::event::KeyEvent;

use crate::launcher::LaunchOutcome;

/// Upper bound on the number of rendered mapping rows.
pub const DISPLAY_CAP: usize = 50;

pub const HELP_TEXT: &str = "\
 genemap key bindings

 /          search all columns
 Up/Down    move cursor
 PgUp/PgDn  move cursor by page
 Home/End   jump to first/last row
 Left/Right scroll columns
 Enter      select row
 p          plot selected gene
 c          copy selected gene id
 C          copy selected row
 ?          this help
 Esc        dismiss panel/popup
 q          quit
";

#[derive(Debug)]
pub enum GMError {
    IoError(Error),
    PolarsError(PolarsError),
    LoadingFailed(String),
    FileNotFound,
    PermissionDenied,
    UnknownFileType,
}

impl From<Error> for GMError {
    fn from(err: Error) -> Self {
        GMError::IoError(err)
    }
}

impl From<PolarsError> for GMError {
    fn from(err: PolarsError) -> Self {
        GMError::PolarsError(err)
    }
}

#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_")]
pub struct GMConfig {
    pub event_poll_time: u64,
    pub max_column_width: usize,
    pub plot_script: PathBuf,
}

impl Default for GMConfig {
    fn default() -> Self {
        Self {
            event_poll_time: 100,
            max_column_width: 40,
            plot_script: crate::launcher::platform_script(),
        }
    }
}

#[derive(Debug)]
pub enum Message {
    Quit,
    MoveUp,
    MoveDown,
    MovePageUp,
    MovePageDown,
    MoveBeginning,
    MoveEnd,
    MoveLeft,
    MoveRight,
    SelectRow,
    Search,
    RawKey(KeyEvent),
    Launch,
    LaunchFinished(LaunchOutcome),
    CopyIdentifier,
    CopyRow,
    Help,
    Exit,
    Resize(usize, usize),
}
