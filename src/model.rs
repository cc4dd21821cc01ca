use arboard::Clipboard;
use polars::prelude::*;
use ratatui::crossterm::event::KeyEvent;
use rayon::prelude::*;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, trace};

use crate::domain::{DISPLAY_CAP, GMConfig, GMError, HELP_TEXT, Message};
use crate::inputter::{InputResult, Inputter};
use crate::launcher::{self, LaunchOutcome, LaunchState, Launcher};
use crate::ui::{CMDLINE_HEIGHT, COLUMN_WIDTH_MARGIN, SCROLLBAR_WIDTH, STATUSLINE_HEIGHT, TABLE_HEADER_HEIGHT};

#[derive(Debug, PartialEq)]
pub enum Status {
    EMPTY,
    LOADING,
    READY,
    PROCESSING,
    QUITTING,
}

#[derive(Debug)]
pub struct FileInfo {
    path: PathBuf,
    file_size: u64,
}

pub struct Column {
    idx: u16,
    name: String,
    max_width: usize,
    render_width: usize,
    data: Vec<String>,
}

impl Column {
    pub fn as_string(&self) -> String {
        format!(
            "{} \"{}\", width_max: {}, render_width: {}, # rows {}",
            self.idx,
            self.name,
            self.max_width,
            self.render_width,
            self.data.len(),
        )
    }
}

#[derive(Clone)]
pub struct ColumnView {
    pub name: String,
    pub width: usize,
    pub data: Vec<String>,
}

impl ColumnView {
    fn empty() -> Self {
        ColumnView {
            name: "".to_string(),
            width: 0,
            data: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Modus {
    TABLE,
    SEARCH,
    POPUP,
}

/// View state over the loaded mapping table. `rows` is the full filtered
/// mapping into dataset rows; only the first `window_len` (≤ DISPLAY_CAP)
/// entries are rendered.
pub struct MappingView {
    name: String,
    rows: Vec<usize>,
    window_len: usize,
    visible_columns: Vec<usize>,
    visible_width: usize,
    cursor_row: usize,
    offset_column: usize,
    data: Vec<ColumnView>,
    query: String,
    height: usize,
    width: usize,
}

impl MappingView {
    fn empty() -> Self {
        MappingView {
            name: String::new(),
            rows: Vec::new(),
            window_len: 0,
            visible_columns: Vec::new(),
            visible_width: 0,
            cursor_row: 0,
            offset_column: 0,
            data: Vec::new(),
            query: String::new(),
            height: 0,
            width: 0,
        }
    }
}

pub struct UIData {
    pub name: String,
    pub table: Vec<ColumnView>,
    pub nrows: usize,
    pub window_len: usize,
    pub cursor_row: usize,
    pub selected_row: Option<usize>,
    pub identifier: String,
    pub search_enabled: bool,
    pub plot_enabled: bool,
    pub launch_state: LaunchState,
    pub show_launch_panel: bool,
    pub show_popup: bool,
    pub popup_message: String,
    pub layout: UILayout,
    pub cmdinput: InputResult,
    pub active_input: bool,
    pub status_message: String,
    pub last_update: Instant,
}

impl UIData {
    pub fn empty() -> Self {
        UIData {
            name: String::new(),
            table: Vec::new(),
            nrows: 0,
            window_len: 0,
            cursor_row: 0,
            selected_row: None,
            identifier: String::new(),
            search_enabled: false,
            plot_enabled: false,
            launch_state: LaunchState::IDLE,
            show_launch_panel: false,
            show_popup: false,
            popup_message: String::new(),
            layout: UILayout::default(),
            cmdinput: InputResult::default(),
            active_input: false,
            status_message: String::new(),
            last_update: Instant::now(),
        }
    }
}

#[derive(Default, Clone, Debug)]
pub struct UILayout {
    pub width: usize,
    pub height: usize,
    pub table_width: usize,
    pub table_height: usize,
    pub statusline_width: usize,
    pub statusline_height: usize,
}

impl UILayout {
    pub fn from_values(ui_width: usize, ui_height: usize) -> Self {
        let table_width = ui_width.saturating_sub(SCROLLBAR_WIDTH);
        let table_height =
            ui_height.saturating_sub(CMDLINE_HEIGHT + STATUSLINE_HEIGHT + TABLE_HEADER_HEIGHT);

        let layout = UILayout {
            width: ui_width,
            height: ui_height,
            table_width,
            table_height,
            statusline_width: ui_width,
            statusline_height: STATUSLINE_HEIGHT,
        };
        trace!("Build UILayout: {:?}", layout);
        layout
    }
}

pub struct Model {
    config: GMConfig,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    data: Vec<Column>,
    view: MappingView,
    selection: Option<usize>,
    identifier: String,
    launch_state: LaunchState,
    show_launch_panel: bool,
    launcher: Launcher,
    uilayout: UILayout,
    uidata: UIData,
    clipboard: Option<Clipboard>,
    input: Inputter,
    last_input: InputResult,
    active_input: bool,
    status_message: String,
}

impl Model {
    pub fn init(config: &GMConfig, ui_width: usize, ui_height: usize) -> Result<Self, GMError> {
        let mut model = Self {
            config: config.clone(),
            status: Status::EMPTY,
            modus: Modus::TABLE,
            previous_modus: Modus::TABLE,
            data: Vec::new(),
            view: MappingView::empty(),
            selection: None,
            identifier: String::new(),
            launch_state: LaunchState::IDLE,
            show_launch_panel: false,
            launcher: Launcher::new(),
            uilayout: UILayout::from_values(ui_width, ui_height),
            uidata: UIData::empty(),
            clipboard: None,
            input: Inputter::default(),
            last_input: InputResult::default(),
            active_input: false,
            status_message: "Started genemap!".to_string(),
        };
        model.update_uidata_for_table();
        Ok(model)
    }

    pub fn load_data_file(&mut self, path: PathBuf) -> Result<(), GMError> {
        self.status = Status::LOADING;
        let file_info = Model::get_file_info(path)?;
        info!(
            "Loading {} ({} bytes)",
            file_info.path.display(),
            file_info.file_size
        );

        let start_time = Instant::now();
        let columns = match Self::load_tsv(&file_info.path).and_then(Self::materialize_columns) {
            Ok(columns) => columns,
            Err(e) => {
                // A malformed or empty file degrades to an empty table
                error!("Could not read {}: {:?}", file_info.path.display(), e);
                Vec::new()
            }
        };
        let data_loading_duration = start_time.elapsed().as_millis();
        info!("Loading data took {data_loading_duration}ms");
        for c in columns.iter() {
            debug!("Column: {}", c.as_string());
        }

        let name = file_info
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("???")
            .to_string();
        self.install_dataset(name, columns);
        Ok(())
    }

    fn install_dataset(&mut self, name: String, columns: Vec<Column>) {
        let nrows = columns.first().map(|c| c.data.len()).unwrap_or(0);
        self.data = columns;
        self.view = MappingView::empty();
        self.view.name = name;
        self.view.rows = (0..nrows).collect();
        self.selection = None;
        self.identifier = String::new();
        self.status = Status::READY;
        self.update_table_data();
        self.set_status_message(Self::mapping_status_message(nrows));
    }

    fn load_tsv(path: &Path) -> Result<LazyFrame, GMError> {
        Ok(LazyCsvReader::new(PlPath::Local(path.into()))
            .with_has_header(true)
            .with_separator(b'\t')
            .finish()?)
    }

    fn materialize_columns(frame: LazyFrame) -> Result<Vec<Column>, GMError> {
        let df = frame.collect()?;
        let columns: Result<Vec<Column>, PolarsError> = df
            .get_column_names()
            .par_iter()
            .enumerate()
            .map(|(idx, name)| Self::load_column(&df, idx, name.as_str()))
            .collect();
        Ok(columns?)
    }

    fn load_column(df: &DataFrame, idx: usize, col_name: &str) -> Result<Column, PolarsError> {
        let col = df.column(col_name)?.cast(&DataType::String)?;
        let series = col.str()?;
        let mut data = Vec::with_capacity(series.len());

        let mut max_width = 0;
        for value in series.into_iter() {
            let ss = match value {
                Some(s) => s.to_string().replace("\r\n", " ↵ ").replace("\n", " ↵ "),
                None => String::new(),
            };
            if ss.len() > max_width {
                max_width = ss.len();
            }
            data.push(ss);
        }

        Ok(Column {
            idx: idx as u16,
            name: col_name.to_string(),
            max_width,
            render_width: 0, // Will be set later
            data,
        })
    }

    fn get_file_info(path: PathBuf) -> Result<FileInfo, GMError> {
        let metadata = fs::metadata(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => GMError::FileNotFound,
            ErrorKind::PermissionDenied => GMError::PermissionDenied,
            _ => GMError::IoError(e),
        })?;
        if !metadata.is_file() {
            return Err(GMError::LoadingFailed("Not a file!".into()));
        }
        Self::check_file_type(&path)?;

        Ok(FileInfo {
            path,
            file_size: metadata.len(),
        })
    }

    fn check_file_type(path: &Path) -> Result<(), GMError> {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_uppercase())
            .as_deref()
        {
            Some("TSV") | Some("TAB") | Some("TXT") => Ok(()),
            _ => Err(GMError::UnknownFileType),
        }
    }

    fn mapping_status_message(n: usize) -> String {
        if n >= DISPLAY_CAP {
            format!("Showing first {} mappings", DISPLAY_CAP)
        } else {
            format!("Showing {} mappings", n)
        }
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.uidata.status_message = self.status_message.clone();
        self.uidata.last_update = Instant::now();
    }

    pub fn get_uidata(&self) -> &UIData {
        &self.uidata
    }

    pub fn raw_keyevents(&self) -> bool {
        self.active_input
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    /// Drains a finished plot invocation, if any, for the event loop.
    pub fn poll_launch(&mut self) -> Option<Message> {
        self.launcher.poll().map(Message::LaunchFinished)
    }

    pub fn update(&mut self, message: Message) -> Result<(), GMError> {
        match message {
            // Launch completions and resizes apply in every modus
            Message::LaunchFinished(outcome) => self.finish_launch(outcome),
            Message::Resize(width, height) => self.ui_resize(width, height),
            msg => match self.modus {
                Modus::TABLE => match msg {
                    Message::Quit => self.quit(),
                    Message::MoveUp => self.move_selection_up(1),
                    Message::MoveDown => self.move_selection_down(1),
                    Message::MovePageUp => self.move_selection_up(self.uilayout.table_height.max(1)),
                    Message::MovePageDown => {
                        self.move_selection_down(self.uilayout.table_height.max(1))
                    }
                    Message::MoveBeginning => self.move_selection_beginning(),
                    Message::MoveEnd => self.move_selection_end(),
                    Message::MoveLeft => self.move_columns_left(),
                    Message::MoveRight => self.move_columns_right(),
                    Message::SelectRow => self.select_row(),
                    Message::Search => self.enter_search_mode(),
                    Message::Launch => self.launch_plot(),
                    Message::CopyIdentifier => self.copy_identifier(),
                    Message::CopyRow => self.copy_row(),
                    Message::Help => self.show_help(),
                    Message::Exit => self.exit(),
                    _ => (),
                },
                Modus::SEARCH => {
                    if let Message::RawKey(key) = msg {
                        self.raw_input(key);
                    }
                }
                Modus::POPUP => match msg {
                    Message::Quit => self.quit(),
                    Message::Exit | Message::Help => self.exit(),
                    _ => (),
                },
            },
        }
        Ok(())
    }

    // -------------------- Control handling functions ---------------------- //

    fn enter_search_mode(&mut self) {
        if self.status != Status::READY {
            trace!("Search is disabled until data is loaded");
            return;
        }
        self.previous_modus = self.modus;
        self.modus = Modus::SEARCH;
        self.active_input = true;
        self.input.clear();
        self.last_input = self.input.get();

        self.uidata.cmdinput = self.last_input.clone();
        self.uidata.active_input = self.active_input;
        self.uidata.last_update = Instant::now();
    }

    fn raw_input(&mut self, key: KeyEvent) {
        if self.active_input {
            self.last_input = self.input.read(key);
            if self.last_input.finished {
                self.active_input = false;
                self.modus = self.previous_modus;
                self.previous_modus = Modus::SEARCH;
                self.uidata.active_input = false;
                if !self.last_input.canceled {
                    let term = self.last_input.input.clone();
                    self.search(&term);
                }
            }
            self.uidata.cmdinput = self.last_input.clone();
            self.uidata.last_update = Instant::now();
        }
    }

    // Every search starts from the full dataset, not the current filter
    fn search(&mut self, term: &str) {
        if self.status != Status::READY {
            trace!("Ignoring search while not ready");
            return;
        }
        self.status = Status::PROCESSING;
        let start_time = Instant::now();

        let nrows = self.data.first().map(|c| c.data.len()).unwrap_or(0);
        let matches: Vec<usize> = if term.is_empty() {
            (0..nrows).collect()
        } else {
            let needle = term.to_lowercase();
            let columns = &self.data;
            (0..nrows)
                .into_par_iter()
                .filter(|&ridx| {
                    Self::concat_record(columns, ridx)
                        .to_lowercase()
                        .contains(&needle)
                })
                .collect()
        };

        let search_duration = start_time.elapsed().as_millis();
        trace!(
            "Search \"{}\" matched {} of {} rows in {}ms",
            term,
            matches.len(),
            nrows,
            search_duration
        );

        self.view.rows = matches;
        self.view.query = term.to_string();
        self.view.cursor_row = 0;
        // A stale selection could reference a row outside the new window
        self.selection = None;
        self.status = Status::READY;
        self.update_table_data();
        self.set_status_message(Self::mapping_status_message(self.view.rows.len()));
    }

    // All column values joined, matching the identifier shown in the gene id field
    fn concat_record(columns: &[Column], row: usize) -> String {
        columns
            .iter()
            .map(|c| c.data[row].as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    fn select_row(&mut self) {
        if self.view.window_len == 0 {
            return;
        }
        let ridx = self.view.rows[self.view.cursor_row];
        self.selection = Some(ridx);
        self.identifier = Self::concat_record(&self.data, ridx);
        trace!("Selected row {} => {}", ridx, self.identifier);
        self.update_uidata_for_table();
    }

    fn launch_plot(&mut self) {
        if self.launch_state == LaunchState::LAUNCHING {
            trace!("Plot already in flight");
            return;
        }
        if self.selection.is_none() {
            trace!("Plot is disabled without a selected row");
            return;
        }
        self.launch_state = LaunchState::LAUNCHING;
        self.show_launch_panel = true;
        self.launcher
            .launch(&self.config.plot_script, &self.identifier);
        self.set_status_message(format!("Launching plot for {} ...", self.identifier));
        self.update_uidata_for_table();
    }

    fn finish_launch(&mut self, outcome: LaunchOutcome) {
        launcher::log_outcome(&outcome);
        self.launch_state = match outcome.result {
            Ok(_) => LaunchState::SUCCEEDED,
            Err(_) => LaunchState::FAILED,
        };
        let verdict = if self.launch_state == LaunchState::SUCCEEDED {
            "finished"
        } else {
            "failed"
        };
        self.set_status_message(format!("Plot {} for {}", verdict, outcome.identifier));
        self.update_uidata_for_table();
    }

    fn show_help(&mut self) {
        self.previous_modus = self.modus;
        self.modus = Modus::POPUP;
        self.uidata.popup_message = HELP_TEXT.to_string();
        self.uidata.show_popup = true;
        self.uidata.last_update = Instant::now();
    }

    fn exit(&mut self) {
        match self.modus {
            Modus::TABLE => {
                if self.show_launch_panel {
                    self.show_launch_panel = false;
                    self.update_uidata_for_table();
                }
            }
            Modus::POPUP => {
                trace!("Close popup ...");
                self.modus = self.previous_modus;
                self.previous_modus = Modus::POPUP;
                self.uidata.show_popup = false;
                self.uidata.last_update = Instant::now();
            }
            // Esc inside the search input is handled by the Inputter
            Modus::SEARCH => {}
        }
    }

    fn clipboard(&mut self) -> Option<&mut Clipboard> {
        if self.clipboard.is_none() {
            match Clipboard::new() {
                Ok(cb) => self.clipboard = Some(cb),
                Err(e) => error!("Clipboard unavailable: {:?}", e),
            }
        }
        self.clipboard.as_mut()
    }

    fn copy_identifier(&mut self) {
        if self.selection.is_none() {
            self.set_status_message("No row selected");
            return;
        }
        let text = self.identifier.clone();
        if let Some(cb) = self.clipboard() {
            match cb.set_text(text) {
                Ok(_) => trace!("Copied gene id to clipboard."),
                Err(e) => trace!("Error copying to clipboard: {:?}", e),
            }
        }
    }

    fn copy_row(&mut self) {
        let Some(row) = self.selection else {
            self.set_status_message("No row selected");
            return;
        };
        let content = self
            .data
            .iter()
            .map(|c| Model::wrap_cell_content(&c.data[row]))
            .collect::<Vec<String>>()
            .join(",");
        if let Some(cb) = self.clipboard() {
            match cb.set_text(content) {
                Ok(_) => trace!("Copied row content to clipboard."),
                Err(e) => trace!("Error copying to clipboard: {:?}", e),
            }
        }
    }

    fn wrap_cell_content(c: &str) -> String {
        let needs_escaping = c.contains('"');
        let needs_wrapping = c.chars().any(|ch| ch == ' ' || ch == '\t' || ch == ',');
        let mut out = String::from(c);

        if needs_escaping {
            out = out.replace('"', "\"\"");
        }
        if needs_wrapping {
            out = format!("\"{out}\"");
        }
        out
    }

    fn ui_resize(&mut self, width: usize, height: usize) {
        trace!(
            "UI was resized! w:{}->{}, h:{}->{}",
            self.uilayout.width, width, self.uilayout.height, height
        );
        self.uilayout = UILayout::from_values(width, height);
        self.input.set_width(self.uilayout.statusline_width);
        self.update_table_data();
    }

    fn move_selection_beginning(&mut self) {
        self.view.cursor_row = 0;
        self.update_table_data();
    }

    fn move_selection_end(&mut self) {
        if self.view.window_len > 0 {
            self.view.cursor_row = self.view.window_len - 1;
            self.update_table_data();
        }
    }

    fn move_selection_up(&mut self, size: usize) {
        self.view.cursor_row = self.view.cursor_row.saturating_sub(size);
        self.update_table_data();
    }

    fn move_selection_down(&mut self, size: usize) {
        if self.view.window_len > 0 {
            self.view.cursor_row =
                std::cmp::min(self.view.cursor_row + size, self.view.window_len - 1);
            self.update_table_data();
        }
    }

    fn move_columns_left(&mut self) {
        if self.view.offset_column > 0 {
            self.view.offset_column -= 1;
            self.update_table_data();
        }
    }

    fn move_columns_right(&mut self) {
        if self.data.is_empty() {
            return;
        }
        // Only scroll while columns are cut off on the right
        let more_columns =
            self.view.offset_column + self.view.visible_columns.len() < self.data.len();
        let partial_last = self.view.visible_width >= self.uilayout.table_width;
        if (more_columns || partial_last) && self.view.offset_column < self.data.len() - 1 {
            self.view.offset_column += 1;
            self.update_table_data();
        }
    }

    fn update_table_data(&mut self) {
        if self.data.is_empty() {
            self.view.window_len = 0;
            self.view.cursor_row = 0;
            self.view.data.clear();
            self.update_uidata_for_table();
            return;
        }

        let view = &mut self.view;
        view.width = self.uilayout.table_width;
        view.height = self.uilayout.table_height;
        view.window_len = std::cmp::min(view.rows.len(), DISPLAY_CAP);
        view.cursor_row = std::cmp::min(view.cursor_row, view.window_len.saturating_sub(1));
        view.offset_column = std::cmp::min(view.offset_column, self.data.len() - 1);

        trace!(
            "Table: Cr {}, Oc {}, window {}, nrows {}, tw: {}, th: {}",
            view.cursor_row,
            view.offset_column,
            view.window_len,
            view.rows.len(),
            view.width,
            view.height,
        );

        // Calculate the current render width for each column
        for column in self.data.iter_mut() {
            column.render_width = Self::calculate_column_width(column, self.config.max_column_width);
        }

        // Create a list of columns that fit in the table
        view.visible_columns = Vec::new();
        let mut visible_width = 0;
        for (cidx, column) in self.data[view.offset_column..].iter_mut().enumerate() {
            if visible_width + (column.render_width + 1) <= self.uilayout.table_width {
                view.visible_columns.push(cidx + view.offset_column);
                visible_width += column.render_width + 1;
            } else {
                // Add the last partial visible column
                if visible_width < self.uilayout.table_width {
                    let remaining_width = self.uilayout.table_width - visible_width;
                    view.visible_columns.push(cidx + view.offset_column);
                    visible_width += remaining_width;
                    column.render_width = remaining_width;
                }
                break;
            }
        }
        view.visible_width = visible_width;

        // Create ColumnViews over the display window for the visible columns
        let indices = view.visible_columns.clone();
        view.data.clear();
        for idx in indices {
            if let Some(column) = self.data.get(idx) {
                let col_data = view.rows[..view.window_len]
                    .iter()
                    .map(|&ridx| column.data[ridx].clone())
                    .collect();
                view.data.push(ColumnView {
                    name: Self::get_visible_name(&column.name, column.render_width),
                    width: column.render_width,
                    data: col_data,
                });
            } else {
                error!("Trying to access column with unknown idx {idx}!");
            }
        }

        self.update_uidata_for_table();
    }

    fn update_uidata_for_table(&mut self) {
        let view = &self.view;
        let name = if view.query.is_empty() {
            view.name.clone()
        } else {
            format!("F[{}]", view.name)
        };
        let selected_row = self
            .selection
            .and_then(|sel| view.rows[..view.window_len].iter().position(|&r| r == sel));

        self.uidata = UIData {
            name,
            table: view.data.clone(),
            nrows: view.rows.len(),
            window_len: view.window_len,
            cursor_row: view.cursor_row,
            selected_row,
            identifier: self.identifier.clone(),
            search_enabled: self.status == Status::READY,
            plot_enabled: self.selection.is_some() && self.launch_state != LaunchState::LAUNCHING,
            launch_state: self.launch_state,
            show_launch_panel: self.show_launch_panel,
            show_popup: false,
            popup_message: String::new(),
            layout: self.uilayout.clone(),
            cmdinput: self.last_input.clone(),
            active_input: self.active_input,
            status_message: self.status_message.clone(),
            last_update: Instant::now(),
        }
    }

    fn calculate_column_width(column: &Column, max_column_width: usize) -> usize {
        let width = std::cmp::max(column.name.len(), column.max_width) + COLUMN_WIDTH_MARGIN;
        std::cmp::min(width, max_column_width)
    }

    fn get_visible_name(name: &str, width: usize) -> String {
        if width < 3 {
            return String::new();
        }
        if name.len() > width {
            let mut reduced: String = name.chars().take(width - 3).collect();
            reduced.push_str("...");
            reduced
        } else {
            name.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::{KeyCode, KeyModifiers};
    use std::time::Duration;

    fn test_model() -> Model {
        Model::init(&GMConfig::default(), 120, 40).unwrap()
    }

    fn columns_from_rows(names: &[&str], rows: &[&[&str]]) -> Vec<Column> {
        names
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let data: Vec<String> = rows.iter().map(|r| r[idx].to_string()).collect();
                let max_width = data.iter().map(|s| s.len()).max().unwrap_or(0);
                Column {
                    idx: idx as u16,
                    name: name.to_string(),
                    max_width,
                    render_width: 0,
                    data,
                }
            })
            .collect()
    }

    fn gene_model(n: usize) -> Model {
        let mut model = test_model();
        let ids: Vec<String> = (0..n).map(|i| format!("ENSG{:03}", i)).collect();
        let rows: Vec<Vec<&str>> = ids.iter().map(|id| vec![id.as_str()]).collect();
        let rows: Vec<&[&str]> = rows.iter().map(|r| r.as_slice()).collect();
        model.install_dataset("gene.tsv".to_string(), columns_from_rows(&["Gene ID"], &rows));
        model
    }

    fn two_column_model() -> Model {
        let mut model = test_model();
        model.install_dataset(
            "gene.tsv".to_string(),
            columns_from_rows(
                &["Gene ID", "Transcript ID"],
                &[&["ENSG1", "T1"], &["ENSG2", "T2"]],
            ),
        );
        model
    }

    fn press(model: &mut Model, code: KeyCode) {
        model
            .update(Message::RawKey(ratatui::crossterm::event::KeyEvent::new(
                code,
                KeyModifiers::NONE,
            )))
            .unwrap();
    }

    fn wait_for_launch(model: &mut Model) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(msg) = model.poll_launch() {
                model.update(msg).unwrap();
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn search_is_ignored_before_load() {
        let mut model = test_model();
        model.search("ENSG");
        assert_eq!(model.status, Status::EMPTY);
        assert_eq!(model.get_uidata().window_len, 0);
        assert!(!model.get_uidata().search_enabled);
    }

    #[test]
    fn load_caps_window_at_display_cap() {
        let model = gene_model(60);
        let uidata = model.get_uidata();
        assert_eq!(uidata.window_len, 50);
        assert_eq!(uidata.nrows, 60);
        assert_eq!(uidata.status_message, "Showing first 50 mappings");
        assert_eq!(uidata.table[0].data.len(), 50);
        assert_eq!(uidata.table[0].data[0], "ENSG000");
        assert_eq!(uidata.table[0].data[49], "ENSG049");
    }

    #[test]
    fn load_small_dataset_shows_count() {
        let model = gene_model(10);
        let uidata = model.get_uidata();
        assert_eq!(uidata.window_len, 10);
        assert_eq!(uidata.status_message, "Showing 10 mappings");
        assert!(uidata.search_enabled);
    }

    #[test]
    fn empty_dataset_degrades_to_zero_mappings() {
        let mut model = test_model();
        model.install_dataset("empty.tsv".to_string(), Vec::new());
        let uidata = model.get_uidata();
        assert_eq!(uidata.window_len, 0);
        assert_eq!(uidata.status_message, "Showing 0 mappings");
    }

    #[test]
    fn search_filters_case_insensitively() {
        let mut model = test_model();
        model.install_dataset(
            "gene.tsv".to_string(),
            columns_from_rows(&["Gene ID"], &[&["ABC"], &["XYZ"]]),
        );
        model.search("abc");
        let uidata = model.get_uidata();
        assert_eq!(uidata.window_len, 1);
        assert_eq!(uidata.table[0].data, vec!["ABC".to_string()]);
        assert_eq!(uidata.status_message, "Showing 1 mappings");
        assert_eq!(uidata.name, "F[gene.tsv]");
    }

    #[test]
    fn empty_query_restores_full_dataset() {
        let mut model = gene_model(10);
        model.search("ENSG003");
        assert_eq!(model.get_uidata().nrows, 1);
        model.search("");
        let uidata = model.get_uidata();
        assert_eq!(uidata.nrows, 10);
        assert_eq!(uidata.window_len, 10);
        assert_eq!(uidata.status_message, "Showing 10 mappings");
        assert_eq!(uidata.name, "gene.tsv");
    }

    #[test]
    fn search_matches_across_concatenated_fields() {
        let mut model = two_column_model();
        // The haystack is the comma-joined record, so a query can span fields
        model.search("1,t1");
        let uidata = model.get_uidata();
        assert_eq!(uidata.window_len, 1);
        assert_eq!(uidata.table[0].data, vec!["ENSG1".to_string()]);
    }

    #[test]
    fn search_starts_from_full_dataset_and_preserves_order() {
        let mut model = gene_model(120);
        model.search("ENSG11");
        assert_eq!(model.get_uidata().nrows, 10);
        // A second search is not narrowed by the first
        model.search("ensg");
        let uidata = model.get_uidata();
        assert_eq!(uidata.nrows, 120);
        assert_eq!(uidata.window_len, 50);
        assert_eq!(uidata.status_message, "Showing first 50 mappings");
        assert_eq!(uidata.table[0].data[0], "ENSG000");
        assert_eq!(uidata.table[0].data[49], "ENSG049");
    }

    #[test]
    fn select_row_derives_identifier_and_enables_plot() {
        let mut model = two_column_model();
        model.update(Message::SelectRow).unwrap();
        let uidata = model.get_uidata();
        assert_eq!(uidata.identifier, "ENSG1,T1");
        assert_eq!(uidata.selected_row, Some(0));
        assert!(uidata.plot_enabled);
    }

    #[test]
    fn cursor_movement_is_bounded_by_window() {
        let mut model = gene_model(5);
        for _ in 0..20 {
            model.update(Message::MoveDown).unwrap();
        }
        assert_eq!(model.get_uidata().cursor_row, 4);
        model.update(Message::MoveBeginning).unwrap();
        assert_eq!(model.get_uidata().cursor_row, 0);
        model.update(Message::MoveUp).unwrap();
        assert_eq!(model.get_uidata().cursor_row, 0);
        model.update(Message::MoveEnd).unwrap();
        assert_eq!(model.get_uidata().cursor_row, 4);
    }

    #[test]
    fn selection_follows_cursor() {
        let mut model = gene_model(5);
        model.update(Message::MoveDown).unwrap();
        model.update(Message::MoveDown).unwrap();
        model.update(Message::SelectRow).unwrap();
        assert_eq!(model.get_uidata().identifier, "ENSG002");
        assert_eq!(model.get_uidata().selected_row, Some(2));
    }

    #[test]
    fn search_clears_selection_and_disables_plot() {
        let mut model = two_column_model();
        model.update(Message::SelectRow).unwrap();
        assert!(model.get_uidata().plot_enabled);
        model.search("ENSG");
        let uidata = model.get_uidata();
        assert_eq!(uidata.selected_row, None);
        assert!(!uidata.plot_enabled);
        // The identifier field keeps its last value, like the gene id input
        assert_eq!(uidata.identifier, "ENSG1,T1");
    }

    #[test]
    fn search_input_flow_filters_on_enter() {
        let mut model = test_model();
        model.install_dataset(
            "gene.tsv".to_string(),
            columns_from_rows(&["Gene ID"], &[&["ABC"], &["XYZ"]]),
        );
        model.update(Message::Search).unwrap();
        assert!(model.raw_keyevents());
        press(&mut model, KeyCode::Char('x'));
        press(&mut model, KeyCode::Char('y'));
        press(&mut model, KeyCode::Char('z'));
        press(&mut model, KeyCode::Enter);
        assert!(!model.raw_keyevents());
        let uidata = model.get_uidata();
        assert_eq!(uidata.window_len, 1);
        assert_eq!(uidata.table[0].data, vec!["XYZ".to_string()]);
    }

    #[test]
    fn canceled_search_input_leaves_table_untouched() {
        let mut model = gene_model(10);
        model.update(Message::Search).unwrap();
        press(&mut model, KeyCode::Char('x'));
        press(&mut model, KeyCode::Esc);
        assert!(!model.raw_keyevents());
        let uidata = model.get_uidata();
        assert_eq!(uidata.nrows, 10);
        assert_eq!(uidata.name, "gene.tsv");
    }

    #[test]
    fn search_mode_is_unreachable_before_load() {
        let mut model = test_model();
        model.update(Message::Search).unwrap();
        assert!(!model.raw_keyevents());
    }

    #[cfg(unix)]
    #[test]
    fn launch_lifecycle_success_reenables_plot() {
        let cfg = GMConfig::default().with_plot_script(PathBuf::from("echo"));
        let mut model = Model::init(&cfg, 120, 40).unwrap();
        model.install_dataset(
            "gene.tsv".to_string(),
            columns_from_rows(&["Gene ID"], &[&["ABC"], &["XYZ"]]),
        );
        model.update(Message::SelectRow).unwrap();
        model.update(Message::Launch).unwrap();

        let uidata = model.get_uidata();
        assert_eq!(uidata.launch_state, LaunchState::LAUNCHING);
        assert!(uidata.show_launch_panel);
        assert!(!uidata.plot_enabled);

        // A second trigger while in flight must not spawn again
        model.update(Message::Launch).unwrap();
        assert_eq!(model.get_uidata().launch_state, LaunchState::LAUNCHING);

        assert!(wait_for_launch(&mut model));
        let uidata = model.get_uidata();
        assert_eq!(uidata.launch_state, LaunchState::SUCCEEDED);
        assert!(uidata.plot_enabled);
        assert_eq!(uidata.status_message, "Plot finished for ABC");
        assert!(model.poll_launch().is_none());

        // Esc dismisses the launch panel
        model.update(Message::Exit).unwrap();
        assert!(!model.get_uidata().show_launch_panel);
    }

    #[test]
    fn launch_failure_transitions_to_failed() {
        let cfg = GMConfig::default().with_plot_script(PathBuf::from("/nonexistent/run.sh"));
        let mut model = Model::init(&cfg, 120, 40).unwrap();
        model.install_dataset(
            "gene.tsv".to_string(),
            columns_from_rows(&["Gene ID"], &[&["ABC"]]),
        );
        model.update(Message::SelectRow).unwrap();
        model.update(Message::Launch).unwrap();
        assert!(wait_for_launch(&mut model));
        let uidata = model.get_uidata();
        assert_eq!(uidata.launch_state, LaunchState::FAILED);
        assert!(uidata.plot_enabled);
        assert_eq!(uidata.status_message, "Plot failed for ABC");
    }

    #[test]
    fn launch_without_selection_is_ignored() {
        let mut model = gene_model(3);
        model.update(Message::Launch).unwrap();
        assert_eq!(model.get_uidata().launch_state, LaunchState::IDLE);
        assert!(!model.get_uidata().show_launch_panel);
    }

    #[test]
    fn help_popup_opens_and_closes() {
        let mut model = gene_model(3);
        model.update(Message::Help).unwrap();
        assert!(model.get_uidata().show_popup);
        model.update(Message::Exit).unwrap();
        assert!(!model.get_uidata().show_popup);
    }

    #[test]
    fn mapping_status_message_boundaries() {
        assert_eq!(Model::mapping_status_message(49), "Showing 49 mappings");
        assert_eq!(
            Model::mapping_status_message(50),
            "Showing first 50 mappings"
        );
        assert_eq!(Model::mapping_status_message(0), "Showing 0 mappings");
    }

    #[test]
    fn wrap_cell_content_quotes_and_escapes() {
        assert_eq!(Model::wrap_cell_content("plain"), "plain");
        assert_eq!(Model::wrap_cell_content("a,b"), "\"a,b\"");
        assert_eq!(Model::wrap_cell_content("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn get_visible_name_truncates_long_names() {
        assert_eq!(Model::get_visible_name("Gene ID", 10), "Gene ID");
        assert_eq!(Model::get_visible_name("Transcript ID", 8), "Trans...");
        assert_eq!(Model::get_visible_name("Gene ID", 2), "");
    }

    #[test]
    fn load_data_file_reads_tsv_fixture() {
        let mut model = test_model();
        model
            .load_data_file(PathBuf::from("tests/fixtures/gene_mappings.tsv"))
            .unwrap();
        let uidata = model.get_uidata();
        assert_eq!(uidata.nrows, 8);
        assert_eq!(uidata.window_len, 8);
        assert_eq!(uidata.table[0].name, "Gene ID");
        assert_eq!(uidata.table[1].name, "Transcript ID");
        assert_eq!(uidata.table[0].data[0], "ENSG00000141510");
        assert_eq!(uidata.status_message, "Showing 8 mappings");
    }

    #[test]
    fn load_data_file_missing_file_fails() {
        let mut model = test_model();
        let result = model.load_data_file(PathBuf::from("tests/fixtures/absent.tsv"));
        assert!(matches!(result, Err(GMError::FileNotFound)));
    }

    #[test]
    fn load_data_file_rejects_unknown_extension() {
        let mut model = test_model();
        let result = model.load_data_file(PathBuf::from("Cargo.toml"));
        assert!(matches!(result, Err(GMError::UnknownFileType)));
    }
}
