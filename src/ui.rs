use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Position, Rect},
    style::{Modifier, Style, Stylize},
    symbols::border,
    text::Line,
    widgets::{Block, Cell, Clear, Paragraph, Row, Table, TableState},
};

use crate::launcher::LaunchState;
use crate::model::{Model, UIData};

pub const TABLE_HEADER_HEIGHT: usize = 1;
pub const STATUSLINE_HEIGHT: usize = 1;
pub const CMDLINE_HEIGHT: usize = 1;
pub const SCROLLBAR_WIDTH: usize = 1;
pub const COLUMN_WIDTH_MARGIN: usize = 2;

pub struct TableUI;

impl TableUI {
    pub fn new() -> Self {
        Self
    }

    pub fn draw(&self, model: &Model, frame: &mut Frame) {
        let uidata = model.get_uidata();
        let layout = Layout::vertical([
            Constraint::Min(1),
            Constraint::Length(uidata.layout.statusline_height as u16),
            Constraint::Length(CMDLINE_HEIGHT as u16),
        ])
        .split(frame.area());

        self.draw_table(uidata, frame, layout[0]);
        self.draw_statusline(uidata, frame, layout[1]);
        self.draw_cmdline(uidata, frame, layout[2]);

        if uidata.show_launch_panel {
            self.draw_launch_panel(uidata, frame);
        }
        if uidata.show_popup {
            self.draw_popup(uidata, frame);
        }
    }

    fn draw_table(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let title = Line::from(format!(" genemap [{}] {} rows ", uidata.name, uidata.nrows).bold());
        // Disabled controls render dimmed
        let search_key = if uidata.search_enabled {
            "</>".blue().bold()
        } else {
            "</>".dim()
        };
        let plot_key = if uidata.plot_enabled {
            "<p>".blue().bold()
        } else {
            "<p>".dim()
        };
        let instructions = Line::from(vec![
            " Search ".into(),
            search_key,
            " Select ".into(),
            "<Enter>".blue().bold(),
            " Plot ".into(),
            plot_key,
            " Help ".into(),
            "<?>".blue().bold(),
            " Quit ".into(),
            "<q> ".blue().bold(),
        ]);
        let block = Block::bordered()
            .title(title.centered())
            .title_bottom(instructions.centered())
            .border_set(border::THICK);

        let header = Row::new(
            uidata
                .table
                .iter()
                .map(|c| Cell::from(c.name.clone().bold().underlined()))
                .collect::<Vec<_>>(),
        );

        let rows: Vec<Row> = (0..uidata.window_len)
            .map(|ridx| {
                let cells = uidata
                    .table
                    .iter()
                    .map(|c| Cell::from(c.data.get(ridx).cloned().unwrap_or_default()));
                let mut row = Row::new(cells.collect::<Vec<_>>());
                if uidata.selected_row == Some(ridx) {
                    row = row.style(Style::new().add_modifier(Modifier::BOLD));
                }
                row
            })
            .collect();

        let widths = uidata
            .table
            .iter()
            .map(|c| Constraint::Length(c.width as u16))
            .collect::<Vec<_>>();

        let table = Table::new(rows, widths)
            .column_spacing(1)
            .header(header)
            .row_highlight_style(Style::new().reversed())
            .block(block);

        let mut state = TableState::default();
        if uidata.window_len > 0 {
            state.select(Some(uidata.cursor_row));
        }
        frame.render_stateful_widget(table, area, &mut state);
    }

    fn draw_statusline(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let state = match uidata.launch_state {
            LaunchState::IDLE => "".into(),
            LaunchState::LAUNCHING => " [plotting]".yellow(),
            LaunchState::SUCCEEDED => " [plot done]".green(),
            LaunchState::FAILED => " [plot failed]".red(),
        };
        let line = Line::from(vec![uidata.status_message.clone().into(), state]);
        frame.render_widget(Paragraph::new(line), area);
    }

    fn draw_cmdline(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        if uidata.active_input {
            frame.render_widget(
                Paragraph::new(format!("/{}", uidata.cmdinput.input)),
                area,
            );
            frame.set_cursor_position(Position::new(
                area.x + 1 + uidata.cmdinput.cursor_pos as u16,
                area.y,
            ));
        } else {
            let id = if uidata.identifier.is_empty() {
                "-".to_string()
            } else {
                uidata.identifier.clone()
            };
            let line = Line::from(vec!["gene id: ".into(), id.yellow()]);
            frame.render_widget(Paragraph::new(line), area);
        }
    }

    fn draw_launch_panel(&self, uidata: &UIData, frame: &mut Frame) {
        let area = popup_area(frame.area(), 60, 20);
        frame.render_widget(Clear, area);
        let block = Block::bordered().title(Line::from(" Plot ".bold()).centered());
        let text = match uidata.launch_state {
            LaunchState::LAUNCHING => {
                let dots = ".".repeat((uidata.last_update.elapsed().as_millis() / 300 % 4) as usize);
                format!("Launching plot for {} {}", uidata.identifier, dots)
            }
            LaunchState::SUCCEEDED => format!("Plot finished for {}", uidata.identifier),
            LaunchState::FAILED => format!("Plot failed for {} (see log)", uidata.identifier),
            LaunchState::IDLE => String::new(),
        };
        frame.render_widget(Paragraph::new(text).centered().block(block), area);
    }

    fn draw_popup(&self, uidata: &UIData, frame: &mut Frame) {
        let area = popup_area(frame.area(), 50, 70);
        frame.render_widget(Clear, area);
        let block = Block::bordered().title(Line::from(" Help ".bold()).centered());
        frame.render_widget(
            Paragraph::new(uidata.popup_message.clone()).block(block),
            area,
        );
    }
}

fn popup_area(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let vertical = Layout::vertical([Constraint::Percentage(percent_y)]).flex(Flex::Center);
    let horizontal = Layout::horizontal([Constraint::Percentage(percent_x)]).flex(Flex::Center);
    let [area] = vertical.areas(area);
    let [area] = horizontal.areas(area);
    area
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn popup_area_is_centered_fraction() {
        let full = Rect::new(0, 0, 100, 40);
        let popup = popup_area(full, 60, 20);
        assert_eq!(popup.width, 60);
        assert_eq!(popup.height, 8);
        assert_eq!(popup.x, 20);
        assert_eq!(popup.y, 16);
    }
}
