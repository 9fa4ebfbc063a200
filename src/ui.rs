use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState};

use crate::app::{PICKER_HEADERS, ProfilePicker};

const MUTED: Color = Color::Rgb(140, 156, 178);
const HELP: &str = "↑/k up • ↓/j down • g/G top/bottom • enter select • q quit";

pub fn render(frame: &mut Frame, picker: &mut ProfilePicker) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(4), Constraint::Length(1)])
        .split(frame.area());

    // Borders and the header row take three lines.
    picker.set_page_size(usize::from(root[0].height.saturating_sub(3)));
    render_table(frame, root[0], picker);
    render_footer(frame, root[1]);
}

fn render_table(frame: &mut Frame, area: Rect, picker: &ProfilePicker) {
    let style = picker.style();
    let header_row = Row::new(
        PICKER_HEADERS
            .iter()
            .map(|header| Cell::from(*header).style(Style::default().add_modifier(Modifier::BOLD))),
    )
    .height(1)
    .style(Style::default().fg(style.header_fg).bg(style.header_bg));

    let rows = picker
        .rows()
        .iter()
        .map(|row| Row::new(row.iter().map(|column| Cell::from(column.as_str()))));

    let table = Table::new(rows, column_constraints())
        .header(header_row)
        .block(
            Block::default()
                .title(format!("Debug profiles ({})", picker.rows().len()))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(MUTED)),
        )
        .column_spacing(1)
        .row_highlight_style(Style::default().fg(style.selected_fg).bg(style.selected_bg))
        .highlight_symbol("> ");

    let mut state = TableState::default();
    state.select(picker.selected_index());
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_footer(frame: &mut Frame, area: Rect) {
    let footer = Paragraph::new(Line::from(vec![
        Span::raw("  "),
        Span::styled(HELP, Style::default().fg(MUTED)),
    ]));
    frame.render_widget(footer, area);
}

fn column_constraints() -> [Constraint; 5] {
    [
        Constraint::Percentage(18),
        Constraint::Percentage(22),
        Constraint::Percentage(22),
        Constraint::Percentage(13),
        Constraint::Percentage(25),
    ]
}
