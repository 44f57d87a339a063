use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use airb_core::ApiState;
use crate::app::{App, Focus, TextField};

const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

pub fn render(app: &App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, guide_area, picker_area, response_area, status_area, send_area, footer_area] =
        Layout::vertical([
            Constraint::Length(1),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(1),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .areas(area);

    render_header(app, frame, header_area);
    render_input(
        frame,
        guide_area,
        &app.guide,
        " Tell them, ",
        app.focus == Focus::Guide,
        Color::Cyan,
    );
    render_picker(app, frame, picker_area);
    render_response(app, frame, response_area);
    render_status(app, frame, status_area);
    render_send_button(app, frame, send_area);
    render_footer(frame, footer_area);
}

fn border_style(focused: bool, enabled: bool) -> Style {
    if !enabled {
        Style::default().fg(Color::DarkGray)
    } else if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::Gray)
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" airb ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(format!("model: {}", app.model), Style::default().fg(Color::Gray)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

/// Single-line input that scrolls horizontally to keep the cursor visible
fn render_input(
    frame: &mut Frame,
    area: Rect,
    field: &TextField,
    title: &str,
    focused: bool,
    color: Color,
) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style(focused, true))
        .title(title.to_string());

    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width == 0 || field.cursor < inner_width {
        0
    } else {
        field.cursor - inner_width + 1
    };

    let visible_text: String = field
        .value
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    frame.render_widget(
        Paragraph::new(visible_text)
            .style(Style::default().fg(color))
            .block(block),
        area,
    );

    if focused {
        let cursor_x = (field.cursor - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_picker(app: &App, frame: &mut Frame, area: Rect) {
    let focused = app.focus == Focus::Picker;
    let enabled = !app.is_loading();

    if focused && enabled {
        render_input(
            frame,
            area,
            &app.picker,
            " Add Photo: path or file:// URI (Enter to pick, Esc to clear) ",
            true,
            Color::Yellow,
        );
        return;
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style(focused, enabled))
        .title(" Add Photo ");

    let line = match &app.selected_image {
        Some(handle) => Line::from(vec![
            Span::styled("Selected: ", Style::default().fg(Color::Green)),
            Span::raw(handle.to_string()),
        ]),
        None => Line::from(Span::styled(
            "No screenshot selected",
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )),
    };

    frame.render_widget(Paragraph::new(line).block(block), area);
}

fn render_response(app: &App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Gray))
        .title(" AI response ");

    let text = if app.response_text.is_empty() {
        Text::from(Span::styled(
            "The rewritten message will appear here.",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Text::from(
            app.response_text
                .lines()
                .map(|line| Line::from(line.to_string()))
                .collect::<Vec<_>>(),
        )
    };

    frame.render_widget(
        Paragraph::new(text).block(block).wrap(Wrap { trim: false }),
        area,
    );
}

fn status_line(app: &App) -> Line<'static> {
    match &app.api_state {
        ApiState::Idle => Line::from(Span::styled(
            " Type a note, pick a screenshot, then send.",
            Style::default().fg(Color::DarkGray),
        )),
        ApiState::Loading => {
            let dots = ".".repeat((app.animation_frame as usize % 3) + 1);
            Line::from(Span::styled(
                format!(" Generating{}", dots),
                Style::default().fg(Color::Yellow).add_modifier(Modifier::ITALIC),
            ))
        }
        ApiState::Success(_) => Line::from(Span::styled(
            " Reply ready.",
            Style::default().fg(Color::Green),
        )),
        ApiState::Error(message) => Line::from(Span::styled(
            format!(" {}", message),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
    }
}

fn render_status(app: &App, frame: &mut Frame, area: Rect) {
    frame.render_widget(Paragraph::new(status_line(app)), area);
}

fn render_send_button(app: &App, frame: &mut Frame, area: Rect) {
    let focused = app.focus == Focus::Send;
    let enabled = !app.is_loading();

    let [button_area, _] =
        Layout::horizontal([Constraint::Length(14), Constraint::Min(0)]).areas(area);

    let label = if enabled {
        Span::styled("Send", Style::default().bold())
    } else {
        Span::styled(
            SPINNER[app.animation_frame as usize % SPINNER.len()],
            Style::default().fg(Color::Yellow),
        )
    };

    let button = Paragraph::new(Line::from(label).centered()).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(border_style(focused, enabled)),
    );
    frame.render_widget(button, button_area);
}

fn render_footer(frame: &mut Frame, area: Rect) {
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = Line::from(vec![
        Span::styled(" Tab ", key_style),
        Span::styled(" focus ", label_style),
        Span::styled(" Enter ", key_style),
        Span::styled(" send / pick ", label_style),
        Span::styled(" Ctrl+S ", key_style),
        Span::styled(" send ", label_style),
        Span::styled(" Ctrl+C ", key_style),
        Span::styled(" quit ", label_style),
    ]);

    frame.render_widget(Paragraph::new(hints), area);
}
