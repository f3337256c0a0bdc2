use chrono::Local;
use nexus_chat_core::{ChatMessage, ChatRole};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};

use crate::app::{App, BackendStatus};

const PANEL_WIDTH: u16 = 48;
const PANEL_HEIGHT: u16 = 24;
const TOGGLE_LABEL: &str = " 💬 Chat (Enter) ";

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Host page: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_page(app, frame, body_area);
    render_footer(app, frame, footer_area);

    if app.is_panel_open() {
        render_panel(app, frame, body_area);
    } else {
        render_toggle(frame, body_area);
    }

    if app.confirm_clear {
        render_confirm_clear(frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let config = app.session.config();
    let (status_text, status_color) = match app.backend_status {
        BackendStatus::Unknown => ("● connecting".to_string(), Color::Gray),
        BackendStatus::Online => ("● online".to_string(), Color::Green),
        BackendStatus::Offline => (format!("● {}", config.messages.offline), Color::Red),
    };

    let title = Line::from(vec![
        Span::styled(format!(" 🤖 {} ", config.bot_name), Style::default().fg(Color::Cyan).bold()),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_page(app: &App, frame: &mut Frame, area: Rect) {
    let endpoint = &app.session.config().api_url;
    let text = Text::from(vec![
        Line::default(),
        Line::from(Span::styled("  Nexus chat widget", Style::default().add_modifier(Modifier::BOLD))),
        Line::from(Span::styled(
            format!("  Endpoint: {}", endpoint),
            Style::default().fg(Color::DarkGray),
        )),
    ]);
    frame.render_widget(Paragraph::new(text), area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let hints = if app.confirm_clear {
        " y: confirm  n/Esc: cancel "
    } else if app.is_panel_open() {
        " Enter: send  ↑/↓: scroll  ^L: clear  ^E: export  Esc: close  ^C: quit "
    } else {
        " Enter/Tab: open chat  q: quit "
    };

    let mut spans = vec![Span::styled(hints, Style::default().fg(Color::Gray))];
    if let Some(notice) = &app.notice {
        spans.push(Span::styled(format!(" {} ", notice), Style::default().fg(Color::Yellow)));
    }

    let footer = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

/// Bottom-right anchored rectangle, clamped to `area`
fn anchored_bottom_right(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(2));
    let height = height.min(area.height.saturating_sub(1));
    Rect {
        x: area.x + area.width.saturating_sub(width + 2),
        y: area.y + area.height.saturating_sub(height + 1),
        width,
        height,
    }
}

fn render_toggle(frame: &mut Frame, area: Rect) {
    let width = TOGGLE_LABEL.chars().count() as u16 + 1;
    let button_area = anchored_bottom_right(area, width, 1);

    let button = Paragraph::new(TOGGLE_LABEL)
        .style(Style::default().bg(Color::Indexed(62)).fg(Color::White).bold());
    frame.render_widget(button, button_area);
}

fn render_panel(app: &mut App, frame: &mut Frame, area: Rect) {
    let panel_area = anchored_bottom_right(area, PANEL_WIDTH, PANEL_HEIGHT);
    frame.render_widget(Clear, panel_area);

    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(panel_area);

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);
    if app.follow_latest {
        app.scroll_to_bottom();
    }

    let bot_name = app.session.config().bot_name.clone();
    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Indexed(62)))
        .title(format!(" 🤖 {} ", bot_name));

    let mut lines: Vec<Line> = Vec::new();
    for msg in &app.messages {
        push_message_lines(&mut lines, msg, &bot_name);
    }

    if app.typing {
        lines.push(Line::from(Span::styled(
            bot_name.clone(),
            Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let typing = app.session.config().messages.typing.trim_end_matches('.');
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("{}{}", typing, dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.scroll, 0));
    frame.render_widget(chat, chat_area);

    render_input(app, frame, input_area);
}

fn push_message_lines(lines: &mut Vec<Line>, msg: &ChatMessage, bot_name: &str) {
    let time = msg.sent_at.with_timezone(&Local).format("%H:%M").to_string();

    let (sender, color, alignment) = match msg.role {
        ChatRole::User => ("You", Color::Cyan, Alignment::Right),
        ChatRole::Bot => (bot_name, Color::Magenta, Alignment::Left),
    };

    lines.push(
        Line::from(vec![
            Span::styled(sender.to_string(), Style::default().fg(color).add_modifier(Modifier::BOLD)),
            Span::styled(format!(" · {}", time), Style::default().fg(Color::DarkGray)),
        ])
        .alignment(alignment),
    );

    for line in msg.text.lines() {
        lines.push(Line::from(line.to_string()).alignment(alignment));
    }
    lines.push(Line::default());
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let border_color = if app.is_awaiting_reply() { Color::DarkGray } else { Color::Yellow };
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Message ");

    // Calculate visible portion of input with horizontal scrolling
    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width == 0 || app.cursor < inner_width {
        0
    } else {
        app.cursor - inner_width + 1
    };

    let input = if app.input.is_empty() {
        Paragraph::new(Span::styled(
            app.session.config().placeholder.clone(),
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let visible_text: String = app.input.chars().skip(scroll_offset).take(inner_width).collect();
        Paragraph::new(visible_text).style(Style::default().fg(Color::Cyan))
    };

    frame.render_widget(input.block(input_block), area);

    if !app.confirm_clear {
        let cursor_x = (app.cursor - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_confirm_clear(frame: &mut Frame, area: Rect) {
    let width = 44.min(area.width);
    let height = 5.min(area.height);
    let popup = Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    };
    frame.render_widget(Clear, popup);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(" Clear history ");
    let body = Paragraph::new(vec![
        Line::from("Delete the whole chat history?"),
        Line::from(Span::styled("y = yes   n = no", Style::default().fg(Color::DarkGray))),
    ])
    .alignment(Alignment::Center)
    .block(block);

    frame.render_widget(body, popup);
}
