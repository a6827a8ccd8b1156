use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};
use crate::app::{App, InputMode, Screen};
use crate::chat::Role;
use crate::login::LoginField;

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.screen {
        Screen::Chat => render_chat_screen(app, frame, body_area),
        Screen::Login => render_login_screen(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = if app.mode.is_mock() {
        Style::default().fg(Color::Magenta)
    } else {
        Style::default().fg(Color::Green)
    };

    let mut spans = vec![
        Span::styled(" Ctrl + Alt + Defeat ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(format!("[{}] ", app.mode.display_name()), mode_style),
        Span::styled(app.base_url.clone(), Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ];
    if app.speech.speaking().is_some() {
        spans.push(Span::styled("  ♪ playing", Style::default().fg(Color::White)));
    }
    let title = Line::from(spans);
    frame.render_widget(Paragraph::new(title), area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let hints: &[(&str, &str)] = match (app.screen, app.input_mode) {
        (Screen::Login, _) => &[("Tab", "field"), ("Enter", "login"), ("Esc", "back"), ("^C", "quit")],
        (Screen::Chat, InputMode::Editing) => &[
            ("Enter", "send"),
            ("^S", "send"),
            ("Esc", "select messages"),
            ("^L", "login"),
            ("^C", "quit"),
        ],
        (Screen::Chat, InputMode::Normal) => &[
            ("j/k", "select"),
            ("c", "copy"),
            ("s", "speak/stop"),
            ("i", "type"),
            ("PgUp/PgDn", "scroll"),
            ("q", "quit"),
        ],
    };

    let mut spans = Vec::with_capacity(hints.len() * 2);
    for (key, action) in hints {
        spans.push(Span::styled(format!(" {} ", key), Style::default().fg(Color::Black).bg(Color::DarkGray)));
        spans.push(Span::styled(format!(" {}  ", action), Style::default().fg(Color::DarkGray)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    // Inner size minus borders, used for scroll calculations
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if app.input_mode == InputMode::Normal {
            Color::Cyan
        } else {
            Color::DarkGray
        }))
        .title(" Chat ");

    let mut lines: Vec<Line> = Vec::new();
    for (i, msg) in app.chat.messages.iter().enumerate() {
        let selected = app.selected == Some(i) && app.input_mode == InputMode::Normal;
        let marker = if selected { "> " } else { "" };

        let (label, color) = match msg.role {
            Role::User => ("You:", Color::Cyan),
            Role::Assistant => ("AI:", Color::Yellow),
            Role::System => ("System:", Color::Magenta),
        };
        let mut label_style = Style::default().fg(color).add_modifier(Modifier::BOLD);
        if selected {
            label_style = label_style.add_modifier(Modifier::REVERSED);
        }
        lines.push(Line::from(Span::styled(format!("{}{}", marker, label), label_style)));

        if msg.pending {
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("{}{}", msg.text.trim_end_matches('…'), dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        } else {
            let text_style = if msg.role == Role::User {
                Style::default().fg(Color::Cyan)
            } else if msg.text.starts_with("Error: ") {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };
            for line in msg.text.lines() {
                lines.push(Line::from(Span::styled(line.to_string(), text_style)));
            }
        }

        if msg.role == Role::Assistant && !msg.pending {
            let copy = if app.copy_marker.is_copied(&msg.id) {
                Span::styled("✓ copied", Style::default().fg(Color::Green))
            } else {
                Span::styled("c copy", Style::default().fg(Color::DarkGray))
            };
            let speak = if app.speech.is_speaking(&msg.id) {
                Span::styled("■ speaking", Style::default().fg(Color::White).bold())
            } else {
                Span::styled("s speak", Style::default().fg(Color::DarkGray))
            };
            lines.push(Line::from(vec![copy, Span::raw("   "), speak]));
        }

        lines.push(Line::default());
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, chat_area);

    render_chat_input(app, frame, input_area);
}

fn render_chat_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let send_label = if app.chat.is_sending() {
        " … ".to_string()
    } else if app.chat.can_send() {
        " Send ".to_string()
    } else {
        " Send (nothing to send) ".to_string()
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if editing { Color::Yellow } else { Color::DarkGray }))
        .title(" Type a message… ")
        .title_bottom(Line::from(send_label).right_aligned());

    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;

    // Horizontal scroll to keep the cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    // Embedded newlines are shown as a glyph so the box stays one line
    let visible_text: String = app.chat.input
        .chars()
        .map(|c| if c == '\n' { '⏎' } else { c })
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);
    frame.render_widget(input, area);

    if editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_login_screen(app: &App, frame: &mut Frame, area: Rect) {
    let [popup] = Layout::horizontal([Constraint::Length(50)]).flex(Flex::Center).areas(area);
    let [popup] = Layout::vertical([Constraint::Length(13)]).flex(Flex::Center).areas(popup);
    frame.render_widget(Clear, popup);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" 🔒 Login ");
    let inner = block.inner(popup);
    frame.render_widget(block, popup);

    let [email_area, password_area, button_area, message_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Length(1),
        Constraint::Min(0),
    ])
    .areas(inner);

    let form = &app.login;
    let field = |title: &'static str, value: String, focused: bool| {
        Paragraph::new(value).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(if focused { Color::Yellow } else { Color::DarkGray }))
                .title(title),
        )
    };

    let email_focused = form.focus == LoginField::Email;
    frame.render_widget(field(" Email ", form.email.clone(), email_focused), email_area);
    frame.render_widget(
        field(" Password ", "•".repeat(form.password.chars().count()), !email_focused),
        password_area,
    );

    let button = if form.loading {
        Span::styled("Logging in…", Style::default().fg(Color::DarkGray).italic())
    } else {
        Span::styled("[ Login ]", Style::default().fg(Color::Black).bg(Color::White).bold())
    };
    frame.render_widget(Paragraph::new(Line::from(button).centered()), button_area);

    if let Some(message) = &form.message {
        let message = Paragraph::new(message.as_str())
            .style(Style::default().fg(Color::Red))
            .wrap(Wrap { trim: true });
        frame.render_widget(message, message_area);
    }

    if !form.loading {
        let (target, len) = if email_focused {
            (email_area, form.email.chars().count())
        } else {
            (password_area, form.password.chars().count())
        };
        let max_x = target.width.saturating_sub(2);
        frame.set_cursor_position((target.x + 1 + (len as u16).min(max_x), target.y + 1));
    }
}
