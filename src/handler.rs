use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crate::app::{App, InputMode, Screen};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize => app.scroll_chat_to_bottom(),
        AppEvent::Tick => app.tick(),
        AppEvent::TurnResolved { placeholder_id, result } => app.turn_resolved(&placeholder_id, result),
        AppEvent::LoginFinished(outcome) => app.login_finished(outcome),
        AppEvent::SpeechFetched { id, result } => app.speech_fetched(&id, result),
        AppEvent::PlaybackFinished { token } => app.playback_finished(token),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work anywhere
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match app.screen {
        Screen::Login => handle_login(app, key),
        Screen::Chat => match app.input_mode {
            InputMode::Normal => handle_chat_normal(app, key),
            InputMode::Editing => handle_chat_editing(app, key),
        },
    }
}

fn handle_login(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Esc => app.screen = Screen::Chat,
        KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => app.login.toggle_focus(),
        KeyCode::Enter => app.submit_login(),
        KeyCode::Backspace => {
            app.login.focused_mut().pop();
        }
        KeyCode::Char(c) if !ctrl => app.login.focused_mut().push(c),
        _ => {}
    }
}

fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('l') if key.modifiers.contains(KeyModifiers::CONTROL) => app.open_login(),
        KeyCode::Char('i') | KeyCode::Enter => app.input_mode = InputMode::Editing,

        // Message selection
        KeyCode::Char('j') | KeyCode::Down => app.select_next(),
        KeyCode::Char('k') | KeyCode::Up => app.select_prev(),

        // Message actions
        KeyCode::Char('c') => app.copy_selected(),
        KeyCode::Char('s') => app.speak_selected(),

        // Scrolling
        KeyCode::PageUp | KeyCode::Char('K') => app.scroll_up(),
        KeyCode::PageDown | KeyCode::Char('J') => app.scroll_down(),
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),
        _ => {}
    }
}

fn handle_chat_editing(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
            if app.selected.is_none() {
                app.select_prev();
            }
        }
        KeyCode::Char('s') if ctrl => app.send_chat(),
        KeyCode::Char('l') if ctrl => app.open_login(),
        // Enter types a newline; a trailing one is what sends
        KeyCode::Enter => insert_char(app, '\n'),
        KeyCode::Backspace => {
            if app.input_cursor > 0 {
                app.input_cursor -= 1;
                let mut buffer = app.chat.input.clone();
                buffer.remove(char_to_byte_index(&buffer, app.input_cursor));
                app.set_chat_input(buffer);
            }
        }
        KeyCode::Delete => {
            if app.input_cursor < app.chat.input.chars().count() {
                let mut buffer = app.chat.input.clone();
                buffer.remove(char_to_byte_index(&buffer, app.input_cursor));
                app.set_chat_input(buffer);
            }
        }
        KeyCode::Left => {
            app.input_cursor = app.input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.chat.input.chars().count();
            app.input_cursor = (app.input_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.input_cursor = 0;
        }
        KeyCode::End => {
            app.input_cursor = app.chat.input.chars().count();
        }
        KeyCode::Up => app.scroll_up(),
        KeyCode::Down => app.scroll_down(),
        KeyCode::Char(c) if !ctrl => insert_char(app, c),
        _ => {}
    }
}

fn insert_char(app: &mut App, c: char) {
    let mut buffer = app.chat.input.clone();
    buffer.insert(char_to_byte_index(&buffer, app.input_cursor), c);
    app.input_cursor += 1;
    app.set_chat_input(buffer);
}
