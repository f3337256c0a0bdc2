use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::App;
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
        AppEvent::Key(key) => handle_key(app, key).await,
        AppEvent::Resize(_, _) => {
            if app.follow_latest {
                app.scroll_to_bottom();
            }
        }
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Chat(event) => app.on_chat_event(event).await,
        AppEvent::Backend(status) => app.backend_status = status,
    }
    Ok(())
}

async fn handle_key(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    // Global keys that work in any mode
    if ctrl && key.code == KeyCode::Char('c') {
        app.should_quit = true;
        return;
    }

    if app.confirm_clear {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => app.answer_clear(true).await,
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => app.answer_clear(false).await,
            _ => {}
        }
        return;
    }

    if app.is_panel_open() {
        handle_panel_key(app, key, ctrl).await;
    } else {
        handle_closed_key(app, key, ctrl);
    }
}

fn handle_closed_key(app: &mut App, key: KeyEvent, ctrl: bool) {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => app.should_quit = true,
        KeyCode::Char('o') if ctrl => app.toggle_panel(),
        KeyCode::Enter | KeyCode::Tab => app.toggle_panel(),
        _ => {}
    }
}

async fn handle_panel_key(app: &mut App, key: KeyEvent, ctrl: bool) {
    if ctrl {
        match key.code {
            KeyCode::Char('o') => app.toggle_panel(),
            KeyCode::Char('l') => app.request_clear(),
            KeyCode::Char('e') => app.export_and_report().await,
            _ => {}
        }
        return;
    }

    match key.code {
        KeyCode::Esc => app.toggle_panel(),
        KeyCode::Enter => {
            // Shift+Enter would be a newline; single-line input ignores it
            if !key.modifiers.contains(KeyModifiers::SHIFT) {
                app.submit_input();
            }
        }
        KeyCode::Up => app.scroll_up(1),
        KeyCode::Down => app.scroll_down(1),
        KeyCode::PageUp => app.scroll_up(app.chat_height.max(1) / 2),
        KeyCode::PageDown => app.scroll_down(app.chat_height.max(1) / 2),
        KeyCode::Backspace => {
            if app.cursor > 0 {
                app.cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.cursor = app.cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.cursor = (app.cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.cursor = 0;
        }
        KeyCode::End => {
            app.cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.cursor);
            app.input.insert(byte_pos, c);
            app.cursor += 1;
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_to_byte_index_multibyte() {
        let s = "héllo";
        assert_eq!(char_to_byte_index(s, 0), 0);
        assert_eq!(char_to_byte_index(s, 2), 3);
        assert_eq!(char_to_byte_index(s, 10), s.len());
    }
}
