use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crate::app::{App, Focus, TextField};
use crate::tui::AppEvent;

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.tick_animation();
        }
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any field
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('c') => app.should_quit = true,
            KeyCode::Char('s') => app.send(),
            _ => {}
        }
        return;
    }

    match key.code {
        KeyCode::Tab => {
            app.focus = app.focus.next();
            return;
        }
        KeyCode::BackTab => {
            app.focus = app.focus.prev();
            return;
        }
        _ => {}
    }

    match app.focus {
        Focus::Guide => handle_guide(app, key),
        Focus::Picker => handle_picker(app, key),
        Focus::Send => handle_send_button(app, key),
    }
}

fn handle_guide(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.should_quit = true,
        KeyCode::Enter => app.send(),
        _ => {
            if edit_field(&mut app.guide, key) {
                app.commit_guide();
            }
        }
    }
}

fn handle_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Enter => app.pick_image(),
        KeyCode::Esc => {
            // Dismissing the picker is a cancelled pick
            if app.is_loading() {
                return;
            }
            app.picker = TextField::default();
            app.pick_image();
        }
        _ => {
            edit_field(&mut app.picker, key);
        }
    }
}

fn handle_send_button(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Enter | KeyCode::Char(' ') => app.send(),
        KeyCode::Esc | KeyCode::Char('q') => app.should_quit = true,
        _ => {}
    }
}

/// Apply an editing key; returns whether the text changed
fn edit_field(field: &mut TextField, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char(c) => {
            field.insert(c);
            true
        }
        KeyCode::Backspace => {
            let before = field.value.len();
            field.backspace();
            before != field.value.len()
        }
        KeyCode::Delete => {
            let before = field.value.len();
            field.delete();
            before != field.value.len()
        }
        KeyCode::Left => {
            field.left();
            false
        }
        KeyCode::Right => {
            field.right();
            false
        }
        KeyCode::Home => {
            field.home();
            false
        }
        KeyCode::End => {
            field.end();
            false
        }
        _ => false,
    }
}
