//! Event handling for the TUI
//!
//! Vim-style keys. Overlays (help, confirmation, value editing) take input
//! before the active view does.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use super::app::App;
use crate::views::ViewId;

/// Handle a key event, returns true if app should quit
pub fn handle_event(app: &mut App, key: KeyEvent) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return true;
    }

    if app.show_help {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('?')) {
            app.show_help = false;
        }
        return false;
    }

    if app.confirm.is_some() {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => app.answer_confirm(true),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => app.answer_confirm(false),
            _ => {}
        }
        return false;
    }

    if app.is_editing() {
        handle_edit_mode(app, key);
        return false;
    }

    handle_normal_mode(app, key)
}

fn handle_edit_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.cancel_edit(),
        KeyCode::Enter => app.commit_edit(),
        KeyCode::Backspace => app.edit_input(None),
        KeyCode::Char(c) => app.edit_input(Some(c)),
        _ => {}
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('?') => app.show_help = true,
        KeyCode::Tab => app.next_view(),
        KeyCode::Esc => app.close_active(),

        KeyCode::Char('j') | KeyCode::Down => app.move_selection(1),
        KeyCode::Char('k') | KeyCode::Up => app.move_selection(-1),
        KeyCode::PageDown => app.move_selection(10),
        KeyCode::PageUp => app.move_selection(-10),
        KeyCode::Char('g') | KeyCode::Home => app.jump(false),
        KeyCode::Char('G') | KeyCode::End => app.jump(true),

        KeyCode::Char('r') => {
            app.set_status("Refreshing...");
            app.refresh();
        }
        KeyCode::Char('s') => app.open_settings(),

        KeyCode::Char('u') if app.active == ViewId::Tree => app.request_upgrade(false),
        KeyCode::Char('U') if app.active == ViewId::Tree => app.request_upgrade(true),
        KeyCode::Char('d') if app.active == ViewId::Tree => app.request_downgrade(),

        KeyCode::Enter | KeyCode::Char('e') if app.active == ViewId::Settings => app.begin_edit(),

        _ => {}
    }
    false
}
