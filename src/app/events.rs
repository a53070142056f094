use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use od_base::ViewId;

use super::actions::Action;
use crate::infra::constants::{SCROLL_ARROW_AMOUNT, SCROLL_PAGE_AMOUNT};
use crate::state::AppState;

/// Map a terminal event to an action. `None` means quit.
pub fn handle_event(event: &Event, state: &AppState) -> Option<Action> {
    match event {
        Event::Key(key) => handle_key(key, state),
        // Terminal equivalent of the tab becoming visible again
        Event::FocusGained => Some(Action::Resync),
        Event::Paste(text) if state.ctx.view == ViewId::Chat && !state.logged_out => {
            let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
            Some(Action::PasteText(normalized))
        }
        _ => Some(Action::None),
    }
}

fn handle_key(key: &KeyEvent, state: &AppState) -> Option<Action> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let shift = key.modifiers.contains(KeyModifiers::SHIFT);

    if ctrl {
        match key.code {
            KeyCode::Char('q') | KeyCode::Char('c') => return None,
            KeyCode::Char('l') => return Some(Action::ClearChat),
            _ => return Some(Action::None),
        }
    }

    if state.logged_out {
        return match key.code {
            KeyCode::Char('q') | KeyCode::Esc => None,
            _ => Some(Action::None),
        };
    }

    if state.search_focused() {
        let action = match key.code {
            KeyCode::Esc | KeyCode::Enter => Action::BlurSearch,
            KeyCode::Backspace => Action::SearchBackspace,
            KeyCode::Left => Action::SearchLeft { extend: shift },
            KeyCode::Right => Action::SearchRight { extend: shift },
            KeyCode::Home => Action::SearchHome { extend: shift },
            KeyCode::End => Action::SearchEnd { extend: shift },
            KeyCode::Char(c) => Action::SearchChar(c),
            _ => Action::None,
        };
        return Some(action);
    }

    // Tab order and scrolling work everywhere
    let common = match key.code {
        KeyCode::Tab if shift => Some(Action::PrevView),
        KeyCode::Tab => Some(Action::NextView),
        KeyCode::BackTab => Some(Action::PrevView),
        KeyCode::PageUp => Some(Action::ScrollUp(SCROLL_PAGE_AMOUNT)),
        KeyCode::PageDown => Some(Action::ScrollDown(SCROLL_PAGE_AMOUNT)),
        _ => None,
    };
    if let Some(action) = common {
        return Some(action);
    }

    if state.ctx.view == ViewId::Chat {
        let action = match key.code {
            KeyCode::Enter => Action::InputSubmit,
            KeyCode::Backspace => Action::InputBackspace,
            KeyCode::Left => Action::InputLeft,
            KeyCode::Right => Action::InputRight,
            KeyCode::Up => Action::ScrollUp(SCROLL_ARROW_AMOUNT),
            KeyCode::Down => Action::ScrollDown(SCROLL_ARROW_AMOUNT),
            KeyCode::Char(c) => Action::InputChar(c),
            _ => Action::None,
        };
        return Some(action);
    }

    let action = match (state.ctx.view, key.code) {
        (_, KeyCode::Char('q')) => return None,
        (_, KeyCode::Char(c @ '1'..='6')) => c.to_digit(10).and_then(ViewId::from_digit).map_or(Action::None, Action::SwitchView),
        (_, KeyCode::Char('r')) => Action::Resync,
        (_, KeyCode::Char('l')) => Action::CycleLogLevel,
        (ViewId::Logs, KeyCode::Char('/')) => Action::FocusSearch,
        (ViewId::Tasks, KeyCode::Up) => Action::SelectTask(-1),
        (ViewId::Tasks, KeyCode::Down) => Action::SelectTask(1),
        (ViewId::Tasks, KeyCode::Enter) => Action::OpenTerminal,
        (ViewId::Terminal, KeyCode::Char('p')) => Action::ToggleTerminalFocus,
        (_, KeyCode::Up) => Action::ScrollUp(SCROLL_ARROW_AMOUNT),
        (_, KeyCode::Down) => Action::ScrollDown(SCROLL_ARROW_AMOUNT),
        _ => Action::None,
    };
    Some(action)
}
