use od_base::ViewId;

use crate::chat::split_attachments;
use crate::render::RegionId;
use crate::render::views::queue_order;
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    None,
    SwitchView(ViewId),
    NextView,
    PrevView,
    ScrollUp(f32),
    ScrollDown(f32),
    /// Move the task selection by this many rows
    SelectTask(i32),
    OpenTerminal,
    ToggleTerminalFocus,
    CycleLogLevel,
    FocusSearch,
    BlurSearch,
    SearchChar(char),
    SearchBackspace,
    SearchLeft { extend: bool },
    SearchRight { extend: bool },
    SearchHome { extend: bool },
    SearchEnd { extend: bool },
    InputChar(char),
    InputBackspace,
    InputLeft,
    InputRight,
    InputSubmit,
    PasteText(String),
    ClearChat,
    Resync,
}

/// Work the main loop must do after an action, beyond state changes.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResult {
    Nothing,
    Submit { message: String, attachments: Vec<String> },
    Resync,
}

pub fn apply_action(state: &mut AppState, action: Action, now_ms: u64) -> ActionResult {
    match action {
        Action::None => return ActionResult::Nothing,
        Action::SwitchView(view) => state.switch_view(view),
        Action::NextView => state.switch_view(state.ctx.view.next()),
        Action::PrevView => state.switch_view(state.ctx.view.prev()),
        Action::ScrollUp(amount) => {
            if let Some(scroll) = state.scroll_target() {
                scroll.scroll_up(amount);
            }
        }
        Action::ScrollDown(amount) => {
            if let Some(scroll) = state.scroll_target() {
                scroll.scroll_down(amount);
            }
        }
        Action::SelectTask(delta) => select_task(state, delta),
        Action::OpenTerminal => {
            if state.ctx.selected_task.is_none() {
                select_task(state, 0);
            }
            state.terminal_focus = RegionId::LogTail;
            state.switch_view(ViewId::Terminal);
        }
        Action::ToggleTerminalFocus => {
            state.terminal_focus = match state.terminal_focus {
                RegionId::LogTail => RegionId::PlanPanel,
                _ => RegionId::LogTail,
            };
        }
        Action::CycleLogLevel => {
            state.ctx.log_filter.min_level = state.ctx.log_filter.min_level.next();
            state.pending_render = true;
            state.notify(format!("Log level: {}+", state.ctx.log_filter.min_level.as_str()), now_ms);
        }
        Action::FocusSearch => {
            if let Some(search) = state.container.search_mut() {
                search.focused = true;
                search.end(false);
            }
        }
        Action::BlurSearch => {
            if let Some(search) = state.container.search_mut() {
                search.focused = false;
                search.anchor = None;
            }
        }
        Action::SearchChar(c) => edit_search(state, |s| s.insert(c)),
        Action::SearchBackspace => edit_search(state, |s| s.backspace()),
        Action::SearchLeft { extend } => edit_search(state, |s| s.left(extend)),
        Action::SearchRight { extend } => edit_search(state, |s| s.right(extend)),
        Action::SearchHome { extend } => edit_search(state, |s| s.home(extend)),
        Action::SearchEnd { extend } => edit_search(state, |s| s.end(extend)),
        Action::InputChar(c) => {
            state.input.insert(state.input_cursor, c);
            state.input_cursor += c.len_utf8();
        }
        Action::PasteText(text) => {
            let flat = text.replace('\n', " ");
            state.input.insert_str(state.input_cursor, &flat);
            state.input_cursor += flat.len();
        }
        Action::InputBackspace => {
            if let Some((idx, _)) = state.input[..state.input_cursor].char_indices().next_back() {
                state.input.replace_range(idx..state.input_cursor, "");
                state.input_cursor = idx;
            }
        }
        Action::InputLeft => {
            if let Some((idx, _)) = state.input[..state.input_cursor].char_indices().next_back() {
                state.input_cursor = idx;
            }
        }
        Action::InputRight => {
            if let Some(c) = state.input[state.input_cursor..].chars().next() {
                state.input_cursor += c.len_utf8();
            }
        }
        Action::InputSubmit => {
            if state.input.trim().is_empty() {
                return ActionResult::Nothing;
            }
            if state.chat.is_open() {
                state.notify("A reply is still streaming", now_ms);
                return ActionResult::Nothing;
            }
            let (message, attachments) = split_attachments(&state.input);
            state.input.clear();
            state.input_cursor = 0;
            state.transcript_scroll.user_scrolled = false;
            state.dirty = true;
            return ActionResult::Submit { message, attachments };
        }
        Action::ClearChat => {
            state.chat.clear();
            state.transcript.clear();
            state.transcript_scroll = Default::default();
        }
        Action::Resync => {
            state.notify("Resyncing…", now_ms);
            return ActionResult::Resync;
        }
    }
    state.dirty = true;
    ActionResult::Nothing
}

/// Apply a search-box edit and mirror its text into the log filter.
fn edit_search(state: &mut AppState, edit: impl FnOnce(&mut crate::render::search::SearchBox)) {
    let Some(search) = state.container.search_mut() else {
        return;
    };
    edit(search);
    if search.text != state.ctx.log_filter.query {
        state.ctx.log_filter.query = search.text.clone();
        state.pending_render = true;
    }
}

fn select_task(state: &mut AppState, delta: i32) {
    let Some(snapshot) = state.snapshot() else {
        return;
    };
    let order: Vec<String> = queue_order(snapshot).iter().map(|t| t.id.clone()).collect();
    if order.is_empty() {
        return;
    }
    let current = state.ctx.selected_task.as_ref().and_then(|id| order.iter().position(|o| o == id));
    let next = match current {
        Some(idx) => (idx as i64 + delta as i64).clamp(0, order.len() as i64 - 1) as usize,
        None => 0,
    };
    state.ctx.selected_task = Some(order[next].clone());
    state.pending_render = true;
}
