mod conversation;
pub mod helpers;
mod input;
mod panels;
pub mod theme;

use od_base::ViewId;
use ratatui::{
    prelude::*,
    widgets::{Block, Paragraph},
};

use crate::render::RegionId;
use crate::state::AppState;

pub fn render(frame: &mut Frame, state: &mut AppState) {
    let area = frame.area();

    // Fill base background
    frame.render_widget(Block::default().style(Style::default().bg(theme::BG_BASE)), area);

    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Tabs
            Constraint::Min(1),    // Body
            Constraint::Length(1), // Status bar
        ])
        .split(area);

    render_tabs(frame, state, main_layout[0]);
    if state.logged_out {
        render_logged_out(frame, main_layout[1]);
    } else {
        render_body(frame, state, main_layout[1]);
    }
    input::render_status_bar(frame, state, main_layout[2]);
}

fn render_tabs(frame: &mut Frame, state: &AppState, area: Rect) {
    let mut spans = vec![Span::styled(" opsdeck ", Style::default().fg(theme::BG_BASE).bg(theme::ACCENT).bold())];
    for (i, view) in ViewId::ALL.iter().enumerate() {
        let label = format!(" {} {} ", i + 1, view.title());
        let style = if *view == state.ctx.view {
            Style::default().fg(theme::TEXT).bg(theme::BG_ELEVATED).bold()
        } else {
            Style::default().fg(theme::TEXT_MUTED)
        };
        spans.push(Span::raw(" "));
        spans.push(Span::styled(label, style));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)).style(Style::default().bg(theme::BG_BASE)), area);
}

fn render_logged_out(frame: &mut Frame, area: Rect) {
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled("Session expired", Style::default().fg(theme::ERROR).bold())),
        Line::from(Span::styled(
            "The server rejected this session. Sign in again, then restart opsdeck.",
            Style::default().fg(theme::TEXT_SECONDARY),
        )),
        Line::from(""),
        Line::from(Span::styled("Press q to quit", Style::default().fg(theme::TEXT_MUTED))),
    ];
    frame.render_widget(Paragraph::new(lines).alignment(Alignment::Center), area);
}

fn render_body(frame: &mut Frame, state: &mut AppState, area: Rect) {
    if state.ctx.view == ViewId::Chat {
        conversation::render_chat(frame, state, area);
        return;
    }
    let terminal_focus = state.terminal_focus;
    let Some(view) = state.container.current.as_mut() else {
        return;
    };

    match view.view {
        ViewId::Logs => {
            let layout = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(3), Constraint::Min(1)])
                .split(area);
            if let Some(search) = &view.search {
                panels::draw_search(frame, layout[0], search);
            }
            if let Some(panel) = view.panel_mut(RegionId::LogTail) {
                panels::draw_panel(frame, layout[1], panel, true);
            }
        }
        ViewId::Terminal if view.panels.len() > 1 => {
            let layout = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
                .split(area);
            for (panel, rect) in view.panels.iter_mut().zip(layout.iter()) {
                let focused = panel.region == terminal_focus;
                panels::draw_panel(frame, *rect, panel, focused);
            }
        }
        _ => {
            if let Some(panel) = view.panels.first_mut() {
                panels::draw_panel(frame, area, panel, true);
            }
        }
    }
}
