use ratatui::{
    prelude::*,
    widgets::{Block, BorderType, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap},
};

use super::{input, theme};
use crate::render::RegionId;
use crate::state::AppState;

pub fn render_chat(frame: &mut Frame, state: &mut AppState, area: Rect) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(3)])
        .split(area);

    render_transcript(frame, state, layout[0]);
    input::render_input(frame, state, layout[1]);
}

fn render_transcript(frame: &mut Frame, state: &mut AppState, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme::BORDER))
        .style(Style::default().bg(theme::BG_SURFACE))
        .title(Span::styled(" Assistant ", Style::default().fg(theme::ACCENT).bold()));
    let inner_area = block.inner(area);
    frame.render_widget(block, area);

    let mut text = state.transcript.lines(&state.chat.turns);
    if text.is_empty() {
        text.push(Line::from(""));
        text.push(Line::from(Span::styled(
            "  Ask about tasks, logs or projects. Mention @files to attach them.",
            Style::default().fg(theme::TEXT_MUTED).italic(),
        )));
    }

    // Estimate wrapped height from display width
    let viewport_width = inner_area.width as usize;
    let content_height: usize = text
        .iter()
        .map(|line| {
            let width = line.width();
            if width == 0 || viewport_width == 0 { 1 } else { width.div_ceil(viewport_width) }
        })
        .sum();

    let scroll = &mut state.transcript_scroll;
    scroll.fit(RegionId::Transcript, content_height, inner_area.height);
    let offset = scroll.offset.round() as u16;

    let paragraph = Paragraph::new(text).wrap(Wrap { trim: false }).scroll((offset, 0));
    frame.render_widget(paragraph, inner_area);

    if scroll.max_scroll > 0.0 {
        let scrollbar = Scrollbar::default()
            .orientation(ScrollbarOrientation::VerticalRight)
            .style(Style::default().fg(theme::BG_ELEVATED))
            .thumb_style(Style::default().fg(theme::ACCENT_DIM));
        let mut scrollbar_state = ScrollbarState::new(scroll.max_scroll as usize).position(offset as usize);
        frame.render_stateful_widget(scrollbar, inner_area, &mut scrollbar_state);
    }
}
