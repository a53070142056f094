use ratatui::{
    prelude::*,
    widgets::{Block, BorderType, Borders, Paragraph},
};
use unicode_width::UnicodeWidthStr;

use super::{helpers::truncate_string, theme};
use crate::state::AppState;
use crate::sync::LinkStatus;

pub fn render_input(frame: &mut Frame, state: &AppState, area: Rect) {
    let waiting = state.chat.is_open();
    let title = if waiting { " Waiting for reply... " } else { " Message " };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(if waiting { theme::BORDER } else { theme::BORDER_FOCUS }))
        .style(Style::default().bg(theme::BG_INPUT))
        .title(Span::styled(title, Style::default().fg(theme::ACCENT).bold()));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    // Keep the cursor visible by scrolling long input horizontally
    let before_cursor = state.input.get(..state.input_cursor).unwrap_or(state.input.as_str());
    let cursor_col = before_cursor.width() as u16;
    let h_scroll = cursor_col.saturating_sub(inner.width.saturating_sub(1));

    let paragraph =
        Paragraph::new(state.input.as_str()).style(Style::default().fg(theme::TEXT)).scroll((0, h_scroll));
    frame.render_widget(paragraph, inner);

    if inner.width > 0 {
        frame.set_cursor_position((inner.x + cursor_col - h_scroll, inner.y));
    }
}

fn link_badge(link: LinkStatus) -> (String, Color) {
    match link {
        LinkStatus::Connecting => (" CONNECTING ".into(), theme::TEXT_MUTED),
        LinkStatus::Live => (" LIVE ".into(), theme::SUCCESS),
        LinkStatus::Reconnecting(n) => (format!(" RECONNECTING ({}) ", n), theme::WARNING),
        LinkStatus::Lost(_) => (" CONNECTION LOST ".into(), theme::ERROR),
        LinkStatus::LoggedOut => (" LOGGED OUT ".into(), theme::ERROR),
    }
}

pub fn render_status_bar(frame: &mut Frame, state: &AppState, area: Rect) {
    let base_style = Style::default().bg(theme::BG_BASE).fg(theme::TEXT_MUTED);

    let mut spans = vec![Span::styled(" ", base_style)];

    let (label, color) = link_badge(state.link);
    spans.push(Span::styled(label, Style::default().fg(theme::BG_BASE).bg(color).bold()));
    spans.push(Span::styled(" ", base_style));

    if let Some(interval) = state.polling {
        spans.push(Span::styled(
            format!(" poll {}s ", (interval as f64 / 1000.0).round().max(1.0)),
            Style::default().fg(theme::TEXT).bg(theme::BG_ELEVATED),
        ));
        spans.push(Span::styled(" ", base_style));
    }

    if state.chat.is_open() {
        spans.push(Span::styled(" STREAMING ", Style::default().fg(theme::BG_BASE).bg(theme::ACCENT).bold()));
        spans.push(Span::styled(" ", base_style));
    }

    if let Some(snapshot) = state.snapshot() {
        let active = snapshot.tasks.iter().filter(|t| t.is_active()).count();
        if active > 0 {
            spans.push(Span::styled(
                format!(" {} active ", active),
                Style::default().fg(theme::BG_BASE).bg(theme::ACCENT_DIM).bold(),
            ));
            spans.push(Span::styled(" ", base_style));
        }
    }

    if let Some(notice) = &state.notice {
        spans.push(Span::styled(format!(" {} ", notice.text), Style::default().fg(theme::WARNING).bg(theme::BG_ELEVATED)));
        spans.push(Span::styled(" ", base_style));
    }

    // Right side info
    let right_info = format!("{} ", truncate_string(&state.server_url, 40));
    let left_width: usize = spans.iter().map(|s| s.content.width()).sum();
    let right_width = right_info.width();
    let padding = (area.width as usize).saturating_sub(left_width + right_width);

    spans.push(Span::styled(" ".repeat(padding), base_style));
    spans.push(Span::styled(right_info, base_style));

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
