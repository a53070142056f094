use ratatui::{
    prelude::*,
    widgets::{Block, BorderType, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
};
use unicode_width::UnicodeWidthStr;

use super::theme;
use crate::render::container::Panel;
use crate::render::search::SearchBox;

fn panel_block(title: &str, focused: bool) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(if focused { theme::BORDER_FOCUS } else { theme::BORDER }))
        .style(Style::default().bg(theme::BG_SURFACE))
        .title(Span::styled(format!(" {} ", title), Style::default().fg(theme::ACCENT).bold()))
}

/// Draw a panel, fitting its scroll state to the real viewport first.
pub fn draw_panel(frame: &mut Frame, area: Rect, panel: &mut Panel, focused: bool) {
    let block = panel_block(&panel.title, focused);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let height = inner.height as usize;
    panel.scroll.fit(panel.region, panel.lines.len(), inner.height);
    let start = panel.scroll.offset.round() as usize;
    let visible: Vec<Line> = panel.lines.iter().skip(start).take(height).map(|l| (**l).clone()).collect();
    frame.render_widget(Paragraph::new(visible), inner);

    if panel.lines.len() > height {
        let scrollbar = Scrollbar::default()
            .orientation(ScrollbarOrientation::VerticalRight)
            .style(Style::default().fg(theme::BG_ELEVATED))
            .thumb_style(Style::default().fg(theme::ACCENT_DIM));
        let mut scrollbar_state = ScrollbarState::new(panel.scroll.max_scroll as usize).position(start);
        frame.render_stateful_widget(scrollbar, inner, &mut scrollbar_state);
    }
}

pub fn draw_search(frame: &mut Frame, area: Rect, search: &SearchBox) {
    let title = if search.focused { "Search (Esc to leave)" } else { "Search (/)" };
    let block = panel_block(title, search.focused);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let text = Style::default().fg(theme::TEXT);
    let chars: Vec<char> = search.text.chars().collect();
    let (sel_start, sel_end) = search.selection().unwrap_or((search.cursor, search.cursor));
    let piece = |from: usize, to: usize| chars[from.min(chars.len())..to.min(chars.len())].iter().collect::<String>();
    let spans = vec![
        Span::styled(piece(0, sel_start), text),
        Span::styled(piece(sel_start, sel_end), text.bg(theme::ACCENT_DIM)),
        Span::styled(piece(sel_end, chars.len()), text),
    ];
    frame.render_widget(Paragraph::new(Line::from(spans)), inner);

    if search.focused {
        let before = piece(0, search.cursor);
        let x = inner.x + (before.width() as u16).min(inner.width.saturating_sub(1));
        frame.set_cursor_position((x, inner.y));
    }
}
