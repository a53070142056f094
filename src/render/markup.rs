//! Untrusted text to styled lines.
//!
//! Server text may carry terminal escapes; they are removed before any
//! styling so nothing from the wire reaches the terminal raw.
use std::sync::LazyLock;

use ratatui::prelude::*;
use regex::Regex;

use crate::ui::theme;

static ANSI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b(?:\[[0-?]*[ -/]*[@-~]|\][^\x07\x1b]*(?:\x07|\x1b\\)?|[@-Z\\-_])").expect("invalid escape regex")
});

/// Strip escape sequences and control characters. Tabs become spaces.
pub fn sanitize(text: &str) -> String {
    let stripped = ANSI_RE.replace_all(text, "");
    stripped
        .chars()
        .filter_map(|c| match c {
            '\t' => Some(' '),
            '\n' => Some('\n'),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect()
}

/// Sanitized text rendered as light markdown, one `Line` per source line.
pub fn to_safe_markup(text: &str) -> Vec<Line<'static>> {
    let clean = sanitize(text);
    let mut lines = Vec::new();
    let mut in_code = false;
    for raw in clean.lines() {
        if raw.trim_start().starts_with("```") {
            in_code = !in_code;
            continue;
        }
        if in_code {
            lines.push(Line::from(Span::styled(format!("  {}", raw), Style::default().fg(theme::WARNING))));
        } else {
            lines.push(Line::from(markdown_line(raw)));
        }
    }
    lines
}

fn markdown_line(line: &str) -> Vec<Span<'static>> {
    let trimmed = line.trim_start();
    let indent = line.len() - trimmed.len();

    if trimmed.starts_with('#') {
        let level = trimmed.chars().take_while(|&c| c == '#').count();
        let style = match level {
            1 => Style::default().fg(theme::ACCENT).bold(),
            2 => Style::default().fg(theme::ACCENT),
            _ => Style::default().fg(theme::TEXT_SECONDARY).italic(),
        };
        return vec![Span::styled(trimmed[level..].trim_start().to_string(), style)];
    }

    let bullet = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* "));
    if let Some(rest) = bullet {
        let mut spans = vec![Span::raw(" ".repeat(indent)), Span::styled("• ", Style::default().fg(theme::ACCENT_DIM))];
        spans.extend(inline(rest));
        return spans;
    }

    inline(line)
}

/// Inline code, bold and italic. Unclosed markers are kept literally.
fn inline(text: &str) -> Vec<Span<'static>> {
    let plain = Style::default().fg(theme::TEXT);
    let chars: Vec<char> = text.chars().collect();
    let mut spans = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    let flush = |current: &mut String, spans: &mut Vec<Span<'static>>| {
        if !current.is_empty() {
            spans.push(Span::styled(std::mem::take(current), plain));
        }
    };

    while i < chars.len() {
        let c = chars[i];
        match c {
            '`' => {
                if let Some(end) = (i + 1..chars.len()).find(|&j| chars[j] == '`') {
                    flush(&mut current, &mut spans);
                    let code: String = chars[i + 1..end].iter().collect();
                    spans.push(Span::styled(code, Style::default().fg(theme::WARNING)));
                    i = end + 1;
                    continue;
                }
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                let close = (i + 2..chars.len().saturating_sub(1)).find(|&j| chars[j] == '*' && chars[j + 1] == '*');
                if let Some(end) = close {
                    flush(&mut current, &mut spans);
                    let bold: String = chars[i + 2..end].iter().collect();
                    spans.push(Span::styled(bold, plain.bold()));
                    i = end + 2;
                } else {
                    current.push_str("**");
                    i += 2;
                }
                continue;
            }
            '*' | '_' if opens_emphasis(&chars, i) => {
                if let Some(end) = closing_emphasis(&chars, i + 1, c) {
                    flush(&mut current, &mut spans);
                    let italic: String = chars[i + 1..end].iter().collect();
                    spans.push(Span::styled(italic, plain.italic()));
                    i = end + 1;
                    continue;
                }
            }
            _ => {}
        }
        current.push(c);
        i += 1;
    }
    flush(&mut current, &mut spans);
    if spans.is_empty() {
        spans.push(Span::raw(""));
    }
    spans
}

/// An emphasis marker opens only at a word start and must touch its text.
fn opens_emphasis(chars: &[char], at: usize) -> bool {
    let after_word = at.checked_sub(1).is_some_and(|p| chars[p].is_alphanumeric());
    let touches = chars.get(at + 1).is_some_and(|n| !n.is_whitespace());
    !after_word && touches
}

fn closing_emphasis(chars: &[char], from: usize, marker: char) -> Option<usize> {
    (from + 1..chars.len()).find(|&j| {
        chars[j] == marker
            && !chars[j - 1].is_whitespace()
            && !chars.get(j + 1).is_some_and(|n| n.is_alphanumeric())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn escapes_and_controls_are_removed() {
        let raw = "\x1b[31mred\x1b[0m \x1b]0;title\x07bell\x07\tend";
        assert_eq!(sanitize(raw), "red bell end");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let raw = "a\x1b[1;32mb\x00c\x1b[2Kd";
        let once = sanitize(raw);
        assert_eq!(sanitize(&once), once);
    }

    #[test]
    fn markdown_is_flattened_into_spans() {
        let lines = to_safe_markup("# Plan\n- run **migrations**\n```\nls -la\n```\nuse `cargo` now");
        let texts: Vec<String> = lines.iter().map(text).collect();
        assert_eq!(texts, vec!["Plan", "• run migrations", "  ls -la", "use cargo now"]);
    }

    #[test]
    fn unclosed_markers_stay_literal() {
        let lines = to_safe_markup("2 * 3 and snake_case");
        assert_eq!(text(&lines[0]), "2 * 3 and snake_case");
    }

    #[test]
    fn emphasis_needs_word_boundaries() {
        let lines = to_safe_markup("a_b and c_d");
        assert_eq!(lines[0].spans.len(), 1);
        assert_eq!(text(&lines[0]), "a_b and c_d");

        let lines = to_safe_markup("see _this_ and *that* now");
        let italic: Vec<&str> = lines[0]
            .spans
            .iter()
            .filter(|s| s.style.add_modifier.contains(Modifier::ITALIC))
            .map(|s| s.content.as_ref())
            .collect();
        assert_eq!(italic, vec!["this", "that"]);
        assert_eq!(text(&lines[0]), "see this and that now");
    }
}
