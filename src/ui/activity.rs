use crate::app::{App, FocusedPane};
use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn line_color(line: &str) -> Color {
    // Lines look like "[12:00:00] Label: ..."
    let body = line.split_once("] ").map(|(_, b)| b).unwrap_or(line);
    if body.contains("failed") || body.contains("skipped") {
        Color::Red
    } else if body.starts_with("Commit") || body.starts_with("Mirror") || body.starts_with("Push") {
        Color::Green
    } else if body.starts_with("Deleted") {
        Color::Magenta
    } else if body.starts_with("New") || body.starts_with("Moved") {
        Color::Blue
    } else if body.starts_with("Changed") {
        Color::Yellow
    } else {
        Color::White
    }
}

pub fn render(f: &mut Frame, app: &mut App, area: Rect) {
    let border_color = if app.focused_pane == FocusedPane::Activity {
        Color::Cyan
    } else {
        Color::DarkGray
    };
    let block = Block::default()
        .title(" Activity ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color));

    app.activity_view_height = area.height.saturating_sub(2);

    let entries = app.activity();
    if entries.is_empty() {
        let msg = Paragraph::new(Line::from(Span::styled(
            "  No activity yet",
            Style::default().fg(Color::DarkGray),
        )))
        .block(block);
        f.render_widget(msg, area);
        return;
    }

    let lines: Vec<Line> = entries
        .into_iter()
        .map(|entry| {
            let color = line_color(&entry);
            match entry.split_once("] ") {
                Some((stamp, body)) => Line::from(vec![
                    Span::styled(format!(" {stamp}] "), Style::default().fg(Color::DarkGray)),
                    Span::styled(body.to_string(), Style::default().fg(color)),
                ]),
                None => Line::from(Span::styled(format!(" {entry}"), Style::default().fg(color))),
            }
        })
        .collect();

    let para = Paragraph::new(lines)
        .block(block)
        .scroll((app.activity_scroll, 0));
    f.render_widget(para, area);
}
