use crate::app::App;
use autosync::PendingChangeSet;
use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};
use std::path::Path;

pub fn render(f: &mut Frame, app: &App, pending: Option<&PendingChangeSet>, area: Rect) {
    let total = pending.map_or(0, |p| p.changed.len() + p.deleted.len());
    let block = Block::default()
        .title(format!(" Next batch ({total}) "))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let Some(pending) = pending.filter(|p| !p.is_empty()) else {
        let idle = if app.service.running() {
            "  Nothing pending"
        } else {
            "  Not watching"
        };
        let msg = Paragraph::new(Line::from(Span::styled(
            idle,
            Style::default().fg(Color::DarkGray),
        )))
        .block(block);
        f.render_widget(msg, area);
        return;
    };

    let root = app.service.config().root();
    let root = root.canonicalize().unwrap_or(root);
    let rel = |path: &Path| {
        path.strip_prefix(&root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    };

    let lines: Vec<Line> = pending
        .changed
        .iter()
        .map(|p| (p, "~", Color::Yellow))
        .chain(pending.deleted.iter().map(|p| (p, "-", Color::Red)))
        .map(|(path, mark, color)| {
            Line::from(vec![
                Span::styled(format!(" {mark} "), Style::default().fg(color)),
                Span::raw(rel(path)),
            ])
        })
        .collect();

    f.render_widget(Paragraph::new(lines).block(block), area);
}
