use crate::app::{App, FocusedPane};
use autosync::PendingChangeSet;
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState},
    Frame,
};

pub fn render(f: &mut Frame, app: &App, pending: Option<&PendingChangeSet>, area: Rect) {
    let border_color = if app.focused_pane == FocusedPane::Files {
        Color::Cyan
    } else {
        Color::DarkGray
    };

    let block = Block::default()
        .title(format!(" Watched ({}) ", app.files.len()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color));

    if app.files.is_empty() {
        let items: Vec<ListItem> = vec![ListItem::new(Line::from(Span::styled(
            "  No eligible files",
            Style::default().fg(Color::DarkGray),
        )))];
        let list = List::new(items).block(block);
        f.render_widget(list, area);
        return;
    }

    let root = app.service.config().root();
    let root = root.canonicalize().unwrap_or(root);

    let items: Vec<ListItem> = app
        .files
        .iter()
        .map(|path| {
            let is_pending = pending.is_some_and(|p| p.changed.contains(&root.join(path)));
            let (marker, color) = if is_pending {
                ("● ", Color::Yellow)
            } else {
                ("  ", Color::DarkGray)
            };
            let (dir, name) = match path.rsplit_once('/') {
                Some((dir, name)) => (format!("{dir}/"), name),
                None => (String::new(), path.as_str()),
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!(" {marker}"), Style::default().fg(color)),
                Span::styled(dir, Style::default().fg(Color::DarkGray)),
                Span::raw(name),
            ]))
        })
        .collect();

    let list = List::new(items).block(block).highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    );

    let mut state = ListState::default();
    if app.focused_pane == FocusedPane::Files {
        state.select(Some(app.selected_file_idx));
    }
    f.render_stateful_widget(list, area, &mut state);
}
