use crate::app::App;
use autosync::PendingChangeSet;
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

pub fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let config = app.service.config();
    let (state_label, state_bg) = if app.service.running() {
        (" watching ", Color::Green)
    } else {
        (" stopped ", Color::Red)
    };

    let mut spans = vec![
        Span::styled(
            " autosync ",
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(
            format!(" {} ", config.display_name()),
            Style::default().fg(Color::Black).bg(Color::Magenta),
        ),
        Span::raw(" "),
        Span::styled(
            format!(" {} ", config.branch),
            Style::default().fg(Color::Black).bg(Color::Yellow),
        ),
        Span::raw(" "),
        Span::styled(
            state_label,
            Style::default()
                .fg(Color::Black)
                .bg(state_bg)
                .add_modifier(Modifier::BOLD),
        ),
    ];

    let flags = format!(
        "  commit:{} push:{} batch:{}s",
        if config.auto_commit { "on" } else { "off" },
        if config.auto_push { "on" } else { "off" },
        config.batch_window_sec
    );
    spans.push(Span::styled(flags, Style::default().fg(Color::DarkGray)));
    spans.push(Span::raw("  "));
    spans.push(Span::styled("? help", Style::default().fg(Color::DarkGray)));

    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

pub fn render_status_bar(
    f: &mut Frame,
    app: &App,
    pending: Option<&PendingChangeSet>,
    area: Rect,
) {
    let status = if let Some(ref msg) = app.status_message {
        Line::from(Span::styled(
            format!(" {msg}"),
            Style::default().fg(Color::Yellow),
        ))
    } else if let Some(pending) = pending {
        if pending.is_empty() {
            Line::from(Span::styled(
                " Nothing pending",
                Style::default().fg(Color::Green),
            ))
        } else {
            Line::from(vec![
                Span::styled(" pending ", Style::default().fg(Color::White)),
                Span::styled(
                    format!("~{}", pending.changed.len()),
                    Style::default().fg(Color::Yellow),
                ),
                Span::raw(" "),
                Span::styled(
                    format!("-{}", pending.deleted.len()),
                    Style::default().fg(Color::Red),
                ),
            ])
        }
    } else {
        Line::from(Span::styled(
            " Press s to start watching",
            Style::default().fg(Color::DarkGray),
        ))
    };

    f.render_widget(Paragraph::new(status), area);
}

pub fn render_help_overlay(f: &mut Frame, area: Rect) {
    use ratatui::widgets::{Block, Borders, Clear};

    let help_width = 46u16.min(area.width.saturating_sub(4));
    let help_height = 15u16.min(area.height.saturating_sub(4));
    let x = (area.width.saturating_sub(help_width)) / 2;
    let y = (area.height.saturating_sub(help_height)) / 2;
    let help_area = Rect::new(x, y, help_width, help_height);

    f.render_widget(Clear, help_area);

    let keybindings = vec![
        ("s", "Start / stop watching"),
        ("f", "Flush pending changes now"),
        ("p / r", "Refresh watched files"),
        ("y", "Copy raw urls"),
        ("j / ↓", "Next item / Scroll down"),
        ("k / ↑", "Prev item / Scroll up"),
        ("Ctrl+d", "Half page down"),
        ("Ctrl+u", "Half page up"),
        ("g / G", "Top / Bottom"),
        ("Tab", "Switch pane"),
        ("?", "Toggle help"),
        ("q", "Stop and quit"),
    ];

    let lines: Vec<Line> = keybindings
        .into_iter()
        .map(|(key, desc)| {
            Line::from(vec![
                Span::styled(
                    format!("  {key:<10}"),
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::raw(desc),
            ])
        })
        .collect();

    let block = Block::default()
        .title(" Keybindings ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    f.render_widget(Paragraph::new(lines).block(block), help_area);
}
