pub mod activity;
pub mod file_list;
pub mod layout;
pub mod pending;
pub mod status_bar;

use crate::app::App;
use ratatui::Frame;

pub fn render(frame: &mut Frame, app: &mut App) {
    // One read of the pending set per frame keeps the panes consistent.
    let pending = app.service.pending();
    let rows = pending
        .as_ref()
        .map_or(0, |p| p.changed.len() + p.deleted.len());

    let layout = layout::compute_layout(frame.area(), rows);
    status_bar::render_header(frame, app, layout.header);
    file_list::render(frame, app, pending.as_ref(), layout.file_list);
    pending::render(frame, app, pending.as_ref(), layout.pending);
    activity::render(frame, app, layout.activity);
    status_bar::render_status_bar(frame, app, pending.as_ref(), layout.status_bar);

    if app.show_help {
        status_bar::render_help_overlay(frame, frame.area());
    }
}
