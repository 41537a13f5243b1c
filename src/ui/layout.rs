use ratatui::layout::{Constraint, Layout, Rect};

/// Rows the pending pane grows to before it starts clipping.
const MAX_PENDING_ROWS: u16 = 8;

pub struct AppLayout {
    pub header: Rect,
    pub file_list: Rect,
    pub pending: Rect,
    pub activity: Rect,
    pub status_bar: Rect,
}

/// Watched files and the pending batch share the left column; the pending
/// pane is sized to its contents.
pub fn compute_layout(area: Rect, pending_rows: usize) -> AppLayout {
    let [header, body, status_bar] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(3),
        Constraint::Length(1),
    ])
    .areas(area);

    let [left, activity] =
        Layout::horizontal([Constraint::Percentage(35), Constraint::Min(20)]).areas(body);

    let rows = (pending_rows.min(MAX_PENDING_ROWS as usize) as u16).max(1);
    let [file_list, pending] =
        Layout::vertical([Constraint::Min(3), Constraint::Length(rows + 2)]).areas(left);

    AppLayout {
        header,
        file_list,
        pending,
        activity,
        status_bar,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_pane_tracks_batch_size() {
        let area = Rect::new(0, 0, 100, 30);

        let idle = compute_layout(area, 0);
        assert_eq!(idle.pending.height, 3);
        assert_eq!(idle.header.height, 1);
        assert_eq!(idle.status_bar.y, 29);

        let busy = compute_layout(area, 50);
        assert_eq!(busy.pending.height, MAX_PENDING_ROWS + 2);
        assert_eq!(busy.file_list.height + busy.pending.height, busy.activity.height);
        assert_eq!(busy.file_list.x, busy.pending.x);
    }
}
