use chrono::Local;
use parking_lot::Mutex;
use std::collections::VecDeque;

pub const DEFAULT_CAPACITY: usize = 2000;

/// Bounded, timestamped status lines for the dashboard.
///
/// Appends come from the watcher and timer threads; reads come from the UI.
#[derive(Debug)]
pub struct ActivityLog {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY))),
            capacity,
        }
    }

    pub fn append(&self, line: impl AsRef<str>) {
        let line = line.as_ref();
        tracing::info!(target: "autosync::activity", "{line}");
        if self.capacity == 0 {
            return;
        }
        let stamped = format!("[{}] {line}", Local::now().format("%H:%M:%S"));
        let mut lines = self.lines.lock();
        if lines.len() == self.capacity {
            lines.pop_back();
        }
        lines.push_front(stamped);
    }

    /// Up to `limit` lines, most recent first.
    pub fn snapshot(&self, limit: usize) -> Vec<String> {
        self.lines.lock().iter().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}
