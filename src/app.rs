use autosync::WatchService;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Lines of activity kept on screen.
pub const ACTIVITY_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusedPane {
    Files,
    Activity,
}

pub struct App {
    pub should_quit: bool,
    pub service: WatchService,
    pub files: Vec<String>,
    pub selected_file_idx: usize,
    pub focused_pane: FocusedPane,
    pub activity_scroll: u16,
    pub activity_view_height: u16,
    pub show_help: bool,
    pub status_message: Option<String>,
}

impl App {
    pub fn new(service: WatchService) -> Self {
        let mut app = Self {
            should_quit: false,
            service,
            files: Vec::new(),
            selected_file_idx: 0,
            focused_pane: FocusedPane::Activity,
            activity_scroll: 0,
            activity_view_height: 0,
            show_help: false,
            status_message: None,
        };
        app.refresh_preview();
        app
    }

    pub fn activity(&self) -> Vec<String> {
        self.service.log().snapshot(ACTIVITY_LIMIT)
    }

    pub fn refresh_preview(&mut self) {
        match self.service.preview() {
            Ok(files) => {
                self.files = files;
                if self.selected_file_idx >= self.files.len() {
                    self.selected_file_idx = self.files.len().saturating_sub(1);
                }
            }
            Err(e) => {
                self.files.clear();
                self.selected_file_idx = 0;
                self.status_message = Some(format!("Preview failed: {e:#}"));
            }
        }
    }

    pub fn start(&mut self) {
        match self.service.start() {
            Ok(()) => self.status_message = None,
            Err(e) => {
                let msg = format!("Start failed: {e:#}");
                self.service.log().append(&msg);
                self.status_message = Some(msg);
            }
        }
    }

    pub fn toggle_watch(&mut self) {
        if self.service.running() {
            self.service.stop();
            self.status_message = None;
        } else {
            self.start();
            self.refresh_preview();
        }
    }

    fn flush_now(&mut self) {
        if !self.service.running() {
            self.status_message = Some("Watcher is not running".to_string());
            return;
        }
        self.status_message = match self.service.flush_now() {
            Some(report) if report.updated + report.removed == 0 => {
                Some("Nothing pending".to_string())
            }
            Some(report) => Some(format!(
                "Flushed {} updated, {} removed",
                report.updated, report.removed
            )),
            None => Some("Flush failed, see activity".to_string()),
        };
    }

    fn copy_raw_urls(&mut self) {
        let urls = match self.service.raw_urls() {
            Ok(urls) => urls,
            Err(e) => {
                self.status_message = Some(format!("Raw urls failed: {e:#}"));
                return;
            }
        };
        if urls.is_empty() {
            self.status_message = Some("No raw urls (GitHub remote required)".to_string());
            return;
        }
        let copied = arboard::Clipboard::new().and_then(|mut c| c.set_text(urls.join("\n")));
        self.status_message = Some(match copied {
            Ok(()) => format!("Copied {} raw urls", urls.len()),
            Err(e) => format!("Clipboard error: {e}"),
        });
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if self.show_help {
            self.show_help = false;
            return;
        }

        match key.code {
            KeyCode::Char('q') => {
                self.service.stop();
                self.should_quit = true;
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.service.stop();
                self.should_quit = true;
            }
            KeyCode::Char('?') => self.show_help = true,
            KeyCode::Char('s') => self.toggle_watch(),
            KeyCode::Char('f') => self.flush_now(),
            KeyCode::Char('p') | KeyCode::Char('r') => {
                self.status_message = None;
                self.refresh_preview();
            }
            KeyCode::Char('y') => self.copy_raw_urls(),
            KeyCode::Tab | KeyCode::BackTab => {
                self.focused_pane = match self.focused_pane {
                    FocusedPane::Files => FocusedPane::Activity,
                    FocusedPane::Activity => FocusedPane::Files,
                };
            }
            _ => match self.focused_pane {
                FocusedPane::Files => self.handle_files_key(key),
                FocusedPane::Activity => self.handle_activity_key(key),
            },
        }
    }

    fn handle_files_key(&mut self, key: KeyEvent) {
        if self.files.is_empty() {
            return;
        }
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => {
                if self.selected_file_idx + 1 < self.files.len() {
                    self.selected_file_idx += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.selected_file_idx = self.selected_file_idx.saturating_sub(1);
            }
            KeyCode::Char('g') => self.selected_file_idx = 0,
            KeyCode::Char('G') => self.selected_file_idx = self.files.len() - 1,
            _ => {}
        }
    }

    fn handle_activity_key(&mut self, key: KeyEvent) {
        let total = self.service.log().len().min(ACTIVITY_LIMIT) as u16;
        let max_scroll = total.saturating_sub(self.activity_view_height);
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => {
                self.activity_scroll = (self.activity_scroll + 1).min(max_scroll);
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.activity_scroll = self.activity_scroll.saturating_sub(1);
            }
            KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                let half = self.activity_view_height / 2;
                self.activity_scroll = (self.activity_scroll + half).min(max_scroll);
            }
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                let half = self.activity_view_height / 2;
                self.activity_scroll = self.activity_scroll.saturating_sub(half);
            }
            KeyCode::Char('g') => self.activity_scroll = 0,
            KeyCode::Char('G') => self.activity_scroll = max_scroll,
            _ => {}
        }
    }
}
