use crate::activity::ActivityLog;
use crate::config::WatchConfig;
use crate::filter::PathFilter;
use crate::git::raw_url;
use crate::handler::{FlushReport, FsEvent, PendingChangeSet, WatchHandler};
use anyhow::{bail, Context, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};
use walkdir::WalkDir;

const STOP_TIMEOUT: Duration = Duration::from_secs(3);

struct Session {
    watcher: RecommendedWatcher,
    handler: Arc<WatchHandler>,
    dispatch: JoinHandle<()>,
    done: Receiver<()>,
}

/// Start/stop control for watching one project.
///
/// Meant to be driven from a single control thread; the work itself happens
/// on the notify, dispatch and timer threads.
pub struct WatchService {
    config: WatchConfig,
    log: Arc<ActivityLog>,
    session: Option<Session>,
}

impl WatchService {
    pub fn new(config: WatchConfig, log: Arc<ActivityLog>) -> Self {
        Self {
            config,
            log,
            session: None,
        }
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Replace the settings used by the next session.
    pub fn set_config(&mut self, config: WatchConfig) -> Result<()> {
        if self.running() {
            bail!("Stop the watcher before changing its settings");
        }
        self.config = config;
        Ok(())
    }

    pub fn log(&self) -> &Arc<ActivityLog> {
        &self.log
    }

    pub fn running(&self) -> bool {
        self.session.is_some()
    }

    /// Begin watching. Does nothing when already running.
    pub fn start(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }
        let handler = WatchHandler::new(&self.config, Arc::clone(&self.log))?;

        let (tx, rx) = mpsc::channel::<notify::Result<notify::Event>>();
        let watcher = notify::recommended_watcher(tx).and_then(|mut w| {
            w.watch(handler.root(), RecursiveMode::Recursive)?;
            Ok(w)
        });
        let watcher = match watcher {
            Ok(w) => w,
            Err(e) => {
                handler.shutdown();
                return Err(e).context("Failed to watch project directory");
            }
        };

        let (done_tx, done) = mpsc::channel();
        let events = Arc::clone(&handler);
        let dispatch = thread::Builder::new()
            .name("autosync-watch".to_string())
            .spawn(move || {
                for result in rx {
                    match result {
                        Ok(event) => {
                            for ev in FsEvent::from_notify(&event) {
                                events.handle(ev);
                            }
                        }
                        Err(e) => warn!(error = %e, "watch error"),
                    }
                }
                let _ = done_tx.send(());
            });
        let dispatch = match dispatch {
            Ok(d) => d,
            Err(e) => {
                handler.shutdown();
                return Err(e).context("Failed to spawn watch thread");
            }
        };

        if self.config.mirror_on_start {
            let mirror = Arc::clone(&handler);
            thread::spawn(move || {
                mirror.mirror_on_start();
            });
        }

        self.log
            .append(format!("Watcher started: {}", handler.root().display()));
        self.session = Some(Session {
            watcher,
            handler,
            dispatch,
            done,
        });
        Ok(())
    }

    /// Stop watching and drop unflushed changes. Does nothing when stopped.
    pub fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        session.handler.shutdown();
        // Dropping the watcher closes the event channel and ends dispatch.
        drop(session.watcher);
        match session.done.recv_timeout(STOP_TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = session.dispatch.join();
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("watch thread did not stop in time");
            }
        }
        self.log.append("Watcher stopped");
    }

    /// Eligible files under the configured root.
    pub fn preview(&self) -> Result<Vec<String>> {
        preview(&self.config)
    }

    /// Raw download links for the eligible files (GitHub remotes only).
    pub fn raw_urls(&self) -> Result<Vec<String>> {
        raw_urls(&self.config)
    }

    pub fn pending(&self) -> Option<PendingChangeSet> {
        self.session.as_ref().map(|s| s.handler.pending())
    }

    /// Flush whatever is pending right away instead of waiting for the timer.
    pub fn flush_now(&self) -> Option<FlushReport> {
        self.session.as_ref().and_then(|s| s.handler.flush_and_log())
    }
}

impl Drop for WatchService {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Read-only scan of the root, relative `/`-separated paths, sorted.
pub fn preview(config: &WatchConfig) -> Result<Vec<String>> {
    config.validate()?;
    let root = config
        .root()
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", config.project_path.display()))?;
    let filter = PathFilter::new(&root, config)?;

    let walker = WalkDir::new(&root)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_type().is_dir() || filter.in_scope(e.path()));

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() || !filter.eligible(entry.path()) {
            continue;
        }
        if let Some(rel) = filter.relative(entry.path()) {
            files.push(rel.to_string_lossy().replace('\\', "/"));
        }
    }
    files.sort();
    Ok(files)
}

/// Raw download links for the files `preview` lists. Empty without a
/// GitHub remote.
pub fn raw_urls(config: &WatchConfig) -> Result<Vec<String>> {
    let Some(remote) = config.remote() else {
        return Ok(Vec::new());
    };
    Ok(raw_url::raw_urls(
        remote,
        config.branch_or_default(),
        &preview(config)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config_for(dir: &TempDir) -> WatchConfig {
        WatchConfig {
            project_path: dir.path().to_path_buf(),
            auto_push: false,
            mirror_on_start: false,
            ..WatchConfig::default()
        }
    }

    #[test]
    fn preview_applies_defaults() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("node_modules")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("src/a.py"), "a").unwrap();
        fs::write(root.join("node_modules/b.js"), "b").unwrap();
        fs::write(root.join(".git/HEAD"), "ref: refs/heads/main").unwrap();

        assert_eq!(preview(&config_for(&dir)).unwrap(), vec!["src/a.py"]);
    }

    #[test]
    fn preview_does_not_touch_the_tree() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.md"), "a").unwrap();
        let service = WatchService::new(config_for(&dir), Arc::new(ActivityLog::default()));
        assert_eq!(service.preview().unwrap(), vec!["a.md"]);
        assert!(!dir.path().join(".git").exists());
        assert!(service.pending().is_none());
    }

    #[test]
    fn raw_urls_follow_preview() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.md"), "a").unwrap();
        let mut cfg = config_for(&dir);
        cfg.remote_url = "https://github.com/me/notes.git".into();
        let service = WatchService::new(cfg, Arc::new(ActivityLog::default()));
        assert_eq!(
            service.raw_urls().unwrap(),
            vec!["https://raw.githubusercontent.com/me/notes/main/a.md"]
        );
    }

    #[test]
    fn raw_urls_default_to_main_branch() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.md"), "a").unwrap();
        let mut cfg = config_for(&dir);
        cfg.remote_url = "git@github.com:me/notes.git".into();
        cfg.branch = "  ".into();
        assert_eq!(
            raw_urls(&cfg).unwrap(),
            vec!["https://raw.githubusercontent.com/me/notes/main/a.md"]
        );
    }

    #[test]
    fn start_failure_leaves_service_stopped() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config_for(&dir);
        cfg.project_path = dir.path().join("missing");
        let mut service = WatchService::new(cfg, Arc::new(ActivityLog::default()));
        assert!(service.start().is_err());
        assert!(!service.running());
    }

    #[test]
    fn start_stop_are_idempotent() {
        let dir = TempDir::new().unwrap();
        let log = Arc::new(ActivityLog::default());
        let mut service = WatchService::new(config_for(&dir), Arc::clone(&log));

        service.stop();
        assert!(!service.running());

        service.start().unwrap();
        service.start().unwrap();
        assert!(service.running());
        assert!(service.set_config(config_for(&dir)).is_err());

        service.stop();
        assert!(!service.running());
        service.stop();
        assert!(!service.running());

        let lines = log.snapshot(10);
        assert_eq!(lines.iter().filter(|l| l.contains("Watcher started")).count(), 1);
        assert_eq!(lines.iter().filter(|l| l.contains("Watcher stopped")).count(), 1);
    }
}
