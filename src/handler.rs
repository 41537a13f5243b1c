use crate::activity::ActivityLog;
use crate::backup::BackupRotator;
use crate::config::WatchConfig;
use crate::digest::{fingerprint, DigestCache};
use crate::filter::{is_tilde_backup, PathFilter};
use crate::git::{MirrorOutcome, PushOutcome, SyncRepo, REMOTE_NAME};
use crate::scheduler::BatchTimer;
use anyhow::{Context, Result};
use chrono::Local;
use git2::Oid;
use notify::event::{ModifyKind, RenameMode};
use notify::EventKind;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Filesystem notification, decoupled from `notify`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    Modified(PathBuf),
    Created(PathBuf),
    Deleted(PathBuf),
    Moved { from: PathBuf, to: PathBuf },
}

impl FsEvent {
    pub fn from_notify(event: &notify::Event) -> Vec<FsEvent> {
        let paths = &event.paths;
        match &event.kind {
            EventKind::Create(_) => paths.iter().cloned().map(FsEvent::Created).collect(),
            EventKind::Remove(_) => paths.iter().cloned().map(FsEvent::Deleted).collect(),
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() >= 2 => {
                vec![FsEvent::Moved {
                    from: paths[0].clone(),
                    to: paths[1].clone(),
                }]
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                paths.iter().cloned().map(FsEvent::Deleted).collect()
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                paths.iter().cloned().map(FsEvent::Created).collect()
            }
            // Platforms that cannot pair renames report one side at a time.
            EventKind::Modify(ModifyKind::Name(_)) => paths
                .iter()
                .map(|p| {
                    if p.exists() {
                        FsEvent::Created(p.clone())
                    } else {
                        FsEvent::Deleted(p.clone())
                    }
                })
                .collect(),
            EventKind::Modify(_) => paths.iter().cloned().map(FsEvent::Modified).collect(),
            _ => Vec::new(),
        }
    }
}

/// Paths waiting for the next flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingChangeSet {
    pub changed: BTreeSet<PathBuf>,
    pub deleted: BTreeSet<PathBuf>,
}

impl PendingChangeSet {
    /// Delete-then-recreate (atomic saves) collapses into a change.
    pub fn reconcile(&mut self) {
        let changed = &self.changed;
        self.deleted.retain(|p| !changed.contains(p));
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.deleted.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub updated: usize,
    pub removed: usize,
    pub commit: Option<Oid>,
    pub push: Option<PushOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeKind {
    Modified,
    Created,
}

struct SessionState {
    pending: PendingChangeSet,
    last_event: HashMap<PathBuf, Instant>,
    digests: DigestCache,
    timer: Option<BatchTimer>,
}

impl SessionState {
    /// Records `now` for `path` and reports whether it falls inside the
    /// debounce window of the previous notification.
    fn debounced(&mut self, path: &Path, now: Instant, window: Duration) -> bool {
        let previous = self.last_event.insert(path.to_path_buf(), now);
        matches!(previous, Some(last) if now.saturating_duration_since(last) < window)
    }

    fn arm(&self) {
        if let Some(timer) = &self.timer {
            timer.arm();
        }
    }
}

/// One watch session: turns raw notifications into batched commits.
pub struct WatchHandler {
    config: WatchConfig,
    root: PathBuf,
    project: String,
    filter: PathFilter,
    backups: BackupRotator,
    log: Arc<ActivityLog>,
    state: Mutex<SessionState>,
    repo: Mutex<SyncRepo>,
    active: AtomicBool,
}

impl WatchHandler {
    /// Acquire the repository, select branch and remote, and arm nothing yet.
    pub fn new(config: &WatchConfig, log: Arc<ActivityLog>) -> Result<Arc<Self>> {
        config.validate()?;
        let root = config
            .root()
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", config.project_path.display()))?;

        let repo = SyncRepo::open_or_init(&root)?;
        repo.ensure_branch(&config.branch)?;
        repo.ensure_remote(config.remote())?;

        let backups = BackupRotator::new(&root, config.max_backups);
        fs::create_dir_all(backups.backup_root())
            .with_context(|| format!("Failed to create {}", backups.backup_root().display()))?;
        let filter = PathFilter::new(&root, config)?;

        let handler = Arc::new(Self {
            config: config.clone(),
            project: config.display_name(),
            root,
            filter,
            backups,
            log,
            state: Mutex::new(SessionState {
                pending: PendingChangeSet::default(),
                last_event: HashMap::new(),
                digests: DigestCache::new(),
                timer: None,
            }),
            repo: Mutex::new(repo),
            active: AtomicBool::new(true),
        });

        let weak: Weak<WatchHandler> = Arc::downgrade(&handler);
        let timer = BatchTimer::spawn(config.batch_window(), move || {
            if let Some(handler) = weak.upgrade() {
                handler.on_timer();
            }
        })?;
        handler.state.lock().timer = Some(timer);
        Ok(handler)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn filter(&self) -> &PathFilter {
        &self.filter
    }

    pub fn backups(&self) -> &BackupRotator {
        &self.backups
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn pending(&self) -> PendingChangeSet {
        self.state.lock().pending.clone()
    }

    pub fn handle(&self, event: FsEvent) {
        self.handle_at(event, Instant::now());
    }

    pub fn handle_at(&self, event: FsEvent, now: Instant) {
        if !self.is_active() {
            return;
        }
        match event {
            FsEvent::Modified(path) => self.on_change(&path, now, ChangeKind::Modified),
            FsEvent::Created(path) => self.on_change(&path, now, ChangeKind::Created),
            FsEvent::Deleted(path) => self.on_deleted(&path),
            FsEvent::Moved { from, to } => self.on_moved(&from, &to),
        }
    }

    /// Canonical spelling under the root so set membership is exact.
    fn normalize(&self, path: &Path) -> Option<PathBuf> {
        self.filter.relative(path).map(|rel| self.root.join(rel))
    }

    fn display(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rel) => format!("{}/{}", self.project, rel.to_string_lossy().replace('\\', "/")),
            Err(_) => path.display().to_string(),
        }
    }

    fn on_change(&self, path: &Path, now: Instant, kind: ChangeKind) {
        if path.is_dir() || !self.filter.eligible(path) {
            return;
        }
        let Some(path) = self.normalize(path) else {
            return;
        };
        if self
            .state
            .lock()
            .debounced(&path, now, self.config.debounce())
        {
            debug!(path = %path.display(), "debounced");
            return;
        }

        let digest = fingerprint(&path);
        {
            let mut state = self.state.lock();
            let material = state.digests.update(&path, digest);
            if kind == ChangeKind::Modified && !material {
                debug!(path = %path.display(), "content unchanged");
                return;
            }
            state.pending.changed.insert(path.clone());
            state.arm();
        }

        let label = match kind {
            ChangeKind::Modified => "Changed",
            ChangeKind::Created => "New",
        };
        self.log.append(format!("{label}: {}", self.display(&path)));
        self.snapshot(&path);
    }

    fn on_deleted(&self, path: &Path) {
        let tilde = path
            .file_name()
            .is_some_and(|n| is_tilde_backup(&n.to_string_lossy()));
        if tilde || !self.filter.in_scope(path) {
            return;
        }
        let Some(path) = self.normalize(path) else {
            return;
        };
        {
            let mut state = self.state.lock();
            state.digests.forget(&path);
            state.pending.deleted.insert(path.clone());
            state.arm();
        }
        self.log.append(format!("Deleted: {}", self.display(&path)));
    }

    fn on_moved(&self, from: &Path, to: &Path) {
        if to.is_dir() && self.filter.in_scope(to) {
            self.on_dir_moved(from, to);
            return;
        }

        if self.filter.eligible(to) {
            let Some(dest) = self.normalize(to) else {
                return;
            };
            let source = self.normalize(from).filter(|src| {
                src != &dest && self.filter.in_scope(from) && !from.exists()
            });
            let digest = fingerprint(&dest);
            {
                let mut state = self.state.lock();
                state.digests.update(&dest, digest);
                state.pending.changed.insert(dest.clone());
                if let Some(src) = &source {
                    state.digests.forget(src);
                    state.pending.deleted.insert(src.clone());
                }
                state.arm();
            }
            self.log.append(format!(
                "Moved: {} -> {}",
                self.display(&self.normalize(from).unwrap_or_else(|| from.to_path_buf())),
                self.display(&dest)
            ));
            self.snapshot(&dest);
            return;
        }

        let src_in = self.filter.in_scope(from);
        if !src_in && !self.filter.in_scope(to) {
            return;
        }
        if src_in {
            self.on_deleted_unchecked(from);
        } else {
            self.state.lock().arm();
        }
    }

    /// Source side of a move, without the tilde rule.
    fn on_deleted_unchecked(&self, path: &Path) {
        let Some(path) = self.normalize(path) else {
            return;
        };
        {
            let mut state = self.state.lock();
            state.digests.forget(&path);
            state.pending.deleted.insert(path.clone());
            state.arm();
        }
        self.log.append(format!("Deleted: {}", self.display(&path)));
    }

    /// Renamed directories only report the directory itself.
    fn on_dir_moved(&self, from: &Path, to: &Path) {
        let files: Vec<PathBuf> = WalkDir::new(to)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && self.filter.eligible(e.path()))
            .filter_map(|e| self.normalize(e.path()))
            .collect();
        let source = self
            .filter
            .in_scope(from)
            .then(|| self.normalize(from))
            .flatten();
        {
            let mut state = self.state.lock();
            for file in &files {
                state.pending.changed.insert(file.clone());
            }
            if let Some(src) = &source {
                state.pending.deleted.insert(src.clone());
            }
            state.arm();
        }
        self.log.append(format!(
            "Moved: {} -> {} ({} files)",
            self.display(&self.normalize(from).unwrap_or_else(|| from.to_path_buf())),
            self.display(&self.normalize(to).unwrap_or_else(|| to.to_path_buf())),
            files.len()
        ));
    }

    fn snapshot(&self, path: &Path) {
        if let Err(e) = self.backups.rotate(path) {
            warn!(path = %path.display(), error = %format!("{e:#}"), "backup skipped");
            self.log
                .append(format!("Backup skipped: {}: {e:#}", self.display(path)));
        }
    }

    fn on_timer(&self) {
        if !self.is_active() {
            debug!("timer fired after shutdown");
            return;
        }
        self.flush_and_log();
    }

    /// Flush, recording any failure in the activity log.
    pub fn flush_and_log(&self) -> Option<FlushReport> {
        match self.flush() {
            Ok(report) => Some(report),
            Err(e) => {
                self.log.append(format!("Batch failed: {e:#}"));
                None
            }
        }
    }

    /// Drain pending paths and hand them to git.
    ///
    /// Push failures are returned; the next flush is the retry.
    pub fn flush(&self) -> Result<FlushReport> {
        let batch = {
            let mut state = self.state.lock();
            let mut batch = std::mem::take(&mut state.pending);
            batch.reconcile();
            batch
        };
        let mut report = FlushReport {
            updated: batch.changed.len(),
            removed: batch.deleted.len(),
            commit: None,
            push: None,
        };
        if batch.is_empty() {
            return Ok(report);
        }

        let changed: Vec<PathBuf> = batch.changed.into_iter().collect();
        let deleted: Vec<PathBuf> = batch.deleted.into_iter().collect();

        // Debounced writes may have landed after the accepted one; remember
        // what is actually being staged.
        let staged: Vec<(&PathBuf, String)> =
            changed.iter().map(|p| (p, fingerprint(p))).collect();
        {
            let mut state = self.state.lock();
            for (path, digest) in staged {
                state.digests.update(path, digest);
            }
        }

        let repo = self.repo.lock();
        repo.stage(&self.root, &changed, &deleted)?;

        let (do_commit, do_push) = (self.config.auto_commit, self.config.auto_push);
        let summary = format!(
            "{}: {} updated, {} removed @ {}",
            self.project,
            report.updated,
            report.removed,
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        if !do_commit && !do_push {
            self.log.append(format!("Staged: {summary}"));
            return Ok(report);
        }

        self.log.append(format!(
            "Batch flags: auto_commit={do_commit}, auto_push={do_push}"
        ));
        if do_commit {
            report.commit = repo.commit(&format!("auto: {summary}"))?;
        }
        if do_push {
            let outcome = repo.push(&self.config.branch)?;
            if outcome == PushOutcome::Skipped {
                self.log
                    .append(format!("Push skipped: no '{REMOTE_NAME}' remote configured"));
            }
            report.push = Some(outcome);
        }

        let label = match (do_commit, do_push) {
            (true, true) => "Commit+Push",
            (true, false) => "Commit",
            _ => "Push",
        };
        self.log.append(format!("{label}: {summary}"));
        Ok(report)
    }

    /// Force-align the remote with local state, once per session.
    pub fn mirror_on_start(&self) -> Option<MirrorOutcome> {
        if self.config.remote().is_none() || !self.config.auto_push {
            return None;
        }
        let repo = self.repo.lock();
        match repo.mirror_with_lease(&self.config.branch, "mirror_on_start") {
            Ok(outcome) => {
                if let MirrorOutcome::Mirrored { branch, .. } = &outcome {
                    self.log.append(format!("Mirror: {REMOTE_NAME}/{branch}"));
                }
                Some(outcome)
            }
            Err(e) => {
                self.log.append(format!("Mirror failed: {e:#}"));
                None
            }
        }
    }

    /// End the session: later events and timer firings are ignored and
    /// unflushed changes are dropped.
    pub fn shutdown(&self) {
        self.active.store(false, Ordering::SeqCst);
        let mut state = self.state.lock();
        state.timer = None;
        state.pending = PendingChangeSet::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use notify::Event;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut ev = Event::new(kind);
        for p in paths {
            ev = ev.add_path(PathBuf::from(p));
        }
        ev
    }

    #[test]
    fn notify_mapping() {
        assert_eq!(
            FsEvent::from_notify(&event(EventKind::Create(CreateKind::File), &["/r/a.py"])),
            vec![FsEvent::Created("/r/a.py".into())]
        );
        assert_eq!(
            FsEvent::from_notify(&event(
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                &["/r/a.py"]
            )),
            vec![FsEvent::Modified("/r/a.py".into())]
        );
        assert_eq!(
            FsEvent::from_notify(&event(EventKind::Remove(RemoveKind::File), &["/r/a.py"])),
            vec![FsEvent::Deleted("/r/a.py".into())]
        );
        assert_eq!(
            FsEvent::from_notify(&event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/r/.a.py.tmp", "/r/a.py"]
            )),
            vec![FsEvent::Moved {
                from: "/r/.a.py.tmp".into(),
                to: "/r/a.py".into()
            }]
        );
        assert_eq!(
            FsEvent::from_notify(&event(
                EventKind::Modify(ModifyKind::Name(RenameMode::From)),
                &["/r/a.py"]
            )),
            vec![FsEvent::Deleted("/r/a.py".into())]
        );
        assert_eq!(
            FsEvent::from_notify(&event(
                EventKind::Modify(ModifyKind::Name(RenameMode::To)),
                &["/r/a.py"]
            )),
            vec![FsEvent::Created("/r/a.py".into())]
        );
        assert!(FsEvent::from_notify(&event(
            EventKind::Access(notify::event::AccessKind::Any),
            &["/r/a.py"]
        ))
        .is_empty());
    }

    #[test]
    fn reconcile_prefers_change() {
        let mut set = PendingChangeSet::default();
        set.changed.insert("/r/a.py".into());
        set.deleted.insert("/r/a.py".into());
        set.deleted.insert("/r/b.py".into());
        set.reconcile();
        assert!(set.changed.contains(Path::new("/r/a.py")));
        assert_eq!(set.deleted.len(), 1);
        assert!(set.deleted.contains(Path::new("/r/b.py")));
    }

    #[test]
    fn debounce_window_tracks_every_notification() {
        let mut state = SessionState {
            pending: PendingChangeSet::default(),
            last_event: HashMap::new(),
            digests: DigestCache::new(),
            timer: None,
        };
        let path = Path::new("/r/a.py");
        let window = Duration::from_millis(600);
        let t0 = Instant::now();
        assert!(!state.debounced(path, t0, window));
        assert!(state.debounced(path, t0 + Duration::from_millis(400), window));
        // Measured from the rejected notification, not the accepted one.
        assert!(state.debounced(path, t0 + Duration::from_millis(800), window));
        assert!(!state.debounced(path, t0 + Duration::from_millis(1400), window));
    }
}
