use crate::filter::BACKUP_DIR;
use anyhow::{Context, Result};
use git2::build::CheckoutBuilder;
use git2::{
    BranchType, Commit, ErrorCode, IndexAddOption, ObjectType, Oid, Repository, Signature,
    StatusOptions,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const REMOTE_NAME: &str = "origin";

/// The project repository, owned by one watch session at a time.
pub struct SyncRepo {
    inner: Repository,
}

impl SyncRepo {
    /// Open the repository at `path`, creating one in place if there is none.
    pub fn open_or_init(path: &Path) -> Result<Self> {
        let repo = match Repository::open(path) {
            Ok(repo) => repo,
            Err(e) if e.code() == ErrorCode::NotFound => {
                fs::create_dir_all(path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                let repo = Repository::init(path)
                    .with_context(|| format!("Failed to init repository at {}", path.display()))?;
                info!(path = %path.display(), "initialized repository");
                repo
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to open repository at {}", path.display()))
            }
        };
        let repo = Self { inner: repo };
        repo.exclude_backups()?;
        Ok(repo)
    }

    pub fn workdir(&self) -> &Path {
        self.inner
            .workdir()
            .unwrap_or_else(|| self.inner.path())
    }

    pub fn inner(&self) -> &Repository {
        &self.inner
    }

    /// Keep the local snapshot directory out of status and `add -A`.
    fn exclude_backups(&self) -> Result<()> {
        let info = self.inner.path().join("info");
        let exclude = info.join("exclude");
        let entry = format!("/{BACKUP_DIR}/");
        let existing = fs::read_to_string(&exclude).unwrap_or_default();
        if existing.lines().any(|l| l.trim() == entry) {
            return Ok(());
        }
        fs::create_dir_all(&info)?;
        let mut content = existing;
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&entry);
        content.push('\n');
        fs::write(&exclude, content)
            .with_context(|| format!("Failed to write {}", exclude.display()))
    }

    /// Branch HEAD points at, including an unborn one.
    pub fn current_branch(&self) -> Option<String> {
        match self.inner.head() {
            Ok(head) if head.is_branch() => head.shorthand().map(|s| s.to_string()),
            Ok(_) => None,
            Err(_) => self
                .inner
                .find_reference("HEAD")
                .ok()
                .and_then(|r| r.symbolic_target().map(|t| t.to_string()))
                .map(|t| t.trim_start_matches("refs/heads/").to_string()),
        }
    }

    /// Configured branch, else the active one, else `main`.
    pub fn resolve_branch(&self, configured: &str) -> String {
        let configured = configured.trim();
        if !configured.is_empty() {
            return configured.to_string();
        }
        self.current_branch().unwrap_or_else(|| "main".to_string())
    }

    /// Switch to `name`, creating it from HEAD when it does not exist.
    pub fn ensure_branch(&self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() || self.current_branch().as_deref() == Some(name) {
            return Ok(());
        }
        let refname = format!("refs/heads/{name}");

        match self.inner.find_branch(name, BranchType::Local) {
            Ok(branch) => {
                let target = branch.get().peel(ObjectType::Commit)?;
                self.inner
                    .checkout_tree(&target, Some(CheckoutBuilder::new().safe()))
                    .with_context(|| format!("Failed to check out {name}"))?;
                self.inner.set_head(&refname)?;
                info!(branch = name, "switched branch");
            }
            Err(_) => {
                if let Some(head) = self.head_commit() {
                    self.inner
                        .branch(name, &head, false)
                        .with_context(|| format!("Failed to create branch {name}"))?;
                }
                // Without a commit this just renames the unborn branch.
                self.inner.set_head(&refname)?;
                info!(branch = name, "created branch");
            }
        }
        Ok(())
    }

    /// Point `origin` at `url`, creating it if needed.
    pub fn ensure_remote(&self, url: Option<&str>) -> Result<()> {
        let Some(url) = url else {
            return Ok(());
        };
        match self.inner.find_remote(REMOTE_NAME) {
            Ok(remote) => {
                if remote.url() != Some(url) {
                    self.inner
                        .remote_set_url(REMOTE_NAME, url)
                        .context("Failed to update remote url")?;
                    info!(url, "updated remote");
                }
            }
            Err(_) => {
                self.inner
                    .remote(REMOTE_NAME, url)
                    .context("Failed to create remote")?;
                info!(url, "added remote");
            }
        }
        Ok(())
    }

    pub fn remote_url(&self) -> Option<String> {
        self.inner
            .find_remote(REMOTE_NAME)
            .ok()
            .and_then(|r| r.url().map(|u| u.to_string()))
    }

    /// Anything staged, modified or untracked.
    pub fn has_changes(&self) -> Result<bool> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true).include_ignored(false);
        let statuses = self
            .inner
            .statuses(Some(&mut opts))
            .context("Failed to get repository status")?;
        Ok(!statuses.is_empty())
    }

    /// Stage additions of existing files and index-only removals.
    pub fn stage(&self, root: &Path, changed: &[PathBuf], deleted: &[PathBuf]) -> Result<()> {
        let mut index = self.inner.index().context("Failed to get repository index")?;

        for path in changed {
            if !path.is_file() {
                continue;
            }
            let Ok(rel) = path.strip_prefix(root) else {
                continue;
            };
            // Same rule as `git add -- <path>`: ignored files stay out.
            if self.inner.is_path_ignored(rel)? {
                debug!(path = %rel.display(), "ignored, not staged");
                continue;
            }
            if let Err(e) = index.add_path(rel) {
                warn!(path = %rel.display(), error = %e, "failed to stage");
            }
        }

        for path in deleted {
            let Ok(rel) = path.strip_prefix(root) else {
                continue;
            };
            // Already gone from the index is fine.
            if let Err(e) = index.remove_path(rel) {
                debug!(path = %rel.display(), error = %e, "remove_path");
            }
            if let Err(e) = index.remove_dir(rel, 0) {
                debug!(path = %rel.display(), error = %e, "remove_dir");
            }
        }

        index.write().context("Failed to write index")
    }

    /// `git add -A`
    pub fn stage_all(&self) -> Result<()> {
        let mut index = self.inner.index().context("Failed to get repository index")?;
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .context("Failed to stage files")?;
        index
            .update_all(["*"].iter(), None)
            .context("Failed to stage removals")?;
        index.write().context("Failed to write index")
    }

    /// Commit the index if there is anything to commit.
    pub fn commit(&self, message: &str) -> Result<Option<Oid>> {
        if !self.has_changes()? {
            return Ok(None);
        }
        let mut index = self.inner.index().context("Failed to get repository index")?;
        let parent = self.head_commit();
        if parent.is_none() && index.is_empty() {
            return Ok(None);
        }
        let tree_id = index.write_tree().context("Failed to write tree")?;
        if parent.as_ref().map(|p| p.tree_id()) == Some(tree_id) {
            return Ok(None);
        }

        let tree = self.inner.find_tree(tree_id)?;
        let sig = self.signature()?;
        let parents: Vec<&Commit> = parent.iter().collect();
        let oid = self
            .inner
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .context("Failed to commit")?;
        info!(commit = %oid, "committed");
        Ok(Some(oid))
    }

    pub fn head_commit(&self) -> Option<Commit<'_>> {
        self.inner.head().ok().and_then(|h| h.peel_to_commit().ok())
    }

    fn signature(&self) -> Result<Signature<'static>> {
        match self.inner.signature() {
            Ok(sig) => Ok(sig.to_owned()),
            Err(_) => Signature::now("autosync", "autosync@localhost")
                .context("Failed to create signature"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn head_paths(repo: &SyncRepo) -> Vec<String> {
        let tree = repo.head_commit().unwrap().tree().unwrap();
        let mut out = Vec::new();
        tree.walk(git2::TreeWalkMode::PreOrder, |dir, entry| {
            if entry.kind() == Some(ObjectType::Blob) {
                out.push(format!("{dir}{}", entry.name().unwrap()));
            }
            git2::TreeWalkResult::Ok
        })
        .unwrap();
        out.sort();
        out
    }

    #[test]
    fn init_when_missing() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("project");
        let repo = SyncRepo::open_or_init(&root).unwrap();
        assert!(root.join(".git").is_dir());
        let exclude = fs::read_to_string(root.join(".git/info/exclude")).unwrap();
        assert!(exclude.contains("/.auto_versions/"));

        // Reopening keeps the exclude entry single.
        drop(repo);
        SyncRepo::open_or_init(&root).unwrap();
        let exclude = fs::read_to_string(root.join(".git/info/exclude")).unwrap();
        assert_eq!(exclude.matches("/.auto_versions/").count(), 1);
    }

    #[test]
    fn unborn_branch_is_renamed() {
        let dir = TempDir::new().unwrap();
        let repo = SyncRepo::open_or_init(dir.path()).unwrap();
        repo.ensure_branch("sync").unwrap();
        assert_eq!(repo.current_branch().as_deref(), Some("sync"));
    }

    #[test]
    fn branch_created_then_reused() {
        let dir = TempDir::new().unwrap();
        let repo = SyncRepo::open_or_init(dir.path()).unwrap();
        fs::write(dir.path().join("a.py"), "a").unwrap();
        repo.stage(dir.path(), &[dir.path().join("a.py")], &[]).unwrap();
        repo.commit("first").unwrap().unwrap();

        let original = repo.current_branch().unwrap();
        repo.ensure_branch("feature").unwrap();
        assert_eq!(repo.current_branch().as_deref(), Some("feature"));
        repo.ensure_branch(&original).unwrap();
        assert_eq!(repo.current_branch(), Some(original));
        repo.ensure_branch("feature").unwrap();
        assert_eq!(repo.current_branch().as_deref(), Some("feature"));
    }

    #[test]
    fn remote_set_in_place() {
        let dir = TempDir::new().unwrap();
        let repo = SyncRepo::open_or_init(dir.path()).unwrap();
        repo.ensure_remote(None).unwrap();
        assert_eq!(repo.remote_url(), None);

        repo.ensure_remote(Some("https://example.com/a.git")).unwrap();
        assert_eq!(repo.remote_url().as_deref(), Some("https://example.com/a.git"));
        repo.ensure_remote(Some("https://example.com/b.git")).unwrap();
        assert_eq!(repo.remote_url().as_deref(), Some("https://example.com/b.git"));
    }

    #[test]
    fn stage_commit_and_remove() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let repo = SyncRepo::open_or_init(root).unwrap();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/a.py"), "a").unwrap();
        fs::write(root.join("b.md"), "b").unwrap();

        repo.stage(root, &[root.join("src/a.py"), root.join("b.md")], &[])
            .unwrap();
        assert!(repo.commit("add").unwrap().is_some());
        assert_eq!(head_paths(&repo), vec!["b.md", "src/a.py"]);

        fs::remove_file(root.join("b.md")).unwrap();
        repo.stage(root, &[], &[root.join("b.md"), root.join("never-tracked.md")])
            .unwrap();
        assert!(repo.commit("remove").unwrap().is_some());
        assert_eq!(head_paths(&repo), vec!["src/a.py"]);
    }

    #[test]
    fn gitignored_paths_are_not_staged() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let repo = SyncRepo::open_or_init(root).unwrap();
        fs::write(root.join(".gitignore"), "secrets.json\n").unwrap();
        fs::write(root.join("secrets.json"), "{}").unwrap();
        fs::write(root.join("a.py"), "a").unwrap();

        repo.stage(root, &[root.join("secrets.json"), root.join("a.py")], &[])
            .unwrap();
        repo.commit("add").unwrap().unwrap();
        assert_eq!(head_paths(&repo), vec!["a.py"]);
    }

    #[test]
    fn clean_tree_makes_no_commit() {
        let dir = TempDir::new().unwrap();
        let repo = SyncRepo::open_or_init(dir.path()).unwrap();
        assert!(!repo.has_changes().unwrap());
        assert!(repo.commit("nothing").unwrap().is_none());

        // Untracked but unstaged content does not produce an empty commit.
        fs::write(dir.path().join("a.py"), "a").unwrap();
        repo.stage_all().unwrap();
        repo.commit("first").unwrap().unwrap();
        fs::write(dir.path().join("untracked.py"), "u").unwrap();
        assert!(repo.has_changes().unwrap());
        assert!(repo.commit("empty").unwrap().is_none());
    }

    #[test]
    fn backups_are_not_changes() {
        let dir = TempDir::new().unwrap();
        let repo = SyncRepo::open_or_init(dir.path()).unwrap();
        let backups = dir.path().join(BACKUP_DIR).join("a.py.history");
        fs::create_dir_all(&backups).unwrap();
        fs::write(backups.join("1.py"), "x").unwrap();
        assert!(!repo.has_changes().unwrap());
    }
}
