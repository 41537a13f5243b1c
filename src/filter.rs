use crate::config::{compile_patterns, ConfigError, WatchConfig};
use regex::Regex;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

pub const GIT_DIR: &str = ".git";
pub const BACKUP_DIR: &str = ".auto_versions";

/// Bare include entries that still mean "extension" (`py` == `.py`).
const BARE_EXTENSIONS: &[&str] = &[
    "md", "py", "txt", "yml", "yaml", "ini", "toml", "sql", "js", "ts", "html", "css",
];

/// Decides which paths under the watch root take part in syncing.
///
/// Purely path based: nothing here touches file contents, so the same inputs
/// always give the same answer.
#[derive(Debug, Clone)]
pub struct PathFilter {
    root: PathBuf,
    suffixes: Vec<String>,
    exact_names: HashSet<String>,
    exclude_dirs: HashSet<String>,
    include_patterns: Vec<Regex>,
    exclude_patterns: Vec<Regex>,
}

impl PathFilter {
    pub fn new(root: &Path, config: &WatchConfig) -> Result<Self, ConfigError> {
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());

        let entries: Vec<&str> = config
            .include_exts
            .iter()
            .map(|e| e.trim())
            .filter(|e| !e.is_empty())
            .collect();

        let mut suffixes = Vec::new();
        let mut exact_names = HashSet::new();
        for entry in entries {
            if entry.contains('.') {
                suffixes.push(normalize_ext(entry));
            } else {
                exact_names.insert(entry.to_string());
                if BARE_EXTENSIONS.contains(&entry.to_lowercase().as_str()) {
                    suffixes.push(normalize_ext(entry));
                }
            }
        }

        Ok(Self {
            root,
            suffixes,
            exact_names,
            exclude_dirs: config
                .exclude_dirs
                .iter()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect(),
            include_patterns: compile_patterns(&config.include_file_patterns)?,
            exclude_patterns: compile_patterns(&config.exclude_file_patterns)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path relative to the watch root, or `None` when it lies outside.
    pub fn relative(&self, path: &Path) -> Option<PathBuf> {
        if let Ok(rel) = path.strip_prefix(&self.root) {
            return lexical(rel);
        }
        // Symlinked roots (e.g. /tmp on macOS) deliver events under the other spelling.
        let resolved = match path.canonicalize() {
            Ok(p) => p,
            Err(_) => {
                let parent = path.parent()?.canonicalize().ok()?;
                parent.join(path.file_name()?)
            }
        };
        resolved.strip_prefix(&self.root).ok().and_then(lexical)
    }

    /// Root, hard exclusions and excluded directories only.
    ///
    /// Deletions are judged with this since the file is no longer there.
    pub fn in_scope(&self, path: &Path) -> bool {
        let Some(rel) = self.relative(path) else {
            return false;
        };
        rel.components().all(|c| {
            let part = c.as_os_str().to_string_lossy();
            part != GIT_DIR && part != BACKUP_DIR && !self.exclude_dirs.contains(part.as_ref())
        })
    }

    pub fn eligible(&self, path: &Path) -> bool {
        if !self.in_scope(path) {
            return false;
        }
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            return false;
        };

        if !self.suffixes.is_empty() || !self.exact_names.is_empty() {
            let lower = name.to_lowercase();
            let by_name = self.exact_names.contains(&name);
            let by_suffix = self.suffixes.iter().any(|s| lower.ends_with(s.as_str()));
            if !by_name && !by_suffix {
                return false;
            }
        }

        if self.exclude_patterns.iter().any(|re| re.is_match(&name)) {
            return false;
        }
        if !self.include_patterns.is_empty()
            && !self.include_patterns.iter().any(|re| re.is_match(&name))
        {
            return false;
        }

        !is_tilde_backup(&name)
    }
}

/// Editor backup files such as `notes.md~`.
pub fn is_tilde_backup(name: &str) -> bool {
    name.ends_with('~')
}

fn normalize_ext(entry: &str) -> String {
    let lower = entry.to_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{lower}")
    }
}

/// Rejects `..` escapes and empty paths (the root itself).
fn lexical(rel: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for c in rel.components() {
        match c {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!out.as_os_str().is_empty()).then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn filter_with(dir: &TempDir, f: impl FnOnce(&mut WatchConfig)) -> PathFilter {
        let mut cfg = WatchConfig {
            project_path: dir.path().to_path_buf(),
            ..WatchConfig::default()
        };
        f(&mut cfg);
        PathFilter::new(dir.path(), &cfg).unwrap()
    }

    #[test]
    fn outside_root_is_rejected() {
        let dir = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let filter = filter_with(&dir, |_| {});
        assert!(!filter.eligible(&other.path().join("a.py")));
        assert!(!filter.eligible(&filter.root().join("../a.py")));
        assert!(!filter.eligible(filter.root()));
    }

    #[test]
    fn hard_exclusions_win_over_includes() {
        let dir = TempDir::new().unwrap();
        let filter = filter_with(&dir, |c| {
            c.include_exts = vec!["HEAD".into(), ".txt".into()];
            c.exclude_dirs.clear();
            c.include_file_patterns = vec![".*".into()];
        });
        let root = filter.root().to_path_buf();
        assert!(!filter.eligible(&root.join(".git").join("HEAD")));
        assert!(!filter.eligible(&root.join(BACKUP_DIR).join("a.txt.history").join("1.txt")));
        assert!(filter.eligible(&root.join("HEAD")));
    }

    #[test]
    fn excluded_directories_anywhere_in_path() {
        let dir = TempDir::new().unwrap();
        let filter = filter_with(&dir, |_| {});
        let root = filter.root().to_path_buf();
        assert!(!filter.eligible(&root.join("node_modules").join("b.js")));
        assert!(!filter.eligible(&root.join("web").join("node_modules").join("b.js")));
        assert!(filter.eligible(&root.join("web").join("b.js")));
        assert!(!filter.in_scope(&root.join("build").join("out.txt")));
    }

    #[test]
    fn extensions_and_exact_names() {
        let dir = TempDir::new().unwrap();
        let filter = filter_with(&dir, |c| {
            c.include_exts = vec![" PY ".into(), "json".into(), "Dockerfile".into(), "".into()];
        });
        let root = filter.root().to_path_buf();
        assert!(filter.eligible(&root.join("main.py")));
        assert!(filter.eligible(&root.join("MAIN.PY")));
        assert!(filter.eligible(&root.join("Dockerfile")));
        assert!(!filter.eligible(&root.join("dockerfile")));
        // "json" is not a well-known bare extension, so only an exact name match counts
        assert!(!filter.eligible(&root.join("data.json")));
        assert!(!filter.eligible(&root.join("notes.txt")));
    }

    #[test]
    fn empty_include_list_accepts_everything() {
        let dir = TempDir::new().unwrap();
        let filter = filter_with(&dir, |c| c.include_exts.clear());
        assert!(filter.eligible(&filter.root().join("anything.bin")));
    }

    #[test]
    fn patterns_and_tilde() {
        let dir = TempDir::new().unwrap();
        let filter = filter_with(&dir, |c| {
            c.include_exts.clear();
            c.exclude_file_patterns = vec![r"\.#".into(), r"test_".into()];
            c.include_file_patterns = vec![r"[a-z]".into()];
        });
        let root = filter.root().to_path_buf();
        assert!(filter.eligible(&root.join("app.py")));
        assert!(!filter.eligible(&root.join("test_app.py")));
        assert!(!filter.eligible(&root.join(".#app.py")));
        // include patterns are anchored at the start of the name
        assert!(!filter.eligible(&root.join("App.py")));
        assert!(!filter.eligible(&root.join("app.py~")));
    }

    #[test]
    fn tilde_files_are_never_eligible() {
        let dir = TempDir::new().unwrap();
        let filter = filter_with(&dir, |c| c.include_exts = vec![".py~".into()]);
        assert!(!filter.eligible(&filter.root().join("x.py~")));
    }

    #[test]
    fn eligibility_is_stable() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        let filter = filter_with(&dir, |_| {});
        let path = filter.root().join("src").join("a.py");
        let first = filter.eligible(&path);
        for _ in 0..10 {
            assert_eq!(filter.eligible(&path), first);
        }
        assert!(first);
    }

    #[test]
    fn deleted_file_under_symlinked_spelling_is_in_scope() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        let filter = filter_with(&dir, |_| {});
        // Non-canonical spelling of a missing file still resolves through its parent.
        let path = dir.path().join("src").join(".").join("gone.py");
        assert!(filter.in_scope(&path));
    }
}
