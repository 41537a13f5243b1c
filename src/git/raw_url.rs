//! Direct-download links for files on GitHub remotes.

const RAW_HOST: &str = "https://raw.githubusercontent.com";

/// `owner/repo` for a GitHub remote url.
fn github_slug(remote_url: &str) -> Option<String> {
    let url = remote_url.trim().trim_end_matches('/');
    let rest = url
        .strip_prefix("https://github.com/")
        .or_else(|| url.strip_prefix("http://github.com/"))
        .or_else(|| url.strip_prefix("ssh://git@github.com/"))
        .or_else(|| url.strip_prefix("git@github.com:"))?;
    let rest = rest.strip_suffix(".git").unwrap_or(rest);

    let mut parts = rest.split('/');
    let owner = parts.next().filter(|s| !s.is_empty())?;
    let repo = parts.next().filter(|s| !s.is_empty())?;
    if parts.next().is_some() {
        return None;
    }
    Some(format!("{owner}/{repo}"))
}

pub fn raw_base(remote_url: &str, branch: &str) -> Option<String> {
    let slug = github_slug(remote_url)?;
    Some(format!("{RAW_HOST}/{slug}/{}", encode_path(branch)))
}

/// Raw urls for `paths` (relative, `/`-separated). Empty for non-GitHub remotes.
pub fn raw_urls(remote_url: &str, branch: &str, paths: &[String]) -> Vec<String> {
    let Some(base) = raw_base(remote_url, branch) else {
        return Vec::new();
    };
    paths
        .iter()
        .map(|p| format!("{base}/{}", encode_path(p)))
        .collect()
}

fn encode_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for b in path.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn github_remote_forms() {
        let expected = Some("https://raw.githubusercontent.com/me/notes/main".to_string());
        assert_eq!(raw_base("https://github.com/me/notes.git", "main"), expected);
        assert_eq!(raw_base("https://github.com/me/notes", "main"), expected);
        assert_eq!(raw_base("git@github.com:me/notes.git", "main"), expected);
        assert_eq!(raw_base("ssh://git@github.com/me/notes.git", "main"), expected);
    }

    #[test]
    fn other_hosts_have_no_raw_urls() {
        assert_eq!(raw_base("https://gitlab.com/me/notes.git", "main"), None);
        assert_eq!(raw_base("https://github.com/me", "main"), None);
        assert!(raw_urls("/srv/git/notes.git", "main", &["a.py".into()]).is_empty());
    }

    #[test]
    fn paths_are_encoded() {
        let urls = raw_urls(
            "git@github.com:me/notes.git",
            "main",
            &["src/a.py".into(), "docs/my notes.md".into()],
        );
        assert_eq!(
            urls,
            vec![
                "https://raw.githubusercontent.com/me/notes/main/src/a.py",
                "https://raw.githubusercontent.com/me/notes/main/docs/my%20notes.md",
            ]
        );
    }
}
