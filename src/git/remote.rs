use crate::git::repository::{SyncRepo, REMOTE_NAME};
use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use git2::{Cred, CredentialType, FetchOptions, Oid, PushOptions, RemoteCallbacks};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed,
    /// No `origin` configured.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorOutcome {
    Mirrored { branch: String, snapshot: Option<Oid> },
    NoRemote,
}

/// Force-with-lease precondition: the remote tip must still be what we last
/// fetched, or absent when we never saw it.
pub fn lease_holds(expected: Option<Oid>, remote_tip: Oid) -> bool {
    match expected {
        Some(oid) => oid == remote_tip,
        None => remote_tip.is_zero(),
    }
}

fn callbacks<'a>() -> RemoteCallbacks<'a> {
    let mut cb = RemoteCallbacks::new();
    let mut attempts = 0;
    cb.credentials(move |url, username, allowed| {
        attempts += 1;
        if attempts > 4 {
            return Err(git2::Error::from_str("authentication failed"));
        }
        if allowed.contains(CredentialType::SSH_KEY) {
            return Cred::ssh_key_from_agent(username.unwrap_or("git"));
        }
        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
            let config = git2::Config::open_default()?;
            return Cred::credential_helper(&config, url, username);
        }
        if allowed.contains(CredentialType::USERNAME) {
            return Cred::username(username.unwrap_or("git"));
        }
        Cred::default()
    });
    cb
}

impl SyncRepo {
    fn has_remote(&self) -> bool {
        self.inner().find_remote(REMOTE_NAME).is_ok()
    }

    /// Push `branch` (or the active one) to `origin`.
    ///
    /// Rejections come back as errors; nothing is retried.
    pub fn push(&self, branch: &str) -> Result<PushOutcome> {
        if !self.has_remote() {
            return Ok(PushOutcome::Skipped);
        }
        let branch = self.resolve_branch(branch);
        self.push_branch(&branch, None)?;
        info!(branch, "pushed");
        Ok(PushOutcome::Pushed)
    }

    pub fn fetch(&self) -> Result<()> {
        let mut remote = self
            .inner()
            .find_remote(REMOTE_NAME)
            .context("No remote configured")?;
        let mut opts = FetchOptions::new();
        opts.remote_callbacks(callbacks());
        remote
            .fetch(&[] as &[&str], Some(&mut opts), None)
            .context("Fetch failed")
    }

    /// Snapshot everything and force the remote branch to the local tip,
    /// unless the remote moved since our last fetch.
    pub fn mirror_with_lease(&self, branch: &str, snapshot_msg: &str) -> Result<MirrorOutcome> {
        if !self.has_remote() {
            return Ok(MirrorOutcome::NoRemote);
        }
        self.stage_all()?;
        let message = format!(
            "auto: {snapshot_msg} @ {}",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        let snapshot = self.commit(&message)?;

        if let Err(e) = self.fetch() {
            warn!(error = %format!("{e:#}"), "fetch before mirror failed");
        }

        let branch = self.resolve_branch(branch);
        if self.head_commit().is_none() {
            bail!("Nothing to mirror: {branch} has no commits");
        }
        let tracking = format!("refs/remotes/{REMOTE_NAME}/{branch}");
        let expected = self.inner().refname_to_id(&tracking).ok();
        self.push_branch(&branch, Some(expected))?;
        info!(branch, "mirrored with lease");
        Ok(MirrorOutcome::Mirrored { branch, snapshot })
    }

    /// `lease`: `None` for a plain push, `Some(expected)` for a forced one.
    fn push_branch(&self, branch: &str, lease: Option<Option<Oid>>) -> Result<()> {
        let mut remote = self
            .inner()
            .find_remote(REMOTE_NAME)
            .context("No remote configured")?;
        let refname = format!("refs/heads/{branch}");
        let refspec = match lease {
            Some(_) => format!("+{refname}:{refname}"),
            None => format!("{refname}:{refname}"),
        };

        let mut rejections: Vec<String> = Vec::new();
        {
            let mut cb = callbacks();
            cb.push_update_reference(|name, status| {
                if let Some(msg) = status {
                    rejections.push(format!("{name}: {msg}"));
                }
                Ok(())
            });
            if let Some(expected) = lease {
                let target = refname.clone();
                cb.push_negotiation(move |updates| {
                    for update in updates {
                        if update.dst_refname() != Some(target.as_str()) {
                            continue;
                        }
                        if !lease_holds(expected, update.src()) {
                            return Err(git2::Error::from_str(&format!(
                                "stale info: remote {target} is at {}, expected {}",
                                update.src(),
                                expected.map(|o| o.to_string()).unwrap_or_else(|| "none".into())
                            )));
                        }
                    }
                    Ok(())
                });
            }
            let mut opts = PushOptions::new();
            opts.remote_callbacks(cb);
            remote
                .push(&[refspec.as_str()], Some(&mut opts))
                .with_context(|| format!("Push of {branch} failed"))?;
        }

        if !rejections.is_empty() {
            return Err(anyhow!("Push rejected: {}", rejections.join(", ")));
        }
        Ok(())
    }
}
