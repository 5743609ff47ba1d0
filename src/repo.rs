//! Repository retrieval: clones chart repositories into timestamped
//! checkouts under a storage root, and prunes old ones.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::exec;
use crate::progress::Spinner;

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Directory name for a repository URL: its last path segment without `.git`.
pub fn repo_name(url: &str) -> String {
    let last = url.strip_suffix('/').unwrap_or(url).rsplit('/').next().unwrap_or_default();
    let name = last.strip_suffix(".git").unwrap_or(last);
    name.replace(|c: char| !c.is_alphanumeric() && !matches!(c, '-' | '_' | '.'), "_")
}

/// `<timestamp>_<name>` for a checkout created at `now`.
pub fn checkout_dir_name(url: &str, now: NaiveDateTime) -> String {
    format!("{}_{}", now.format(TIMESTAMP_FORMAT), repo_name(url))
}

/// A cloned repository. The directory is removed on drop unless kept.
#[derive(Debug)]
pub struct Checkout {
    path: PathBuf,
    keep: bool,
}

impl Checkout {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory now, off the async runtime's worker threads,
    /// unless the checkout is kept. Drop only covers runs that are cancelled
    /// before reaching this point.
    pub async fn release(mut self) {
        if self.keep {
            return;
        }
        self.keep = true;
        let path = self.path.clone();
        match tokio::task::spawn_blocking(move || remove_checkout(&path)).await {
            Ok(()) => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "checkout removal task failed"),
        }
    }
}

fn remove_checkout(path: &Path) {
    match fs::remove_dir_all(path) {
        Ok(()) => debug!(path = %path.display(), "removed checkout"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove checkout"),
    }
}

impl Drop for Checkout {
    fn drop(&mut self) {
        if !self.keep {
            remove_checkout(&self.path);
        }
    }
}

/// Where and how repositories are cloned.
#[derive(Debug, Clone)]
pub struct RepoStore {
    root: PathBuf,
    git: PathBuf,
    timeout: Duration,
    keep_checkouts: bool,
}

impl RepoStore {
    pub fn new(root: impl Into<PathBuf>, git: impl Into<PathBuf>, timeout: Duration, keep_checkouts: bool) -> Self {
        Self {
            root: root.into(),
            git: git.into(),
            timeout,
            keep_checkouts,
        }
    }

    /// Create a fresh, empty checkout directory. A numeric suffix is added
    /// when another request already claimed the same name.
    async fn reserve(&self, url: &str) -> io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.root).await?;
        let base = checkout_dir_name(url, Local::now().naive_local());
        let mut suffix = 0;
        loop {
            let name = match suffix {
                0 => base.clone(),
                n => format!("{base}-{n}"),
            };
            let path = self.root.join(name);
            match tokio::fs::create_dir(&path).await {
                Ok(()) => return Ok(path),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => return Err(e),
            }
        }
    }

    /// Clone `url` into a new checkout. Clone output goes to the console.
    pub async fn clone_repo(&self, url: &str, progress: Option<&Spinner>) -> Result<Checkout, PipelineError> {
        let retrieval = |message: String| PipelineError::Retrieval {
            url: url.to_string(),
            message,
        };

        if url.trim().is_empty() {
            return Err(retrieval("repository URL is empty".to_string()));
        }

        let path = self.reserve(url).await.map_err(|e| {
            retrieval(format!("failed to create checkout under {}: {e}", self.root.display()))
        })?;
        // Removed on failure regardless of keep_checkouts.
        let mut checkout = Checkout { path, keep: false };

        if let Some(spinner) = progress {
            spinner.suspend();
        }
        let mut cmd = exec::command(&self.git);
        cmd.arg("clone").arg("--").arg(url).arg(checkout.path());
        let failure = match exec::status(&mut cmd, self.timeout).await {
            Ok(status) if status.success() => None,
            Ok(status) => Some(format!("git clone exited with {status}")),
            Err(e) => Some(e.to_string()),
        };
        if let Some(message) = failure {
            checkout.release().await;
            return Err(retrieval(message));
        }

        info!(url, path = %checkout.path().display(), "repository cloned");
        checkout.keep = self.keep_checkouts;
        Ok(checkout)
    }
}

/// Remove checkouts under `root` whose timestamp is older than `older_than`.
/// Entries whose names do not start with a timestamp are left alone.
pub fn prune(root: &Path, older_than: Duration) -> io::Result<Vec<PathBuf>> {
    let Some(cutoff) = chrono::Duration::from_std(older_than)
        .ok()
        .and_then(|age| Local::now().naive_local().checked_sub_signed(age))
    else {
        return Ok(Vec::new());
    };

    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut removed = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(created) = name
            .to_str()
            .and_then(|n| n.split_once('_'))
            .and_then(|(ts, _)| NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).ok())
        else {
            continue;
        };
        if created < cutoff {
            fs::remove_dir_all(entry.path())?;
            info!(path = %entry.path().display(), "pruned checkout");
            removed.push(entry.path());
        }
    }
    Ok(removed)
}
