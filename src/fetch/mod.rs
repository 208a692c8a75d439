//! Fetching remote components.
//!
//! [`GitFetcher`] clones a registry entry with the system `git` binary and
//! reports weighted progress while doing so. The clone happens in a staging
//! directory next to the destination and is renamed into place only once it
//! succeeded, so an interrupted fetch never leaves a half-populated component
//! for the store to pick up.

use futures::future::BoxFuture;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, info};

use crate::core::YakkaError;
use crate::registry::RegistryEntry;

/// Receives `(phase, percent)` updates. Percentages usually grow but may step back.
pub type ProgressCallback = Arc<dyn Fn(&str, usize) + Send + Sync>;

/// Something that can make a registry entry available on disk.
pub trait ComponentFetcher: Send + Sync {
    /// Fetch `name` and return the directory it was placed in.
    fn fetch<'a>(
        &'a self,
        name: &'a str,
        entry: &'a RegistryEntry,
        progress: ProgressCallback,
    ) -> BoxFuture<'a, Result<PathBuf, YakkaError>>;
}

static PROGRESS_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(Counting objects|Compressing objects|Receiving objects|Resolving deltas|Updating files):\s+(\d+)%",
    )
    .ok()
});

/// Overall percentage range covered by each git phase.
const PHASE_WEIGHTS: &[(&str, usize, usize)] = &[
    ("Counting objects", 0, 10),
    ("Compressing objects", 10, 20),
    ("Receiving objects", 20, 75),
    ("Resolving deltas", 75, 100),
    ("Updating files", 75, 100),
];

/// Parse a `git clone --progress` line into its phase and overall percentage.
pub fn parse_progress_line(line: &str) -> Option<(&'static str, usize)> {
    let captures = PROGRESS_LINE.as_ref()?.captures(line)?;
    let phase = captures.get(1)?.as_str();
    let percent: usize = captures.get(2)?.as_str().parse().ok()?;
    let &(name, start, end) = PHASE_WEIGHTS.iter().find(|(name, _, _)| *name == phase)?;
    Some((name, start + (end - start) * percent.min(100) / 100))
}

#[derive(Debug)]
enum CloneError {
    /// git could not be started
    Spawn(std::io::Error),
    /// git ran and failed
    Failed(String),
}

impl CloneError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Spawn(_) => true,
            Self::Failed(stderr) => {
                let stderr = stderr.to_lowercase();
                ["could not resolve host", "timed out", "connection reset", "early eof"]
                    .iter()
                    .any(|needle| stderr.contains(needle))
            }
        }
    }
}

impl std::fmt::Display for CloneError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn(e) => write!(f, "failed to run git: {e}"),
            Self::Failed(stderr) => write!(f, "{stderr}"),
        }
    }
}

/// Clones components into `repos_dir/<name>`.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    repos_dir: PathBuf,
    attempts: usize,
}

impl GitFetcher {
    pub fn new(repos_dir: impl Into<PathBuf>) -> Self {
        Self {
            repos_dir: repos_dir.into(),
            attempts: 3,
        }
    }

    pub fn repos_dir(&self) -> &Path {
        &self.repos_dir
    }

    async fn fetch_into_place(
        &self,
        name: &str,
        entry: &RegistryEntry,
        progress: ProgressCallback,
    ) -> Result<PathBuf, YakkaError> {
        let destination = self.repos_dir.join(name);
        if destination.exists() {
            info!("'{name}' already present at {}", destination.display());
            progress("done", 100);
            return Ok(destination);
        }

        tokio::fs::create_dir_all(&self.repos_dir).await?;
        let staging = tempfile::Builder::new().prefix(".fetch-").tempdir_in(&self.repos_dir)?;
        let checkout = staging.path().join(name);

        let strategy = ExponentialBackoff::from_millis(100)
            .max_delay(Duration::from_secs(2))
            .take(self.attempts.saturating_sub(1));
        RetryIf::spawn(
            strategy,
            || self.clone_once(entry, &checkout, Arc::clone(&progress)),
            CloneError::is_transient,
        )
        .await
        .map_err(|e| YakkaError::FetchFailed {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        tokio::fs::rename(&checkout, &destination).await?;
        progress("done", 100);
        info!("Fetched '{name}' into {}", destination.display());
        Ok(destination)
    }

    async fn clone_once(
        &self,
        entry: &RegistryEntry,
        checkout: &Path,
        progress: ProgressCallback,
    ) -> Result<(), CloneError> {
        if checkout.exists() {
            tokio::fs::remove_dir_all(checkout).await.map_err(CloneError::Spawn)?;
        }

        let mut command = Command::new("git");
        command.arg("clone").arg("--progress");
        if let Some(branch) = &entry.branch {
            command.arg("--branch").arg(branch);
        }
        command
            .arg(&entry.url)
            .arg(checkout)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        debug!("Running {command:?}");

        let mut child = command.spawn().map_err(CloneError::Spawn)?;
        let mut transcript = String::new();
        if let Some(mut stderr) = child.stderr.take() {
            let mut pending = String::new();
            let mut buffer = [0u8; 4096];
            loop {
                let read = stderr.read(&mut buffer).await.map_err(CloneError::Spawn)?;
                if read == 0 {
                    break;
                }
                pending.push_str(&String::from_utf8_lossy(&buffer[..read]));
                while let Some(split) = pending.find(['\r', '\n']) {
                    let line: String = pending.drain(..=split).collect();
                    let line = line.trim_end();
                    if let Some((phase, percent)) = parse_progress_line(line) {
                        progress(phase, percent);
                    } else if !line.is_empty() {
                        transcript.push_str(line);
                        transcript.push('\n');
                    }
                }
            }
            transcript.push_str(pending.trim_end());
        }

        let status = child.wait().await.map_err(CloneError::Spawn)?;
        if status.success() {
            Ok(())
        } else {
            Err(CloneError::Failed(transcript.trim().to_string()))
        }
    }
}

impl ComponentFetcher for GitFetcher {
    fn fetch<'a>(
        &'a self,
        name: &'a str,
        entry: &'a RegistryEntry,
        progress: ProgressCallback,
    ) -> BoxFuture<'a, Result<PathBuf, YakkaError>> {
        Box::pin(self.fetch_into_place(name, entry, progress))
    }
}
