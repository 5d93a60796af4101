//! Watches the edited diagram file.
//!
//! The parent directory is watched rather than the file itself because many
//! editors save atomically (write a temp file, then rename over the target),
//! which detaches a watch placed on the original inode.

use anyhow::{Context, Result};
use notify::{Config, Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct SourceWatcher {
    _watcher: PollWatcher,
    path: PathBuf,
}

impl std::fmt::Debug for SourceWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceWatcher")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SourceWatcher {
    /// Calls `on_change` from the watcher thread whenever the file is
    /// created, modified or replaced.
    pub fn new<F>(path: &Path, poll_interval: Duration, on_change: F) -> Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        if !path.exists() {
            anyhow::bail!("Diagram file not found: {}", path.display());
        }
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let file_name = canonical
            .file_name()
            .map(|name| name.to_os_string())
            .with_context(|| format!("Not a file: {}", canonical.display()))?;
        let dir = canonical
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut watcher = PollWatcher::new(
            move |result: std::result::Result<Event, notify::Error>| {
                let event = match result {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "file watch error");
                        return;
                    }
                };
                if !matches!(
                    event.kind,
                    EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                ) {
                    return;
                }
                let touches_source = event
                    .paths
                    .iter()
                    .any(|changed| changed.file_name() == Some(file_name.as_os_str()));
                if touches_source {
                    tracing::trace!(kind = ?event.kind, "diagram file changed");
                    on_change();
                }
            },
            Config::default()
                .with_poll_interval(poll_interval)
                .with_compare_contents(true),
        )
        .context("Failed to create file watcher")?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;
        tracing::info!(path = %canonical.display(), "watching diagram file");

        Ok(Self {
            _watcher: watcher,
            path: canonical,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
