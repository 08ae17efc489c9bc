// src/config/watcher.rs
//! File watcher driving live reloads.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info};

/// Quiet period after the last change before a reload fires.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// A file whose changes trigger a reload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WatchTarget {
    Zone { zone: String, path: PathBuf },
    LocationMap(PathBuf),
}

impl WatchTarget {
    pub fn path(&self) -> &Path {
        match self {
            WatchTarget::Zone { path, .. } => path,
            WatchTarget::LocationMap(path) => path,
        }
    }

    /// Editors often replace files instead of writing them in place, so the
    /// parent directory is watched and events are matched by file name.
    fn matches(&self, changed: &Path) -> bool {
        changed.file_name().is_some() && changed.file_name() == self.path().file_name()
    }

    fn directory(&self) -> PathBuf {
        match self.path().parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

/// Watches zone files and the location map.
pub struct ConfigWatcher {
    targets: Vec<WatchTarget>,
}

impl ConfigWatcher {
    pub fn new(targets: Vec<WatchTarget>) -> Self {
        Self { targets }
    }

    /// Start watching. Dropping the returned watcher stops it; the receiver
    /// yields each changed target once per burst of events.
    ///
    /// Must be called from within a tokio runtime.
    pub fn run(
        self,
    ) -> Result<(RecommendedWatcher, mpsc::UnboundedReceiver<WatchTarget>), notify::Error> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let targets = self.targets.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    for target in &targets {
                        if event.paths.iter().any(|p| target.matches(p)) {
                            debug!(path = ?target.path(), "change detected");
                            let _ = raw_tx.send(target.clone());
                        }
                    }
                }
                Err(e) => error!("watch error: {:?}", e),
            },
            Config::default(),
        )?;

        let directories: BTreeSet<PathBuf> = self.targets.iter().map(|t| t.directory()).collect();
        for dir in &directories {
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
            info!(directory = ?dir, "config watcher started");
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(debounce(raw_rx, tx, DEFAULT_DEBOUNCE));
        Ok((watcher, rx))
    }
}

/// Collapse bursts of events: once a change arrives, keep absorbing until
/// `window` passes with nothing new, then emit each distinct target once.
pub async fn debounce(
    mut input: mpsc::UnboundedReceiver<WatchTarget>,
    output: mpsc::UnboundedSender<WatchTarget>,
    window: Duration,
) {
    while let Some(first) = input.recv().await {
        let mut order = vec![first.clone()];
        let mut seen = HashSet::from([first]);
        let mut closed = false;

        loop {
            match timeout(window, input.recv()).await {
                Ok(Some(target)) => {
                    if seen.insert(target.clone()) {
                        order.push(target);
                    }
                }
                Ok(None) => {
                    closed = true;
                    break;
                }
                Err(_) => break,
            }
        }

        for target in order {
            if output.send(target).is_err() {
                return;
            }
        }
        if closed {
            return;
        }
    }
}
