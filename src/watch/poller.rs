//! Polling watcher: periodic modification-time scans

use crate::core::config::WatchOptions;
use crate::core::defaults::DEFAULT_AGGREGATE_TIMEOUT_MS;
use crate::watch::{WatchError, WatchFileSystem, WatcherMessage};
use ignore::overrides::{Override, OverrideBuilder};
use ignore::WalkBuilder;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Interval used when the configuration does not ask for a specific poll rate
pub const DEFAULT_SCAN_INTERVAL_MS: u64 = 1000;

type Snapshot = HashMap<PathBuf, (Option<SystemTime>, u64)>;

/// One watched root with its `ignored` globs compiled as gitignore-style overrides
#[derive(Debug, Clone)]
struct WatchRoot {
    path: PathBuf,
    ignored: Override,
}

impl WatchRoot {
    fn new(path: &Path, patterns: &[String]) -> Result<Self, WatchError> {
        let mut builder = OverrideBuilder::new(path);
        for pattern in patterns {
            builder
                .add(&format!("!{}", pattern))
                .map_err(|e| WatchError::Pattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
        }
        let ignored = builder.build().map_err(|e| WatchError::Pattern {
            pattern: patterns.join(", "),
            reason: e.to_string(),
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            ignored,
        })
    }

    #[cfg(test)]
    fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        self.ignored.matched(path, is_dir).is_ignore()
    }
}

fn scan(roots: &[WatchRoot], follow_symlinks: bool) -> Snapshot {
    let mut snapshot = Snapshot::new();

    for root in roots {
        // Only `ignored` filters; hidden and VCS-ignored files are watched too.
        // With `follow_links`, the walker reports symlink loops as errors
        // instead of descending into them.
        let walker = WalkBuilder::new(&root.path)
            .standard_filters(false)
            .follow_links(follow_symlinks)
            .overrides(root.ignored.clone())
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    trace!("Skipping unreadable watch entry: {}", e);
                    continue;
                }
            };
            if entry.file_type().map_or(true, |t| t.is_dir()) {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            snapshot.insert(
                entry.into_path(),
                (metadata.modified().ok(), metadata.len()),
            );
        }
    }

    snapshot
}

/// Paths added, removed or modified between two snapshots
fn diff(before: &Snapshot, after: &Snapshot) -> Vec<PathBuf> {
    let mut changed: Vec<PathBuf> = after
        .iter()
        .filter(|(path, stamp)| before.get(*path) != Some(stamp))
        .map(|(path, _)| path.clone())
        .collect();

    changed.extend(
        before
            .keys()
            .filter(|path| !after.contains_key(*path))
            .cloned(),
    );

    changed
}

/// Default watcher: rescans the roots on a fixed interval
#[derive(Debug, Clone)]
pub struct PollingWatcher {
    default_interval: Duration,
}

impl PollingWatcher {
    pub fn new() -> Self {
        Self {
            default_interval: Duration::from_millis(DEFAULT_SCAN_INTERVAL_MS),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.default_interval = interval;
        self
    }
}

impl Default for PollingWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchFileSystem for PollingWatcher {
    fn watch(
        &self,
        roots: &[PathBuf],
        options: &WatchOptions,
    ) -> Result<mpsc::Receiver<WatcherMessage>, WatchError> {
        for root in roots {
            if !root.exists() {
                return Err(WatchError::Start {
                    path: root.clone(),
                    reason: "path does not exist".to_string(),
                });
            }
        }

        let watch_roots = roots
            .iter()
            .map(|root| WatchRoot::new(root, &options.ignored))
            .collect::<Result<Vec<_>, _>>()?;
        let interval = options
            .poll
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(self.default_interval);
        let aggregate = Duration::from_millis(
            options
                .aggregate_timeout
                .unwrap_or(DEFAULT_AGGREGATE_TIMEOUT_MS),
        );
        let follow_symlinks = options.follow_symlinks.unwrap_or(false);

        debug!(
            "Polling {} root(s) every {:?}, aggregating for {:?}",
            watch_roots.len(),
            interval,
            aggregate
        );

        let (tx, rx) = mpsc::channel(16);
        let mut snapshot = scan(&watch_roots, follow_symlinks);

        tokio::spawn(async move {
            let mut pending: BTreeSet<PathBuf> = BTreeSet::new();
            let mut last_change: Option<Instant> = None;

            loop {
                let wait = match last_change {
                    Some(at) => aggregate.saturating_sub(at.elapsed()).min(interval),
                    None => interval,
                };
                tokio::time::sleep(wait).await;

                if tx.is_closed() {
                    break;
                }

                let scan_roots = watch_roots.clone();
                let next = match tokio::task::spawn_blocking(move || scan(&scan_roots, follow_symlinks))
                .await
                {
                    Ok(next) => next,
                    Err(e) => {
                        warn!("watch scan failed: {}", e);
                        let _ = tx.send(WatcherMessage::Failed(e.to_string())).await;
                        break;
                    }
                };

                let changed = diff(&snapshot, &next);
                snapshot = next;

                if !changed.is_empty() {
                    pending.extend(changed);
                    last_change = Some(Instant::now());
                }

                if let Some(at) = last_change {
                    if at.elapsed() >= aggregate {
                        let batch: Vec<PathBuf> = std::mem::take(&mut pending).into_iter().collect();
                        last_change = None;
                        debug!("Emitting change batch of {} path(s)", batch.len());
                        if tx.send(WatcherMessage::Changed(batch)).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}
