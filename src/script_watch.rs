use anyhow::{Context, Result};
use log::warn;
use notify::event::ModifyKind;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::Duration;

use crate::package::{normalize_path, SCRIPT_EXTENSION};

/// Reports script files that changed on disk since the last drain.
pub struct ScriptWatcher {
    watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
    roots: Vec<PathBuf>,
}

impl ScriptWatcher {
    pub fn new() -> Result<Self> {
        let (tx, rx) = channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        watcher
            .configure(
                NotifyConfig::default()
                    .with_compare_contents(false)
                    .with_poll_interval(Duration::from_millis(300)),
            )
            .context("configure script watcher")?;
        Ok(Self { watcher, rx, roots: Vec::new() })
    }

    /// Watches a script file or a directory of scripts. Watching the same
    /// root twice is a no-op.
    pub fn watch(&mut self, root: impl AsRef<Path>) -> Result<()> {
        let root = root.as_ref();
        if !root.exists() {
            anyhow::bail!("path '{}' does not exist", root.display());
        }
        let normalized = normalize_path(root);
        if self.roots.contains(&normalized) {
            return Ok(());
        }
        self.watcher
            .watch(&normalized, RecursiveMode::NonRecursive)
            .with_context(|| format!("watch {}", normalized.display()))?;
        self.roots.push(normalized);
        Ok(())
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Changed script paths, deduplicated and sorted.
    pub fn drain_changes(&mut self) -> Vec<PathBuf> {
        let mut changed = BTreeSet::new();
        while let Ok(event) = self.rx.try_recv() {
            match event {
                Ok(event) => {
                    if !is_relevant(&event.kind) {
                        continue;
                    }
                    for path in event.paths {
                        if self.is_watched_script(&path) {
                            changed.insert(normalize_path(&path));
                        }
                    }
                }
                Err(err) => warn!("[script] watcher error: {err}"),
            }
        }
        changed.into_iter().collect()
    }

    fn is_watched_script(&self, path: &Path) -> bool {
        let normalized = normalize_path(path);
        is_script(&normalized) && self.roots.iter().any(|root| normalized.starts_with(root))
    }
}

fn is_script(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()).is_some_and(|ext| ext.eq_ignore_ascii_case(SCRIPT_EXTENSION))
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Create(_)
    )
}
