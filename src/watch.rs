//! Keeps a [`MappedCorpus`] in sync with on-disk changes under its root.
//!
//! Adapted from the teacher's global debounced watcher (one watcher observing every repo root
//! and bucketing events by repo) down to one tracker per repository, with a shorter coalesce
//! window and explicit startup sequencing: the watcher is armed, *then* the initial walk runs,
//! *then* whatever arrived on the channel during the walk is drained and applied idempotently.
//! This guarantees a client's `alloc_pid` never returns before edits are actually observable.
//!
//! Event translation follows the teacher's `process_changes`: dispatch on whether a path
//! currently `exists()` rather than on the event's `EventKind`, so create/modify/rename/delete
//! all fall out of the same two-armed check.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::classify;
use crate::corpus::MappedCorpus;

pub const DEFAULT_COALESCE_MS: u64 = 50;

/// Owns the underlying OS watch handle and the debounce thread for one repository. Dropping it
/// stops the watcher and joins the thread.
pub struct ChangeTracker {
    _watcher: RecommendedWatcher,
    stop_tx: mpsc::Sender<()>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl ChangeTracker {
    /// Arms a watcher on `root`, runs the initial walk into `corpus`, drains whatever events
    /// accumulated meanwhile, then hands the channel off to a background debounce loop.
    pub fn start(root: PathBuf, corpus: Arc<MappedCorpus>, coalesce: Duration) -> notify::Result<ChangeTracker> {
        let (tx, rx) = mpsc::channel::<Event>();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                } else if let Err(err) = res {
                    tracing::warn!(error = %err, "watcher delivery error");
                }
            },
            notify::Config::default(),
        )?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        // The watcher is armed; now walk. Any event for a path the walk will itself cover is
        // harmless to apply again afterward, since insert/replace/remove are idempotent.
        for path in crate::corpus::walk_indexable(&root) {
            if let Err(err) = corpus.insert(&path) {
                tracing::warn!(path = %path.display(), error = %err, "failed to map file during initial walk");
            }
        }

        // Drain whatever queued up during the walk before starting steady-state debouncing.
        while let Ok(event) = rx.try_recv() {
            apply_event(&corpus, &event);
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = std::thread::spawn(move || debounce_loop(rx, stop_rx, corpus, coalesce));

        Ok(ChangeTracker { _watcher: watcher, stop_tx, handle: Some(handle) })
    }
}

impl Drop for ChangeTracker {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Buffers events into `pending` keyed by path, bumping the timestamp on every repeat; only once
/// a path has gone quiet for a full `coalesce` window is it actually applied. This is the
/// teacher's own `debounce_loop` shape (buffer on `Ok`, drain-and-process matured entries on
/// `Timeout`) — a burst of modifies on the same path during the window collapses to the single
/// `apply_path` call fired once the burst goes quiet.
fn debounce_loop(
    rx: mpsc::Receiver<Event>,
    stop_rx: mpsc::Receiver<()>,
    corpus: Arc<MappedCorpus>,
    coalesce: Duration,
) {
    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
    loop {
        if stop_rx.try_recv().is_ok() {
            return;
        }
        match rx.recv_timeout(coalesce) {
            Ok(event) => {
                if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)) {
                    let now = Instant::now();
                    for path in &event.paths {
                        pending.insert(path.clone(), now);
                    }
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if pending.is_empty() {
                    continue;
                }
                let cutoff = Instant::now() - coalesce;
                let ready: Vec<PathBuf> =
                    pending.iter().filter(|(_, t)| **t <= cutoff).map(|(p, _)| p.clone()).collect();
                if ready.is_empty() {
                    continue;
                }
                for path in &ready {
                    pending.remove(path);
                }
                for path in &ready {
                    apply_path(&corpus, path);
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => return,
        }
    }
}

/// Translates one filesystem event into corpus mutations by consulting the path's *current*
/// on-disk state rather than trusting the event kind — the same pattern the teacher's own
/// `process_changes` uses, and the only one that gets renames right: a rename surfaces as a
/// `Modify(Name(..))` event carrying the old path (which no longer exists — treated as a
/// removal), the new path (which does — treated as an insert), or both, depending on platform
/// and backend. Trusting `exists()` instead of the specific `EventKind` handles all three
/// shapes uniformly, and is exactly as idempotent as the walk's own insert/replace calls.
fn apply_event(corpus: &MappedCorpus, event: &Event) {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)) {
        return;
    }
    for path in &event.paths {
        apply_path(corpus, path);
    }
}

fn apply_path(corpus: &MappedCorpus, path: &Path) {
    if path.is_dir() {
        for descendant in crate::corpus::walk_indexable(path) {
            if let Err(err) = corpus.insert(&descendant) {
                tracing::warn!(path = %descendant.display(), error = %err, "failed to map file under created directory");
            }
        }
        return;
    }
    if path.is_file() {
        if classify::is_indexable(path) {
            if let Err(err) = corpus.replace(path) {
                tracing::warn!(path = %path.display(), error = %err, "failed to remap changed file");
            }
        }
        return;
    }
    // Path no longer exists: could have been a file (remove it) or a directory (remove every
    // descendant); removing both is harmless since each is a no-op against whichever it wasn't.
    corpus.remove(path);
    corpus.remove_subtree(path);
}
