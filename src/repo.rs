//! Repository lifecycle: one [`Repository`] per distinct codebase a client has bound to,
//! created on first reference and torn down when the last referencing client disconnects.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::corpus::MappedCorpus;
use crate::watch::ChangeTracker;

/// A single allocated codebase: its corpus and the tracker keeping it live.
pub struct Repository {
    pub root: PathBuf,
    pub corpus: Arc<MappedCorpus>,
    _tracker: ChangeTracker,
    refcount: AtomicUsize,
}

impl Repository {
    fn open(root: PathBuf, max_file_bytes: u64, coalesce: Duration) -> notify::Result<Repository> {
        let corpus = Arc::new(MappedCorpus::new(root.clone(), max_file_bytes));
        // ChangeTracker::start performs the initial walk itself, after arming the watcher, so
        // alloc_pid can't return success until both the corpus is populated and the watcher is
        // live — satisfying the spec's "next edit is observed" guarantee.
        let tracker = ChangeTracker::start(root.clone(), Arc::clone(&corpus), coalesce)?;
        Ok(Repository { root, corpus, _tracker: tracker, refcount: AtomicUsize::new(0) })
    }
}

/// Tracks live repositories by canonical root path, refcounted by bound client.
pub struct RepoRegistry {
    max_file_bytes: u64,
    coalesce: Duration,
    repos: Mutex<HashMap<PathBuf, Arc<Repository>>>,
}

impl RepoRegistry {
    pub fn new(max_file_bytes: u64, coalesce: Duration) -> Self {
        RepoRegistry { max_file_bytes, coalesce, repos: Mutex::new(HashMap::new()) }
    }

    /// Returns the canonicalised, existing-directory form of `path`, or an error string
    /// suitable for returning straight to a client.
    pub fn canonicalize_repo_path(path: &str) -> Result<PathBuf, String> {
        let root = Path::new(path);
        let canon = root
            .canonicalize()
            .map_err(|_| format!("repository path does not exist: {path}"))?;
        if !canon.is_dir() {
            return Err(format!("repository path is not a directory: {path}"));
        }
        Ok(canon)
    }

    /// Acquires a reference to the repository at `root`, creating (and starting a tracker for)
    /// it on first use.
    pub fn acquire(&self, root: PathBuf) -> Result<Arc<Repository>, String> {
        let mut guard = self.repos.lock().expect("repo registry lock poisoned");
        if let Some(repo) = guard.get(&root) {
            repo.refcount.fetch_add(1, Ordering::SeqCst);
            return Ok(Arc::clone(repo));
        }
        let repo = Repository::open(root.clone(), self.max_file_bytes, self.coalesce)
            .map_err(|e| format!("failed to start watcher for {}: {e}", root.display()))?;
        repo.refcount.store(1, Ordering::SeqCst);
        let repo = Arc::new(repo);
        guard.insert(root, Arc::clone(&repo));
        Ok(repo)
    }

    /// Releases a client's reference; the repository is dropped (unmapping everything and
    /// stopping its watcher) once the last reference goes away.
    pub fn release(&self, root: &Path) {
        let mut guard = self.repos.lock().expect("repo registry lock poisoned");
        let should_remove = match guard.get(root) {
            Some(repo) => repo.refcount.fetch_sub(1, Ordering::SeqCst) == 1,
            None => false,
        };
        if should_remove {
            guard.remove(root);
        }
    }

    #[cfg(test)]
    pub fn live_count(&self) -> usize {
        self.repos.lock().expect("repo registry lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn acquire_and_release_tears_down_on_last_reference() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "hello\n").unwrap();
        let registry = RepoRegistry::new(crate::corpus::DEFAULT_MAX_FILE_BYTES, Duration::from_millis(50));
        let root = RepoRegistry::canonicalize_repo_path(tmp.path().to_str().unwrap()).unwrap();

        let r1 = registry.acquire(root.clone()).unwrap();
        let r2 = registry.acquire(root.clone()).unwrap();
        assert_eq!(registry.live_count(), 1);
        assert_eq!(r1.corpus.len(), 1);
        drop(r2);

        registry.release(&root);
        assert_eq!(registry.live_count(), 1);
        registry.release(&root);
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn missing_path_is_a_clean_error() {
        let err = RepoRegistry::canonicalize_repo_path("/no/such/path/anywhere").unwrap_err();
        assert!(err.contains("does not exist"));
    }
}
