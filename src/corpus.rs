//! The live, memory-mapped view of one repository's indexable files.
//!
//! [`MappedCorpus`] holds an `ArcSwap`-style snapshot of a path-ordered map so that scans
//! (readers) and filesystem-driven mutations (the single writer) never block each other: a
//! scan clones the current `Arc` — a refcount bump — and iterates without holding any lock.
//! A [`MappedFile`]'s mapping is torn down only once the last `Arc` referencing it drops, so a
//! file removed mid-scan stays valid for any snapshot still using it.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use memmap2::Mmap;

use crate::classify;

/// Per-file ceiling; files larger than this are skipped rather than mapped.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 64 * 1024 * 1024;

/// One indexed file: its mapping, and a generation bumped every time the mapping is replaced.
pub struct MappedFile {
    pub path: PathBuf,
    mmap: Mmap,
    generation: u64,
}

impl MappedFile {
    fn open(path: &Path, generation: u64) -> std::io::Result<Option<MappedFile>> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(None);
        }
        // SAFETY: the file is opened read-only for the lifetime of this mapping; the service
        // tolerates external truncation racing the mapping (the OS will SIGBUS on access in the
        // pathological case, which is an acceptable risk for a local dev-tooling daemon — the
        // same risk the reference Python implementation accepts).
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Some(MappedFile { path: path.to_path_buf(), mmap, generation }))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }
}

type Table = BTreeMap<PathBuf, Arc<MappedFile>>;

/// The set of currently-mapped files for one repository.
pub struct MappedCorpus {
    root: PathBuf,
    max_file_bytes: u64,
    table: RwLock<Arc<Table>>,
    next_generation: AtomicU64,
}

impl MappedCorpus {
    pub fn new(root: PathBuf, max_file_bytes: u64) -> Self {
        MappedCorpus {
            root,
            max_file_bytes,
            table: RwLock::new(Arc::new(BTreeMap::new())),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Builds the corpus by walking `root` once, pruning skipped directories and mapping every
    /// eligible file. Per-file failures are logged and skipped; they never fail the walk.
    pub fn build(root: PathBuf, max_file_bytes: u64) -> Self {
        let corpus = MappedCorpus::new(root.clone(), max_file_bytes);
        let paths = walk_indexable(&root);
        for path in paths {
            if let Err(err) = corpus.insert(&path) {
                tracing::warn!(path = %path.display(), error = %err, "failed to map file during initial walk");
            }
        }
        corpus
    }

    /// A cheap, consistent view of the corpus for one scan. Does not block mutations.
    pub fn snapshot(&self) -> Arc<Table> {
        Arc::clone(&self.table.read().expect("corpus table lock poisoned"))
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    fn alloc_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    /// Maps `path` and adds it to the corpus. No-op (but not an error) if the path isn't
    /// indexable, doesn't exist, or is zero-length. Overwrites any existing entry at the key.
    pub fn insert(&self, path: &Path) -> std::io::Result<()> {
        if !classify::is_indexable(path) {
            return Ok(());
        }
        let meta = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        if !meta.is_file() || meta.len() > self.max_file_bytes {
            if meta.is_file() {
                tracing::warn!(path = %path.display(), len = meta.len(), "skipping oversized file");
            }
            return Ok(());
        }
        let generation = self.alloc_generation();
        let mapped = match MappedFile::open(path, generation)? {
            Some(m) => m,
            None => return Ok(()), // zero-length
        };
        let mut guard = self.table.write().expect("corpus table lock poisoned");
        let mut next = (**guard).clone();
        next.insert(path.to_path_buf(), Arc::new(mapped));
        *guard = Arc::new(next);
        Ok(())
    }

    /// Equivalent to remove-then-insert, but atomic from a scanner's point of view — no gap is
    /// ever observable between the old and new mapping.
    pub fn replace(&self, path: &Path) -> std::io::Result<()> {
        self.insert(path)
    }

    /// Drops `path` from the corpus. The old `Arc<MappedFile>`'s mapping is torn down only once
    /// every snapshot referencing it has also been dropped.
    pub fn remove(&self, path: &Path) {
        let mut guard = self.table.write().expect("corpus table lock poisoned");
        if !guard.contains_key(path) {
            return;
        }
        let mut next = (**guard).clone();
        next.remove(path);
        *guard = Arc::new(next);
    }

    /// Removes every entry whose path is `dir` or a descendant of it.
    pub fn remove_subtree(&self, dir: &Path) {
        let mut guard = self.table.write().expect("corpus table lock poisoned");
        let mut next = (**guard).clone();
        next.retain(|p, _| !p.starts_with(dir));
        *guard = Arc::new(next);
    }
}

/// Walks `root` depth-first, pruning at [`classify::is_skipped_dir`], returning every path that
/// [`classify::is_indexable`] accepts. Symlinks are never followed, which both avoids indexing
/// files outside the tree implicitly and sidesteps symlink cycles entirely.
pub fn walk_indexable(root: &Path) -> Vec<PathBuf> {
    use ignore::WalkBuilder;

    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(false)
        .follow_links(false)
        .standard_filters(false)
        .filter_entry(|entry| {
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                let name = entry.file_name().to_string_lossy();
                return !classify::is_skipped_dir(&name);
            }
            true
        });

    builder
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.into_path())
        .filter(|path| classify::is_indexable(path))
        .collect()
}
