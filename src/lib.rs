//! Resident in-memory codebase search daemon.
//!
//! Memory-maps a repository's text files once and serves repeated regex searches over that
//! corpus to client processes over local Unix-domain sockets, keeping the corpus in sync with
//! filesystem changes via a watcher. See `SPEC_FULL.md` for the full contract.

pub mod classify;
pub mod config;
pub mod corpus;
pub mod ipc;
pub mod protocol;
pub mod repo;
pub mod search;
pub mod watch;

pub use config::{Cli, DaemonConfig};
pub use repo::RepoRegistry;
