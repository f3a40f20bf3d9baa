//! The IPC multiplexer: accepts persistent client connections on one well-known request
//! socket, hands each a per-client response socket, and dispatches `alloc_pid` /
//! `request_ripgrep` frames against the shared [`RepoRegistry`].
//!
//! No precedent for Unix-domain sockets exists in the teacher's own code (it speaks HTTP via
//! axum over TCP), so this module leans on the `tokio::net` Unix counterparts of the same
//! `tokio` runtime the teacher already depends on, following the same one-task-per-connection
//! shape as its HTTP server.

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use crate::config::DaemonConfig;
use crate::protocol::{Request, Response};
use crate::repo::{RepoRegistry, Repository};

/// Per-connection state machine: UNBOUND until a successful `alloc_pid`, BOUND afterward.
enum ClientState {
    Unbound,
    Bound { repo: Arc<Repository>, pid: u32, response: UnixStream },
}

/// Binds the request socket (removing any stale file left by an unclean shutdown) and serves
/// connections until the process is asked to stop.
pub async fn run(config: Arc<DaemonConfig>, registry: Arc<RepoRegistry>) -> std::io::Result<()> {
    unlink_if_present(&config.request_socket);
    let listener = UnixListener::bind(&config.request_socket)?;
    tracing::info!(path = %config.request_socket.display(), "listening for clients");

    loop {
        let (stream, _addr) = listener.accept().await?;
        let config = Arc::clone(&config);
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            if let Err(err) = handle_client(stream, config, registry).await {
                tracing::warn!(error = %err, "client connection ended with an error");
            }
        });
    }
}

fn unlink_if_present(path: &Path) {
    if path.exists() {
        if let Err(err) = std::fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %err, "failed to remove stale socket");
        }
    }
}

async fn handle_client(
    stream: UnixStream,
    config: Arc<DaemonConfig>,
    registry: Arc<RepoRegistry>,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let mut state = ClientState::Unbound;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request = match Request::parse(&line) {
            Ok(req) => req,
            Err(message) => {
                reply(&mut state, &mut write_half, Response::err(message)).await?;
                continue;
            }
        };

        match request {
            Request::AllocPid { pid, repo_dir_path } => {
                handle_alloc_pid(&mut state, &mut write_half, &config, &registry, pid, repo_dir_path).await?;
            }
            Request::RequestRipgrep { pid, pattern, case_sensitive } => {
                handle_ripgrep(&mut state, &mut write_half, &config, pid, pattern, case_sensitive).await?;
            }
        }
    }

    if let ClientState::Bound { repo, .. } = &state {
        registry.release(&repo.root);
    }
    Ok(())
}

async fn handle_alloc_pid(
    state: &mut ClientState,
    write_half: &mut tokio::net::unix::OwnedWriteHalf,
    config: &DaemonConfig,
    registry: &RepoRegistry,
    pid: u32,
    repo_dir_path: String,
) -> std::io::Result<()> {
    if matches!(state, ClientState::Bound { .. }) {
        // No response socket context beyond the one already established; report on it.
        reply(state, write_half, Response::err("pid already allocated")).await?;
        return Ok(());
    }

    let root = match RepoRegistry::canonicalize_repo_path(&repo_dir_path) {
        Ok(root) => root,
        Err(message) => {
            // Failure before a response socket exists is reported on the request socket itself.
            write_half.write_all(Response::err(message).to_framed_line().as_bytes()).await?;
            return Ok(());
        }
    };

    let repo = match registry.acquire(root) {
        Ok(repo) => repo,
        Err(message) => {
            write_half.write_all(Response::err(message).to_framed_line().as_bytes()).await?;
            return Ok(());
        }
    };

    let response_path = config.response_socket_for(pid);
    unlink_if_present(&response_path);
    let listener = match UnixListener::bind(&response_path) {
        Ok(l) => l,
        Err(err) => {
            registry.release(&repo.root);
            let message = format!("failed to create response socket {}: {err}", response_path.display());
            write_half.write_all(Response::err(message).to_framed_line().as_bytes()).await?;
            return Ok(());
        }
    };

    // The client connects back to us once it sees this socket exist; it retries with backoff,
    // so accepting here simply waits for that to happen.
    let (mut response_stream, _) = match listener.accept().await {
        Ok(pair) => pair,
        Err(err) => {
            registry.release(&repo.root);
            tracing::warn!(pid, error = %err, "client never connected to its response socket");
            return Ok(());
        }
    };

    response_stream
        .write_all(Response::ok(format!("allocated {}", repo.root.display())).to_framed_line().as_bytes())
        .await?;

    *state = ClientState::Bound { repo, pid, response: response_stream };
    Ok(())
}

async fn handle_ripgrep(
    state: &mut ClientState,
    write_half: &mut tokio::net::unix::OwnedWriteHalf,
    config: &DaemonConfig,
    pid: u32,
    pattern: String,
    case_sensitive: bool,
) -> std::io::Result<()> {
    let (repo, bound_pid) = match state {
        ClientState::Bound { repo, pid, .. } => (Arc::clone(repo), *pid),
        ClientState::Unbound => {
            write_half
                .write_all(
                    Response::err("no codebase allocated; call alloc_pid first").to_framed_line().as_bytes(),
                )
                .await?;
            return Ok(());
        }
    };

    if bound_pid != pid {
        reply(state, write_half, Response::err("pid does not match the bound allocation")).await?;
        return Ok(());
    }

    let response = match crate::search::search(&repo.corpus, &pattern, case_sensitive, config.max_results) {
        Ok(result) => {
            let text = crate::search::format_matches(&repo.root, &pattern, &result, config.max_results);
            Response::ok(text)
        }
        Err(message) => Response::err(message),
    };

    reply(state, write_half, response).await?;
    Ok(())
}

/// Writes `response` to the client's response socket once bound, falling back to the request
/// socket for protocol errors raised before any allocation has succeeded.
async fn reply(
    state: &mut ClientState,
    write_half: &mut tokio::net::unix::OwnedWriteHalf,
    response: Response,
) -> std::io::Result<()> {
    match state {
        ClientState::Bound { response: stream, .. } => {
            stream.write_all(response.to_framed_line().as_bytes()).await
        }
        ClientState::Unbound => write_half.write_all(response.to_framed_line().as_bytes()).await,
    }
}
