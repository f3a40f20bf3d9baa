//! Test harness for end-to-end IPC scenarios.
//!
//! Spins up the daemon's accept loop on throwaway socket paths inside a temp dir and drives it
//! with a small client that mirrors the reference `curserve_client.py` handshake: one
//! persistent connection to the request socket, a server-created response socket connected to
//! afterward, both framed as single-line JSON.

pub mod fixtures;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mem_search_service::config::DaemonConfig;
use mem_search_service::repo::RepoRegistry;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

pub struct ServiceHarness {
    pub config: Arc<DaemonConfig>,
    _sockets_dir: TempDir,
    _repo_dir: TempDir,
}

impl ServiceHarness {
    /// Starts the accept loop in the background on fresh socket paths and returns a harness
    /// plus the (already populated) repository root a client can allocate against.
    pub async fn start() -> (ServiceHarness, PathBuf) {
        ServiceHarness::start_with(|_| {}).await
    }

    /// Like [`ServiceHarness::start`], but lets the caller tweak the config (e.g. `max_results`)
    /// before the accept loop is spawned.
    pub async fn start_with(customize: impl FnOnce(&mut DaemonConfig)) -> (ServiceHarness, PathBuf) {
        let sockets_dir = TempDir::new().expect("temp dir for sockets");
        let repo_dir = TempDir::new().expect("temp dir for repo");

        let mut config = DaemonConfig::default();
        config.request_socket = sockets_dir.path().join("requests.sock");
        config.response_socket_template =
            sockets_dir.path().join("response_{pid}.sock").to_string_lossy().to_string();
        config.coalesce = Duration::from_millis(20);
        customize(&mut config);
        let config = Arc::new(config);

        let registry = Arc::new(RepoRegistry::new(config.max_file_bytes, config.coalesce));
        let run_config = Arc::clone(&config);
        tokio::spawn(async move {
            let _ = mem_search_service::ipc::run(run_config, registry).await;
        });

        // Give the accept loop a moment to bind before any client dials in.
        wait_for_socket(&config.request_socket).await;

        let root = repo_dir.path().to_path_buf();
        (ServiceHarness { config, _sockets_dir: sockets_dir, _repo_dir: repo_dir }, root)
    }
}

async fn wait_for_socket(path: &std::path::Path) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !path.exists() {
        if tokio::time::Instant::now() > deadline {
            panic!("socket {} never appeared", path.display());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// A minimal stand-in for the reference Python client, speaking the same two-socket handshake.
pub struct TestClient {
    pid: u32,
    request: UnixStream,
    response: Option<tokio::io::BufReader<tokio::net::unix::OwnedReadHalf>>,
    response_write: Option<tokio::net::unix::OwnedWriteHalf>,
    config: Arc<DaemonConfig>,
}

impl TestClient {
    pub async fn connect(config: Arc<DaemonConfig>, pid: u32) -> TestClient {
        let request = UnixStream::connect(&config.request_socket).await.expect("connect request socket");
        TestClient { pid, request, response: None, response_write: None, config }
    }

    pub async fn alloc_pid(&mut self, repo_dir_path: &PathBuf) -> serde_json::Value {
        let req = serde_json::json!({
            "type": "alloc_pid",
            "pid": self.pid,
            "repo_dir_path": repo_dir_path.to_string_lossy(),
        });
        self.request.write_all(format!("{req}\n").as_bytes()).await.unwrap();

        let response_path = self.config.response_socket_for(self.pid);
        let stream = connect_with_retry(&response_path).await;
        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let line = read_line(&mut reader).await;
        self.response = Some(reader);
        self.response_write = Some(write_half);
        serde_json::from_str(&line).unwrap()
    }

    pub async fn ripgrep(&mut self, pattern: &str, case_sensitive: bool) -> serde_json::Value {
        let req = serde_json::json!({
            "type": "request_ripgrep",
            "pid": self.pid,
            "pattern": pattern,
            "case_sensitive": case_sensitive,
        });
        self.request.write_all(format!("{req}\n").as_bytes()).await.unwrap();
        let reader = self.response.as_mut().expect("must alloc_pid before searching");
        let line = read_line(reader).await;
        serde_json::from_str(&line).unwrap()
    }

    /// Sends a second `alloc_pid` on a connection that's already bound — the daemon replies on
    /// the existing response socket rather than opening a new one, since no response socket is
    /// freshly created for an already-bound client.
    pub async fn realloc_pid_while_bound(&mut self, repo_dir_path: &PathBuf) -> serde_json::Value {
        let req = serde_json::json!({
            "type": "alloc_pid",
            "pid": self.pid,
            "repo_dir_path": repo_dir_path.to_string_lossy(),
        });
        self.request.write_all(format!("{req}\n").as_bytes()).await.unwrap();
        let reader = self.response.as_mut().expect("must alloc_pid before re-allocating");
        let line = read_line(reader).await;
        serde_json::from_str(&line).unwrap()
    }

    /// Sends `request_ripgrep` without ever having bound — reply arrives on the request socket
    /// itself since no response socket exists yet.
    pub async fn ripgrep_unbound(&mut self, pattern: &str) -> serde_json::Value {
        let req = serde_json::json!({
            "type": "request_ripgrep",
            "pid": self.pid,
            "pattern": pattern,
            "case_sensitive": false,
        });
        self.request.write_all(format!("{req}\n").as_bytes()).await.unwrap();
        let mut reader = BufReader::new(&mut self.request);
        let line = read_line(&mut reader).await;
        serde_json::from_str(&line).unwrap()
    }
}

async fn read_line<R: tokio::io::AsyncBufRead + Unpin>(reader: &mut R) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).await.expect("read response line");
    line
}

async fn connect_with_retry(path: &std::path::Path) -> UnixStream {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        match UnixStream::connect(path).await {
            Ok(stream) => return stream,
            Err(_) if tokio::time::Instant::now() < deadline => {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            Err(err) => panic!("never connected to response socket {}: {err}", path.display()),
        }
    }
}
