//! Runtime configuration: CLI flags layered over an optional TOML file layered over built-in
//! defaults, mirroring the teacher's `ScanConfig::new` defaulting pattern and its
//! `.codescope.toml`-style on-disk override file.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

const DEFAULT_REQUEST_SOCKET: &str = "/tmp/mem_search_service_requests.sock";
const DEFAULT_RESPONSE_SOCKET_TEMPLATE: &str = "/tmp/qwen_code_response_{pid}.sock";

#[derive(Parser, Debug)]
#[command(name = "mem-search-service", about = "Resident in-memory codebase search daemon")]
pub struct Cli {
    /// Path to a TOML config file layered between defaults and these flags.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Path to the well-known request socket.
    #[arg(long)]
    pub request_socket: Option<PathBuf>,

    /// `{pid}`-templated path for per-client response sockets.
    #[arg(long)]
    pub response_socket_template: Option<String>,

    /// Default cap on the number of matches returned by one search.
    #[arg(long)]
    pub max_results: Option<usize>,

    /// Per-file ceiling, in bytes, above which a file is skipped rather than mapped.
    #[arg(long)]
    pub max_file_bytes: Option<u64>,

    /// Filesystem-event coalescing window, in milliseconds.
    #[arg(long)]
    pub coalesce_ms: Option<u64>,

    /// `tracing_subscriber::EnvFilter` directive; overrides `RUST_LOG` when set.
    #[arg(long)]
    pub log_filter: Option<String>,
}

/// On-disk override file, every field optional — only present keys override the running
/// default.
#[derive(Deserialize, Default)]
struct FileConfig {
    request_socket: Option<PathBuf>,
    response_socket_template: Option<String>,
    max_results: Option<usize>,
    max_file_bytes: Option<u64>,
    coalesce_ms: Option<u64>,
    log_filter: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub request_socket: PathBuf,
    pub response_socket_template: String,
    pub max_results: usize,
    pub max_file_bytes: u64,
    pub coalesce: Duration,
    pub log_filter: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        DaemonConfig {
            request_socket: PathBuf::from(DEFAULT_REQUEST_SOCKET),
            response_socket_template: DEFAULT_RESPONSE_SOCKET_TEMPLATE.to_string(),
            max_results: 1000,
            max_file_bytes: crate::corpus::DEFAULT_MAX_FILE_BYTES,
            coalesce: Duration::from_millis(crate::watch::DEFAULT_COALESCE_MS),
            log_filter: "info".to_string(),
        }
    }
}

impl DaemonConfig {
    /// Renders the per-client response socket path for `pid`, substituting the template's
    /// single `{pid}` placeholder.
    pub fn response_socket_for(&self, pid: u32) -> PathBuf {
        PathBuf::from(self.response_socket_template.replace("{pid}", &pid.to_string()))
    }

    /// Builds the effective config: defaults, then an optional TOML file, then CLI flags —
    /// each layer only overriding fields it actually specifies.
    pub fn load(cli: &Cli) -> Result<DaemonConfig, String> {
        let mut cfg = DaemonConfig::default();

        if let Some(path) = &cli.config {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("failed to read config file {}: {e}", path.display()))?;
            let file: FileConfig = toml::from_str(&text)
                .map_err(|e| format!("failed to parse config file {}: {e}", path.display()))?;
            cfg.apply_file(file);
        }

        cfg.apply_cli(cli);
        Ok(cfg)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.request_socket {
            self.request_socket = v;
        }
        if let Some(v) = file.response_socket_template {
            self.response_socket_template = v;
        }
        if let Some(v) = file.max_results {
            self.max_results = v;
        }
        if let Some(v) = file.max_file_bytes {
            self.max_file_bytes = v;
        }
        if let Some(v) = file.coalesce_ms {
            self.coalesce = Duration::from_millis(v);
        }
        if let Some(v) = file.log_filter {
            self.log_filter = v;
        }
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(v) = &cli.request_socket {
            self.request_socket = v.clone();
        }
        if let Some(v) = &cli.response_socket_template {
            self.response_socket_template = v.clone();
        }
        if let Some(v) = cli.max_results {
            self.max_results = v;
        }
        if let Some(v) = cli.max_file_bytes {
            self.max_file_bytes = v;
        }
        if let Some(v) = cli.coalesce_ms {
            self.coalesce = Duration::from_millis(v);
        }
        if let Some(v) = &cli.log_filter {
            self.log_filter = v.clone();
        }
    }
}
