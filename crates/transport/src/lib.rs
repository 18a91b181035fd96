//! Uniform remote filesystem and command-execution interface.
//!
//! One [`Transport`] contract, two backends: [`shell::ShellTransport`]
//! holds a single persistent interactive shell session for the
//! connection's lifetime; [`gateway::GatewayTransport`] performs
//! stateless REST calls against a provider gateway, logging in once per
//! logical connection. The backend is selected from the owning cluster's
//! declared type when the [`ConnectionProfile`] is built, never by
//! inspecting the backend at runtime.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

pub mod gateway;
pub mod shell;

/// Errors raised by remote operations, common to both backends.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The remote path does not exist.
    #[error("remote path not found: {0}")]
    NotFound(String),

    /// The remote side refused the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A remote command exited nonzero.
    #[error("command failed with exit code {exit_code}: {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    /// The remote call exceeded its configured bound.
    #[error("remote call timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// Operation attempted on a closed or expired connection.
    #[error("connection is closed")]
    Closed,

    /// The gateway returned an error status outside the mapped set.
    #[error("gateway error ({status}): {message}")]
    Gateway { status: u16, message: String },

    /// The remote side sent something we could not make sense of.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The request itself failed (connection refused, DNS, TLS).
    #[error("request failed: {0}")]
    Request(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Metadata for a remote path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// File size in bytes; zero for directories.
    pub size: u64,
    pub is_dir: bool,
}

/// A scoped, readable handle on remote file content.
///
/// Dropping the stream releases whatever the backend holds for it.
pub struct FileStream {
    inner: Box<dyn AsyncRead + Send + Unpin>,
}

impl FileStream {
    pub(crate) fn new(inner: Box<dyn AsyncRead + Send + Unpin>) -> Self {
        Self { inner }
    }

    pub(crate) fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::new(Box::new(std::io::Cursor::new(bytes)))
    }

    /// Drain the stream into a buffer.
    pub async fn read_to_end(mut self) -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.inner.read_to_end(&mut buf).await?;
        Ok(buf)
    }
}

impl std::fmt::Debug for FileStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStream").finish_non_exhaustive()
    }
}

impl AsyncRead for FileStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

/// Remote filesystem and command execution over one connection.
///
/// Every operation on a closed or expired connection fails fast with
/// [`TransportError::Closed`]; nothing hangs or silently no-ops. All
/// remote calls are bounded by the timeout the connection was opened
/// with.
#[async_trait]
pub trait Transport: Send {
    /// Upload `content` to `remote_path`, overwriting an existing file.
    async fn put(&mut self, content: &[u8], remote_path: &str) -> Result<(), TransportError>;

    /// Stream the content of `remote_path`. Fails `NotFound` if absent.
    async fn get(&mut self, remote_path: &str) -> Result<FileStream, TransportError>;

    /// Create a directory and any missing parents. Idempotent when the
    /// path is already a directory.
    async fn mkdir(&mut self, remote_path: &str) -> Result<(), TransportError>;

    /// Whether `remote_path` is a regular file. Returns `false` for
    /// directories and nonexistent paths; never errors on absence.
    async fn isfile(&mut self, remote_path: &str) -> Result<bool, TransportError>;

    /// Metadata for `remote_path`. Fails `NotFound` if absent.
    async fn stat(&mut self, remote_path: &str) -> Result<FileStat, TransportError>;

    /// Run a command, returning trimmed stdout. A nonzero exit raises
    /// [`TransportError::CommandFailed`] with the captured stderr.
    async fn execute(&mut self, command: &str) -> Result<String, TransportError>;

    /// Delete a file. A subsequent `stat` on the path fails `NotFound`.
    async fn remove(&mut self, remote_path: &str) -> Result<(), TransportError>;

    /// Release the connection. Further operations fail `Closed`.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// How to reach a cluster's backend, derived from the cluster's declared
/// type by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionProfile {
    /// Persistent interactive shell session driven over the stdin/stdout
    /// of a spawned process.
    Shell { program: String, args: Vec<String> },
    /// Stateless gateway REST API with a login/session-id exchange.
    Gateway {
        base_url: String,
        host: String,
        username: String,
        password: String,
    },
}

impl ConnectionProfile {
    /// Shell session over `ssh` to a remote head node.
    pub fn ssh(username: &str, hostname: &str) -> Self {
        Self::Shell {
            program: "ssh".to_string(),
            args: vec![
                "-T".to_string(),
                "-o".to_string(),
                "BatchMode=yes".to_string(),
                format!("{username}@{hostname}"),
                "sh".to_string(),
            ],
        }
    }

    /// Shell session on the local host, without a remote hop.
    pub fn local_shell() -> Self {
        Self::Shell {
            program: "sh".to_string(),
            args: Vec::new(),
        }
    }
}

/// Open a connection for the given profile.
pub async fn connect(
    profile: &ConnectionProfile,
    timeout: Duration,
) -> Result<Box<dyn Transport>, TransportError> {
    match profile {
        ConnectionProfile::Shell { program, args } => Ok(Box::new(
            shell::ShellTransport::connect(program, args, timeout).await?,
        )),
        ConnectionProfile::Gateway {
            base_url,
            host,
            username,
            password,
        } => Ok(Box::new(
            gateway::GatewayTransport::connect(base_url, host, username, password, timeout)
                .await?,
        )),
    }
}

/// Scoped connection acquisition: connect, run `f`, and close on every
/// exit path. The operation's error wins over any close error; a close
/// failure after a successful operation is logged and swallowed.
pub async fn with_connection<T, F>(
    profile: &ConnectionProfile,
    timeout: Duration,
    f: F,
) -> Result<T, TransportError>
where
    F: for<'a> FnOnce(&'a mut dyn Transport) -> BoxFuture<'a, Result<T, TransportError>>,
{
    let mut conn = connect(profile, timeout).await?;
    let result = f(conn.as_mut()).await;
    if let Err(e) = conn.close().await {
        tracing::warn!(error = %e, "Failed to close transport connection");
    }
    result
}

/// Single-quote a path for inclusion in a shell command line.
pub(crate) fn shell_quote(path: &str) -> String {
    format!("'{}'", path.replace('\'', r"'\''"))
}

/// Map a nonzero command exit to the taxonomy: permission problems get
/// their own variant, everything else keeps the exit code and stderr.
pub(crate) fn classify_exit(exit_code: i32, stderr: String) -> TransportError {
    if stderr.contains("Permission denied") {
        TransportError::PermissionDenied(stderr.trim().to_string())
    } else {
        TransportError::CommandFailed { exit_code, stderr }
    }
}
