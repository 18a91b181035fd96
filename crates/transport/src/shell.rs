//! Interactive-shell transport backend.
//!
//! Holds one shell process (locally spawned, or `ssh <host> sh` for a
//! remote head node) for the connection's lifetime and drives it over
//! stdin/stdout. Each operation runs as a command group whose stdout,
//! stderr, and exit code are captured into a per-session scratch
//! directory and read back under unique sentinel markers, so results
//! from consecutive operations can never bleed into each other. File
//! content crosses the pipe base64-encoded, keeping transfers
//! binary-safe.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::{
    classify_exit, shell_quote, FileStat, FileStream, Transport, TransportError,
};

/// Output of one sentinel-framed command exchange.
struct Exchange {
    exit_code: i32,
    stdout: String,
    stderr: String,
}

/// A persistent interactive shell session.
///
/// The child is spawned with `kill_on_drop`, so cancellation of the
/// owning task still releases the underlying process. A session that
/// times out or reaches EOF is marked closed; every subsequent
/// operation fails fast with [`TransportError::Closed`].
pub struct ShellTransport {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    timeout: Duration,
    closed: bool,
}

impl ShellTransport {
    /// Spawn the session shell and initialize its scratch directory.
    pub async fn connect(
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Protocol("session shell has no stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Protocol("session shell has no stdout".into()))?;

        let mut session = Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            timeout,
            closed: false,
        };

        // Per-session scratch directory for output capture. If mktemp
        // fails the shell exits and the probe below sees EOF.
        session
            .send("__nimbus_tmp=$(mktemp -d) || exit 1\n")
            .await?;
        let probe = session.run("test -d \"$__nimbus_tmp\"").await?;
        if probe.exit_code != 0 {
            return Err(TransportError::Protocol(
                "failed to initialize session scratch directory".into(),
            ));
        }

        tracing::debug!(program, "Shell session established");
        Ok(session)
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }

    async fn send(&mut self, script: &str) -> Result<(), TransportError> {
        if self.stdin.write_all(script.as_bytes()).await.is_err()
            || self.stdin.flush().await.is_err()
        {
            self.closed = true;
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    /// Run `command` in the session under the sentinel protocol.
    ///
    /// The command group reads from `/dev/null` so a command that
    /// expects stdin cannot consume the protocol stream.
    async fn run(&mut self, command: &str) -> Result<Exchange, TransportError> {
        self.ensure_open()?;

        let marker = uuid::Uuid::new_v4().simple().to_string();
        let script = format!(
            "{{\n{command}\n}} </dev/null >\"$__nimbus_tmp/out\" 2>\"$__nimbus_tmp/err\"\n\
             printf '__nimbus_rc {marker} %s\\n' \"$?\"\n\
             cat \"$__nimbus_tmp/out\"\n\
             printf '\\n__nimbus_out {marker}\\n'\n\
             cat \"$__nimbus_tmp/err\"\n\
             printf '\\n__nimbus_err {marker}\\n'\n"
        );

        let start = Instant::now();
        match tokio::time::timeout(self.timeout, self.exchange(&script, &marker)).await {
            Ok(result) => result,
            Err(_) => {
                // The stream is desynchronized once a command overruns
                // its bound; the session cannot be trusted afterwards.
                self.closed = true;
                Err(TransportError::Timeout {
                    elapsed_ms: start.elapsed().as_millis() as u64,
                })
            }
        }
    }

    async fn exchange(&mut self, script: &str, marker: &str) -> Result<Exchange, TransportError> {
        self.send(script).await?;

        let rc_prefix = format!("__nimbus_rc {marker} ");
        let out_marker = format!("__nimbus_out {marker}");
        let err_marker = format!("__nimbus_err {marker}");

        let exit_code: i32 = loop {
            let line = self.read_line().await?;
            if let Some(rest) = line.strip_prefix(&rc_prefix) {
                break rest.trim().parse().map_err(|_| {
                    TransportError::Protocol(format!("unparseable exit code: {rest:?}"))
                })?;
            }
        };
        let stdout = self.read_section(&out_marker).await?;
        let stderr = self.read_section(&err_marker).await?;

        Ok(Exchange {
            exit_code,
            stdout,
            stderr,
        })
    }

    async fn read_line(&mut self) -> Result<String, TransportError> {
        let mut buf = String::new();
        let n = self.reader.read_line(&mut buf).await?;
        if n == 0 {
            self.closed = true;
            return Err(TransportError::Closed);
        }
        while buf.ends_with('\n') || buf.ends_with('\r') {
            buf.pop();
        }
        Ok(buf)
    }

    /// Collect lines until the marker. The protocol injects one newline
    /// before each marker, so a single trailing empty line is framing,
    /// not content.
    async fn read_section(&mut self, marker: &str) -> Result<String, TransportError> {
        let mut lines: Vec<String> = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line == marker {
                if lines.last().is_some_and(|l| l.is_empty()) {
                    lines.pop();
                }
                return Ok(lines.join("\n"));
            }
            lines.push(line);
        }
    }

    /// Run a command, mapping a nonzero exit through [`classify_exit`].
    async fn run_checked(&mut self, command: &str) -> Result<Exchange, TransportError> {
        let exchange = self.run(command).await?;
        if exchange.exit_code != 0 {
            return Err(classify_exit(exchange.exit_code, exchange.stderr));
        }
        Ok(exchange)
    }
}

#[async_trait]
impl Transport for ShellTransport {
    async fn put(&mut self, content: &[u8], remote_path: &str) -> Result<(), TransportError> {
        let encoded = BASE64.encode(content);
        let eof = format!("__NIMBUS_EOF_{}__", uuid::Uuid::new_v4().simple());
        let script = format!(
            "base64 -d > {} <<'{eof}'\n{encoded}\n{eof}",
            shell_quote(remote_path)
        );
        self.run_checked(&script).await?;
        Ok(())
    }

    async fn get(&mut self, remote_path: &str) -> Result<FileStream, TransportError> {
        let q = shell_quote(remote_path);
        let exists = self.run(&format!("test -e {q}")).await?;
        if exists.exit_code != 0 {
            return Err(TransportError::NotFound(remote_path.to_string()));
        }

        let exchange = self.run_checked(&format!("base64 {q}")).await?;
        let cleaned: String = exchange
            .stdout
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let bytes = BASE64
            .decode(cleaned)
            .map_err(|e| TransportError::Protocol(format!("invalid base64 from remote: {e}")))?;
        Ok(FileStream::from_bytes(bytes))
    }

    async fn mkdir(&mut self, remote_path: &str) -> Result<(), TransportError> {
        self.run_checked(&format!("mkdir -p {}", shell_quote(remote_path)))
            .await?;
        Ok(())
    }

    async fn isfile(&mut self, remote_path: &str) -> Result<bool, TransportError> {
        let exchange = self
            .run(&format!("test -f {}", shell_quote(remote_path)))
            .await?;
        Ok(exchange.exit_code == 0)
    }

    async fn stat(&mut self, remote_path: &str) -> Result<FileStat, TransportError> {
        let q = shell_quote(remote_path);
        let probe = self
            .run_checked(&format!(
                "if test -d {q}; then echo dir; elif test -e {q}; then echo file; else echo none; fi"
            ))
            .await?;

        match probe.stdout.trim() {
            "none" => Err(TransportError::NotFound(remote_path.to_string())),
            "dir" => Ok(FileStat {
                size: 0,
                is_dir: true,
            }),
            "file" => {
                let size = self.run_checked(&format!("wc -c < {q}")).await?;
                let size = size.stdout.trim().parse().map_err(|_| {
                    TransportError::Protocol(format!(
                        "unparseable file size: {:?}",
                        size.stdout
                    ))
                })?;
                Ok(FileStat {
                    size,
                    is_dir: false,
                })
            }
            other => Err(TransportError::Protocol(format!(
                "unexpected stat probe output: {other:?}"
            ))),
        }
    }

    async fn execute(&mut self, command: &str) -> Result<String, TransportError> {
        let exchange = self.run(command).await?;
        if exchange.exit_code != 0 {
            return Err(TransportError::CommandFailed {
                exit_code: exchange.exit_code,
                stderr: exchange.stderr,
            });
        }
        Ok(exchange.stdout.trim().to_string())
    }

    async fn remove(&mut self, remote_path: &str) -> Result<(), TransportError> {
        let exchange = self.run(&format!("rm {}", shell_quote(remote_path))).await?;
        if exchange.exit_code != 0 {
            if exchange.stderr.contains("No such file") {
                return Err(TransportError::NotFound(remote_path.to_string()));
            }
            return Err(classify_exit(exchange.exit_code, exchange.stderr));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // Best effort: clean the scratch directory and let the shell
        // exit on its own before kill_on_drop would reap it.
        let _ = self
            .stdin
            .write_all(b"rm -rf \"$__nimbus_tmp\"\nexit 0\n")
            .await;
        let _ = self.stdin.flush().await;
        let _ = tokio::time::timeout(self.timeout, self.child.wait()).await;
        Ok(())
    }
}
