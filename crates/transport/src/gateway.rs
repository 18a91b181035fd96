//! Gateway REST transport backend.
//!
//! Providers that do not expose a reachable shell front their clusters
//! with a small HTTP gateway. Each logical connection logs in once,
//! keeps the returned session id, and sends it as a cookie on every
//! subsequent call. The remote surface is three resources: `command`
//! for execution, `file` for content and metadata, and `logout` to end
//! the session.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::multipart;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio_util::io::StreamReader;

use crate::{FileStat, FileStream, Transport, TransportError};

#[derive(Debug, Deserialize)]
struct LoginResponse {
    auth: bool,
    #[serde(default)]
    sessionid: String,
}

#[derive(Debug, Deserialize)]
struct CommandResponse {
    status: i32,
    #[serde(default)]
    output: String,
    #[serde(default)]
    error: String,
}

#[derive(Debug, Deserialize)]
struct StatResponse {
    size: u64,
    directory: bool,
}

/// Session-cookie REST client for a provider gateway.
pub struct GatewayTransport {
    client: reqwest::Client,
    base_url: String,
    host: String,
    session_id: String,
    closed: bool,
}

impl GatewayTransport {
    /// Log in and establish a session.
    pub async fn connect(
        base_url: &str,
        host: &str,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        let start = Instant::now();
        let response = client
            .post(format!("{base_url}/login"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .map_err(|e| map_request_error(e, start))?;

        let response = check_status(response)?;
        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Protocol(format!("malformed login response: {e}")))?;
        if !login.auth || login.sessionid.is_empty() {
            return Err(TransportError::PermissionDenied(
                "gateway rejected credentials".to_string(),
            ));
        }

        tracing::debug!(%base_url, host, "Gateway session established");
        Ok(Self {
            client,
            base_url,
            host: host.to_string(),
            session_id: login.sessionid,
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }

    fn cookie(&self) -> String {
        format!("sessionid={}", self.session_id)
    }

    fn file_url(&self, remote_path: &str) -> String {
        format!(
            "{}/file/{}/{}",
            self.base_url,
            self.host,
            remote_path.trim_start_matches('/')
        )
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, TransportError> {
        self.ensure_open()?;
        let start = Instant::now();
        let response = request
            .header(reqwest::header::COOKIE, self.cookie())
            .send()
            .await
            .map_err(|e| map_request_error(e, start))?;
        check_status(response)
    }

    /// Run a command on the cluster's head node through the gateway.
    async fn command(&self, command: &str) -> Result<CommandResponse, TransportError> {
        let response = self
            .send(
                self.client
                    .post(format!("{}/command/{}", self.base_url, self.host))
                    .form(&[("executable", command)]),
            )
            .await?;
        response
            .json()
            .await
            .map_err(|e| TransportError::Protocol(format!("malformed command response: {e}")))
    }

    async fn command_checked(&self, command: &str) -> Result<CommandResponse, TransportError> {
        let result = self.command(command).await?;
        if result.status != 0 {
            return Err(TransportError::CommandFailed {
                exit_code: result.status,
                stderr: result.error,
            });
        }
        Ok(result)
    }
}

#[async_trait]
impl Transport for GatewayTransport {
    async fn put(&mut self, content: &[u8], remote_path: &str) -> Result<(), TransportError> {
        let name = remote_path
            .rsplit('/')
            .next()
            .unwrap_or(remote_path)
            .to_string();
        let part = multipart::Part::bytes(content.to_vec()).file_name(name);
        let form = multipart::Form::new().part("file", part);
        self.send(self.client.post(self.file_url(remote_path)).multipart(form))
            .await?;
        Ok(())
    }

    async fn get(&mut self, remote_path: &str) -> Result<FileStream, TransportError> {
        let response = self
            .send(
                self.client
                    .get(self.file_url(remote_path))
                    .query(&[("view", "read")]),
            )
            .await
            .map_err(|e| remap_not_found(e, remote_path))?;

        let stream = futures::TryStreamExt::map_err(response.bytes_stream(), |e| {
            std::io::Error::other(e)
        });
        Ok(FileStream::new(Box::new(StreamReader::new(stream))))
    }

    async fn mkdir(&mut self, remote_path: &str) -> Result<(), TransportError> {
        self.command_checked(&format!("mkdir -p {}", crate::shell_quote(remote_path)))
            .await?;
        Ok(())
    }

    async fn isfile(&mut self, remote_path: &str) -> Result<bool, TransportError> {
        match self.stat(remote_path).await {
            Ok(stat) => Ok(!stat.is_dir),
            Err(TransportError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn stat(&mut self, remote_path: &str) -> Result<FileStat, TransportError> {
        let response = self
            .send(
                self.client
                    .get(self.file_url(remote_path))
                    .query(&[("view", "stat")]),
            )
            .await
            .map_err(|e| remap_not_found(e, remote_path))?;

        let stat: StatResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Protocol(format!("malformed stat response: {e}")))?;
        Ok(FileStat {
            size: stat.size,
            is_dir: stat.directory,
        })
    }

    async fn execute(&mut self, command: &str) -> Result<String, TransportError> {
        let result = self.command(command).await?;
        if result.status != 0 {
            return Err(TransportError::CommandFailed {
                exit_code: result.status,
                stderr: result.error,
            });
        }
        Ok(result.output.trim().to_string())
    }

    async fn remove(&mut self, remote_path: &str) -> Result<(), TransportError> {
        self.send(self.client.delete(self.file_url(remote_path)))
            .await
            .map_err(|e| remap_not_found(e, remote_path))?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }

        // Best effort. The server expires the session on its own if the
        // logout never lands.
        let logout = self
            .client
            .post(format!("{}/logout", self.base_url))
            .header(reqwest::header::COOKIE, self.cookie())
            .send()
            .await;
        if let Err(e) = logout {
            tracing::debug!(error = %e, "Gateway logout failed");
        }
        self.closed = true;
        Ok(())
    }
}

/// Attach the remote path to a bare 404 from the file resource.
fn remap_not_found(error: TransportError, remote_path: &str) -> TransportError {
    match error {
        TransportError::NotFound(_) => TransportError::NotFound(remote_path.to_string()),
        other => other,
    }
}

fn map_request_error(error: reqwest::Error, start: Instant) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout {
            elapsed_ms: start.elapsed().as_millis() as u64,
        }
    } else {
        TransportError::Request(error.to_string())
    }
}

/// Map gateway error statuses to the taxonomy. A 401 means the session
/// expired server-side, so the connection is as good as closed.
fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    match status {
        s if s.is_success() => Ok(response),
        StatusCode::NOT_FOUND => Err(TransportError::NotFound(response.url().path().to_string())),
        StatusCode::UNAUTHORIZED => Err(TransportError::Closed),
        StatusCode::FORBIDDEN => Err(TransportError::PermissionDenied(
            response.url().path().to_string(),
        )),
        s => Err(TransportError::Gateway {
            status: s.as_u16(),
            message: format!("unexpected status for {}", response.url().path()),
        }),
    }
}
