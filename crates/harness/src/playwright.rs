//! Browser transport driven through a Playwright Node.js bridge

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::transport::{sanitize_all, Transport};

/// Bridge script run by Node.js
pub const BRIDGE_SCRIPT: &str = include_str!("bridge.js");

/// Configuration for the browser bridge
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub node_binary: String,
    pub contact_name: String,
    pub headless: bool,
    pub session_dir: PathBuf,
    pub request_timeout: Duration,
    pub login_timeout: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for PlaywrightConfig {
    fn from(session: &SessionConfig) -> Self {
        Self {
            node_binary: session.node_binary.clone(),
            contact_name: session.contact_name.clone(),
            headless: session.headless,
            session_dir: session.session_dir.clone(),
            request_timeout: Duration::from_millis(session.bridge_timeout_ms),
            login_timeout: Duration::from_millis(session.login_timeout_ms),
        }
    }
}

/// One bridge request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum BridgeRequest {
    Open {
        contact: String,
        headless: bool,
        session_dir: PathBuf,
        login_timeout_ms: u64,
    },
    Send {
        text: String,
    },
    Count,
    Since {
        baseline: usize,
    },
    Clear,
    Close,
}

impl BridgeRequest {
    fn name(&self) -> &'static str {
        match self {
            BridgeRequest::Open { .. } => "open",
            BridgeRequest::Send { .. } => "send",
            BridgeRequest::Count => "count",
            BridgeRequest::Since { .. } => "since",
            BridgeRequest::Clear => "clear",
            BridgeRequest::Close => "close",
        }
    }
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    id: u64,
    #[serde(flatten)]
    request: &'a BridgeRequest,
}

/// One bridge response
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BridgeResponse {
    #[serde(default)]
    pub id: Option<u64>,
    pub ok: bool,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub fragments: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Chat session in a real browser
pub struct PlaywrightTransport {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    request_timeout: Duration,
    next_id: u64,
    // Holds the bridge script for the lifetime of the process
    _workdir: tempfile::TempDir,
}

impl PlaywrightTransport {
    /// Start the bridge, log in and open the bot's chat
    pub async fn launch(config: PlaywrightConfig) -> HarnessResult<Self> {
        Self::check_node_installed(&config.node_binary).await?;
        std::fs::create_dir_all(&config.session_dir)?;

        let workdir = tempfile::tempdir()?;
        let script_path = workdir.path().join("bridge.js");
        std::fs::write(&script_path, BRIDGE_SCRIPT)?;
        debug!("Bridge script written to {}", script_path.display());

        let cwd = std::env::current_dir()?;
        let mut child = Command::new(&config.node_binary)
            .arg(&script_path)
            .current_dir(&cwd)
            .env("NODE_PATH", cwd.join("node_modules"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HarnessError::Bridge("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HarnessError::Bridge("bridge stdout unavailable".to_string()))?;

        let mut transport = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            request_timeout: config.request_timeout,
            next_id: 0,
            _workdir: workdir,
        };

        info!("Opening chat with {}", config.contact_name);
        let open = BridgeRequest::Open {
            contact: config.contact_name,
            headless: config.headless,
            session_dir: config.session_dir,
            login_timeout_ms: config.login_timeout.as_millis() as u64,
        };
        // Login may wait for a QR scan, well past the normal request bound
        let timeout = transport.request_timeout + config.login_timeout;
        transport.request_with_timeout(&open, timeout).await?;

        Ok(transport)
    }

    async fn check_node_installed(node: &str) -> HarnessResult<()> {
        let status = Command::new(node)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(HarnessError::NodeNotFound(node.to_string())),
        }
    }

    async fn request(&mut self, request: &BridgeRequest) -> HarnessResult<BridgeResponse> {
        let timeout = self.request_timeout;
        self.request_with_timeout(request, timeout).await
    }

    async fn request_with_timeout(
        &mut self,
        request: &BridgeRequest,
        timeout: Duration,
    ) -> HarnessResult<BridgeResponse> {
        self.next_id += 1;
        let id = self.next_id;

        let mut line = serde_json::to_string(&Envelope { id, request })?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        let response = tokio::time::timeout(timeout, self.read_response(id))
            .await
            .map_err(|_| HarnessError::Timeout(format!("bridge {}", request.name())))??;

        if !response.ok {
            return Err(HarnessError::Bridge(format!(
                "{} failed: {}",
                request.name(),
                response.error.as_deref().unwrap_or("unknown error")
            )));
        }
        Ok(response)
    }

    /// Read lines until the response to `id` shows up
    async fn read_response(&mut self, id: u64) -> HarnessResult<BridgeResponse> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await?
                .ok_or(HarnessError::BridgeClosed)?;

            match serde_json::from_str::<BridgeResponse>(&line) {
                Ok(response) if response.id == Some(id) => return Ok(response),
                Ok(response) if response.id.is_none() && !response.ok => {
                    return Err(HarnessError::Bridge(
                        response.error.unwrap_or_else(|| "malformed request".to_string()),
                    ));
                }
                Ok(response) => debug!("Skipping stale bridge response {:?}", response.id),
                Err(_) => debug!("Bridge output: {}", line),
            }
        }
    }

    /// Close the browser and wait for the bridge to exit
    pub async fn close(mut self) -> HarnessResult<()> {
        if let Err(e) = self.request(&BridgeRequest::Close).await {
            warn!("Bridge close failed: {}", e);
            self.child.kill().await?;
            return Ok(());
        }
        self.child.wait().await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for PlaywrightTransport {
    async fn send_text(&mut self, text: &str) -> HarnessResult<()> {
        self.request(&BridgeRequest::Send {
            text: text.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn fragment_count(&mut self) -> HarnessResult<usize> {
        self.request(&BridgeRequest::Count)
            .await?
            .count
            .ok_or_else(|| HarnessError::Bridge("count response without count".to_string()))
    }

    async fn fragments_since(&mut self, baseline: usize) -> HarnessResult<Vec<String>> {
        let response = self.request(&BridgeRequest::Since { baseline }).await?;
        Ok(sanitize_all(response.fragments))
    }

    async fn reset_conversation(&mut self) -> HarnessResult<()> {
        self.request(&BridgeRequest::Clear).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let request = BridgeRequest::Since { baseline: 5 };
        let json = serde_json::to_value(Envelope {
            id: 3,
            request: &request,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"id": 3, "op": "since", "baseline": 5}));

        let json = serde_json::to_value(Envelope {
            id: 4,
            request: &BridgeRequest::Count,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"id": 4, "op": "count"}));
    }

    #[test]
    fn test_response_parsing() {
        let response: BridgeResponse =
            serde_json::from_str(r#"{"id":2,"ok":true,"fragments":["a","b"]}"#).unwrap();
        assert_eq!(response.fragments, vec!["a", "b"]);
        assert_eq!(response.count, None);

        let response: BridgeResponse =
            serde_json::from_str(r#"{"id":9,"ok":false,"error":"session not open"}"#).unwrap();
        assert!(!response.ok);
        assert_eq!(response.error.as_deref(), Some("session not open"));
    }

    #[test]
    fn test_bridge_script_handles_every_op() {
        for op in ["open", "send", "count", "since", "clear", "close"] {
            assert!(
                BRIDGE_SCRIPT.contains(&format!("async {}(", op)),
                "bridge is missing {}",
                op
            );
        }
    }

    #[test]
    fn test_config_from_session() {
        let session = SessionConfig {
            contact_name: "AgroBot".into(),
            bridge_timeout_ms: 1_000,
            ..Default::default()
        };
        let config = PlaywrightConfig::from(&session);
        assert_eq!(config.contact_name, "AgroBot");
        assert_eq!(config.request_timeout, Duration::from_secs(1));
    }
}
