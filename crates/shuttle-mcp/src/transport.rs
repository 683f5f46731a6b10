//! MCP Transport layer implementations

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde_json::Value;
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

/// Transport trait for MCP communication
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&mut self, message: Value) -> io::Result<()>;
    async fn receive(&mut self) -> io::Result<Option<Value>>;
    async fn close(&mut self) -> io::Result<()>;
}

/// Stdio transport for subprocess communication
pub struct StdioTransport {
    child: Child,
    reader: Option<BufReader<tokio::process::ChildStdout>>,
}

impl StdioTransport {
    pub async fn spawn(command: &str, args: &[&str]) -> io::Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .spawn()?;

        let stdout = child.stdout.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "Failed to capture stdout")
        })?;

        Ok(Self {
            child,
            reader: Some(BufReader::new(stdout)),
        })
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&mut self, message: Value) -> io::Result<()> {
        let stdin = self.child.stdin.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "Stdin not available")
        })?;

        let json = serde_json::to_string(&message)?;
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;

        Ok(())
    }

    async fn receive(&mut self) -> io::Result<Option<Value>> {
        let reader = self.reader.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "Reader not available")
        })?;

        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;

        if n == 0 {
            return Ok(None);
        }

        let value: Value = serde_json::from_str(&line)?;
        Ok(Some(value))
    }

    async fn close(&mut self) -> io::Result<()> {
        self.child.kill().await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for Box<dyn Transport> {
    async fn send(&mut self, message: Value) -> io::Result<()> {
        (**self).send(message).await
    }

    async fn receive(&mut self) -> io::Result<Option<Value>> {
        (**self).receive().await
    }

    async fn close(&mut self) -> io::Result<()> {
        (**self).close().await
    }
}

/// SSE transport for HTTP-based communication. Opens a long-lived GET
/// stream, reads the server's `endpoint` event to learn where to POST
/// requests, then shuttles every subsequent SSE event onto an internal
/// channel `receive` drains from.
pub struct SseTransport {
    post_url: String,
    client: reqwest::Client,
    events: mpsc::UnboundedReceiver<Value>,
    stream_task: tokio::task::JoinHandle<()>,
}

impl SseTransport {
    pub async fn connect(base_url: &str) -> io::Result<Self> {
        let client = reqwest::Client::new();
        let response = client
            .get(base_url)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        let mut stream = response.bytes_stream().eventsource();
        let (tx, events) = mpsc::unbounded_channel();
        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        let origin = server_origin(base_url);

        let stream_task = tokio::spawn(async move {
            let mut endpoint_tx = Some(endpoint_tx);
            while let Some(event) = stream.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(_) => break,
                };
                if event.event == "endpoint" {
                    if let Some(endpoint_tx) = endpoint_tx.take() {
                        let _ = endpoint_tx.send(resolve_endpoint(&origin, &event.data));
                    }
                    continue;
                }
                if let Ok(value) = serde_json::from_str::<Value>(&event.data) {
                    if tx.send(value).is_err() {
                        break;
                    }
                }
            }
        });

        let post_url = endpoint_rx.await.map_err(|_| {
            io::Error::new(io::ErrorKind::Other, "sse stream closed before an endpoint event arrived")
        })?;

        Ok(Self { post_url, client, events, stream_task })
    }
}

/// `scheme://host[:port]` prefix of `url`, for resolving a relative
/// `endpoint` event against the server that sent it.
fn server_origin(url: &str) -> String {
    let after_scheme = url.find("://").map(|i| i + 3).unwrap_or(0);
    match url[after_scheme..].find('/') {
        Some(i) => url[..after_scheme + i].to_string(),
        None => url.to_string(),
    }
}

fn resolve_endpoint(origin: &str, endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else if let Some(path) = endpoint.strip_prefix('/') {
        format!("{origin}/{path}")
    } else {
        format!("{origin}/{endpoint}")
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn send(&mut self, message: Value) -> io::Result<()> {
        let response = self
            .client
            .post(&self.post_url)
            .json(&message)
            .send()
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        if !response.status().is_success() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("mcp server rejected request: {}", response.status()),
            ));
        }
        Ok(())
    }

    async fn receive(&mut self) -> io::Result<Option<Value>> {
        Ok(self.events.recv().await)
    }

    async fn close(&mut self) -> io::Result<()> {
        self.stream_task.abort();
        Ok(())
    }
}
