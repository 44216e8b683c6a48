//! Docker/Podman Engine API client.
//!
//! Speaks HTTP/1.1 over the engine's unix socket (or TCP) with a fresh
//! connection per request. Only the three endpoints the monitor needs are
//! implemented: container listing, one-shot stats and the event stream.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use http::{Method, Request, Response, header};
use http_body_util::{BodyExt, Empty};
use hyper::body::{Bytes, Incoming};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::engine::ContainerEngine;
use crate::error::{Error, Result};
use crate::event::{EngineEvent, EventStream};
use crate::filter::ServerFilter;
use crate::model::{ContainerSummary, StatsSnapshot};

/// Sockets probed when `DOCKER_HOST` is not set, in order.
const DEFAULT_SOCKETS: [&str; 2] = ["/run/podman/podman.sock", "/var/run/docker.sock"];

/// Delay before re-subscribing to the event stream after a failure.
const EVENT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Where the engine API listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Unix(PathBuf),
    Tcp(String),
}

impl Endpoint {
    /// Parse a `DOCKER_HOST` style address.
    ///
    /// # Errors
    ///
    /// Returns `EngineUnavailable` for unsupported schemes.
    pub fn parse(host: &str) -> Result<Self> {
        if let Some(path) = host.strip_prefix("unix://") {
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        if let Some(addr) = host
            .strip_prefix("tcp://")
            .or_else(|| host.strip_prefix("http://"))
        {
            return Ok(Self::Tcp(addr.trim_end_matches('/').to_string()));
        }
        if host.starts_with('/') {
            return Ok(Self::Unix(PathBuf::from(host)));
        }
        Err(Error::unavailable(format!(
            "unsupported engine address '{host}'"
        )))
    }

    /// Resolve the endpoint: explicit address, then `DOCKER_HOST`, then the
    /// first existing well-known socket.
    ///
    /// # Errors
    ///
    /// Returns `EngineUnavailable` if an address cannot be parsed.
    pub fn detect<F>(explicit: Option<&str>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = explicit.filter(|h| !h.is_empty()) {
            return Self::parse(host);
        }
        if let Some(host) = env("DOCKER_HOST").filter(|h| !h.is_empty()) {
            return Self::parse(&host);
        }
        let socket = DEFAULT_SOCKETS
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .unwrap_or_else(|| Path::new(DEFAULT_SOCKETS[1]));
        Ok(Self::Unix(socket.to_path_buf()))
    }
}

/// Engine API client.
#[derive(Debug, Clone)]
pub struct DockerClient {
    endpoint: Endpoint,
}

impl DockerClient {
    /// Create a client for an endpoint.
    pub fn new(endpoint: Endpoint) -> Self {
        info!(endpoint = ?endpoint, "Using container engine");
        Self { endpoint }
    }

    /// Create a client from an optional configured address.
    ///
    /// # Errors
    ///
    /// Returns `EngineUnavailable` if the address cannot be parsed.
    pub fn from_host(host: Option<&str>) -> Result<Self> {
        Endpoint::detect(host, |key| std::env::var(key).ok()).map(Self::new)
    }

    async fn get(&self, path: &str) -> Result<Response<Incoming>> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .header(header::HOST, "engine")
            .body(Empty::<Bytes>::new())
            .map_err(|e| Error::unavailable(e.to_string()))?;

        let response = match &self.endpoint {
            Endpoint::Unix(socket) => {
                let stream = UnixStream::connect(socket).await.map_err(|e| {
                    Error::unavailable(format!("{}: {e}", socket.display()))
                })?;
                exchange(stream, request).await?
            }
            Endpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr)
                    .await
                    .map_err(|e| Error::unavailable(format!("{addr}: {e}")))?;
                exchange(stream, request).await?
            }
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = read_body(response).await.unwrap_or_default();
        Err(Error::request_failed(
            path,
            status.as_u16(),
            String::from_utf8_lossy(&body).trim(),
        ))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.get(path).await?;
        let body = read_body(response).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Follow the event stream until it ends, the stop signal fires or a
    /// receiver goes away. Returns whether to keep going.
    async fn follow_events(
        &self,
        events: &mpsc::Sender<EngineEvent>,
        errors: &mpsc::Sender<Error>,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<bool> {
        let path = format!("/events?filters={}", encode(r#"{"type":["container"]}"#));
        let mut body = self.get(&path).await?.into_body();
        let mut buffer: Vec<u8> = Vec::new();

        loop {
            let frame = tokio::select! {
                frame = body.frame() => frame,
                _ = stop.changed() => return Ok(false),
            };
            let Some(frame) = frame else {
                return Ok(true);
            };
            let frame = frame.map_err(|e| Error::unavailable(e.to_string()))?;
            let Ok(data) = frame.into_data() else {
                continue;
            };
            buffer.extend_from_slice(&data);

            while let Some(end) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=end).collect();
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                let sent = match EngineEvent::from_json(&line) {
                    Ok(Some(event)) => events.send(event).await.is_ok(),
                    Ok(None) => true,
                    Err(e) => errors.send(e).await.is_ok(),
                };
                if !sent {
                    return Ok(false);
                }
            }
        }
    }
}

#[async_trait]
impl ContainerEngine for DockerClient {
    async fn list_containers(&self, filter: &ServerFilter) -> Result<Vec<ContainerSummary>> {
        let mut path = "/containers/json?all=true&size=true".to_string();
        if let Some(query) = filter.to_query() {
            path.push_str("&filters=");
            path.push_str(&encode(&query));
        }
        debug!(path = %path, "Listing containers");
        self.get_json(&path).await
    }

    async fn stats(&self, id: &str) -> Result<StatsSnapshot> {
        let path = format!("/containers/{}/stats?stream=false", encode(id));
        let stats: StatsResponse = self.get_json(&path).await?;
        Ok(stats.snapshot())
    }

    async fn events(&self, stop: watch::Receiver<bool>) -> Result<EventStream> {
        let (event_tx, error_tx, stream) = EventStream::channel(64);
        let client = self.clone();
        let mut stop = stop;

        tokio::spawn(async move {
            loop {
                if *stop.borrow() {
                    break;
                }
                match client.follow_events(&event_tx, &error_tx, &mut stop).await {
                    Ok(true) => debug!("Event stream ended, resubscribing"),
                    Ok(false) => break,
                    Err(e) => {
                        warn!(error = %e, "Event stream failed");
                        if error_tx.send(e).await.is_err() {
                            break;
                        }
                    }
                }
                tokio::select! {
                    () = tokio::time::sleep(EVENT_RETRY_DELAY) => {}
                    _ = stop.changed() => break,
                }
            }
            debug!("Event subscription closed");
        });

        Ok(stream)
    }
}

async fn exchange<S>(stream: S, request: Request<Empty<Bytes>>) -> Result<Response<Incoming>>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| Error::unavailable(e.to_string()))?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            debug!(error = %e, "Engine connection closed");
        }
    });
    sender
        .send_request(request)
        .await
        .map_err(|e| Error::unavailable(e.to_string()))
}

async fn read_body(response: Response<Incoming>) -> Result<Bytes> {
    response
        .into_body()
        .collect()
        .await
        .map(http_body_util::Collected::to_bytes)
        .map_err(|e| Error::unavailable(e.to_string()))
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StatsResponse {
    cpu_stats: CpuStats,
    memory_stats: MemoryStats,
    networks: std::collections::HashMap<String, NetworkStats>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CpuStats {
    system_cpu_usage: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MemoryStats {
    usage: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NetworkStats {
    tx_bytes: u64,
}

impl StatsResponse {
    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cpu: self.cpu_stats.system_cpu_usage,
            memory: self.memory_stats.usage,
            net_tx: self.networks.values().map(|n| n.tx_bytes).sum(),
        }
    }
}
