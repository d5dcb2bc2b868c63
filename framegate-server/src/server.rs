//! TCP server: accept loop and per-connection message dispatch.
//!
//! Each accepted connection runs on its own task; all of a connection's
//! decoder state lives in that task, so responses are written in the order
//! their requests were decoded and no cross-connection state exists.

use crate::config::TcpConfig;
use crate::error::ServerError;
use crate::pipeline::{ConnectionPipeline, Inbound};
use crate::router::RequestRouter;
use bytes::Bytes;
use framegate_protocol::{
    format_response, parse_request, request_from_value, ProtocolError, Request, Response,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use uuid::Uuid;

/// How long shutdown waits for connections to flush in-flight writes.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Log dumps (hex or JSON snippets) are capped at this many bytes.
const MAX_LOG_DUMP: usize = 4096;

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
}

/// TCP server for framegate.
pub struct Server {
    config: TcpConfig,
    listener: TcpListener,
    router: RequestRouter,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
}

impl Server {
    /// Binds the listener socket. Port 0 binds an OS-assigned port,
    /// retrievable via [`Server::local_addr`].
    pub async fn bind(config: TcpConfig) -> Result<Self, ServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let listener = TcpListener::bind(addr).await?;
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            listener,
            router: RequestRouter::new(),
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
        })
    }

    /// Returns the bound listen address.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Runs the accept loop until shutdown, then drains connections within
    /// the grace window.
    pub async fn run(&self) -> Result<(), ServerError> {
        tracing::info!(
            "listening on {} (framing: {:?})",
            self.listener.local_addr()?,
            self.config.framing
        );

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

                            let config = self.config.clone();
                            let router = self.router;
                            let stats = self.stats.clone();
                            let mut conn_shutdown = self.shutdown.subscribe();

                            tokio::spawn(async move {
                                let result = handle_connection(
                                    stream,
                                    addr,
                                    config,
                                    router,
                                    &mut conn_shutdown,
                                )
                                .await;

                                if let Err(e) = result {
                                    tracing::debug!("[{}] connection error: {}", addr, e);
                                }
                                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                                tracing::info!("client disconnected: {}", addr);
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("server shutting down");
                    break;
                }
            }
        }

        // Grace window: connections observe the shutdown signal and flush
        // in-flight writes; anything still active afterwards is abandoned.
        let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
        while self.stats.connections_active.load(Ordering::Relaxed) > 0 {
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(
                    "grace window elapsed with {} connection(s) still active",
                    self.stats.connections_active.load(Ordering::Relaxed)
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        Ok(())
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }
}

/// Handles a single connection until it closes or fails.
async fn handle_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    config: TcpConfig,
    router: RequestRouter,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<(), ServerError> {
    tracing::info!("client connected: {}", addr);

    let mut pipeline = ConnectionPipeline::new(&config);
    let mut buf = [0u8; 8192];

    loop {
        let n = tokio::select! {
            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        tracing::debug!("[{}] connection closed by peer", addr);
                        return Ok(());
                    }
                    Ok(n) => n,
                    Err(e) => return Err(ServerError::Io(e)),
                }
            }
            _ = idle_sleep(pipeline.reader_idle()) => {
                tracing::info!("[{}] reader idle timeout, closing", addr);
                return Ok(());
            }
            _ = shutdown.recv() => {
                tracing::debug!("[{}] shutdown signal received", addr);
                let _ = stream.flush().await;
                return Ok(());
            }
        };
        tracing::debug!("[{}] received {} bytes", addr, n);

        let events = match pipeline.feed(&buf[..n]) {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!("[{}] framing error, closing connection: {}", addr, e);
                // Stream corruption still gets a best-effort 400 so the
                // peer learns why; the flush completes before the close.
                if config.respond_enabled && matches!(e, ProtocolError::MalformedJson(_)) {
                    let response =
                        Response::error(Uuid::new_v4().to_string(), 400, "invalid request JSON");
                    let _ = write_response(&mut stream, &pipeline, addr, &response).await;
                }
                return Err(ServerError::Protocol(e));
            }
        };

        for event in events {
            match event {
                Inbound::Payload(payload) => {
                    handle_payload(&mut stream, &pipeline, &config, router, addr, payload).await?;
                }
                Inbound::Value(value) => {
                    handle_value(&mut stream, &pipeline, &config, router, addr, value).await?;
                }
                Inbound::Binary(frame) => {
                    handle_binary(&mut stream, &config, addr, frame).await?;
                }
            }
        }
    }
}

/// Handles a framed JSON payload. A malformed payload is contained to a
/// 400 response; the connection stays open.
async fn handle_payload(
    stream: &mut TcpStream,
    pipeline: &ConnectionPipeline,
    config: &TcpConfig,
    router: RequestRouter,
    addr: SocketAddr,
    payload: Bytes,
) -> Result<(), ServerError> {
    tracing::info!(
        "[{}] received payload: {} bytes, content={}",
        addr,
        payload.len(),
        snippet(&payload)
    );

    match parse_request(&payload) {
        Ok(request) => respond(stream, pipeline, config, router, addr, &request).await,
        Err(e) => {
            tracing::warn!("[{}] invalid request JSON: {}", addr, e);
            tracing::debug!("[{}] offending payload: {}", addr, snippet(&payload));
            if config.respond_enabled {
                let response =
                    Response::error(Uuid::new_v4().to_string(), 400, "invalid request JSON");
                write_response(stream, pipeline, addr, &response).await?;
            }
            Ok(())
        }
    }
}

/// Handles a root JSON value from the streaming path. A value that cannot
/// bind to the request envelope is terminal: a 400 is flushed, then the
/// connection closes.
async fn handle_value(
    stream: &mut TcpStream,
    pipeline: &ConnectionPipeline,
    config: &TcpConfig,
    router: RequestRouter,
    addr: SocketAddr,
    value: serde_json::Value,
) -> Result<(), ServerError> {
    match request_from_value(value) {
        Ok(request) => respond(stream, pipeline, config, router, addr, &request).await,
        Err(e) => {
            tracing::warn!(
                "[{}] stream value does not match the request envelope, closing: {}",
                addr,
                e
            );
            if config.respond_enabled {
                let response =
                    Response::error(Uuid::new_v4().to_string(), 400, "invalid request JSON");
                let _ = write_response(stream, pipeline, addr, &response).await;
            }
            Err(ServerError::Protocol(e))
        }
    }
}

/// Routes a parsed request and writes the response when responding is
/// enabled.
async fn respond(
    stream: &mut TcpStream,
    pipeline: &ConnectionPipeline,
    config: &TcpConfig,
    router: RequestRouter,
    addr: SocketAddr,
    request: &Request,
) -> Result<(), ServerError> {
    tracing::info!(
        "[{}] request parsed: id={:?} action={:?} has_data={}",
        addr,
        request.request_id,
        request.action,
        request.data.is_some()
    );

    if !config.respond_enabled {
        return Ok(());
    }

    let response = router.route(request);
    write_response(stream, pipeline, addr, &response).await
}

/// Serialises and writes one response through the connection's outbound
/// framing.
async fn write_response(
    stream: &mut TcpStream,
    pipeline: &ConnectionPipeline,
    addr: SocketAddr,
    response: &Response,
) -> Result<(), ServerError> {
    let bytes = pipeline.encode_outbound(&format_response(response));
    stream.write_all(&bytes).await?;
    stream.flush().await?;
    tracing::info!(
        "[{}] responded: id={} code={}",
        addr,
        response.request_id,
        response.code
    );
    Ok(())
}

/// Binary sink: hex-logs each frame and echoes it back when responding is
/// enabled.
async fn handle_binary(
    stream: &mut TcpStream,
    config: &TcpConfig,
    addr: SocketAddr,
    frame: Bytes,
) -> Result<(), ServerError> {
    let dump_len = frame.len().min(MAX_LOG_DUMP);
    if frame.len() > dump_len {
        tracing::info!(
            "[{}] binary frame: {} bytes, hex (first {} bytes)={}",
            addr,
            frame.len(),
            dump_len,
            hex::encode(&frame[..dump_len])
        );
    } else {
        tracing::info!(
            "[{}] binary frame: {} bytes, hex={}",
            addr,
            frame.len(),
            hex::encode(&frame)
        );
    }

    if config.respond_enabled {
        stream.write_all(&frame).await?;
        stream.flush().await?;
    }
    Ok(())
}

/// Sleeps for the idle timeout, or forever when the timeout is disabled.
async fn idle_sleep(idle: Option<Duration>) {
    match idle {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

/// Truncates and whitespace-collapses payload content for single-line logs.
fn snippet(payload: &[u8]) -> String {
    let text = String::from_utf8_lossy(&payload[..payload.len().min(MAX_LOG_DUMP)]);
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
