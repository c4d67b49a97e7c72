//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mjpeg_relay::chunker::source::parse_boundary;
use mjpeg_relay::chunker::ChunkParser;
use mjpeg_relay::config::{RelayConfig, SourceConfig};
use mjpeg_relay::{HttpServer, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const MOCK_BOUNDARY: &str = "mockboundary";

/// Behaviour of a mock camera.
#[derive(Debug, Clone)]
pub struct CameraScript {
    /// Sizes of the JPEG payloads, sent in order.
    pub frames: Vec<usize>,
    /// Pause before every frame.
    pub interval: Duration,
    /// Start over once all frames are sent instead of finishing.
    pub repeat: bool,
    /// End with a zero-length chunk instead of just closing.
    pub final_chunk: bool,
}

/// Connection bookkeeping of a mock camera.
#[derive(Debug, Default)]
pub struct CameraStats {
    pub connections: AtomicUsize,
    pub disconnections: AtomicUsize,
    /// Authorization header of the latest request, if any.
    pub authorization: Mutex<Option<String>>,
}

impl CameraStats {
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn disconnections(&self) -> usize {
        self.disconnections.load(Ordering::SeqCst)
    }

    pub fn authorization(&self) -> Option<String> {
        self.authorization.lock().unwrap().clone()
    }
}

/// Start a mock MJPEG camera on an ephemeral port.
pub async fn start_mock_camera(script: CameraScript) -> (SocketAddr, Arc<CameraStats>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let stats = Arc::new(CameraStats::default());

    let counters = stats.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            counters.connections.fetch_add(1, Ordering::SeqCst);
            let script = script.clone();
            let counters = counters.clone();
            tokio::spawn(async move {
                let _ = serve_camera(socket, &script, &counters).await;
                counters.disconnections.fetch_add(1, Ordering::SeqCst);
            });
        }
    });

    (addr, stats)
}

async fn serve_camera(
    mut socket: TcpStream,
    script: &CameraScript,
    stats: &CameraStats,
) -> std::io::Result<()> {
    let head = read_request_head(&mut socket).await?;
    *stats.authorization.lock().unwrap() = header_value(&head, "authorization");

    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace;boundary={}\r\nConnection: close\r\n\r\n",
        MOCK_BOUNDARY
    );
    socket.write_all(head.as_bytes()).await?;

    let mut sequence = 0u8;
    loop {
        for &len in &script.frames {
            tokio::time::sleep(script.interval).await;
            let part = format!(
                "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                MOCK_BOUNDARY, len
            );
            socket.write_all(part.as_bytes()).await?;
            socket.write_all(&vec![sequence; len]).await?;
            socket.write_all(b"\r\n").await?;
            sequence = sequence.wrapping_add(1);
        }
        if !script.repeat {
            break;
        }
    }

    if script.final_chunk {
        let last = format!("--{}\r\nContent-Length: 0\r\n\r\n", MOCK_BOUNDARY);
        socket.write_all(last.as_bytes()).await?;
    }
    socket.shutdown().await
}

async fn read_request_head(socket: &mut TcpStream) -> std::io::Result<String> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        head.extend_from_slice(&buf[..n]);
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}

fn header_value(head: &str, name: &str) -> Option<String> {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim().to_string())
}

/// Start an upstream that answers every request with a plain error status.
pub async fn start_failing_upstream(status: u16) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = read_request_head(&mut socket).await;
                let response = format!(
                    "HTTP/1.1 {} Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Relay configuration with one source served on `/cam`.
pub fn relay_config(upstream: SocketAddr) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.sources.push(SourceConfig {
        name: "cam".into(),
        url: format!("http://{}/video.mjpg", upstream),
        username: None,
        password: None,
        path: "/cam".into(),
        stream_duration_secs: 0.0,
    });
    config
}

/// A relay running in the background until its `Shutdown` is triggered.
pub struct TestRelay {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
}

impl TestRelay {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_relay(config: RelayConfig) -> TestRelay {
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, shutdown.clone()).unwrap();
    tokio::spawn(async move {
        server.run(listener).await.unwrap();
    });

    TestRelay { addr, shutdown }
}

/// Split a complete relay response body into its frames.
pub async fn parse_parts(content_type: &str, body: &[u8]) -> Vec<Vec<u8>> {
    let boundary = parse_boundary(content_type).unwrap();
    let mut parser = ChunkParser::new(body, boundary);
    let mut parts = Vec::new();
    while let Some(frame) = parser.next_frame().await.unwrap() {
        parts.push(frame.to_vec());
    }
    parts
}
