//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use failover_dispatcher::upstream::{CallError, Payload, Upstream};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// In-process upstream whose health can be flipped during a test.
pub struct ScriptedUpstream {
    name: &'static str,
    healthy: AtomicBool,
    calls: AtomicU32,
    delay: Duration,
}

impl ScriptedUpstream {
    pub fn new(name: &'static str, healthy: bool) -> Arc<Self> {
        Self::with_delay(name, healthy, Duration::ZERO)
    }

    pub fn with_delay(name: &'static str, healthy: bool, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            healthy: AtomicBool::new(healthy),
            calls: AtomicU32::new(0),
            delay,
        })
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    fn name(&self) -> &str {
        self.name
    }

    async fn call(&self, _timeout: Duration) -> Result<Payload, CallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.healthy.load(Ordering::SeqCst) {
            Ok(Payload::new(self.name))
        } else {
            Err(CallError::Status { status: 500 })
        }
    }
}

/// Start a programmable HTTP backend on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 1024];
                        let _ = socket.read(&mut buf).await;

                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a backend that answers `name` while `on` is set and 500 otherwise.
pub async fn start_switchable_backend(name: &'static str, on: Arc<AtomicBool>) -> SocketAddr {
    start_programmable_backend(move || {
        let on = on.clone();
        async move {
            if on.load(Ordering::SeqCst) {
                (200, name.to_string())
            } else {
                (500, format!("{name} ERROR (off)"))
            }
        }
    })
    .await
}
