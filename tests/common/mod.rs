//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use provider_shield::config::{CircuitConfig, RateLimitConfig};
use provider_shield::events::{handler_fn, Event, EventBus};
use provider_shield::{DispatchPolicy, ErrorOrchestrator};

/// Start a programmable HTTP backend on an ephemeral port.
///
/// `f` decides the status code of every response.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = u16> + Send + 'static,
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

                        let status = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            429 => "429 Too Many Requests",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                            status_text
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Orchestrator on a sequential bus, so events are delivered before
/// `emit` returns.
pub fn orchestrator() -> Arc<ErrorOrchestrator> {
    let events = Arc::new(EventBus::new(DispatchPolicy::Sequential, Duration::from_secs(5)));
    Arc::new(ErrorOrchestrator::new(events))
}

pub fn configure(orch: &ErrorOrchestrator, service: &str, rate: RateLimitConfig, threshold: u32) {
    orch.configure_service(service, rate, CircuitConfig::new(threshold, 300, 3600))
        .unwrap();
}

/// Collect the payloads of every `kind` event published on `bus`.
pub fn record_events(bus: &EventBus, kind: &str) -> Arc<Mutex<Vec<Value>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bus.on(
        kind,
        handler_fn(move |event: Arc<Event>| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(event.data.clone());
                Ok(())
            }
        }),
    );
    seen
}
