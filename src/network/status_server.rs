//! HTTP status endpoint.
//!
//! Serves `GET /status` with the node snapshot as JSON. Uses `tiny_http`,
//! which works on both host and ESP32 (via std::net).
//!
//! # Example Response
//!
//! ```json
//! {
//!   "uptime_secs": 3600,
//!   "connection": "connected",
//!   "retry_count": 0,
//!   "max_retry": 5,
//!   "ip": "192.168.1.100",
//!   "epoch": 1,
//!   "duty_cycle": "active",
//!   "agreed_schedule": { "mantissa": 10240, "exponent": 0, "wake_duration": 195, "flow_id": 0 },
//!   "advertising": "advertising",
//!   "advertising_stalled": null,
//!   "probes": { "ok": 360, "failed": 2, "last_status": 200 }
//! }
//! ```

use crate::node::SharedState;
use log::{error, info, warn};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Method, Request, Response, Server};

/// Default port for the status server.
pub const DEFAULT_STATUS_PORT: u16 = 8080;

/// HTTP status server.
///
/// Runs in a background thread. Drop it to stop the server.
pub struct StatusServer {
    handle: Option<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    port: u16,
}

impl StatusServer {
    /// Bind and start serving. `bind_addr` of `None` means 0.0.0.0; port 0
    /// picks a free port.
    pub fn start(
        bind_addr: Option<IpAddr>,
        port: u16,
        state: SharedState,
    ) -> Result<Self, std::io::Error> {
        let addr = match bind_addr {
            Some(ip) => format!("{}:{}", ip, port),
            None => format!("0.0.0.0:{}", port),
        };

        let server = Server::http(&addr)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::AddrInUse, format!("{}", e)))?;
        let port = server
            .server_addr()
            .to_ip()
            .map(|a| a.port())
            .unwrap_or(port);

        info!("Status server listening on http://{}/status", addr);

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let handle = thread::spawn(move || {
            Self::run_server(server, state, shutdown_clone);
        });

        Ok(Self {
            handle: Some(handle),
            shutdown,
            port,
        })
    }

    /// Port the server is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    fn run_server(server: Server, state: SharedState, shutdown: Arc<AtomicBool>) {
        let headers = match Headers::new() {
            Some(headers) => headers,
            None => {
                error!("Failed to build response headers");
                return;
            }
        };

        loop {
            if shutdown.load(Ordering::Acquire) {
                info!("Status server shutting down");
                break;
            }

            match server.recv_timeout(Duration::from_millis(100)) {
                Ok(Some(request)) => Self::handle(request, &state, &headers),
                Ok(None) => {}
                Err(e) => {
                    error!("Status server error: {}", e);
                    break;
                }
            }
        }
    }

    fn handle(request: Request, state: &SharedState, headers: &Headers) {
        if request.method() != &Method::Get {
            let response = Response::from_string("Method Not Allowed")
                .with_status_code(405)
                .with_header(headers.allow_get.clone());
            if let Err(e) = request.respond(response) {
                warn!("Failed to send 405: {}", e);
            }
            return;
        }

        let result = match request.url() {
            "/status" | "/status/" => match serde_json::to_string(&state.snapshot()) {
                Ok(json) => request.respond(
                    Response::from_string(json)
                        .with_header(headers.content_type.clone())
                        .with_status_code(200),
                ),
                Err(e) => {
                    error!("Failed to serialize status: {}", e);
                    request.respond(
                        Response::from_string("Internal Server Error").with_status_code(500),
                    )
                }
            },
            "/" => request.respond(
                Response::from_string("See /status for node status")
                    .with_status_code(302)
                    .with_header(headers.location.clone()),
            ),
            _ => request.respond(Response::from_string("Not Found").with_status_code(404)),
        };

        if let Err(e) = result {
            warn!("Failed to send response: {}", e);
        }
    }

    /// Stop the server. May take up to 100ms due to the polling interval.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StatusServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Headers created once per server.
struct Headers {
    content_type: Header,
    location: Header,
    allow_get: Header,
}

impl Headers {
    fn new() -> Option<Self> {
        Some(Self {
            content_type: Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).ok()?,
            location: Header::from_bytes(&b"Location"[..], &b"/status"[..]).ok()?,
            allow_get: Header::from_bytes(&b"Allow"[..], &b"GET"[..]).ok()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::node::NodeState;
    use crate::probe::ProbeResult;
    use std::io::{Read, Write};
    use std::net::{Ipv4Addr, TcpStream};

    fn server() -> (StatusServer, SharedState) {
        let state = SharedState::new(NodeState::new(&NodeConfig::default()));
        let server =
            StatusServer::start(Some(IpAddr::V4(Ipv4Addr::LOCALHOST)), 0, state.clone()).unwrap();
        (server, state)
    }

    fn request(port: u16, method: &str, path: &str) -> String {
        let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
        write!(
            stream,
            "{} {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            method, path
        )
        .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    #[test]
    fn test_status_json() {
        let (server, state) = server();
        state.record_probe(ProbeResult::ok(200));

        let response = request(server.port(), "GET", "/status");
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("application/json"));
        assert!(response.contains("\"connection\":\"idle\""));
        assert!(response.contains("\"duty_cycle\":\"unconfigured\""));
        assert!(response.contains("\"ok\":1"));
    }

    #[test]
    fn test_root_redirects() {
        let (server, _state) = server();
        let response = request(server.port(), "GET", "/");
        assert!(response.starts_with("HTTP/1.1 302"));
        assert!(response.contains("Location: /status"));
    }

    #[test]
    fn test_unknown_path_and_method() {
        let (server, _state) = server();
        assert!(request(server.port(), "GET", "/nope").starts_with("HTTP/1.1 404"));
        assert!(request(server.port(), "POST", "/status").starts_with("HTTP/1.1 405"));
    }
}
