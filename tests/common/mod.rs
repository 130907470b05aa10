//! Shared fixtures: a canned-response HTTP server and a recording frontend.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use sanityd::frontend::Frontend;
use sanityd::install::download::DownloadProgress;
use sanityd::lifecycle::LifecycleState;

/// One canned HTTP response, replayed for every connection.
#[derive(Clone)]
pub struct CannedResponse {
    pub status_line: &'static str,
    pub body: Vec<u8>,
    /// Advertised content-length; `None` omits the header entirely.
    pub advertised_len: Option<u64>,
    /// Pause before the body is written (to hold a download open).
    pub delay: Option<Duration>,
}

impl CannedResponse {
    pub fn ok(body: Vec<u8>) -> Self {
        let len = body.len() as u64;
        Self {
            status_line: "HTTP/1.1 200 OK",
            body,
            advertised_len: Some(len),
            delay: None,
        }
    }

    pub fn status(status_line: &'static str) -> Self {
        Self {
            status_line,
            body: Vec::new(),
            advertised_len: Some(0),
            delay: None,
        }
    }

    /// Advertise more bytes than will ever be sent; the connection closes
    /// mid-body, which surfaces as a transfer failure on the client.
    pub fn truncated(body: Vec<u8>, advertised_len: u64) -> Self {
        Self {
            status_line: "HTTP/1.1 200 OK",
            body,
            advertised_len: Some(advertised_len),
            delay: None,
        }
    }

    /// No content-length header: the client sees an unknown total.
    pub fn unknown_length(body: Vec<u8>) -> Self {
        Self {
            status_line: "HTTP/1.1 200 OK",
            body,
            advertised_len: None,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

pub struct Fixture {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
}

impl Fixture {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hit_count(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Serve `response` on an ephemeral local port, counting connections.
pub async fn serve(response: CannedResponse) -> Fixture {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            let response = response.clone();
            tokio::spawn(async move {
                // Drain the request head before answering.
                let mut buf = [0u8; 1024];
                let mut seen: Vec<u8> = Vec::new();
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            seen.extend_from_slice(&buf[..n]);
                            if seen.windows(4).any(|w| w == b"\r\n\r\n") {
                                break;
                            }
                        }
                    }
                }

                let mut head = format!("{}\r\n", response.status_line);
                if let Some(len) = response.advertised_len {
                    head.push_str(&format!("content-length: {len}\r\n"));
                }
                head.push_str("connection: close\r\n\r\n");
                let _ = socket.write_all(head.as_bytes()).await;
                if let Some(delay) = response.delay {
                    tokio::time::sleep(delay).await;
                }
                let _ = socket.write_all(&response.body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    Fixture { addr, hits }
}

/// Frontend double that records every callback for later assertions.
pub struct RecordingFrontend {
    accept_install: bool,
    pub confirms: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<String>>,
    pub states: Mutex<Vec<LifecycleState>>,
    pub progress: Mutex<Vec<DownloadProgress>>,
    pub diagnostics: Mutex<Vec<String>>,
}

impl RecordingFrontend {
    pub fn new(accept_install: bool) -> Self {
        Self {
            accept_install,
            confirms: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            states: Mutex::new(Vec::new()),
            progress: Mutex::new(Vec::new()),
            diagnostics: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded_states(&self) -> Vec<LifecycleState> {
        self.states.lock().unwrap().clone()
    }

    pub fn recorded_progress(&self) -> Vec<DownloadProgress> {
        self.progress.lock().unwrap().clone()
    }
}

impl Frontend for RecordingFrontend {
    fn confirm_install(&self, message: &str) -> bool {
        self.confirms.lock().unwrap().push(message.to_string());
        self.accept_install
    }

    fn report_progress(&self, progress: &DownloadProgress) {
        self.progress.lock().unwrap().push(*progress);
    }

    fn show_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    fn state_changed(&self, state: LifecycleState) {
        self.states.lock().unwrap().push(state);
    }

    fn append_diagnostic(&self, line: &str) {
        self.diagnostics.lock().unwrap().push(line.to_string());
    }
}
