// tests/common/mod.rs
//
// In-process stand-in for the inference service, built on tiny_http.

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tiny_http::{Response, Server};

/// One request as the fake service saw it.
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: String,
    pub url: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Captured {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Number of file parts in a multipart body.
    pub fn file_part_count(&self) -> usize {
        self.body_text().matches("filename=\"").count()
    }
}

/// How the fake service answers each endpoint.
#[derive(Debug, Clone, Copy)]
pub struct Behavior {
    pub health_status: u16,
    pub health_delay: Duration,
    pub predict_status: u16,
    pub predict_delay: Duration,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            health_status: 200,
            health_delay: Duration::ZERO,
            predict_status: 200,
            predict_delay: Duration::ZERO,
        }
    }
}

pub struct FakeService {
    pub base_url: String,
    pub requests: Arc<Mutex<Vec<Captured>>>,
}

impl FakeService {
    pub fn requests_to(&self, path: &str) -> Vec<Captured> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == path)
            .cloned()
            .collect()
    }
}

/// Start the fake service on an ephemeral port. Each request is answered
/// on its own thread so a slow endpoint doesn't block the other.
pub fn spawn_service(behavior: Behavior) -> FakeService {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&requests);

    thread::spawn(move || {
        for mut request in server.incoming_requests() {
            let seen = Arc::clone(&seen);
            thread::spawn(move || {
                let mut body = Vec::new();
                let _ = request.as_reader().read_to_end(&mut body);
                let content_type = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("Content-Type"))
                    .map(|h| h.value.as_str().to_string());
                let url = request.url().to_string();
                seen.lock().unwrap().push(Captured {
                    method: request.method().as_str().to_string(),
                    url: url.clone(),
                    content_type,
                    body,
                });

                let (status, delay) = if url == "/health" {
                    (behavior.health_status, behavior.health_delay)
                } else {
                    (behavior.predict_status, behavior.predict_delay)
                };
                thread::sleep(delay);
                let _ = request.respond(Response::from_string("{}").with_status_code(status));
            });
        }
    });

    FakeService {
        base_url: format!("http://{addr}"),
        requests,
    }
}

/// A base URL nothing is listening on.
pub fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// Raw HTTP endpoint that answers `200 OK` with a 10-byte `Content-Length`,
/// writes only `body_bytes` of the body, then holds the connection for
/// `hold` before closing it.
pub fn spawn_partial_body_service(body_bytes: usize, hold: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            thread::spawn(move || {
                // GET requests only: consume headers up to the blank line
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut line = String::new();
                while reader.read_line(&mut line).unwrap_or(0) > 0 {
                    if line == "\r\n" {
                        break;
                    }
                    line.clear();
                }
                let _ = stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n");
                let _ = stream.write_all(&b"0123456789"[..body_bytes.min(10)]);
                let _ = stream.flush();
                thread::sleep(hold);
            });
        }
    });

    format!("http://{addr}")
}
