//! Loopback JSON-RPC node for transport tests.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

type Answer = Arc<dyn Fn(&str) -> Value + Send + Sync>;

/// Answers every request after `delay` with `answer(method)` as the result.
pub(crate) struct TestNode {
    pub url: String,
    methods: Arc<Mutex<Vec<String>>>,
}

impl TestNode {
    pub async fn start<F>(delay: Duration, answer: F) -> Self
    where
        F: Fn(&str) -> Value + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let methods = Arc::new(Mutex::new(Vec::new()));
        let answer: Answer = Arc::new(answer);

        let seen = methods.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket, delay, answer.clone(), seen.clone()));
            }
        });

        Self { url, methods }
    }

    /// How many requests for `method` reached the node.
    pub fn calls(&self, method: &str) -> usize {
        self.methods.lock().iter().filter(|m| *m == method).count()
    }
}

async fn serve(
    mut socket: TcpStream,
    delay: Duration,
    answer: Answer,
    seen: Arc<Mutex<Vec<String>>>,
) {
    // One connection may carry several keep-alive requests
    while let Some(body) = read_request(&mut socket).await {
        let method = serde_json::from_slice::<Value>(&body)
            .ok()
            .and_then(|v| v.get("method").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_default();
        seen.lock().push(method.clone());

        tokio::time::sleep(delay).await;
        let payload = json!({"jsonrpc": "2.0", "id": 1, "result": answer(&method)}).to_string();
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{}",
            payload.len(),
            payload
        );
        if socket.write_all(response.as_bytes()).await.is_err() {
            return;
        }
    }
}

async fn read_request(socket: &mut TcpStream) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(end) = find_header_end(&buf) {
            let headers = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let length = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let body_start = end + 4;
            if buf.len() >= body_start + length {
                return Some(buf[body_start..body_start + length].to_vec());
            }
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
