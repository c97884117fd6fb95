#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use annuaire::{DelayWindow, SessionConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Minimal HTTP/1.1 server on localhost, one response per connection.
pub struct Stub {
    pub base: String,
    /// Raw request heads, in arrival order.
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl Stub {
    /// `respond(request target, hits on that target so far) -> (status, body)`
    pub async fn spawn<F>(respond: F) -> Stub
    where
        F: Fn(&str, usize) -> (u16, String) + Send + Sync + 'static,
    {
        Self::spawn_with_headers(&[], respond).await
    }

    /// Like [`Stub::spawn`], with `headers` (`"Name: value"`) added to every
    /// response.
    pub async fn spawn_with_headers<F>(headers: &'static [&'static str], respond: F) -> Stub
    where
        F: Fn(&str, usize) -> (u16, String) + Send + Sync + 'static,
    {
        let extra: String = headers.iter().map(|h| format!("{h}\r\n")).collect();
        let respond = Arc::new(respond);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let hits: Arc<Mutex<HashMap<String, usize>>> = Arc::new(Mutex::new(HashMap::new()));

        let seen = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let seen = seen.clone();
                let hits = hits.clone();
                let respond = respond.clone();
                let extra = extra.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 4096];
                    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        match stream.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&buf).into_owned();
                    let target = head.split_whitespace().nth(1).unwrap_or("/").to_string();

                    let hit = {
                        let mut hits = hits.lock().unwrap();
                        let n = hits.entry(target.clone()).or_insert(0);
                        *n += 1;
                        *n
                    };
                    seen.lock().unwrap().push(head);

                    let (status, body) = respond(&target, hit);
                    let reason = if status < 400 { "OK" } else { "ERR" };
                    let reply = format!(
                        "HTTP/1.1 {status} {reason}\r\n\
                         Content-Type: text/html; charset=utf-8\r\n\
                         Content-Length: {}\r\n\
                         {extra}\
                         Connection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(reply.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Stub { base, requests }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn targets(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|head| head.split_whitespace().nth(1).unwrap_or("").to_string())
            .collect()
    }
}

/// No random pause, short backoff.
pub fn quick(mut config: SessionConfig) -> SessionConfig {
    config.delay = DelayWindow::DISABLED;
    config.retry.base_delay = Duration::from_millis(10);
    config
}
