//! Minimal HTTP/1.1 range server for integration tests.
//!
//! Serves one in-memory body, answers HEAD and ranged GET requests, and can
//! cut a response short or trickle it out slowly. Every request is recorded.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Deterministic, non-repeating-looking test payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

/// Cut the body short for requests whose range starts at one of `starts`.
#[derive(Debug, Clone)]
pub struct DropRule {
    pub starts: Vec<u64>,
    /// Bytes of the body sent before the connection is closed.
    pub after: usize,
    /// How many matching requests are cut short, across all of `starts`.
    pub times: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    pub omit_accept_ranges: bool,
    pub drop: Option<DropRule>,
    /// Delay between 1 KiB pieces of every GET body.
    pub throttle: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    /// Inclusive `(first, last)` from the `Range` header.
    pub range: Option<(u64, u64)>,
}

struct Shared {
    body: Vec<u8>,
    options: ServerOptions,
    requests: Mutex<Vec<Recorded>>,
    drops_left: AtomicUsize,
    aborted: AtomicUsize,
}

pub struct RangeServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl RangeServer {
    pub async fn start(body: Vec<u8>, options: ServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shared = Arc::new(Shared {
            drops_left: AtomicUsize::new(options.drop.as_ref().map(|d| d.times).unwrap_or(0)),
            body,
            options,
            requests: Mutex::new(Vec::new()),
            aborted: AtomicUsize::new(0),
        });

        let accept_shared = Arc::clone(&shared);
        let task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let shared = Arc::clone(&accept_shared);
                tokio::spawn(async move {
                    if handle(socket, &shared).await.is_err() {
                        shared.aborted.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        Self { addr, shared, task }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.shared.requests.lock().unwrap().clone()
    }

    /// Ranges of all GET requests, sorted.
    pub fn ranged_gets(&self) -> Vec<(u64, u64)> {
        let mut ranges: Vec<_> = self
            .requests()
            .into_iter()
            .filter(|r| r.method == "GET")
            .filter_map(|r| r.range)
            .collect();
        ranges.sort();
        ranges
    }

    /// Connections the client went away from mid-response.
    pub fn aborted_connections(&self) -> usize {
        self.shared.aborted.load(Ordering::SeqCst)
    }
}

impl Drop for RangeServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn read_head(socket: &mut TcpStream) -> std::io::Result<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn parse_range(head: &str) -> Option<(u64, u64)> {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("range"))
        .and_then(|(_, value)| value.trim().strip_prefix("bytes="))
        .and_then(|spec| spec.split_once('-'))
        .and_then(|(a, b)| Some((a.parse().ok()?, b.parse().ok()?)))
}

async fn handle(mut socket: TcpStream, shared: &Shared) -> std::io::Result<()> {
    let head = read_head(&mut socket).await?;
    let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let range = parse_range(&head);

    shared.requests.lock().unwrap().push(Recorded {
        method: method.clone(),
        path,
        range,
    });

    let total = shared.body.len() as u64;
    let accept = if shared.options.omit_accept_ranges {
        ""
    } else {
        "Accept-Ranges: bytes\r\n"
    };

    if method == "HEAD" {
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
            total, accept
        );
        socket.write_all(head.as_bytes()).await?;
        return socket.shutdown().await;
    }

    let (status, slice, extra) = match range {
        Some((first, last)) if first < total => {
            let last = last.min(total - 1);
            (
                "206 Partial Content",
                &shared.body[first as usize..=last as usize],
                format!("Content-Range: bytes {}-{}/{}\r\n", first, last, total),
            )
        }
        _ => ("200 OK", &shared.body[..], String::new()),
    };

    let head = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}{}Connection: close\r\n\r\n",
        status,
        slice.len(),
        accept,
        extra
    );
    socket.write_all(head.as_bytes()).await?;

    let mut body = slice;
    if let (Some(rule), Some((first, _))) = (&shared.options.drop, range)
        && rule.starts.contains(&first)
        && shared
            .drops_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    {
        socket.write_all(&body[..rule.after.min(body.len())]).await?;
        socket.flush().await?;
        // Close without finishing the announced body.
        return Ok(());
    }

    match shared.options.throttle {
        Some(delay) => {
            while !body.is_empty() {
                let (piece, rest) = body.split_at(body.len().min(1024));
                socket.write_all(piece).await?;
                socket.flush().await?;
                body = rest;
                tokio::time::sleep(delay).await;
            }
        }
        None => socket.write_all(body).await?,
    }
    socket.shutdown().await
}
