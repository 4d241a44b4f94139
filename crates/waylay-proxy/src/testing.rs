//! In-process HTTP/1.1 peers for the forwarder and listener tests.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

const UPSTREAM_RESPONSE: &[u8] =
    b"HTTP/1.1 201 Created\r\ncontent-length: 2\r\nx-upstream: yes\r\n\r\nok";

/// Read one message: the head (lower-cased) and a `Content-Length` body.
pub(crate) async fn read_message(stream: &mut TcpStream) -> (String, Vec<u8>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before the head was complete");
        buf.extend_from_slice(&chunk[..n]);
    };
    let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
    let length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .map(|v| v.trim().parse::<usize>().unwrap())
        .unwrap_or(0);
    while buf.len() < head_end + length {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before the body was complete");
        buf.extend_from_slice(&chunk[..n]);
    }
    (head, buf[head_end..head_end + length].to_vec())
}

/// Accepts one connection, captures the request it carries, and answers
/// `201 Created` with body `ok`.
pub(crate) async fn spawn_upstream() -> (SocketAddr, oneshot::Receiver<(String, Vec<u8>)>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_message(&mut stream).await;
        stream.write_all(UPSTREAM_RESPONSE).await.unwrap();
        let _ = tx.send(request);
    });
    (addr, rx)
}

/// Send a raw request over a new connection and read the response.
pub(crate) async fn exchange(addr: SocketAddr, raw: String) -> (String, Vec<u8>) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    read_message(&mut stream).await
}
