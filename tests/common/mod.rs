//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use keepalive_server::config::ServerConfig;
use keepalive_server::lifecycle::{start, Shutdown};

const IO_DEADLINE: Duration = Duration::from_secs(5);

/// A running server over a temporary site.
pub struct TestServer {
    pub addr: SocketAddr,
    pub dir: TempDir,
    shutdown: Shutdown,
}

impl TestServer {
    pub fn access_log(&self) -> PathBuf {
        self.dir.path().join("access.log")
    }

    pub fn access_log_lines(&self) -> Vec<String> {
        std::fs::read_to_string(self.access_log())
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("root")
    }

    pub fn media(&self) -> PathBuf {
        self.dir.path().join("media")
    }

    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a server on an ephemeral port. `configure` adjusts the defaults.
pub async fn start_server<F>(configure: F) -> TestServer
where
    F: FnOnce(&mut ServerConfig),
{
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("root");
    let media = dir.path().join("media");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::create_dir_all(&media).unwrap();
    std::fs::write(root.join("index.html"), "<h1>Welcome</h1>").unwrap();
    std::fs::write(root.join("logger_name.html"), "<p>Hello, {}!</p>").unwrap();
    std::fs::write(root.join("download.html"), "<ul>{}</ul>").unwrap();
    std::fs::write(root.join("uploaded_image.html"), "<p>Uploaded</p>").unwrap();
    std::fs::write(media.join("cat.jpg"), [0xFFu8, 0xD8, 0xFF, 0xE0]).unwrap();

    let text = format!(
        r#"
        [server]
        port = 0
        ip-address = "127.0.0.1"
        keep-alive-timeout = 2
        keep-alive-max-requests = 10

        [resources]
        root = "{0}/root"
        home-page = "{0}/root/index.html"
        media = "{0}/media"

        [logging]
        access-log = "{0}/access.log"
        "#,
        dir.path().display()
    );
    let mut config: ServerConfig = toml::from_str(&text).unwrap();
    configure(&mut config);

    let (server, listener) = start(&config).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    TestServer {
        addr,
        dir,
        shutdown,
    }
}

/// A response as read off the wire.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub head: String,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            (key == name).then(|| value.trim())
        })
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Write `raw` and read one response.
pub async fn exchange(stream: &mut TcpStream, raw: &[u8]) -> HttpResponse {
    stream.write_all(raw).await.unwrap();
    read_response(stream).await.expect("server closed without responding")
}

/// Read one complete response, or `None` if the server closed first.
pub async fn read_response(stream: &mut TcpStream) -> Option<HttpResponse> {
    tokio::time::timeout(IO_DEADLINE, read_response_inner(stream))
        .await
        .expect("timed out waiting for response")
}

async fn read_response_inner(stream: &mut TcpStream) -> Option<HttpResponse> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let boundary = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..boundary]).into_owned();
    let status = head.split_whitespace().nth(1)?.parse().ok()?;
    let length: usize = head
        .lines()
        .find_map(|line| line.strip_prefix("Content-Length:"))
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(0);

    let start = boundary + 4;
    while buf.len() < start + length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Some(HttpResponse {
        status,
        head,
        body: buf[start..start + length].to_vec(),
    })
}

/// Whether the server has closed `stream` (EOF or reset within the deadline).
pub async fn is_closed(stream: &mut TcpStream) -> bool {
    let mut byte = [0u8; 1];
    match tokio::time::timeout(IO_DEADLINE, stream.read(&mut byte)).await {
        Ok(Ok(0)) | Ok(Err(_)) => true,
        Ok(Ok(_)) | Err(_) => false,
    }
}

/// A GET request with optional extra header lines.
pub fn get(path: &str, headers: &[&str]) -> Vec<u8> {
    let mut raw = format!("GET {} HTTP/1.1\r\nHost: localhost\r\nUser-Agent: it-tests\r\n", path);
    for header in headers {
        raw.push_str(header);
        raw.push_str("\r\n");
    }
    raw.push_str("\r\n");
    raw.into_bytes()
}

/// Wait until the access log has at least `count` lines.
pub async fn wait_for_log(server: &TestServer, count: usize) -> Vec<String> {
    for _ in 0..50 {
        let lines = server.access_log_lines();
        if lines.len() >= count {
            return lines;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    server.access_log_lines()
}
