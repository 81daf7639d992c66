//! Unix socket transport for the local daemon.
//!
//! The socket is plugged into a `ureq` agent as its connector, so framing,
//! keep-alive and body decoding are the same as over HTTPS. Host names are
//! never resolved.

use super::agent::exchange;
use super::rest::{Method, Transport};
use serde_json::Value;
use std::fmt;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use ureq::config::Config;
use ureq::http::Uri;
use ureq::unversioned::resolver::{ResolvedSocketAddrs, Resolver};
use ureq::unversioned::transport::{
    Buffers, ConnectionDetails, Connector, LazyBuffers, NextTimeout, Transport as Wire,
};
use ureq::Agent;

/// Base URL for requests over the socket. The host only fills `Host:`.
const SOCKET_BASE: &str = "http://lxd";

/// HTTP over the daemon's unix socket.
pub struct UnixTransport {
    agent: Agent,
    label: String,
}

impl UnixTransport {
    /// Transport for a socket path. Nothing is opened until a request.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let label = format!("unix:{}", path.display());

        let config = Agent::config_builder().http_status_as_error(false).build();
        let agent = Agent::with_parts(config, SocketConnector { path }, SocketResolver);

        Self { agent, label }
    }
}

impl Transport for UnixTransport {
    fn label(&self) -> &str {
        &self.label
    }

    fn base_url(&self) -> Option<&str> {
        None
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> crate::error::Result<(u16, Value)> {
        let url = format!("{SOCKET_BASE}{path}");
        exchange(&self.agent, &self.label, &url, method, body)
    }
}

/// Connects every `ureq` connection to the same socket path.
#[derive(Debug)]
struct SocketConnector {
    path: PathBuf,
}

impl Connector for SocketConnector {
    type Out = SocketStream;

    fn connect(
        &self,
        details: &ConnectionDetails,
        _chained: Option<()>,
    ) -> Result<Option<Self::Out>, ureq::Error> {
        let stream = UnixStream::connect(&self.path)?;
        log::debug!("connected to {}", self.path.display());

        let config = details.config;
        Ok(Some(SocketStream {
            stream,
            buffers: LazyBuffers::new(config.input_buffer_size(), config.output_buffer_size()),
        }))
    }
}

/// Hands `ureq` a placeholder address; the connector ignores it.
#[derive(Debug)]
struct SocketResolver;

impl Resolver for SocketResolver {
    fn resolve(
        &self,
        _uri: &Uri,
        _config: &Config,
        _timeout: NextTimeout,
    ) -> Result<ResolvedSocketAddrs, ureq::Error> {
        let mut addrs = self.empty();
        addrs.push(SocketAddr::from(([127, 0, 0, 1], 0)));
        Ok(addrs)
    }
}

struct SocketStream {
    stream: UnixStream,
    buffers: LazyBuffers,
}

impl fmt::Debug for SocketStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketStream")
            .field("peer", &self.stream.peer_addr().ok())
            .finish()
    }
}

fn io_failure(err: io::Error, timeout: NextTimeout) -> ureq::Error {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ureq::Error::Timeout(timeout.reason),
        _ => ureq::Error::Io(err),
    }
}

impl Wire for SocketStream {
    fn buffers(&mut self) -> &mut dyn Buffers {
        &mut self.buffers
    }

    fn transmit_output(&mut self, amount: usize, timeout: NextTimeout) -> Result<(), ureq::Error> {
        self.stream
            .set_write_timeout(timeout.not_zero().map(|t| *t))?;
        let output = &self.buffers.output()[..amount];
        self.stream
            .write_all(output)
            .map_err(|e| io_failure(e, timeout))
    }

    fn await_input(&mut self, timeout: NextTimeout) -> Result<bool, ureq::Error> {
        self.stream.set_read_timeout(timeout.not_zero().map(|t| *t))?;
        let input = self.buffers.input_append_buf();
        let amount = self
            .stream
            .read(input)
            .map_err(|e| io_failure(e, timeout))?;
        self.buffers.input_appended(amount);
        Ok(amount > 0)
    }

    fn is_open(&mut self) -> bool {
        idle(&self.stream).unwrap_or(false)
    }
}

/// Whether a pooled connection is still usable: open, with nothing unread.
fn idle(stream: &UnixStream) -> io::Result<bool> {
    stream.set_nonblocking(true)?;
    let mut buf = [0u8; 1];
    let idle = matches!(
        (&*stream).read(&mut buf),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock
    );
    stream.set_nonblocking(false)?;
    Ok(idle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::os::unix::net::UnixListener;
    use std::sync::mpsc;
    use std::thread;
    use tempfile::TempDir;

    fn read_head(conn: &mut UnixStream) -> String {
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = conn.read(&mut buf).unwrap();
            assert!(n > 0, "client closed before sending a request");
            request.extend_from_slice(&buf[..n]);
        }
        String::from_utf8(request).unwrap()
    }

    /// Serve one canned response, then hold the socket open until released.
    fn serve_once(
        path: &Path,
        response: String,
    ) -> (mpsc::Sender<()>, thread::JoinHandle<String>) {
        let listener = UnixListener::bind(path).unwrap();
        let (release, hold) = mpsc::channel::<()>();
        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let head = read_head(&mut conn);
            conn.write_all(response.as_bytes()).unwrap();
            let _ = hold.recv();
            head
        });
        (release, server)
    }

    #[test]
    fn test_missing_socket_is_connection_failure() {
        let dir = TempDir::new().unwrap();
        let transport = UnixTransport::new(dir.path().join("absent.socket"));
        let err = transport.request(Method::Get, "/1.0", None).unwrap_err();
        assert!(matches!(err, Error::ConnectionFailed { .. }));
    }

    #[test]
    fn test_response_with_length_on_open_socket() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lxd.socket");
        let body = r#"{"type":"sync","metadata":{"auth":"trusted"}}"#;
        let (release, server) = serve_once(
            &path,
            format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
                body.len()
            ),
        );

        let transport = UnixTransport::new(&path);
        let (status, value) = transport.request(Method::Get, "/1.0", None).unwrap();
        assert_eq!(status, 200);
        assert_eq!(value["metadata"]["auth"], "trusted");

        release.send(()).unwrap();
        let head = server.join().unwrap();
        assert!(head.starts_with("GET /1.0 HTTP/1.1\r\n"));
    }

    #[test]
    fn test_chunked_error_response() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lxd.socket");
        let (release, server) = serve_once(
            &path,
            "HTTP/1.1 404 Not Found\r\nTransfer-Encoding: chunked\r\n\r\n5\r\n{\"a\":\r\n2\r\n1}\r\n0\r\n\r\n"
                .to_string(),
        );

        let transport = UnixTransport::new(&path);
        let (status, value) = transport
            .request(Method::Delete, "/1.0/containers/ghost", None)
            .unwrap();
        assert_eq!(status, 404);
        assert_eq!(value, serde_json::json!({"a": 1}));

        release.send(()).unwrap();
        assert!(server.join().unwrap().starts_with("DELETE /1.0/containers/ghost "));
    }

    #[test]
    fn test_empty_body_is_null() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lxd.socket");
        let (release, server) = serve_once(
            &path,
            "HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n".to_string(),
        );

        let transport = UnixTransport::new(&path);
        let (status, value) = transport
            .request(Method::Put, "/1.0/containers/web/state", Some(&serde_json::json!({"action": "start"})))
            .unwrap();
        assert_eq!(status, 200);
        assert_eq!(value, Value::Null);

        release.send(()).unwrap();
        let head = server.join().unwrap();
        assert!(head.starts_with("PUT /1.0/containers/web/state HTTP/1.1\r\n"));
    }
}
