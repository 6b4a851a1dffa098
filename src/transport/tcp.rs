//! Line-oriented connection over a byte stream.
//!
//! [`Connection`] owns the stream exclusively. It is generic so tests can
//! substitute an in-memory duplex pipe; production code uses `TcpStream`.
//!
//! # Example
//!
//! ```ignore
//! use tokenbucket_client::transport::Connection;
//!
//! let mut conn = Connection::open("127.0.0.1", 4444, None, 1024).await?;
//! conn.send_line("CONSUME foo").await?;
//! let reply = conn.receive_line().await?;
//! conn.close().await;
//! ```

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{Result, TokenBucketError};
use crate::protocol::LineBuffer;

/// Size of a single socket read.
const READ_CHUNK_SIZE: usize = 4096;

/// A live connection to one server address.
pub struct Connection<S = TcpStream> {
    /// `None` once closed.
    stream: Option<S>,
    /// Bytes received but not yet returned as a line.
    buffer: LineBuffer,
    /// Peer address, for diagnostics.
    peer: String,
}

impl Connection<TcpStream> {
    /// Resolve `host` and connect to `host:port`.
    ///
    /// With `connect_timeout` set, a connect that has not completed in
    /// time fails with `ConnectTimeout`. No retries are attempted.
    pub async fn open(
        host: &str,
        port: u16,
        connect_timeout: Option<Duration>,
        max_line_length: usize,
    ) -> Result<Self> {
        let addr = format!("{}:{}", host, port);

        let connect = TcpStream::connect((host, port));
        let stream = match connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, connect)
                .await
                .map_err(|_| TokenBucketError::ConnectTimeout {
                    addr: addr.clone(),
                    timeout,
                })?,
            None => connect.await,
        }
        .map_err(|source| TokenBucketError::Connect {
            addr: addr.clone(),
            source,
        })?;

        // Requests are tiny and latency-bound.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::trace!("Failed to set TCP_NODELAY on {}: {}", addr, e);
        }

        tracing::debug!("Connected to {}", addr);
        Ok(Self::from_stream(stream, addr, max_line_length))
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already-connected stream.
    pub fn from_stream(stream: S, peer: impl Into<String>, max_line_length: usize) -> Self {
        Self {
            stream: Some(stream),
            buffer: LineBuffer::with_max_line_length(max_line_length),
            peer: peer.into(),
        }
    }

    /// Peer address this connection was opened to.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Write `line` followed by a single `\n`.
    ///
    /// The line and terminator go out in one `write_all`; a short or
    /// failed write is reported as `Write` and is not resumed.
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;

        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');

        stream
            .write_all(&bytes)
            .await
            .map_err(TokenBucketError::Write)?;
        stream.flush().await.map_err(TokenBucketError::Write)?;

        tracing::trace!("-> {}: {}", self.peer, line);
        Ok(())
    }

    /// Read until one full line is available and return it without the
    /// terminator.
    ///
    /// Keeps reading across as many socket reads as needed. Fails with
    /// `ConnectionClosed` if the peer closes first and with `LineTooLong`
    /// if the buffer limit is passed without a terminator.
    pub async fn receive_line(&mut self) -> Result<String> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            if let Some(line) = self.buffer.next_line()? {
                tracing::trace!("<- {}: {}", self.peer, line);
                return Ok(line);
            }

            let stream = self
                .stream
                .as_mut()
                .ok_or(TokenBucketError::ConnectionClosed)?;
            let n = stream
                .read(&mut chunk)
                .await
                .map_err(TokenBucketError::Read)?;

            if n == 0 {
                if !self.buffer.is_empty() {
                    tracing::debug!(
                        "{} closed with {} bytes of unterminated reply",
                        self.peer,
                        self.buffer.len()
                    );
                }
                return Err(TokenBucketError::ConnectionClosed);
            }

            self.buffer.extend(&chunk[..n]);
        }
    }

    /// Shut down the stream. Calling it again is a no-op.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::trace!("Shutdown of {} failed: {}", self.peer, e);
            }
            self.buffer.clear();
            tracing::debug!("Closed connection to {}", self.peer);
        }
    }
}

/// Write attempted after `close`.
fn not_connected() -> TokenBucketError {
    TokenBucketError::Write(std::io::Error::from(std::io::ErrorKind::NotConnected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    const LIMIT: usize = 1024;

    #[tokio::test]
    async fn test_send_line_appends_newline() {
        let (client, mut server) = duplex(64);
        let mut conn = Connection::from_stream(client, "mem", LIMIT);

        conn.send_line("CONSUME foo").await.unwrap();

        let mut buf = [0u8; 12];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"CONSUME foo\n");
    }

    #[tokio::test]
    async fn test_receive_line_across_chunks() {
        let (client, mut server) = duplex(64);
        let mut conn = Connection::from_stream(client, "mem", LIMIT);

        let writer = tokio::spawn(async move {
            server.write_all(b"O").await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            server.write_all(b"K\n").await.unwrap();
            server
        });

        assert_eq!(conn.receive_line().await.unwrap(), "OK");
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn test_receive_line_keeps_leftover() {
        let (client, mut server) = duplex(64);
        let mut conn = Connection::from_stream(client, "mem", LIMIT);

        server.write_all(b"WAIT 0\nOK\n").await.unwrap();

        assert_eq!(conn.receive_line().await.unwrap(), "WAIT 0");
        assert_eq!(conn.receive_line().await.unwrap(), "OK");
    }

    #[tokio::test]
    async fn test_receive_line_peer_closed() {
        let (client, mut server) = duplex(64);
        let mut conn = Connection::from_stream(client, "mem", LIMIT);

        server.write_all(b"OK").await.unwrap();
        drop(server);

        let err = conn.receive_line().await.unwrap_err();
        assert!(matches!(err, TokenBucketError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_receive_line_too_long() {
        let (client, mut server) = duplex(256);
        let mut conn = Connection::from_stream(client, "mem", 16);

        server.write_all(&[b'x'; 64]).await.unwrap();

        let err = conn.receive_line().await.unwrap_err();
        assert!(matches!(err, TokenBucketError::LineTooLong { limit: 16 }));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (client, _server) = duplex(64);
        let mut conn = Connection::from_stream(client, "mem", LIMIT);

        conn.close().await;
        conn.close().await;
        assert!(conn.is_closed());

        let err = conn.send_line("CONSUME foo").await.unwrap_err();
        assert!(matches!(err, TokenBucketError::Write(_)));
    }

    #[tokio::test]
    async fn test_receive_after_close_is_read_side_error() {
        let (client, _server) = duplex(64);
        let mut conn = Connection::from_stream(client, "mem", LIMIT);

        conn.close().await;

        let err = conn.receive_line().await.unwrap_err();
        assert!(matches!(err, TokenBucketError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_open_refused() {
        // Bind then drop to find a port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = Connection::open("127.0.0.1", port, Some(Duration::from_secs(2)), LIMIT)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TokenBucketError::Connect { .. }));
    }
}
