//! Client builder and acquisition loop.
//!
//! The [`ClientBuilder`] provides a fluent API for configuring where the
//! server is and how long a call may take. The [`Client`] runs one
//! conversation per call:
//! 1. Connect
//! 2. Send the request line
//! 3. Read one reply line and decode it
//! 4. On `WAIT`, sleep and go back to 2 on the same connection
//! 5. Close the connection on every exit path
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use tokenbucket_client::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .host("127.0.0.1")
//!         .port(4444)
//!         .deadline(Duration::from_secs(5))
//!         .build()?;
//!
//!     let grant = client.acquire("emails").await?;
//!     println!("granted after {} attempts", grant.attempts);
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::{Result, TokenBucketError};
use crate::protocol::{Command, Response};
use crate::stats::BucketStats;
use crate::transport::Connection;

/// A successful token acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct Grant {
    /// Requests sent, including the one that was granted.
    pub attempts: u32,
    /// Total time spent in server-directed backoff.
    pub waited: Duration,
    /// Text the server sent after `OK`.
    pub detail: String,
}

impl Grant {
    /// Bucket statistics, if the server appended them to the grant.
    pub fn stats(&self) -> Option<BucketStats> {
        self.detail.parse().ok()
    }
}

/// Builder for configuring and creating a [`Client`].
pub struct ClientBuilder {
    config: ClientConfig,
    cancel: Option<CancellationToken>,
}

impl ClientBuilder {
    /// Create a new client builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            cancel: None,
        }
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the server host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the server port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the connect timeout. `None` waits for the OS.
    ///
    /// Default: 10 seconds
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Bound the total duration of each `acquire`/`lock` call.
    ///
    /// Default: unbounded
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.config.deadline = Some(deadline);
        self
    }

    /// Bound the number of requests sent by each `acquire`/`lock` call.
    ///
    /// Default: unbounded
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = Some(attempts);
        self
    }

    /// Clamp every server-directed backoff to at most `max_wait`.
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.config.max_wait = Some(max_wait);
        self
    }

    /// Set the longest reply line accepted.
    ///
    /// Default: 64KB
    pub fn max_line_length(mut self, length: usize) -> Self {
        self.config.max_line_length = length;
        self
    }

    /// Use an external cancellation token.
    ///
    /// Cancelling it makes any in-flight call fail with `Cancelled` at its
    /// next suspension point.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Validate the configuration and build the client.
    ///
    /// No connection is made until a command is issued.
    pub fn build(self) -> Result<Client> {
        self.config.validate()?;
        Ok(Client {
            config: self.config,
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Client for a token bucket server.
///
/// Holds no connection between calls; every call opens its own and
/// closes it before returning.
#[derive(Debug, Clone)]
pub struct Client {
    config: ClientConfig,
    cancel: CancellationToken,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Create a client for `host:port` with default limits.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        Self::builder().host(host).port(port).build()
    }

    /// Get the active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Token that cancels this client's in-flight calls.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Consume one token from `bucket`, backing off as long as the server
    /// says `WAIT`.
    ///
    /// Returns once the server answers `OK`. Any failure ends the call:
    /// transport errors are never retried, and without a deadline or
    /// attempt cap a server that keeps answering `WAIT` keeps this
    /// future pending.
    pub async fn acquire(&self, bucket: &str) -> Result<Grant> {
        self.run_until_granted(Command::Consume(bucket)).await
    }

    /// Consume one token and hold the bucket locked until
    /// [`release`](Self::release) or the server's lock timeout.
    ///
    /// Backs off on `WAIT` exactly like [`acquire`](Self::acquire).
    pub async fn lock(&self, bucket: &str) -> Result<Grant> {
        self.run_until_granted(Command::Lock(bucket)).await
    }

    /// Release a lock taken with [`lock`](Self::lock).
    pub async fn release(&self, bucket: &str) -> Result<String> {
        let reply = self.request(Command::Release(bucket)).await?;
        expect_ok(reply)
    }

    /// Change the refill rate of `bucket`, in tokens per second.
    pub async fn set_rate(&self, bucket: &str, rate: f64) -> Result<String> {
        let reply = self.request(Command::Rate { bucket, rate }).await?;
        expect_ok(reply)
    }

    /// Change the capacity of `bucket`.
    pub async fn set_capacity(&self, bucket: &str, capacity: u64) -> Result<String> {
        let reply = self.request(Command::Capacity { bucket, capacity }).await?;
        expect_ok(reply)
    }

    /// Fetch the current statistics of `bucket`.
    pub async fn stats(&self, bucket: &str) -> Result<BucketStats> {
        let reply = self.request(Command::Stats(bucket)).await?;

        // The server answers STATS with the bare stats text, no status token.
        match Response::decode(&reply)? {
            Response::Malformed(raw) => raw.parse(),
            Response::Granted { detail } => detail.parse(),
            Response::Rejected(message) => Err(TokenBucketError::ServerError(message)),
            Response::Wait { .. } => Err(TokenBucketError::UnrecognizedStatus(reply)),
        }
    }

    /// Fetch the server-wide status line.
    pub async fn status(&self) -> Result<String> {
        let reply = self.request(Command::Status).await?;
        let detail = expect_ok(reply)?;
        Ok(detail
            .strip_prefix("STATUS")
            .map(str::trim_start)
            .unwrap_or(&detail)
            .to_string())
    }

    /// Request/backoff loop shared by `acquire` and `lock`.
    async fn run_until_granted(&self, command: Command<'_>) -> Result<Grant> {
        command.validate()?;

        let deadline_at = self.deadline_at();
        let mut conn = self.guarded(deadline_at, self.connect()).await?;

        let result = self.drive(&mut conn, command, deadline_at).await;

        conn.close().await;
        result
    }

    async fn drive(
        &self,
        conn: &mut Connection,
        command: Command<'_>,
        deadline_at: Option<Instant>,
    ) -> Result<Grant> {
        let line = command.encode();
        let mut attempts = 0u32;
        let mut waited = Duration::ZERO;

        loop {
            attempts = attempts.saturating_add(1);
            self.guarded(deadline_at, conn.send_line(&line)).await?;
            let reply = self.guarded(deadline_at, conn.receive_line()).await?;

            match Response::decode(&reply)? {
                Response::Granted { detail } => {
                    tracing::debug!(
                        "{} {} granted after {} attempts ({:?} waited)",
                        command.name(),
                        command.bucket().unwrap_or_default(),
                        attempts,
                        waited
                    );
                    return Ok(Grant {
                        attempts,
                        waited,
                        detail,
                    });
                }
                Response::Wait { delay, .. } => {
                    if self.config.max_attempts.is_some_and(|max| attempts >= max) {
                        return Err(TokenBucketError::AttemptsExhausted { attempts });
                    }

                    let delay = match self.config.max_wait {
                        Some(max) => delay.min(max),
                        None => delay,
                    };

                    // Sleeping past the deadline cannot end in a grant.
                    if let Some(at) = deadline_at {
                        if Instant::now().checked_add(delay).map_or(true, |t| t > at) {
                            return Err(self.deadline_exceeded());
                        }
                    }

                    tracing::debug!(
                        "Server asked to wait {:?} before retrying {} (attempt {})",
                        delay,
                        command.name(),
                        attempts
                    );
                    self.guarded(deadline_at, async {
                        tokio::time::sleep(delay).await;
                        Ok(())
                    })
                    .await?;
                    waited = waited.saturating_add(delay);
                }
                Response::Rejected(message) => {
                    return Err(TokenBucketError::ServerError(message));
                }
                Response::Malformed(raw) => {
                    return Err(TokenBucketError::UnrecognizedStatus(raw));
                }
            }
        }
    }

    /// One request, one reply, on a fresh connection.
    async fn request(&self, command: Command<'_>) -> Result<String> {
        command.validate()?;

        let deadline_at = self.deadline_at();
        let mut conn = self.guarded(deadline_at, self.connect()).await?;

        let result = async {
            self.guarded(deadline_at, conn.send_line(&command.encode()))
                .await?;
            self.guarded(deadline_at, conn.receive_line()).await
        }
        .await;

        conn.close().await;
        result
    }

    async fn connect(&self) -> Result<Connection> {
        Connection::open(
            &self.config.host,
            self.config.port,
            self.config.connect_timeout,
            self.config.max_line_length,
        )
        .await
    }

    /// Run one blocking step, unless cancellation or the deadline gets
    /// there first.
    async fn guarded<T, F>(&self, deadline_at: Option<Instant>, step: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(TokenBucketError::Cancelled);
        }

        let deadline = async {
            match deadline_at {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TokenBucketError::Cancelled),
            _ = deadline => Err(self.deadline_exceeded()),
            result = step => result,
        }
    }

    /// Absolute deadline for a call starting now. A deadline too far out
    /// to represent as an `Instant` is treated as unbounded.
    fn deadline_at(&self) -> Option<Instant> {
        self.config
            .deadline
            .and_then(|d| Instant::now().checked_add(d))
    }

    fn deadline_exceeded(&self) -> TokenBucketError {
        TokenBucketError::DeadlineExceeded {
            deadline: self.config.deadline.unwrap_or_default(),
        }
    }
}

/// Consume one token from `bucket` on the server at `host:port`.
///
/// Shorthand for `Client::new(host, port)?.acquire(bucket)` with no
/// deadline or attempt cap.
pub async fn acquire(host: &str, port: u16, bucket: &str) -> Result<Grant> {
    Client::new(host, port)?.acquire(bucket).await
}

/// Accept only an `OK` reply and return its detail text.
fn expect_ok(reply: String) -> Result<String> {
    match Response::decode(&reply)? {
        Response::Granted { detail } => Ok(detail),
        Response::Rejected(message) => Err(TokenBucketError::ServerError(message)),
        Response::Wait { .. } | Response::Malformed(_) => {
            Err(TokenBucketError::UnrecognizedStatus(reply))
        }
    }
}
