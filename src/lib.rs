//! # tokenbucket-client
//!
//! Rust client for a remote token bucket rate limiting service.
//!
//! The server keeps named buckets. A client asks it to consume one token
//! and is either granted one (`OK`) or told how long to back off
//! (`WAIT <seconds>`). [`Client::acquire`] repeats the request on the same
//! connection until it is granted or something fails.
//!
//! ## Architecture
//!
//! - **Transport**: one TCP connection per call, line-buffered reads
//! - **Protocol**: request encoding and reply decoding
//! - **Client**: the request/backoff loop, with optional deadline,
//!   attempt cap and cancellation
//!
//! ## Example
//!
//! ```ignore
//! use tokenbucket_client::Client;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Client::new("127.0.0.1", 4444).unwrap();
//!     let grant = client.acquire("emails").await.unwrap();
//!     println!("granted: {}", grant.detail);
//! }
//! ```

pub mod config;
pub mod error;
pub mod protocol;
pub mod stats;
pub mod transport;

mod client;

pub use client::{acquire, Client, ClientBuilder, Grant};
pub use config::ClientConfig;
pub use error::{ErrorKind, TokenBucketError};
pub use stats::BucketStats;
pub use tokio_util::sync::CancellationToken;
