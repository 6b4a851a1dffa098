//! Transport module - one TCP connection to the rate limiting server.
//!
//! Provides the send-a-line / receive-a-line primitives the client
//! drives its request loop with. No retries happen at this layer.

mod tcp;

pub use tcp::Connection;
