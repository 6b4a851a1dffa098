//! Line buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` so that bytes left over after a line is
//! extracted stay in place for the next call. A reply may arrive split
//! across any number of socket reads (`"O"` then `"K\n"`); nothing is
//! handed out until the `\n` terminator has been seen.
//!
//! # Example
//!
//! ```
//! use tokenbucket_client::protocol::LineBuffer;
//!
//! let mut buffer = LineBuffer::new();
//!
//! buffer.extend(b"O");
//! assert_eq!(buffer.next_line().unwrap(), None);
//!
//! buffer.extend(b"K\n");
//! assert_eq!(buffer.next_line().unwrap().as_deref(), Some("OK"));
//! ```

use bytes::BytesMut;

use super::wire_format::DEFAULT_MAX_LINE_LENGTH;
use crate::error::{Result, TokenBucketError};

/// Buffer for accumulating incoming bytes and extracting complete lines.
pub struct LineBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Prefix of `buffer` already searched for `\n`.
    scanned: usize,
    /// Maximum line length, terminator excluded.
    max_line_length: usize,
}

impl LineBuffer {
    /// Create a new line buffer with the default line limit (64KB).
    pub fn new() -> Self {
        Self::with_max_line_length(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Create a new line buffer with a custom line limit.
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(1024),
            scanned: 0,
            max_line_length,
        }
    }

    /// Append raw bytes from a socket read.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract the next complete line.
    ///
    /// Returns:
    /// - `Ok(Some(line))` with the terminator (and a preceding `\r`) stripped
    /// - `Ok(None)` if more data is needed
    /// - `Err(LineTooLong)` if the limit is passed without a terminator
    pub fn next_line(&mut self) -> Result<Option<String>> {
        let newline = self.buffer[self.scanned..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|pos| self.scanned + pos);

        let Some(end) = newline else {
            self.scanned = self.buffer.len();
            if self.buffer.len() > self.max_line_length {
                return Err(TokenBucketError::LineTooLong {
                    limit: self.max_line_length,
                });
            }
            return Ok(None);
        };

        if end > self.max_line_length {
            return Err(TokenBucketError::LineTooLong {
                limit: self.max_line_length,
            });
        }

        let raw = self.buffer.split_to(end + 1);
        self.scanned = 0;

        let mut line = &raw[..end];
        if let [rest @ .., b'\r'] = line {
            line = rest;
        }

        Ok(Some(String::from_utf8_lossy(line).into_owned()))
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}
