//! Protocol module - wire format and line framing.
//!
//! This module implements the text protocol spoken with the server:
//! - Request encoding and bucket name validation
//! - Reply decoding into [`Response`]
//! - Line buffer for accumulating partial reads

mod line_buffer;
mod wire_format;

pub use line_buffer::LineBuffer;
pub use wire_format::{status, validate_bucket_name, Command, Response, DEFAULT_MAX_LINE_LENGTH};
