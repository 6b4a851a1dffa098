//! Wire format encoding and decoding.
//!
//! The protocol is line-oriented ASCII, one message per `\n`-terminated line:
//! ```text
//! client → server   CONSUME <bucket>
//! server → client   OK [detail...]
//!                   WAIT <seconds> [detail...]
//!                   ERROR <message>
//! ```
//!
//! The client only ever has one request outstanding per connection.

use std::fmt;
use std::time::Duration;

use crate::error::{Result, TokenBucketError};

/// Default maximum reply line length (64 KB).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// Status tokens sent by the server.
pub mod status {
    /// Request succeeded.
    pub const OK: &str = "OK";
    /// Back off for the given number of seconds, then retry.
    pub const WAIT: &str = "WAIT";
    /// Request rejected; the rest of the line is a message.
    pub const ERROR: &str = "ERROR";
}

/// Check that a bucket name can be sent without changing the framing.
///
/// Rejects empty names and anything containing whitespace or control
/// characters, since a space or newline would split the request into
/// extra arguments or extra commands.
pub fn validate_bucket_name(name: &str) -> Result<()> {
    if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(TokenBucketError::InvalidBucketName(name.to_string()));
    }
    Ok(())
}

/// A request line, borrowed from the caller's bucket name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command<'a> {
    /// Take one token.
    Consume(&'a str),
    /// Take one token and hold the bucket exclusively until released.
    Lock(&'a str),
    /// Drop a lock taken with `Lock`.
    Release(&'a str),
    /// Change the refill rate in tokens per second.
    Rate { bucket: &'a str, rate: f64 },
    /// Change the bucket capacity.
    Capacity { bucket: &'a str, capacity: u64 },
    /// Report tokens, rate and capacity of one bucket.
    Stats(&'a str),
    /// Report every bucket on the server.
    Status,
}

impl Command<'_> {
    /// The command keyword.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Consume(_) => "CONSUME",
            Command::Lock(_) => "LOCK",
            Command::Release(_) => "RELEASE",
            Command::Rate { .. } => "RATE",
            Command::Capacity { .. } => "CAPACITY",
            Command::Stats(_) => "STATS",
            Command::Status => "STATUS",
        }
    }

    /// The bucket this command targets, if any.
    pub fn bucket(&self) -> Option<&str> {
        match *self {
            Command::Consume(b)
            | Command::Lock(b)
            | Command::Release(b)
            | Command::Stats(b)
            | Command::Rate { bucket: b, .. }
            | Command::Capacity { bucket: b, .. } => Some(b),
            Command::Status => None,
        }
    }

    /// Validate arguments before anything is written to the wire.
    pub fn validate(&self) -> Result<()> {
        if let Some(bucket) = self.bucket() {
            validate_bucket_name(bucket)?;
        }
        if let Command::Rate { rate, .. } = *self {
            if !rate.is_finite() || rate < 0.0 {
                return Err(TokenBucketError::InvalidArgument(format!(
                    "rate must be a finite non-negative number, got {}",
                    rate
                )));
            }
        }
        Ok(())
    }

    /// Encode to the request line, without the terminator.
    ///
    /// # Example
    ///
    /// ```
    /// use tokenbucket_client::protocol::Command;
    ///
    /// assert_eq!(Command::Consume("api").encode(), "CONSUME api");
    /// ```
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Command<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Command::Rate { bucket, rate } => write!(f, "{} {} {}", self.name(), bucket, rate),
            Command::Capacity { bucket, capacity } => {
                write!(f, "{} {} {}", self.name(), bucket, capacity)
            }
            Command::Status => f.write_str(self.name()),
            Command::Consume(bucket)
            | Command::Lock(bucket)
            | Command::Release(bucket)
            | Command::Stats(bucket) => write!(f, "{} {}", self.name(), bucket),
        }
    }
}

/// A decoded reply line.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// `OK`, with whatever followed the status.
    Granted { detail: String },
    /// `WAIT <seconds>`; retry the same request after `delay`.
    Wait { delay: Duration, detail: String },
    /// `ERROR <message>`.
    Rejected(String),
    /// Any other first token, including an empty line. Holds the raw line.
    Malformed(String),
}

impl Response {
    /// Decode one reply line (terminator already stripped).
    ///
    /// The status is everything before the first space. For `WAIT` the
    /// delay is the first whitespace-separated token after it; anything
    /// that follows is kept as `detail`.
    ///
    /// # Errors
    ///
    /// `MalformedWait` if a `WAIT` argument is missing, non-numeric,
    /// negative or not finite.
    pub fn decode(line: &str) -> Result<Self> {
        let (status, rest) = match line.split_once(' ') {
            Some((status, rest)) => (status, rest),
            None => (line, ""),
        };

        match status {
            status::OK => Ok(Response::Granted {
                detail: rest.trim().to_string(),
            }),
            status::WAIT => {
                let rest = rest.trim_start();
                let (arg, detail) = match rest.split_once(char::is_whitespace) {
                    Some((arg, detail)) => (arg, detail.trim()),
                    None => (rest, ""),
                };
                Ok(Response::Wait {
                    delay: parse_delay(arg)?,
                    detail: detail.to_string(),
                })
            }
            status::ERROR => Ok(Response::Rejected(rest.trim().to_string())),
            _ => Ok(Response::Malformed(line.to_string())),
        }
    }
}

/// Parse a `WAIT` argument in (fractional) seconds.
fn parse_delay(arg: &str) -> Result<Duration> {
    let seconds: f64 = arg
        .parse()
        .map_err(|_| TokenBucketError::MalformedWait(arg.to_string()))?;

    if !seconds.is_finite() || seconds < 0.0 {
        return Err(TokenBucketError::MalformedWait(arg.to_string()));
    }

    Duration::try_from_secs_f64(seconds)
        .map_err(|_| TokenBucketError::MalformedWait(arg.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_consume() {
        assert_eq!(Command::Consume("foo").encode(), "CONSUME foo");
        assert_eq!(Command::Consume("api.v2-users").encode(), "CONSUME api.v2-users");
    }

    #[test]
    fn test_encode_admin_commands() {
        assert_eq!(Command::Lock("foo").encode(), "LOCK foo");
        assert_eq!(Command::Release("foo").encode(), "RELEASE foo");
        assert_eq!(
            Command::Rate { bucket: "foo", rate: 2.5 }.encode(),
            "RATE foo 2.5"
        );
        assert_eq!(
            Command::Capacity { bucket: "foo", capacity: 10 }.encode(),
            "CAPACITY foo 10"
        );
        assert_eq!(Command::Stats("foo").encode(), "STATS foo");
        assert_eq!(Command::Status.encode(), "STATUS");
    }

    #[test]
    fn test_bucket_name_validation() {
        assert!(validate_bucket_name("foo").is_ok());
        assert!(validate_bucket_name("ünïcode.bucket-1").is_ok());

        for bad in ["", "a b", "a\nb", "a\tb", "a\rb", "a\0b", " "] {
            assert!(
                matches!(
                    validate_bucket_name(bad),
                    Err(TokenBucketError::InvalidBucketName(_))
                ),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_validate_rate() {
        assert!(Command::Rate { bucket: "a", rate: 0.0 }.validate().is_ok());
        assert!(Command::Rate { bucket: "a", rate: -1.0 }.validate().is_err());
        assert!(Command::Rate { bucket: "a", rate: f64::NAN }.validate().is_err());
        assert!(Command::Status.validate().is_ok());
        assert!(Command::Stats("a b").validate().is_err());
    }

    #[test]
    fn test_decode_ok() {
        assert_eq!(
            Response::decode("OK").unwrap(),
            Response::Granted { detail: String::new() }
        );
        assert_eq!(
            Response::decode("OK tokens=0.0,rate=1.0,capacity=1").unwrap(),
            Response::Granted {
                detail: "tokens=0.0,rate=1.0,capacity=1".into()
            }
        );
    }

    #[test]
    fn test_decode_wait() {
        assert_eq!(
            Response::decode("WAIT 0.5").unwrap(),
            Response::Wait {
                delay: Duration::from_millis(500),
                detail: String::new()
            }
        );
        assert_eq!(
            Response::decode("WAIT 0.25 Bucket foo is locked").unwrap(),
            Response::Wait {
                delay: Duration::from_millis(250),
                detail: "Bucket foo is locked".into()
            }
        );
        assert_eq!(
            Response::decode("WAIT 0").unwrap(),
            Response::Wait {
                delay: Duration::ZERO,
                detail: String::new()
            }
        );
    }

    #[test]
    fn test_decode_malformed_wait() {
        for line in ["WAIT abc", "WAIT", "WAIT -1", "WAIT NaN", "WAIT inf"] {
            assert!(
                matches!(
                    Response::decode(line),
                    Err(TokenBucketError::MalformedWait(_))
                ),
                "{:?} should be a malformed WAIT",
                line
            );
        }
    }

    #[test]
    fn test_decode_error() {
        assert_eq!(
            Response::decode("ERROR Invalid bucket name").unwrap(),
            Response::Rejected("Invalid bucket name".into())
        );
    }

    #[test]
    fn test_decode_unrecognized() {
        assert_eq!(
            Response::decode("DENIED").unwrap(),
            Response::Malformed("DENIED".into())
        );
        assert_eq!(Response::decode("").unwrap(), Response::Malformed(String::new()));
        // Status tokens are case-sensitive.
        assert_eq!(Response::decode("ok").unwrap(), Response::Malformed("ok".into()));
        assert_eq!(
            Response::decode("OKAY").unwrap(),
            Response::Malformed("OKAY".into())
        );
    }
}
