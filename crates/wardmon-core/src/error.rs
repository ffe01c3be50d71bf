//! Error types for the Wardmon core library

use std::io;
use thiserror::Error;

/// Result type alias for Wardmon operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the probe engine and both roles
///
/// The handling policy is layered: per-probe errors never abort a probe
/// cycle, per-cycle errors never abort the tester, and per-peer errors
/// never abort the monitor.
#[derive(Error, Debug)]
pub enum Error {
    /// IPv4 validation failed at probe construction; fatal for that probe
    #[error("Invalid IPv4 address: {0}")]
    InvalidAddress(String),

    /// The per-probe hard timeout elapsed; the engine has aborted
    #[error("Probe timed out")]
    Timeout,

    /// Raw-socket or TCP transport failure; retried on the next tick
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O errors with automatic conversion
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Oversized or malformed length in a partial datagram
    #[error("Framing error: {0}")]
    Framing(String),

    /// Malformed control record; the record is discarded, the peer kept
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Missing or malformed configuration; the affected target is omitted
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidAddress("300.0.0.1".to_string());
        assert_eq!(err.to_string(), "Invalid IPv4 address: 300.0.0.1");

        let err = Error::Timeout;
        assert_eq!(err.to_string(), "Probe timed out");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<Vec<i32>>("not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_error_result_type() {
        fn returns_result() -> Result<i32> {
            Err(Error::Timeout)
        }

        assert!(matches!(returns_result(), Err(Error::Timeout)));
    }
}
