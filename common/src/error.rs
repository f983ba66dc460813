use std::time::Duration;

use thiserror::Error;

/// Failure taxonomy shared by every scan component.
///
/// Which variant is returned decides how far the failure propagates:
/// connection-class errors fail the owning subsystem, protocol errors fail a
/// single batch or probe, parse errors are skipped, and range/config errors
/// are raised before any socket is opened.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The endpoint refused, reset or could not be reached.
    #[error("connection to {endpoint} failed: {reason}")]
    Connection { endpoint: String, reason: String },

    /// An operation did not complete within its bounded timeout.
    #[error("{operation} timed out after {}ms", timeout.as_millis())]
    Timeout { operation: String, timeout: Duration },

    /// The device answered with an exception or a malformed response.
    #[error("{operation} rejected by device: {reason}")]
    Protocol { operation: String, reason: String },

    /// A fingerprint line did not have the expected shape.
    #[error("unparseable line: {0:?}")]
    Parse(String),

    /// A configured address span, batch size or probe set is invalid.
    #[error("invalid address range: {0}")]
    Range(String),

    /// The configuration file could not be read or decoded.
    #[error("configuration error: {0}")]
    Config(String),

    /// The session was already closed when a request was issued.
    #[error("session to {0} is closed")]
    Closed(String),

    /// The scan was cancelled while the operation was in flight.
    #[error("cancelled")]
    Cancelled,
}

impl ScanError {
    pub fn connection(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::Connection {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout,
        }
    }

    pub fn protocol(operation: impl Into<String>, reason: impl ToString) -> Self {
        Self::Protocol {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Connection-class failures: the transport itself is unusable.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Timeout { .. } | Self::Closed(_)
        )
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
