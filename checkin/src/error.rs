//! Error types for ticket check-in
//!
//! Ticket rejections are not errors; see [`crate::types::CheckInStatus`].

use thiserror::Error;

/// Why the camera could not be acquired
///
/// Fatal to the current capture session only. Retrying `start()` may succeed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AcquisitionError {
    /// The operator or platform refused camera access
    #[error("camera permission denied")]
    PermissionDenied,

    /// No camera is attached
    #[error("no camera device found")]
    NoDevice,

    /// Another application holds the camera
    #[error("camera is busy")]
    DeviceBusy,

    /// The platform has no camera API
    #[error("camera access is not supported")]
    Unsupported,

    /// A stop arrived before the stream did; the late stream was released
    #[error("camera acquisition interrupted by stop")]
    Interrupted,

    /// Anything else reported by the platform
    #[error("camera error: {0}")]
    Other(String),
}

/// A single frame could not be decoded
///
/// Transient. The detection loop reports it and keeps going.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("detection failed: {0}")]
pub struct DetectionError(pub String);

/// A validation call could not complete
///
/// Distinct from a rejected ticket. The code is not consumed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Connection or request could not be made
    #[error("request failed: {0}")]
    Connect(String),

    /// The request exceeded the configured timeout
    #[error("request timed out")]
    Timeout,

    /// The server answered with a non-success status
    #[error("server returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// The response body was not a validation result
    #[error("could not decode response: {0}")]
    Decode(String),
}

/// Operator input that cannot be submitted
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InputError {
    /// Manual entry was blank
    #[error("ticket number is empty")]
    EmptyTicketNumber,

    /// Bulk entry contained no codes
    #[error("batch contains no ticket numbers")]
    EmptyBatch,

    /// Manual or bulk entry without a selected event
    #[error("no event selected")]
    NoEventSelected,

    /// A validation request is already outstanding
    #[error("a validation request is already in flight")]
    Busy,
}
