//! Error taxonomy for the visibility subsystem.
//!
//! Every public operation returns `VisibilityError`. Wrappers preserve the
//! error kind; the metrics layer splits failure counters by [`ErrorKind`].

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, VisibilityError>;

/// Error surface of the visibility store and its wrappers.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum VisibilityError {
    /// Malformed page token or invalid filter combination.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Admission rejection (rate limit, sampling) or backend throttling.
    #[error("service busy: {0}")]
    ServiceBusy(String),
    /// Write issued to a read-only backend.
    #[error("operation not supported: {0}")]
    OperationNotSupported(String),
    /// Unsupported encoding tag on write.
    #[error("unknown or unsupported encoding type \"{0}\"")]
    UnknownEncoding(String),
    /// Codec failure while producing a blob.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Codec failure while reading a blob; message names the encoding tag.
    #[error("deserialization error: {0}")]
    Deserialization(String),
    /// Any other backend failure; message names the operation and cause.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse error classification used for failure counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    ServiceBusy,
    OperationNotSupported,
    UnknownEncoding,
    Serialization,
    Deserialization,
    Internal,
}

impl ErrorKind {
    /// Number of kinds; sizes per-kind counter arrays.
    pub const COUNT: usize = 7;

    /// Stable index into per-kind counter arrays.
    pub fn index(self) -> usize {
        match self {
            ErrorKind::BadRequest => 0,
            ErrorKind::ServiceBusy => 1,
            ErrorKind::OperationNotSupported => 2,
            ErrorKind::UnknownEncoding => 3,
            ErrorKind::Serialization => 4,
            ErrorKind::Deserialization => 5,
            ErrorKind::Internal => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::ServiceBusy => "service_busy",
            ErrorKind::OperationNotSupported => "operation_not_supported",
            ErrorKind::UnknownEncoding => "unknown_encoding",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Deserialization => "deserialization",
            ErrorKind::Internal => "internal",
        }
    }
}

impl VisibilityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VisibilityError::BadRequest(_) => ErrorKind::BadRequest,
            VisibilityError::ServiceBusy(_) => ErrorKind::ServiceBusy,
            VisibilityError::OperationNotSupported(_) => ErrorKind::OperationNotSupported,
            VisibilityError::UnknownEncoding(_) => ErrorKind::UnknownEncoding,
            VisibilityError::Serialization(_) => ErrorKind::Serialization,
            VisibilityError::Deserialization(_) => ErrorKind::Deserialization,
            VisibilityError::Internal(_) => ErrorKind::Internal,
        }
    }
}
