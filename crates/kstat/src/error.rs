//! Error types shared by sessions, kstat handles and backends.

use std::fmt;
use std::io;

/// Failure reported by a native backend call.
///
/// Carries the name of the call and the `errno` it left behind, verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    /// Name of the failing call, e.g. `kstat_read`.
    pub op: &'static str,
    /// Raw OS error code (0 when the backend reported none).
    pub errno: i32,
}

impl NativeError {
    pub fn new(op: &'static str, errno: i32) -> Self {
        Self { op, errno }
    }

    /// Captures `errno` as left by the native call that just failed.
    pub fn last_os_error(op: &'static str) -> Self {
        let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0);
        Self { op, errno }
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errno == 0 {
            write!(f, "{} failed", self.op)
        } else {
            write!(
                f,
                "{} failed: {}",
                self.op,
                io::Error::from_raw_os_error(self.errno)
            )
        }
    }
}

impl std::error::Error for NativeError {}

/// Error type for every public kstat operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KstatError {
    /// The session is closed, or the kstat came from a closed session.
    InvalidHandle,
    /// No kstat or named statistic matched.
    NotFound(String),
    /// The operation does not apply to this kind of kstat.
    WrongType {
        kstat: String,
        kind: String,
        expected: &'static str,
    },
    /// Destination size differs from the kstat data size.
    SizeMismatch { expected: usize, actual: usize },
    /// The native backend call failed.
    Native(NativeError),
}

impl fmt::Display for KstatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KstatError::InvalidHandle => write!(f, "invalid kstat or closed session"),
            KstatError::NotFound(what) => write!(f, "{} not found", what),
            KstatError::WrongType {
                kstat,
                kind,
                expected,
            } => write!(f, "kstat {} ({}) is not a {} kstat", kstat, kind, expected),
            KstatError::SizeMismatch { expected, actual } => write!(
                f,
                "size mismatch: kstat data is {} bytes, destination is {} bytes",
                expected, actual
            ),
            KstatError::Native(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for KstatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KstatError::Native(e) => Some(e),
            _ => None,
        }
    }
}

impl From<NativeError> for KstatError {
    fn from(e: NativeError) -> Self {
        KstatError::Native(e)
    }
}
