use std::{fmt, io};

/// Error kinds per spec §7. Timeouts and semantic mismatches are *not*
/// represented here: per spec they surface as `Ok(None)`/`false`, not `Err`.
#[derive(Debug)]
pub enum Error {
    /// Resource acquisition failure: socket open/bind/join, TLS context
    /// creation.
    Io(io::Error),
    /// Transport-level TLS failure.
    Tls(String),
    /// Malformed input: bad mDNS header/name, truncated record, unknown
    /// protobuf wire type, missing required frame field, JSON parse
    /// failure.
    Malformed(&'static str),
    /// A call was made against a connection that is not open.
    NotConnected,
    /// Programmer error: invalid enum value, bad format string, etc.
    InvalidArgument(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Tls(e) => write!(f, "TLS error: {}", e),
            Error::Malformed(what) => write!(f, "malformed input: {}", what),
            Error::NotConnected => write!(f, "connection is closed"),
            Error::InvalidArgument(what) => write!(f, "invalid argument: {}", what),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<native_tls::Error> for Error {
    fn from(e: native_tls::Error) -> Self {
        Error::Tls(e.to_string())
    }
}

impl<S> From<native_tls::HandshakeError<S>> for Error {
    fn from(e: native_tls::HandshakeError<S>) -> Self {
        Error::Tls(e.to_string())
    }
}
