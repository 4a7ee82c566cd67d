//! Library-wide error and result types.

use std::fmt;
use std::io;

/// Result alias used throughout bootstore.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors the storage core can produce.
///
/// The command dispatcher collapses every variant into a single failure word;
/// the distinction only exists for logging and for callers inside the crate.
#[derive(Debug)]
pub enum Error {
    /// The device has not been initialized, or its bootstrap failed earlier.
    NotReady,
    /// The physical medium is absent (no card inserted, no flash chip).
    NoMedium,
    /// A magic/signature field did not match the expected value.
    BadMagic,
    /// No partition covers the requested sector range.
    NotFound,
    /// The covering partition has no usable keyslot.
    InvalidKeyslot(u8),
    /// A keyslot was selected that holds no key material.
    MissingKey(u8),
    /// An offset, size or buffer length is outside the valid region.
    InvalidRange,
    /// The underlying transport reported a sector transfer error.
    Io(&'static str),
    /// The scratch buffer for re-encryption could not be allocated.
    OutOfMemory,
    /// The backend does not implement the requested operation.
    Unsupported(&'static str),
    /// A structural constraint was violated (message describes which one).
    Parse(&'static str),
    /// An underlying `std::io` stream failed (configuration loading).
    Stream(io::Error),
}

impl Error {
    /// Whether repeating the same request could succeed.
    ///
    /// Only transient transfer errors qualify; structural failures (bad
    /// header, unknown partition, invalid keyslot) are permanent.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Stream(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotReady => write!(f, "device not initialized"),
            Error::NoMedium => write!(f, "medium not present"),
            Error::BadMagic => write!(f, "bad magic value"),
            Error::NotFound => write!(f, "no partition covers the sector range"),
            Error::InvalidKeyslot(k) => write!(f, "invalid keyslot 0x{k:02X}"),
            Error::MissingKey(k) => write!(f, "keyslot 0x{k:02X} holds no key"),
            Error::InvalidRange => write!(f, "invalid offset or size"),
            Error::Io(s) => write!(f, "I/O error: {s}"),
            Error::OutOfMemory => write!(f, "out of memory"),
            Error::Unsupported(s) => write!(f, "unsupported operation: {s}"),
            Error::Parse(s) => write!(f, "parse error: {s}"),
            Error::Stream(e) => write!(f, "stream error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let Error::Stream(e) = self {
            Some(e)
        } else {
            None
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            return Error::InvalidRange;
        }
        Error::Stream(e)
    }
}
