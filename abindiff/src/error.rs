// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

use std::{
    error,
    fmt::{self, Display, Formatter},
    io,
};

use crate::hash::HashAlgorithm;

/// An error indicating that diffing or patching failed.
///
/// Every variant aborts the whole operation. Nothing is retried, and no partial result is
/// returned.
///
/// # Examples
///
/// ```
/// use abindiff::{Error, FormatError, PatchReader};
///
/// // Garbage data
/// let patch = b"bsdiff40\n\n";
/// let reader = PatchReader::new(patch.as_ref());
///
/// assert!(matches!(reader, Err(Error::Format(FormatError::UnknownFormat))));
/// ```
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred on one of the streams
    Io(io::Error),
    /// The patch is malformed
    Format(FormatError),
    /// The data doesn't match what the patch describes
    Integrity(IntegrityError),
    /// The requested operation can't be performed with this patch or configuration
    Unsupported(Unsupported),
}

/// The ways a patch stream can be malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FormatError {
    /// The magic and version line is not `abindiff 001`
    UnknownFormat,
    /// The header block exceeds [`MAX_HEADER_SIZE`](crate::MAX_HEADER_SIZE)
    HeaderTooLarge,
    /// The stream ended before the blank line closing the header block
    UnterminatedHeader,
    /// A header line has no `:` separator
    MalformedHeaderLine(String),
    /// The header block is not valid UTF-8
    NonUtf8Header,
    /// An action line exceeds [`MAX_ACTION_SIZE`](crate::MAX_ACTION_SIZE)
    ActionTooLarge,
    /// An action line has no length field or is not valid UTF-8
    MalformedAction,
    /// The record type is not one of `=`, `-` or `+`
    UnknownAction(String),
    /// The record length is not a decimal number
    BadLength(String),
    /// A record tag has no `=` separator
    MalformedTag(String),
    /// The stream ended in the middle of an action line
    TruncatedAction,
    /// The stream ended in the middle of a record payload
    TruncatedPayload,
    /// The bytes after a payload are not `\n\n`
    BadTerminator,
}

/// Which file a failed integrity check refers to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Side {
    /// The file the patch was created from (`1-` headers)
    Old,
    /// The file the patch was created for (`2-` headers)
    New,
    /// The file produced by an in-place patch, whichever side that is
    Output,
}

/// The ways data can fail to match a patch.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IntegrityError {
    /// A removed span stored in the patch differs from the source bytes at `offset`
    RemovedDataMismatch {
        /// Offset of the span in the source stream
        offset: u64,
    },
    /// A whole-file digest differs from the one declared in the patch headers
    HashMismatch {
        /// The file whose digest differs
        side: Side,
        /// The algorithm used
        algorithm: HashAlgorithm,
        /// The digest declared in the patch
        expected: String,
        /// The digest actually computed
        actual: String,
    },
}

/// Operations refused because of the patch contents or the caller's configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Unsupported {
    /// The hash algorithm name is not `md5sum`, `sha1sum` or `sha256sum`
    UnknownHashAlgorithm(String),
    /// The patch omits removed data, so it can't be reverted
    NotRevertible,
    /// Hash verification was forced, but the patch carries no usable digest pair
    MissingHashsums,
    /// An input stream held a different number of bytes than the caller declared
    SizeMismatch {
        /// The size the caller declared
        declared: u64,
        /// The number of bytes actually read
        actual: u64,
    },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Format(e) => write!(f, "bad patch format: {e}"),
            Error::Integrity(e) => write!(f, "integrity check failed: {e}"),
            Error::Unsupported(e) => write!(f, "unsupported: {e}"),
        }
    }
}

impl Display for FormatError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            FormatError::UnknownFormat => write!(f, "unknown patch format"),
            FormatError::HeaderTooLarge => write!(f, "too many headers"),
            FormatError::UnterminatedHeader => {
                write!(f, "unexpected end of patch while reading headers")
            }
            FormatError::MalformedHeaderLine(line) => write!(f, "bad header line {line:?}"),
            FormatError::NonUtf8Header => write!(f, "headers are not valid UTF-8"),
            FormatError::ActionTooLarge => write!(f, "too big action header"),
            FormatError::MalformedAction => write!(f, "bad action header format"),
            FormatError::UnknownAction(action) => write!(f, "bad action type {action:?}"),
            FormatError::BadLength(len) => write!(f, "bad action size {len:?}"),
            FormatError::MalformedTag(tag) => write!(f, "bad block header {tag:?}"),
            FormatError::TruncatedAction => {
                write!(f, "unexpected end of patch while reading action")
            }
            FormatError::TruncatedPayload => {
                write!(f, "unexpected end of patch while reading data")
            }
            FormatError::BadTerminator => write!(f, "bad data ending"),
        }
    }
}

impl Display for Side {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Side::Old => write!(f, "old file"),
            Side::New => write!(f, "new file"),
            Side::Output => write!(f, "saved file"),
        }
    }
}

impl Display for IntegrityError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            IntegrityError::RemovedDataMismatch { offset } => {
                write!(f, "input file differs from removed data at offset {offset}")
            }
            IntegrityError::HashMismatch {
                side,
                algorithm,
                expected,
                actual,
            } => write!(
                f,
                "{algorithm} of {side} is not equal: expected {expected}, found {actual}",
            ),
        }
    }
}

impl Display for Unsupported {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Unsupported::UnknownHashAlgorithm(name) => write!(f, "unknown hasher {name:?}"),
            Unsupported::NotRevertible => write!(f, "this patch is not revertible"),
            Unsupported::MissingHashsums => write!(f, "this patch has no checksums"),
            Unsupported::SizeMismatch { declared, actual } => {
                write!(f, "expected {declared} bytes of input, found {actual}")
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Format(e) => Some(e),
            Error::Integrity(e) => Some(e),
            Error::Unsupported(e) => Some(e),
        }
    }
}

impl error::Error for FormatError {}

impl error::Error for IntegrityError {}

impl error::Error for Unsupported {}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Error::Io(value)
    }
}

impl From<FormatError> for Error {
    fn from(value: FormatError) -> Self {
        Error::Format(value)
    }
}

impl From<IntegrityError> for Error {
    fn from(value: IntegrityError) -> Self {
        Error::Integrity(value)
    }
}

impl From<Unsupported> for Error {
    fn from(value: Unsupported) -> Self {
        Error::Unsupported(value)
    }
}
