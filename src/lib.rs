//! # Transcoder - Incremental Charset Conversion
//!
//! A stateful, resumable character-set converter built on the system
//! `iconv(3)` facility. A [`ConversionContext`] owns one conversion
//! descriptor for an ordered pair of charsets; each call to
//! [`ConversionContext::transcode`] performs one bounded step over a
//! caller-provided source window and target window and reports exactly how
//! far both cursors moved.
//!
//! ## Features
//!
//! - **Resumable steps** that keep partial multi-byte and shift state
//!   across buffer boundaries
//! - **In-band soft signals** (`resize`, `invalid`, `incomplete`) for the
//!   conditions a streaming caller is expected to recover from
//! - **Bounds-checked windows** with caller-pinned stop markers
//! - **Streaming driver** for readers, writers and chunked input
//!
//! ## Quick Start
//!
//! ```rust
//! use transcoder::{ConversionContext, TranscodeState};
//!
//! let mut context = ConversionContext::open("UTF-8", "UTF-16LE").unwrap();
//!
//! let source = "hi".as_bytes();
//! let mut target = [0u8; 8];
//! let mut state = TranscodeState::new(source, &mut target);
//! context.transcode(&mut state).unwrap();
//!
//! assert!(state.error.is_none());
//! assert_eq!(state.source_start, 2);
//! assert_eq!(state.produced(), &[b'h', 0, b'i', 0]);
//!
//! context.close().unwrap();
//! ```

#![deny(missing_docs)]

use std::fmt;
use std::io;

pub mod charset;
mod context;
pub mod stream;
mod sys;
mod transcode;

pub use charset::Charset;
pub use context::ConversionContext;
pub use stream::{InvalidPolicy, StreamConfig, StreamStats, StreamTranscoder};
pub use transcode::{Condition, Cursors, TranscodeState, transcode};

/// Result type for transcoding operations
pub type Result<T> = std::result::Result<T, Error>;

/// Which window marker failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bound {
    /// `sourceStart`
    SourceStart,
    /// `sourceStop`
    SourceStop,
    /// `targetStart`
    TargetStart,
    /// `targetStop`
    TargetStop,
}

impl Bound {
    /// Wire name of the marker
    pub fn name(self) -> &'static str {
        match self {
            Bound::SourceStart => "sourceStart",
            Bound::SourceStop => "sourceStop",
            Bound::TargetStart => "targetStart",
            Bound::TargetStop => "targetStop",
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors that can occur while opening, driving or closing a conversion
#[derive(Debug)]
pub enum Error {
    /// A charset name is missing or not plain ASCII
    InvalidArgument(String),
    /// The system library cannot convert between the two charsets
    UnsupportedConversion {
        /// Source charset name
        from: String,
        /// Target charset name
        to: String,
    },
    /// A window marker lies outside its buffer
    OutOfBounds {
        /// Offending marker
        bound: Bound,
        /// Value supplied by the caller
        value: usize,
        /// Upper limit the value had to respect
        limit: usize,
    },
    /// The target range cannot hold the bytes that must be written
    CapacityExceeded {
        /// Target capacity that was offered
        capacity: usize,
    },
    /// A byte sequence is not valid in the source charset
    MalformedInput {
        /// Absolute offset of the offending byte in the input stream
        offset: u64,
    },
    /// Input ended in the middle of a multi-byte sequence
    TruncatedInput {
        /// Absolute offset where the incomplete sequence starts
        offset: u64,
        /// Number of dangling bytes
        len: usize,
    },
    /// The context has already been closed
    InvalidState(&'static str),
    /// The conversion primitive failed with an errno outside the known set
    UnknownFailure {
        /// Raw errno reported by the library
        code: i32,
    },
    /// Reading or writing a stream failed
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::UnsupportedConversion { from, to } => {
                write!(f, "Cannot convert from {} to {}", from, to)
            }
            Error::OutOfBounds {
                bound,
                value,
                limit,
            } => {
                write!(
                    f,
                    "transcode() {} out of bounds ({} > {})",
                    bound, value, limit
                )
            }
            Error::CapacityExceeded { capacity } => {
                write!(
                    f,
                    "Target range of {} bytes is too small for the pending output",
                    capacity
                )
            }
            Error::MalformedInput { offset } => {
                write!(f, "Invalid multi-byte sequence at offset {}", offset)
            }
            Error::TruncatedInput { offset, len } => {
                write!(
                    f,
                    "Input ends with an incomplete {}-byte sequence at offset {}",
                    len, offset
                )
            }
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::UnknownFailure { code } => {
                write!(
                    f,
                    "Conversion failed: {} (errno {})",
                    sys::describe_errno(*code),
                    code
                )
            }
            Error::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}
