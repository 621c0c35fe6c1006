//! Conversion contexts: one open descriptor per ordered charset pair.

use std::ffi::CString;

use crate::sys::{self, Descriptor};
use crate::transcode::{self, TranscodeState};
use crate::{Error, Result};

/// Longest shift reset sequence any supported stateful charset emits.
const RESET_SCRATCH: usize = 32;

/// A stateful conversion path from one charset to another.
///
/// The context keeps the descriptor's shift state between calls, so a
/// multi-byte sequence split across two source windows is completed by the
/// second call. Steps need `&mut self`; share a context between threads only
/// behind your own lock.
#[derive(Debug)]
pub struct ConversionContext {
    source_charset: String,
    target_charset: String,
    descriptor: Option<Descriptor>,
}

impl ConversionContext {
    /// Open a conversion from `source_charset` to `target_charset`.
    ///
    /// Names use the host library's spelling, e.g. `"UTF-8"` or
    /// `"ISO-8859-1"`. An empty or non-ASCII name fails with
    /// [`Error::InvalidArgument`]; a pair the library does not know fails
    /// with [`Error::UnsupportedConversion`] and allocates nothing. Any other
    /// library failure surfaces as [`Error::UnknownFailure`].
    pub fn open(source_charset: &str, target_charset: &str) -> Result<Self> {
        let from = charset_name(source_charset, "source")?;
        let to = charset_name(target_charset, "target")?;

        let descriptor = Descriptor::open(&from, &to).map_err(|code| {
            tracing::debug!(
                source = source_charset,
                target = target_charset,
                code,
                "conversion open rejected"
            );
            open_error(code, source_charset, target_charset)
        })?;

        tracing::debug!(
            source = source_charset,
            target = target_charset,
            "opened conversion context"
        );

        Ok(Self {
            source_charset: source_charset.to_string(),
            target_charset: target_charset.to_string(),
            descriptor: Some(descriptor),
        })
    }

    /// Get source charset name
    pub fn source_charset(&self) -> &str {
        &self.source_charset
    }

    /// Get target charset name
    pub fn target_charset(&self) -> &str {
        &self.target_charset
    }

    /// Whether the descriptor can still be used
    pub fn is_open(&self) -> bool {
        self.descriptor.is_some()
    }

    /// Run one conversion step. See [`transcode::transcode`].
    pub fn transcode<'s, 'a>(
        &mut self,
        state: &'s mut TranscodeState<'a>,
    ) -> Result<&'s mut TranscodeState<'a>> {
        transcode::transcode(self, state)
    }

    /// Write the shift reset sequence into `target` and return the
    /// descriptor to its initial state. Returns the number of bytes written,
    /// which is zero for stateless charsets.
    pub fn reset(&mut self, target: &mut [u8]) -> Result<usize> {
        let descriptor = self.descriptor_mut()?;
        let step = descriptor.flush(target);
        let written = target.len() - step.out_left;

        match step.status {
            Ok(_) => {
                tracing::debug!(written, "flushed shift reset sequence");
                Ok(written)
            }
            Err(sys::E2BIG) => Err(Error::CapacityExceeded {
                capacity: target.len(),
            }),
            Err(code) => Err(Error::UnknownFailure { code }),
        }
    }

    /// Flush the reset sequence into `target`, then release the descriptor.
    ///
    /// If the sequence does not fit, fails with [`Error::CapacityExceeded`]
    /// and the context stays open.
    pub fn close_into(&mut self, target: &mut [u8]) -> Result<usize> {
        let written = self.reset(target)?;
        self.release()?;
        Ok(written)
    }

    /// Flush the reset sequence and release the descriptor.
    ///
    /// The flushed bytes are discarded; use [`close_into`](Self::close_into)
    /// when they belong in the output. Closing twice fails with
    /// [`Error::InvalidState`].
    pub fn close(&mut self) -> Result<usize> {
        let mut scratch = [0u8; RESET_SCRATCH];
        self.close_into(&mut scratch)
    }

    pub(crate) fn descriptor_mut(&mut self) -> Result<&mut Descriptor> {
        self.descriptor
            .as_mut()
            .ok_or(Error::InvalidState("conversion context is closed"))
    }

    fn release(&mut self) -> Result<()> {
        let descriptor = self
            .descriptor
            .take()
            .ok_or(Error::InvalidState("conversion context is closed"))?;

        tracing::debug!(
            source = %self.source_charset,
            target = %self.target_charset,
            "closing conversion context"
        );
        descriptor
            .close()
            .map_err(|code| Error::UnknownFailure { code })
    }
}

/// `EINVAL` is the library's answer for an unknown pair; anything else
/// (descriptor table full, out of memory) is passed through.
fn open_error(code: i32, source_charset: &str, target_charset: &str) -> Error {
    if code == sys::EINVAL {
        Error::UnsupportedConversion {
            from: source_charset.to_string(),
            to: target_charset.to_string(),
        }
    } else {
        Error::UnknownFailure { code }
    }
}

fn charset_name(name: &str, role: &str) -> Result<CString> {
    if name.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "a {} charset is required",
            role
        )));
    }
    if !name.is_ascii() {
        return Err(Error::InvalidArgument(format!(
            "{} charset must be an ASCII value",
            role
        )));
    }
    CString::new(name).map_err(|_| {
        Error::InvalidArgument(format!("{} charset must not contain NUL bytes", role))
    })
}
