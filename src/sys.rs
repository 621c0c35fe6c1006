//! Thin bindings over the system `iconv(3)` facility.
//!
//! Everything unsafe lives here. The rest of the crate only sees
//! [`Descriptor`], which owns one `iconv_t` and exposes bounds-checked
//! slice based calls.

use std::ffi::CStr;
use std::io;
use std::ptr;

use libc::{c_char, iconv, iconv_close, iconv_open, iconv_t, size_t};

const FAILED: size_t = size_t::MAX;

/// What a single call into the primitive did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawStep {
    /// Bytes left unconsumed in the input window
    pub in_left: usize,
    /// Bytes left unwritten in the output window
    pub out_left: usize,
    /// `Ok(irreversible)` or `Err(errno)`
    pub status: Result<usize, i32>,
}

/// An open `iconv_t`.
#[derive(Debug)]
pub(crate) struct Descriptor {
    raw: iconv_t,
}

// The descriptor carries no thread affinity; exclusive access is enforced
// through `&mut self`.
unsafe impl Send for Descriptor {}

impl Descriptor {
    /// Open a path converting `from` into `to`. Returns the errno on failure.
    pub fn open(from: &CStr, to: &CStr) -> Result<Self, i32> {
        // iconv_open takes the target first.
        let raw = unsafe { iconv_open(to.as_ptr(), from.as_ptr()) };
        if raw as isize == -1 {
            return Err(last_errno());
        }
        Ok(Self { raw })
    }

    /// Run the primitive once over `input` and `output`.
    pub fn convert(&mut self, input: &[u8], output: &mut [u8]) -> RawStep {
        let mut in_ptr = input.as_ptr() as *mut c_char;
        let mut in_left: size_t = input.len();
        let mut out_ptr = output.as_mut_ptr() as *mut c_char;
        let mut out_left: size_t = output.len();

        // iconv never writes through the input pointer, it only advances it.
        let ret = unsafe {
            iconv(
                self.raw,
                &mut in_ptr,
                &mut in_left,
                &mut out_ptr,
                &mut out_left,
            )
        };

        RawStep {
            in_left,
            out_left,
            status: if ret == FAILED {
                Err(last_errno())
            } else {
                Ok(ret)
            },
        }
    }

    /// Emit the shift reset sequence into `output`.
    pub fn flush(&mut self, output: &mut [u8]) -> RawStep {
        let mut out_ptr = output.as_mut_ptr() as *mut c_char;
        let mut out_left: size_t = output.len();

        let ret = unsafe {
            iconv(
                self.raw,
                ptr::null_mut(),
                ptr::null_mut(),
                &mut out_ptr,
                &mut out_left,
            )
        };

        RawStep {
            in_left: 0,
            out_left,
            status: if ret == FAILED {
                Err(last_errno())
            } else {
                Ok(ret)
            },
        }
    }

    /// Release the descriptor.
    pub fn close(self) -> Result<(), i32> {
        let raw = self.raw;
        std::mem::forget(self);
        if unsafe { iconv_close(raw) } == 0 {
            Ok(())
        } else {
            Err(last_errno())
        }
    }
}

impl Drop for Descriptor {
    fn drop(&mut self) {
        unsafe {
            iconv_close(self.raw);
        }
    }
}

fn last_errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Human readable text for an errno value.
pub(crate) fn describe_errno(code: i32) -> String {
    io::Error::from_raw_os_error(code).to_string()
}

pub(crate) use libc::{E2BIG, EILSEQ, EINVAL};
