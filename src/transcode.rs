//! The incremental transcoding protocol.
//!
//! A [`TranscodeState`] carries two caller-owned buffers together with a
//! `[start, stop)` window over each. One step converts as much of the source
//! window as fits into the target window, then advances both `start`
//! cursors. `stop` markers are fixed by the caller and only ever echoed back,
//! so a streaming loop can keep them pinned while the cursors catch up.

use serde::{Deserialize, Serialize};

use crate::context::ConversionContext;
use crate::sys::{self, RawStep};
use crate::{Bound, Error, Result};

/// Soft, recoverable outcome of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    /// Target window filled before the source window was consumed
    Resize,
    /// Source window holds a sequence that is invalid in the source charset
    Invalid,
    /// Source window ends inside a multi-byte sequence
    Incomplete,
}

impl Condition {
    /// Wire tag of the condition
    pub fn as_str(self) -> &'static str {
        match self {
            Condition::Resize => "resize",
            Condition::Invalid => "invalid",
            Condition::Incomplete => "incomplete",
        }
    }

    /// Human-readable explanation stored in [`TranscodeState::message`]
    pub fn message(self) -> &'static str {
        match self {
            Condition::Resize => "There is not sufficient capacity in the target buffer range",
            Condition::Invalid => {
                "An invalid multi-byte sequence has been encountered in the source buffer"
            }
            Condition::Incomplete => {
                "An incomplete multi-byte sequence has been encountered in the source buffer"
            }
        }
    }

    fn from_errno(code: i32) -> Option<Self> {
        match code {
            sys::E2BIG => Some(Condition::Resize),
            sys::EILSEQ => Some(Condition::Invalid),
            sys::EINVAL => Some(Condition::Incomplete),
            _ => None,
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request/response record for one transcoding step
#[derive(Debug)]
pub struct TranscodeState<'a> {
    /// Bytes to convert
    pub source: &'a [u8],
    /// First unread source byte; advanced by each step
    pub source_start: usize,
    /// End of the source window; `None` means the whole buffer
    pub source_stop: Option<usize>,
    /// Destination for converted bytes
    pub target: &'a mut [u8],
    /// First unwritten target byte; advanced by each step
    pub target_start: usize,
    /// End of the target window; `None` means the whole buffer
    pub target_stop: Option<usize>,
    /// Running count of non-reversible substitutions across steps
    pub non_reversible: usize,
    /// Soft condition reported by the most recent step that hit one
    pub error: Option<Condition>,
    /// Explanation accompanying `error`
    pub message: Option<&'static str>,
}

impl<'a> TranscodeState<'a> {
    /// Window both buffers entirely, with cursors at zero
    pub fn new(source: &'a [u8], target: &'a mut [u8]) -> Self {
        Self {
            source,
            source_start: 0,
            source_stop: None,
            target,
            target_start: 0,
            target_stop: None,
            non_reversible: 0,
            error: None,
            message: None,
        }
    }

    /// Restrict the source window to `[start, stop)`
    pub fn with_source_window(mut self, start: usize, stop: usize) -> Self {
        self.source_start = start;
        self.source_stop = Some(stop);
        self
    }

    /// Restrict the target window to `[start, stop)`
    pub fn with_target_window(mut self, start: usize, stop: usize) -> Self {
        self.target_start = start;
        self.target_stop = Some(stop);
        self
    }

    /// Target bytes in front of the target cursor
    pub fn produced(&self) -> &[u8] {
        let end = self.target_start.min(self.target.len());
        &self.target[..end]
    }

    /// Source bytes between the cursor and the stop marker
    pub fn remaining(&self) -> &[u8] {
        let stop = self.source_stop.unwrap_or(self.source.len());
        self.source.get(self.source_start..stop).unwrap_or(&[])
    }

    /// Clear the soft condition before reusing the state
    pub fn clear_error(&mut self) {
        self.error = None;
        self.message = None;
    }

    /// Snapshot of the scalar fields
    pub fn cursors(&self) -> Cursors {
        Cursors {
            source_start: self.source_start,
            source_stop: self.source_stop.unwrap_or(self.source.len()),
            target_start: self.target_start,
            target_stop: self.target_stop.unwrap_or(self.target.len()),
            non_reversible: self.non_reversible,
            error: self.error,
            message: self.message.map(str::to_owned),
        }
    }

    fn resolve(&self) -> Result<Windows> {
        let (source_start, source_stop) = resolve_window(
            self.source_start,
            self.source_stop,
            self.source.len(),
            Bound::SourceStart,
            Bound::SourceStop,
        )?;
        let (target_start, target_stop) = resolve_window(
            self.target_start,
            self.target_stop,
            self.target.len(),
            Bound::TargetStart,
            Bound::TargetStop,
        )?;
        Ok(Windows {
            source_start,
            source_stop,
            target_start,
            target_stop,
        })
    }

    /// Write a step's outcome back. Returns the primitive's errno when it
    /// falls outside the soft conditions.
    fn apply(&mut self, windows: &Windows, step: RawStep) -> Option<i32> {
        self.source_start = windows.source_stop - step.in_left;
        self.target_start = windows.target_stop - step.out_left;
        self.source_stop = Some(windows.source_stop);
        self.target_stop = Some(windows.target_stop);

        match step.status {
            Ok(irreversible) => {
                self.non_reversible += irreversible;
                None
            }
            Err(code) => match Condition::from_errno(code) {
                Some(condition) => {
                    self.error = Some(condition);
                    self.message = Some(condition.message());
                    None
                }
                None => Some(code),
            },
        }
    }
}

/// Serializable view of a state's cursors, using the wire field names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursors {
    /// Source cursor
    pub source_start: usize,
    /// Source window end
    pub source_stop: usize,
    /// Target cursor
    pub target_start: usize,
    /// Target window end
    pub target_stop: usize,
    /// Accumulated non-reversible substitutions
    pub non_reversible: usize,
    /// Soft condition tag
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<Condition>,
    /// Condition explanation
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct Windows {
    source_start: usize,
    source_stop: usize,
    target_start: usize,
    target_stop: usize,
}

fn resolve_window(
    start: usize,
    stop: Option<usize>,
    len: usize,
    start_bound: Bound,
    stop_bound: Bound,
) -> Result<(usize, usize)> {
    if start > len {
        return Err(Error::OutOfBounds {
            bound: start_bound,
            value: start,
            limit: len,
        });
    }
    let stop = stop.unwrap_or(len);
    if stop > len {
        return Err(Error::OutOfBounds {
            bound: stop_bound,
            value: stop,
            limit: len,
        });
    }
    if start > stop {
        return Err(Error::OutOfBounds {
            bound: start_bound,
            value: start,
            limit: stop,
        });
    }
    Ok((start, stop))
}

/// Perform one bounded conversion step against `context`.
///
/// Window markers are validated before any byte moves; a bad marker fails
/// with [`Error::OutOfBounds`] and leaves `state` untouched. On return the
/// cursors sit just past the consumed and produced bytes, both stop markers
/// hold their resolved values and `non_reversible` has been increased by the
/// step's count. `resize`, `invalid` and `incomplete` are reported in
/// `state.error`; a previous tag is not cleared on success.
pub fn transcode<'s, 'a>(
    context: &mut ConversionContext,
    state: &'s mut TranscodeState<'a>,
) -> Result<&'s mut TranscodeState<'a>> {
    let windows = state.resolve()?;
    let descriptor = context.descriptor_mut()?;

    let step = descriptor.convert(
        &state.source[windows.source_start..windows.source_stop],
        &mut state.target[windows.target_start..windows.target_stop],
    );

    tracing::trace!(
        consumed = (windows.source_stop - windows.source_start) - step.in_left,
        produced = (windows.target_stop - windows.target_start) - step.out_left,
        status = ?step.status,
        "transcode step"
    );

    if let Some(code) = state.apply(&windows, step) {
        tracing::warn!(code, "conversion primitive failed outside the known conditions");
        return Err(Error::UnknownFailure { code });
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(from: &str, to: &str) -> ConversionContext {
        ConversionContext::open(from, to).unwrap()
    }

    #[test]
    fn test_default_stops_are_written_back() {
        let mut context = open("UTF-8", "UTF-8");
        let mut target = [0u8; 8];
        let mut state = TranscodeState::new(b"abc", &mut target);
        context.transcode(&mut state).unwrap();

        assert_eq!(state.source_stop, Some(3));
        assert_eq!(state.target_stop, Some(8));
        assert_eq!(state.source_start, 3);
        assert_eq!(state.target_start, 3);
        assert_eq!(state.produced(), b"abc");
    }

    #[test]
    fn test_windows_limit_what_moves() {
        let mut context = open("UTF-8", "UTF-8");
        let mut target = *b"........";
        let mut state = TranscodeState::new(b"abcdef", &mut target)
            .with_source_window(1, 4)
            .with_target_window(2, 7);
        context.transcode(&mut state).unwrap();

        assert_eq!(state.source_start, 4);
        assert_eq!(state.source_stop, Some(4));
        assert_eq!(state.target_start, 5);
        assert_eq!(state.target_stop, Some(7));
        assert_eq!(&target, b"..bcd...");
    }

    #[test]
    fn test_out_of_bounds_leaves_state_untouched() {
        let mut context = open("UTF-8", "UTF-8");
        let mut target = [0u8; 4];

        let cases = [
            (5, None, 0, None, Bound::SourceStart),
            (0, Some(6), 0, None, Bound::SourceStop),
            (0, None, 5, None, Bound::TargetStart),
            (0, None, 0, Some(9), Bound::TargetStop),
            (3, Some(2), 0, None, Bound::SourceStart),
            (0, None, 3, Some(1), Bound::TargetStart),
        ];

        for (source_start, source_stop, target_start, target_stop, expected) in cases {
            let mut state = TranscodeState::new(b"abcd", &mut target);
            state.source_start = source_start;
            state.source_stop = source_stop;
            state.target_start = target_start;
            state.target_stop = target_stop;

            match context.transcode(&mut state) {
                Err(Error::OutOfBounds { bound, .. }) => assert_eq!(bound, expected),
                other => panic!("expected OutOfBounds, got {:?}", other.map(|s| s.cursors())),
            }

            assert_eq!(state.source_start, source_start);
            assert_eq!(state.source_stop, source_stop);
            assert_eq!(state.target_start, target_start);
            assert_eq!(state.target_stop, target_stop);
            assert!(state.error.is_none());
        }
        assert_eq!(target, [0u8; 4]);
    }

    #[test]
    fn test_target_exhaustion_then_resume() {
        let mut context = open("UTF-8", "UTF-16LE");
        let source = b"hello";
        let mut output = Vec::new();

        let mut small = [0u8; 4];
        let mut state = TranscodeState::new(source, &mut small);
        context.transcode(&mut state).unwrap();

        assert_eq!(state.error, Some(Condition::Resize));
        assert_eq!(state.message, Some(Condition::Resize.message()));
        assert_eq!(state.source_start, 2);
        assert_eq!(state.target_start, 4);
        let resume_at = state.source_start;
        output.extend_from_slice(state.produced());

        let mut larger = [0u8; 16];
        let mut state = TranscodeState::new(source, &mut larger);
        state.source_start = resume_at;
        context.transcode(&mut state).unwrap();
        assert!(state.error.is_none());
        assert_eq!(state.source_start, 5);
        output.extend_from_slice(state.produced());

        let one_shot = crate::stream::convert("UTF-8", "UTF-16LE", source).unwrap();
        assert_eq!(output, one_shot);
        assert_eq!(output, b"h\0e\0l\0l\0o\0");
    }

    #[test]
    fn test_incomplete_sequence_stops_before_tail() {
        let mut context = open("UTF-8", "UTF-16LE");
        // "h" followed by the first two bytes of U+20AC
        let source = [b'h', 0xE2, 0x82];
        let mut target = [0u8; 16];
        let mut state = TranscodeState::new(&source, &mut target);
        context.transcode(&mut state).unwrap();

        assert_eq!(state.error, Some(Condition::Incomplete));
        assert_eq!(state.source_start, 1);
        assert_eq!(state.target_start, 2);
        assert_eq!(state.remaining(), &[0xE2, 0x82]);
    }

    #[test]
    fn test_invalid_sequence_positions_cursor() {
        let mut context = open("UTF-8", "UTF-16LE");
        let source = [b'a', b'b', 0xFF, b'c', b'd'];
        let mut target = [0u8; 16];
        let mut state = TranscodeState::new(&source, &mut target);
        context.transcode(&mut state).unwrap();

        assert_eq!(state.error, Some(Condition::Invalid));
        assert_eq!(state.source_start, 2);
        assert_eq!(state.target_start, 4);
        assert_eq!(state.source[state.source_start], 0xFF);

        // Skip the offending byte and resume.
        state.source_start += 1;
        state.clear_error();
        context.transcode(&mut state).unwrap();
        assert!(state.error.is_none());
        assert_eq!(state.produced(), b"a\0b\0c\0d\0");
    }

    #[test]
    fn test_split_feeding_matches_one_shot() {
        let text = "naïve café, 東京 🍣".as_bytes();
        let one_shot = crate::stream::convert("UTF-8", "UTF-16BE", text).unwrap();

        // Split on every character boundary.
        let boundaries = std::str::from_utf8(text)
            .unwrap()
            .char_indices()
            .map(|(i, _)| i);

        for split in boundaries {
            let mut context = open("UTF-8", "UTF-16BE");
            let mut target = vec![0u8; one_shot.len() + 8];
            let mut state =
                TranscodeState::new(text, &mut target).with_source_window(0, split);
            context.transcode(&mut state).unwrap();
            assert!(state.error.is_none());

            state.source_stop = Some(text.len());
            context.transcode(&mut state).unwrap();
            assert!(state.error.is_none());
            assert_eq!(state.produced(), &one_shot[..]);
        }
    }

    #[test]
    fn test_split_inside_code_point_resumes() {
        let text = "€uro".as_bytes();
        let mut context = open("UTF-8", "UTF-16LE");
        let mut target = [0u8; 16];

        let mut state = TranscodeState::new(text, &mut target).with_source_window(0, 2);
        context.transcode(&mut state).unwrap();
        assert_eq!(state.error, Some(Condition::Incomplete));
        assert_eq!(state.source_start, 0);

        state.clear_error();
        state.source_stop = Some(text.len());
        context.transcode(&mut state).unwrap();
        assert!(state.error.is_none());
        assert_eq!(state.produced(), &[0xAC, 0x20, b'u', 0, b'r', 0, b'o', 0]);
    }

    #[test]
    fn test_cursors_are_monotonic() {
        let mut context = open("UTF-8", "UTF-16LE");
        let source = "ab€cd\u{1F600}ef".as_bytes();
        let mut target = [0u8; 64];
        let mut state = TranscodeState::new(source, &mut target).with_target_window(0, 0);

        let mut last = (0, 0);
        for stop in (0..=64).step_by(3) {
            state.target_stop = Some(stop);
            state.clear_error();
            context.transcode(&mut state).unwrap();

            assert!(state.source_start >= last.0);
            assert!(state.target_start >= last.1);
            assert_eq!(state.target_stop, Some(stop));
            last = (state.source_start, state.target_start);
        }
        assert_eq!(state.source_start, source.len());
    }

    #[test]
    fn test_soft_condition_not_cleared_on_success() {
        let mut context = open("UTF-8", "UTF-8");
        let mut target = [0u8; 2];
        let mut state = TranscodeState::new(b"abc", &mut target);
        context.transcode(&mut state).unwrap();
        assert_eq!(state.error, Some(Condition::Resize));

        // Same window, nothing left to write into: the next step is empty.
        state.source_stop = Some(state.source_start);
        context.transcode(&mut state).unwrap();
        assert_eq!(state.error, Some(Condition::Resize));
    }

    #[test]
    fn test_non_reversible_count_accumulates() {
        let windows = Windows {
            source_start: 0,
            source_stop: 4,
            target_start: 0,
            target_stop: 4,
        };
        let mut target = [0u8; 4];
        let mut state = TranscodeState::new(b"abcd", &mut target);
        state.non_reversible = 3;

        let step = RawStep {
            in_left: 0,
            out_left: 0,
            status: Ok(2),
        };
        assert_eq!(state.apply(&windows, step), None);
        assert_eq!(state.non_reversible, 5);

        let step = RawStep {
            in_left: 1,
            out_left: 0,
            status: Err(sys::E2BIG),
        };
        assert_eq!(state.apply(&windows, step), None);
        assert_eq!(state.non_reversible, 5);
        assert_eq!(state.source_start, 3);
    }

    #[test]
    fn test_unknown_errno_is_surfaced() {
        let windows = Windows {
            source_start: 0,
            source_stop: 4,
            target_start: 0,
            target_stop: 4,
        };
        let mut target = [0u8; 4];
        let mut state = TranscodeState::new(b"abcd", &mut target);

        let step = RawStep {
            in_left: 2,
            out_left: 2,
            status: Err(libc::EBADF),
        };
        assert_eq!(state.apply(&windows, step), Some(libc::EBADF));
        assert!(state.error.is_none());
        assert_eq!(state.source_start, 2);
        assert_eq!(state.target_start, 2);
    }

    #[test]
    fn test_cursors_serialize_with_wire_names() {
        let mut context = open("UTF-8", "UTF-8");
        let mut target = [0u8; 2];
        let mut state = TranscodeState::new(b"abc", &mut target);
        context.transcode(&mut state).unwrap();

        let json = serde_json::to_value(state.cursors()).unwrap();
        assert_eq!(json["sourceStart"], 2);
        assert_eq!(json["sourceStop"], 3);
        assert_eq!(json["targetStart"], 2);
        assert_eq!(json["targetStop"], 2);
        assert_eq!(json["nonReversible"], 0);
        assert_eq!(json["error"], "resize");
        assert!(json["message"].is_string());
    }
}
