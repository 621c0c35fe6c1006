//! Streaming driver over the transcode protocol.
//!
//! [`StreamTranscoder`] is the retry loop every caller of
//! [`ConversionContext::transcode`] ends up writing: it keeps a target
//! buffer, drains it on `resize`, carries an incomplete tail over to the
//! next chunk and applies an [`InvalidPolicy`] to malformed input.

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};

use crate::context::ConversionContext;
use crate::transcode::{Condition, TranscodeState};
use crate::{Error, Result};

/// What to do with a byte sequence the source charset rejects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidPolicy {
    /// Stop with [`Error::MalformedInput`]
    #[default]
    Fail,
    /// Drop the offending byte and continue
    Skip,
}

/// Tuning knobs for streaming conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Bytes read from the input per step
    pub chunk_size: usize,
    /// Initial size of the internal target buffer
    pub target_capacity: usize,
    /// Handling of invalid source sequences
    pub on_invalid: InvalidPolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            target_capacity: 64 * 1024,
            on_invalid: InvalidPolicy::Fail,
        }
    }
}

/// Running totals of a stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    /// Source bytes accepted by `feed`
    pub bytes_read: u64,
    /// Target bytes emitted
    pub bytes_written: u64,
    /// Non-reversible substitutions reported by the library
    pub non_reversible: u64,
    /// Source bytes dropped under [`InvalidPolicy::Skip`]
    pub skipped: u64,
}

/// Incremental converter for arbitrarily chunked input
pub struct StreamTranscoder {
    context: ConversionContext,
    config: StreamConfig,
    /// Source bytes not yet consumed (an incomplete sequence between feeds)
    pending: Vec<u8>,
    /// Stream offset of `pending[0]`
    pending_offset: u64,
    buffer: Vec<u8>,
    stats: StreamStats,
    /// Offset of the byte that stopped the stream under [`InvalidPolicy::Fail`]
    failed: Option<u64>,
}

impl StreamTranscoder {
    /// Open a streaming conversion between two charsets
    pub fn new(source_charset: &str, target_charset: &str, config: StreamConfig) -> Result<Self> {
        let context = ConversionContext::open(source_charset, target_charset)?;
        let buffer = vec![0u8; config.target_capacity.max(MIN_TARGET)];
        Ok(Self {
            context,
            config,
            pending: Vec::new(),
            pending_offset: 0,
            buffer,
            stats: StreamStats::default(),
            failed: None,
        })
    }

    /// Create with the default configuration
    pub fn with_defaults(source_charset: &str, target_charset: &str) -> Result<Self> {
        Self::new(source_charset, target_charset, StreamConfig::default())
    }

    /// Totals so far
    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// Convert `chunk`, appending converted bytes to `out`.
    ///
    /// A multi-byte sequence cut off at the end of `chunk` is kept and
    /// completed by the next call. Once a feed has failed with
    /// [`Error::MalformedInput`], every later call reports the same error.
    pub fn feed(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> Result<()> {
        if let Some(offset) = self.failed {
            return Err(Error::MalformedInput { offset });
        }
        self.stats.bytes_read += chunk.len() as u64;
        self.pending.extend_from_slice(chunk);

        let mut consumed = 0;
        loop {
            let mut state = TranscodeState::new(&self.pending, &mut self.buffer);
            state.source_start = consumed;
            self.context.transcode(&mut state)?;

            let produced = state.target_start;
            let condition = state.error;
            consumed = state.source_start;
            self.stats.non_reversible += state.non_reversible as u64;

            out.extend_from_slice(&self.buffer[..produced]);
            self.stats.bytes_written += produced as u64;

            match condition {
                None | Some(Condition::Incomplete) => break,
                Some(Condition::Resize) => {
                    if produced == 0 {
                        let grown = self.buffer.len() * 2;
                        tracing::debug!(size = grown, "growing target buffer");
                        self.buffer.resize(grown, 0);
                    }
                }
                Some(Condition::Invalid) => {
                    let offset = self.pending_offset + consumed as u64;
                    match self.config.on_invalid {
                        InvalidPolicy::Fail => {
                            self.discard(consumed);
                            self.failed = Some(offset);
                            return Err(Error::MalformedInput { offset });
                        }
                        InvalidPolicy::Skip => {
                            tracing::warn!(offset, "skipping invalid byte");
                            consumed += 1;
                            self.stats.skipped += 1;
                        }
                    }
                }
            }
        }

        self.discard(consumed);
        Ok(())
    }

    /// End the stream: flush the shift reset sequence into `out` and close.
    ///
    /// Fails with [`Error::TruncatedInput`] when the input stopped inside a
    /// multi-byte sequence, or with the earlier [`Error::MalformedInput`]
    /// when a feed already stopped on an invalid byte.
    pub fn finish(mut self, out: &mut Vec<u8>) -> Result<StreamStats> {
        if let Some(offset) = self.failed {
            return Err(Error::MalformedInput { offset });
        }
        if !self.pending.is_empty() {
            return Err(Error::TruncatedInput {
                offset: self.pending_offset,
                len: self.pending.len(),
            });
        }

        let written = self.context.close_into(&mut self.buffer)?;
        out.extend_from_slice(&self.buffer[..written]);
        self.stats.bytes_written += written as u64;

        tracing::debug!(
            read = self.stats.bytes_read,
            written = self.stats.bytes_written,
            non_reversible = self.stats.non_reversible,
            skipped = self.stats.skipped,
            "stream finished"
        );
        Ok(self.stats)
    }

    fn discard(&mut self, consumed: usize) {
        self.pending.drain(..consumed);
        self.pending_offset += consumed as u64;
    }
}

/// Smallest target buffer that holds any single converted character
const MIN_TARGET: usize = 16;

/// Convert a complete buffer in one go
pub fn convert(source_charset: &str, target_charset: &str, input: &[u8]) -> Result<Vec<u8>> {
    let config = StreamConfig {
        target_capacity: input.len().saturating_mul(2).clamp(MIN_TARGET, 1 << 20),
        ..StreamConfig::default()
    };
    let mut stream = StreamTranscoder::new(source_charset, target_charset, config)?;
    let mut output = Vec::with_capacity(input.len());
    stream.feed(input, &mut output)?;
    stream.finish(&mut output)?;
    Ok(output)
}

/// Convert everything `reader` yields into `writer`
pub fn transcode_io<R: Read, W: Write>(
    mut reader: R,
    mut writer: W,
    source_charset: &str,
    target_charset: &str,
    config: StreamConfig,
) -> Result<StreamStats> {
    let mut chunk = vec![0u8; config.chunk_size.max(1)];
    let mut stream = StreamTranscoder::new(source_charset, target_charset, config)?;
    let mut output = Vec::new();

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        if n == 0 {
            break;
        }
        stream.feed(&chunk[..n], &mut output)?;
        writer.write_all(&output)?;
        output.clear();
    }

    let stats = stream.finish(&mut output)?;
    writer.write_all(&output)?;
    writer.flush()?;
    Ok(stats)
}
