//! Compression capability: the zstd engine behind a sink/source interface.
//!
//! The container never stores compression parameters.  A zstd frame is
//! self-describing for level and window size; the decoder picks its own
//! memory ceiling, which only has to cover the window the frame declares.

pub mod directive;

use std::io::{self, BufReader, Read, Write};

use crate::tuner::CompressionParameters;

/// Zstandard frame magic number (0xFD2FB528, little-endian on the wire).
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Smallest window the engine accepts: 1 KiB.
pub const MIN_WINDOW_LOG: u32 = 10;
/// Largest encode window; any stock decoder accepts it without opting in.
pub const MAX_ENCODE_WINDOW_LOG: u32 = 27;
/// Largest decode window the engine supports on 64-bit targets.
pub const MAX_DECODE_WINDOW_LOG: u32 = 31;

/// Compression level, as chosen by the directive or by auto mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Fastest,
    Default,
    Better,
}

impl Level {
    /// zstd level number for this setting.
    pub fn zstd_level(self) -> i32 {
        match self {
            Level::Fastest => 1,
            Level::Default => 3,
            Level::Better  => 7,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Level::Fastest => "low",
            Level::Default => "mid",
            Level::Better  => "high",
        }
    }
}

/// `floor(log2(bytes))`, with 0 mapped to 0.
pub fn window_log(bytes: u64) -> u32 {
    63u32.saturating_sub(bytes.leading_zeros())
}

/// Smallest window log covering `bytes` (`ceil(log2(bytes))`).
fn covering_log(bytes: u64) -> u32 {
    64 - bytes.saturating_sub(1).leading_zeros()
}

/// Wrap `sink` in a zstd encoder configured from `params`.
///
/// With `pledged` set, the frame records its content size and its window
/// never exceeds what that content needs, so a small archive stays
/// decodable on a machine with little memory.  The caller must then write
/// exactly `pledged` bytes.
pub fn encoder<W: Write>(
    sink:    W,
    params:  &CompressionParameters,
    pledged: Option<u64>,
) -> io::Result<zstd::stream::write::Encoder<'static, W>> {
    let mut enc = zstd::stream::write::Encoder::new(sink, params.level.zstd_level())?;
    let mut log = window_log(params.memory);
    if let Some(n) = pledged {
        log = log.min(covering_log(n));
        enc.set_pledged_src_size(Some(n))?;
    }
    enc.window_log(log.clamp(MIN_WINDOW_LOG, MAX_ENCODE_WINDOW_LOG))?;
    if params.threads > 1 {
        enc.multithread(params.threads)?;
    }
    Ok(enc)
}

/// Wrap `source` in a zstd decoder whose window ceiling is `params.memory`.
pub fn decoder<R: Read>(
    source: R,
    params: &CompressionParameters,
) -> io::Result<zstd::stream::read::Decoder<'static, BufReader<R>>> {
    let mut dec = zstd::stream::read::Decoder::new(source)?;
    dec.window_log_max(window_log(params.memory).clamp(MIN_WINDOW_LOG, MAX_DECODE_WINDOW_LOG))?;
    Ok(dec)
}
