//! Raw write throughput probe.
//!
//! A handful of buffer sizes are written to a scratch file in the target
//! directory and synced.  The fastest one wins: its size becomes the copy
//! buffer, and its rate feeds the compression tuner in auto mode.

use std::io::Write;
use std::path::Path;
use std::time::Instant;

use log::debug;

use crate::error::{Error, Result};
use crate::io_stream::DEFAULT_BUFFER_SIZE;

/// Candidate buffer sizes, largest first.
pub const PROBE_SIZES: [usize; 4] = [2 << 20, 1 << 20, 512 << 10, 256 << 10];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IoProfile {
    /// Working buffer used when copying payload bytes.
    pub buffer_size: usize,
    /// Best observed raw write rate, in bytes per second.
    pub throughput:  f64,
}

impl Default for IoProfile {
    /// Used when no probe runs (stdout targets, listing).
    fn default() -> Self {
        Self { buffer_size: DEFAULT_BUFFER_SIZE, throughput: 0.0 }
    }
}

/// Benchmark raw writes inside `dir`.  The scratch file is removed on return.
pub fn measure(dir: &Path) -> Result<IoProfile> {
    let mut scratch = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::path(dir, e))?;
    let mut best = IoProfile::default();

    for size in PROBE_SIZES {
        let buf = vec![0u8; size];
        let file = scratch.as_file_mut();
        let start = Instant::now();
        file.write_all(&buf)?;
        file.sync_all()?;
        let secs = start.elapsed().as_secs_f64();

        // A sub-resolution timing counts as infinitely fast.
        let rate = if secs > 0.0 { size as f64 / secs } else { f64::INFINITY };
        debug!("probe: {size} bytes at {:.1} MiB/s", rate / (1 << 20) as f64);
        if rate > best.throughput {
            best = IoProfile { buffer_size: size, throughput: rate };
        }
    }

    debug!("probe: buffer {} bytes, {:.0} B/s", best.buffer_size, best.throughput);
    Ok(best)
}
