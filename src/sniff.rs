//! Decode-side format detection.
//!
//! The first four bytes of the raw source are compared against the zstd
//! magic.  They are held in a [`Lookahead`] so that downstream readers still
//! see them exactly once, whatever read sizes they use.

use std::io::{self, Read};

use crate::codec::ZSTD_MAGIC;
use crate::error::FormatError;
use crate::io_stream::read_full;

pub const SNIFF_LEN: usize = ZSTD_MAGIC.len();

/// Source adapter that serves a small fixed queue of already-read bytes
/// before delegating to the inner source.
///
/// Invariant: `head <= tail <= SNIFF_LEN`; `buf[head..tail]` is unserved.
pub struct Lookahead<R: Read> {
    inner: R,
    buf:   [u8; SNIFF_LEN],
    head:  usize,
    tail:  usize,
}

impl<R: Read> Lookahead<R> {
    /// Pull up to [`SNIFF_LEN`] bytes from `inner` into the queue.
    pub fn fill(mut inner: R) -> io::Result<Self> {
        let mut buf = [0u8; SNIFF_LEN];
        let tail = read_full(&mut inner, &mut buf)?;
        Ok(Self { inner, buf, head: 0, tail })
    }

    /// Bytes still queued.
    pub fn pending(&self) -> &[u8] {
        &self.buf[self.head..self.tail]
    }

    pub fn into_inner(self) -> R { self.inner }
}

impl<R: Read> Read for Lookahead<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.head == self.tail {
            return self.inner.read(out);
        }
        let n = out.len().min(self.tail - self.head);
        out[..n].copy_from_slice(&self.buf[self.head..self.head + n]);
        self.head += n;
        // A short read once the queue drains; the inner source is only
        // touched by the next call, so its errors reach the caller.
        Ok(n)
    }
}

/// Outcome of sniffing a raw source.
pub struct Sniffed<R: Read> {
    pub compressed: bool,
    pub source:     Lookahead<R>,
}

/// Decide whether `source` carries a zstd stream without consuming anything
/// from the caller's point of view.  Fewer than four bytes cannot be a valid
/// container of either kind.
pub fn sniff<R: Read>(source: R) -> Result<Sniffed<R>, FormatError> {
    let source = Lookahead::fill(source)?;
    let got = source.pending().len();
    if got < SNIFF_LEN {
        return Err(FormatError::Undetectable { got });
    }
    let compressed = source.pending() == ZSTD_MAGIC;
    Ok(Sniffed { compressed, source })
}
