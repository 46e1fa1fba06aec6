//! Password keystream for rawpack containers.
//!
//! Key material: BLAKE3(password) → 32 bytes.
//! Transform:    `out[i] = in[i] ^ key[cursor]`, `cursor = (cursor + 1) % 32`.
//!
//! This is reversible obfuscation, not encryption: there is no nonce and no
//! authentication tag.  A wrong password yields garbage that is only caught
//! if it happens to break the container signature.

use std::io::{self, Read, Write};

pub const KEY_LEN: usize = blake3::OUT_LEN;

/// XOR keystream state.  Fresh per stream; never persisted.
#[derive(Clone)]
pub struct Keystream {
    key:    [u8; KEY_LEN],
    cursor: usize,
}

impl Keystream {
    pub fn new(password: &[u8]) -> Self {
        Self { key: *blake3::hash(password).as_bytes(), cursor: 0 }
    }

    pub fn cursor(&self) -> usize { self.cursor }

    /// Rewind to the start of the keystream.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// XOR `data` in place and advance the cursor by `data.len()`.
    pub fn apply(&mut self, data: &mut [u8]) {
        for b in data.iter_mut() {
            *b ^= self.key[self.cursor];
            self.cursor = (self.cursor + 1) % KEY_LEN;
        }
    }

    fn seek_back(&mut self, n: usize) {
        self.cursor = (self.cursor + KEY_LEN - n % KEY_LEN) % KEY_LEN;
    }
}

impl std::fmt::Debug for Keystream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keystream").field("cursor", &self.cursor).finish_non_exhaustive()
    }
}

// ── Sink side ────────────────────────────────────────────────────────────────

/// XORs every byte before handing it to the inner sink.
pub struct CipherWriter<W: Write> {
    inner:   W,
    key:     Keystream,
    scratch: Vec<u8>,
}

impl<W: Write> CipherWriter<W> {
    pub fn new(inner: W, key: Keystream) -> Self {
        Self { inner, key, scratch: Vec::new() }
    }

    pub fn into_inner(self) -> W { self.inner }
}

impl<W: Write> Write for CipherWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.scratch.clear();
        self.scratch.extend_from_slice(buf);
        self.key.apply(&mut self.scratch);
        let n = match self.inner.write(&self.scratch) {
            Ok(n) => n,
            Err(e) => {
                self.key.seek_back(buf.len());
                return Err(e);
            }
        };
        // Only the accepted prefix consumed keystream.
        self.key.seek_back(buf.len().saturating_sub(n));
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ── Source side ──────────────────────────────────────────────────────────────

/// Reads from the inner source, then XORs what was received.
pub struct CipherReader<R: Read> {
    inner: R,
    key:   Keystream,
}

impl<R: Read> CipherReader<R> {
    pub fn new(inner: R, key: Keystream) -> Self {
        Self { inner, key }
    }
}

impl<R: Read> Read for CipherReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.key.apply(&mut buf[..n]);
        Ok(n)
    }
}
