//! Streaming container codec: writer and reader.
//!
//! # Layout
//! All integers are little-endian `u64`.
//!
//! ```text
//! Signature (16 B) | count | { name_len | name | size } * count | payload * count
//! ```
//!
//! The codec only ever sees a generic byte sink or source; whatever
//! compression or cipher layers sit underneath are invisible to it.
//!
//! # Strictness
//! Every fixed-size field must transfer completely.  A write that moves fewer
//! bytes than requested is a [`FormatError::ShortWrite`]; a read that hits the
//! end of the stream is [`FormatError::EndOfStream`] when nothing at all was
//! available and [`FormatError::UnexpectedEof`] when only part of it was.
//! There is no checksum, so the reader cannot detect a payload whose length
//! disagrees with its record; the table is trusted once the signature is.

use std::io::{self, Read, Write};

use byteorder::{ByteOrder, LittleEndian};
use log::trace;

use crate::error::{Field, FormatError};
use crate::signature::Signature;
use crate::table::{FileRecord, FileTable};

/// Default working buffer for payload copies: 32 KiB.
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;
/// Largest single read used while decoding a length-prefixed name.
pub const NAME_CHUNK_SIZE: usize = 256;

// ── Field primitives ─────────────────────────────────────────────────────────

/// Write all of `buf`; a sink that stops accepting bytes is a short write.
pub(crate) fn write_field<W: Write>(mut writer: W, buf: &[u8], field: Field) -> Result<(), FormatError> {
    let mut written = 0usize;
    while written < buf.len() {
        match writer.write(&buf[written..]) {
            Ok(0) => {
                return Err(FormatError::ShortWrite {
                    field,
                    expected: buf.len() as u64,
                    written:  written as u64,
                });
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Fill all of `buf` or fail, distinguishing "nothing left" from "cut short".
pub(crate) fn read_field<R: Read>(mut reader: R, buf: &mut [u8], field: Field) -> Result<(), FormatError> {
    let got = read_full(&mut reader, buf)?;
    match got {
        n if n == buf.len() => Ok(()),
        0 => Err(FormatError::EndOfStream { field }),
        n => Err(FormatError::UnexpectedEof { field, expected: buf.len() as u64, got: n as u64 }),
    }
}

/// Read until `buf` is full or the source is exhausted; returns bytes read.
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Copy exactly `size` bytes from `src` to `dst` through `buf`.
///
/// `on_short` builds the error when `src` runs dry after `copied` bytes, so a
/// truncated container and a file that shrank while packing report differently.
fn copy_exact<R: Read, W: Write>(
    src:  &mut R,
    dst:  &mut W,
    size: u64,
    buf:  &mut [u8],
    on_short: impl Fn(u64) -> FormatError,
) -> Result<(), FormatError> {
    if buf.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty copy buffer").into());
    }
    let mut copied = 0u64;
    while copied < size {
        let want = (size - copied).min(buf.len() as u64) as usize;
        let n = match src.read(&mut buf[..want]) {
            Ok(0) => return Err(on_short(copied)),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        write_field(&mut *dst, &buf[..n], Field::Payload)?;
        copied += n as u64;
        trace!("{copied}/{size} bytes");
    }
    Ok(())
}

// ── Writer ───────────────────────────────────────────────────────────────────

/// Encodes a container into a borrowed or owned byte sink.
pub struct ArchiveWriter<W: Write> {
    writer:  W,
    written: u64,
}

impl<W: Write> ArchiveWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Container bytes emitted so far (before any compression).
    pub fn bytes_written(&self) -> u64 { self.written }

    pub fn into_inner(self) -> W { self.writer }

    fn write_u64(&mut self, v: u64, field: Field) -> Result<(), FormatError> {
        let mut buf = [0u8; 8];
        LittleEndian::write_u64(&mut buf, v);
        write_field(&mut self.writer, &buf, field)?;
        self.written += 8;
        Ok(())
    }

    pub fn write_signature(&mut self, sig: &Signature) -> Result<(), FormatError> {
        sig.write(&mut self.writer)?;
        self.written += sig.0.len() as u64;
        Ok(())
    }

    fn write_record(&mut self, record: &FileRecord) -> Result<(), FormatError> {
        self.write_u64(record.name.len() as u64, Field::NameLength)?;
        write_field(&mut self.writer, record.name.as_bytes(), Field::Name)?;
        self.written += record.name.len() as u64;
        self.write_u64(record.size, Field::FileSize)
    }

    pub fn write_file_table(&mut self, table: &FileTable) -> Result<(), FormatError> {
        self.write_u64(table.len() as u64, Field::FileCount)?;
        for record in table {
            self.write_record(record)?;
        }
        Ok(())
    }

    /// Stream exactly `size` bytes from `src`.  A source that runs dry first
    /// is a short write: the table already promised `size` bytes.
    pub fn write_payload<R: Read>(&mut self, src: &mut R, size: u64, buf: &mut [u8]) -> Result<(), FormatError> {
        copy_exact(src, &mut self.writer, size, buf, |copied| FormatError::ShortWrite {
            field:    Field::Payload,
            expected: size,
            written:  copied,
        })?;
        self.written += size;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

/// Decodes a container from a borrowed or owned byte source, strictly in
/// order: signature, table, then payloads.
pub struct ArchiveReader<R: Read> {
    reader: R,
    read:   u64,
}

impl<R: Read> ArchiveReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, read: 0 }
    }

    /// Container bytes consumed so far (after any decompression).
    pub fn bytes_read(&self) -> u64 { self.read }

    pub fn into_inner(self) -> R { self.reader }

    fn read_u64(&mut self, field: Field) -> Result<u64, FormatError> {
        let mut buf = [0u8; 8];
        read_field(&mut self.reader, &mut buf, field)?;
        self.read += 8;
        Ok(LittleEndian::read_u64(&buf))
    }

    /// Raw signature bytes; see [`read_verified_signature`](Self::read_verified_signature).
    pub fn read_signature(&mut self) -> Result<Signature, FormatError> {
        let sig = Signature::read(&mut self.reader)?;
        self.read += sig.0.len() as u64;
        Ok(sig)
    }

    /// Read the signature and reject it unless valid.  This is the only guard
    /// against a wrong password or a foreign stream, so the table must never
    /// be decoded without it.
    pub fn read_verified_signature(&mut self) -> Result<Signature, FormatError> {
        self.read_signature()?.validate()
    }

    /// Length-prefixed string, read in bounded chunks so a hostile length
    /// never turns into a single large allocation.
    fn read_name(&mut self) -> Result<String, FormatError> {
        let len = self.read_u64(Field::NameLength)?;
        let mut name = Vec::with_capacity(len.min(NAME_CHUNK_SIZE as u64) as usize);
        let mut chunk = [0u8; NAME_CHUNK_SIZE];
        let mut remaining = len;
        while remaining > 0 {
            let want = remaining.min(NAME_CHUNK_SIZE as u64) as usize;
            let got = read_full(&mut self.reader, &mut chunk[..want])?;
            if got < want {
                return Err(FormatError::UnexpectedEof {
                    field:    Field::Name,
                    expected: len,
                    got:      len - remaining + got as u64,
                });
            }
            name.extend_from_slice(&chunk[..got]);
            remaining -= got as u64;
        }
        self.read += len;
        String::from_utf8(name).map_err(|_| FormatError::InvalidName)
    }

    pub fn read_file_table(&mut self) -> Result<FileTable, FormatError> {
        let count = self.read_u64(Field::FileCount)?;
        let mut table = FileTable {
            records: Vec::with_capacity(count.min(1024) as usize),
        };
        for _ in 0..count {
            let name = self.read_name()?;
            let size = self.read_u64(Field::FileSize)?;
            table.push(FileRecord { name, size });
        }
        Ok(table)
    }

    /// Copy exactly `size` payload bytes into `dst`.
    pub fn read_payload_to<W: Write>(&mut self, dst: &mut W, size: u64, buf: &mut [u8]) -> Result<(), FormatError> {
        copy_exact(&mut self.reader, dst, size, buf, |copied| {
            if copied == 0 && size > 0 {
                FormatError::EndOfStream { field: Field::Payload }
            } else {
                FormatError::UnexpectedEof { field: Field::Payload, expected: size, got: copied }
            }
        })?;
        self.read += size;
        Ok(())
    }
}
