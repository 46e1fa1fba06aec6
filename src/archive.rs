//! High-level pack / unpack / list over an explicit base directory.
//!
//! ```no_run
//! use std::fs::File;
//! use std::path::Path;
//! use rawpack::archive::{self, PackOptions, UnpackOptions};
//! use rawpack::tuner::SystemProbe;
//! use rawpack::walk::{self, Glob, Selection};
//!
//! let base = Path::new("docs");
//! let sel = Selection { include: vec![Glob::new("*.md")], ..Selection::default() };
//! let table = walk::collect(base, &sel)?;
//! archive::create(File::create("docs.rpk")?, base, &table, &PackOptions::default(), &SystemProbe)?;
//!
//! let files = archive::extract(File::open("docs.rpk")?, Path::new("out"), &UnpackOptions::default(), &SystemProbe)?;
//! # Ok::<(), rawpack::Error>(())
//! ```

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::{Error, Result};
use crate::io_stream::{ArchiveReader, ArchiveWriter};
use crate::pipeline::{Compression, Pipeline, Source};
use crate::probe::IoProfile;
use crate::signature::Signature;
use crate::table::{resolve, FileTable};
use crate::tuner::ResourceProbe;

// ── Options ──────────────────────────────────────────────────────────────────

/// Configuration for [`create`].
#[derive(Debug, Clone, Default)]
pub struct PackOptions {
    /// Obfuscate the container with a keystream derived from this password.
    pub password:    Option<String>,
    /// [`Compression::Detect`] packs uncompressed.
    pub compression: Compression,
    pub io:          IoProfile,
}

/// Configuration for [`extract`] and [`list`].
#[derive(Debug, Clone, Default)]
pub struct UnpackOptions {
    pub password:    Option<String>,
    /// [`Compression::Detect`] sniffs the stream.
    pub compression: Compression,
    pub io:          IoProfile,
}

fn pipeline(password: &Option<String>, compression: Compression, io: &IoProfile) -> Pipeline {
    Pipeline {
        password:    password.clone(),
        compression,
        throughput:  io.throughput,
    }
}

fn copy_buffer(io: &IoProfile) -> Vec<u8> {
    vec![0u8; io.buffer_size.max(1)]
}

/// Make sure `dir` exists and is a directory.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(Error::NotADirectory { path: dir.to_path_buf() }),
        Err(_) => fs::create_dir_all(dir).map_err(|e| Error::path(dir, e)),
    }
}

// ── Create ───────────────────────────────────────────────────────────────────

/// Pack every record of `table`, read from below `base`, into `out`.
/// Returns the container size before compression.
pub fn create<W: Write>(
    out:   W,
    base:  &Path,
    table: &FileTable,
    opts:  &PackOptions,
    probe: &dyn ResourceProbe,
) -> Result<u64> {
    if table.is_empty() {
        warn!("no files selected, writing an empty archive");
    }
    // Resolve up front so a bad name fails before anything is written.
    let paths = table.iter()
        .map(|r| resolve(base, &r.name))
        .collect::<Result<Vec<PathBuf>>>()?;

    let sink = pipeline(&opts.password, opts.compression, &opts.io)
        .sink(out, table.payload_size(), Some(table.container_size()), probe)?;
    let mut writer = ArchiveWriter::new(sink);
    writer.write_signature(&Signature::new())?;
    writer.write_file_table(table)?;

    let mut buf = copy_buffer(&opts.io);
    let n = table.len();
    for (i, (record, path)) in table.iter().zip(&paths).enumerate() {
        info!("{:3}/{:3}> packing {}", i + 1, n, record.name);
        let mut file = File::open(path).map_err(|e| Error::entry(&record.name, Error::path(path, e)))?;
        writer.write_payload(&mut file, record.size, &mut buf)
            .map_err(|e| Error::entry(&record.name, e))?;
    }

    let written = writer.bytes_written();
    writer.into_inner().finish()?;
    Ok(written)
}

// ── Extract / List ───────────────────────────────────────────────────────────

fn open<'a, R: Read + 'a>(
    input: R,
    opts:  &UnpackOptions,
    probe: &dyn ResourceProbe,
) -> Result<(ArchiveReader<Source<'a>>, FileTable)> {
    let source = pipeline(&opts.password, opts.compression, &opts.io).source(input, probe)?;
    let mut reader = ArchiveReader::new(source);
    reader.read_verified_signature()?;
    let table = reader.read_file_table()?;
    Ok((reader, table))
}

/// Read only the signature and file table.
pub fn list<R: Read>(input: R, opts: &UnpackOptions, probe: &dyn ResourceProbe) -> Result<FileTable> {
    open(input, opts, probe).map(|(_, table)| table)
}

/// Unpack every member below `base`, creating directories as needed.
/// Returns the table that was extracted.
pub fn extract<R: Read>(
    input: R,
    base:  &Path,
    opts:  &UnpackOptions,
    probe: &dyn ResourceProbe,
) -> Result<FileTable> {
    let (mut reader, table) = open(input, opts, probe)?;
    ensure_dir(base)?;
    let paths = table.iter()
        .map(|r| resolve(base, &r.name))
        .collect::<Result<Vec<PathBuf>>>()?;

    let mut buf = copy_buffer(&opts.io);
    let n = table.len();
    for (i, (record, path)) in table.iter().zip(&paths).enumerate() {
        info!("{:3}/{:3}> unpacking {}", i + 1, n, record.name);
        unpack_one(&mut reader, path, record.size, &mut buf)
            .map_err(|e| Error::entry(&record.name, e))?;
    }
    info!("read {} container bytes", reader.bytes_read());
    Ok(table)
}

fn unpack_one<R: Read>(reader: &mut ArchiveReader<R>, path: &Path, size: u64, buf: &mut [u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let mut file = File::create(path).map_err(|e| Error::path(path, e))?;
    reader.read_payload_to(&mut file, size, buf)?;
    Ok(())
}
