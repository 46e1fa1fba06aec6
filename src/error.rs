use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::codec::directive::DirectiveError;
use crate::tuner::TuneError;

/// Which fixed part of the container an I/O failure hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Signature,
    FileCount,
    NameLength,
    Name,
    FileSize,
    Payload,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::Signature  => "signature",
            Field::FileCount  => "file count",
            Field::NameLength => "name length",
            Field::Name       => "file name",
            Field::FileSize   => "file size",
            Field::Payload    => "payload",
        })
    }
}

/// Malformed or truncated container bytes. None of these are recoverable.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("invalid rawpack signature: {found}")]
    InvalidSignature { found: String },
    #[error("stream ended before {field}")]
    EndOfStream { field: Field },
    #[error("unexpected end of stream in {field}: expected {expected} bytes, got {got}")]
    UnexpectedEof { field: Field, expected: u64, got: u64 },
    #[error("short write in {field}: expected {expected} bytes, wrote {written}")]
    ShortWrite { field: Field, expected: u64, written: u64 },
    #[error("file name is not valid UTF-8")]
    InvalidName,
    #[error("cannot detect rawpack or zstd signature: only {got} bytes available")]
    Undetectable { got: usize },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("invalid compression directive: {0}")]
    Directive(#[from] DirectiveError),
    #[error(transparent)]
    Tune(#[from] TuneError),
    #[error("{name}: {source}")]
    Entry { name: String, #[source] source: Box<Error> },
    #[error("{}: {source}", path.display())]
    Path { path: PathBuf, #[source] source: io::Error },
    #[error("refusing to extract unsafe name {name:?}")]
    UnsafeName { name: String },
    #[error("expected dir at {}", path.display())]
    NotADirectory { path: PathBuf },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn entry(name: &str, source: impl Into<Error>) -> Self {
        Error::Entry { name: name.to_owned(), source: Box::new(source.into()) }
    }

    pub fn path(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Path { path: path.into(), source }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
