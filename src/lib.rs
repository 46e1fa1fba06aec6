pub mod error;
pub mod signature;
pub mod table;
pub mod io_stream;
pub mod crypto;
pub mod codec;
pub mod tuner;
pub mod sniff;
pub mod pipeline;
pub mod probe;
pub mod walk;
pub mod archive;

pub use error::{Error, FormatError, Result};
pub use signature::{FormatFlags, Signature};
pub use table::{FileRecord, FileTable};
pub use io_stream::{ArchiveReader, ArchiveWriter};
pub use codec::directive::Directive;
pub use tuner::{tune, CompressionParameters, Direction, ResourceProbe, SystemProbe};
pub use pipeline::{Compression, Pipeline};
pub use archive::{PackOptions, UnpackOptions};
