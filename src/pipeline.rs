//! Stream layer composer.
//!
//! Layers are listed from the wire inward and wrapped in that order on both
//! sides, which makes the data flow mirror itself:
//!
//! ```text
//! encode: container → cipher → zstd → raw sink
//! decode: raw source → zstd → cipher → container
//! ```
//!
//! Bytes are obfuscated before they are compressed.  Both sides take their
//! layer list from [`Pipeline::layers`].

use std::io::{self, Read, Write};

use log::debug;

use crate::codec::{self, directive::Directive};
use crate::crypto::{CipherReader, CipherWriter, Keystream};
use crate::error::Result;
use crate::sniff::sniff;
use crate::tuner::{tune, CompressionParameters, Direction, ResourceProbe};

// ── Sink / Source ────────────────────────────────────────────────────────────

/// A byte sink that must be finished to flush trailing layer state
/// (the zstd frame epilogue in particular).
pub trait SinkLayer: Write {
    fn finish(self: Box<Self>) -> io::Result<()>;
}

pub type Sink<'a> = Box<dyn SinkLayer + 'a>;
pub type Source<'a> = Box<dyn Read + 'a>;

/// Innermost sink: the caller's writer.
struct RawSink<W: Write>(W);

impl<W: Write> Write for RawSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> { self.0.write(buf) }
    fn flush(&mut self) -> io::Result<()> { self.0.flush() }
}

impl<W: Write> SinkLayer for RawSink<W> {
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.0.flush()
    }
}

impl<'a> SinkLayer for CipherWriter<Sink<'a>> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        (*self).into_inner().finish()
    }
}

impl<'a> SinkLayer for zstd::stream::write::Encoder<'static, Sink<'a>> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        zstd::stream::write::Encoder::finish(*self)?.finish()
    }
}

// ── Transforms ───────────────────────────────────────────────────────────────

/// One byte-transform capability, selected when the pipeline is assembled.
#[derive(Debug)]
pub enum Transform {
    Cipher(Keystream),
    Zstd(CompressionParameters),
}

impl Transform {
    /// `pledged` is the exact number of bytes that will pass through; the
    /// cipher preserves length, so it holds at every layer.
    pub fn wrap_sink<'a>(self, inner: Sink<'a>, pledged: Option<u64>) -> io::Result<Sink<'a>> {
        Ok(match self {
            Transform::Cipher(key) => Box::new(CipherWriter::new(inner, key)),
            Transform::Zstd(p)     => Box::new(codec::encoder(inner, &p, pledged)?),
        })
    }

    pub fn wrap_source<'a>(self, inner: Source<'a>) -> io::Result<Source<'a>> {
        Ok(match self {
            Transform::Cipher(key) => Box::new(CipherReader::new(inner, key)),
            Transform::Zstd(p)     => Box::new(codec::decoder(inner, &p)?),
        })
    }

    fn name(&self) -> &'static str {
        match self {
            Transform::Cipher(_) => "cipher",
            Transform::Zstd(_)   => "zstd",
        }
    }
}

// ── Configuration ────────────────────────────────────────────────────────────

/// Whether the stream is compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Decode: sniff the leading bytes.  Encode: write uncompressed.
    #[default]
    Detect,
    Off,
    Zstd(Directive),
}

/// Everything needed to assemble either side of the stream.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    pub password:    Option<String>,
    pub compression: Compression,
    /// Raw write benchmark in bytes/second, fed to the tuner.
    pub throughput:  f64,
}

impl Pipeline {
    /// Layers from the wire inward.  `compression` is `Some` once the
    /// direction has settled whether zstd applies.
    fn layers(&self, compression: Option<CompressionParameters>) -> Vec<Transform> {
        let mut layers = Vec::with_capacity(2);
        if let Some(p) = compression {
            layers.push(Transform::Zstd(p));
        }
        if let Some(pw) = &self.password {
            layers.push(Transform::Cipher(Keystream::new(pw.as_bytes())));
        }
        layers
    }

    /// Build the encode-side sink.  `payload` is the total size of the files
    /// about to be packed; auto mode picks the level from it.  `container`,
    /// when known, is the exact number of bytes the caller will write and
    /// lets zstd size its window to the content.
    pub fn sink<'a, W: Write + 'a>(
        &self,
        raw:       W,
        payload:   u64,
        container: Option<u64>,
        probe:     &dyn ResourceProbe,
    ) -> Result<Sink<'a>> {
        let params = match &self.compression {
            Compression::Zstd(d) => {
                Some(tune(d, probe, self.throughput, payload, Direction::Encode)?)
            }
            Compression::Detect | Compression::Off => None,
        };
        let mut sink: Sink<'a> = Box::new(RawSink(raw));
        for layer in self.layers(params) {
            debug!("encode layer: {}", layer.name());
            sink = layer.wrap_sink(sink, container)?;
        }
        Ok(sink)
    }

    /// Build the decode-side source, sniffing for zstd when not told.
    pub fn source<'a, R: Read + 'a>(
        &self,
        raw:   R,
        probe: &dyn ResourceProbe,
    ) -> Result<Source<'a>> {
        let (mut source, directive): (Source<'a>, Option<Directive>) = match &self.compression {
            Compression::Off     => (Box::new(raw), None),
            Compression::Zstd(d) => (Box::new(raw), Some(*d)),
            Compression::Detect  => {
                let sniffed = sniff(raw)?;
                debug!("sniffed zstd magic: {}", sniffed.compressed);
                let directive = sniffed.compressed.then_some(Directive::Auto);
                (Box::new(sniffed.source), directive)
            }
        };
        let params = directive
            .map(|d| tune(&d, probe, self.throughput, 0, Direction::Decode))
            .transpose()?;
        for layer in self.layers(params) {
            debug!("decode layer: {}", layer.name());
            source = layer.wrap_source(source)?;
        }
        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::directive::parse;
    use crate::tuner::FixedProbe;

    const PROBE: FixedProbe = FixedProbe { memory: 1 << 30, cpus: 2 };

    fn pipeline(password: Option<&str>, compression: Compression) -> Pipeline {
        Pipeline {
            password: password.map(str::to_owned),
            compression,
            throughput: 0.0,
        }
    }

    fn encode(p: &Pipeline, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let n = data.len() as u64;
        let mut sink = p.sink(&mut out, n, Some(n), &PROBE).unwrap();
        sink.write_all(data).unwrap();
        sink.finish().unwrap();
        out
    }

    fn decode(p: &Pipeline, wire: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        p.source(wire, &PROBE).unwrap().read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn plain_is_passthrough() {
        let p = pipeline(None, Compression::Off);
        assert_eq!(encode(&p, b"hello"), b"hello");
    }

    #[test]
    fn cipher_only_changes_bytes_not_length() {
        let p = pipeline(Some("pw"), Compression::Off);
        let wire = encode(&p, b"hello world");
        assert_eq!(wire.len(), 11);
        assert_ne!(wire, b"hello world");
        assert_eq!(decode(&p, &wire), b"hello world");
    }

    #[test]
    fn encrypts_before_compressing() {
        let zstd = Compression::Zstd(parse("l=low,m=1M").unwrap());
        let data = b"abcabcabcabcabcabcabcabc".repeat(10);
        let wire = encode(&pipeline(Some("pw"), zstd), &data);
        assert_eq!(&wire[..4], &codec::ZSTD_MAGIC);

        // Decompressing alone yields the obfuscated container...
        let mut inner = Vec::new();
        codec::decoder(&wire[..], &CompressionParameters {
            level: codec::Level::Default, threads: 1, memory: 1 << 20, auto: false,
        }).unwrap().read_to_end(&mut inner).unwrap();
        let mut expected = data.clone();
        Keystream::new(b"pw").apply(&mut expected);
        assert_eq!(inner, expected);

        // ...and the mirrored pipeline restores the plaintext.
        assert_eq!(decode(&pipeline(Some("pw"), zstd), &wire), data);
    }

    #[test]
    fn detect_finds_compression() {
        let data = b"RAW PACK FORMAT\0 and then some".to_vec();
        let wire = encode(&pipeline(None, Compression::Zstd(parse("m=64K").unwrap())), &data);
        assert_eq!(decode(&pipeline(None, Compression::Detect), &wire), data);
    }

    #[test]
    fn detect_on_encode_writes_plain() {
        let p = pipeline(None, Compression::Detect);
        assert_eq!(encode(&p, b"plain bytes"), b"plain bytes");
        assert_eq!(decode(&p, b"plain bytes"), b"plain bytes");
    }

    #[test]
    fn unknown_container_size_still_roundtrips() {
        let p = pipeline(Some("pw"), Compression::Zstd(parse("m=64K").unwrap()));
        let mut wire = Vec::new();
        let mut sink = p.sink(&mut wire, 0, None, &PROBE).unwrap();
        sink.write_all(b"length not known up front").unwrap();
        sink.finish().unwrap();
        assert_eq!(decode(&p, &wire), b"length not known up front");
    }

    #[test]
    fn detect_rejects_tiny_stream() {
        let p = pipeline(None, Compression::Detect);
        assert!(p.source(&b"abc"[..], &PROBE).is_err());
    }
}
