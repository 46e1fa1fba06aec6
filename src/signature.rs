use std::io::{Read, Write};

use crate::error::{Field, FormatError};
use crate::io_stream::{read_field, write_field};

/// Constant identifying prefix (15 bytes).
pub const PREFIX: &[u8; 15] = b"RAW PACK FORMAT";
pub const SIGNATURE_SIZE: usize = 16;

/// Format flag bit-set stored in the last signature byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatFlags(u8);

impl FormatFlags {
    pub const NONE: FormatFlags = FormatFlags(0);
    /// Every bit a reader of this version understands.
    pub const MASK: u8 = 0x00;

    pub fn from_bits(bits: u8) -> Option<Self> {
        (bits & !Self::MASK == 0).then_some(FormatFlags(bits))
    }

    pub fn bits(self) -> u8 { self.0 }
}

/// Fixed 16-byte container token: `PREFIX || flags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; SIGNATURE_SIZE]);

impl Signature {
    pub fn new() -> Self {
        Self::with_flags(FormatFlags::NONE)
    }

    pub fn with_flags(flags: FormatFlags) -> Self {
        let mut bytes = [0u8; SIGNATURE_SIZE];
        bytes[..PREFIX.len()].copy_from_slice(PREFIX);
        bytes[PREFIX.len()] = flags.bits();
        Signature(bytes)
    }

    pub fn flags(&self) -> Option<FormatFlags> {
        FormatFlags::from_bits(self.0[PREFIX.len()])
    }

    pub fn is_valid(&self) -> bool {
        &self.0[..PREFIX.len()] == PREFIX && self.flags().is_some()
    }

    /// Reject anything that is not a valid signature. Never repairs.
    pub fn validate(self) -> Result<Self, FormatError> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(FormatError::InvalidSignature { found: hex::encode(self.0) })
        }
    }

    pub fn write<W: Write>(&self, writer: W) -> Result<(), FormatError> {
        write_field(writer, &self.0, Field::Signature)
    }

    pub fn read<R: Read>(reader: R) -> Result<Self, FormatError> {
        let mut bytes = [0u8; SIGNATURE_SIZE];
        read_field(reader, &mut bytes, Field::Signature)?;
        Ok(Signature(bytes))
    }
}

impl Default for Signature {
    fn default() -> Self { Self::new() }
}
