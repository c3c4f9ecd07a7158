//! # Bitstring Status List
//!
//! A status list implemented as a fixed-length bitstring, following
//! [Bitstring Status List v1.0](https://www.w3.org/TR/vc-bitstring-status-list/).
//!
//! The bitstring is encoded such that the first index, with a value of
//! zero, is located at the left-most bit, and the last index at the
//! right-most bit. The encoded form is the GZIP-compressed bitstring,
//! base64url-encoded without padding.

use std::io::{Read, Write};

use anyhow::{Result, anyhow};
use base64ct::{Base64UrlUnpadded, Encoding};
use bitvec::order::Msb0;
use bitvec::vec::BitVec;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

/// A fixed-length list of status bits. Pure in-memory state: all I/O and
/// credential wrapping happens elsewhere.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusList {
    bits: BitVec<u8, Msb0>,
    len: usize,
}

impl StatusList {
    /// Create a zeroed bitstring of `len` bits.
    #[must_use]
    pub fn new(len: usize) -> Self {
        // backing storage is whole bytes; trailing pad bits stay clear
        let mut bits = BitVec::with_capacity(len.div_ceil(8) * 8);
        bits.resize(len.div_ceil(8) * 8, false);
        Self { bits, len }
    }

    /// The number of addressable bits.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// `true` when the list has no addressable bits.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The value of the bit at `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is outside `[0, len)`.
    pub fn get(&self, index: usize) -> Result<bool> {
        if index >= self.len {
            return Err(anyhow!("status index {index} out of range"));
        }
        Ok(self.bits[index])
    }

    /// Set the bit at `index` to `value`.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is outside `[0, len)`.
    pub fn set(&mut self, index: usize, value: bool) -> Result<()> {
        if index >= self.len {
            return Err(anyhow!("status index {index} out of range"));
        }
        self.bits.set(index, value);
        Ok(())
    }

    /// Produce the compressed, base64url-encoded form embedded in a status
    /// credential.
    ///
    /// # Errors
    ///
    /// Returns an error if compression fails.
    pub fn encode(&self) -> Result<String> {
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(self.bits.as_raw_slice())?;
        let compressed = encoder.finish()?;
        Ok(Base64UrlUnpadded::encode_string(&compressed))
    }

    /// Reconstruct a list of `len` bits from its encoded form. Exact
    /// inverse of [`StatusList::encode`].
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not base64url, is not a valid GZIP
    /// stream, or decompresses to a different length than `len` requires.
    pub fn decode(encoded: &str, len: usize) -> Result<Self> {
        let compressed = Base64UrlUnpadded::decode_vec(encoded)
            .map_err(|e| anyhow!("issue decoding base64url: {e}"))?;

        let mut bytes = Vec::new();
        GzDecoder::new(compressed.as_slice()).read_to_end(&mut bytes)?;

        if bytes.len() != len.div_ceil(8) {
            return Err(anyhow!(
                "encoded list holds {} bytes, expected {} for {len} bits",
                bytes.len(),
                len.div_ceil(8)
            ));
        }

        Ok(Self {
            bits: BitVec::from_vec(bytes),
            len,
        })
    }
}
