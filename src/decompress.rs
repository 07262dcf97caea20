//! The decompressor capability (C2): an injected, pure function from
//! `(compressed bytes, expected output size, algorithm) -> decompressed bytes`.
//!
//! The core never hardcodes a compression library call; it always goes
//! through a [`Decompressor`] implementation, so tests can substitute a fake
//! and hosts can swap in a different LZMA/LZ4/LZHAM backend.

use num_enum::TryFromPrimitive;

/// The closed set of compression algorithms a UnityFS bundle can name.
///
/// `Lzham` is part of the tag space but has no bundled implementation (no
/// well-maintained LZHAM crate exists in this ecosystem); the default
/// decompressor reports it as unsupported, same as upstream UnityFS readers
/// that never implemented it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum CompressionType {
    None = 0,
    Lzma = 1,
    Lz4 = 2,
    Lz4Hc = 3,
    Lzham = 4,
}

impl CompressionType {
    /// Parses a 6-bit compression tag (bits 0-5 of a flags field), mapping
    /// out-of-range tags to `None` so the caller can surface
    /// [`crate::error::Error::UnsupportedCompression`] with the raw tag value.
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::try_from(tag).ok()
    }
}

/// Failure from a [`Decompressor`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum DecompressError {
    /// The algorithm tag is outside the closed set, or has no implementation.
    #[error("unsupported compression method tag {0}")]
    UnsupportedCompression(u8),

    /// The decompressed output did not match the size the header declared.
    #[error("decompressed size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { actual: usize, expected: usize },

    /// Any other implementation-defined corruption error.
    #[error(transparent)]
    Corrupt(#[from] anyhow::Error),
}

/// The injected decompressor capability.
///
/// Implementations must be pure with respect to their inputs: the same
/// `(input, expected_size, algorithm)` triple always yields the same output
/// or the same error.
pub trait Decompressor {
    /// Decompresses `input`, which was compressed with `algorithm`, and
    /// returns exactly `expected_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DecompressError::UnsupportedCompression`] for an algorithm
    /// this implementation cannot handle, or
    /// [`DecompressError::SizeMismatch`] if the underlying algorithm yields
    /// any length other than `expected_size`.
    fn decompress(
        &self,
        input: &[u8],
        expected_size: usize,
        algorithm: CompressionType,
    ) -> Result<Vec<u8>, DecompressError>;
}

/// The default decompressor, backed by the `lz4` and `lzma-rs` crates.
///
/// For `CompressionType::None` the input is copied unchanged, but the size
/// contract is still enforced: an `expected_size` that doesn't match
/// `input.len()` is a [`DecompressError::SizeMismatch`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDecompressor;

impl Decompressor for DefaultDecompressor {
    fn decompress(
        &self,
        input: &[u8],
        expected_size: usize,
        algorithm: CompressionType,
    ) -> Result<Vec<u8>, DecompressError> {
        let output = match algorithm {
            CompressionType::None => input.to_vec(),
            CompressionType::Lz4 | CompressionType::Lz4Hc => {
                let size = i32::try_from(expected_size)
                    .map_err(|e| DecompressError::Corrupt(anyhow::Error::new(e)))?;
                lz4::block::decompress(input, Some(size))
                    .map_err(|e| DecompressError::Corrupt(anyhow::Error::new(e)))?
            }
            CompressionType::Lzma => {
                use lzma_rs::decompress::{Options, UnpackedSize};

                let mut output = std::io::Cursor::new(Vec::with_capacity(expected_size));
                let mut reader = std::io::Cursor::new(input);
                lzma_rs::lzma_decompress_with_options(
                    &mut reader,
                    &mut output,
                    &Options {
                        unpacked_size: UnpackedSize::UseProvided(Some(expected_size as u64)),
                        ..Default::default()
                    },
                )
                .map_err(|e| DecompressError::Corrupt(anyhow::Error::new(e)))?;
                output.into_inner()
            }
            CompressionType::Lzham => {
                return Err(DecompressError::UnsupportedCompression(algorithm as u8));
            }
        };

        if output.len() != expected_size {
            return Err(DecompressError::SizeMismatch {
                actual: output.len(),
                expected: expected_size,
            });
        }

        Ok(output)
    }
}
