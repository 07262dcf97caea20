//! Data-region builder (C6): sequentially decompresses storage blocks and
//! concatenates them into the single buffer node offsets are interpreted
//! against.

use crate::blocks_info::StorageBlock;
use crate::decompress::{DecompressError, Decompressor};
use crate::endian::SeekRead;
use crate::error::{Error, Range, Result, Stage};

/// Ceiling on the addressable size of a reconstructed data region.
/// Conservatively chosen to match `i32::MAX`, the largest size a
/// twos-complement 32-bit length field (as used liberally throughout the
/// wire format) can represent.
pub const MAX_DATA_REGION_SIZE: u64 = i32::MAX as u64;

/// The concatenation of every storage block's decompressed output.
///
/// Immutable once built; node payload slices borrow from this buffer for
/// the lifetime of the owning [`crate::bundle::Bundle`].
#[derive(Debug, Clone)]
pub struct DataRegion {
    buf: Vec<u8>,
}

impl DataRegion {
    #[must_use]
    pub fn len(&self) -> u64 {
        self.buf.len() as u64
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Returns a bounds-checked slice `[offset, offset + size)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfBounds`] if the range exceeds the region.
    pub fn slice(&self, offset: u64, size: u64) -> Result<&[u8]> {
        self.slice_named("<data region>", offset, size)
    }

    pub(crate) fn slice_named(&self, path: &str, offset: u64, size: u64) -> Result<&[u8]> {
        let end = offset.checked_add(size).ok_or_else(|| Error::OutOfBounds {
            path: path.to_owned(),
            range: Range::new(offset, size),
            container_length: self.len(),
        })?;
        if end > self.len() {
            return Err(Error::OutOfBounds {
                path: path.to_owned(),
                range: Range::new(offset, size),
                container_length: self.len(),
            });
        }
        let start = usize::try_from(offset).map_err(|_| Error::OutOfBounds {
            path: path.to_owned(),
            range: Range::new(offset, size),
            container_length: self.len(),
        })?;
        let end = usize::try_from(end).map_err(|_| Error::OutOfBounds {
            path: path.to_owned(),
            range: Range::new(offset, size),
            container_length: self.len(),
        })?;
        Ok(&self.buf[start..end])
    }
}

/// Reads and decompresses `blocks` in order starting at `data_region_position`
/// in `reader`, producing the concatenated [`DataRegion`].
///
/// # Errors
///
/// Returns [`Error::BlocksInfoParse`] if `blocks` is empty,
/// [`Error::BlockFlagsReserved`] if a block sets reserved bits,
/// [`Error::BlockDecompressionFailed`] for any read or decompression
/// failure at a given block, including exceeding [`MAX_DATA_REGION_SIZE`].
pub fn build_data_region(
    reader: &mut dyn SeekRead,
    data_region_position: u64,
    blocks: &[StorageBlock],
    decompressor: &dyn Decompressor,
) -> Result<DataRegion> {
    use std::io::Read as _;

    if blocks.is_empty() {
        return Err(Error::BlocksInfoParse("empty blocks".to_owned()));
    }

    let mut total: u64 = 0;
    for (index, block) in blocks.iter().enumerate() {
        total = total
            .checked_add(u64::from(block.uncompressed_size))
            .filter(|&t| t <= MAX_DATA_REGION_SIZE)
            .ok_or_else(|| Error::BlockDecompressionFailed {
                index,
                cause: Box::new(Error::BlocksInfoParse(
                    "exceeds maximum buffer size".to_owned(),
                )),
            })?;
    }

    let mut buf = Vec::with_capacity(total as usize);
    reader.seek(std::io::SeekFrom::Start(data_region_position))?;

    for (index, block) in blocks.iter().enumerate() {
        let wrap = |cause: Error| Error::BlockDecompressionFailed {
            index,
            cause: Box::new(cause),
        };

        let mut compressed = vec![0u8; block.compressed_size as usize];
        reader
            .read_exact(&mut compressed)
            .map_err(|e| wrap(Error::BlocksInfoParse(format!("failed to read: {e}"))))?;

        let decompressed = decompressor
            .decompress(
                &compressed,
                block.uncompressed_size as usize,
                block.compression_type,
            )
            .map_err(|e| match e {
                DecompressError::UnsupportedCompression(tag) => {
                    wrap(Error::UnsupportedCompression(tag))
                }
                DecompressError::SizeMismatch { actual, expected } => wrap(Error::DecompressionSizeMismatch {
                    actual,
                    expected,
                    stage: Stage::Block(index),
                }),
                DecompressError::Corrupt(e) => wrap(Error::BlocksInfoParse(e.to_string())),
            })?;

        if decompressed.len() != block.uncompressed_size as usize {
            return Err(wrap(Error::DecompressionSizeMismatch {
                actual: decompressed.len(),
                expected: block.uncompressed_size as usize,
                stage: Stage::Block(index),
            }));
        }

        buf.extend_from_slice(&decompressed);
    }

    Ok(DataRegion { buf })
}
