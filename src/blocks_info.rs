//! BlocksInfo parser (C5): decompresses and decodes the storage-block and
//! node tables from the directory blob.

use std::io::Cursor;

use binrw::BinRead;
use modular_bitfield::prelude::*;

use crate::decompress::{CompressionType, DecompressError, Decompressor};
use crate::error::{Error, Result, Stage};

const HASH_LEN: usize = 16;

/// Raw bit layout of a storage block's `flags` field, decoded the same way
/// the teacher's `BlockFlags` bitfield is: parsed as a big-endian `u16` and
/// remapped into `modular-bitfield`'s expected byte order before unpacking.
#[bitfield]
#[binread]
#[derive(Debug, Clone, Copy)]
#[br(map = |x: u16| Self::from_bytes(x.to_le_bytes()))]
struct RawBlockFlags {
    compression_tag: B6,
    streamed: bool,
    reserved_pad: B9,
}

#[derive(BinRead, Debug, Clone)]
#[br(big)]
struct RawStorageBlock {
    uncompressed_size: u32,
    compressed_size: u32,
    flags: RawBlockFlags,
}

#[derive(BinRead, Debug, Clone)]
#[br(big)]
struct RawNode {
    offset: i64,
    size: i64,
    flags: u32,
    #[br(parse_with = crate::endian::read_bounded_cstr)]
    path: String,
}

#[derive(BinRead, Debug, Clone)]
#[br(big)]
struct RawBlocksInfo {
    hash: [u8; HASH_LEN],
    #[br(temp, assert(block_count >= 0, "invalid block count"))]
    block_count: i32,
    #[br(count = block_count as usize)]
    blocks: Vec<RawStorageBlock>,
    #[br(temp, assert(node_count >= 0, "invalid node count"))]
    node_count: i32,
    #[br(count = node_count as usize)]
    nodes: Vec<RawNode>,
}

/// One entry of the storage-block table (10 bytes on the wire).
#[derive(Debug, Clone, Copy)]
pub struct StorageBlock {
    pub uncompressed_size: u32,
    pub compressed_size: u32,
    pub compression_type: CompressionType,
    /// Informational only; never causes rejection (see §4.6).
    pub is_streamed: bool,
}

/// One entry of the node table: a virtual file within the bundle.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub offset: i64,
    pub size: i64,
    /// Opaque; preserved verbatim, never interpreted by this core.
    pub flags: u32,
    pub path: String,
}

/// The decoded BlocksInfo directory.
#[derive(Debug, Clone)]
pub struct BlocksInfo {
    /// The 16-byte hash prefix. Preserved, never verified.
    pub hash: [u8; HASH_LEN],
    pub blocks: Vec<StorageBlock>,
    pub nodes: Vec<NodeInfo>,
}

impl BlocksInfo {
    /// Sum of every block's `uncompressed_size`.
    #[must_use]
    pub fn total_uncompressed_data_size(&self) -> u64 {
        self.blocks
            .iter()
            .map(|b| u64::from(b.uncompressed_size))
            .sum()
    }
}

/// Decompresses `compressed` (expected to yield `expected_uncompressed_size`
/// bytes under `algorithm`) and parses the resulting blob into a
/// [`BlocksInfo`].
///
/// # Errors
///
/// Propagates [`Error::UnsupportedCompression`] and
/// [`Error::DecompressionSizeMismatch`] from the decompressor unchanged.
/// Any other decompression failure, or a structural problem in the decoded
/// blob (truncation, negative counts, invalid UTF-8 paths), is returned as
/// [`Error::BlocksInfoParse`].
pub fn parse_blocks_info(
    compressed: &[u8],
    expected_uncompressed_size: u32,
    algorithm: CompressionType,
    decompressor: &dyn Decompressor,
) -> Result<BlocksInfo> {
    if compressed.is_empty() {
        return Err(Error::BlocksInfoParse("compressed input is empty".to_owned()));
    }
    if expected_uncompressed_size < HASH_LEN as u32 {
        return Err(Error::BlocksInfoParse(
            "uncompressed size too small for hash".to_owned(),
        ));
    }

    let blob = decompressor
        .decompress(
            compressed,
            expected_uncompressed_size as usize,
            algorithm,
        )
        .map_err(|e| match e {
            DecompressError::UnsupportedCompression(tag) => Error::UnsupportedCompression(tag),
            DecompressError::SizeMismatch { actual, expected } => Error::DecompressionSizeMismatch {
                actual,
                expected,
                stage: Stage::BlocksInfo,
            },
            DecompressError::Corrupt(e) => Error::BlocksInfoParse(e.to_string()),
        })?;

    parse_blocks_info_blob(&blob)
}

fn parse_blocks_info_blob(blob: &[u8]) -> Result<BlocksInfo> {
    let mut r = Cursor::new(blob);
    let raw = RawBlocksInfo::read(&mut r).map_err(|e| Error::BlocksInfoParse(e.to_string()))?;

    let mut blocks = Vec::with_capacity(raw.blocks.len());
    for b in raw.blocks {
        let reserved = u16::from(b.flags.reserved_pad()) << 7;
        if reserved != 0 {
            return Err(Error::BlockFlagsReserved { mask: reserved });
        }

        let compression_tag = b.flags.compression_tag();
        let compression_type = CompressionType::from_tag(compression_tag).ok_or_else(|| {
            Error::BlocksInfoParse(format!("invalid block compression tag {compression_tag}"))
        })?;

        blocks.push(StorageBlock {
            uncompressed_size: b.uncompressed_size,
            compressed_size: b.compressed_size,
            compression_type,
            is_streamed: b.flags.streamed(),
        });
    }

    let nodes = raw
        .nodes
        .into_iter()
        .map(|n| NodeInfo {
            offset: n.offset,
            size: n.size,
            flags: n.flags,
            path: n.path,
        })
        .collect();

    Ok(BlocksInfo {
        hash: raw.hash,
        blocks,
        nodes,
    })
}
