//! Layout calculator (C4): turns the header plus the file's total length
//! into where the BlocksInfo directory and the data region begin.

use crate::error::{Error, Result};
use crate::header::BundleHeader;

/// Where the compressed BlocksInfo directory and the data region begin,
/// derived from the header and the file's total length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlocksInfoLocation {
    /// Absolute offset where the compressed directory begins.
    pub blocksinfo_position: u64,
    /// Absolute offset where the first storage block begins.
    pub data_region_position: u64,
    /// Bytes of padding between `header_end_position` and the aligned anchor.
    pub alignment_padding: u64,
}

/// Computes the [`BlocksInfoLocation`] for `header` given the file's total
/// length in bytes.
///
/// # Errors
///
/// Returns [`Error::MalformedHeader`] if `file_length` is inconsistent with
/// the header (negative, or too small to hold the declared compressed
/// BlocksInfo size when it's stored at the end of the file).
pub fn compute_layout(header: &BundleHeader, file_length: u64) -> Result<BlocksInfoLocation> {
    // Only version >= 7 bundles actually pad the stream to an alignment
    // boundary before the directory; reference readers never skip anything
    // for version 6, regardless of where the variable-length version/revision
    // strings happen to leave the cursor.
    let alignment_padding = if header.version >= 7 {
        let alignment = header.alignment_size();
        let rem = header.header_end_position % alignment;
        if rem == 0 { 0 } else { alignment - rem }
    } else {
        0
    };
    let aligned = header.header_end_position + alignment_padding;

    let compressed_size = u64::from(header.compressed_blocksinfo_size);

    let (blocksinfo_position, data_region_position) = if header.flags.blocksinfo_at_end {
        let blocksinfo_position = file_length.checked_sub(compressed_size).ok_or_else(|| {
            Error::MalformedHeader(format!(
                "file length {file_length} is smaller than compressed BlocksInfo size {compressed_size}"
            ))
        })?;
        (blocksinfo_position, aligned)
    } else {
        let data_region_position = aligned.checked_add(compressed_size).ok_or_else(|| {
            Error::MalformedHeader("data region position overflows u64".to_owned())
        })?;
        (aligned, data_region_position)
    };

    Ok(BlocksInfoLocation {
        blocksinfo_position,
        data_region_position,
        alignment_padding,
    })
}
