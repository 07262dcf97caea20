//! Node extractor (C7): bounds checks, duplicate detection, and opt-in
//! overlap detection over the node table, plus reading a node's payload out
//! of the data region.

use std::collections::HashSet;

use crate::blocks_info::NodeInfo;
use crate::data_region::DataRegion;
use crate::error::{Error, Range, Result};

/// Validates that `node`'s range falls within `data_region`.
///
/// # Errors
///
/// Returns [`Error::OutOfBounds`] if `offset < 0`, `size < 0`, or
/// `offset + size` exceeds the data region's length (checked for overflow).
pub fn validate_bounds(node: &NodeInfo, data_region: &DataRegion) -> Result<()> {
    let region_length = data_region.len();

    let offset = u64::try_from(node.offset).map_err(|_| Error::OutOfBounds {
        path: node.path.clone(),
        range: Range::new(0, 0),
        container_length: region_length,
    })?;
    let size = u64::try_from(node.size).map_err(|_| Error::OutOfBounds {
        path: node.path.clone(),
        range: Range::new(offset, 0),
        container_length: region_length,
    })?;

    let end = offset.checked_add(size).ok_or_else(|| Error::OutOfBounds {
        path: node.path.clone(),
        range: Range::new(offset, size),
        container_length: region_length,
    })?;

    if end > region_length {
        return Err(Error::OutOfBounds {
            path: node.path.clone(),
            range: Range::new(offset, size),
            container_length: region_length,
        });
    }

    Ok(())
}

/// Scans `nodes` for two entries sharing the same path (byte-identical,
/// case-sensitive comparison).
///
/// # Errors
///
/// Returns [`Error::DuplicateNode`] naming the first duplicate path found.
pub fn check_no_duplicates(nodes: &[NodeInfo]) -> Result<()> {
    let mut seen = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if !seen.insert(node.path.as_str()) {
            return Err(Error::DuplicateNode(node.path.clone()));
        }
    }
    Ok(())
}

/// Checks that no two non-zero-size nodes overlap in `[offset, offset+size)`.
///
/// Sorts a local copy of indices by offset (stable on ties by original
/// index) and compares each adjacent pair; zero-size nodes never overlap
/// anything.
///
/// # Errors
///
/// Returns [`Error::NodeOverlap`] naming both offending paths and ranges.
pub fn check_no_overlap(nodes: &[NodeInfo]) -> Result<()> {
    let mut order: Vec<usize> = (0..nodes.len()).collect();
    order.sort_by_key(|&i| nodes[i].offset);

    for window in order.windows(2) {
        let (a, b) = (&nodes[window[0]], &nodes[window[1]]);
        if a.size == 0 {
            continue;
        }
        let a_end = a.offset.saturating_add(a.size);
        if a_end > b.offset {
            return Err(Error::NodeOverlap {
                path_a: a.path.clone(),
                range_a: Range::new(a.offset as u64, a.size as u64),
                path_b: b.path.clone(),
                range_b: Range::new(b.offset as u64, b.size as u64),
            });
        }
    }

    Ok(())
}

/// Reads a node's payload out of `data_region`, assuming bounds were already
/// validated (e.g. by [`validate_bounds`] during bundle assembly).
///
/// # Errors
///
/// Returns [`Error::OutOfBounds`] if the node's range doesn't fit.
pub fn read<'a>(data_region: &'a DataRegion, node: &NodeInfo) -> Result<&'a [u8]> {
    let offset = u64::try_from(node.offset).map_err(|_| Error::OutOfBounds {
        path: node.path.clone(),
        range: Range::new(0, 0),
        container_length: data_region.len(),
    })?;
    let size = u64::try_from(node.size).map_err(|_| Error::OutOfBounds {
        path: node.path.clone(),
        range: Range::new(offset, 0),
        container_length: data_region.len(),
    })?;
    data_region.slice_named(&node.path, offset, size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompress::{CompressionType, DefaultDecompressor};
    use std::io::Cursor;

    fn region_of_len(len: usize) -> DataRegion {
        let mut reader = Cursor::new(vec![0u8; len]);
        crate::data_region::build_data_region(
            &mut reader,
            0,
            &[crate::blocks_info::StorageBlock {
                uncompressed_size: len as u32,
                compressed_size: len as u32,
                compression_type: CompressionType::None,
                is_streamed: false,
            }],
            &DefaultDecompressor,
        )
        .unwrap()
    }

    fn node(path: &str, offset: i64, size: i64) -> NodeInfo {
        NodeInfo {
            offset,
            size,
            flags: 0,
            path: path.to_owned(),
        }
    }

    #[test]
    fn bounds_ok_within_region() {
        let region = region_of_len(2048);
        assert!(validate_bounds(&node("a", 0, 512), &region).is_ok());
    }

    #[test]
    fn bounds_reject_negative_offset() {
        let region = region_of_len(2048);
        assert!(validate_bounds(&node("a", -1, 10), &region).is_err());
    }

    #[test]
    fn bounds_reject_overrun() {
        let region = region_of_len(2048);
        let err = validate_bounds(&node("a", 2000, 100), &region).unwrap_err();
        assert!(matches!(err, Error::OutOfBounds { .. }));
    }

    #[test]
    fn duplicate_paths_detected() {
        let nodes = vec![node("a", 0, 10), node("b", 10, 10), node("a", 20, 10)];
        let err = check_no_duplicates(&nodes).unwrap_err();
        assert!(matches!(err, Error::DuplicateNode(p) if p == "a"));
    }

    #[test]
    fn overlap_detected() {
        let nodes = vec![node("node1", 0, 10), node("node2", 5, 5)];
        let err = check_no_overlap(&nodes).unwrap_err();
        match err {
            Error::NodeOverlap {
                path_a, path_b, ..
            } => {
                assert_eq!(path_a, "node1");
                assert_eq!(path_b, "node2");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn zero_size_nodes_never_overlap() {
        let nodes = vec![node("a", 0, 0), node("b", 0, 10)];
        assert!(check_no_overlap(&nodes).is_ok());
    }

    #[test]
    fn adjacent_non_overlapping_nodes_ok() {
        let nodes = vec![node("a", 0, 10), node("b", 10, 10)];
        assert!(check_no_overlap(&nodes).is_ok());
    }

    #[test]
    fn read_returns_slice() {
        let region = region_of_len(16);
        let n = node("a", 0, 16);
        assert_eq!(read(&region, &n).unwrap().len(), 16);
    }
}
