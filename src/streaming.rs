//! Streaming resolver (C8): maps an external `(path, offset, size)`
//! reference to a slice of a matching node.

use crate::blocks_info::NodeInfo;
use crate::data_region::DataRegion;
use crate::error::{Error, Result};

/// An external streaming reference, resolved against a bundle's node table
/// rather than directly against the data region.
#[derive(Debug, Clone)]
pub struct StreamingRef {
    pub path: String,
    pub offset: i64,
    pub size: i64,
}

/// Resolves `reference` against `nodes`, returning a slice of `data_region`.
///
/// Path matching first tries an exact, case-sensitive match; failing that,
/// it tries each node in order and accepts the first whose path ends with
/// one of `reference.path`'s basename, `<stem>.resource`,
/// `<stem>.assets.resS`, or `<stem>.resS` — still byte-wise case-sensitive.
///
/// # Errors
///
/// Returns [`Error::StreamingInfo`] if no node matches, or if the resolved
/// offset/size aren't valid relative to the matched node.
pub fn resolve<'a>(
    nodes: &[NodeInfo],
    data_region: &'a DataRegion,
    reference: &StreamingRef,
) -> Result<&'a [u8]> {
    let node = find_node(nodes, &reference.path)
        .ok_or_else(|| Error::StreamingInfo("path does not match any node".to_owned()))?;

    if reference.offset < 0 || reference.size < 0 {
        return Err(Error::StreamingInfo(
            "streaming reference offset/size must be non-negative".to_owned(),
        ));
    }
    let offset = reference.offset as u64;
    let size = reference.size as u64;

    if node.offset < 0 {
        return Err(Error::StreamingInfo(
            "matched node has a negative offset".to_owned(),
        ));
    }
    let node_offset = node.offset as u64;
    let node_size = node.size as u64;

    if size == 0 {
        return Ok(&[]);
    }

    if size > node_size {
        return Err(Error::StreamingInfo(
            "streaming reference size exceeds matched node's size".to_owned(),
        ));
    }
    if offset > node_size - size {
        return Err(Error::StreamingInfo(
            "streaming reference offset + size exceeds matched node's size".to_owned(),
        ));
    }

    let absolute_offset = node_offset
        .checked_add(offset)
        .ok_or_else(|| Error::StreamingInfo("offset overflows data region addressing".to_owned()))?;

    data_region.slice_named(&reference.path, absolute_offset, size)
}

fn find_node<'a>(nodes: &'a [NodeInfo], path: &str) -> Option<&'a NodeInfo> {
    if let Some(node) = nodes.iter().find(|n| n.path == path) {
        return Some(node);
    }

    let basename = path.rsplit('/').next().unwrap_or(path);
    let stem = basename.rsplit_once('.').map_or(basename, |(stem, _)| stem);

    let suffixes = [
        basename.to_owned(),
        format!("{stem}.resource"),
        format!("{stem}.assets.resS"),
        format!("{stem}.resS"),
    ];

    nodes
        .iter()
        .find(|n| suffixes.iter().any(|suffix| n.path.ends_with(suffix.as_str())))
}
