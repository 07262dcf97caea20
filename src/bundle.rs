//! Orchestrator (C9): drives header parsing through data-region assembly as
//! a linear state machine and assembles the final immutable [`Bundle`].

use std::io::SeekFrom;

use crate::blocks_info::{self, BlocksInfo, NodeInfo};
use crate::data_region::{self, DataRegion};
use crate::decompress::{DefaultDecompressor, Decompressor};
use crate::endian::SeekRead;
use crate::error::{Error, ParseState, Result};
use crate::header::{self, BundleHeader};
use crate::layout::{self, BlocksInfoLocation};
use crate::node;
use crate::streaming::{self, StreamingRef};

/// Caller-facing knobs for [`parse`]/[`try_parse`].
///
/// Defaults match the reference behavior: alignment padding is not
/// verified, and overlap checking runs as part of assembling a [`Bundle`].
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// When true, bytes skipped to reach an alignment boundary are read and
    /// asserted to be zero, failing with `BlocksInfoParse("non-zero padding")`
    /// otherwise. Reference readers don't do this; default `false`.
    pub verify_alignment_padding: bool,
    /// When true (the default), nodes are checked for pairwise overlap after
    /// the data region is built.
    pub check_overlap: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            verify_alignment_padding: false,
            check_overlap: true,
        }
    }
}

/// A fully parsed, immutable UnityFS bundle.
#[derive(Debug)]
pub struct Bundle {
    header: BundleHeader,
    location: BlocksInfoLocation,
    blocks_info: BlocksInfo,
    data_region: DataRegion,
}

impl Bundle {
    #[must_use]
    pub fn header(&self) -> &BundleHeader {
        &self.header
    }

    #[must_use]
    pub fn location(&self) -> BlocksInfoLocation {
        self.location
    }

    #[must_use]
    pub fn data_region(&self) -> &DataRegion {
        &self.data_region
    }

    /// The 16-byte BlocksInfo hash, preserved verbatim. Never verified.
    #[must_use]
    pub fn hash(&self) -> [u8; 16] {
        self.blocks_info.hash
    }

    /// Nodes in declaration order.
    #[must_use]
    pub fn nodes(&self) -> &[NodeInfo] {
        &self.blocks_info.nodes
    }

    /// Looks up a node by exact, case-sensitive path.
    #[must_use]
    pub fn find_node(&self, path: &str) -> Option<&NodeInfo> {
        self.blocks_info.nodes.iter().find(|n| n.path == path)
    }

    /// Reads a node's payload, a bounds-checked borrow over the data region.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfBounds`] if the node's range doesn't fit (this
    /// should not happen for a node obtained from a successfully parsed
    /// `Bundle`, since bounds are validated during assembly).
    pub fn read(&self, node: &NodeInfo) -> Result<&[u8]> {
        node::read(&self.data_region, node)
    }

    /// Resolves a streaming reference (C8) against this bundle's nodes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StreamingInfo`] if the reference cannot be resolved.
    pub fn resolve_streaming_ref(&self, reference: &StreamingRef) -> Result<&[u8]> {
        streaming::resolve(&self.blocks_info.nodes, &self.data_region, reference)
    }
}

/// The result of [`try_parse`]: never masks a failure into a silent
/// success, but gives callers a single type to match on.
#[derive(Debug)]
pub struct ParseOutcome {
    pub result: Result<Bundle>,
    /// Always empty: this core raises on the first error rather than
    /// collecting recoverable issues.
    pub warnings: Vec<String>,
}

/// Parses a UnityFS bundle from `reader` using the default
/// ([`lz4`]/[`lzma_rs`]-backed) decompressor and default [`ParseOptions`].
///
/// # Errors
///
/// See [`parse_with`].
pub fn parse(reader: &mut dyn SeekRead) -> Result<Bundle> {
    parse_with(reader, &DefaultDecompressor, ParseOptions::default())
}

/// Parses a UnityFS bundle from `reader`, with an injected decompressor
/// capability and explicit [`ParseOptions`].
///
/// Drives the pipeline `Start -> HeaderValid -> BlocksInfoRead ->
/// BlocksInfoParsed -> DataRegionReady -> Success`. Any failure stops the
/// machine; unexpected I/O failures not otherwise classified are wrapped as
/// [`Error::BundleError`] naming the state reached.
///
/// # Errors
///
/// Returns any variant of [`Error`] per §7 of the format specification.
pub fn parse_with(
    reader: &mut dyn SeekRead,
    decompressor: &dyn Decompressor,
    options: ParseOptions,
) -> Result<Bundle> {
    let state = ParseState::Start;

    let header = header::parse_header(reader)
        .map_err(|e| wrap_state(state, e))?;
    let state = ParseState::HeaderValid;

    if options.verify_alignment_padding {
        if header.version >= 7 {
            crate::endian::align_to_checked(reader, header.alignment_size())
                .map_err(|e| wrap_state(state, Error::BlocksInfoParse(e.to_string())))?;
        }
    } else {
        header::align_after_header(reader, &header).map_err(|e| wrap_state(state, e))?;
    }

    let file_length = stream_len(reader).map_err(|e| wrap_state(state, Error::Io(e)))?;
    let location = layout::compute_layout(&header, file_length).map_err(|e| wrap_state(state, e))?;

    let compressed_blocksinfo = read_blocksinfo_bytes(reader, &header, &location)
        .map_err(|e| wrap_state(state, e))?;
    let state = ParseState::BlocksInfoRead;

    let blocks_info = blocks_info::parse_blocks_info(
        &compressed_blocksinfo,
        header.uncompressed_blocksinfo_size,
        header.flags.compression_type,
        decompressor,
    )
    .map_err(|e| wrap_state(state, e))?;
    let state = ParseState::BlocksInfoParsed;

    let data_region = data_region::build_data_region(
        reader,
        location.data_region_position,
        &blocks_info.blocks,
        decompressor,
    )
    .map_err(|e| wrap_state(state, e))?;
    let _state = ParseState::DataRegionReady;

    for n in &blocks_info.nodes {
        node::validate_bounds(n, &data_region).map_err(|e| wrap_state(_state, e))?;
    }
    node::check_no_duplicates(&blocks_info.nodes).map_err(|e| wrap_state(_state, e))?;
    if options.check_overlap {
        node::check_no_overlap(&blocks_info.nodes).map_err(|e| wrap_state(_state, e))?;
    }

    Ok(Bundle {
        header,
        location,
        blocks_info,
        data_region,
    })
}

/// Runs [`parse`], collecting the result into a [`ParseOutcome`] instead of
/// propagating the error.
pub fn try_parse(reader: &mut dyn SeekRead) -> ParseOutcome {
    ParseOutcome {
        result: parse(reader),
        warnings: Vec::new(),
    }
}

fn wrap_state(state: ParseState, cause: Error) -> Error {
    // Structural/taxonomy errors (InvalidSignature, UnsupportedVersion, ...)
    // already carry precise context; only fold genuinely uncategorized I/O
    // failures into the generic envelope.
    match cause {
        Error::Io(_) => Error::BundleError {
            state,
            cause: Box::new(cause),
        },
        other => other,
    }
}

fn read_blocksinfo_bytes(
    reader: &mut dyn SeekRead,
    header: &BundleHeader,
    location: &BlocksInfoLocation,
) -> Result<Vec<u8>> {
    use std::io::Read as _;

    let len = header.compressed_blocksinfo_size as usize;
    let mut bytes = vec![0u8; len];

    if header.flags.blocksinfo_at_end {
        let return_pos = reader.stream_position()?;
        reader.seek(SeekFrom::Start(location.blocksinfo_position))?;
        reader
            .read_exact(&mut bytes)
            .map_err(|e| Error::BlocksInfoParse(format!("failed to read: {e}")))?;
        reader.seek(SeekFrom::Start(return_pos))?;
    } else {
        reader
            .read_exact(&mut bytes)
            .map_err(|e| Error::BlocksInfoParse(format!("failed to read: {e}")))?;
    }

    Ok(bytes)
}

fn stream_len(reader: &mut dyn SeekRead) -> std::io::Result<u64> {
    let pos = reader.stream_position()?;
    let len = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(pos))?;
    Ok(len)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::decompress::CompressionType;

    fn write_cstr(buf: &mut Vec<u8>, s: &str) {
        buf.extend_from_slice(s.as_bytes());
        buf.push(0);
    }

    /// Builds a minimal, uncompressed, single-block, single-node v6 bundle
    /// (scenario S1 of the format specification).
    fn build_s1() -> Vec<u8> {
        let mut directory = vec![0u8; 16]; // hash
        directory.extend_from_slice(&1i32.to_be_bytes()); // block_count
        directory.extend_from_slice(&1024u32.to_be_bytes()); // uncompressed_size
        directory.extend_from_slice(&1024u32.to_be_bytes()); // compressed_size
        directory.extend_from_slice(&0u16.to_be_bytes()); // flags
        directory.extend_from_slice(&1i32.to_be_bytes()); // node_count
        directory.extend_from_slice(&0i64.to_be_bytes()); // offset
        directory.extend_from_slice(&512i64.to_be_bytes()); // size
        directory.extend_from_slice(&0u32.to_be_bytes()); // flags
        write_cstr(&mut directory, "CAB-test/test.resS");

        let mut buf = Vec::new();
        buf.extend_from_slice(b"UnityFS\0");
        buf.extend_from_slice(&6u32.to_be_bytes());
        write_cstr(&mut buf, "2020.3.48f1");
        write_cstr(&mut buf, "b805b124c6b7");
        buf.extend_from_slice(&0i64.to_be_bytes()); // total_size placeholder
        buf.extend_from_slice(&(directory.len() as u32).to_be_bytes());
        buf.extend_from_slice(&(directory.len() as u32).to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes()); // flags: None, embedded

        buf.extend_from_slice(&directory);
        buf.extend(vec![0u8; 1024]); // data region payload

        buf
    }

    #[test]
    fn parses_s1_minimal_bundle() {
        let bytes = build_s1();
        let mut reader = Cursor::new(bytes);
        let bundle = parse(&mut reader).unwrap();

        assert_eq!(bundle.nodes().len(), 1);
        assert_eq!(bundle.nodes()[0].path, "CAB-test/test.resS");
        assert_eq!(bundle.data_region().len(), 1024);

        let node = bundle.find_node("CAB-test/test.resS").unwrap();
        assert_eq!(bundle.read(node).unwrap().len(), 512);
        assert!(matches!(
            bundle.header().flags.compression_type,
            CompressionType::None
        ));
    }

    #[test]
    fn parsing_twice_yields_structurally_equal_bundles() {
        let bytes = build_s1();
        let mut r1 = Cursor::new(bytes.clone());
        let mut r2 = Cursor::new(bytes);
        let b1 = parse(&mut r1).unwrap();
        let b2 = parse(&mut r2).unwrap();

        assert_eq!(b1.nodes().len(), b2.nodes().len());
        assert_eq!(b1.nodes()[0].path, b2.nodes()[0].path);
        assert_eq!(b1.nodes()[0].offset, b2.nodes()[0].offset);
        assert_eq!(b1.data_region().len(), b2.data_region().len());
    }

    #[test]
    fn bad_signature_via_try_parse() {
        let mut bytes = b"UnityWeb\0".to_vec();
        bytes.extend_from_slice(&6u32.to_be_bytes());
        let mut reader = Cursor::new(bytes);
        let outcome = try_parse(&mut reader);
        assert!(outcome.warnings.is_empty());
        assert!(matches!(
            outcome.result,
            Err(Error::InvalidSignature { .. })
        ));
    }

    #[test]
    fn duplicate_node_rejected_end_to_end() {
        let mut directory = vec![0u8; 16];
        directory.extend_from_slice(&1i32.to_be_bytes());
        directory.extend_from_slice(&16u32.to_be_bytes());
        directory.extend_from_slice(&16u32.to_be_bytes());
        directory.extend_from_slice(&0u16.to_be_bytes());
        directory.extend_from_slice(&2i32.to_be_bytes());
        directory.extend_from_slice(&0i64.to_be_bytes());
        directory.extend_from_slice(&8i64.to_be_bytes());
        directory.extend_from_slice(&0u32.to_be_bytes());
        write_cstr(&mut directory, "a");
        directory.extend_from_slice(&8i64.to_be_bytes());
        directory.extend_from_slice(&8i64.to_be_bytes());
        directory.extend_from_slice(&0u32.to_be_bytes());
        write_cstr(&mut directory, "a");

        let mut buf = Vec::new();
        buf.extend_from_slice(b"UnityFS\0");
        buf.extend_from_slice(&6u32.to_be_bytes());
        write_cstr(&mut buf, "x");
        write_cstr(&mut buf, "y");
        buf.extend_from_slice(&0i64.to_be_bytes());
        buf.extend_from_slice(&(directory.len() as u32).to_be_bytes());
        buf.extend_from_slice(&(directory.len() as u32).to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&directory);
        buf.extend(vec![0u8; 16]);

        let mut reader = Cursor::new(buf);
        let err = parse(&mut reader).unwrap_err();
        assert!(matches!(err, Error::DuplicateNode(p) if p == "a"));
    }
}
