//! Error handling types.

/// Which stage a [`DecompressionSizeMismatch`](Error::DecompressionSizeMismatch) occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// The BlocksInfo directory blob.
    BlocksInfo,
    /// A storage block, identified by its index.
    Block(usize),
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlocksInfo => f.write_str("BlocksInfo"),
            Self::Block(index) => write!(f, "block {index}"),
        }
    }
}

/// The state the orchestrator (C9) was in when an uncategorized failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    Start,
    HeaderValid,
    BlocksInfoRead,
    BlocksInfoParsed,
    DataRegionReady,
}

impl std::fmt::Display for ParseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// A half-open byte range, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub offset: u64,
    pub size: u64,
}

impl Range {
    #[must_use]
    pub const fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    #[must_use]
    pub fn end(self) -> u64 {
        self.offset.saturating_add(self.size)
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.offset, self.end())
    }
}

/// Error produced while parsing a UnityFS bundle.
///
/// Every variant carries enough structured context (paths, offsets, expected
/// vs. actual sizes, offending bitmasks) for a caller to render a precise
/// diagnostic without parsing a message string.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The 8-byte magic at the start of the file was not `UnityFS\0`.
    #[error("invalid signature: expected `UnityFS`, found {found:?}")]
    InvalidSignature { found: String },

    /// The header declared a version this core does not support.
    #[error("unsupported bundle version {0} (supported: 6, 7)")]
    UnsupportedVersion(u32),

    /// The header failed a structural or arithmetic validation.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// The decompressor capability does not recognize the requested algorithm.
    #[error("unsupported compression method tag {0}")]
    UnsupportedCompression(u8),

    /// The decompressor capability produced output of the wrong length.
    #[error("decompression size mismatch in {stage}: expected {expected}, got {actual}")]
    DecompressionSizeMismatch {
        actual: usize,
        expected: usize,
        stage: Stage,
    },

    /// The BlocksInfo directory blob was structurally invalid.
    #[error("failed to parse BlocksInfo: {0}")]
    BlocksInfoParse(String),

    /// A storage block set reserved flag bits.
    #[error("reserved bits set in storage block flags: {mask:#06x}")]
    BlockFlagsReserved { mask: u16 },

    /// Decompressing a storage block failed for a reason not classified above.
    #[error("failed to decompress storage block {index}: {cause}")]
    BlockDecompressionFailed {
        index: usize,
        #[source]
        cause: Box<Error>,
    },

    /// A node or slice range exceeded the bounds of its container.
    #[error("{path:?} range {range} exceeds container of length {container_length}")]
    OutOfBounds {
        path: String,
        range: Range,
        container_length: u64,
    },

    /// Two nodes shared the same path.
    #[error("duplicate node path {0:?}")]
    DuplicateNode(String),

    /// Two nodes' byte ranges within the data region overlapped.
    #[error("node {path_a:?} {range_a} overlaps node {path_b:?} {range_b}")]
    NodeOverlap {
        path_a: String,
        range_a: Range,
        path_b: String,
        range_b: Range,
    },

    /// A streaming reference (C8) could not be resolved against the node table.
    #[error("streaming reference error: {0}")]
    StreamingInfo(String),

    /// Orchestrator-level envelope for a failure that doesn't fit another variant.
    #[error("bundle parse failed in state {state}: {cause}")]
    BundleError {
        state: ParseState,
        #[source]
        cause: Box<Error>,
    },

    /// An I/O error occurred reading the underlying byte source.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias for this crate's fallible operations.
pub type Result<T> = std::result::Result<T, Error>;
