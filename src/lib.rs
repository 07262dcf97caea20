//! Read-only parser for the UnityFS bundle container format.
//!
//! Parses a bundle's fixed header, locates and decompresses its BlocksInfo
//! directory, reconstructs a contiguous data region out of its storage
//! blocks, and resolves nodes and external streaming references into
//! bounded byte slices. Does not interpret SerializedFile contents, decode
//! Mesh/Texture/Material assets, or write bundles.
//!
//! Start at [`bundle::parse`] or [`bundle::try_parse`].

pub mod blocks_info;
pub mod bundle;
pub mod data_region;
pub mod decompress;
pub mod endian;
pub mod error;
pub mod header;
pub mod layout;
pub mod node;
pub mod streaming;

pub use blocks_info::{BlocksInfo, NodeInfo, StorageBlock};
pub use bundle::{parse, parse_with, try_parse, Bundle, ParseOptions, ParseOutcome};
pub use data_region::DataRegion;
pub use decompress::{CompressionType, DecompressError, Decompressor, DefaultDecompressor};
pub use endian::SeekRead;
pub use error::{Error, ParseState, Range, Result, Stage};
pub use header::{BundleHeader, HeaderFlags};
pub use streaming::StreamingRef;
