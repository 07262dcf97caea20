//! The fixed bundle header (C3).

use binrw::BinRead;
use modular_bitfield::prelude::*;

use crate::decompress::CompressionType;
use crate::endian::{AlignExt as _, SeekRead};
use crate::error::{Error, Result};

const SIGNATURE: &[u8; 8] = b"UnityFS\0";
const RESERVED_MASK: u32 = !(0x3F | 0x80 | 0x200);

/// Raw bit layout of the header's `flags` field, decoded the same way the
/// teacher's `ArchiveFlags` bitfield is: parsed as a big-endian `u32` and
/// remapped into `modular-bitfield`'s expected byte order before unpacking.
#[bitfield]
#[binread]
#[derive(Debug, Clone, Copy)]
#[br(map = |x: u32| Self::from_bytes(x.to_le_bytes()))]
struct RawHeaderFlags {
    compression_tag: B6,
    block_directory_merged: bool,
    blocksinfo_at_end: bool,
    old_web_plugin_compatible: bool,
    needs_padding_at_start: bool,
    reserved_pad: B22,
}

#[derive(BinRead, Debug, Clone)]
#[br(big)]
struct RawHeader {
    version: u32,
    #[br(parse_with = crate::endian::read_bounded_cstr)]
    unity_version: String,
    #[br(parse_with = crate::endian::read_bounded_cstr)]
    unity_revision: String,
    total_size: i64,
    compressed_blocksinfo_size: u32,
    uncompressed_blocksinfo_size: u32,
    flags: RawHeaderFlags,
}

/// Flag bits from the header's `flags` field (§3).
#[derive(Debug, Clone, Copy)]
pub struct HeaderFlags {
    pub compression_type: CompressionType,
    pub blocksinfo_at_end: bool,
    pub needs_padding_at_start: bool,
}

/// The fixed UnityFS bundle header.
#[derive(Debug, Clone)]
pub struct BundleHeader {
    pub version: u32,
    pub unity_version: String,
    pub unity_revision: String,
    pub total_size: i64,
    pub compressed_blocksinfo_size: u32,
    pub uncompressed_blocksinfo_size: u32,
    pub flags: HeaderFlags,
    /// Absolute byte offset immediately after the `flags` field.
    pub header_end_position: u64,
}

impl BundleHeader {
    /// 16 for version >= 7, 4 otherwise.
    #[must_use]
    pub const fn alignment_size(&self) -> u64 {
        if self.version >= 7 {
            16
        } else {
            4
        }
    }
}

/// Parses and validates the fixed header at the start of `reader`, which
/// must be positioned at offset 0.
///
/// The 8-byte magic is checked manually rather than via `binrw`'s `magic`
/// attribute so that a mismatch can report the exact bytes observed (see
/// [`Error::InvalidSignature`]); the rest of the header is decoded with
/// `binrw`.
///
/// # Errors
///
/// Returns [`Error::InvalidSignature`] if the magic doesn't match,
/// [`Error::UnsupportedVersion`] if the version isn't 6 or 7, and
/// [`Error::MalformedHeader`] for any other structural violation (flag bit
/// layout, I/O failure, invalid UTF-8 in the version strings).
pub fn parse_header(reader: &mut dyn SeekRead) -> Result<BundleHeader> {
    use std::io::Read as _;

    let mut signature = [0u8; SIGNATURE.len()];
    reader
        .read_exact(&mut signature)
        .map_err(|e| Error::MalformedHeader(e.to_string()))?;
    if signature != *SIGNATURE {
        return Err(Error::InvalidSignature {
            found: String::from_utf8_lossy(&signature).into_owned(),
        });
    }

    let raw = RawHeader::read(&mut reader).map_err(|e| Error::MalformedHeader(e.to_string()))?;

    if raw.version != 6 && raw.version != 7 {
        return Err(Error::UnsupportedVersion(raw.version));
    }

    let header_end_position = reader.stream_position()?;

    let flags = validate_flags(raw.flags, raw.version)?;

    Ok(BundleHeader {
        version: raw.version,
        unity_version: raw.unity_version,
        unity_revision: raw.unity_revision,
        total_size: raw.total_size,
        compressed_blocksinfo_size: raw.compressed_blocksinfo_size,
        uncompressed_blocksinfo_size: raw.uncompressed_blocksinfo_size,
        flags,
        header_end_position,
    })
}

fn validate_flags(raw: RawHeaderFlags, version: u32) -> Result<HeaderFlags> {
    let mut reserved = 0u32;
    if raw.block_directory_merged() {
        reserved |= 0x40;
    }
    if raw.old_web_plugin_compatible() {
        reserved |= 0x100;
    }
    reserved |= raw.reserved_pad() << 10;
    reserved &= RESERVED_MASK;

    if reserved != 0 {
        return Err(Error::MalformedHeader(format!(
            "reserved flag bits set: {reserved:#010x}"
        )));
    }

    let compression_tag = raw.compression_tag();
    let compression_type = CompressionType::from_tag(compression_tag).ok_or_else(|| {
        Error::MalformedHeader(format!(
            "compression type {compression_tag} out of range (must be <= 4)"
        ))
    })?;

    let blocksinfo_at_end = raw.blocksinfo_at_end();
    let needs_padding_at_start = raw.needs_padding_at_start();

    if needs_padding_at_start && version < 7 {
        return Err(Error::MalformedHeader(
            "needs_padding_at_start (bit 9) set on a version < 7 bundle".to_owned(),
        ));
    }

    Ok(HeaderFlags {
        compression_type,
        blocksinfo_at_end,
        needs_padding_at_start,
    })
}

/// Aligns `reader` to the header's alignment boundary, for version >= 7
/// bundles. No-op for version 6. The skipped bytes are not verified to be
/// zero (see spec design notes on alignment padding).
pub fn align_after_header(reader: &mut dyn SeekRead, header: &BundleHeader) -> Result<()> {
    if header.version >= 7 {
        reader.align_to(header.alignment_size())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn write_header(
        buf: &mut Vec<u8>,
        version: u32,
        unity_version: &str,
        unity_revision: &str,
        total_size: i64,
        compressed_bi: u32,
        uncompressed_bi: u32,
        flags: u32,
    ) {
        buf.extend_from_slice(b"UnityFS\0");
        buf.extend_from_slice(&version.to_be_bytes());
        buf.extend_from_slice(unity_version.as_bytes());
        buf.push(0);
        buf.extend_from_slice(unity_revision.as_bytes());
        buf.push(0);
        buf.extend_from_slice(&total_size.to_be_bytes());
        buf.extend_from_slice(&compressed_bi.to_be_bytes());
        buf.extend_from_slice(&uncompressed_bi.to_be_bytes());
        buf.extend_from_slice(&flags.to_be_bytes());
    }

    #[test]
    fn parses_minimal_v6_header() {
        let mut buf = Vec::new();
        write_header(&mut buf, 6, "2020.3.48f1", "b805b124c6b7", 300, 36, 36, 0);
        let mut c = Cursor::new(buf);
        let header = parse_header(&mut c).unwrap();
        assert_eq!(header.version, 6);
        assert_eq!(header.unity_version, "2020.3.48f1");
        assert_eq!(header.unity_revision, "b805b124c6b7");
        assert_eq!(header.total_size, 300);
        assert_eq!(header.alignment_size(), 4);
        assert!(!header.flags.blocksinfo_at_end);
        assert!(matches!(
            header.flags.compression_type,
            CompressionType::None
        ));
    }

    #[test]
    fn bad_signature_rejected() {
        let mut buf = b"UnityWeb\0".to_vec();
        buf.extend_from_slice(&6u32.to_be_bytes());
        let mut c = Cursor::new(buf);
        let err = parse_header(&mut c).unwrap_err();
        match err {
            Error::InvalidSignature { found } => assert_eq!(found, "UnityWeb"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unsupported_version_rejected() {
        let mut buf = Vec::new();
        write_header(&mut buf, 9, "x", "y", 0, 0, 0, 0);
        let mut c = Cursor::new(buf);
        let err = parse_header(&mut c).unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion(9)));
    }

    #[test]
    fn v7_streamed_lzma_flags_parsed() {
        let mut buf = Vec::new();
        // LZMA (1) | blocksinfo_at_end (0x80) | needs_padding_at_start (0x200)
        write_header(&mut buf, 7, "2020.3.48f1", "rev", 0, 256, 512, 0x281);
        let mut c = Cursor::new(buf);
        let header = parse_header(&mut c).unwrap();
        assert!(header.flags.blocksinfo_at_end);
        assert!(header.flags.needs_padding_at_start);
        assert_eq!(header.alignment_size(), 16);
        assert!(matches!(header.flags.compression_type, CompressionType::Lzma));
    }

    #[test]
    fn reserved_bits_rejected() {
        let mut buf = Vec::new();
        write_header(&mut buf, 6, "x", "y", 0, 0, 0, 0x1000);
        let mut c = Cursor::new(buf);
        let err = parse_header(&mut c).unwrap_err();
        assert!(matches!(err, Error::MalformedHeader(_)));
    }

    #[test]
    fn start_pad_bit_on_v6_rejected() {
        let mut buf = Vec::new();
        write_header(&mut buf, 6, "x", "y", 0, 0, 0, 0x200);
        let mut c = Cursor::new(buf);
        let err = parse_header(&mut c).unwrap_err();
        assert!(matches!(err, Error::MalformedHeader(_)));
    }

    #[test]
    fn compression_tag_out_of_range_rejected() {
        let mut buf = Vec::new();
        write_header(&mut buf, 6, "x", "y", 0, 0, 0, 5);
        let mut c = Cursor::new(buf);
        let err = parse_header(&mut c).unwrap_err();
        assert!(matches!(err, Error::MalformedHeader(_)));
    }
}
