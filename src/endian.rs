//! Bounded null-terminated UTF-8 string reads and alignment skipping (C1),
//! the two byte-level primitives `binrw` doesn't cover out of the box.
//! Fixed-width integers, the signature, and the bitfields are decoded
//! directly via `binrw` in [`crate::header`] and [`crate::blocks_info`].

use std::io::{self, Read, Seek, SeekFrom};

use binrw::{BinResult, Endian};

/// Default cap on a null-terminated string's byte length (including the
/// terminator), used unless a caller supplies a different limit.
pub const DEFAULT_MAX_STRING_LEN: usize = 65_536;

/// Marker trait for the byte sources this crate reads from.
///
/// Blanket-implemented for anything that is both [`Read`] and [`Seek`], so
/// callers can pass a `File`, a `Cursor<Vec<u8>>`, or any other seekable
/// source without implementing anything themselves.
pub trait SeekRead: Read + Seek {}
impl<T: Read + Seek + ?Sized> SeekRead for T {}

/// Failure reading a bounded string or alignment padding.
///
/// Narrower than [`crate::error::Error`]: callers (the header parser, the
/// BlocksInfo parser) wrap these into the appropriately scoped top-level
/// variant (`MalformedHeader`, `BlocksInfoParse`, ...) rather than this type
/// leaking through directly.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// A null-terminated string exceeded its maximum allowed length.
    #[error("string exceeds maximum length of {max} bytes")]
    StringTooLong { max: usize },

    /// An alignment-padding byte was checked and found to be non-zero.
    #[error("non-zero byte in alignment padding at offset {offset}")]
    NonZeroPadding { offset: u64 },

    /// Propagated I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A `binrw` custom parser: reads a null-terminated, strictly-UTF-8 string,
/// capped at [`DEFAULT_MAX_STRING_LEN`] bytes including the terminator.
///
/// Used via `#[br(parse_with = read_bounded_cstr)]` on any `String` field,
/// for both the header's version/revision strings (C3) and node paths (C5).
pub fn read_bounded_cstr<R: Read + Seek>(
    reader: &mut R,
    _endian: Endian,
    _args: (),
) -> BinResult<String> {
    let mut bytes = Vec::new();
    loop {
        if bytes.len() >= DEFAULT_MAX_STRING_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                ReadError::StringTooLong {
                    max: DEFAULT_MAX_STRING_LEN,
                },
            )
            .into());
        }
        let mut b = [0u8; 1];
        reader.read_exact(&mut b)?;
        if b[0] == 0 {
            break;
        }
        bytes.push(b[0]);
    }
    String::from_utf8(bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
}

/// Seek-based alignment skipping.
pub trait AlignExt: Seek {
    /// Advances the cursor to the next multiple of `alignment`, without
    /// inspecting the skipped bytes. Returns the number of bytes skipped.
    ///
    /// Reference UnityFS readers do not verify that this padding is zero
    /// (see spec design notes), so this is the default used by the
    /// orchestrator.
    fn align_to(&mut self, alignment: u64) -> io::Result<u64> {
        let pos = self.stream_position()?;
        let rem = pos % alignment;
        if rem == 0 {
            return Ok(0);
        }
        let pad = alignment - rem;
        self.seek(SeekFrom::Current(i64::try_from(pad).unwrap_or(i64::MAX)))?;
        Ok(pad)
    }
}

impl<T: Seek + ?Sized> AlignExt for T {}

/// Opt-in variant of [`AlignExt::align_to`] that reads the skipped bytes and
/// asserts every one of them is zero.
pub fn align_to_checked<R: Read + Seek + ?Sized>(
    reader: &mut R,
    alignment: u64,
) -> Result<u64, ReadError> {
    let pos = reader.stream_position()?;
    let rem = pos % alignment;
    if rem == 0 {
        return Ok(0);
    }
    let pad = alignment - rem;
    let mut b = [0u8; 1];
    for i in 0..pad {
        reader.read_exact(&mut b)?;
        if b[0] != 0 {
            return Err(ReadError::NonZeroPadding { offset: pos + i });
        }
    }
    Ok(pad)
}
