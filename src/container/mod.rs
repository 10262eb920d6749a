//! Container sniffing and embedded ICC profile lookup.
//!
//! Parsers walk segment or chunk headers only. Nothing is decompressed and
//! profile bytes are never interpreted: a lookup yields the byte range of the
//! payload, and [`FileFormatParser::seek_to_icc_profile`] leaves the stream
//! positioned at its first byte.

mod jpeg;
mod png;
mod webp;

pub use jpeg::JpegParser;
pub use png::PngParser;
pub use webp::WebpParser;

use std::io::{self, Read, Seek, SeekFrom};

use log::debug;

use crate::error::{Result, io_error};
use crate::source::SourceStream;

/// Byte range of an embedded ICC profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IccProfileLocation {
    /// Offset of the first payload byte from the start of the stream.
    pub offset: u64,
    /// Payload length in bytes.
    pub len: u64,
}

/// A container format that can be sniffed and searched for a profile.
pub trait FileFormatParser: Send + Sync {
    /// Which container this parser reads.
    fn kind(&self) -> ContainerKind;

    /// Read the signature from the current position and compare it exactly.
    ///
    /// Consumes the signature bytes. A stream shorter than the signature
    /// does not match.
    fn sniff(&self, reader: &mut dyn Read) -> Result<bool>;

    /// Find the profile payload, starting from the beginning of the stream.
    ///
    /// Returns `Ok(None)` when a terminal marker or the end of the stream is
    /// reached first, when a size field is invalid, or when the declared
    /// payload runs past the end of the stream.
    fn locate_icc_profile(&self, stream: &mut dyn SourceStream)
    -> Result<Option<IccProfileLocation>>;

    /// Position `stream` at the profile payload.
    ///
    /// Returns `Ok(false)` under the same conditions as
    /// [`locate_icc_profile`](Self::locate_icc_profile) returns `None`; the
    /// stream position is then unspecified.
    fn seek_to_icc_profile(&self, stream: &mut dyn SourceStream) -> Result<bool> {
        match self.locate_icc_profile(stream)? {
            Some(loc) => {
                stream.seek(SeekFrom::Start(loc.offset)).map_err(io_error)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Container families recognized from their leading bytes.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// JPEG/JFIF, `FF D8 FF`.
    Jpeg,
    /// PNG, eight-byte signature.
    Png,
    /// GIF87a or GIF89a.
    Gif,
    /// RIFF container with a `WEBP` form type.
    WebP,
    /// ISOBMFF `ftyp` box with an `avif` or `avis` brand.
    Avif,
    /// JPEG XL, bare codestream or ISOBMFF container.
    Jxl,
    /// TIFF, either byte order.
    Tiff,
    /// Windows bitmap, `BM`.
    Bmp,
}

impl ContainerKind {
    /// Bytes [`detect`](Self::detect) needs to recognize every kind.
    pub const SNIFF_BYTES: usize = 12;

    /// Detect the container from its first bytes. Returns `None` if unrecognized.
    pub fn detect(data: &[u8]) -> Option<Self> {
        // JPEG: FF D8 FF
        if data.len() >= 3 && data[..3] == [0xFF, 0xD8, 0xFF] {
            return Some(Self::Jpeg);
        }

        if data.len() >= 8 && data[..8] == png::SIGNATURE {
            return Some(Self::Png);
        }

        // GIF: "GIF87a" or "GIF89a"
        if data.len() >= 6
            && data[..3] == *b"GIF"
            && data[3] == b'8'
            && (data[4] == b'7' || data[4] == b'9')
            && data[5] == b'a'
        {
            return Some(Self::Gif);
        }

        // WebP: "RIFF....WEBP"
        if data.len() >= 12 && data[..4] == *b"RIFF" && data[8..12] == *b"WEBP" {
            return Some(Self::WebP);
        }

        // AVIF: ftyp box with avif/avis brand
        if data.len() >= 12 && &data[4..8] == b"ftyp" {
            let brand = &data[8..12];
            if brand == b"avif" || brand == b"avis" {
                return Some(Self::Avif);
            }
        }

        // JPEG XL codestream: FF 0A
        if data.len() >= 2 && data[..2] == [0xFF, 0x0A] {
            return Some(Self::Jxl);
        }

        // JPEG XL container: 00 00 00 0C "JXL " 0D 0A 87 0A
        if data.len() >= 12
            && data[..4] == [0x00, 0x00, 0x00, 0x0C]
            && data[4..8] == *b"JXL "
            && data[8..12] == [0x0D, 0x0A, 0x87, 0x0A]
        {
            return Some(Self::Jxl);
        }

        // TIFF: "II*\0" or "MM\0*"
        if data.len() >= 4 && (data[..4] == *b"II*\0" || data[..4] == *b"MM\0*") {
            return Some(Self::Tiff);
        }

        if data.len() >= 2 && data[..2] == *b"BM" {
            return Some(Self::Bmp);
        }

        None
    }

    /// Read up to [`SNIFF_BYTES`](Self::SNIFF_BYTES) from the start of
    /// `stream`, detect, and rewind.
    pub fn detect_stream(stream: &mut dyn SourceStream) -> Result<Option<Self>> {
        stream.seek(SeekFrom::Start(0)).map_err(io_error)?;
        let mut prefix = Vec::with_capacity(Self::SNIFF_BYTES);
        Read::take(&mut *stream, Self::SNIFF_BYTES as u64)
            .read_to_end(&mut prefix)
            .map_err(io_error)?;
        stream.seek(SeekFrom::Start(0)).map_err(io_error)?;
        Ok(Self::detect(&prefix))
    }

    /// Parser for this container, if profile lookup is supported.
    pub fn parser(self) -> Option<&'static dyn FileFormatParser> {
        match self {
            Self::Jpeg => Some(&JpegParser),
            Self::Png => Some(&PngParser),
            Self::WebP => Some(&WebpParser),
            _ => None,
        }
    }

    /// MIME type string.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
            Self::Avif => "image/avif",
            Self::Jxl => "image/jxl",
            Self::Tiff => "image/tiff",
            Self::Bmp => "image/bmp",
        }
    }
}

impl core::fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Jpeg => "JPEG",
            Self::Png => "PNG",
            Self::Gif => "GIF",
            Self::WebP => "WebP",
            Self::Avif => "AVIF",
            Self::Jxl => "JPEG XL",
            Self::Tiff => "TIFF",
            Self::Bmp => "BMP",
        })
    }
}

/// Detect the container of `stream` and locate its ICC profile.
///
/// `Ok(None)` when the container is unknown, has no parser, or carries no
/// profile.
pub fn locate_icc_profile(
    stream: &mut dyn SourceStream,
) -> Result<Option<(ContainerKind, IccProfileLocation)>> {
    let Some(kind) = ContainerKind::detect_stream(stream)? else {
        debug!("icc lookup: unrecognized container");
        return Ok(None);
    };
    let Some(parser) = kind.parser() else {
        debug!("icc lookup: no profile parser for {kind}");
        return Ok(None);
    };
    let found = parser.locate_icc_profile(stream)?;
    match found {
        Some(loc) => debug!("icc lookup: {kind} profile at {} ({} bytes)", loc.offset, loc.len),
        None => debug!("icc lookup: {kind} has no profile"),
    }
    Ok(found.map(|loc| (kind, loc)))
}

// ---------------------------------------------------------------------------
// Read helpers
// ---------------------------------------------------------------------------

/// Fill `buf`, or report `false` if the stream ends first.
fn read_or_eof(reader: &mut dyn Read, buf: &mut [u8]) -> Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(io_error(e)),
    }
}

/// `location` if its payload ends within the stream.
fn within_stream(
    stream: &mut dyn SourceStream,
    location: IccProfileLocation,
) -> Result<Option<IccProfileLocation>> {
    let end = stream.seek(SeekFrom::End(0)).map_err(io_error)?;
    let fits = location
        .offset
        .checked_add(location.len)
        .is_some_and(|last| last <= end);
    Ok(fits.then_some(location))
}

/// Compare the next `signature.len()` bytes against `signature`.
fn sniff_exact(reader: &mut dyn Read, signature: &[u8]) -> Result<bool> {
    let mut buf = [0u8; 16];
    let buf = &mut buf[..signature.len()];
    Ok(read_or_eof(reader, buf)? && buf == signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn detect_known_prefixes() {
        let cases: [(&[u8], ContainerKind); 10] = [
            (&[0xFF, 0xD8, 0xFF, 0xE0], ContainerKind::Jpeg),
            (&png::SIGNATURE, ContainerKind::Png),
            (b"GIF89a\x00\x00", ContainerKind::Gif),
            (b"RIFF\x00\x00\x00\x00WEBP", ContainerKind::WebP),
            (b"\x00\x00\x00\x18ftypavif", ContainerKind::Avif),
            (&[0xFF, 0x0A], ContainerKind::Jxl),
            (
                &[0x00, 0x00, 0x00, 0x0C, b'J', b'X', b'L', b' ', 0x0D, 0x0A, 0x87, 0x0A],
                ContainerKind::Jxl,
            ),
            (b"II*\x00\x08\x00", ContainerKind::Tiff),
            (b"MM\x00*\x00\x00", ContainerKind::Tiff),
            (b"BM\x36\x00", ContainerKind::Bmp),
        ];
        for (bytes, kind) in cases {
            assert_eq!(ContainerKind::detect(bytes), Some(kind), "{kind}");
        }
    }

    #[test]
    fn detect_unknown() {
        assert_eq!(ContainerKind::detect(b"nope"), None);
        assert_eq!(ContainerKind::detect(&[]), None);
        assert_eq!(ContainerKind::detect(&[0xFF, 0xD8]), None);
    }

    #[test]
    fn parsers_exist_for_profile_containers() {
        assert_eq!(ContainerKind::Jpeg.parser().unwrap().kind(), ContainerKind::Jpeg);
        assert_eq!(ContainerKind::Png.parser().unwrap().kind(), ContainerKind::Png);
        assert_eq!(ContainerKind::WebP.parser().unwrap().kind(), ContainerKind::WebP);
        assert!(ContainerKind::Gif.parser().is_none());
        assert!(ContainerKind::Bmp.parser().is_none());
    }

    #[test]
    fn detect_stream_rewinds() {
        let mut s = Cursor::new(b"GIF87a and then some".to_vec());
        s.set_position(5);
        assert_eq!(
            ContainerKind::detect_stream(&mut s).unwrap(),
            Some(ContainerKind::Gif)
        );
        assert_eq!(s.position(), 0);
    }

    #[test]
    fn mime_and_display() {
        assert_eq!(ContainerKind::Tiff.mime_type(), "image/tiff");
        assert_eq!(ContainerKind::Jxl.to_string(), "JPEG XL");
    }

    #[test]
    fn unknown_container_has_no_profile() {
        let mut s = Cursor::new(b"plain text".to_vec());
        assert_eq!(locate_icc_profile(&mut s).unwrap(), None);
        let mut gif = Cursor::new(b"GIF89a\x01\x00\x01\x00".to_vec());
        assert_eq!(locate_icc_profile(&mut gif).unwrap(), None);
    }
}
