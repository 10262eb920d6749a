//! PNG chunk walk to the `iCCP` chunk ahead of the image data.

use std::io::{Read, Seek, SeekFrom};

use super::{
    ContainerKind, FileFormatParser, IccProfileLocation, read_or_eof, sniff_exact, within_stream,
};
use crate::error::{Result, io_error};
use crate::source::SourceStream;

pub(crate) const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Profile name (1-79 bytes), NUL, compression method.
const MAX_ICCP_PREFIX: u64 = 81;
/// Chunk lengths are limited to 2^31 - 1.
const MAX_CHUNK_LEN: u64 = 0x7FFF_FFFF;

/// PNG chunk walker.
///
/// The `iCCP` payload located here is the zlib stream, still compressed.
#[derive(Clone, Copy, Debug, Default)]
pub struct PngParser;

impl FileFormatParser for PngParser {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Png
    }

    fn sniff(&self, reader: &mut dyn Read) -> Result<bool> {
        sniff_exact(reader, &SIGNATURE)
    }

    fn locate_icc_profile(
        &self,
        stream: &mut dyn SourceStream,
    ) -> Result<Option<IccProfileLocation>> {
        let mut pos = stream
            .seek(SeekFrom::Start(SIGNATURE.len() as u64))
            .map_err(io_error)?;
        loop {
            let mut header = [0u8; 8];
            if !read_or_eof(stream, &mut header)? {
                return Ok(None);
            }
            let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as u64;
            let kind = &header[4..8];
            if len > MAX_CHUNK_LEN || kind == b"IDAT" || kind == b"IEND" {
                return Ok(None);
            }
            let data = pos + 8;

            if kind == b"iCCP" {
                let mut prefix = vec![0u8; len.min(MAX_ICCP_PREFIX) as usize];
                if !read_or_eof(stream, &mut prefix)? {
                    return Ok(None);
                }
                let name_len = match prefix.iter().position(|&b| b == 0) {
                    Some(n @ 1..=79) => n as u64,
                    _ => return Ok(None),
                };
                // NUL and compression method.
                let skip = name_len + 2;
                if skip > len {
                    return Ok(None);
                }
                let location = IccProfileLocation {
                    offset: data + skip,
                    len: len - skip,
                };
                return within_stream(stream, location);
            }
            // Data and CRC.
            pos = stream
                .seek(SeekFrom::Start(data + len + 4))
                .map_err(io_error)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut out = (data.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(data);
        out.extend_from_slice(&[0; 4]);
        out
    }

    fn with_chunks(chunks: &[Vec<u8>]) -> Vec<u8> {
        let mut out = SIGNATURE.to_vec();
        for c in chunks {
            out.extend_from_slice(c);
        }
        out
    }

    #[test]
    fn sniff() {
        assert!(PngParser.sniff(&mut Cursor::new(SIGNATURE)).unwrap());
        let mut bad = SIGNATURE;
        bad[1] = b'p';
        assert!(!PngParser.sniff(&mut Cursor::new(bad)).unwrap());
        assert!(!PngParser.sniff(&mut Cursor::new(&SIGNATURE[..7])).unwrap());
    }

    #[test]
    fn locates_iccp_payload() {
        let ihdr = chunk(b"IHDR", &[0; 13]);
        let mut iccp = b"sRGB profile\0\0".to_vec();
        iccp.extend_from_slice(b"zlib data");
        let data = with_chunks(&[ihdr.clone(), chunk(b"iCCP", &iccp), chunk(b"IEND", &[])]);
        let offset = (8 + ihdr.len() + 8 + 14) as u64;
        let mut s = Cursor::new(data);
        assert_eq!(
            PngParser.locate_icc_profile(&mut s).unwrap(),
            Some(IccProfileLocation { offset, len: 9 })
        );
        assert!(PngParser.seek_to_icc_profile(&mut s).unwrap());
        let mut got = [0u8; 9];
        s.read_exact(&mut got).unwrap();
        assert_eq!(&got, b"zlib data");
    }

    #[test]
    fn stops_at_image_data() {
        let data = with_chunks(&[
            chunk(b"IHDR", &[0; 13]),
            chunk(b"IDAT", &[1, 2, 3]),
            chunk(b"iCCP", b"late\0\0xx"),
        ]);
        assert!(!PngParser.seek_to_icc_profile(&mut Cursor::new(data)).unwrap());
    }

    #[test]
    fn malformed_iccp_is_not_found() {
        // Empty name.
        let data = with_chunks(&[chunk(b"iCCP", b"\0\0payload")]);
        assert!(!PngParser.seek_to_icc_profile(&mut Cursor::new(data)).unwrap());
        // Name without terminator.
        let data = with_chunks(&[chunk(b"iCCP", b"name")]);
        assert!(!PngParser.seek_to_icc_profile(&mut Cursor::new(data)).unwrap());
        // No compression byte.
        let data = with_chunks(&[chunk(b"iCCP", b"name\0")]);
        assert!(!PngParser.seek_to_icc_profile(&mut Cursor::new(data)).unwrap());
    }

    #[test]
    fn iccp_cut_short_is_not_found() {
        let mut iccp = b"name\0\0".to_vec();
        iccp.extend_from_slice(&[0x78; 200]);
        let mut data = with_chunks(&[chunk(b"IHDR", &[0; 13]), chunk(b"iCCP", &iccp)]);
        // Drop the CRC and the last ten payload bytes.
        data.truncate(data.len() - 14);
        assert_eq!(
            PngParser.locate_icc_profile(&mut Cursor::new(data)).unwrap(),
            None
        );
    }

    #[test]
    fn oversized_length_is_rejected() {
        let mut data = SIGNATURE.to_vec();
        data.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
        data.extend_from_slice(b"tEXt");
        assert!(!PngParser.seek_to_icc_profile(&mut Cursor::new(data)).unwrap());
    }

    #[test]
    fn real_png_without_profile() {
        let img = image::RgbImage::new(2, 2);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        let mut s = Cursor::new(out.into_inner());
        assert!(PngParser.sniff(&mut s).unwrap());
        assert!(!PngParser.seek_to_icc_profile(&mut s).unwrap());
    }
}
