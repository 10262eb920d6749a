//! WebP (RIFF) chunk walk to the `ICCP` chunk of the extended format.

use std::io::{Read, Seek, SeekFrom};

use super::{ContainerKind, FileFormatParser, IccProfileLocation, read_or_eof, within_stream};
use crate::error::{Result, io_error};
use crate::source::SourceStream;

const RIFF_HEADER_LEN: u64 = 12;

/// WebP (RIFF) chunk walker.
///
/// `ICCP` only appears in the extended format, ahead of the image data, so
/// the walk ends at the first `VP8 ` or `VP8L` chunk.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebpParser;

impl FileFormatParser for WebpParser {
    fn kind(&self) -> ContainerKind {
        ContainerKind::WebP
    }

    /// `RIFF`, any 4-byte size, `WEBP`.
    fn sniff(&self, reader: &mut dyn Read) -> Result<bool> {
        let mut header = [0u8; RIFF_HEADER_LEN as usize];
        Ok(read_or_eof(reader, &mut header)?
            && header[..4] == *b"RIFF"
            && header[8..12] == *b"WEBP")
    }

    fn locate_icc_profile(
        &self,
        stream: &mut dyn SourceStream,
    ) -> Result<Option<IccProfileLocation>> {
        let mut pos = stream
            .seek(SeekFrom::Start(RIFF_HEADER_LEN))
            .map_err(io_error)?;
        loop {
            let mut header = [0u8; 8];
            if !read_or_eof(stream, &mut header)? {
                return Ok(None);
            }
            let fourcc = &header[..4];
            let size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as u64;
            let data = pos + 8;
            match fourcc {
                b"ICCP" => {
                    let location = IccProfileLocation {
                        offset: data,
                        len: size,
                    };
                    return within_stream(stream, location);
                }
                b"VP8 " | b"VP8L" => return Ok(None),
                _ => {}
            }
            // Odd sizes carry one pad byte.
            pos = stream
                .seek(SeekFrom::Start(data + size + (size & 1)))
                .map_err(io_error)?;
        }
    }
}
