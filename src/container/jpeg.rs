//! JPEG marker walk to the first `ICC_PROFILE` APP2 segment.

use std::io::{Read, Seek, SeekFrom};

use super::{
    ContainerKind, FileFormatParser, IccProfileLocation, read_or_eof, sniff_exact, within_stream,
};
use crate::error::{Result, io_error};
use crate::source::SourceStream;

const SIGNATURE: [u8; 3] = [0xFF, 0xD8, 0xFF];

const APP2: u8 = 0xE2;
const SOS: u8 = 0xDA;
const EOI: u8 = 0xD9;

/// `ICC_PROFILE\0`, then sequence number and chunk count.
const ICC_TAG: &[u8; 12] = b"ICC_PROFILE\0";
const ICC_HEADER_LEN: u64 = 14;

/// JPEG/JFIF marker walker.
///
/// Only the first `ICC_PROFILE` chunk (sequence number 1) is located.
/// Profiles split across several APP2 segments continue in the following
/// segments.
#[derive(Clone, Copy, Debug, Default)]
pub struct JpegParser;

impl FileFormatParser for JpegParser {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Jpeg
    }

    fn sniff(&self, reader: &mut dyn Read) -> Result<bool> {
        sniff_exact(reader, &SIGNATURE)
    }

    fn locate_icc_profile(
        &self,
        stream: &mut dyn SourceStream,
    ) -> Result<Option<IccProfileLocation>> {
        let mut pos = stream.seek(SeekFrom::Start(2)).map_err(io_error)?;
        loop {
            let mut marker = [0u8; 2];
            if !read_or_eof(stream, &mut marker)? || marker[0] != 0xFF {
                return Ok(None);
            }
            pos += 2;
            let code = marker[1];
            match code {
                SOS | EOI => return Ok(None),
                // Fill byte before the real marker.
                0xFF => {
                    stream.seek(SeekFrom::Current(-1)).map_err(io_error)?;
                    pos -= 1;
                    continue;
                }
                // Standalone markers carry no length.
                0x01 | 0xD0..=0xD7 => continue,
                _ => {}
            }

            let mut len = [0u8; 2];
            if !read_or_eof(stream, &mut len)? {
                return Ok(None);
            }
            let len = u16::from_be_bytes(len) as u64;
            if len < 2 {
                return Ok(None);
            }
            let payload = pos + 2;
            let payload_len = len - 2;

            if code == APP2 && payload_len >= ICC_HEADER_LEN {
                let mut header = [0u8; ICC_HEADER_LEN as usize];
                if !read_or_eof(stream, &mut header)? {
                    return Ok(None);
                }
                if header[..12] == ICC_TAG[..] && header[12] == 1 {
                    let location = IccProfileLocation {
                        offset: payload + ICC_HEADER_LEN,
                        len: payload_len - ICC_HEADER_LEN,
                    };
                    return within_stream(stream, location);
                }
            }
            pos = stream
                .seek(SeekFrom::Start(payload + payload_len))
                .map_err(io_error)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn segment(marker: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0xFF, marker];
        out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn icc_segment(seq: u8, profile: &[u8]) -> Vec<u8> {
        let mut payload = ICC_TAG.to_vec();
        payload.extend_from_slice(&[seq, 1]);
        payload.extend_from_slice(profile);
        segment(APP2, &payload)
    }

    /// SOI, APP0 (JFIF), APP2 (ICC), DQT, SOS, EOI.
    fn crafted(profile: &[u8]) -> (Vec<u8>, u64) {
        let mut out = vec![0xFF, 0xD8];
        out.extend(segment(0xE0, b"JFIF\0\x01\x02\x00\x00\x01\x00\x01\x00\x00"));
        let offset = out.len() as u64 + 4 + ICC_HEADER_LEN;
        out.extend(icc_segment(1, profile));
        out.extend(segment(0xDB, &[0u8; 65]));
        out.extend(segment(SOS, &[1, 1, 0, 0, 63, 0]));
        out.extend_from_slice(&[0x12, 0x34, 0xFF, EOI]);
        (out, offset)
    }

    #[test]
    fn sniff_requires_exact_signature() {
        assert!(JpegParser.sniff(&mut Cursor::new([0xFF, 0xD8, 0xFF, 0xE0])).unwrap());
        for i in 0..3 {
            let mut bytes = SIGNATURE;
            bytes[i] ^= 0x01;
            assert!(!JpegParser.sniff(&mut Cursor::new(bytes)).unwrap(), "byte {i}");
        }
        assert!(!JpegParser.sniff(&mut Cursor::new([0xFF, 0xD8])).unwrap());
    }

    #[test]
    fn sniff_consumes_signature() {
        let mut c = Cursor::new([0xFF, 0xD8, 0xFF, 0xE0]);
        JpegParser.sniff(&mut c).unwrap();
        assert_eq!(c.position(), 3);
    }

    #[test]
    fn positions_at_payload() {
        let profile = b"fake icc profile bytes";
        let (data, offset) = crafted(profile);
        let mut s = Cursor::new(data);
        assert_eq!(
            JpegParser.locate_icc_profile(&mut s).unwrap(),
            Some(IccProfileLocation {
                offset,
                len: profile.len() as u64
            })
        );
        assert!(JpegParser.seek_to_icc_profile(&mut s).unwrap());
        assert_eq!(s.position(), offset);
        let mut got = vec![0u8; profile.len()];
        s.read_exact(&mut got).unwrap();
        assert_eq!(&got, profile);
    }

    #[test]
    fn altered_tag_byte_fails() {
        let (data, offset) = crafted(b"profile");
        let tag_start = (offset - ICC_HEADER_LEN) as usize;
        for i in 0..12 {
            let mut bad = data.clone();
            bad[tag_start + i] ^= 0x20;
            assert!(
                !JpegParser.seek_to_icc_profile(&mut Cursor::new(bad)).unwrap(),
                "tag byte {i}"
            );
        }
    }

    #[test]
    fn later_chunks_are_not_the_start() {
        let mut data = vec![0xFF, 0xD8];
        data.extend(icc_segment(2, b"second half"));
        data.extend_from_slice(&[0xFF, EOI]);
        assert_eq!(
            JpegParser.locate_icc_profile(&mut Cursor::new(data)).unwrap(),
            None
        );
    }

    #[test]
    fn length_below_two_fails_without_looping() {
        for len in [0u8, 1] {
            let data = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, len, 0xFF, 0xD9];
            assert!(!JpegParser.seek_to_icc_profile(&mut Cursor::new(data)).unwrap());
        }
    }

    #[test]
    fn stops_at_sos_and_eoi() {
        let mut data = vec![0xFF, 0xD8];
        data.extend(segment(SOS, &[0; 6]));
        data.extend(icc_segment(1, b"after scan"));
        assert!(!JpegParser.seek_to_icc_profile(&mut Cursor::new(data)).unwrap());

        let data = vec![0xFF, 0xD8, 0xFF, EOI];
        assert!(!JpegParser.seek_to_icc_profile(&mut Cursor::new(data)).unwrap());
    }

    #[test]
    fn truncated_segment_is_not_found() {
        let (mut data, offset) = crafted(b"profile");
        data.truncate(offset as usize - 3);
        assert!(!JpegParser.seek_to_icc_profile(&mut Cursor::new(data)).unwrap());
    }

    #[test]
    fn profile_cut_short_is_not_found() {
        let profile = b"profile bytes";
        let (data, offset) = crafted(profile);
        let end = offset as usize + profile.len();
        // Header intact, payload one byte short.
        let short = data[..end - 1].to_vec();
        assert_eq!(
            JpegParser.locate_icc_profile(&mut Cursor::new(short)).unwrap(),
            None
        );
        // Payload complete with nothing after it.
        let exact = data[..end].to_vec();
        assert!(JpegParser.seek_to_icc_profile(&mut Cursor::new(exact)).unwrap());
    }

    #[test]
    fn fill_bytes_and_standalone_markers() {
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xFF, 0xFF, 0xD0];
        let offset = data.len() as u64 + 4 + ICC_HEADER_LEN;
        data.extend(icc_segment(1, b"xyz"));
        assert_eq!(
            JpegParser.locate_icc_profile(&mut Cursor::new(data)).unwrap(),
            Some(IccProfileLocation { offset, len: 3 })
        );
    }
}
