//! Layer II frame iteration and CRC protection

// SPDX-FileCopyrightText: © 2023 Marcus Rowe <undisbeliever@gmail.com>
//
// SPDX-License-Identifier: MIT

use std::iter::FusedIterator;
use std::ops::Range;

use thiserror::Error;

use crate::allocation::{Allocation, AllocationLayout};
use crate::bitstream::{BitReader, BitstreamError};
use crate::crc::{header_crc, stored_crc, write_header_crc, CrcError};
use crate::header::{FrameHeader, HeaderError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error(transparent)]
    Header(#[from] HeaderError),

    #[error(transparent)]
    Crc(#[from] CrcError),

    #[error("cannot read bit allocation: {0}")]
    Bitstream(#[from] BitstreamError),

    #[error("frame is not CRC protected")]
    NotProtected,

    #[error("skipped {length} bytes of non-frame data at offset {offset}")]
    Junk { offset: usize, length: usize },

    #[error("truncated frame at offset {offset} ({available} of {length} bytes)")]
    Truncated {
        offset: usize,
        length: usize,
        available: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub offset: usize,
    /// Frame length in bytes (including the header and padding)
    pub length: usize,
    pub header: FrameHeader,
}

impl FrameInfo {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.length
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcStatus {
    Unprotected,
    Valid(u16),
    Mismatch { stored: u16, computed: u16 },
}

/// Iterates over the frames of a Layer II stream.
///
/// Data that is not part of a frame (ie, ID3 tags) is reported as a single
/// `FrameError::Junk` error and iteration resumes at the next frame header.
/// After junk, a header is only accepted if it is followed by another header
/// or ends exactly at the end of the data.
///
/// A truncated final frame ends the iteration.
pub struct Frames<'a> {
    data: &'a [u8],
    pos: usize,
}

pub fn frames(data: &[u8]) -> Frames<'_> {
    Frames { data, pos: 0 }
}

impl Frames<'_> {
    fn is_sync_point(&self, offset: usize) -> bool {
        match FrameHeader::parse(&self.data[offset..]) {
            Ok(header) => {
                let next = offset + header.frame_length();

                next == self.data.len()
                    || self
                        .data
                        .get(next..)
                        .is_some_and(|d| FrameHeader::parse(d).is_ok())
            }
            Err(_) => false,
        }
    }

    fn next_header_offset(&self, start: usize) -> usize {
        (start..self.data.len())
            .find(|&i| self.is_sync_point(i))
            .unwrap_or(self.data.len())
    }
}

impl Iterator for Frames<'_> {
    type Item = Result<FrameInfo, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.pos;
        let remaining = self.data.get(offset..).filter(|d| !d.is_empty())?;

        match FrameHeader::parse(remaining) {
            Ok(header) => {
                let length = header.frame_length();

                if length <= remaining.len() {
                    self.pos += length;
                    Some(Ok(FrameInfo {
                        offset,
                        length,
                        header,
                    }))
                } else {
                    self.pos = self.data.len();
                    Some(Err(FrameError::Truncated {
                        offset,
                        length,
                        available: remaining.len(),
                    }))
                }
            }
            Err(_) => {
                let next = self.next_header_offset(offset + 1);
                let length = next - offset;

                log::debug!("skipping {length} bytes at offset {offset}");

                self.pos = next;
                Some(Err(FrameError::Junk { offset, length }))
            }
        }
    }
}

impl FusedIterator for Frames<'_> {}

fn read_allocation(frame: &[u8]) -> Result<(FrameHeader, usize), FrameError> {
    let header = FrameHeader::parse(frame)?;
    let layout = AllocationLayout::for_header(&header);

    let mut reader = BitReader::with_offset(frame, header.side_info_offset());
    let allocation = Allocation::read_from(&mut reader, &layout)?;

    Ok((header, allocation.protected_bit_count(&layout)))
}

/// Returns the number of bits after the CRC word that are protected by the CRC.
pub fn protected_bit_count(frame: &[u8]) -> Result<usize, FrameError> {
    read_allocation(frame).map(|(_, bit_count)| bit_count)
}

/// Calculates and writes the CRC of a protected frame.
///
/// The frame is unchanged if an error is returned.
pub fn protect_frame(frame: &mut [u8]) -> Result<u16, FrameError> {
    let (header, bit_count) = read_allocation(frame)?;
    if !header.protected {
        return Err(FrameError::NotProtected);
    }

    let crc = write_header_crc(frame, bit_count)?;

    log::trace!("wrote CRC {crc:#06x} ({bit_count} protected bits)");

    Ok(crc)
}

pub fn verify_frame(frame: &[u8]) -> Result<CrcStatus, FrameError> {
    let header = FrameHeader::parse(frame)?;
    if !header.protected {
        return Ok(CrcStatus::Unprotected);
    }

    let bit_count = protected_bit_count(frame)?;
    let computed = header_crc(frame, bit_count)?;
    let stored = stored_crc(frame)?;

    match computed == stored {
        true => Ok(CrcStatus::Valid(computed)),
        false => Ok(CrcStatus::Mismatch { stored, computed }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::BitWriter;
    use crate::header::Mode;
    use crate::{CRC_LEN, PROTECTED_DATA_OFFSET};

    // 48000 Hz, 32 kbps, mono.  96 bytes, allocation table C
    const FRAME_LEN: usize = 96;

    fn test_header(protected: bool) -> FrameHeader {
        FrameHeader {
            protected,
            ..FrameHeader::new(48000, 32, Mode::Mono).unwrap()
        }
    }

    fn test_allocation() -> Allocation {
        let mut a = Allocation::default();
        a.bit_alloc[0][0] = 9;
        a.bit_alloc[0][3] = 2;
        a.scfsi[0][0] = 0b10;
        a.scfsi[0][3] = 0b01;
        a
    }

    fn build_frame(header: FrameHeader, allocation: &Allocation) -> Vec<u8> {
        let mut prefix = header.to_bytes().to_vec();
        if header.protected {
            prefix.extend([0; CRC_LEN]);
        }

        let mut w = BitWriter::with_bytes(prefix);
        allocation.write_to(&mut w, &AllocationLayout::for_header(&header));

        let mut frame = w.into_bytes();
        // Sample data
        frame.resize(header.frame_length(), 0x5a);
        frame
    }

    fn protected_frame() -> Vec<u8> {
        build_frame(test_header(true), &test_allocation())
    }

    #[test]
    fn test_protected_bit_count() {
        let frame = protected_frame();
        assert_eq!(frame.len(), FRAME_LEN);

        // table C: 2 * 4 + 6 * 3 allocation bits, two scfsi fields
        assert_eq!(protected_bit_count(&frame), Ok(26 + 4));

        let unprotected = build_frame(test_header(false), &test_allocation());
        assert_eq!(protected_bit_count(&unprotected), Ok(26 + 4));
    }

    #[test]
    fn test_protect_then_verify() {
        let mut frame = protected_frame();
        let original = frame.clone();

        let crc = protect_frame(&mut frame).unwrap();

        assert_eq!(frame[4..6], crc.to_be_bytes());
        assert_eq!(frame[..4], original[..4]);
        assert_eq!(frame[6..], original[6..]);

        assert_eq!(verify_frame(&frame), Ok(CrcStatus::Valid(crc)));
        assert_eq!(protect_frame(&mut frame), Ok(crc));
    }

    #[test]
    fn test_verify_detects_corrupt_allocation() {
        let mut frame = protected_frame();
        let crc = protect_frame(&mut frame).unwrap();

        // first allocation field
        frame[PROTECTED_DATA_OFFSET] ^= 0x10;

        match verify_frame(&frame) {
            Ok(CrcStatus::Mismatch { stored, computed }) => {
                assert_eq!(stored, crc);
                assert_ne!(computed, crc);
            }
            r => panic!("unexpected result: {r:?}"),
        }
    }

    #[test]
    fn test_sample_data_is_not_protected() {
        let mut frame = protected_frame();
        let crc = protect_frame(&mut frame).unwrap();

        // 6 bytes + 30 protected bits
        frame[PROTECTED_DATA_OFFSET + 3] ^= 0b0000_0011;
        frame[FRAME_LEN - 1] ^= 0xff;

        assert_eq!(verify_frame(&frame), Ok(CrcStatus::Valid(crc)));
    }

    #[test]
    fn test_unprotected_frame() {
        let mut frame = build_frame(test_header(false), &test_allocation());
        let original = frame.clone();

        assert_eq!(verify_frame(&frame), Ok(CrcStatus::Unprotected));
        assert_eq!(protect_frame(&mut frame), Err(FrameError::NotProtected));
        assert_eq!(frame, original);
    }

    #[test]
    fn test_protect_short_frame() {
        let mut frame = protected_frame();
        frame.truncate(7);
        let original = frame.clone();

        assert!(matches!(
            protect_frame(&mut frame),
            Err(FrameError::Bitstream(_))
        ));
        assert_eq!(frame, original);

        assert!(matches!(
            protect_frame(&mut [0xffu8, 0xfc]),
            Err(FrameError::Header(HeaderError::TooShort(2)))
        ));
    }

    #[test]
    fn test_frames() {
        let frame = protected_frame();
        let parts: [&[u8]; 3] = [&frame, &frame, &frame];
        let data = parts.concat();

        let infos: Vec<_> = frames(&data).collect::<Result<_, _>>().unwrap();

        assert_eq!(infos.len(), 3);
        for (i, info) in infos.iter().enumerate() {
            assert_eq!(info.offset, i * FRAME_LEN);
            assert_eq!(info.length, FRAME_LEN);
            assert_eq!(info.header, test_header(true));
            assert_eq!(info.range(), i * FRAME_LEN..(i + 1) * FRAME_LEN);
        }
    }

    #[test]
    fn test_frames_skips_junk() {
        let frame = protected_frame();
        let parts: [&[u8]; 5] = [
            b"ID3\x04\x00junk",
            &frame,
            &frame,
            &[0xff, 0x00, 0x00],
            &frame,
        ];
        let data = parts.concat();

        let mut it = frames(&data);
        assert_eq!(
            it.next(),
            Some(Err(FrameError::Junk {
                offset: 0,
                length: 9
            }))
        );
        assert_eq!(it.next().unwrap().unwrap().offset, 9);
        assert_eq!(it.next().unwrap().unwrap().offset, 9 + FRAME_LEN);
        assert_eq!(
            it.next(),
            Some(Err(FrameError::Junk {
                offset: 9 + 2 * FRAME_LEN,
                length: 3
            }))
        );
        assert_eq!(it.next().unwrap().unwrap().offset, 12 + 2 * FRAME_LEN);
        assert_eq!(it.next(), None);
        assert_eq!(it.next(), None);
    }

    #[test]
    fn test_frames_ignores_false_sync_in_junk() {
        let frame = protected_frame();
        // A valid 48000 Hz, 192 kbps header inside the tag
        let parts: [&[u8]; 5] = [
            b"ID3\x03",
            &[0xff, 0xfd, 0xa4, 0xc4],
            b"\x00\x00",
            &frame,
            &frame,
        ];
        let data = parts.concat();

        let r: Vec<_> = frames(&data).collect();
        assert_eq!(r.len(), 3);
        assert_eq!(
            r[0],
            Err(FrameError::Junk {
                offset: 0,
                length: 10
            })
        );
        assert_eq!(r[1].as_ref().map(|f| f.offset), Ok(10));
        assert_eq!(r[2].as_ref().map(|f| f.offset), Ok(10 + FRAME_LEN));
    }

    #[test]
    fn test_frames_unconfirmed_header_after_junk() {
        let frame = protected_frame();
        // The header is not followed by another header and does not end at the end of the data
        let parts: [&[u8]; 3] = [b"junk", &frame, &[0x00]];
        let data = parts.concat();

        let r: Vec<_> = frames(&data).collect();
        assert_eq!(
            r,
            [Err(FrameError::Junk {
                offset: 0,
                length: 5 + FRAME_LEN
            })]
        );
    }

    #[test]
    fn test_frames_truncated() {
        let frame = protected_frame();
        let parts: [&[u8]; 2] = [&frame, &frame[..50]];
        let data = parts.concat();

        let mut it = frames(&data);
        assert!(it.next().unwrap().is_ok());
        assert_eq!(
            it.next(),
            Some(Err(FrameError::Truncated {
                offset: FRAME_LEN,
                length: FRAME_LEN,
                available: 50
            }))
        );
        assert_eq!(it.next(), None);
    }

    #[test]
    fn test_frames_no_frames() {
        assert_eq!(frames(&[]).next(), None);

        let data = [0u8; 20];
        let r: Vec<_> = frames(&data).collect();
        assert_eq!(
            r,
            [Err(FrameError::Junk {
                offset: 0,
                length: 20
            })]
        );
    }
}
