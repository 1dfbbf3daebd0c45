//! MPEG audio frame header

// SPDX-FileCopyrightText: © 2023 Marcus Rowe <undisbeliever@gmail.com>
//
// SPDX-License-Identifier: MIT

use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;

use crate::{CRC_LEN, HEADER_LEN, SAMPLES_PER_FRAME};

const N_BITRATES: usize = 15;

// Layer II bitrates in kbps.  Index 0 is the free format bitrate.
const MPEG1_BITRATES: [u16; N_BITRATES] = [
    0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384,
];
const MPEG2_BITRATES: [u16; N_BITRATES] = [
    0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160,
];

const MPEG1_SAMPLE_RATES: [u32; 3] = [44100, 48000, 32000];
const MPEG2_SAMPLE_RATES: [u32; 3] = [22050, 24000, 16000];

const BITRATE_INDEX_BAD: u8 = 15;
const SAMPLERATE_INDEX_RESERVED: u8 = 3;

const LAYER_II_BITS: u8 = 0b10;

// 0b1111_1111 0b111v_vlly 0brrrr_hhpx 0bmmmm_coee
//   vv   = version, ll = layer      , y = protection bit (0 = CRC present)
//   rrrr = bitrate, hh = sample rate, p = padding , x  = private bit
//   mmmm = mode and mode extension, c = copyright, o = original, ee = emphasis
const SYNC_BYTE: u8 = 0xff;
const SYNC_MASK: u8 = 0xe0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("frame header is too short ({0} bytes)")]
    TooShort(usize),
    #[error("no frame sync word")]
    NoSync,
    #[error("MPEG-2.5 is not supported")]
    Mpeg25NotSupported,
    #[error("reserved MPEG version")]
    ReservedVersion,
    #[error("not a Layer II frame")]
    NotLayer2,
    #[error("free format bitrate is not supported")]
    FreeFormat,
    #[error("invalid bitrate index {0}")]
    InvalidBitrateIndex(u8),
    #[error("invalid sample rate index {0}")]
    InvalidSampleRateIndex(u8),
    #[error("reserved emphasis value")]
    ReservedEmphasis,
    #[error("{0} kbps is not a legal bitrate for {1}")]
    InvalidBitrate(u16, MpegVersion),
    #[error("{0} Hz is not a legal sample rate")]
    InvalidSampleRate(u32),
    #[error("{1} kbps is not allowed in {0} mode")]
    InvalidBitrateForMode(Mode, u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MpegVersion {
    Mpeg1,
    /// MPEG-2 low sampling frequencies
    Mpeg2,
}

impl MpegVersion {
    pub fn for_sample_rate(sample_rate: u32) -> Result<Self, HeaderError> {
        match sample_rate {
            48000 | 44100 | 32000 => Ok(Self::Mpeg1),
            24000 | 22050 | 16000 => Ok(Self::Mpeg2),
            _ => Err(HeaderError::InvalidSampleRate(sample_rate)),
        }
    }

    fn bitrates(self) -> &'static [u16; N_BITRATES] {
        match self {
            Self::Mpeg1 => &MPEG1_BITRATES,
            Self::Mpeg2 => &MPEG2_BITRATES,
        }
    }

    fn sample_rates(self) -> &'static [u32; 3] {
        match self {
            Self::Mpeg1 => &MPEG1_SAMPLE_RATES,
            Self::Mpeg2 => &MPEG2_SAMPLE_RATES,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Mpeg1 => "MPEG-1",
            Self::Mpeg2 => "MPEG-2 LSF",
        }
    }
}

impl Display for MpegVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Stereo = 0,
    JointStereo = 1,
    DualChannel = 2,
    Mono = 3,
}

impl Mode {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::Stereo,
            1 => Self::JointStereo,
            2 => Self::DualChannel,
            _ => Self::Mono,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Stereo => "Stereo",
            Self::JointStereo => "Joint Stereo",
            Self::DualChannel => "Dual Channel",
            Self::Mono => "Mono",
        }
    }
}

impl FromStr for Mode {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "s" => Ok(Self::Stereo),
            "j" => Ok(Self::JointStereo),
            "d" => Ok(Self::DualChannel),
            "m" => Ok(Self::Mono),
            _ => Err("Invalid mode (expected s, j, d or m)"),
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Emphasis {
    None = 0,
    /// 50/15 microseconds
    Fifty15 = 1,
    CcittJ17 = 3,
}

impl Emphasis {
    fn from_bits(bits: u8) -> Result<Self, HeaderError> {
        match bits & 0b11 {
            0 => Ok(Self::None),
            1 => Ok(Self::Fifty15),
            3 => Ok(Self::CcittJ17),
            _ => Err(HeaderError::ReservedEmphasis),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Fifty15 => "50/15 us",
            Self::CcittJ17 => "CCITT J.17",
        }
    }
}

impl FromStr for Emphasis {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "n" => Ok(Self::None),
            "5" => Ok(Self::Fifty15),
            "c" => Ok(Self::CcittJ17),
            _ => Err("Invalid emphasis (expected n, 5 or c)"),
        }
    }
}

/// Returns the bitrate index of a Layer II bitrate (in kbps).
pub fn bitrate_index(bitrate_kbps: u16, version: MpegVersion) -> Result<u8, HeaderError> {
    let bitrates = version.bitrates();

    (1..BITRATE_INDEX_BAD)
        .find(|&i| bitrates[usize::from(i)] == bitrate_kbps)
        .ok_or(HeaderError::InvalidBitrate(bitrate_kbps, version))
}

/// Returns the sample rate index of a sample rate (in Hz).
///
/// The index is the same for a MPEG-1 sample rate and its half rate MPEG-2 counterpart.
pub fn samplerate_index(sample_rate: u32) -> Result<u8, HeaderError> {
    match sample_rate {
        44100 | 22050 => Ok(0),
        48000 | 24000 => Ok(1),
        32000 | 16000 => Ok(2),
        _ => Err(HeaderError::InvalidSampleRate(sample_rate)),
    }
}

/// A Layer II frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHeader {
    pub version: MpegVersion,
    pub bitrate_index: u8,
    pub samplerate_index: u8,
    /// A CRC follows the header
    pub protected: bool,
    pub padding: bool,
    pub private_bit: bool,
    pub mode: Mode,
    /// Joint stereo bound (only used in `Mode::JointStereo`)
    pub mode_extension: u8,
    pub copyright: bool,
    pub original: bool,
    pub emphasis: Emphasis,
}

impl FrameHeader {
    /// Creates an unprotected header with no padding, copyright, original or emphasis flags.
    pub fn new(sample_rate: u32, bitrate_kbps: u16, mode: Mode) -> Result<Self, HeaderError> {
        let version = MpegVersion::for_sample_rate(sample_rate)?;

        let header = Self {
            version,
            bitrate_index: bitrate_index(bitrate_kbps, version)?,
            samplerate_index: samplerate_index(sample_rate)?,
            protected: false,
            padding: false,
            private_bit: false,
            mode,
            mode_extension: 0,
            copyright: false,
            original: false,
            emphasis: Emphasis::None,
        };
        header.validate()?;

        Ok(header)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, HeaderError> {
        let b = match bytes.get(..HEADER_LEN) {
            Some(&[b0, b1, b2, b3]) => [b0, b1, b2, b3],
            _ => return Err(HeaderError::TooShort(bytes.len())),
        };

        if b[0] != SYNC_BYTE || b[1] & SYNC_MASK != SYNC_MASK {
            return Err(HeaderError::NoSync);
        }

        let version = match (b[1] >> 3) & 0b11 {
            0b11 => MpegVersion::Mpeg1,
            0b10 => MpegVersion::Mpeg2,
            0b00 => return Err(HeaderError::Mpeg25NotSupported),
            _ => return Err(HeaderError::ReservedVersion),
        };

        if (b[1] >> 1) & 0b11 != LAYER_II_BITS {
            return Err(HeaderError::NotLayer2);
        }

        let bitrate_index = b[2] >> 4;
        match bitrate_index {
            0 => return Err(HeaderError::FreeFormat),
            BITRATE_INDEX_BAD => return Err(HeaderError::InvalidBitrateIndex(bitrate_index)),
            _ => (),
        }

        let samplerate_index = (b[2] >> 2) & 0b11;
        if samplerate_index == SAMPLERATE_INDEX_RESERVED {
            return Err(HeaderError::InvalidSampleRateIndex(samplerate_index));
        }

        let header = Self {
            version,
            bitrate_index,
            samplerate_index,
            protected: b[1] & 0x01 == 0,
            padding: b[2] & 0x02 != 0,
            private_bit: b[2] & 0x01 != 0,
            mode: Mode::from_bits(b[3] >> 6),
            mode_extension: (b[3] >> 4) & 0b11,
            copyright: b[3] & 0x08 != 0,
            original: b[3] & 0x04 != 0,
            emphasis: Emphasis::from_bits(b[3])?,
        };
        header.validate()?;

        Ok(header)
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let version_bits = match self.version {
            MpegVersion::Mpeg1 => 0b11,
            MpegVersion::Mpeg2 => 0b10,
        };

        let b1 = SYNC_MASK | (version_bits << 3) | (LAYER_II_BITS << 1) | u8::from(!self.protected);

        let b2 = ((self.bitrate_index & 0xf) << 4)
            | ((self.samplerate_index & 0b11) << 2)
            | (u8::from(self.padding) << 1)
            | u8::from(self.private_bit);

        let b3 = ((self.mode as u8) << 6)
            | ((self.mode_extension & 0b11) << 4)
            | (u8::from(self.copyright) << 3)
            | (u8::from(self.original) << 2)
            | (self.emphasis as u8);

        [SYNC_BYTE, b1, b2, b3]
    }

    // Some Layer II bitrate and mode combinations are not allowed in MPEG-1
    fn validate(&self) -> Result<(), HeaderError> {
        if self.version == MpegVersion::Mpeg1 {
            let bitrate = self.bitrate_kbps();

            let invalid = match self.mode {
                Mode::Mono => matches!(bitrate, 224 | 256 | 320 | 384),
                _ => matches!(bitrate, 32 | 48 | 56 | 80),
            };
            if invalid {
                return Err(HeaderError::InvalidBitrateForMode(self.mode, bitrate));
            }
        }
        Ok(())
    }

    pub fn bitrate_kbps(&self) -> u16 {
        self.version
            .bitrates()
            .get(usize::from(self.bitrate_index))
            .copied()
            .unwrap_or(0)
    }

    pub fn sample_rate(&self) -> u32 {
        self.version
            .sample_rates()
            .get(usize::from(self.samplerate_index))
            .copied()
            .unwrap_or(0)
    }

    pub fn channels(&self) -> usize {
        match self.mode {
            Mode::Mono => 1,
            _ => 2,
        }
    }

    /// Frame length in bytes, including the header.
    pub fn frame_length(&self) -> usize {
        // bytes per frame = samples / 8 * bitrate / sample_rate
        const BYTES_PER_KBPS: u32 = SAMPLES_PER_FRAME as u32 / 8 * 1000;

        let sample_rate = self.sample_rate();
        if sample_rate == 0 {
            return 0;
        }

        let bytes = BYTES_PER_KBPS * u32::from(self.bitrate_kbps()) / sample_rate;

        usize::try_from(bytes).unwrap_or(usize::MAX) + usize::from(self.padding)
    }

    /// Offset of the bit allocation fields
    pub fn side_info_offset(&self) -> usize {
        match self.protected {
            true => HEADER_LEN + CRC_LEN,
            false => HEADER_LEN,
        }
    }
}
