//! Layer II bit allocation fields
//!
//! The bit allocation and scale-factor selection (scfsi) fields directly follow the
//! CRC word and are the payload protected by the CRC.  Their size depends on the
//! allocation table, the number of channels, the joint stereo bound and the
//! allocation values themselves.

// SPDX-FileCopyrightText: © 2023 Marcus Rowe <undisbeliever@gmail.com>
//
// SPDX-License-Identifier: MIT

use crate::bitstream::{BitReader, BitWriter, BitstreamError};
use crate::header::{FrameHeader, Mode, MpegVersion};
use crate::SBLIMIT;

const SCFSI_BITS: u32 = 2;

const MAX_CHANNELS: usize = 2;

/// Bit allocation tables (ISO/IEC 11172-3 Table B.2a-d and ISO/IEC 13818-3 Table B.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocationTable {
    A,
    B,
    C,
    D,
    /// MPEG-2 low sampling frequencies
    Lsf,
}

impl AllocationTable {
    pub fn select(
        version: MpegVersion,
        sample_rate: u32,
        bitrate_kbps: u16,
        channels: usize,
    ) -> Self {
        if version == MpegVersion::Mpeg2 {
            return Self::Lsf;
        }

        let per_channel = usize::from(bitrate_kbps) / channels.max(1);

        if (sample_rate == 48000 && per_channel >= 56) || (56..=80).contains(&per_channel) {
            Self::A
        } else if sample_rate != 48000 && per_channel >= 96 {
            Self::B
        } else if sample_rate != 32000 && per_channel <= 48 {
            Self::C
        } else {
            Self::D
        }
    }

    /// Number of subbands with an allocation field
    pub const fn sblimit(self) -> usize {
        match self {
            Self::A => 27,
            Self::B => 30,
            Self::C => 8,
            Self::D => 12,
            Self::Lsf => 30,
        }
    }

    /// Size of the allocation field of subband `sb`
    pub fn nbal(self, sb: usize) -> u32 {
        match self {
            Self::A | Self::B => match sb {
                0..=10 => 4,
                11..=22 => 3,
                _ => 2,
            },
            Self::C | Self::D => match sb {
                0..=1 => 4,
                _ => 3,
            },
            Self::Lsf => match sb {
                0..=3 => 4,
                4..=10 => 3,
                _ => 2,
            },
        }
    }
}

/// Describes the allocation fields of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationLayout {
    table: AllocationTable,
    channels: usize,
    jsbound: usize,
}

impl AllocationLayout {
    /// `channels` is clamped to 1 or 2 and `jsbound` is clamped to the table's sblimit.
    pub fn new(table: AllocationTable, channels: usize, jsbound: usize) -> Self {
        Self {
            table,
            channels: channels.clamp(1, MAX_CHANNELS),
            jsbound: jsbound.min(table.sblimit()),
        }
    }

    pub fn for_header(header: &FrameHeader) -> Self {
        let table = AllocationTable::select(
            header.version,
            header.sample_rate(),
            header.bitrate_kbps(),
            header.channels(),
        );

        let jsbound = match header.mode {
            Mode::JointStereo => (usize::from(header.mode_extension & 0b11) + 1) * 4,
            _ => table.sblimit(),
        };

        Self::new(table, header.channels(), jsbound)
    }

    pub fn table(&self) -> AllocationTable {
        self.table
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// First subband where the channels share an allocation field.
    pub fn jsbound(&self) -> usize {
        self.jsbound
    }

    pub fn sblimit(&self) -> usize {
        self.table.sblimit()
    }

    fn coded_channels(&self, sb: usize) -> usize {
        match sb < self.jsbound {
            true => self.channels,
            false => 1,
        }
    }
}

/// The bit allocation and scfsi values of a frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Allocation {
    /// Allocation index (per channel, per subband)
    pub bit_alloc: [[u8; SBLIMIT]; MAX_CHANNELS],

    /// Scale-factor selection information (per channel, per subband)
    pub scfsi: [[u8; SBLIMIT]; MAX_CHANNELS],
}

impl Allocation {
    // The allocation value as it is written to the bitstream.
    // At and above the joint stereo bound both channels use the first channel's allocation.
    fn allocation(&self, layout: &AllocationLayout, ch: usize, sb: usize) -> u8 {
        let ch = match sb < layout.jsbound {
            true => ch,
            false => 0,
        };
        let mask = (1 << layout.table.nbal(sb)) - 1;

        self.bit_alloc[ch][sb] & mask
    }

    pub fn read_from(
        reader: &mut BitReader,
        layout: &AllocationLayout,
    ) -> Result<Self, BitstreamError> {
        let mut out = Self::default();

        for sb in 0..layout.sblimit() {
            let nbal = layout.table.nbal(sb);

            for ch in 0..layout.coded_channels(sb) {
                // nbal is at most 4 bits
                out.bit_alloc[ch][sb] = reader.read_bits(nbal)? as u8;
            }
            if sb >= layout.jsbound {
                out.bit_alloc[1][sb] = out.bit_alloc[0][sb];
            }
        }

        for sb in 0..layout.sblimit() {
            for ch in 0..layout.channels {
                if out.bit_alloc[ch][sb] != 0 {
                    out.scfsi[ch][sb] = reader.read_bits(SCFSI_BITS)? as u8;
                }
            }
        }

        Ok(out)
    }

    /// Writes the allocation and scfsi fields.
    ///
    /// Allocation values are truncated to the field size.
    /// A value that truncates to 0 has no scfsi field.
    pub fn write_to(&self, writer: &mut BitWriter, layout: &AllocationLayout) {
        for sb in 0..layout.sblimit() {
            let nbal = layout.table.nbal(sb);

            for ch in 0..layout.coded_channels(sb) {
                writer.put_bits(u32::from(self.allocation(layout, ch, sb)), nbal);
            }
        }

        for sb in 0..layout.sblimit() {
            for ch in 0..layout.channels {
                if self.allocation(layout, ch, sb) != 0 {
                    writer.put_bits(u32::from(self.scfsi[ch][sb] & 0b11), SCFSI_BITS);
                }
            }
        }
    }

    /// Number of bits protected by the CRC.
    pub fn protected_bit_count(&self, layout: &AllocationLayout) -> usize {
        let alloc_bits: usize = (0..layout.sblimit())
            .map(|sb| layout.table.nbal(sb) as usize * layout.coded_channels(sb))
            .sum();

        let n_scfsi = (0..layout.sblimit())
            .flat_map(|sb| (0..layout.channels).map(move |ch| (ch, sb)))
            .filter(|&(ch, sb)| self.allocation(layout, ch, sb) != 0)
            .count();

        alloc_bits + n_scfsi * SCFSI_BITS as usize
    }
}
