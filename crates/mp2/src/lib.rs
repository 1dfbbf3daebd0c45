//! An MPEG Audio Layer II frame library
//!
//! Frame headers, Layer II bit allocation fields and the ISO/IEC 11172-3 CRC-16
//! error protection that covers them.

// SPDX-FileCopyrightText: © 2023 Marcus Rowe <undisbeliever@gmail.com>
//
// SPDX-License-Identifier: MIT

#![forbid(unsafe_code)]

mod allocation;
mod bitstream;
mod crc;
mod frame;
mod header;

pub use allocation::{Allocation, AllocationLayout, AllocationTable};
pub use bitstream::{BitReader, BitWriter, BitstreamError};
pub use crc::{
    check_header_crc, header_crc, stored_crc, update_crc, write_header_crc, CrcError,
    CRC16_POLYNOMIAL, CRC_INIT, MAX_PROTECTED_BITS,
};
pub use frame::{
    frames, protect_frame, protected_bit_count, verify_frame, CrcStatus, FrameError, FrameInfo,
    Frames,
};
pub use header::{
    bitrate_index, samplerate_index, Emphasis, FrameHeader, HeaderError, Mode, MpegVersion,
};

/// Length of the MPEG audio frame header.
pub const HEADER_LEN: usize = 4;

/// Offset of the two CRC bytes in a protected frame.
pub const CRC_OFFSET: usize = HEADER_LEN;
pub const CRC_LEN: usize = 2;

/// Offset of the bit allocation fields in a protected frame.
pub const PROTECTED_DATA_OFFSET: usize = CRC_OFFSET + CRC_LEN;

/// Number of subbands in the analysis filterbank.
pub const SBLIMIT: usize = 32;

pub const SAMPLES_PER_FRAME: usize = 1152;
