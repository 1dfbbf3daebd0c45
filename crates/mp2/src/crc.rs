//! MPEG audio CRC-16 error protection
//!
//! The CRC covers the last two bytes of the frame header and the first
//! `bit_count` bits after the CRC word (the bit allocation and scale-factor
//! selection fields).  See ISO/IEC 11172-3 Annex A.

// SPDX-FileCopyrightText: © 2023 Marcus Rowe <undisbeliever@gmail.com>
//
// SPDX-License-Identifier: MIT

use thiserror::Error;

use crate::{CRC_OFFSET, PROTECTED_DATA_OFFSET, SBLIMIT};

/// x^16 + x^15 + x^2 + 1
pub const CRC16_POLYNOMIAL: u16 = 0x8005;

/// The accumulator is reset to this value at the start of every frame.
pub const CRC_INIT: u16 = 0xffff;

/// Largest protected region of a Layer I or Layer II frame.
///
/// 32 subbands, 2 channels, a 4 bit allocation field and 2 scfsi bits each.
pub const MAX_PROTECTED_BITS: usize = SBLIMIT * 2 * (4 + 2);

// Bit 16 is the bit shifted out of the 16 bit register.
const CARRY_BIT: u32 = 0x1_0000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrcError {
    #[error("frame is too short for the CRC ({len} bytes, requires {required})")]
    FrameTooShort { len: usize, required: usize },

    #[error("invalid protected bit count {0} (expected <= {})", MAX_PROTECTED_BITS)]
    InvalidBitCount(usize),
}

/// Folds the most significant `bit_count` bits of `value` into `crc`.
///
/// Bits are processed MSB first.  `bit_count` is normally 8, or the size of the
/// trailing partial byte.
pub fn update_crc(value: u8, crc: u16, bit_count: u32) -> u16 {
    // Pre-shift so the next data bit is at bit 15.
    // After each left shift that bit lines up with the register's carry out (bit 16).
    let mut data = u32::from(value) << 8;
    let mut register = u32::from(crc);

    for _ in 0..bit_count {
        data <<= 1;
        register <<= 1;

        if (register ^ data) & CARRY_BIT != 0 {
            register ^= u32::from(CRC16_POLYNOMIAL);
        }

        register &= 0xffff;
    }

    // Truncation is safe, register is masked to 16 bits
    register as u16
}

fn required_frame_len(bit_count: usize) -> usize {
    PROTECTED_DATA_OFFSET + bit_count.div_ceil(8)
}

fn validate(frame: &[u8], bit_count: usize) -> Result<(), CrcError> {
    if bit_count > MAX_PROTECTED_BITS {
        return Err(CrcError::InvalidBitCount(bit_count));
    }

    let required = required_frame_len(bit_count);
    if frame.len() < required {
        return Err(CrcError::FrameTooShort {
            len: frame.len(),
            required,
        });
    }

    Ok(())
}

/// Calculates the CRC of a frame without modifying it.
pub fn header_crc(frame: &[u8], bit_count: usize) -> Result<u16, CrcError> {
    validate(frame, bit_count)?;

    let whole_bytes = bit_count / 8;
    let remaining_bits = (bit_count % 8) as u32;

    let mut crc = CRC_INIT;

    // The first two bytes (sync word, version, layer and protection bit) are not protected.
    crc = update_crc(frame[2], crc, 8);
    crc = update_crc(frame[3], crc, 8);

    let payload = &frame[PROTECTED_DATA_OFFSET..];

    for b in &payload[..whole_bytes] {
        crc = update_crc(*b, crc, 8);
    }

    // Only the high bits of the last byte are part of the protected fields
    if remaining_bits != 0 {
        crc = update_crc(payload[whole_bytes], crc, remaining_bits);
    }

    Ok(crc)
}

/// Calculates the CRC of a frame and stores it (big endian) in the two bytes after the header.
///
/// The frame is unchanged if an error is returned.
pub fn write_header_crc(frame: &mut [u8], bit_count: usize) -> Result<u16, CrcError> {
    let crc = header_crc(frame, bit_count)?;

    frame[CRC_OFFSET..CRC_OFFSET + 2].copy_from_slice(&crc.to_be_bytes());

    Ok(crc)
}

/// Reads the CRC stored in the frame.
pub fn stored_crc(frame: &[u8]) -> Result<u16, CrcError> {
    match frame.get(CRC_OFFSET..CRC_OFFSET + 2) {
        Some(&[hi, lo]) => Ok(u16::from_be_bytes([hi, lo])),
        _ => Err(CrcError::FrameTooShort {
            len: frame.len(),
            required: PROTECTED_DATA_OFFSET,
        }),
    }
}

/// Returns true if the CRC stored in the frame matches the calculated CRC.
pub fn check_header_crc(frame: &[u8], bit_count: usize) -> Result<bool, CrcError> {
    let computed = header_crc(frame, bit_count)?;
    let stored = stored_crc(frame)?;

    Ok(computed == stored)
}
