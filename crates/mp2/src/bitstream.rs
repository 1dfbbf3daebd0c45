//! MSB first bit reader and writer

// SPDX-FileCopyrightText: © 2023 Marcus Rowe <undisbeliever@gmail.com>
//
// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BitstreamError {
    #[error("unexpected end of data (reading {n_bits} bits at bit {position})")]
    UnexpectedEnd { position: usize, n_bits: u32 },
}

#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    data: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts writing after a byte aligned prefix (ie, a frame header and CRC placeholder).
    pub fn with_bytes(prefix: Vec<u8>) -> Self {
        Self {
            bit_len: prefix.len() * 8,
            data: prefix,
        }
    }

    /// Writes the lower `n_bits` bits of `value`, MSB first.
    pub fn put_bits(&mut self, value: u32, n_bits: u32) {
        debug_assert!(n_bits <= 32);
        debug_assert!(n_bits == 32 || value >> n_bits == 0, "value too wide");

        for i in (0..n_bits).rev() {
            let byte = self.bit_len / 8;
            if byte == self.data.len() {
                self.data.push(0);
            }

            if (value >> i) & 1 != 0 {
                self.data[byte] |= 0x80 >> (self.bit_len % 8);
            }
            self.bit_len += 1;
        }
    }

    pub fn bits_written(&self) -> usize {
        self.bit_len
    }

    /// The unused bits of the last byte are zero.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

pub struct BitReader<'a> {
    data: &'a [u8],
    // in bits
    position: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_offset(data, 0)
    }

    pub fn with_offset(data: &'a [u8], byte_offset: usize) -> Self {
        Self {
            data,
            position: byte_offset.saturating_mul(8),
        }
    }

    /// Reads `n_bits` bits, MSB first.
    ///
    /// Nothing is consumed if there is not enough data.
    pub fn read_bits(&mut self, n_bits: u32) -> Result<u32, BitstreamError> {
        debug_assert!(n_bits <= 32);

        let end = self.position.saturating_add(n_bits as usize);
        if end > self.data.len() * 8 {
            return Err(BitstreamError::UnexpectedEnd {
                position: self.position,
                n_bits,
            });
        }

        let mut value = 0;
        for p in self.position..end {
            let bit = (self.data[p / 8] >> (7 - p % 8)) & 1;
            value = (value << 1) | u32::from(bit);
        }
        self.position = end;

        Ok(value)
    }

    /// Position in bits
    pub fn position(&self) -> usize {
        self.position
    }
}
