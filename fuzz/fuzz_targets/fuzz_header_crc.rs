#![no_main]

use libfuzzer_sys::fuzz_target;

use mp2::{check_header_crc, header_crc, write_header_crc};

fuzz_target!(|input: (u16, &[u8])| {
    let (bit_count, data) = input;
    let bit_count = usize::from(bit_count);

    let mut frame = data.to_vec();

    match write_header_crc(&mut frame, bit_count) {
        Ok(crc) => {
            assert_eq!(header_crc(&frame, bit_count), Ok(crc));
            assert_eq!(check_header_crc(&frame, bit_count), Ok(true));
        }
        Err(_) => assert_eq!(frame, data),
    }
});
