#![no_main]

use libfuzzer_sys::fuzz_target;

use mp2::{frames, protect_frame, verify_frame, CrcStatus};

fuzz_target!(|data: &[u8]| {
    let mut copy = data.to_vec();

    for info in frames(data).filter_map(Result::ok) {
        let frame = &mut copy[info.range()];

        if protect_frame(frame).is_ok() {
            assert!(matches!(verify_frame(frame), Ok(CrcStatus::Valid(_))));
        }
    }
});
