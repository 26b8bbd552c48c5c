//! Fuzz target for tensor JSON parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use yolopost::RawTensorOutput;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let _ = serde_json::from_slice::<RawTensorOutput>(data);
});
