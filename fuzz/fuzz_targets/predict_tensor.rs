//! Fuzz target for the post-processing pipeline.
//!
//! Arbitrary bytes become output tensor values for every task, checking
//! that decoding, suppression, mapping and mask reconstruction never panic
//! on hostile floats.

#![no_main]

use libfuzzer_sys::fuzz_target;
use yolopost::predictor::fuzz_predict;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1024 * 1024 {
        return;
    }

    let _ = fuzz_predict(data);
});
