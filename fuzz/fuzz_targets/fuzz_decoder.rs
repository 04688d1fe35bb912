#![no_main]

use libfuzzer_sys::fuzz_target;
use sixel_codec::{decode, sixel_decode};

fuzz_target!(|data: &[u8]| {
    let _ = decode(data);
    let _ = sixel_decode(data);
});
