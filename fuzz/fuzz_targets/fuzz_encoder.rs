#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sixel_codec::{sixel_encode, DiffusionMethod, EncodeOptions, Quality};

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    width: u8,
    height: u8,
    pixels: Vec<u8>,
    max_colors: u8,
    low_quality: bool,
    diffusion: u8,
}

fuzz_target!(|input: FuzzInput| {
    let width = (input.width as usize).clamp(1, 256);
    let height = (input.height as usize).clamp(1, 256);

    let expected_size = width * height * 4;
    if input.pixels.len() < expected_size {
        return;
    }

    let pixels = &input.pixels[..expected_size];
    let opts = EncodeOptions {
        max_colors: (input.max_colors as u16).max(2),
        quality: if input.low_quality {
            Quality::Low
        } else {
            Quality::High
        },
        diffusion: match input.diffusion % 7 {
            0 => DiffusionMethod::Auto,
            1 => DiffusionMethod::None,
            2 => DiffusionMethod::Atkinson,
            3 => DiffusionMethod::FS,
            4 => DiffusionMethod::JaJuNi,
            5 => DiffusionMethod::Stucki,
            _ => DiffusionMethod::Burkes,
        },
        ..Default::default()
    };

    let _ = sixel_encode(pixels, width, height, &opts);
});
