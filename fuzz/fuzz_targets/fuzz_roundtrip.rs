#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sixel_codec::{decode, encode, Canvas, OutputContext, Rgb};

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    width: u8,
    height: u8,
    colors: Vec<[u8; 3]>,
    pixels: Vec<u8>,
}

fuzz_target!(|input: FuzzInput| {
    let width = (input.width as usize).clamp(1, 64);
    let height = (input.height as usize).clamp(1, 64);
    let ncolors = input.colors.len().clamp(1, 256);
    if input.pixels.len() < width * height {
        return;
    }

    let mut canvas = match Canvas::new(width, height, 1, ncolors) {
        Ok(c) => c,
        Err(_) => return,
    };
    for (i, c) in input.colors.iter().take(ncolors).enumerate() {
        let _ = canvas.set_palette_entry(i, Rgb::from(*c));
    }
    for (dst, src) in canvas.pixels_mut().iter_mut().zip(&input.pixels) {
        *dst = (*src as usize % ncolors) as u8;
    }

    let mut out = Vec::new();
    encode(&canvas, &mut OutputContext::new(&mut out)).expect("valid canvas must encode");
    let decoded = decode(&out).expect("encoder output must decode");

    assert_eq!((decoded.width(), decoded.height()), (width, height));
    assert_eq!(decoded.pixels(), canvas.pixels());
});
