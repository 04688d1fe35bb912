use pretty_assertions::assert_eq;
use sixel_codec::*;

const ALL_DIFFUSIONS: [DiffusionMethod; 7] = [
    DiffusionMethod::Auto,
    DiffusionMethod::None,
    DiffusionMethod::Atkinson,
    DiffusionMethod::FS,
    DiffusionMethod::JaJuNi,
    DiffusionMethod::Stucki,
    DiffusionMethod::Burkes,
];

// Zero-sized images must be rejected before any division by width or height
#[test]
fn test_regression_zero_dimensions() {
    let opts = EncodeOptions::default();
    assert!(matches!(
        sixel_encode(&[], 0, 1, &opts),
        Err(SixelError::InvalidDimensions { width: 0, height: 1 })
    ));
    assert!(matches!(
        sixel_encode(&[], 1, 0, &opts),
        Err(SixelError::InvalidDimensions { width: 1, height: 0 })
    ));
    assert!(make_palette(&[], 0, 0, 3, 16, &QuantizeOptions::default()).is_err());
}

// Short buffers are an error, not an out-of-bounds read
#[test]
fn test_regression_short_buffers() {
    let opts = EncodeOptions::default();
    assert!(matches!(
        sixel_encode_rgb(&[255, 0], 1, 1, &opts),
        Err(SixelError::BufferSizeMismatch {
            expected: 3,
            actual: 2
        })
    ));
    assert!(matches!(
        sixel_encode(&[255, 0, 0], 1, 1, &opts),
        Err(SixelError::BufferSizeMismatch {
            expected: 4,
            actual: 3
        })
    ));
    assert!(make_palette(&[0; 5], 2, 1, 3, 4, &QuantizeOptions::default()).is_err());
}

// Dimensions whose product overflows are rejected instead of wrapping
#[test]
fn test_regression_size_overflow() {
    let pixels = vec![0u8; 300];
    let opts = EncodeOptions::default();
    assert!(sixel_encode_rgb(&pixels, usize::MAX, 2, &opts).is_err());
    assert!(sixel_encode_rgb(&pixels, 2, usize::MAX / 2, &opts).is_err());
    assert!(sixel_encode_rgb(&pixels, 10, 10, &opts).is_ok());
}

// A single color must not trip up the quantizer or the ditherer
#[test]
fn test_regression_single_color() {
    let pixels = vec![77u8; 3 * 50];
    for diffusion in ALL_DIFFUSIONS {
        let opts = EncodeOptions {
            diffusion,
            max_colors: 2,
            ..Default::default()
        };
        let sixel = sixel_encode_rgb(&pixels, 10, 5, &opts).unwrap();
        let canvas = decode(&sixel).unwrap();
        assert_eq!(canvas.palette().len(), 1, "{:?}", diffusion);
        assert!(canvas.pixels().iter().all(|&p| p == 0));
    }
}

// Kernels reach two columns and rows ahead; tiny images must stay in bounds
#[test]
fn test_regression_dithering_bounds() {
    for (width, height) in [(1, 1), (1, 5), (5, 1), (2, 2), (3, 3)] {
        let mut pixels = Vec::with_capacity(width * height * 3);
        for i in 0..width * height {
            pixels.extend_from_slice(&[(i * 97 % 256) as u8, (i * 31 % 256) as u8, 200]);
        }
        for diffusion in ALL_DIFFUSIONS {
            let opts = EncodeOptions {
                diffusion,
                max_colors: 2,
                ..Default::default()
            };
            let result = sixel_encode_rgb(&pixels, width, height, &opts);
            assert!(
                result.is_ok(),
                "{:?} failed on {}x{}",
                diffusion,
                width,
                height
            );
        }
    }
}

// Saturated channels plus diffusion must not overflow the working copy
#[test]
fn test_regression_max_color_values() {
    let mut pixels = Vec::new();
    for i in 0..64 {
        let v = if i % 2 == 0 { 255 } else { 0 };
        pixels.extend_from_slice(&[v, 255 - v, v, 255]);
    }
    for diffusion in ALL_DIFFUSIONS {
        let palette = std::sync::Arc::new(
            Palette::from_colors(vec![Rgb::new(128, 128, 128), Rgb::new(255, 255, 255)]).unwrap(),
        );
        let opts = DitherOptions {
            diffusion,
            ..Default::default()
        };
        let canvas = apply_palette(&pixels, 8, 8, 4, &palette, &opts, None).unwrap();
        assert_eq!(canvas.pixels().len(), 64);
    }
}

// Heights around the six-row band boundary keep their exact size
#[test]
fn test_regression_sixel_height_boundaries() {
    for height in 1..=13 {
        let rgba: Vec<u8> = (0..height)
            .flat_map(|y| [if y % 2 == 0 { 255 } else { 0 }, 0, 0, 255])
            .collect();
        let sixel = sixel_encode(&rgba, 1, height, &EncodeOptions::default()).unwrap();
        let image = sixel_decode(&sixel).unwrap();
        assert_eq!(image.height, height, "height {}", height);
        assert_eq!(image.pixels, rgba, "height {}", height);
    }
}

// 256 distinct colors use every palette slot exactly once
#[test]
fn test_regression_full_palette() {
    let mut rgba = Vec::with_capacity(256 * 4);
    for i in 0..=255u8 {
        rgba.extend_from_slice(&[i, 255 - i, i / 2, 255]);
    }
    let sixel = sixel_encode(&rgba, 16, 16, &EncodeOptions::default()).unwrap();
    let canvas = decode(&sixel).unwrap();
    assert_eq!(canvas.palette().len(), 256);
    let mut seen = [false; 256];
    for &p in canvas.pixels() {
        seen[p as usize] = true;
    }
    assert!(seen.iter().all(|&s| s));
}

// Garbage input is reported as an error, never a panic
#[test]
fn test_regression_decoder_garbage() {
    let inputs: [&[u8]; 10] = [
        b"\x1bP",
        b"\x1bPq#",
        b"\x1bPq#;;;;;;;;;;;;;;;;;;;;;;;;;;;;;;;;;;;;;;;@",
        b"\x1bPq#999999999999999999;2;1;1;1@",
        b"\x1bPq\"0;0;0;0@",
        b"\x1bPq!0@",
        b"\x1bPq----------------@",
        b"\x90\x90\x90q~\x9c",
        b"\x1bPq\xff\x1b\\",
        b"\x1bPq#0;2;1000;1000;1000@\x1b\\",
    ];
    for data in inputs {
        // Either outcome is fine as long as it returns
        let _ = decode(data);
        let _ = sixel_decode(data);
    }
}

// Extreme parameters are clamped rather than wrapped
#[test]
fn test_regression_decoder_clamps_parameters() {
    let canvas = decode(b"\x1bPq#999999999999999999;2;100;0;0@\x1b\\").unwrap();
    assert_eq!(canvas.pixels(), &[255]);
    assert_eq!(canvas.palette_entry(255), Some(Rgb::new(255, 0, 0)));

    let canvas = decode(b"\x1bPq#0;2;1000;1000;1000@\x1b\\").unwrap();
    assert_eq!(canvas.palette_entry(0), Some(Rgb::new(255, 255, 255)));

    // `!0` paints once
    let canvas = decode(b"\x1bPq!0@\x1b\\").unwrap();
    assert_eq!(canvas.width(), 1);
}

// Many bands without data only move the cursor
#[test]
fn test_regression_empty_bands() {
    let canvas = decode(b"\x1bPq--------@\x1b\\").unwrap();
    assert_eq!((canvas.width(), canvas.height()), (1, 49));
}
