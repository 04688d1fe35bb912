use pretty_assertions::assert_eq;
use sixel_codec::*;
use std::sync::Arc;

fn gradient_rgba(width: usize, height: usize) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        for x in 0..width {
            pixels.push((x * 255 / (width - 1)) as u8);
            pixels.push((y * 255 / (height - 1)) as u8);
            pixels.push(((x + y) * 127 / (width + height)) as u8);
            pixels.push(255);
        }
    }
    pixels
}

fn indexed(pixels: Vec<u8>, width: usize, height: usize, colors: Vec<Rgb>) -> Canvas<'static> {
    let palette = Arc::new(Palette::from_colors(colors).unwrap());
    Canvas::from_pixels(PixelBuffer::Owned(pixels), width, height, 1, palette).unwrap()
}

#[test]
fn test_encode_red_and_green() {
    let rgba = vec![255u8, 0, 0, 255, 0, 255, 0, 255];

    let result = sixel_encode(&rgba, 2, 1, &EncodeOptions::default());
    assert!(result.is_ok(), "Failed to encode: {:?}", result.err());

    let sixel = String::from_utf8(result.unwrap()).unwrap();
    assert_eq!(
        sixel,
        "\x1bP0;0;0q\"1;1;2;1#0;2;100;0;0#1;2;0;100;0#0@#1@\x1b\\"
    );
}

#[test]
fn test_encode_rgb_matches_rgba() {
    let rgba = gradient_rgba(16, 9);
    let rgb: Vec<u8> = rgba
        .chunks_exact(4)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect();
    let opts = EncodeOptions::default();
    assert_eq!(
        sixel_encode_rgb(&rgb, 16, 9, &opts).unwrap(),
        sixel_encode(&rgba, 16, 9, &opts).unwrap()
    );
}

#[test]
fn test_encode_single_pixel() {
    let sixel = sixel_encode(&[0, 0, 255, 255], 1, 1, &EncodeOptions::default()).unwrap();
    assert_eq!(sixel, b"\x1bP0;0;0q\"1;1;1;1#0;2;0;0;100#0@\x1b\\".to_vec());
}

#[test]
fn test_encode_partial_last_band() {
    // 8 rows: one full band and a band with two rows
    let rgba: Vec<u8> = std::iter::repeat([255u8, 255, 255, 255])
        .take(8)
        .flatten()
        .collect();
    let sixel = sixel_encode(&rgba, 1, 8, &EncodeOptions::default()).unwrap();
    assert_eq!(
        sixel,
        b"\x1bP0;0;0q\"1;1;1;8#0;2;100;100;100#0~-B\x1b\\".to_vec()
    );
}

#[test]
fn test_encode_is_deterministic() {
    let rgba = gradient_rgba(40, 30);
    let opts = EncodeOptions {
        max_colors: 16,
        diffusion: DiffusionMethod::FS,
        ..Default::default()
    };
    let first = sixel_encode(&rgba, 40, 30, &opts).unwrap();
    let second = sixel_encode(&rgba, 40, 30, &opts).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_encode_respects_max_colors() {
    let rgba = gradient_rgba(64, 64);
    for max_colors in [2u16, 8, 16, 255] {
        let opts = EncodeOptions {
            max_colors,
            ..Default::default()
        };
        let sixel = sixel_encode(&rgba, 64, 64, &opts).unwrap();
        let canvas = decode(&sixel).unwrap();
        assert!(
            canvas.palette().len() <= max_colors as usize,
            "{} colors used with max_colors {}",
            canvas.palette().len(),
            max_colors
        );
        assert_eq!((canvas.width(), canvas.height()), (64, 64));
    }
}

#[test]
fn test_encode_every_diffusion_method() {
    let rgba = gradient_rgba(32, 20);
    for diffusion in [
        DiffusionMethod::Auto,
        DiffusionMethod::None,
        DiffusionMethod::Atkinson,
        DiffusionMethod::FS,
        DiffusionMethod::JaJuNi,
        DiffusionMethod::Stucki,
        DiffusionMethod::Burkes,
    ] {
        let opts = EncodeOptions {
            max_colors: 8,
            diffusion,
            ..Default::default()
        };
        let sixel = sixel_encode(&rgba, 32, 20, &opts).unwrap();
        let image = sixel_decode(&sixel).unwrap();
        assert_eq!((image.width, image.height), (32, 20), "{:?}", diffusion);
    }
}

#[test]
fn test_encode_quality_and_selection_modes() {
    let rgba = gradient_rgba(24, 24);
    for quality in [Quality::Auto, Quality::High, Quality::Low] {
        for method_for_largest in [MethodForLargest::Norm, MethodForLargest::Lum] {
            for method_for_rep in [
                MethodForRep::CenterBox,
                MethodForRep::AverageColors,
                MethodForRep::AveragePixels,
            ] {
                let opts = EncodeOptions {
                    max_colors: 12,
                    quality,
                    method_for_largest,
                    method_for_rep,
                    ..Default::default()
                };
                let sixel = sixel_encode(&rgba, 24, 24, &opts).unwrap();
                assert!(decode(&sixel).is_ok());
            }
        }
    }
}

#[test]
fn test_encode_eight_bit_controls() {
    let opts = EncodeOptions {
        terminal: TerminalOptions {
            eight_bit_control: true,
            sixel_scrolling: false,
            ..Default::default()
        },
        ..Default::default()
    };
    let sixel = sixel_encode(&[255, 255, 255, 255], 1, 1, &opts).unwrap();
    assert_eq!(
        sixel,
        b"\x9b?80h\x900;0;0q\"1;1;1;1#0;2;100;100;100#0@\x9c".to_vec()
    );
}

#[test]
fn test_encode_scrolling_modes() {
    let canvas = indexed(vec![0], 1, 1, vec![Rgb::BLACK]);
    let prefix = |sixel_scrolling, sdm_glitch| {
        let options = TerminalOptions {
            sixel_scrolling,
            sdm_glitch,
            ..Default::default()
        };
        let mut out = Vec::new();
        encode(&canvas, &mut OutputContext::with_options(&mut out, options)).unwrap();
        let start = out.windows(2).position(|w| w == b"\x1bP").unwrap();
        out.truncate(start);
        out
    };
    assert_eq!(prefix(true, false), b"".to_vec());
    assert_eq!(prefix(true, true), b"\x1b[?80h".to_vec());
    assert_eq!(prefix(false, false), b"\x1b[?80h".to_vec());
    assert_eq!(prefix(false, true), b"\x1b[?80l".to_vec());
}

#[test]
fn test_encode_transparent_pixels() {
    // Opaque white left, transparent right
    let rgba = vec![255u8, 255, 255, 255, 10, 20, 30, 0];
    let sixel = sixel_encode(&rgba, 2, 1, &EncodeOptions::default()).unwrap();
    assert_eq!(
        sixel,
        b"\x1bP0;1;0q\"1;1;2;1#0;2;100;100;100#0@\x1b\\".to_vec()
    );
}

#[test]
fn test_encode_ignores_color_under_transparent_pixels() {
    let opts = EncodeOptions {
        diffusion: DiffusionMethod::FS,
        ..Default::default()
    };
    let encode_with_hidden = |hidden: u8| {
        let rgba = [hidden, hidden, hidden, 0, 0, 0, 0, 255, 153, 153, 153, 255];
        sixel_encode(&rgba, 3, 1, &opts).unwrap()
    };
    let sixel = encode_with_hidden(255);
    assert_eq!(sixel, encode_with_hidden(0));

    let image = sixel_decode(&sixel).unwrap();
    assert_eq!(
        image.pixels,
        vec![0, 0, 0, 0, 0, 0, 0, 255, 153, 153, 153, 255]
    );
}

#[test]
fn test_encode_fully_transparent() {
    let rgba = vec![0u8; 3 * 2 * 4];
    let sixel = sixel_encode(&rgba, 3, 2, &EncodeOptions::default()).unwrap();
    assert_eq!(sixel, b"\x1bP0;1;0q\"1;1;3;2\x1b\\".to_vec());
}

#[test]
fn test_encode_with_callback_sink() {
    let canvas = indexed(vec![0, 0, 0, 0, 0], 5, 1, vec![Rgb::new(255, 0, 0)]);
    let mut bytes = Vec::new();
    let mut text = String::new();
    {
        let sink = CallbackSink::new(
            |b| {
                bytes.push(b);
                Ok(())
            },
            |s: &str| {
                text.push_str(s);
                Ok(())
            },
        );
        let mut context = OutputContext::new(sink);
        encode(&canvas, &mut context).unwrap();
    }
    // Formatted pieces go to the text callback, single bytes to the byte one
    assert!(text.contains("\"1;1;5;1"));
    assert!(text.contains("!5@"));
    assert!(bytes.starts_with(b"\x1bP"));
    assert!(bytes.ends_with(b"\x1b\\"));
}

#[test]
fn test_encode_sink_error_is_reported() {
    let canvas = indexed(vec![0], 1, 1, vec![Rgb::BLACK]);
    let sink = CallbackSink::new(
        |_| Err(std::io::Error::other("closed")),
        |_: &str| Ok(()),
    );
    let result = encode(&canvas, &mut OutputContext::new(sink));
    assert!(matches!(result, Err(SixelError::Io(_))));
}

#[test]
fn test_encode_context_reused_across_images() {
    let first = indexed(vec![0, 1], 2, 1, vec![Rgb::BLACK, Rgb::new(255, 255, 255)]);
    let second = indexed(vec![0; 12], 2, 6, vec![Rgb::new(0, 0, 255)]);

    let mut context = OutputContext::new(Vec::new());
    encode(&first, &mut context).unwrap();
    let split = context.sink_mut().len();
    encode(&second, &mut context).unwrap();
    let out = context.into_inner();

    let mut alone = Vec::new();
    encode(&second, &mut OutputContext::new(&mut alone)).unwrap();
    assert_eq!(&out[split..], &alone[..]);
}

#[test]
fn test_encode_rejects_bad_input() {
    let rgba = vec![0u8; 16];
    let opts = EncodeOptions::default();
    assert!(matches!(
        sixel_encode(&rgba, 0, 4, &opts),
        Err(SixelError::InvalidDimensions { .. })
    ));
    assert!(matches!(
        sixel_encode(&rgba, 3, 2, &opts),
        Err(SixelError::BufferSizeMismatch {
            expected: 24,
            actual: 16
        })
    ));
    for max_colors in [0u16, 1, 257] {
        let opts = EncodeOptions {
            max_colors,
            ..Default::default()
        };
        assert!(
            matches!(
                sixel_encode(&rgba, 2, 2, &opts),
                Err(SixelError::InvalidColorCount(_))
            ),
            "max_colors {}",
            max_colors
        );
    }
}

#[test]
fn test_encode_rejects_true_color_canvas() {
    let canvas = Canvas::new(2, 2, 3, 4).unwrap();
    let mut out = Vec::new();
    assert!(matches!(
        encode(&canvas, &mut OutputContext::new(&mut out)),
        Err(SixelError::UnsupportedDepth(3))
    ));
    assert!(out.is_empty());
}
