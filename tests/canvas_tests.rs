use pretty_assertions::assert_eq;
use sixel_codec::*;
use std::sync::Arc;

fn three_colors() -> SharedPalette {
    Arc::new(
        Palette::from_colors(vec![
            Rgb::new(0, 0, 0),
            Rgb::new(255, 0, 0),
            Rgb::new(0, 0, 255),
        ])
        .unwrap(),
    )
}

#[test]
fn test_canvas_draw_and_encode() {
    let mut canvas = Canvas::new(6, 6, 1, 3).unwrap();
    canvas.set_palette(three_colors());
    canvas.fill_rect(0, 0, 5, 2, 1);
    canvas.fill_rect(0, 3, 5, 5, 2);

    let mut out = Vec::new();
    encode(&canvas, &mut OutputContext::new(&mut out)).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "\x1bP0;0;0q\"1;1;6;6#1;2;100;0;0#2;2;0;0;100#1!6F$#2!6w\x1b\\"
    );
}

#[test]
fn test_canvas_over_caller_memory() {
    let mut memory = vec![0u8; 4 * 3];
    {
        let mut canvas =
            Canvas::from_pixels(PixelBuffer::Borrowed(&mut memory), 4, 3, 1, three_colors())
                .unwrap();
        assert!(canvas.is_borrowed());
        canvas.fill_rect(1, 1, 2, 1, 2);
        canvas.set_pixel(3, 2, 1);

        // An owned copy outlives the borrow
        let owned = canvas.into_owned();
        assert!(!owned.is_borrowed());
        assert_eq!(owned.pixel(3, 2), Some(1));
    }
    assert_eq!(memory, vec![0, 0, 0, 0, 0, 2, 2, 0, 0, 0, 0, 1]);
}

#[test]
fn test_canvas_rejects_wrong_buffer_length() {
    let result = Canvas::from_pixels(PixelBuffer::Owned(vec![0; 5]), 2, 2, 1, three_colors());
    assert!(matches!(
        result,
        Err(SixelError::BufferSizeMismatch {
            expected: 4,
            actual: 5
        })
    ));
    assert!(matches!(
        Canvas::new(1_000_001, 1, 1, 1),
        Err(SixelError::InvalidDimensions { .. })
    ));
}

#[test]
fn test_canvas_palette_is_shared_until_written() {
    let palette = three_colors();
    let mut a = Canvas::from_pixels(PixelBuffer::Owned(vec![1]), 1, 1, 1, Arc::clone(&palette))
        .unwrap();
    let b = Canvas::from_pixels(PixelBuffer::Owned(vec![1]), 1, 1, 1, Arc::clone(&palette))
        .unwrap();
    assert!(Arc::ptr_eq(a.palette(), b.palette()));

    a.set_palette_entry(1, Rgb::new(0, 255, 0)).unwrap();
    assert!(!Arc::ptr_eq(a.palette(), b.palette()));
    assert_eq!(a.to_rgba(), vec![0, 255, 0, 255]);
    assert_eq!(b.to_rgba(), vec![255, 0, 0, 255]);
    assert_eq!(palette.get(1), Some(Rgb::new(255, 0, 0)));
}

#[test]
fn test_canvas_copy_true_color_region() {
    let mut src = Canvas::new(3, 2, 4, 3).unwrap();
    src.set_palette(three_colors());
    src.fill(2);

    let mut dst = Canvas::new(2, 3, 4, 1).unwrap();
    dst.copy_from(&src, 3, 3).unwrap();
    let rgba = dst.to_rgba();
    assert_eq!(&rgba[..4], &[0, 0, 255, 255]);
    assert_eq!(&rgba[12..16], &[0, 0, 255, 255]);
    // Third row is outside the source
    assert_eq!(&rgba[16..], &[0; 8]);
}

#[test]
fn test_canvas_keycolor_round_trip() {
    let mut canvas = Canvas::new(4, 2, 1, 3).unwrap();
    canvas.set_palette(three_colors());
    canvas.fill(1);
    canvas.fill_rect(1, 0, 2, 1, 0);
    canvas.set_keycolor(Some(0));

    let mut out = Vec::new();
    encode(&canvas, &mut OutputContext::new(&mut out)).unwrap();
    let image = sixel_decode(&out).unwrap();
    assert!(image.has_transparency);
    assert_eq!(image.pixels, canvas.to_rgba());
}

#[test]
fn test_canvas_from_decoded_image_is_editable() {
    let mut canvas = decode(b"\x1bPq\"1;1;3;1#0;2;0;0;0#1;2;100;100;100#1!3@\x1b\\").unwrap();
    canvas.set_pixel(1, 0, 0);
    assert_eq!(canvas.pixels(), &[1, 0, 1]);

    let mut out = Vec::new();
    encode(&canvas, &mut OutputContext::new(&mut out)).unwrap();
    assert_eq!(decode(&out).unwrap().pixels(), &[1, 0, 1]);
}
