//! In-memory images: an indexed (or true-color) pixel buffer plus its palette.

use std::sync::Arc;

use crate::color::Rgb;
use crate::palette::{Palette, SharedPalette};
use crate::{try_alloc, Result, SixelError, SIXEL_HEIGHT_LIMIT, SIXEL_WIDTH_LIMIT};

/// Pixel storage of a [`Canvas`].
///
/// A borrowed buffer belongs to the caller and is never freed by the canvas.
#[derive(Debug)]
pub enum PixelBuffer<'a> {
    Owned(Vec<u8>),
    Borrowed(&'a mut [u8]),
}

impl PixelBuffer<'_> {
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        match self {
            PixelBuffer::Owned(v) => v,
            PixelBuffer::Borrowed(s) => s,
        }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            PixelBuffer::Owned(v) => v,
            PixelBuffer::Borrowed(s) => s,
        }
    }

    #[inline]
    pub fn is_borrowed(&self) -> bool {
        matches!(self, PixelBuffer::Borrowed(_))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

/// An image held in memory together with a shared palette.
///
/// With `depth == 1` every byte is an index into the palette; this is the form
/// the encoder consumes and the decoder produces. Depth 3 (RGB) and 4 (RGBA)
/// canvases hold true-color pixels that can be fed to the ditherer.
///
/// Pixel-level operations always take a palette index as the color. On a
/// true-color canvas the palette entry's value is written instead.
#[derive(Debug)]
pub struct Canvas<'a> {
    width: usize,
    height: usize,
    depth: usize,
    pixels: PixelBuffer<'a>,
    keycolor: Option<u8>,
    palette: SharedPalette,
}

impl Canvas<'static> {
    /// Allocates a zeroed canvas with a palette of `ncolors` black entries.
    pub fn new(width: usize, height: usize, depth: usize, ncolors: usize) -> Result<Self> {
        check_geometry(width, height, depth)?;
        let palette = Arc::new(Palette::filled(ncolors, Rgb::BLACK)?);
        let pixels = try_alloc(width * height * depth, 0)?;
        Ok(Self {
            width,
            height,
            depth,
            pixels: PixelBuffer::Owned(pixels),
            keycolor: None,
            palette,
        })
    }
}

impl<'a> Canvas<'a> {
    /// Wraps an existing buffer, owned or borrowed, and takes one reference to
    /// `palette`.
    pub fn from_pixels(
        pixels: PixelBuffer<'a>,
        width: usize,
        height: usize,
        depth: usize,
        palette: SharedPalette,
    ) -> Result<Self> {
        check_geometry(width, height, depth)?;
        check_len(pixels.len(), width * height * depth)?;
        Ok(Self {
            width,
            height,
            depth,
            pixels,
            keycolor: None,
            palette,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Bytes per pixel.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[inline]
    pub fn pixels(&self) -> &[u8] {
        self.pixels.as_slice()
    }

    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        self.pixels.as_mut_slice()
    }

    #[inline]
    pub fn is_borrowed(&self) -> bool {
        self.pixels.is_borrowed()
    }

    /// Index treated as transparent by the encoder.
    #[inline]
    pub fn keycolor(&self) -> Option<u8> {
        self.keycolor
    }

    pub fn set_keycolor(&mut self, keycolor: Option<u8>) {
        self.keycolor = keycolor;
    }

    #[inline]
    pub fn palette(&self) -> &SharedPalette {
        &self.palette
    }

    pub fn set_palette(&mut self, palette: SharedPalette) {
        self.palette = palette;
    }

    pub fn palette_entry(&self, index: usize) -> Option<Rgb> {
        self.palette.get(index)
    }

    /// Changes one palette entry. Other holders of the previous palette are
    /// not affected.
    pub fn set_palette_entry(&mut self, index: usize, color: Rgb) -> Result<()> {
        Arc::make_mut(&mut self.palette).set(index, color)
    }

    /// Replaces the pixel buffer; the previous buffer is released if owned.
    pub fn set_pixels(&mut self, pixels: PixelBuffer<'a>) -> Result<()> {
        check_len(pixels.len(), self.width * self.height * self.depth)?;
        self.pixels = pixels;
        Ok(())
    }

    /// Index (depth 1) or first channel byte at `(x, y)`.
    pub fn pixel(&self, x: usize, y: usize) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels()[(y * self.width + x) * self.depth])
    }

    /// Sets one pixel. Coordinates outside the canvas are ignored.
    pub fn set_pixel(&mut self, x: usize, y: usize, color: u8) {
        if x >= self.width || y >= self.height {
            return;
        }
        let value = self.pixel_value(color);
        let depth = self.depth;
        let offset = (y * self.width + x) * depth;
        self.pixels_mut()[offset..offset + depth].copy_from_slice(&value[..depth]);
    }

    /// Copies the top-left `width` x `height` region of `src` into the top-left
    /// of this canvas, clipped to both.
    pub fn copy_from(&mut self, src: &Canvas<'_>, width: usize, height: usize) -> Result<()> {
        if src.depth != self.depth {
            return Err(SixelError::UnsupportedDepth(src.depth));
        }
        let w = width.min(src.width).min(self.width);
        let h = height.min(src.height).min(self.height);
        let depth = self.depth;
        let dst_stride = self.width * depth;
        let src_stride = src.width * depth;
        let dst = self.pixels_mut();
        for y in 0..h {
            let s = y * src_stride;
            let d = y * dst_stride;
            dst[d..d + w * depth].copy_from_slice(&src.pixels()[s..s + w * depth]);
        }
        Ok(())
    }

    /// Sets every pixel to `color`.
    pub fn fill(&mut self, color: u8) {
        let (w, h) = (self.width, self.height);
        self.fill_rect(0, 0, w - 1, h - 1, color);
    }

    /// Sets every pixel of the inclusive rectangle `(x1, y1)..=(x2, y2)`,
    /// clipped to the canvas. Corners may be given in any order.
    pub fn fill_rect(&mut self, x1: usize, y1: usize, x2: usize, y2: usize, color: u8) {
        let (left, right) = (x1.min(x2), x1.max(x2).min(self.width - 1));
        let (top, bottom) = (y1.min(y2), y1.max(y2).min(self.height - 1));
        if left > right || top > bottom {
            return;
        }
        let value = self.pixel_value(color);
        let depth = self.depth;
        let stride = self.width * depth;
        let pixels = self.pixels_mut();
        for y in top..=bottom {
            let row = &mut pixels[y * stride + left * depth..y * stride + (right + 1) * depth];
            for px in row.chunks_exact_mut(depth) {
                px.copy_from_slice(&value[..depth]);
            }
        }
    }

    /// Expands the canvas to RGBA. Indexed pixels equal to the key color become
    /// fully transparent.
    pub fn to_rgba(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width * self.height * 4);
        match self.depth {
            1 => {
                for &index in self.pixels() {
                    if Some(index) == self.keycolor {
                        out.extend_from_slice(&[0, 0, 0, 0]);
                    } else {
                        let c = self.palette.get(index as usize).unwrap_or_default();
                        out.extend_from_slice(&[c.r, c.g, c.b, 255]);
                    }
                }
            }
            3 => {
                for px in self.pixels().chunks_exact(3) {
                    out.extend_from_slice(&[px[0], px[1], px[2], 255]);
                }
            }
            _ => out.extend_from_slice(self.pixels()),
        }
        out
    }

    /// Detaches the canvas from any borrowed memory by copying it.
    pub fn into_owned(self) -> Canvas<'static> {
        let pixels = match self.pixels {
            PixelBuffer::Owned(v) => v,
            PixelBuffer::Borrowed(s) => s.to_vec(),
        };
        Canvas {
            width: self.width,
            height: self.height,
            depth: self.depth,
            pixels: PixelBuffer::Owned(pixels),
            keycolor: self.keycolor,
            palette: self.palette,
        }
    }

    fn pixel_value(&self, color: u8) -> [u8; 4] {
        if self.depth == 1 {
            return [color, 0, 0, 0];
        }
        let c = self.palette.get(color as usize).unwrap_or_default();
        [c.r, c.g, c.b, 255]
    }

    /// First pixel index that has no palette entry, if any.
    pub(crate) fn find_missing_index(&self) -> Option<u8> {
        let ncolors = self.palette.len();
        self.pixels()
            .iter()
            .copied()
            .find(|&p| (p as usize) >= ncolors && Some(p) != self.keycolor)
    }
}

fn check_geometry(width: usize, height: usize, depth: usize) -> Result<()> {
    if width == 0 || height == 0 || width > SIXEL_WIDTH_LIMIT || height > SIXEL_HEIGHT_LIMIT {
        return Err(SixelError::InvalidDimensions { width, height });
    }
    if !matches!(depth, 1 | 3 | 4) {
        return Err(SixelError::UnsupportedDepth(depth));
    }
    Ok(())
}

fn check_len(actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(SixelError::BufferSizeMismatch { expected, actual });
    }
    Ok(())
}
