//! Palette application with optional error diffusion.

use std::sync::Arc;

use crate::cache::{CachePrecision, ColorCache};
use crate::canvas::{Canvas, PixelBuffer};
use crate::color::Rgb;
use crate::palette::{Palette, SharedPalette};
use crate::quant::{make_palette, MethodForLargest, MethodForRep, Quality, QuantizeOptions};
use crate::{check_image, try_alloc, Result, SixelError};

/// Error diffusion kernel used while mapping pixels onto a palette.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DiffusionMethod {
    /// Floyd-Steinberg, or no diffusion for low quality and exact palettes.
    #[default]
    Auto,
    None,
    Atkinson,
    /// Floyd-Steinberg
    FS,
    /// Jarvis, Judice & Ninke
    JaJuNi,
    Stucki,
    Burkes,
}

impl DiffusionMethod {
    /// Resolves [`DiffusionMethod::Auto`].
    ///
    /// An optimized palette holds every source color exactly, so diffusion
    /// would only add noise.
    pub fn resolve(self, quality: Quality, palette_optimized: bool) -> DiffusionMethod {
        match self {
            DiffusionMethod::Auto if quality == Quality::Low || palette_optimized => {
                DiffusionMethod::None
            }
            DiffusionMethod::Auto => DiffusionMethod::FS,
            other => other,
        }
    }

    fn kernel(self) -> Option<&'static Kernel> {
        match self {
            DiffusionMethod::Auto | DiffusionMethod::None => None,
            DiffusionMethod::Atkinson => Some(&ATKINSON),
            DiffusionMethod::FS => Some(&FLOYD_STEINBERG),
            DiffusionMethod::JaJuNi => Some(&JARVIS_JUDICE_NINKE),
            DiffusionMethod::Stucki => Some(&STUCKI),
            DiffusionMethod::Burkes => Some(&BURKES),
        }
    }
}

/// `(dx, dy, numerator)` taps sharing one denominator.
struct Kernel {
    taps: &'static [(isize, isize, i32)],
    div: i32,
}

const FLOYD_STEINBERG: Kernel = Kernel {
    taps: &[(1, 0, 7), (-1, 1, 3), (0, 1, 5), (1, 1, 1)],
    div: 16,
};

// Atkinson only diffuses 6/8 of the error.
const ATKINSON: Kernel = Kernel {
    taps: &[(1, 0, 1), (2, 0, 1), (-1, 1, 1), (0, 1, 1), (1, 1, 1), (0, 2, 1)],
    div: 8,
};

const JARVIS_JUDICE_NINKE: Kernel = Kernel {
    taps: &[
        (1, 0, 7),
        (2, 0, 5),
        (-2, 1, 3),
        (-1, 1, 5),
        (0, 1, 7),
        (1, 1, 5),
        (2, 1, 3),
        (-2, 2, 1),
        (-1, 2, 3),
        (0, 2, 5),
        (1, 2, 3),
        (2, 2, 1),
    ],
    div: 48,
};

const STUCKI: Kernel = Kernel {
    taps: &[
        (1, 0, 8),
        (2, 0, 4),
        (-2, 1, 2),
        (-1, 1, 4),
        (0, 1, 8),
        (1, 1, 4),
        (2, 1, 2),
        (-2, 2, 1),
        (-1, 2, 2),
        (0, 2, 4),
        (1, 2, 2),
        (2, 2, 1),
    ],
    div: 48,
};

const BURKES: Kernel = Kernel {
    taps: &[
        (1, 0, 4),
        (2, 0, 2),
        (-2, 1, 1),
        (-1, 1, 2),
        (0, 1, 4),
        (1, 1, 2),
        (2, 1, 1),
    ],
    div: 16,
};

/// Settings for [`apply_palette`].
#[derive(Clone, Debug)]
pub struct DitherOptions {
    pub diffusion: DiffusionMethod,
    /// Only consulted to resolve [`DiffusionMethod::Auto`].
    pub quality: Quality,
    /// Look colors up through the reduced-precision cache. Off by default,
    /// and ignored for optimized palettes, which always use exact lookups.
    pub optimize: bool,
}

impl Default for DitherOptions {
    fn default() -> Self {
        Self {
            diffusion: DiffusionMethod::Auto,
            quality: Quality::Auto,
            optimize: false,
        }
    }
}

impl DitherOptions {
    pub(crate) fn cache_precision(&self, palette: &Palette) -> CachePrecision {
        if self.optimize && !palette.is_optimized() {
            CachePrecision::Reduced
        } else {
            CachePrecision::Exact
        }
    }
}

/// Maps a depth 3 or 4 image onto `palette`, producing an indexed canvas that
/// shares the palette.
///
/// A caller-supplied `cache` is consulted and extended; it must have been
/// filled against the same palette.
pub fn apply_palette(
    pixels: &[u8],
    width: usize,
    height: usize,
    depth: usize,
    palette: &SharedPalette,
    opts: &DitherOptions,
    cache: Option<&mut ColorCache>,
) -> Result<Canvas<'static>> {
    check_image(pixels, width, height, depth)?;
    if palette.is_empty() {
        return Err(SixelError::InvalidColorCount(0));
    }

    let mut result = try_alloc(width * height, 0)?;
    let method = opts.diffusion.resolve(opts.quality, palette.is_optimized());
    let image = Image {
        pixels,
        width,
        height,
        depth,
        mask: None,
    };
    match cache {
        Some(cache) => apply_into(&image, palette, method, cache, &mut result)?,
        None => {
            let mut cache = ColorCache::new(opts.cache_precision(palette))?;
            apply_into(&image, palette, method, &mut cache, &mut result)?;
        }
    }

    Canvas::from_pixels(
        PixelBuffer::Owned(result),
        width,
        height,
        1,
        Arc::clone(palette),
    )
}

/// A true-color source for [`apply_into`].
pub(crate) struct Image<'p> {
    pub pixels: &'p [u8],
    pub width: usize,
    pub height: usize,
    pub depth: usize,
    /// Pixels set here are skipped: they get index 0, produce no error and
    /// receive none from their neighbours.
    pub mask: Option<&'p [bool]>,
}

impl Image<'_> {
    #[inline]
    fn masked(&self, index: usize) -> bool {
        self.mask.is_some_and(|mask| mask[index])
    }
}

/// Writes one palette index per pixel into `result`. `method` must already be
/// resolved.
pub(crate) fn apply_into(
    image: &Image<'_>,
    palette: &Palette,
    method: DiffusionMethod,
    cache: &mut ColorCache,
    result: &mut [u8],
) -> Result<()> {
    let Image {
        pixels,
        width,
        height,
        depth,
        ..
    } = *image;
    debug_assert_eq!(result.len(), width * height);
    log::debug!(
        "apply palette of {} colors to {}x{} with {:?}",
        palette.len(),
        width,
        height,
        method
    );

    let Some(kernel) = method.kernel() else {
        for (i, (out, px)) in result.iter_mut().zip(pixels.chunks_exact(depth)).enumerate() {
            if !image.masked(i) {
                *out = cache.lookup(palette, Rgb::from_pixel(px)) as u8;
            }
        }
        return Ok(());
    };

    // Diffusion works on an RGB copy so the caller's buffer stays untouched.
    let mut work = try_alloc(width * height * 3, 0)?;
    for (dst, src) in work.chunks_exact_mut(3).zip(pixels.chunks_exact(depth)) {
        dst.copy_from_slice(&src[..3]);
    }

    for y in 0..height {
        for x in 0..width {
            if image.masked(y * width + x) {
                continue;
            }
            let pos = (y * width + x) * 3;
            let color = Rgb::from_pixel(&work[pos..pos + 3]);
            let index = cache.lookup(palette, color);
            result[y * width + x] = index as u8;

            let chosen = palette.colors()[index];
            let error = [
                color.r as i32 - chosen.r as i32,
                color.g as i32 - chosen.g as i32,
                color.b as i32 - chosen.b as i32,
            ];
            if error == [0, 0, 0] {
                continue;
            }
            diffuse(&mut work, image, x, y, &error, kernel);
        }
    }
    Ok(())
}

fn diffuse(
    work: &mut [u8],
    image: &Image<'_>,
    x: usize,
    y: usize,
    error: &[i32; 3],
    kernel: &Kernel,
) {
    let (width, height) = (image.width, image.height);
    for &(dx, dy, num) in kernel.taps {
        let tx = x as isize + dx;
        let ty = y + dy as usize;
        if tx < 0 || tx as usize >= width || ty >= height {
            continue;
        }
        let target = ty * width + tx as usize;
        if image.masked(target) {
            continue;
        }
        let pos = target * 3;
        for (c, e) in work[pos..pos + 3].iter_mut().zip(error) {
            *c = (*c as i32 + e * num / kernel.div).clamp(0, 255) as u8;
        }
    }
}

/// A palette together with the policies used to build and apply it.
///
/// Rebuilding the palette with [`Dither::prepare_palette`] discards the
/// nearest-color cache, which is only valid for the palette it was filled
/// against.
#[derive(Debug)]
pub struct Dither {
    palette: SharedPalette,
    cache: Option<ColorCache>,
    reqcolors: usize,
    quantize: QuantizeOptions,
    diffusion: DiffusionMethod,
    optimize: bool,
}

impl Dither {
    /// Creates a ditherer that will build a palette of up to `reqcolors`
    /// colors.
    pub fn new(reqcolors: usize) -> Result<Self> {
        Ok(Self {
            palette: Arc::new(Palette::new(reqcolors)?),
            cache: None,
            reqcolors,
            quantize: QuantizeOptions::default(),
            diffusion: DiffusionMethod::Auto,
            optimize: false,
        })
    }

    /// Creates a ditherer around an existing palette.
    pub fn with_palette(palette: SharedPalette) -> Self {
        Self {
            reqcolors: palette.reqcolors(),
            palette,
            cache: None,
            quantize: QuantizeOptions::default(),
            diffusion: DiffusionMethod::Auto,
            optimize: false,
        }
    }

    #[inline]
    pub fn palette(&self) -> &SharedPalette {
        &self.palette
    }

    #[inline]
    pub fn reqcolors(&self) -> usize {
        self.reqcolors
    }

    pub fn set_diffusion(&mut self, method: DiffusionMethod) {
        self.diffusion = method;
    }

    pub fn set_quality(&mut self, quality: Quality) {
        self.quantize.quality = quality;
    }

    pub fn set_method_for_largest(&mut self, method: MethodForLargest) {
        self.quantize.method_for_largest = method;
    }

    pub fn set_method_for_rep(&mut self, method: MethodForRep) {
        self.quantize.method_for_rep = method;
    }

    pub fn set_optimize(&mut self, optimize: bool) {
        self.optimize = optimize;
        self.cache = None;
    }

    pub fn set_quantize_options(&mut self, opts: QuantizeOptions) {
        self.quantize = opts;
    }

    /// Builds the palette from an image with the median-cut quantizer.
    pub fn prepare_palette(
        &mut self,
        pixels: &[u8],
        width: usize,
        height: usize,
        depth: usize,
    ) -> Result<()> {
        let palette = make_palette(pixels, width, height, depth, self.reqcolors, &self.quantize)?;
        self.palette = Arc::new(palette);
        self.cache = None;
        Ok(())
    }

    /// Maps an image onto the current palette.
    pub fn apply_palette(
        &mut self,
        pixels: &[u8],
        width: usize,
        height: usize,
        depth: usize,
    ) -> Result<Canvas<'static>> {
        self.apply(Image {
            pixels,
            width,
            height,
            depth,
            mask: None,
        })
    }

    /// Like [`Dither::apply_palette`], but pixels flagged in `transparent`
    /// are left out of the lookup and of error diffusion. Their index in the
    /// result is unspecified.
    pub fn apply_palette_masked(
        &mut self,
        pixels: &[u8],
        width: usize,
        height: usize,
        depth: usize,
        transparent: &[bool],
    ) -> Result<Canvas<'static>> {
        if transparent.len() != width.saturating_mul(height) {
            return Err(SixelError::BufferSizeMismatch {
                expected: width.saturating_mul(height),
                actual: transparent.len(),
            });
        }
        self.apply(Image {
            pixels,
            width,
            height,
            depth,
            mask: Some(transparent),
        })
    }

    fn apply(&mut self, image: Image<'_>) -> Result<Canvas<'static>> {
        check_image(image.pixels, image.width, image.height, image.depth)?;
        if self.palette.is_empty() {
            return Err(SixelError::InvalidColorCount(0));
        }
        let opts = DitherOptions {
            diffusion: self.diffusion,
            quality: self.quantize.quality,
            optimize: self.optimize,
        };
        let precision = opts.cache_precision(&self.palette);
        let cache = match self.cache.take() {
            Some(cache) if cache.precision() == precision => cache,
            _ => ColorCache::new(precision)?,
        };
        let cache = self.cache.insert(cache);

        let method = opts.diffusion.resolve(opts.quality, self.palette.is_optimized());
        let mut result = try_alloc(image.width * image.height, 0)?;
        apply_into(&image, &self.palette, method, cache, &mut result)?;
        Canvas::from_pixels(
            PixelBuffer::Owned(result),
            image.width,
            image.height,
            1,
            Arc::clone(&self.palette),
        )
    }

    /// Maps a true-color canvas (depth 3 or 4) onto the current palette.
    pub fn apply_palette_to(&mut self, canvas: &Canvas<'_>) -> Result<Canvas<'static>> {
        if canvas.depth() == 1 {
            return Err(SixelError::UnsupportedDepth(1));
        }
        self.apply_palette(canvas.pixels(), canvas.width(), canvas.height(), canvas.depth())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn gradient(width: usize, height: usize) -> Vec<u8> {
        let mut pixels = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            for x in 0..width {
                pixels.push((x * 255 / (width - 1)) as u8);
                pixels.push((y * 255 / (height - 1)) as u8);
                pixels.push(128);
            }
        }
        pixels
    }

    fn two_grays() -> SharedPalette {
        Arc::new(Palette::from_colors(vec![Rgb::new(0, 0, 0), Rgb::new(255, 255, 255)]).unwrap())
    }

    #[test]
    fn test_auto_resolution() {
        assert_eq!(
            DiffusionMethod::Auto.resolve(Quality::Auto, false),
            DiffusionMethod::FS
        );
        assert_eq!(
            DiffusionMethod::Auto.resolve(Quality::Low, false),
            DiffusionMethod::None
        );
        assert_eq!(
            DiffusionMethod::Auto.resolve(Quality::High, true),
            DiffusionMethod::None
        );
        assert_eq!(
            DiffusionMethod::Stucki.resolve(Quality::Low, true),
            DiffusionMethod::Stucki
        );
    }

    #[test]
    fn test_kernel_weights() {
        for (kernel, total) in [
            (&FLOYD_STEINBERG, 16),
            (&ATKINSON, 6),
            (&JARVIS_JUDICE_NINKE, 48),
            (&STUCKI, 42),
            (&BURKES, 16),
        ] {
            assert_eq!(kernel.taps.iter().map(|t| t.2).sum::<i32>(), total);
            assert!(kernel.taps.iter().all(|&(dx, dy, _)| dy > 0 || dx > 0));
        }
    }

    #[test]
    fn test_no_diffusion_picks_nearest() {
        let pixels = [10, 10, 10, 200, 200, 200, 127, 127, 127, 128, 128, 128];
        let opts = DitherOptions {
            diffusion: DiffusionMethod::None,
            ..Default::default()
        };
        let canvas = apply_palette(&pixels, 4, 1, 3, &two_grays(), &opts, None).unwrap();
        assert_eq!(canvas.pixels(), &[0, 1, 0, 1]);
        assert_eq!(canvas.depth(), 1);
    }

    #[test]
    fn test_floyd_steinberg_spreads_error() {
        // mid gray over black/white alternates once error accumulates
        let pixels = vec![128u8; 4 * 3];
        let opts = DitherOptions {
            diffusion: DiffusionMethod::FS,
            optimize: false,
            ..Default::default()
        };
        let canvas = apply_palette(&pixels, 4, 1, 3, &two_grays(), &opts, None).unwrap();
        assert_eq!(canvas.pixels(), &[1, 0, 1, 0]);
    }

    #[test]
    fn test_every_kernel_is_deterministic() {
        let pixels = gradient(17, 13);
        let palette = Arc::new(
            make_palette(&pixels, 17, 13, 3, 8, &QuantizeOptions::default()).unwrap(),
        );
        for diffusion in [
            DiffusionMethod::Atkinson,
            DiffusionMethod::FS,
            DiffusionMethod::JaJuNi,
            DiffusionMethod::Stucki,
            DiffusionMethod::Burkes,
        ] {
            let opts = DitherOptions {
                diffusion,
                ..Default::default()
            };
            let a = apply_palette(&pixels, 17, 13, 3, &palette, &opts, None).unwrap();
            let b = apply_palette(&pixels, 17, 13, 3, &palette, &opts, None).unwrap();
            assert_eq!(a.pixels(), b.pixels());
            assert!(a.pixels().iter().all(|&i| (i as usize) < palette.len()));
        }
    }

    #[test]
    fn test_canvas_shares_palette() {
        let palette = two_grays();
        let canvas = apply_palette(&[0, 0, 0], 1, 1, 3, &palette, &DitherOptions::default(), None)
            .unwrap();
        assert!(Arc::ptr_eq(canvas.palette(), &palette));
        assert_eq!(Arc::strong_count(&palette), 2);
        drop(canvas);
        assert_eq!(Arc::strong_count(&palette), 1);
    }

    #[test]
    fn test_rejects_bad_input() {
        let palette = two_grays();
        let opts = DitherOptions::default();
        assert!(apply_palette(&[0; 5], 2, 1, 3, &palette, &opts, None).is_err());
        assert!(apply_palette(&[0; 2], 2, 1, 1, &palette, &opts, None).is_err());
        assert!(apply_palette(&[], 0, 1, 3, &palette, &opts, None).is_err());
    }

    #[test]
    fn test_dither_object_pipeline() {
        let rgba = [255, 0, 0, 255, 0, 255, 0, 255, 255, 0, 0, 255];
        let mut dither = Dither::new(4).unwrap();
        dither.prepare_palette(&rgba, 3, 1, 4).unwrap();
        assert_eq!(dither.palette().len(), 2);
        assert!(dither.palette().is_optimized());

        let canvas = dither.apply_palette(&rgba, 3, 1, 4).unwrap();
        assert_eq!(canvas.pixels(), &[0, 1, 0]);

        let source = Canvas::from_pixels(
            PixelBuffer::Owned(rgba.to_vec()),
            3,
            1,
            4,
            Arc::clone(dither.palette()),
        )
        .unwrap();
        let again = dither.apply_palette_to(&source).unwrap();
        assert_eq!(again.pixels(), canvas.pixels());
        assert!(dither.apply_palette_to(&again).is_err());
    }

    #[test]
    fn test_masked_pixels_take_no_part_in_diffusion() {
        let mut dither = Dither::with_palette(two_grays());
        dither.set_diffusion(DiffusionMethod::FS);
        let mask = [true, false, false, true];
        let hidden_light = [200, 200, 200, 100, 100, 100, 128, 128, 128, 255, 255, 255];
        let hidden_dark = [10, 10, 10, 100, 100, 100, 128, 128, 128, 0, 0, 0];
        let a = dither
            .apply_palette_masked(&hidden_light, 4, 1, 3, &mask)
            .unwrap();
        let b = dither
            .apply_palette_masked(&hidden_dark, 4, 1, 3, &mask)
            .unwrap();
        assert_eq!(&a.pixels()[1..3], &b.pixels()[1..3]);
        // 100 maps to black and pushes 43 of error into the next pixel
        assert_eq!(&a.pixels()[1..3], &[0, 1]);

        assert!(matches!(
            dither.apply_palette_masked(&hidden_dark, 4, 1, 3, &mask[..3]),
            Err(SixelError::BufferSizeMismatch {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_unprepared_dither_fails() {
        let mut dither = Dither::new(2).unwrap();
        assert!(dither.apply_palette(&[0, 0, 0], 1, 1, 3).is_err());
    }
}
