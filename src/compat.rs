//! Raw-array entry points kept for callers of the older quantizer API.
//!
//! Both functions are thin wrappers over [`make_palette`] and the ditherer;
//! palettes cross the boundary as flat `r, g, b` byte arrays.

#![allow(deprecated)]

use crate::cache::ColorCache;
use crate::color::Rgb;
use crate::dither::{apply_into, DiffusionMethod, DitherOptions, Image};
use crate::palette::Palette;
use crate::quant::{make_palette, MethodForLargest, MethodForRep, Quality, QuantizeOptions};
use crate::{check_image, Result, SixelError, SIXEL_PALETTE_MAX};

/// Builds a palette and returns it as `ncolors * 3` bytes.
///
/// `ncolors` receives the number of colors produced and `origcolors` the
/// number of distinct colors in the image.
#[deprecated(note = "use `make_palette`, which returns a `Palette`")]
#[allow(clippy::too_many_arguments)]
pub fn lsq_make_palette(
    data: &[u8],
    width: usize,
    height: usize,
    depth: usize,
    reqcolors: usize,
    ncolors: &mut usize,
    origcolors: &mut usize,
    method_for_largest: MethodForLargest,
    method_for_rep: MethodForRep,
    quality: Quality,
) -> Result<Vec<u8>> {
    let opts = QuantizeOptions {
        method_for_largest,
        method_for_rep,
        quality,
        ..Default::default()
    };
    let palette = make_palette(data, width, height, depth, reqcolors, &opts)?;
    *ncolors = palette.len();
    *origcolors = palette.origcolors();
    Ok(palette.to_bytes())
}

/// Writes one palette index per pixel of `data` into `result`.
///
/// `palette` holds at least `ncolor * 3` bytes. `foptimize` selects the
/// reduced-precision cache when no `cache` is passed in.
#[deprecated(note = "use `apply_palette` or `Dither`")]
#[allow(clippy::too_many_arguments)]
pub fn lsq_apply_palette(
    data: &[u8],
    width: usize,
    height: usize,
    depth: usize,
    palette: &[u8],
    ncolor: usize,
    method_for_diffuse: DiffusionMethod,
    foptimize: bool,
    cache: Option<&mut ColorCache>,
    result: &mut [u8],
) -> Result<()> {
    check_image(data, width, height, depth)?;
    if ncolor == 0 || ncolor > SIXEL_PALETTE_MAX {
        return Err(SixelError::InvalidColorCount(ncolor));
    }
    if palette.len() < ncolor * 3 {
        return Err(SixelError::BufferSizeMismatch {
            expected: ncolor * 3,
            actual: palette.len(),
        });
    }
    if result.len() != width * height {
        return Err(SixelError::BufferSizeMismatch {
            expected: width * height,
            actual: result.len(),
        });
    }

    let palette = Palette::from_colors(
        palette[..ncolor * 3]
            .chunks_exact(3)
            .map(Rgb::from_pixel)
            .collect(),
    )?;
    let opts = DitherOptions {
        diffusion: method_for_diffuse,
        quality: Quality::Auto,
        optimize: foptimize,
    };
    let method = method_for_diffuse.resolve(opts.quality, palette.is_optimized());
    let image = Image {
        pixels: data,
        width,
        height,
        depth,
        mask: None,
    };
    match cache {
        Some(cache) => apply_into(&image, &palette, method, cache, result),
        None => {
            let mut cache = ColorCache::new(opts.cache_precision(&palette))?;
            apply_into(&image, &palette, method, &mut cache, result)
        }
    }
}
