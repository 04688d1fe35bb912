//! SIXEL encoder.
//!
//! [`encode`] writes an indexed [`Canvas`] band by band: each six-row band is
//! split into per-color runs, which are emitted left to right in as few
//! `$`-separated passes as possible. [`sixel_encode`] runs the whole pipeline
//! (quantize, dither, encode) on an RGBA buffer.

use std::io;
use std::sync::Arc;

use crate::canvas::Canvas;
use crate::color::Rgb;
use crate::dither::{DiffusionMethod, Dither};
use crate::output::{ColorSpace, OutputContext, RunNode, RunPool, SixelSink, TerminalOptions};
use crate::palette::Palette;
use crate::quant::{MethodForLargest, MethodForRep, Quality, QuantizeOptions};
use crate::{check_image, try_alloc, Result, SixelError, SIXEL_BAND_HEIGHT, SIXEL_PALETTE_MAX};

/// Zero gaps shorter than this are kept inside a run instead of starting a
/// new one.
const RUN_GAP_LIMIT: usize = 10;

/// Options for [`sixel_encode`].
#[derive(Clone, Debug)]
pub struct EncodeOptions {
    /// Maximum number of colors in the palette (2-256).
    /// Fewer colors = smaller SIXEL output but less accurate colors.
    /// One slot is reserved for transparency when the image has any.
    pub max_colors: u16,

    /// Speed/quality trade-off for palette construction and dithering.
    pub quality: Quality,

    pub diffusion: DiffusionMethod,
    pub method_for_largest: MethodForLargest,
    pub method_for_rep: MethodForRep,

    /// Use the reduced-precision color cache while dithering. Faster, but
    /// colors near a palette boundary may resolve to a worse entry.
    pub optimize: bool,

    pub terminal: TerminalOptions,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            max_colors: 256,
            quality: Quality::Auto,
            diffusion: DiffusionMethod::Auto,
            method_for_largest: MethodForLargest::Auto,
            method_for_rep: MethodForRep::Auto,
            optimize: false,
            terminal: TerminalOptions::default(),
        }
    }
}

impl EncodeOptions {
    fn dither(&self, reqcolors: usize) -> Result<Dither> {
        let mut dither = Dither::new(reqcolors)?;
        dither.set_quantize_options(QuantizeOptions {
            method_for_largest: self.method_for_largest,
            method_for_rep: self.method_for_rep,
            quality: self.quality,
            ..Default::default()
        });
        dither.set_diffusion(self.diffusion);
        dither.set_optimize(self.optimize);
        Ok(dither)
    }
}

/// Encodes RGBA image data into a SIXEL byte stream.
///
/// Pixels with alpha below 128 are transparent: they are left unpainted and
/// the stream is introduced with `P2=1`, so the terminal keeps whatever was
/// behind them.
///
/// # Example
/// ```ignore
/// use sixel_codec::{sixel_encode, EncodeOptions};
///
/// let rgba = vec![255u8, 0, 0, 255, 0, 255, 0, 255]; // 2 pixels: red, green
/// let sixel = sixel_encode(&rgba, 2, 1, &EncodeOptions::default())?;
/// std::io::Write::write_all(&mut std::io::stdout(), &sixel)?;
/// ```
pub fn sixel_encode(
    rgba: &[u8],
    width: usize,
    height: usize,
    opts: &EncodeOptions,
) -> Result<Vec<u8>> {
    check_image(rgba, width, height, 4)?;
    let max_colors = check_max_colors(opts.max_colors)?;

    let transparent: Vec<bool> = rgba.chunks_exact(4).map(|c| c[3] < 128).collect();
    if !transparent.contains(&true) {
        return encode_true_color(rgba, width, height, 4, max_colors, opts);
    }

    // Build the palette from opaque pixels only.
    let opaque: Vec<u8> = rgba
        .chunks_exact(4)
        .filter(|c| c[3] >= 128)
        .flat_map(|c| [c[0], c[1], c[2]])
        .collect();
    log::debug!(
        "{} of {} pixels transparent",
        transparent.iter().filter(|&&t| t).count(),
        transparent.len()
    );

    let mut dither = if opaque.is_empty() {
        Dither::with_palette(Arc::new(Palette::from_colors(vec![Rgb::BLACK])?))
    } else {
        let mut dither = opts.dither(max_colors - 1)?;
        dither.prepare_palette(&opaque, opaque.len() / 3, 1, 3)?;
        dither
    };
    let mut canvas = dither.apply_palette_masked(rgba, width, height, 4, &transparent)?;

    let mut palette = (**canvas.palette()).clone();
    let key = palette.push(Rgb::BLACK)? as u8;
    canvas.set_palette(Arc::new(palette));
    for (index, &t) in canvas.pixels_mut().iter_mut().zip(&transparent) {
        if t {
            *index = key;
        }
    }
    canvas.set_keycolor(Some(key));

    encode_to_vec(&canvas, &opts.terminal)
}

/// Encodes RGB image data (3 bytes per pixel) into a SIXEL byte stream.
pub fn sixel_encode_rgb(
    rgb: &[u8],
    width: usize,
    height: usize,
    opts: &EncodeOptions,
) -> Result<Vec<u8>> {
    check_image(rgb, width, height, 3)?;
    let max_colors = check_max_colors(opts.max_colors)?;
    encode_true_color(rgb, width, height, 3, max_colors, opts)
}

fn check_max_colors(max_colors: u16) -> Result<usize> {
    let n = max_colors as usize;
    if !(2..=SIXEL_PALETTE_MAX).contains(&n) {
        return Err(SixelError::InvalidColorCount(n));
    }
    Ok(n)
}

fn encode_true_color(
    pixels: &[u8],
    width: usize,
    height: usize,
    depth: usize,
    max_colors: usize,
    opts: &EncodeOptions,
) -> Result<Vec<u8>> {
    let mut dither = opts.dither(max_colors)?;
    dither.prepare_palette(pixels, width, height, depth)?;
    let canvas = dither.apply_palette(pixels, width, height, depth)?;
    encode_to_vec(&canvas, &opts.terminal)
}

fn encode_to_vec(canvas: &Canvas<'_>, terminal: &TerminalOptions) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut context = OutputContext::with_options(&mut out, terminal.clone());
    encode(canvas, &mut context)?;
    Ok(out)
}

/// Encodes an indexed canvas (depth 1) through `output`.
///
/// Everything is validated before the first byte is written: the palette
/// must be non-empty and every pixel other than the key color must index an
/// existing palette entry.
pub fn encode<S: SixelSink>(canvas: &Canvas<'_>, output: &mut OutputContext<S>) -> Result<()> {
    if canvas.depth() != 1 {
        return Err(SixelError::UnsupportedDepth(canvas.depth()));
    }
    let palette = canvas.palette();
    if palette.is_empty() {
        return Err(SixelError::InconsistentImage(
            "palette has no colors".to_string(),
        ));
    }
    if let Some(index) = canvas.find_missing_index() {
        return Err(SixelError::PaletteIndexOutOfRange {
            index: index as usize,
            ncolors: palette.len(),
        });
    }

    let (width, height) = (canvas.width(), canvas.height());
    let keycolor = canvas.keycolor();
    let mut used = [false; SIXEL_PALETTE_MAX];
    for &p in canvas.pixels() {
        used[p as usize] = true;
    }
    if let Some(key) = keycolor {
        used[key as usize] = false;
    }
    log::debug!(
        "encode {}x{}: {} of {} colors used, keycolor {:?}",
        width,
        height,
        used.iter().filter(|&&u| u).count(),
        palette.len(),
        keycolor
    );

    output.begin_image(&used);
    output.put_scrolling_mode()?;
    output.put_dcs_start()?;
    let p2 = u8::from(keycolor.is_some());
    output.put_fmt(format_args!("0;{};0q\"1;1;{};{}", p2, width, height))?;

    let color_space = output.options().color_space;
    for (i, color) in palette.colors().iter().enumerate() {
        if !used[i] {
            continue;
        }
        let n = output.color_number(i as u8);
        match color_space {
            ColorSpace::Rgb => {
                let [r, g, b] = color.to_percent();
                output.put_fmt(format_args!("#{};2;{};{};{}", n, r, g, b))?;
            }
            ColorSpace::Hls => {
                let [h, l, s] = color.to_hls();
                output.put_fmt(format_args!("#{};1;{};{};{}", n, h, l, s))?;
            }
        }
    }

    let mut map = try_alloc(palette.len() * width, 0)?;
    let mut pool = std::mem::take(&mut output.pool);
    let result = encode_body(canvas, output, &mut pool, &mut map);
    output.pool = pool;
    result?;

    output.put_string_terminator()?;
    Ok(())
}

fn encode_body<S: SixelSink>(
    canvas: &Canvas<'_>,
    output: &mut OutputContext<S>,
    pool: &mut RunPool,
    map: &mut [u8],
) -> io::Result<()> {
    let (width, height) = (canvas.width(), canvas.height());
    let ncolors = canvas.palette().len();
    let keycolor = canvas.keycolor();
    let pixels = canvas.pixels();

    for (band, y0) in (0..height).step_by(SIXEL_BAND_HEIGHT).enumerate() {
        if band > 0 {
            output.put_byte(b'-')?;
        }

        let rows = (height - y0).min(SIXEL_BAND_HEIGHT);
        let mut band_colors = [false; SIXEL_PALETTE_MAX];
        for dy in 0..rows {
            let row = &pixels[(y0 + dy) * width..(y0 + dy + 1) * width];
            for (x, &p) in row.iter().enumerate() {
                if Some(p) == keycolor {
                    continue;
                }
                map[p as usize * width + x] |= 1 << dy;
                band_colors[p as usize] = true;
            }
        }

        pool.active.clear();
        for c in (0..ncolors).filter(|&c| band_colors[c]) {
            collect_runs(&map[c * width..(c + 1) * width], c as u8, &mut pool.active);
        }
        // stable: equal spans keep ascending color order
        pool.active.sort_by(|a, b| a.sx.cmp(&b.sx).then(b.mx.cmp(&a.mx)));
        log::trace!("band {}: {} runs", band, pool.active.len());

        emit_band(output, pool, map, width)?;

        for c in (0..ncolors).filter(|&c| band_colors[c]) {
            map[c * width..(c + 1) * width].fill(0);
        }
        output.flush_run()?;
    }
    Ok(())
}

/// Splits one color's column masks into runs. A run starts at a painted
/// column and swallows gaps of fewer than [`RUN_GAP_LIMIT`] empty columns.
fn collect_runs(row: &[u8], pal: u8, runs: &mut Vec<RunNode>) {
    let width = row.len();
    let mut sx = 0;
    while sx < width {
        if row[sx] == 0 {
            sx += 1;
            continue;
        }
        let mut mx = sx + 1;
        loop {
            while mx < width && row[mx] != 0 {
                mx += 1;
            }
            let mut gap_end = mx;
            while gap_end < width && row[gap_end] == 0 {
                gap_end += 1;
            }
            if gap_end - mx >= RUN_GAP_LIMIT || gap_end >= width {
                break;
            }
            mx = gap_end;
        }
        runs.push(RunNode { pal, sx, mx });
        sx = mx;
    }
}

/// Writes the band's runs in left-to-right passes; a run that starts left of
/// the cursor waits for the next pass after a `$`.
fn emit_band<S: SixelSink>(
    output: &mut OutputContext<S>,
    pool: &mut RunPool,
    map: &[u8],
    width: usize,
) -> io::Result<()> {
    let mut x = 0;
    while !pool.active.is_empty() {
        if x > pool.active[0].sx {
            output.put_byte(b'$')?;
            x = 0;
        }
        pool.deferred.clear();
        for node in pool.active.drain(..) {
            if node.sx < x {
                pool.deferred.push(node);
                continue;
            }
            let row = &map[node.pal as usize * width..(node.pal as usize + 1) * width];
            x = put_node(output, x, node, row)?;
        }
        std::mem::swap(&mut pool.active, &mut pool.deferred);
    }
    Ok(())
}

fn put_node<S: SixelSink>(
    output: &mut OutputContext<S>,
    mut x: usize,
    node: RunNode,
    row: &[u8],
) -> io::Result<usize> {
    output.select_color(node.pal)?;
    while x < node.sx {
        output.put_pixel(0)?;
        x += 1;
    }
    while x < node.mx {
        output.put_pixel(row[x])?;
        x += 1;
    }
    output.flush_run()?;
    Ok(x)
}
