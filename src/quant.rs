//! Median-cut color quantization.
//!
//! The palette is built from a histogram of the image's distinct colors. The
//! occupied color space starts as a single box; the box judged largest is
//! split at the population median along its widest channel until the
//! requested number of boxes exists or nothing can be split further. Each box
//! then contributes one representative color.
//!
//! The algorithm follows Heckbert, "Color Image Quantization for Frame Buffer
//! Display", SIGGRAPH '82.

use std::collections::HashMap;

use crate::color::Rgb;
use crate::palette::Palette;
use crate::{check_image, Result, SixelError, SIXEL_PALETTE_MAX};

/// How the "largest" box and its split channel are chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MethodForLargest {
    /// Pick by quality and image size
    #[default]
    Auto,
    /// Plain numeric range of each RGB channel
    Norm,
    /// Channel ranges weighted by their contribution to luminance
    Lum,
}

/// How each final box is reduced to one palette color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MethodForRep {
    /// Pick by quality and image size
    #[default]
    Auto,
    /// Geometric center of the box bounds
    CenterBox,
    /// Mean of the distinct colors in the box
    AverageColors,
    /// Mean of every pixel that fell in the box
    AveragePixels,
}

/// Speed/quality trade-off for quantization and dithering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Quality {
    #[default]
    Auto,
    High,
    Low,
}

/// Policy selectors for [`make_palette`].
#[derive(Clone, Debug)]
pub struct QuantizeOptions {
    pub method_for_largest: MethodForLargest,
    pub method_for_rep: MethodForRep,
    pub quality: Quality,
    /// Images with at most this many pixels count as "small" when resolving
    /// the `Auto` policies under `Quality::Auto`.
    pub small_image_pixels: usize,
}

/// 512x512
pub const DEFAULT_SMALL_IMAGE_PIXELS: usize = 512 * 512;

impl Default for QuantizeOptions {
    fn default() -> Self {
        Self {
            method_for_largest: MethodForLargest::Auto,
            method_for_rep: MethodForRep::Auto,
            quality: Quality::Auto,
            small_image_pixels: DEFAULT_SMALL_IMAGE_PIXELS,
        }
    }
}

impl QuantizeOptions {
    fn prefers_accuracy(&self, pixel_count: usize) -> bool {
        match self.quality {
            Quality::High => true,
            Quality::Low => false,
            Quality::Auto => pixel_count <= self.small_image_pixels,
        }
    }

    /// Resolves `Auto` selectors for an image of `pixel_count` pixels.
    pub fn resolve(&self, pixel_count: usize) -> (MethodForLargest, MethodForRep) {
        let accurate = self.prefers_accuracy(pixel_count);
        let largest = match self.method_for_largest {
            MethodForLargest::Auto if accurate => MethodForLargest::Lum,
            MethodForLargest::Auto => MethodForLargest::Norm,
            other => other,
        };
        let rep = match self.method_for_rep {
            MethodForRep::Auto if accurate => MethodForRep::AveragePixels,
            MethodForRep::Auto if self.quality == Quality::Low => MethodForRep::CenterBox,
            MethodForRep::Auto => MethodForRep::AverageColors,
            other => other,
        };
        (largest, rep)
    }
}

const LUMINANCE_WEIGHTS: [f64; 3] = [0.2989, 0.5866, 0.1145];

#[derive(Clone, Copy, Debug)]
struct HistogramEntry {
    color: Rgb,
    count: u32,
}

impl HistogramEntry {
    #[inline]
    fn channel(&self, plane: usize) -> u8 {
        match plane {
            0 => self.color.r,
            1 => self.color.g,
            _ => self.color.b,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct ColorBox {
    start: usize,
    len: usize,
    sum: u64,
    min: [u8; 3],
    max: [u8; 3],
}

impl ColorBox {
    fn new(table: &[HistogramEntry], start: usize, len: usize) -> Self {
        let entries = &table[start..start + len];
        let mut min = [u8::MAX; 3];
        let mut max = [0u8; 3];
        let mut sum = 0u64;
        for entry in entries {
            sum += entry.count as u64;
            for plane in 0..3 {
                let v = entry.channel(plane);
                min[plane] = min[plane].min(v);
                max[plane] = max[plane].max(v);
            }
        }
        Self {
            start,
            len,
            sum,
            min,
            max,
        }
    }

    /// Widest channel and its (possibly weighted) spread.
    fn largest_dimension(&self, method: MethodForLargest) -> (usize, f64) {
        let mut plane = 0;
        let mut spread = 0.0;
        for p in 0..3 {
            let range = (self.max[p] - self.min[p]) as f64;
            let weighted = match method {
                MethodForLargest::Lum => range * LUMINANCE_WEIGHTS[p],
                _ => range,
            };
            if weighted > spread {
                spread = weighted;
                plane = p;
            }
        }
        (plane, spread)
    }
}

/// Builds a palette of at most `reqcolors` colors for a `depth` 3 (RGB) or 4
/// (RGBA, alpha ignored) image.
///
/// When the image has no more distinct colors than requested, those colors are
/// used verbatim in order of first appearance and the palette is flagged as
/// optimized.
pub fn make_palette(
    pixels: &[u8],
    width: usize,
    height: usize,
    depth: usize,
    reqcolors: usize,
    opts: &QuantizeOptions,
) -> Result<Palette> {
    check_image(pixels, width, height, depth)?;
    if reqcolors == 0 || reqcolors > SIXEL_PALETTE_MAX {
        return Err(SixelError::InvalidColorCount(reqcolors));
    }

    let mut table = compute_histogram(pixels, depth);
    let origcolors = table.len();
    log::debug!(
        "quantize {}x{}: {} distinct colors, {} requested",
        width,
        height,
        origcolors,
        reqcolors
    );

    if origcolors <= reqcolors {
        let colors = table.iter().map(|e| e.color).collect();
        return Ok(Palette::from_quantizer(colors, reqcolors, origcolors, true));
    }

    let (largest, rep) = opts.resolve(width * height);
    if opts.quality == Quality::Low {
        table = reduce_histogram(&table);
        log::trace!("low quality: histogram reduced to {} buckets", table.len());
    }
    log::debug!("median cut with {:?} / {:?}", largest, rep);

    let colors = median_cut(&mut table, reqcolors, largest, rep);
    Ok(Palette::from_quantizer(colors, reqcolors, origcolors, false))
}

/// Distinct colors with their pixel counts, in order of first appearance.
fn compute_histogram(pixels: &[u8], depth: usize) -> Vec<HistogramEntry> {
    let mut slots: HashMap<u32, usize> = HashMap::new();
    let mut table: Vec<HistogramEntry> = Vec::new();

    for pixel in pixels.chunks_exact(depth) {
        let color = Rgb::from_pixel(pixel);
        match slots.get(&color.packed()) {
            Some(&slot) => {
                let entry = &mut table[slot];
                entry.count = entry.count.saturating_add(1);
            }
            None => {
                slots.insert(color.packed(), table.len());
                table.push(HistogramEntry { color, count: 1 });
            }
        }
    }
    table
}

/// Merges colors that agree in their top five bits per channel.
fn reduce_histogram(table: &[HistogramEntry]) -> Vec<HistogramEntry> {
    let mut slots: HashMap<u32, usize> = HashMap::new();
    let mut reduced: Vec<HistogramEntry> = Vec::new();
    for entry in table {
        let key = (entry.color.packed() >> 3) & 0x1f1f1f;
        match slots.get(&key) {
            Some(&slot) => {
                let bucket = &mut reduced[slot];
                bucket.count = bucket.count.saturating_add(entry.count);
            }
            None => {
                slots.insert(key, reduced.len());
                reduced.push(*entry);
            }
        }
    }
    reduced
}

fn median_cut(
    table: &mut [HistogramEntry],
    newcolors: usize,
    largest: MethodForLargest,
    rep: MethodForRep,
) -> Vec<Rgb> {
    let mut boxes = Vec::with_capacity(newcolors);
    boxes.push(ColorBox::new(table, 0, table.len()));

    while boxes.len() < newcolors {
        let mut chosen: Option<(usize, usize)> = None;
        let mut best_score = 0.0;
        for (bi, b) in boxes.iter().enumerate() {
            if b.len < 2 {
                continue;
            }
            let (plane, spread) = b.largest_dimension(largest);
            let score = spread * b.sum as f64;
            if chosen.is_none() || score > best_score {
                chosen = Some((bi, plane));
                best_score = score;
            }
        }
        let Some((bi, plane)) = chosen else {
            break;
        };
        let (lower, upper) = split_box(table, boxes[bi], plane);
        log::trace!(
            "split box {} on plane {}: {}+{} colors",
            bi,
            plane,
            lower.len,
            upper.len
        );
        boxes[bi] = lower;
        boxes.push(upper);
    }

    boxes
        .iter()
        .map(|b| representative(&table[b.start..b.start + b.len], b, rep))
        .collect()
}

/// Sorts the box along `plane` and cuts it where about half of its pixels
/// (not colors) fall on each side. Both halves keep at least one color.
fn split_box(table: &mut [HistogramEntry], b: ColorBox, plane: usize) -> (ColorBox, ColorBox) {
    let entries = &mut table[b.start..b.start + b.len];
    entries.sort_unstable_by_key(|e| (e.channel(plane), e.color.packed()));

    let half = b.sum / 2;
    let mut lowersum = entries[0].count as u64;
    let mut median = 1;
    while median < b.len - 1 && lowersum < half {
        lowersum += entries[median].count as u64;
        median += 1;
    }

    (
        ColorBox::new(table, b.start, median),
        ColorBox::new(table, b.start + median, b.len - median),
    )
}

fn representative(entries: &[HistogramEntry], b: &ColorBox, rep: MethodForRep) -> Rgb {
    match rep {
        MethodForRep::CenterBox => Rgb::new(
            ((b.min[0] as u16 + b.max[0] as u16) / 2) as u8,
            ((b.min[1] as u16 + b.max[1] as u16) / 2) as u8,
            ((b.min[2] as u16 + b.max[2] as u16) / 2) as u8,
        ),
        MethodForRep::AverageColors => {
            let mut sum = [0u64; 3];
            for e in entries {
                for (plane, s) in sum.iter_mut().enumerate() {
                    *s += e.channel(plane) as u64;
                }
            }
            let n = entries.len() as u64;
            Rgb::new((sum[0] / n) as u8, (sum[1] / n) as u8, (sum[2] / n) as u8)
        }
        MethodForRep::Auto | MethodForRep::AveragePixels => {
            let mut sum = [0u64; 3];
            let mut n = 0u64;
            for e in entries {
                n += e.count as u64;
                for (plane, s) in sum.iter_mut().enumerate() {
                    *s += e.channel(plane) as u64 * e.count as u64;
                }
            }
            let n = n.max(1);
            Rgb::new((sum[0] / n) as u8, (sum[1] / n) as u8, (sum[2] / n) as u8)
        }
    }
}
