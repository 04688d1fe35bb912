//! Fixed-capacity color table shared between the ditherer, canvases and the decoder.

use std::sync::Arc;

use crate::color::{percent_to_byte, Rgb};
use crate::{Result, SixelError, SIXEL_PALETTE_MAX};

/// Shared handle to a [`Palette`].
///
/// Every holder (a [`Dither`](crate::Dither), each [`Canvas`](crate::Canvas))
/// keeps one strong reference; the table is freed when the last one is dropped.
/// Mutating through a shared handle uses [`Arc::make_mut`], so a holder that
/// edits an entry never changes the colors another holder sees.
pub type SharedPalette = Arc<Palette>;

/// An ordered table of at most 256 colors.
///
/// `ncolors` is the number of entries actually present, `reqcolors` the number
/// the palette was asked for, and `origcolors` the number of distinct colors the
/// source image had before quantization (informational).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<Rgb>,
    reqcolors: usize,
    origcolors: usize,
    optimized: bool,
}

impl Palette {
    /// Creates an empty palette that will hold up to `reqcolors` entries.
    pub fn new(reqcolors: usize) -> Result<Self> {
        check_color_count(reqcolors)?;
        Ok(Self {
            colors: Vec::with_capacity(reqcolors),
            reqcolors,
            origcolors: 0,
            optimized: false,
        })
    }

    /// Creates a palette of `ncolors` entries all set to `color`.
    pub fn filled(ncolors: usize, color: Rgb) -> Result<Self> {
        check_color_count(ncolors)?;
        Ok(Self {
            colors: vec![color; ncolors],
            reqcolors: ncolors,
            origcolors: ncolors,
            optimized: false,
        })
    }

    /// Wraps an explicit list of colors.
    pub fn from_colors(colors: Vec<Rgb>) -> Result<Self> {
        check_color_count(colors.len())?;
        let n = colors.len();
        Ok(Self {
            colors,
            reqcolors: n,
            origcolors: n,
            optimized: false,
        })
    }

    pub(crate) fn from_quantizer(
        colors: Vec<Rgb>,
        reqcolors: usize,
        origcolors: usize,
        optimized: bool,
    ) -> Self {
        debug_assert!(colors.len() <= reqcolors && reqcolors <= SIXEL_PALETTE_MAX);
        Self {
            colors,
            reqcolors,
            origcolors,
            optimized,
        }
    }

    /// The 256-entry table a SIXEL terminal starts with: the 16 VT340 colors,
    /// a 6x6x6 color cube and a 24-step gray ramp.
    pub fn sixel_default() -> Self {
        const BASE: &[(i32, i32, i32)] = &[
            (0, 0, 0),
            (20, 20, 80),
            (80, 13, 13),
            (20, 80, 20),
            (80, 20, 80),
            (20, 80, 80),
            (80, 80, 20),
            (53, 53, 53),
            (26, 26, 26),
            (33, 33, 60),
            (60, 26, 26),
            (33, 60, 33),
            (60, 33, 60),
            (33, 60, 60),
            (60, 60, 33),
            (80, 80, 80),
        ];

        let mut colors = Vec::with_capacity(SIXEL_PALETTE_MAX);
        colors.extend(BASE.iter().map(|&(r, g, b)| Rgb::from_percent(r, g, b)));

        for r in 0..6 {
            for g in 0..6 {
                for b in 0..6 {
                    colors.push(Rgb::from_percent(r * 20, g * 20, b * 20));
                }
            }
        }

        for level in 0..24 {
            if colors.len() >= SIXEL_PALETTE_MAX {
                break;
            }
            let value = percent_to_byte(level * 100 / 23);
            colors.push(Rgb::new(value, value, value));
        }
        colors.resize(SIXEL_PALETTE_MAX, Rgb::new(255, 255, 255));

        Self {
            colors,
            reqcolors: SIXEL_PALETTE_MAX,
            origcolors: SIXEL_PALETTE_MAX,
            optimized: false,
        }
    }

    /// Number of colors present (`ncolors`).
    #[inline]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    #[inline]
    pub fn reqcolors(&self) -> usize {
        self.reqcolors
    }

    #[inline]
    pub fn origcolors(&self) -> usize {
        self.origcolors
    }

    /// True when the palette holds the source image's colors verbatim.
    #[inline]
    pub fn is_optimized(&self) -> bool {
        self.optimized
    }

    #[inline]
    pub fn colors(&self) -> &[Rgb] {
        &self.colors
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<Rgb> {
        self.colors.get(index).copied()
    }

    /// Replaces an existing entry.
    pub fn set(&mut self, index: usize, color: Rgb) -> Result<()> {
        let ncolors = self.colors.len();
        let slot = self
            .colors
            .get_mut(index)
            .ok_or(SixelError::PaletteIndexOutOfRange { index, ncolors })?;
        *slot = color;
        self.optimized = false;
        Ok(())
    }

    /// Appends an entry and returns its index.
    pub fn push(&mut self, color: Rgb) -> Result<usize> {
        if self.colors.len() >= SIXEL_PALETTE_MAX {
            return Err(SixelError::InvalidColorCount(self.colors.len() + 1));
        }
        self.colors.push(color);
        self.reqcolors = self.reqcolors.max(self.colors.len());
        Ok(self.colors.len() - 1)
    }

    /// Index of the entry nearest to `color` by squared Euclidean distance.
    /// Ties go to the lowest index.
    pub fn nearest(&self, color: Rgb) -> usize {
        let mut best = 0;
        let mut best_distance = u32::MAX;
        for (i, candidate) in self.colors.iter().enumerate() {
            let distance = color.distance_sq(*candidate);
            if distance < best_distance {
                best_distance = distance;
                best = i;
                if distance == 0 {
                    break;
                }
            }
        }
        best
    }

    /// Flattens the table to `r, g, b` bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.colors.iter().flat_map(|c| c.to_array()).collect()
    }
}

fn check_color_count(n: usize) -> Result<()> {
    if n == 0 || n > SIXEL_PALETTE_MAX {
        return Err(SixelError::InvalidColorCount(n));
    }
    Ok(())
}
