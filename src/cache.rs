//! Memoized color -> palette index lookups for the ditherer.

use std::collections::HashMap;

use crate::color::Rgb;
use crate::palette::Palette;
use crate::{Result, SixelError};

/// Key precision of a [`ColorCache`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CachePrecision {
    /// Every distinct color is resolved on its own; lookups are exact.
    #[default]
    Exact,
    /// Colors are keyed by their top five bits per channel. Nearby colors share
    /// one answer, which is faster but may pick a slightly worse entry near
    /// palette boundaries.
    Reduced,
}

const REDUCED_TABLE_SIZE: usize = 1 << 15;

/// A lazily populated mapping from colors to previously resolved palette indices.
///
/// A cache is only meaningful for the palette it was filled against; use
/// [`ColorCache::clear`] (or a fresh cache) when the palette changes.
#[derive(Clone, Debug)]
pub struct ColorCache {
    precision: CachePrecision,
    exact: HashMap<u32, u8>,
    // index + 1, zero means empty
    reduced: Vec<u16>,
}

impl ColorCache {
    pub fn new(precision: CachePrecision) -> Result<Self> {
        let reduced = match precision {
            CachePrecision::Exact => Vec::new(),
            CachePrecision::Reduced => {
                let mut table = Vec::new();
                table
                    .try_reserve_exact(REDUCED_TABLE_SIZE)
                    .map_err(|_| SixelError::AllocationFailed {
                        bytes: REDUCED_TABLE_SIZE * 2,
                    })?;
                table.resize(REDUCED_TABLE_SIZE, 0u16);
                table
            }
        };
        Ok(Self {
            precision,
            exact: HashMap::new(),
            reduced,
        })
    }

    #[inline]
    pub fn precision(&self) -> CachePrecision {
        self.precision
    }

    /// Number of populated entries.
    pub fn len(&self) -> usize {
        match self.precision {
            CachePrecision::Exact => self.exact.len(),
            CachePrecision::Reduced => self.reduced.iter().filter(|&&v| v != 0).count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.exact.clear();
        self.reduced.iter_mut().for_each(|v| *v = 0);
    }

    /// Resolves `color` against `palette`, consulting and filling the cache.
    pub fn lookup(&mut self, palette: &Palette, color: Rgb) -> usize {
        match self.precision {
            CachePrecision::Exact => {
                let key = color.packed();
                if let Some(&index) = self.exact.get(&key) {
                    if (index as usize) < palette.len() {
                        return index as usize;
                    }
                }
                let index = palette.nearest(color);
                self.exact.insert(key, index as u8);
                index
            }
            CachePrecision::Reduced => {
                let key = reduced_key(color);
                let cached = self.reduced[key] as usize;
                if cached != 0 && cached <= palette.len() {
                    return cached - 1;
                }
                let index = palette.nearest(color);
                self.reduced[key] = index as u16 + 1;
                index
            }
        }
    }
}

#[inline]
fn reduced_key(color: Rgb) -> usize {
    ((color.r as usize >> 3) << 10) | ((color.g as usize >> 3) << 5) | (color.b as usize >> 3)
}
