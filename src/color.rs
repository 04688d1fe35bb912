//! Color triples and the SIXEL color-space conversions (percent RGB and HLS).

/// An 8-bit RGB triple.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    #[inline]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Reads the first three channels of a pixel; any alpha channel is ignored.
    #[inline]
    pub fn from_pixel(pixel: &[u8]) -> Self {
        Self::new(pixel[0], pixel[1], pixel[2])
    }

    #[inline]
    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    /// Squared Euclidean distance in RGB space.
    #[inline]
    pub fn distance_sq(self, other: Rgb) -> u32 {
        let dr = self.r as i32 - other.r as i32;
        let dg = self.g as i32 - other.g as i32;
        let db = self.b as i32 - other.b as i32;
        (dr * dr + dg * dg + db * db) as u32
    }

    /// Packs the triple as `0xRRGGBB`.
    #[inline]
    pub fn packed(self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }

    /// RGB components in the SIXEL 0-100 percent scale.
    pub fn to_percent(self) -> [u32; 3] {
        [
            byte_to_percent(self.r),
            byte_to_percent(self.g),
            byte_to_percent(self.b),
        ]
    }

    /// Builds a color from SIXEL percent components; values are clamped to 0-100.
    pub fn from_percent(r: i32, g: i32, b: i32) -> Self {
        Self::new(percent_to_byte(r), percent_to_byte(g), percent_to_byte(b))
    }

    /// Builds a color from SIXEL HLS components (hue 0-360 with blue at 0,
    /// lightness and saturation 0-100).
    pub fn from_hls(h: i32, l: i32, s: i32) -> Self {
        let [r, g, b] = hls_to_rgb(h, l, s);
        Self::new(r, g, b)
    }

    /// Converts to SIXEL HLS components.
    pub fn to_hls(self) -> [u32; 3] {
        rgb_to_hls(self)
    }
}

impl From<[u8; 3]> for Rgb {
    fn from(c: [u8; 3]) -> Self {
        Self::new(c[0], c[1], c[2])
    }
}

impl From<Rgb> for [u8; 3] {
    fn from(c: Rgb) -> Self {
        c.to_array()
    }
}

pub(crate) fn percent_to_byte(value: i32) -> u8 {
    let clamped = value.clamp(0, 100);
    ((clamped * 255 + 50) / 100) as u8
}

pub(crate) fn byte_to_percent(value: u8) -> u32 {
    (value as u32 * 100 + 127) / 255
}

fn hls_to_rgb(h: i32, l: i32, s: i32) -> [u8; 3] {
    if s <= 0 {
        let gray = percent_to_byte(l);
        return [gray, gray, gray];
    }

    // SIXEL puts blue at hue 0; shift so that red is at 0.
    let hue = (h + 240).rem_euclid(360);
    let hue = hue as f64 / 360.0;
    let lum = (l.clamp(0, 100) as f64) / 100.0;
    let sat = (s.clamp(0, 100) as f64) / 100.0;

    let q = if lum < 0.5 {
        lum * (1.0 + sat)
    } else {
        lum + sat - lum * sat
    };
    let p = 2.0 * lum - q;

    let r = hue_to_rgb(p, q, hue + 1.0 / 3.0);
    let g = hue_to_rgb(p, q, hue);
    let b = hue_to_rgb(p, q, hue - 1.0 / 3.0);

    [
        (r * 255.0 + 0.5).floor().clamp(0.0, 255.0) as u8,
        (g * 255.0 + 0.5).floor().clamp(0.0, 255.0) as u8,
        (b * 255.0 + 0.5).floor().clamp(0.0, 255.0) as u8,
    ]
}

fn hue_to_rgb(p: f64, q: f64, mut t: f64) -> f64 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        return p + (q - p) * 6.0 * t;
    }
    if t < 1.0 / 2.0 {
        return q;
    }
    if t < 2.0 / 3.0 {
        return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
    }
    p
}

fn rgb_to_hls(c: Rgb) -> [u32; 3] {
    let r = c.r as f64 / 255.0;
    let g = c.g as f64 / 255.0;
    let b = c.b as f64 / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let lum = (max + min) / 2.0;

    if max == min {
        return [0, (lum * 100.0).round() as u32, 0];
    }

    let d = max - min;
    let sat = if lum > 0.5 {
        d / (2.0 - max - min)
    } else {
        d / (max + min)
    };
    let sector = if max == r {
        (g - b) / d + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };
    let hue = sector * 60.0;

    // Back to the SIXEL hue origin (blue at 0).
    let hue = (hue.round() as i32 + 120).rem_euclid(360);
    [
        hue as u32,
        (lum * 100.0).round() as u32,
        (sat * 100.0).round() as u32,
    ]
}
