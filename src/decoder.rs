//! SIXEL decoder.
//!
//! A single pass over the input drives an explicit state machine
//! ([`ParserState`]). Any byte that is not valid in the current state aborts
//! the decode with [`SixelError::Malformed`]; nothing partial is returned.

use std::fmt;
use std::sync::Arc;

use crate::canvas::{Canvas, PixelBuffer};
use crate::color::Rgb;
use crate::palette::Palette;
use crate::{
    try_alloc, Result, SixelError, SIXEL_BAND_HEIGHT, SIXEL_HEIGHT_LIMIT, SIXEL_PALETTE_MAX,
    SIXEL_PIXEL_LIMIT, SIXEL_WIDTH_LIMIT,
};

const MAX_REPEAT: u32 = 0xffff;
const MAX_PARAMS: usize = 16;

const ESC: u8 = 0x1b;
const BEL: u8 = 0x07;
const CR: u8 = b'\r';
const LF: u8 = b'\n';
const DCS_8BIT: u8 = 0x90;
const ST_8BIT: u8 = 0x9c;

/// States of the SIXEL parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Before the DCS introducer
    Init,
    /// After `ESC`
    EscapeIntroducer,
    /// Reading `P1;P2;P3` up to `q`
    DcsParam,
    /// Reading `"Pan;Pad;Ph;Pv`
    RasterAttr,
    /// After `#`, a digit must follow
    ColorIntroducer,
    /// Reading `#Pc[;Pu;Px;Py;Pz]`
    ColorParam,
    /// After `!`
    RepeatIntroducer,
    /// Reading a repeat count; a data byte must follow
    RepeatParam,
    /// Sixel data and command introducers
    Data,
    Done,
    Error,
}

impl fmt::Display for ParserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParserState::Init => "init",
            ParserState::EscapeIntroducer => "escape introducer",
            ParserState::DcsParam => "DCS parameter",
            ParserState::RasterAttr => "raster attribute",
            ParserState::ColorIntroducer => "color introducer",
            ParserState::ColorParam => "color parameter",
            ParserState::RepeatIntroducer => "repeat introducer",
            ParserState::RepeatParam => "repeat parameter",
            ParserState::Data => "data",
            ParserState::Done => "done",
            ParserState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Pixel aspect ratio from SIXEL DCS parameters.
///
/// SIXEL images can specify a pixel aspect ratio that indicates how pixels
/// should be displayed. This is a historical feature from when terminals had
/// non-square pixels. Most modern terminals display square pixels and ignore
/// this setting, but the information is preserved for applications that need it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelAspectRatio {
    /// Pixel Aspect Numerator (vertical component)
    pub pan: u16,
    /// Pixel Aspect Denominator (horizontal component)
    pub pad: u16,
}

impl PixelAspectRatio {
    /// Pixel height relative to pixel width (pan/pad).
    #[inline]
    pub fn as_f32(&self) -> f32 {
        self.pan as f32 / self.pad as f32
    }

    #[inline]
    pub fn is_square(&self) -> bool {
        self.pan == self.pad
    }
}

impl Default for PixelAspectRatio {
    fn default() -> Self {
        Self { pan: 1, pad: 1 }
    }
}

/// A decoded SIXEL image with full metadata.
///
/// This struct contains the decoded pixel data along with additional
/// information from the SIXEL stream such as aspect ratio.
#[derive(Debug, Clone)]
pub struct SixelImage {
    /// RGBA pixel data (4 bytes per pixel: R, G, B, A)
    pub pixels: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub aspect_ratio: PixelAspectRatio,
    /// Whether the image uses transparency (P2=1)
    pub has_transparency: bool,
}

impl SixelImage {
    /// Returns the dimensions the image has once its pixels are made square.
    pub fn corrected_dimensions(&self) -> (usize, usize) {
        let PixelAspectRatio { pan, pad } = self.aspect_ratio;
        if pan == pad || pad == 0 {
            (self.width, self.height)
        } else {
            (self.width, self.height * pan as usize / pad as usize)
        }
    }
}

/// Decodes a SIXEL stream into an indexed canvas.
///
/// The input may be a complete `ESC P ... q ... ESC \` sequence (or its 8-bit
/// form), optionally preceded by other escape sequences, or bare sixel data
/// without a DCS wrapper. In the latter case CR and LF act like `$` and `-`
/// and BEL ends the image.
///
/// Pixels that no data byte painted keep index 0.
pub fn decode(data: &[u8]) -> Result<Canvas<'static>> {
    Ok(Parser::run(data)?.canvas)
}

/// Decodes a complete SIXEL sequence to RGBA.
///
/// With `P2=1` in the DCS header, unpainted pixels come out fully
/// transparent.
///
/// # Example
///
/// ```ignore
/// use sixel_codec::sixel_decode;
///
/// let image = sixel_decode(b"\x1bPq#0;2;100;0;0#0~~~\x1b\\")?;
/// assert_eq!((image.width, image.height), (3, 6));
/// ```
#[must_use = "this returns the decoded SixelImage"]
pub fn sixel_decode(data: &[u8]) -> Result<SixelImage> {
    let decoded = Parser::run(data)?;
    let mut pixels = decoded.canvas.to_rgba();
    if decoded.transparent {
        for (px, &painted) in pixels.chunks_exact_mut(4).zip(&decoded.painted) {
            if painted == 0 {
                px.copy_from_slice(&[0, 0, 0, 0]);
            }
        }
    }
    Ok(SixelImage {
        pixels,
        width: decoded.canvas.width(),
        height: decoded.canvas.height(),
        aspect_ratio: decoded.aspect_ratio,
        has_transparency: decoded.transparent,
    })
}

struct Decoded {
    canvas: Canvas<'static>,
    painted: Vec<u8>,
    aspect_ratio: PixelAspectRatio,
    transparent: bool,
}

enum Step {
    Consume,
    Reprocess,
    Stop,
}

/// Indices painted so far. Grows on demand, doubling each dimension.
#[derive(Default)]
struct Grid {
    width: usize,
    height: usize,
    indices: Vec<u8>,
    painted: Vec<u8>,
}

impl Grid {
    fn ensure(&mut self, width: usize, height: usize) -> Result<()> {
        if width <= self.width && height <= self.height {
            return Ok(());
        }
        let new_width = if width > self.width {
            width.max(self.width * 2).min(SIXEL_WIDTH_LIMIT)
        } else {
            self.width
        };
        let new_height = if height > self.height {
            height.max(self.height * 2).min(SIXEL_HEIGHT_LIMIT)
        } else {
            self.height
        };
        // Doubling may overshoot the pixel cap; fall back to the exact size
        let overshoot = new_width.saturating_mul(new_height) > SIXEL_PIXEL_LIMIT;
        let (new_width, new_height) = if overshoot {
            (width.max(self.width), height.max(self.height))
        } else {
            (new_width, new_height)
        };
        guard_dimensions(new_width, new_height)?;
        let mut indices = try_alloc(new_width * new_height, 0)?;
        let mut painted = try_alloc(new_width * new_height, 0)?;
        for row in 0..self.height {
            let src = row * self.width..(row + 1) * self.width;
            let dst = row * new_width..row * new_width + self.width;
            indices[dst.clone()].copy_from_slice(&self.indices[src.clone()]);
            painted[dst].copy_from_slice(&self.painted[src]);
        }
        log::trace!("grid grown to {}x{}", new_width, new_height);
        self.indices = indices;
        self.painted = painted;
        self.width = new_width;
        self.height = new_height;
        Ok(())
    }

    fn paint_span(&mut self, y: usize, x: usize, len: usize, color: u8) {
        let start = y * self.width + x;
        self.indices[start..start + len].fill(color);
        self.painted[start..start + len].fill(1);
    }

    /// Copies the top-left `width` x `height` region into a new buffer pair.
    fn crop(&self, width: usize, height: usize) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut indices = try_alloc(width * height, 0)?;
        let mut painted = try_alloc(width * height, 0)?;
        let w = width.min(self.width);
        for row in 0..height.min(self.height) {
            let src = row * self.width..row * self.width + w;
            let dst = row * width..row * width + w;
            indices[dst.clone()].copy_from_slice(&self.indices[src.clone()]);
            painted[dst].copy_from_slice(&self.painted[src]);
        }
        Ok((indices, painted))
    }
}

struct Parser {
    state: ParserState,
    /// State `ESC` was seen in
    escape_from: ParserState,
    legacy: bool,
    found: bool,

    params: [u32; MAX_PARAMS],
    nparams: usize,
    current: u32,
    has_current: bool,

    grid: Grid,
    palette: Vec<Rgb>,
    max_index: usize,
    color: u8,
    pos_x: usize,
    pos_y: usize,
    touched_width: usize,
    touched_height: usize,
    raster_width: usize,
    raster_height: usize,

    aspect_ratio: PixelAspectRatio,
    transparent: bool,
}

impl Parser {
    fn new(legacy: bool) -> Self {
        Self {
            state: if legacy {
                ParserState::Data
            } else {
                ParserState::Init
            },
            escape_from: ParserState::Init,
            legacy,
            found: false,
            params: [0; MAX_PARAMS],
            nparams: 0,
            current: 0,
            has_current: false,
            grid: Grid::default(),
            palette: Palette::sixel_default().colors().to_vec(),
            max_index: 0,
            color: 0,
            pos_x: 0,
            pos_y: 0,
            touched_width: 0,
            touched_height: 0,
            raster_width: 0,
            raster_height: 0,
            aspect_ratio: PixelAspectRatio { pan: 2, pad: 1 },
            transparent: false,
        }
    }

    fn run(data: &[u8]) -> Result<Decoded> {
        let legacy = !has_dcs(data);
        let mut parser = Parser::new(legacy);
        log::debug!(
            "decode {} bytes ({})",
            data.len(),
            if legacy { "bare sixel data" } else { "DCS" }
        );

        let mut offset = 0;
        while offset < data.len() {
            match parser.step(data[offset], offset) {
                Ok(Step::Consume) => offset += 1,
                Ok(Step::Reprocess) => {}
                Ok(Step::Stop) => break,
                Err(err) => {
                    parser.state = ParserState::Error;
                    return Err(err);
                }
            }
        }
        parser.finish()
    }

    fn step(&mut self, byte: u8, offset: usize) -> Result<Step> {
        match self.state {
            ParserState::Init => match byte {
                ESC => self.enter_escape(),
                DCS_8BIT => self.begin_dcs(),
                _ => {}
            },
            ParserState::EscapeIntroducer => {
                if self.escape_from == ParserState::Init {
                    match byte {
                        b'P' => self.begin_dcs(),
                        ESC => {}
                        _ => self.state = ParserState::Init,
                    }
                } else if byte == b'\\' {
                    self.state = ParserState::Done;
                    return Ok(Step::Stop);
                } else {
                    return Err(self.malformed(byte, offset));
                }
            }
            ParserState::DcsParam => match byte {
                b'0'..=b'9' | b';' => self.param_byte(byte),
                b'q' => {
                    self.finish_params();
                    self.apply_dcs_params();
                    self.state = ParserState::Data;
                }
                _ if self.is_ignored(byte) => {}
                _ => return Err(self.malformed(byte, offset)),
            },
            ParserState::RasterAttr | ParserState::ColorParam => match byte {
                b'0'..=b'9' | b';' => self.param_byte(byte),
                _ if self.is_ignored(byte) => {}
                _ if self.ends_command(byte) => {
                    self.finish_params();
                    if self.state == ParserState::RasterAttr {
                        self.apply_raster()?;
                    } else {
                        self.apply_color();
                    }
                    self.state = ParserState::Data;
                    return Ok(Step::Reprocess);
                }
                _ => return Err(self.malformed(byte, offset)),
            },
            ParserState::ColorIntroducer => match byte {
                b'0'..=b'9' => {
                    self.param_byte(byte);
                    self.state = ParserState::ColorParam;
                }
                _ if self.is_ignored(byte) => {}
                _ => return Err(self.malformed(byte, offset)),
            },
            ParserState::RepeatIntroducer | ParserState::RepeatParam => match byte {
                b'0'..=b'9' => {
                    self.param_byte(byte);
                    if self.current > MAX_REPEAT {
                        return Err(SixelError::LimitExceeded(format!(
                            "repeat count above {}",
                            MAX_REPEAT
                        )));
                    }
                    self.state = ParserState::RepeatParam;
                }
                b'?'..=b'~' => {
                    let count = self.current.max(1) as usize;
                    self.paint(byte - b'?', count)?;
                    self.state = ParserState::Data;
                }
                _ if self.is_ignored(byte) => {}
                _ => return Err(self.malformed(byte, offset)),
            },
            ParserState::Data => return self.data_byte(byte, offset),
            ParserState::Done | ParserState::Error => return Ok(Step::Stop),
        }
        Ok(Step::Consume)
    }

    fn data_byte(&mut self, byte: u8, offset: usize) -> Result<Step> {
        match byte {
            b'?'..=b'~' => self.paint(byte - b'?', 1)?,
            b'!' => self.begin_command(ParserState::RepeatIntroducer),
            b'#' => self.begin_command(ParserState::ColorIntroducer),
            b'"' => self.begin_command(ParserState::RasterAttr),
            b'$' => self.carriage_return(),
            b'-' => self.next_band(),
            ESC => self.enter_escape(),
            ST_8BIT => {
                self.state = ParserState::Done;
                return Ok(Step::Stop);
            }
            CR if self.legacy => self.carriage_return(),
            LF if self.legacy => self.next_band(),
            BEL if self.legacy => {
                self.state = ParserState::Done;
                return Ok(Step::Stop);
            }
            _ if self.is_ignored(byte) => {}
            _ => return Err(self.malformed(byte, offset)),
        }
        Ok(Step::Consume)
    }

    fn malformed(&self, byte: u8, offset: usize) -> SixelError {
        SixelError::Malformed {
            state: self.state,
            byte,
            offset,
        }
    }

    /// C0 controls other than `ESC` (and the legacy line controls) are
    /// skipped in every state.
    fn is_ignored(&self, byte: u8) -> bool {
        byte < 0x20 && byte != ESC && !(self.legacy && matches!(byte, CR | LF | BEL))
    }

    /// Bytes that end a parameter list and are then handled as data.
    fn ends_command(&self, byte: u8) -> bool {
        matches!(byte, b'?'..=b'~' | b'!' | b'#' | b'"' | b'$' | b'-' | ESC | ST_8BIT)
            || (self.legacy && matches!(byte, CR | LF | BEL))
    }

    fn enter_escape(&mut self) {
        self.escape_from = self.state;
        self.state = ParserState::EscapeIntroducer;
    }

    fn begin_dcs(&mut self) {
        self.found = true;
        self.begin_command(ParserState::DcsParam);
    }

    fn begin_command(&mut self, state: ParserState) {
        self.found = true;
        self.nparams = 0;
        self.current = 0;
        self.has_current = false;
        self.state = state;
    }

    fn param_byte(&mut self, byte: u8) {
        if byte == b';' {
            self.push_param();
        } else {
            self.current = self
                .current
                .saturating_mul(10)
                .saturating_add((byte - b'0') as u32);
            self.has_current = true;
        }
    }

    fn push_param(&mut self) {
        if self.nparams < MAX_PARAMS {
            self.params[self.nparams] = self.current;
        }
        self.nparams += 1;
        self.current = 0;
        self.has_current = false;
    }

    fn finish_params(&mut self) {
        if self.has_current || self.nparams > 0 {
            self.push_param();
        }
        if self.nparams > MAX_PARAMS {
            log::warn!(
                "{} parameters in {} state, extra ones ignored",
                self.nparams,
                self.state
            );
            self.nparams = MAX_PARAMS;
        }
    }

    fn param(&self, index: usize) -> Option<u32> {
        (index < self.nparams).then(|| self.params[index])
    }

    fn apply_dcs_params(&mut self) {
        let p1 = self.param(0).unwrap_or(0);
        let pan = match p1 {
            2 => 5,
            3 | 4 => 3,
            7..=9 => 1,
            _ => 2,
        };
        self.aspect_ratio = PixelAspectRatio { pan, pad: 1 };
        self.transparent = self.param(1) == Some(1);
        log::debug!(
            "DCS P1={} P2={:?} P3={:?}",
            p1,
            self.param(1),
            self.param(2)
        );
    }

    fn apply_raster(&mut self) -> Result<()> {
        if let Some(pan) = self.param(0) {
            self.aspect_ratio.pan = pan.clamp(1, u16::MAX as u32) as u16;
        }
        if let Some(pad) = self.param(1) {
            self.aspect_ratio.pad = pad.clamp(1, u16::MAX as u32) as u16;
        }
        let width = self.param(2).unwrap_or(0) as usize;
        let height = self.param(3).unwrap_or(0) as usize;
        guard_dimensions(width, height)?;
        self.raster_width = width;
        self.raster_height = height;
        log::debug!(
            "raster attributes {}:{} {}x{}",
            self.aspect_ratio.pan,
            self.aspect_ratio.pad,
            width,
            height
        );
        Ok(())
    }

    fn apply_color(&mut self) {
        let index = self.params[0].min(SIXEL_PALETTE_MAX as u32 - 1) as usize;
        match self.nparams {
            1 => {}
            5 => {
                let [x, y, z] = [self.params[2], self.params[3], self.params[4]]
                    .map(|v| v.min(i32::MAX as u32) as i32);
                match self.params[1] {
                    1 => self.palette[index] = Rgb::from_hls(x, y, z),
                    2 => self.palette[index] = Rgb::from_percent(x, y, z),
                    other => log::warn!("color {}: unknown color space {}", index, other),
                }
            }
            n => log::warn!("color {}: {} parameters, definition ignored", index, n),
        }
        self.color = index as u8;
        self.max_index = self.max_index.max(index);
    }

    fn carriage_return(&mut self) {
        self.pos_x = 0;
    }

    fn next_band(&mut self) {
        self.pos_x = 0;
        self.pos_y = self.pos_y.saturating_add(SIXEL_BAND_HEIGHT);
    }

    fn paint(&mut self, bits: u8, count: usize) -> Result<()> {
        self.found = true;
        let end_x = self.pos_x + count;
        if end_x > SIXEL_WIDTH_LIMIT {
            return Err(SixelError::LimitExceeded(format!(
                "image wider than {} pixels",
                SIXEL_WIDTH_LIMIT
            )));
        }
        if bits != 0 {
            let rows = self.pos_y.saturating_add(8 - bits.leading_zeros() as usize);
            if rows > SIXEL_HEIGHT_LIMIT {
                return Err(SixelError::LimitExceeded(format!(
                    "image taller than {} pixels",
                    SIXEL_HEIGHT_LIMIT
                )));
            }
            self.grid.ensure(end_x, rows)?;
            for bit in 0..SIXEL_BAND_HEIGHT {
                if bits & (1 << bit) != 0 {
                    self.grid
                        .paint_span(self.pos_y + bit, self.pos_x, count, self.color);
                }
            }
            self.touched_height = self.touched_height.max(rows);
        }
        self.touched_width = self.touched_width.max(end_x);
        self.pos_x = end_x;
        Ok(())
    }

    fn finish(mut self) -> Result<Decoded> {
        match self.state {
            ParserState::RasterAttr => {
                self.finish_params();
                self.apply_raster()?;
            }
            ParserState::ColorParam => {
                self.finish_params();
                self.apply_color();
            }
            ParserState::ColorIntroducer
            | ParserState::RepeatIntroducer
            | ParserState::RepeatParam
            | ParserState::DcsParam => {
                return Err(SixelError::UnexpectedEof { state: self.state });
            }
            ParserState::EscapeIntroducer if self.escape_from != ParserState::Init => {
                return Err(SixelError::UnexpectedEof { state: self.state });
            }
            _ => {}
        }
        if !self.found {
            return Err(SixelError::NoSixelData);
        }

        let width = self.raster_width.max(self.touched_width).max(1);
        let height = self.raster_height.max(self.touched_height).max(1);
        guard_dimensions(width, height)?;
        let (indices, painted) = self.grid.crop(width, height)?;
        log::debug!(
            "decoded {}x{} with {} colors",
            width,
            height,
            self.max_index + 1
        );

        self.palette.truncate(self.max_index + 1);
        let palette = Arc::new(Palette::from_colors(self.palette)?);
        let canvas = Canvas::from_pixels(PixelBuffer::Owned(indices), width, height, 1, palette)?;
        Ok(Decoded {
            canvas,
            painted,
            aspect_ratio: self.aspect_ratio,
            transparent: self.transparent,
        })
    }
}

fn guard_dimensions(width: usize, height: usize) -> Result<()> {
    if width > SIXEL_WIDTH_LIMIT
        || height > SIXEL_HEIGHT_LIMIT
        || width.saturating_mul(height) > SIXEL_PIXEL_LIMIT
    {
        return Err(SixelError::LimitExceeded(format!(
            "image size {}x{} exceeds {} pixels",
            width, height, SIXEL_PIXEL_LIMIT
        )));
    }
    Ok(())
}

fn has_dcs(data: &[u8]) -> bool {
    data.contains(&DCS_8BIT) || data.windows(2).any(|w| w == [ESC, b'P'])
}
