//! Byte sinks and the per-stream output state used by the encoder.

use std::fmt;
use std::io;

use crate::SIXEL_PALETTE_MAX;

/// Destination of an encoded SIXEL stream.
///
/// Every [`io::Write`] is a sink, so a `Vec<u8>`, a file or stdout can be
/// passed directly. Use [`CallbackSink`] to route output through closures.
pub trait SixelSink {
    /// Writes one raw byte.
    fn put_byte(&mut self, byte: u8) -> io::Result<()>;

    /// Writes formatted text.
    fn put_fmt(&mut self, args: fmt::Arguments<'_>) -> io::Result<()>;

    fn put_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        for &b in bytes {
            self.put_byte(b)?;
        }
        Ok(())
    }
}

impl<W: io::Write + ?Sized> SixelSink for W {
    #[inline]
    fn put_byte(&mut self, byte: u8) -> io::Result<()> {
        self.write_all(&[byte])
    }

    #[inline]
    fn put_fmt(&mut self, args: fmt::Arguments<'_>) -> io::Result<()> {
        self.write_fmt(args)
    }

    #[inline]
    fn put_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_all(bytes)
    }
}

/// A sink built from two closures: one receiving raw bytes, one receiving
/// formatted text.
pub struct CallbackSink<B, F> {
    byte: B,
    text: F,
}

impl<B, F> CallbackSink<B, F>
where
    B: FnMut(u8) -> io::Result<()>,
    F: FnMut(&str) -> io::Result<()>,
{
    pub fn new(byte: B, text: F) -> Self {
        Self { byte, text }
    }
}

impl<B, F> SixelSink for CallbackSink<B, F>
where
    B: FnMut(u8) -> io::Result<()>,
    F: FnMut(&str) -> io::Result<()>,
{
    fn put_byte(&mut self, byte: u8) -> io::Result<()> {
        (self.byte)(byte)
    }

    fn put_fmt(&mut self, args: fmt::Arguments<'_>) -> io::Result<()> {
        match args.as_str() {
            Some(s) => (self.text)(s),
            None => (self.text)(&args.to_string()),
        }
    }
}

impl<B, F> fmt::Debug for CallbackSink<B, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSink").finish_non_exhaustive()
    }
}

/// Color space used for palette definitions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorSpace {
    /// `#Pc;2;r;g;b` with percent components
    #[default]
    Rgb,
    /// `#Pc;1;h;l;s`
    Hls,
}

/// Compatibility flags for the receiving terminal.
#[derive(Clone, Debug)]
pub struct TerminalOptions {
    /// Use the single-byte C1 controls (DCS 0x90, ST 0x9C, CSI 0x9B) instead
    /// of their `ESC` forms.
    pub eight_bit_control: bool,
    /// Leave sixel scrolling enabled. When disabled, the stream starts with a
    /// DECSDM toggle so the image is drawn from the top-left corner.
    pub sixel_scrolling: bool,
    /// The terminal implements DECSDM with inverted polarity.
    pub sdm_glitch: bool,
    pub color_space: ColorSpace,
    /// Renumber the used colors densely instead of keeping canvas indices.
    pub compact_palette: bool,
}

impl Default for TerminalOptions {
    fn default() -> Self {
        Self {
            eight_bit_control: false,
            sixel_scrolling: true,
            sdm_glitch: false,
            color_space: ColorSpace::Rgb,
            compact_palette: false,
        }
    }
}

/// One horizontal run of a single color inside a band: columns `sx..mx`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RunNode {
    pub pal: u8,
    pub sx: usize,
    pub mx: usize,
}

/// Run nodes for the band being encoded. Both lists keep their capacity
/// between bands and encode calls.
#[derive(Debug, Default)]
pub(crate) struct RunPool {
    pub active: Vec<RunNode>,
    pub deferred: Vec<RunNode>,
}

/// A sink plus everything the encoder carries between calls for one stream:
/// terminal flags, the color-number mapping, the pending byte run, the
/// currently selected color and the run-node pool.
#[derive(Debug)]
pub struct OutputContext<S> {
    sink: S,
    options: TerminalOptions,
    conv_palette: [u8; SIXEL_PALETTE_MAX],
    save_pixel: u8,
    save_count: usize,
    active_palette: Option<u8>,
    pub(crate) pool: RunPool,
}

impl<S: SixelSink> OutputContext<S> {
    pub fn new(sink: S) -> Self {
        Self::with_options(sink, TerminalOptions::default())
    }

    pub fn with_options(sink: S, options: TerminalOptions) -> Self {
        Self {
            sink,
            options,
            conv_palette: identity_palette(),
            save_pixel: 0,
            save_count: 0,
            active_palette: None,
            pool: RunPool::default(),
        }
    }

    #[inline]
    pub fn options(&self) -> &TerminalOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut TerminalOptions {
        &mut self.options
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Releases the context and returns the sink.
    pub fn into_inner(self) -> S {
        self.sink
    }

    /// Prepares the per-image state; `used` marks the canvas indices that
    /// appear in the image.
    pub(crate) fn begin_image(&mut self, used: &[bool; SIXEL_PALETTE_MAX]) {
        self.conv_palette = identity_palette();
        if self.options.compact_palette {
            let mut next = 0u8;
            for (i, &is_used) in used.iter().enumerate() {
                if is_used {
                    self.conv_palette[i] = next;
                    next = next.wrapping_add(1);
                }
            }
        }
        self.save_pixel = 0;
        self.save_count = 0;
        self.active_palette = None;
    }

    /// Color number emitted for a canvas palette index.
    #[inline]
    pub(crate) fn color_number(&self, index: u8) -> u8 {
        self.conv_palette[index as usize]
    }

    pub(crate) fn put_byte(&mut self, byte: u8) -> io::Result<()> {
        self.sink.put_byte(byte)
    }

    pub(crate) fn put_fmt(&mut self, args: fmt::Arguments<'_>) -> io::Result<()> {
        self.sink.put_fmt(args)
    }

    /// Emits the DECSDM toggle the flags call for, if any.
    pub(crate) fn put_scrolling_mode(&mut self) -> io::Result<()> {
        let mode = match (self.options.sixel_scrolling, self.options.sdm_glitch) {
            (true, false) => return Ok(()),
            (true, true) | (false, false) => b'h',
            (false, true) => b'l',
        };
        if self.options.eight_bit_control {
            self.sink.put_byte(0x9b)?;
        } else {
            self.sink.put_bytes(b"\x1b[")?;
        }
        self.sink.put_bytes(b"?80")?;
        self.sink.put_byte(mode)
    }

    pub(crate) fn put_dcs_start(&mut self) -> io::Result<()> {
        if self.options.eight_bit_control {
            self.sink.put_byte(0x90)
        } else {
            self.sink.put_bytes(b"\x1bP")
        }
    }

    pub(crate) fn put_string_terminator(&mut self) -> io::Result<()> {
        if self.options.eight_bit_control {
            self.sink.put_byte(0x9c)
        } else {
            self.sink.put_bytes(b"\x1b\\")
        }
    }

    /// Emits `#n` unless color `index` is already selected.
    pub(crate) fn select_color(&mut self, index: u8) -> io::Result<()> {
        if self.active_palette == Some(index) {
            return Ok(());
        }
        self.active_palette = Some(index);
        let number = self.color_number(index);
        self.sink.put_fmt(format_args!("#{}", number))
    }

    /// Queues one sixel (six-bit row mask), merging it with the pending run.
    pub(crate) fn put_pixel(&mut self, bits: u8) -> io::Result<()> {
        let byte = b'?' + (bits & 0x3f);
        if self.save_count > 0 && byte == self.save_pixel {
            self.save_count += 1;
            return Ok(());
        }
        self.flush_run()?;
        self.save_pixel = byte;
        self.save_count = 1;
        Ok(())
    }

    /// Writes the pending run, as `!n` plus one byte when that is shorter.
    pub(crate) fn flush_run(&mut self) -> io::Result<()> {
        let count = std::mem::take(&mut self.save_count);
        match count {
            0 => Ok(()),
            1..=3 => {
                for _ in 0..count {
                    self.sink.put_byte(self.save_pixel)?;
                }
                Ok(())
            }
            _ => self
                .sink
                .put_fmt(format_args!("!{}{}", count, self.save_pixel as char)),
        }
    }
}

fn identity_palette() -> [u8; SIXEL_PALETTE_MAX] {
    let mut table = [0u8; SIXEL_PALETTE_MAX];
    for (i, slot) in table.iter_mut().enumerate() {
        *slot = i as u8;
    }
    table
}
