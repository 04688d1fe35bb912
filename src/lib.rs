//! # sixel_codec
//!
//! A SIXEL codec: converts true-color pixels into a SIXEL escape sequence and
//! parses SIXEL streams back into indexed images.
//!
//! ## Features
//!
//! - **Quantizer**: median-cut palette construction with selectable split and
//!   representative-color policies
//! - **Ditherer**: error diffusion (Floyd-Steinberg, Atkinson, Jarvis-Judice-Ninke,
//!   Stucki, Burkes) backed by a nearest-color cache
//! - **Encoder**: band-by-band run-length SIXEL writer over any [`SixelSink`]
//! - **Decoder**: single-pass state machine producing an indexed [`Canvas`]
//!
//! ## Quick Start
//!
//! ### Encoding an image to SIXEL
//!
//! ```ignore
//! use sixel_codec::{sixel_encode, EncodeOptions};
//!
//! // RGBA image data (4 bytes per pixel)
//! let rgba = vec![255u8, 0, 0, 255, 0, 255, 0, 255]; // red and green pixels
//! let sixel = sixel_encode(&rgba, 2, 1, &EncodeOptions::default())?;
//! std::io::Write::write_all(&mut std::io::stdout(), &sixel)?;
//! ```
//!
//! ### Step by step
//!
//! ```ignore
//! use sixel_codec::{Dither, OutputContext};
//!
//! let rgb = vec![255u8, 0, 0, 0, 255, 0];
//! let mut dither = Dither::new(2)?;
//! dither.prepare_palette(&rgb, 2, 1, 3)?;
//! let canvas = dither.apply_palette(&rgb, 2, 1, 3)?;
//!
//! let mut out = Vec::new();
//! let mut context = OutputContext::new(&mut out);
//! sixel_codec::encode(&canvas, &mut context)?;
//! ```
//!
//! ### Decoding SIXEL
//!
//! ```ignore
//! let canvas = sixel_codec::decode(b"\x1bPq\"1;1;2;1#1;2;100;0;0#1!2@\x1b\\")?;
//! assert_eq!((canvas.width(), canvas.height()), (2, 1));
//! ```

use thiserror::Error;

pub mod cache;
pub mod canvas;
pub mod color;
pub mod compat;
pub mod decoder;
pub mod dither;
pub mod encoder;
pub mod output;
pub mod palette;
pub mod quant;

pub use cache::{CachePrecision, ColorCache};
pub use canvas::{Canvas, PixelBuffer};
pub use color::Rgb;
#[allow(deprecated)]
pub use compat::{lsq_apply_palette, lsq_make_palette};
pub use decoder::{decode, sixel_decode, ParserState, PixelAspectRatio, SixelImage};
pub use dither::{apply_palette, DiffusionMethod, Dither, DitherOptions};
pub use encoder::{encode, sixel_encode, sixel_encode_rgb, EncodeOptions};
pub use output::{CallbackSink, ColorSpace, OutputContext, SixelSink, TerminalOptions};
pub use palette::{Palette, SharedPalette};
pub use quant::{make_palette, MethodForLargest, MethodForRep, Quality, QuantizeOptions};

/// Errors that can occur during quantization, encoding or decoding.
#[derive(Debug, Error)]
pub enum SixelError {
    /// Width or height is zero or exceeds the supported limits
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    /// Buffer size doesn't match expected size for dimensions
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// Bytes per pixel is not one the operation supports
    #[error("unsupported pixel depth: {0} bytes per pixel")]
    UnsupportedDepth(usize),

    /// Requested color count outside 1..=256
    #[error("invalid color count: {0} (expected 1..=256)")]
    InvalidColorCount(usize),

    /// A pixel or palette operation referenced a missing palette entry
    #[error("palette index {index} out of range for {ncolors} colors")]
    PaletteIndexOutOfRange { index: usize, ncolors: usize },

    /// The image handed to the encoder cannot be encoded as is
    #[error("inconsistent image: {0}")]
    InconsistentImage(String),

    /// A buffer could not be allocated
    #[error("failed to allocate {bytes} bytes")]
    AllocationFailed { bytes: usize },

    /// A byte that is not valid in the current parser state
    #[error("malformed SIXEL data: unexpected byte 0x{byte:02x} at offset {offset} in {state} state")]
    Malformed {
        state: ParserState,
        byte: u8,
        offset: usize,
    },

    /// The stream ended where more input was required
    #[error("unexpected end of SIXEL data in {state} state")]
    UnexpectedEof { state: ParserState },

    /// No SIXEL data found in input
    #[error("no SIXEL data found")]
    NoSixelData,

    /// A size or repeat limit was exceeded while decoding
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// The output sink failed
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for SIXEL operations.
pub type Result<T> = core::result::Result<T, SixelError>;

pub(crate) const SIXEL_PALETTE_MAX: usize = 256;
pub(crate) const SIXEL_WIDTH_LIMIT: usize = 1_000_000;
pub(crate) const SIXEL_HEIGHT_LIMIT: usize = 1_000_000;
/// Upper bound on `width * height` of any decoded image.
pub(crate) const SIXEL_PIXEL_LIMIT: usize = 64 * 1024 * 1024;

/// Rows packed into one SIXEL data byte.
pub(crate) const SIXEL_BAND_HEIGHT: usize = 6;

/// Checks the common true-color input contract shared by the quantizer and
/// the ditherer.
pub(crate) fn check_image(pixels: &[u8], width: usize, height: usize, depth: usize) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(SixelError::InvalidDimensions { width, height });
    }
    if depth != 3 && depth != 4 {
        return Err(SixelError::UnsupportedDepth(depth));
    }
    let expected = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(depth))
        .ok_or(SixelError::InvalidDimensions { width, height })?;
    if pixels.len() != expected {
        return Err(SixelError::BufferSizeMismatch {
            expected,
            actual: pixels.len(),
        });
    }
    Ok(())
}

/// Allocates a buffer of `len` copies of `fill`, reporting allocation failure
/// instead of aborting.
pub(crate) fn try_alloc(len: usize, fill: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| SixelError::AllocationFailed { bytes: len })?;
    buf.resize(len, fill);
    Ok(buf)
}
