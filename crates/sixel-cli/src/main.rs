//! sixel - Encode and decode SIXEL graphics
//!
//! A command-line tool for converting images to/from SIXEL format.

use clap::{Args, Parser, Subcommand, ValueEnum};
use sixel_codec::{
    sixel_decode, sixel_encode, ColorSpace, DiffusionMethod, EncodeOptions, MethodForLargest,
    MethodForRep, Quality, TerminalOptions,
};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "sixel")]
#[command(version)]
#[command(about = "Encode and decode SIXEL graphics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode an image to SIXEL format
    Encode {
        /// Input image file (PNG, JPEG, GIF, WebP)
        input: PathBuf,

        /// Output SIXEL file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        encoding: EncodingArgs,
    },

    /// Decode a SIXEL file to PNG
    Decode {
        /// Input SIXEL file (use - for stdin)
        input: PathBuf,

        /// Output PNG file (default: input with .png extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Display an image as SIXEL in the terminal
    Show {
        /// Input image file (PNG, JPEG, GIF, WebP)
        input: PathBuf,

        #[command(flatten)]
        encoding: EncodingArgs,
    },
}

#[derive(Args)]
struct EncodingArgs {
    /// Maximum number of colors (2-256)
    #[arg(short, long, default_value = "256")]
    colors: u16,

    /// Quantization quality
    #[arg(short, long, value_enum, default_value_t = QualityArg::Auto)]
    quality: QualityArg,

    /// Error diffusion method
    #[arg(short, long, value_enum, default_value_t = DiffusionArg::Auto)]
    diffusion: DiffusionArg,

    /// How the box to split is chosen
    #[arg(long, value_enum, default_value_t = LargestArg::Auto)]
    find_largest: LargestArg,

    /// How a box is reduced to one color
    #[arg(long, value_enum, default_value_t = RepArg::Auto)]
    select_color: RepArg,

    /// Use the faster reduced-precision color cache while dithering
    #[arg(long)]
    fast: bool,

    /// Emit 8-bit C1 controls instead of ESC sequences
    #[arg(long)]
    eight_bit: bool,

    /// Disable sixel scrolling (draw from the top-left corner)
    #[arg(long)]
    no_scrolling: bool,

    /// The terminal inverts the DECSDM mode
    #[arg(long)]
    sdm_glitch: bool,

    /// Define palette colors in HLS instead of RGB
    #[arg(long)]
    hls: bool,

    /// Renumber used colors densely
    #[arg(long)]
    compact_palette: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum QualityArg {
    Auto,
    High,
    Low,
}

#[derive(Clone, Copy, ValueEnum)]
enum DiffusionArg {
    Auto,
    None,
    Atkinson,
    Fs,
    Jajuni,
    Stucki,
    Burkes,
}

#[derive(Clone, Copy, ValueEnum)]
enum LargestArg {
    Auto,
    Norm,
    Lum,
}

#[derive(Clone, Copy, ValueEnum)]
enum RepArg {
    Auto,
    Center,
    Average,
    Histogram,
}

impl EncodingArgs {
    fn to_options(&self) -> EncodeOptions {
        EncodeOptions {
            max_colors: self.colors.clamp(2, 256),
            quality: match self.quality {
                QualityArg::Auto => Quality::Auto,
                QualityArg::High => Quality::High,
                QualityArg::Low => Quality::Low,
            },
            diffusion: match self.diffusion {
                DiffusionArg::Auto => DiffusionMethod::Auto,
                DiffusionArg::None => DiffusionMethod::None,
                DiffusionArg::Atkinson => DiffusionMethod::Atkinson,
                DiffusionArg::Fs => DiffusionMethod::FS,
                DiffusionArg::Jajuni => DiffusionMethod::JaJuNi,
                DiffusionArg::Stucki => DiffusionMethod::Stucki,
                DiffusionArg::Burkes => DiffusionMethod::Burkes,
            },
            method_for_largest: match self.find_largest {
                LargestArg::Auto => MethodForLargest::Auto,
                LargestArg::Norm => MethodForLargest::Norm,
                LargestArg::Lum => MethodForLargest::Lum,
            },
            method_for_rep: match self.select_color {
                RepArg::Auto => MethodForRep::Auto,
                RepArg::Center => MethodForRep::CenterBox,
                RepArg::Average => MethodForRep::AverageColors,
                RepArg::Histogram => MethodForRep::AveragePixels,
            },
            optimize: self.fast,
            terminal: TerminalOptions {
                eight_bit_control: self.eight_bit,
                sixel_scrolling: !self.no_scrolling,
                sdm_glitch: self.sdm_glitch,
                color_space: if self.hls {
                    ColorSpace::Hls
                } else {
                    ColorSpace::Rgb
                },
                compact_palette: self.compact_palette,
            },
        }
    }
}

fn load_rgba(input: &Path) -> Result<(Vec<u8>, usize, usize), Box<dyn std::error::Error>> {
    let img =
        image::open(input).map_err(|e| format!("Failed to open '{}': {}", input.display(), e))?;
    let rgba_img = img.to_rgba8();
    let (width, height) = rgba_img.dimensions();
    Ok((rgba_img.into_raw(), width as usize, height as usize))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Encode {
            input,
            output,
            encoding,
        } => {
            let (pixels, width, height) = load_rgba(&input)?;
            let opts = encoding.to_options();
            log::info!(
                "encoding '{}' ({}x{}) with {} colors",
                input.display(),
                width,
                height,
                opts.max_colors
            );

            let sixel = sixel_encode(&pixels, width, height, &opts)?;

            match output {
                Some(path) => {
                    fs::write(&path, &sixel)?;
                    eprintln!("Written {} bytes to '{}'", sixel.len(), path.display());
                }
                None => {
                    io::stdout().write_all(&sixel)?;
                }
            }
        }

        Commands::Decode { input, output } => {
            let sixel_data = if input.to_string_lossy() == "-" {
                let mut buf = Vec::new();
                io::stdin().read_to_end(&mut buf)?;
                buf
            } else {
                fs::read(&input)
                    .map_err(|e| format!("Failed to read '{}': {}", input.display(), e))?
            };

            log::info!("decoding {} bytes", sixel_data.len());

            let image = sixel_decode(&sixel_data)?;

            let output_path = output.unwrap_or_else(|| {
                let mut p = input.clone();
                p.set_extension("png");
                p
            });

            let img =
                image::RgbaImage::from_raw(image.width as u32, image.height as u32, image.pixels)
                    .ok_or("Failed to create image from decoded data")?;
            img.save(&output_path)?;

            eprintln!(
                "Decoded: {}x{} pixels -> '{}'",
                image.width,
                image.height,
                output_path.display()
            );
        }

        Commands::Show { input, encoding } => {
            let (pixels, width, height) = load_rgba(&input)?;
            let sixel = sixel_encode(&pixels, width, height, &encoding.to_options())?;
            let mut stdout = io::stdout().lock();
            stdout.write_all(&sixel)?;
            stdout.flush()?;
        }
    }

    Ok(())
}
