#![allow(clippy::cast_possible_truncation)]

mod jpeg;
mod png;

use clap::{value_parser, Arg, ArgAction, Command};
use clap::builder::NonEmptyStringValueParser;
use gifsplit::{GifReader, Splitter};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

pub type BinResult<T, E = Box<dyn std::error::Error + Send + Sync>> = Result<T, E>;

const EXIT_UNSPECIFIED: i32 = 1;
const EXIT_MAX_FRAMES: i32 = 2;

fn main() {
    match bin_main() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            if let Some(e) = e.source() {
                eprintln!("error: {e}");
            }
            std::process::exit(EXIT_UNSPECIFIED);
        },
    }
}

fn bin_main() -> BinResult<i32> {
    let matches = Command::new(clap::crate_name!())
        .version(clap::crate_version!())
        .about("Splits an animated GIF into correctly composited still frames")
        .arg_required_else_help(true)
        .arg(Arg::new("verbose")
            .long("verbose")
            .short('v')
            .num_args(0)
            .action(ArgAction::SetTrue)
            .help("Verbose debugging output on stderr"))
        .arg(Arg::new("quality")
            .long("jpeg")
            .short('q')
            .value_name("1-100")
            .num_args(1)
            .value_parser(value_parser!(u8).range(1..=100))
            .help("Write JPEGs at this quality instead of PNGs"))
        .arg(Arg::new("sampling")
            .long("sampling")
            .short('s')
            .value_name("0-2")
            .num_args(1)
            .value_parser(value_parser!(u8).range(0..=2))
            .help("JPEG chroma subsampling:\n0: 4:4:4 (none)\n1: 4:2:2 (2x1)\n2: 4:2:0 (2x2)\nDefault: 2 for quality < 90, else 0"))
        .arg(Arg::new("optimize")
            .long("optimize")
            .short('o')
            .num_args(0)
            .action(ArgAction::SetTrue)
            .help("Optimize the JPEG Huffman tables"))
        .arg(Arg::new("max-frames")
            .long("max-frames")
            .short('m')
            .value_name("num")
            .num_args(1)
            .value_parser(value_parser!(u32))
            .help("Limit the number of frames to output"))
        .arg(Arg::new("INPUT")
            .help("Input GIF file; \"-\" means stdin")
            .value_parser(value_parser!(PathBuf))
            .required(true))
        .arg(Arg::new("OUTPUT_BASE")
            .help("Base path for the output frames, named <base>NNNNNN.png (or .jpg)")
            .value_parser(NonEmptyStringValueParser::new())
            .required(true))
        .get_matches();

    let verbose = matches.get_flag("verbose");
    let quality = matches.get_one::<u8>("quality").copied();
    let jpeg_options = quality.map(|quality| jpeg::Options {
        quality,
        sampling: matches.get_one::<u8>("sampling").copied(),
        optimize_huffman: matches.get_flag("optimize"),
    });
    let max_frames = matches.get_one::<u32>("max-frames").copied();
    let input = SrcPath::new(matches.get_one::<PathBuf>("INPUT").ok_or("?")?);
    let output_base = matches.get_one::<String>("OUTPUT_BASE").ok_or("?")?;

    let reader = GifReader::new(io::BufReader::new(input.open()?))
        .map_err(|e| format!("can't read {input}: {e}"))?;
    let mut splitter = Splitter::new(reader)?;

    let extension = if jpeg_options.is_some() { "jpg" } else { "png" };
    let mut frame = 0u32;
    while let Some(image) = splitter.next_frame() {
        if let Some(max) = max_frames {
            if frame >= max {
                eprintln!("Max frames exceeded");
                return Ok(EXIT_MAX_FRAMES);
            }
        }
        if verbose {
            eprintln!(
                "frame {frame}: truecolor={} local_palette={}",
                image.is_truecolor(),
                image.used_local_palette()
            );
        }
        let filename = PathBuf::from(format!("{output_base}{frame:06}.{extension}"));
        let written = match &jpeg_options {
            Some(options) => jpeg::write(image, &filename, options),
            None => png::write(image, &filename),
        };
        written.map_err(|e| format!("failed to write {}: {e}", filename.display()))?;
        println!("{frame} delay={}", image.delay());
        frame += 1;
    }

    let info = splitter.info().clone();
    if info.has_errors {
        match splitter.last_error() {
            Some(e) => eprintln!("Error while processing input GIF: {e}"),
            None => eprintln!("Error while processing input GIF"),
        }
        return Ok(EXIT_UNSPECIFIED);
    }
    println!("loops={}", info.loop_count);
    Ok(0)
}

enum SrcPath<'a> {
    Path(&'a Path),
    Stdin,
}

impl<'a> SrcPath<'a> {
    fn new(path: &'a Path) -> Self {
        if path.as_os_str() == "-" {
            Self::Stdin
        } else {
            Self::Path(path)
        }
    }

    fn open(&self) -> BinResult<Box<dyn Read>> {
        match self {
            Self::Path(path) => Ok(Box::new(
                File::open(path).map_err(|e| format!("can't open {}: {e}", path.display()))?,
            )),
            Self::Stdin => Ok(Box::new(io::stdin().lock())),
        }
    }
}

impl std::fmt::Display for SrcPath<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(path) => path.display().fmt(f),
            Self::Stdin => f.write_str("stdin"),
        }
    }
}
