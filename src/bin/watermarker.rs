//! WaterMarker CLI tool
//!
//! A command-line tool for adding a tiled text watermark to every page of a PDF.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use watermarker::config::{validate_input_path, DEFAULT_TEXT};
use watermarker::pdf::{apply_watermark, FontRegistry, TextOverlayBuilder};
use watermarker::{RunConfig, WatermarkSpec};

const BANNER: &str = "WaterMarker, Copyright (C) 2023 Huang Wenhuan
This program comes with ABSOLUTELY NO WARRANTY. This is free software, and you are
welcome to redistribute it under the terms of the GNU General Public License v2 or later.";

/// WaterMarker - Add a repeating text watermark to a PDF
#[derive(Parser, Debug)]
#[command(name = "watermarker")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # Watermark with the defaults, prompting for the text
    watermarker -F report.pdf

    # Built-in font, more visible, steeper angle
    watermarker --text DRAFT --font Helvetica --alpha 0.3 --angle 45 -F report.pdf -O draft.pdf")]
struct Cli {
    /// Text to add as watermark (prompted for when left at the default)
    #[arg(long, default_value = DEFAULT_TEXT)]
    text: String,

    /// The PDF file to add the watermark to (prompted for when omitted)
    #[arg(short = 'F', long)]
    file: Option<PathBuf>,

    /// Font used for the watermark text
    #[arg(long, default_value = "SimSun")]
    font: String,

    /// TrueType file registered under the --font name
    #[arg(long, default_value = "fonts/SimSun.ttf")]
    font_file: PathBuf,

    /// Font size on an A4 page; scaled with the page size
    #[arg(long, default_value_t = 30.0)]
    size: f32,

    /// Opacity of the watermark text, between 0.0 and 1.0
    #[arg(long, default_value_t = 0.1, value_parser = parse_alpha)]
    alpha: f32,

    /// Rotation of the watermark grid in degrees
    #[arg(long, default_value_t = 30.0, allow_negative_numbers = true)]
    angle: f32,

    /// Output file path (default: next to the input with a watermarked suffix)
    #[arg(short = 'O', long)]
    output: Option<PathBuf>,

    /// Verbose output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    println!("{}", BANNER);

    match run(cli) {
        Ok(output) => println!("{}", success_message(&output)),
        Err(e) => {
            eprintln!("错误: {:#}", e);
            process::exit(1);
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<PathBuf> {
    let text = if cli.text == DEFAULT_TEXT {
        let answer = prompt("请输入水印文字：")?;
        if answer.is_empty() {
            cli.text
        } else {
            answer
        }
    } else {
        cli.text
    };

    let input = match cli.file {
        Some(path) => path,
        None => PathBuf::from(
            prompt("请输入文件路径：")?
                .trim_matches('"')
                .trim_matches(' ')
                .to_string(),
        ),
    };

    // Reject anything that is not a .pdf before touching the filesystem
    if validate_input_path(&input).is_err() {
        bail!("输入文件不为pdf格式: {}", input.display());
    }

    let spec = WatermarkSpec {
        text,
        font: cli.font,
        size: cli.size,
        alpha: cli.alpha,
        angle: cli.angle,
    };
    let config = RunConfig::resolve(input, cli.output, spec)?;
    debug!(?config, "resolved configuration");

    let fonts = load_fonts(&config.spec.font, &cli.font_file)?;

    apply_watermark(
        &config.input,
        &config.output,
        &config.spec,
        &mut TextOverlayBuilder::new(&fonts),
    )
    .with_context(|| format!("Failed to watermark {}", config.input.display()))?;

    Ok(config.output)
}

/// Standard fonts plus the TrueType file for the chosen font name
fn load_fonts(font: &str, font_file: &Path) -> Result<FontRegistry> {
    let mut fonts = FontRegistry::with_standard_fonts();
    if fonts.contains(font) {
        return Ok(fonts);
    }

    if font_file.exists() {
        fonts.register_file(font, font_file)?;
    } else {
        warn!(
            font = font,
            path = %font_file.display(),
            "font file not found, font stays unregistered"
        );
    }
    Ok(fonts)
}

fn success_message(output: &Path) -> String {
    format!("添加水印成功\n文件路径为: {}", output.display())
}

fn prompt(message: &str) -> Result<String> {
    print!("{}", message);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn parse_alpha(value: &str) -> std::result::Result<f32, String> {
    let alpha: f32 = value.parse().map_err(|e| format!("{}", e))?;
    if (0.0..=1.0).contains(&alpha) {
        Ok(alpha)
    } else {
        Err(format!("{} is not between 0.0 and 1.0", alpha))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_message_names_output() {
        let message = success_message(Path::new("out/report（添加水印）.pdf"));
        assert_eq!(message, "添加水印成功\n文件路径为: out/report（添加水印）.pdf");
    }

    #[test]
    fn test_parse_alpha_bounds() {
        assert_eq!(parse_alpha("0.5").unwrap(), 0.5);
        assert!(parse_alpha("1.5").is_err());
        assert!(parse_alpha("abc").is_err());
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["watermarker", "-F", "in.pdf"]);
        assert_eq!(cli.text, DEFAULT_TEXT);
        assert_eq!(cli.font, "SimSun");
        assert_eq!(cli.size, 30.0);
        assert_eq!(cli.angle, 30.0);
    }
}
