//! qr-image: encode an image file into a QR code as a `data:` URL.
//!
//! Scanning the result shows the image straight from the code, with no
//! server involved. Only small images fit; `--optimize` shrinks the payload
//! first.

use anyhow::Context;
use clap::Parser;
use qrshare_cli::output::{format_size, truncate_middle, Status};
use qrshare_cli::progress;
use qrshare_core::error::exit_codes;
use qrshare_image::{detect_format, optimize, OptimizeOptions, OptimizeStrategy};
use qrshare_qr::{data_url, encode, mime_for_extension, ErrorCorrection, QrOptions, MAX_CAPACITY_HINT};
use qrshare_telemetry::TelemetryConfig;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "qr-image")]
#[command(about = "Convert an image into a QR code that embeds it")]
#[command(version)]
struct Cli {
    /// Image to embed
    image: PathBuf,

    /// Output PNG
    #[arg(short, long, default_value = "qr_code.png")]
    output: PathBuf,

    /// Pixels per QR module
    #[arg(short = 's', long = "size", default_value_t = 10)]
    box_size: u32,

    /// Quiet zone width in modules
    #[arg(long, default_value_t = 4)]
    border: u32,

    /// Re-encode the image as a small JPEG before embedding
    #[arg(long)]
    optimize: bool,

    /// Size budget for --optimize, in KB
    #[arg(long = "max-size", default_value_t = 100)]
    max_size_kb: u32,

    /// Error correction level (L, M, Q, H)
    #[arg(long = "ec", default_value = "L")]
    error_correction: ErrorCorrection,

    /// Continue even when the payload is too large to scan reliably
    #[arg(short, long)]
    yes: bool,

    /// Log debug details to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    qrshare_telemetry::init_with_config(TelemetryConfig::new(level, false))?;

    if !cli.image.is_file() {
        Status::error(&format!("File not found: {}", cli.image.display()));
        std::process::exit(exit_codes::NOT_FOUND);
    }

    let raw = std::fs::read(&cli.image)
        .with_context(|| format!("Failed to read {}", cli.image.display()))?;
    let extension = cli
        .image
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();

    let (payload, mime) = if cli.optimize {
        optimize_payload(&cli, raw, extension)?
    } else {
        let mime = payload_mime(&raw, extension);
        (raw, mime)
    };

    let url = data_url(&payload, mime);
    Status::info(&format!(
        "Payload: {} ({} characters)",
        truncate_middle(&url, 48),
        url.len()
    ));

    if url.len() > MAX_CAPACITY_HINT {
        Status::warning(&format!(
            "The data URL is longer than {MAX_CAPACITY_HINT} characters; the QR code may be hard to scan"
        ));
        if !cli.yes {
            Status::info("Use --optimize to shrink the image, or pass --yes to continue anyway");
            std::process::exit(exit_codes::VALIDATION_ERROR);
        }
    }

    let options = QrOptions {
        box_size: cli.box_size,
        border: cli.border,
        error_correction: cli.error_correction,
    };

    let spinner = progress::spinner("Rendering QR code...");
    let rendered = encode(&url, &options).and_then(|qr| qr.save(&cli.output).map(|()| qr));
    spinner.finish_and_clear();

    match rendered {
        Ok(qr) => {
            Status::success(&format!(
                "QR code saved to {} ({} modules, {}x{} px)",
                cli.output.display(),
                qr.modules(),
                qr.size_px(),
                qr.size_px()
            ));
            Status::info("Scan it with any device to display the image in a browser");
            Ok(())
        }
        Err(e) => {
            Status::error(&e.to_string());
            std::process::exit(exit_codes::VALIDATION_ERROR);
        }
    }
}

/// Optimize the image, keep a copy next to the original and return the
/// payload to embed.
fn optimize_payload(
    cli: &Cli,
    raw: Vec<u8>,
    extension: &str,
) -> anyhow::Result<(Vec<u8>, &'static str)> {
    let original_len = raw.len();
    let options = OptimizeOptions {
        max_size_kb: cli.max_size_kb,
        ..OptimizeOptions::default()
    };

    let spinner = progress::spinner("Optimizing image...");
    let result = optimize(&raw, &options);
    spinner.finish_and_clear();

    let optimized = result.with_context(|| format!("{} is not a readable image", cli.image.display()))?;

    if optimized.strategy == OptimizeStrategy::Passthrough {
        Status::warning("Could not re-encode the image; embedding the original");
        let mime = payload_mime(&raw, extension);
        return Ok((raw, mime));
    }

    let copy = optimized_path(&cli.image);
    std::fs::write(&copy, &optimized.bytes)
        .with_context(|| format!("Failed to write {}", copy.display()))?;

    Status::success(&format!("Optimized image saved to {}", copy.display()));
    Status::info(&format!(
        "{} -> {} ({}x{})",
        format_size(original_len as u64),
        format_size(optimized.len() as u64),
        optimized.width,
        optimized.height
    ));

    Ok((optimized.into_bytes(), "image/jpeg"))
}

/// MIME type from the file's magic bytes, else from its extension.
fn payload_mime(raw: &[u8], extension: &str) -> &'static str {
    detect_format(raw)
        .map(|format| format.mime_type())
        .unwrap_or_else(|_| mime_for_extension(extension))
}

/// `photo.png` -> `photo_optimized.jpg`
fn optimized_path(image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    image.with_file_name(format!("{stem}_optimized.jpg"))
}
