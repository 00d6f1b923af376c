//! qrshare - upload images and hand out QR codes that link to them
//!
//! Drives the upload service against the configured store: uploads, record
//! lookups, deletion, retention sweeps and statistics.

use anyhow::Result;
use clap::{Parser, Subcommand};
use qrshare_cli::output::{format_count, format_duration, format_size, print_error, Status};
use qrshare_cli::progress;
use qrshare_core::config::Config;
use qrshare_core::error::exit_codes;
use qrshare_core::{Error, ResultExt};
use qrshare_service::{BackgroundSweeper, ServiceSettings, UploadService};
use qrshare_store::MetadataStore;
use qrshare_telemetry::TelemetryConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "qrshare")]
#[command(about = "Share images through QR codes")]
#[command(version)]
struct Cli {
    /// Configuration file (default: qrshare.toml in the usual places)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Optimize and store images, then render their QR codes
    Upload {
        /// Image files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show one stored upload
    Show {
        /// Upload id
        id: String,
    },

    /// Delete an upload and its files
    Delete {
        /// Upload id
        id: String,
    },

    /// Remove uploads older than the retention period
    Sweep {
        /// Keep running and sweep every N seconds
        #[arg(long, value_name = "SECS")]
        every: Option<u64>,
    },

    /// Show totals for the stored uploads
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => fail(&e, cli.json),
    };

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.schema.logging.level.clone()
    };
    qrshare_telemetry::init_with_config(TelemetryConfig::new(level, config.schema.logging.json))?;

    let service = match ServiceSettings::from_config(&config) {
        Ok(settings) => Arc::new(UploadService::new(
            settings,
            MetadataStore::open(&config.schema.storage.data_file),
        )),
        Err(e) => fail(&e, cli.json),
    };

    let result = match cli.command {
        Commands::Upload { files } => run_upload(&service, &files, cli.json),
        Commands::Show { id } => run_show(&service, &id, cli.json),
        Commands::Delete { id } => run_delete(&service, &id, cli.json),
        Commands::Sweep { every } => run_sweep(&service, every, cli.json),
        Commands::Stats => run_stats(&service, cli.json),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => fail(&e, cli.json),
    }
}

fn fail(error: &Error, json: bool) -> ! {
    if json {
        print_json(&serde_json::json!({ "error": error.to_report() }));
    } else {
        print_error(error);
    }
    std::process::exit(exit_codes::for_code(error.code))
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => Status::error(&format!("Failed to serialize output: {e}")),
    }
}

fn run_upload(service: &UploadService, files: &[PathBuf], json: bool) -> qrshare_core::Result<i32> {
    let pb = progress::upload_progress(files.len() as u64);
    let mut outcomes = Vec::with_capacity(files.len());
    let mut exit = exit_codes::SUCCESS;

    for path in files {
        let outcome = upload_one(service, path);
        if let Err(e) = &outcome {
            if exit == exit_codes::SUCCESS {
                exit = exit_codes::for_code(e.code);
            }
        }
        outcomes.push((path, outcome));
        pb.inc(1);
    }
    pb.finish_and_clear();

    if json {
        let entries: Vec<_> = outcomes
            .iter()
            .map(|(path, outcome)| match outcome {
                Ok(receipt) => serde_json::json!({ "file": path, "receipt": receipt }),
                Err(e) => serde_json::json!({ "file": path, "error": e.to_report() }),
            })
            .collect();
        print_json(&entries);
        return Ok(exit);
    }

    for (path, outcome) in &outcomes {
        match outcome {
            Ok(receipt) => {
                Status::success(&format!("{} -> {}", path.display(), receipt.id));
                Status::field("view", &receipt.view_url);
                Status::field("qr", &receipt.qr_url);
                Status::field("download", &receipt.download_url);
            }
            Err(e) => {
                Status::error(&path.display().to_string());
                print_error(e);
            }
        }
    }
    Ok(exit)
}

fn upload_one(service: &UploadService, path: &Path) -> qrshare_core::Result<qrshare_service::UploadReceipt> {
    let raw = std::fs::read(path)
        .map_err(Error::from)
        .context(format!("reading {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    service.handle_upload(&raw, &filename)
}

fn run_show(service: &UploadService, id: &str, json: bool) -> qrshare_core::Result<i32> {
    let record = service.record(id)?;

    if json {
        print_json(&serde_json::json!({
            "id": record.id,
            "record": record,
            "qr_url": service.qr_url(id),
            "download_url": service.download_url(id),
            "image_url": service.image_url(id),
            "download_name": UploadService::qr_download_name(id),
        }));
        return Ok(exit_codes::SUCCESS);
    }

    Status::header(&format!("Upload {}", record.id));
    Status::field("name", &record.original_name);
    Status::field("uploaded", record.upload_time.to_rfc3339());
    Status::field("size", format_size(record.file_size));
    Status::field("view", &record.view_url);
    Status::field("image", service.image_url(id));
    Status::field("qr", service.qr_url(id));
    Status::field("download", service.download_url(id));
    Status::field("image file", record.image_path.display());
    Status::field("qr file", record.qr_path.display());
    Ok(exit_codes::SUCCESS)
}

fn run_delete(service: &UploadService, id: &str, json: bool) -> qrshare_core::Result<i32> {
    if !service.delete(id)? {
        return Err(Error::not_found(id));
    }

    if json {
        print_json(&serde_json::json!({ "deleted": id }));
    } else {
        Status::success(&format!("Deleted {id}"));
    }
    Ok(exit_codes::SUCCESS)
}

fn run_sweep(service: &Arc<UploadService>, every: Option<u64>, json: bool) -> qrshare_core::Result<i32> {
    let report = service.sweep()?;

    if json {
        print_json(&report);
    } else {
        Status::success(&format!(
            "Removed {} and {}",
            format_count(report.records_removed, "expired upload", "expired uploads"),
            format_count(report.orphans_removed, "orphaned file", "orphaned files")
        ));
    }

    let Some(secs) = every.filter(|&s| s > 0) else {
        return Ok(exit_codes::SUCCESS);
    };

    let interval = Duration::from_secs(secs);
    let _sweeper = BackgroundSweeper::spawn(Arc::clone(service), interval)?;
    if !json {
        Status::info(&format!(
            "Sweeping every {}, press Ctrl-C to stop",
            format_duration(interval)
        ));
    }
    loop {
        std::thread::park();
    }
}

fn run_stats(service: &UploadService, json: bool) -> qrshare_core::Result<i32> {
    let stats = service.stats()?;

    if json {
        print_json(&serde_json::json!({
            "stats": stats,
            "metrics": qrshare_telemetry::metrics().export_json(),
        }));
        return Ok(exit_codes::SUCCESS);
    }

    Status::header("Stored uploads");
    Status::field("images", stats.total_images);
    Status::field("total size", format_size(stats.total_size_bytes));
    Status::field("total MB", format!("{:.2}", stats.total_size_mb));
    Ok(exit_codes::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["qrshare", "stats", "--json", "-c", "x.toml"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.command, Commands::Stats));
    }

    #[test]
    fn test_upload_requires_files() {
        assert!(Cli::try_parse_from(["qrshare", "upload"]).is_err());
        let cli = Cli::try_parse_from(["qrshare", "upload", "a.png", "b.jpg"]).unwrap();
        assert!(matches!(cli.command, Commands::Upload { files } if files.len() == 2));
    }

    #[test]
    fn test_sweep_every() {
        let cli = Cli::try_parse_from(["qrshare", "sweep", "--every", "60"]).unwrap();
        assert!(matches!(cli.command, Commands::Sweep { every: Some(60) }));
    }
}
