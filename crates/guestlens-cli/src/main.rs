use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use guestlens_core::normalize::FormatNormalizer;
use guestlens_core::{
    FaceFinder, FaceMatchError, HttpImageFetcher, ModelLoader, OnnxModelLoader, ReferencePhoto,
    ScanReport, Sensitivity,
};
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod config;
mod gallery;

use config::Config;

#[derive(Parser)]
#[command(name = "guestlens", about = "Find your photos in a wedding gallery")]
struct Cli {
    /// TOML config file; GUESTLENS_* environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find gallery photos that contain the face in your photo
    Find {
        /// Your photo (JPG, PNG, HEIC, ...)
        #[arg(short, long)]
        photo: PathBuf,
        /// Gallery listing: JSON array of images
        #[arg(short, long)]
        gallery: PathBuf,
        /// Match sensitivity, 0.15 (more photos) to 0.70 (stricter)
        #[arg(short, long)]
        sensitivity: Option<f32>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
        /// If nothing matches, clear the cache and retry at sensitivity 0.20
        #[arg(long)]
        retry_lower: bool,
    },
    /// Load the face models and report their status
    Models,
    /// Convert a HEIC/HEIF photo to JPEG the way uploads are normalized
    Convert {
        #[arg(short, long)]
        photo: PathBuf,
        #[arg(short, long)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("GUESTLENS_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env(),
    };

    match cli.command {
        Commands::Find {
            photo,
            gallery,
            sensitivity,
            json,
            retry_lower,
        } => {
            let threshold = sensitivity.map(Sensitivity::new).unwrap_or(config.sensitivity);
            let report = run_find(&config, photo, gallery, threshold, retry_lower).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Models => {
            let loader = OnnxModelLoader::from_dir(&config.model_dir);
            let missing: Vec<String> = loader
                .paths()
                .missing()
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            let loaded = tokio::task::spawn_blocking(move || loader.load().map(|_| ()))
                .await
                .context("model loader panicked")?;
            let status = json!({
                "model_dir": config.model_dir.display().to_string(),
                "loaded": loaded.is_ok(),
                "missing": missing,
                "error": loaded.as_ref().err().map(|e| e.to_string()),
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Convert { photo, out } => {
            let input = ReferencePhoto::from_path(&photo)?;
            let normalizer = FormatNormalizer::new(config.heif_converter());
            let normalized = normalizer.normalize(input);
            std::fs::write(&out, &normalized.photo.bytes)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!(
                "{}-> {} ({})",
                normalized.conversion_info(),
                out.display(),
                if normalized.converted() { "converted" } else { "copied unchanged" }
            );
        }
    }

    Ok(())
}

/// Run the whole flow on a blocking worker; progress lines arrive over a
/// channel and overwrite each other on stderr.
async fn run_find(
    config: &Config,
    photo: PathBuf,
    gallery: PathBuf,
    threshold: Sensitivity,
    retry_lower: bool,
) -> Result<ScanReport> {
    let images = gallery::load_listing(&gallery)?;
    let reference = ReferencePhoto::from_path(&photo)?;

    let mut finder = FaceFinder::new(
        OnnxModelLoader::from_dir(&config.model_dir),
        HttpImageFetcher::new(Duration::from_secs(config.fetch_timeout_secs)),
        config.heif_converter(),
        &config.pipeline,
    );

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let printer = tokio::spawn(async move {
        let mut stderr = std::io::stderr();
        while let Some(line) = rx.recv().await {
            let _ = write!(stderr, "\r\x1b[2K{line}");
            let _ = stderr.flush();
        }
        let _ = writeln!(stderr);
    });

    let worker = tokio::task::spawn_blocking(move || -> Result<ScanReport, FaceMatchError> {
        let progress = |step: &str| {
            let _ = tx.send(step.to_string());
        };
        let report = finder.find_matches(reference.clone(), &images, threshold, &progress)?;
        if retry_lower && report.matches.is_empty() {
            return finder.retry_with_lower_sensitivity(reference, &images, &progress);
        }
        Ok(report)
    });
    let result = worker.await.context("face matching worker panicked")?;
    // The sender was dropped with the worker closure; the printer drains and exits.
    let _ = printer.await;

    result.map_err(|e| {
        if let Some(tips) = e.tips() {
            eprintln!("{tips}");
        }
        let message = e.user_message();
        anyhow::Error::new(e).context(message)
    })
}

fn print_report(report: &ScanReport) {
    println!("{}", report.summary_message);
    for m in &report.matches {
        let url = m.image.full_url.as_deref().unwrap_or(&m.image.url);
        println!("{:>3}. {:.3}  {}  {}", m.rank, m.similarity, m.image.filename, url);
    }
    let s = &report.stats;
    println!(
        "scanned {} of {} images ({} cached, {} failed, {} without faces)",
        s.scanned + s.cached,
        report.total_images,
        s.cached,
        s.failed,
        s.no_faces
    );
}
