//! faceloom entry point: HTTP service or one-shot batch scan.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use faceloom::config::Settings;
use faceloom::models::RunParameters;
use faceloom::services::bucket::BucketGranularity;
use faceloom::services::collage::{self, CollageOptions, PaperFormat};
use faceloom::services::exif_reader::ExifCaptureTimeReader;
use faceloom::services::face_backend::{FaceDetector, FaceEmbedder, FaceTool};
use faceloom::services::selection::{self, SelectionPolicy, SortMode};
use faceloom::services::{PipelineOrchestrator, RunRegistry};
use faceloom::AppState;

#[derive(Parser)]
#[command(name = "faceloom", about = "Photo face clustering and collage service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API server
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Process a folder once and render per-bucket collages, without the API
    Scan {
        folder: PathBuf,
        /// Bucket granularity: day, week, month, or year
        #[arg(long, default_value = "month")]
        bucket: String,
        #[arg(long, default_value_t = 1600)]
        max_edge: u32,
        #[arg(long, default_value_t = 48)]
        min_face_px: u32,
        #[arg(long, default_value_t = 256)]
        thumb_edge: u32,
        /// Feed originals to the detector instead of downscaling first
        #[arg(long)]
        no_downscale: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::load().context("loading settings")?;

    match cli.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                settings.host = host;
            }
            if let Some(port) = port {
                settings.port = port;
            }
            serve(settings).await
        }
        Command::Scan {
            folder,
            bucket,
            max_edge,
            min_face_px,
            thumb_edge,
            no_downscale,
        } => {
            let bucket: BucketGranularity = bucket.parse()?;
            let parameters = RunParameters {
                folder,
                bucket,
                max_edge,
                min_face_px,
                thumb_edge,
                downscale_detector: !no_downscale,
            };
            scan_once(settings, parameters).await
        }
    }
}

fn build_orchestrator(settings: &Arc<Settings>) -> Arc<PipelineOrchestrator> {
    let tool = FaceTool::new(settings.face_tool.clone());
    let detector: Arc<dyn FaceDetector> = Arc::new(tool.clone());
    let embedder: Arc<dyn FaceEmbedder> = Arc::new(tool);
    Arc::new(PipelineOrchestrator::new(
        Arc::clone(settings),
        Arc::new(ExifCaptureTimeReader),
        detector,
        embedder,
    ))
}

async fn serve(settings: Settings) -> Result<()> {
    settings
        .ensure_directories()
        .context("creating output directories")?;
    let settings = Arc::new(settings);

    info!("Starting faceloom");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Face tool: {}", settings.face_tool);

    let registry = Arc::new(RunRegistry::new());
    let orchestrator = build_orchestrator(&settings);
    let state = AppState::new(Arc::clone(&settings), registry, orchestrator);
    let app = faceloom::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.bind_address())
        .await
        .with_context(|| format!("binding {}", settings.bind_address()))?;
    info!("Listening on http://{}", settings.bind_address());
    info!("Health check: http://{}/api/health", settings.bind_address());

    axum::serve(listener, app).await?;
    Ok(())
}

async fn scan_once(settings: Settings, parameters: RunParameters) -> Result<()> {
    settings
        .ensure_directories()
        .context("creating output directories")?;
    let settings = Arc::new(settings);

    let orchestrator = build_orchestrator(&settings);
    let context = orchestrator
        .run_once(parameters)
        .await
        .context("face backend unavailable")?;

    println!(
        "Run {} completed with phase {:?}",
        context.run_id, context.phase
    );
    for skipped in &context.skipped {
        println!("Skipped {}: {}", skipped.path, skipped.reason);
    }

    let options = CollageOptions {
        tile_size: 160,
        columns: 12,
        padding_x: 4,
        padding_y: 4,
        margin: 32,
        background: "white".to_string(),
        sort: SortMode::ByTime,
        max_faces: 300,
        output_format: PaperFormat::A4,
        preview: false,
    };
    for summary in context.bucket_summaries() {
        let selected = selection::select_faces(
            &context,
            &summary.key,
            SelectionPolicy::AcceptedAndUnreviewed,
            &[],
        );
        let ordered = selection::order_faces(&context, selected, options.sort, &summary.key);
        match collage::render_collage(&context, &summary.key, &ordered, &options, &settings) {
            Ok(output) => println!(
                "Collage for {}: {} ({}x{})",
                summary.label,
                output.output_path.display(),
                output.width,
                output.height
            ),
            Err(collage::CollageError::NoFaces) => continue,
            Err(e) => return Err(e).context("rendering collage"),
        }
    }
    Ok(())
}
