// Sightline capture client

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use sightline_cli::{
    CapturePipeline, CaptureTimer, Dashboard, DirectorySource, FrameEncoder, FrameSource,
    ImageFileSource, VisionClient,
};
use sightline_core::SightlineConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sightline", version, about = "Capture frames and send them for object detection")]
struct Cli {
    /// Configuration file (JSON, TOML or YAML)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Detection server URL, overrides SIGHTLINE_API_URL
    #[arg(short, long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture frames on an interval and show a live dashboard
    Watch {
        /// Image file or directory of images used as the camera
        source: PathBuf,

        /// Capture interval in milliseconds
        #[arg(short, long)]
        interval_ms: Option<u64>,
    },
    /// Capture and upload a single frame
    Snap {
        /// Image file to upload
        image: PathBuf,
    },
    /// List the most recent detections
    List {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Fetch one detection by id
    Get { id: String },
    /// Check that the server is up
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = SightlineConfig::load(cli.config.as_deref())?;
    if let Some(server) = cli.server {
        config.capture.server_url = server;
    }
    init_tracing(&config);

    let client = VisionClient::from_config(&config.capture)?;

    match cli.command {
        Command::Watch { source, interval_ms } => {
            if let Some(interval_ms) = interval_ms {
                config.capture.interval_ms = interval_ms;
            }
            watch(&config, client, open_source(&source)?).await
        }
        Command::Snap { image } => {
            let encoder = FrameEncoder::new(config.capture.jpeg_quality);
            let frame = match encoder.capture(&ImageFileSource::new(&image)) {
                Some(frame) => frame,
                None => bail!("could not read an image from {}", image.display()),
            };
            let result = client.detect(frame).await?;
            print_json(&result)
        }
        Command::List { limit } => print_json(&client.list_recent(limit).await?),
        Command::Get { id } => print_json(&client.get_by_id(&id).await?),
        Command::Health => print_json(&client.health_check().await?),
    }
}

fn init_tracing(config: &SightlineConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    // Logs go to stderr so the dashboard and JSON output stay clean.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn open_source(path: &Path) -> anyhow::Result<Arc<dyn FrameSource>> {
    if path.is_dir() {
        let source = DirectorySource::open(path)
            .with_context(|| format!("reading frame directory {}", path.display()))?;
        if source.is_empty() {
            warn!("{} contains no images; every cycle will be skipped", path.display());
        }
        Ok(Arc::new(source))
    } else {
        Ok(Arc::new(ImageFileSource::new(path)))
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn watch(config: &SightlineConfig, client: VisionClient, source: Arc<dyn FrameSource>) -> anyhow::Result<()> {
    let dashboard = Arc::new(Mutex::new(Dashboard::new(config.capture.history_capacity)));
    let pipeline = CapturePipeline::new(
        source.clone(),
        FrameEncoder::new(config.capture.jpeg_quality),
        client,
        dashboard.clone(),
    );

    pipeline.check_health().await;
    match pipeline.load_recent(config.capture.history_capacity).await {
        Ok(count) => info!("Loaded {} recent detection(s)", count),
        Err(e) => warn!("Error fetching recent detections: {}", e),
    }

    let timer = CaptureTimer::from_millis(config.capture.interval_ms)?;
    dashboard.lock().set_capturing(true);
    info!(
        "Capturing from {} every {:?}",
        source.describe(),
        timer.interval()
    );

    let cycle = pipeline.clone();
    timer.start(move || {
        let cycle = cycle.clone();
        async move {
            cycle.run_cycle().await;
        }
    });

    let mut redraw = tokio::time::interval(Duration::from_millis(500));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = redraw.tick() => {
                let mut state = dashboard.lock();
                state.expire(Instant::now());
                // Clear the screen and home the cursor.
                print!("\x1b[2J\x1b[H{}", state.render());
            }
        }
    }

    timer.stop();
    dashboard.lock().set_capturing(false);
    info!("Capture stopped");
    Ok(())
}
