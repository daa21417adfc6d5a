use anyhow::Result;
use clap::{Arg, Command};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{error, info, warn};

mod audio;
mod captions;
mod config;
mod errors;
mod extraction;
mod llm;
mod media;
mod package;
mod processing;
mod script;
mod video;

use crate::config::Config;
use crate::processing::{BatchProcessor, RunOptions, StageTarget};

#[tokio::main]
async fn main() -> Result<()> {
    // Credentials may live in a local .env file.
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("storyreel=info,warn")
        .init();

    let matches = Command::new("storyreel")
        .version("0.1.0")
        .about("Turns e-book chapters into short narrated vertical videos")
        .arg(
            Arg::new("source")
                .short('s')
                .long("source")
                .value_name("FILE")
                .help("Source e-book (.epub) to extract chapters from")
        )
        .arg(
            Arg::new("output-dir")
                .short('o')
                .long("output-dir")
                .value_name("DIR")
                .help("Root directory for scripts, packages and ready videos")
                .default_value("./data")
        )
        .arg(
            Arg::new("stage")
                .long("stage")
                .value_name("STAGE")
                .help("Run the pipeline through this stage: scripts, images, audio or video")
                .default_value("video")
        )
        .arg(
            Arg::new("substories")
                .short('n')
                .long("substories")
                .value_name("NUM")
                .help("Substories requested per chapter")
        )
        .arg(
            Arg::new("skip-video")
                .long("skip-video")
                .help("Stop after audio generation, leaving packages for a later sweep")
                .action(clap::ArgAction::SetTrue)
        )
        .arg(
            Arg::new("video-only")
                .long("video-only")
                .help("Sweep in-progress packages and assemble any that are ready")
                .action(clap::ArgAction::SetTrue)
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue)
        )
        .get_matches();

    let source = matches.get_one::<String>("source").map(PathBuf::from);
    let output_dir = PathBuf::from(matches.get_one::<String>("output-dir").unwrap());
    let stage = StageTarget::from_str(matches.get_one::<String>("stage").unwrap())?;
    let skip_video = matches.get_flag("skip-video");
    let video_only = matches.get_flag("video-only");
    let verbose = matches.get_flag("verbose");

    if verbose {
        info!("Verbose logging enabled");
    }

    // Load configuration
    let mut config = Config::load().unwrap_or_else(|e| {
        warn!("Failed to load config, using defaults: {}", e);
        Config::from_env()
    });
    config.storage.base_dir = output_dir;
    if let Some(count) = matches.get_one::<String>("substories") {
        config.script.substories_per_chapter = count.parse()?;
    }
    config.validate()?;

    info!("🚀 Storyreel starting...");
    info!("\n{}", config.summary());

    if source.is_none() && !video_only {
        info!("No source given; resuming from scripts already on disk");
    }

    if let Some(path) = &source {
        if !path.exists() {
            error!("Source document does not exist: {}", path.display());
            return Err(anyhow::anyhow!("Source document not found"));
        }
    }

    let options = RunOptions {
        source,
        stage,
        skip_video,
        video_only,
    };

    let processor = BatchProcessor::new(config);

    let start_time = std::time::Instant::now();
    let results = processor.run(&options).await?;
    let duration = start_time.elapsed();

    // Print results
    info!("🎉 Processing completed in {:.2}s", duration.as_secs_f64());
    info!("✅ Successful: {}", results.successful);
    info!("❌ Failed: {}", results.failed);
    info!("📊 Success rate: {:.1}%",
        if results.total > 0 {
            results.successful as f64 / results.total as f64 * 100.0
        } else {
            0.0
        }
    );

    Ok(())
}
