// src/main.rs

mod annotator;
mod config;
mod csv_log;
mod detector;
mod lane_counter;
mod lane_geometry;
mod pipeline;
mod reconcile;
mod tracker;
mod types;
mod video_processor;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use detector::YoloDetector;
use tracker::SortTracker;
use types::Config;

const CONFIG_PATH: &str = "config.yaml";

fn main() -> Result<()> {
    let config = Config::load(CONFIG_PATH)?;

    // RUST_LOG wins over the configured level when set.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("traffic_flow={},ort=warn", config.logging.level))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚗 Traffic Flow Analysis starting");
    info!(
        "Input: {} | Output: {} | Preview: {}",
        config.video.input_path, config.video.output_path, config.video.show_preview
    );

    let stop_flag = Arc::new(AtomicBool::new(false));
    {
        let stop_flag = stop_flag.clone();
        ctrlc::set_handler(move || {
            stop_flag.store(true, Ordering::SeqCst);
        })?;
    }

    let mut detector = YoloDetector::new(&config.model)?;
    let mut tracker = SortTracker::new(config.tracker.clone());
    info!(
        "✓ Tracker ready (max_age={}, min_hits={}, iou={:.2})",
        config.tracker.max_age, config.tracker.min_hits, config.tracker.iou_threshold
    );

    let summary = pipeline::run(&config, &mut detector, &mut tracker, stop_flag)?;

    if summary.state == pipeline::RunState::Interrupted {
        warn!("Processing interrupted; partial output preserved");
    }

    info!("Traffic summary ({}):", summary.state.as_str());
    for (lane_id, count) in &summary.counts {
        info!("  Lane {}: {} vehicles", lane_id, count);
    }
    info!(
        "{} frames processed at {:.1} FPS",
        summary.frames_processed, summary.avg_fps
    );

    Ok(())
}
