// src/pipeline.rs
//
// Streaming pipeline controller: drives the per-frame loop
// read -> detect -> track -> reconcile -> attribute -> annotate -> persist,
// and guarantees that every acquired resource is released exactly once no
// matter how the run ends.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use opencv::{highgui, videoio::VideoWriterTrait};
use tracing::{info, warn};

use crate::annotator;
use crate::csv_log::CsvLogger;
use crate::detector::YoloDetector;
use crate::lane_counter::{CountsSnapshot, LaneCounter};
use crate::lane_geometry::LaneLayout;
use crate::reconcile::reconcile;
use crate::tracker::SortTracker;
use crate::types::{centroid, Config, TrackedObject};
use crate::video_processor;

const PREVIEW_WINDOW: &str = "Traffic Analysis";

/// How a run ended. All three are ordinary terminal states followed by the
/// same unconditional teardown; none discards already-written output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Natural end of the input stream.
    Completed,
    /// Quit keypress in the preview window.
    UserStopped,
    /// Interrupt signal delivered to the process.
    Interrupted,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::UserStopped => "stopped by user",
            Self::Interrupted => "interrupted",
        }
    }
}

pub struct RunSummary {
    pub state: RunState,
    pub frames_processed: u64,
    pub counts: CountsSnapshot,
    pub avg_fps: f64,
}

/// Run the full pipeline over the configured input video.
///
/// Setup failures (missing input, unopenable writer, unwritable CSV path)
/// are fatal before any frame is processed. Once streaming, an error from
/// the frame body still goes through teardown before propagating.
pub fn run(
    config: &Config,
    detector: &mut YoloDetector,
    tracker: &mut SortTracker,
    stop_flag: Arc<AtomicBool>,
) -> Result<RunSummary> {
    let mut reader = video_processor::open_input(&config.video.input_path)?;

    let layout = LaneLayout::from_config(&config.lanes, reader.width, reader.height);
    info!("✓ {} lanes configured", layout.lanes().len());
    let mut counter = LaneCounter::new(layout);

    let mut writer = video_processor::create_writer(
        &config.video.output_path,
        reader.width,
        reader.height,
        reader.fps,
    )?;
    let mut logger = CsvLogger::create(&config.video.csv_path)?;
    info!("Results will be written to: {}", config.video.csv_path);

    let progress = if reader.total_frames > 0 {
        ProgressBar::new(reader.total_frames as u64)
    } else {
        ProgressBar::new_spinner()
    };
    progress.set_style(
        ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} frames ({per_sec})")?
            .progress_chars("=>-"),
    );
    progress.set_message("Processing video");

    let start_time = Instant::now();
    let fps = reader.fps;
    let mut frame_idx: u64 = 0;

    let loop_result = (|| -> Result<RunState> {
        loop {
            // Cancellation is cooperative, checked once per frame boundary.
            if stop_flag.load(Ordering::SeqCst) {
                return Ok(RunState::Interrupted);
            }

            let Some(frame) = reader.read_frame()? else {
                return Ok(RunState::Completed);
            };
            frame_idx += 1;

            let detections = detector.detect(&frame.data, frame.width, frame.height)?;
            let boxes = tracker.update(&detections);
            let tracked = reconcile(&detections, &boxes, config.reconcile.iou_threshold);
            let snapshot = counter.attribute(&tracked);

            let annotated = annotator::annotate(&frame, &tracked, counter.layout(), &snapshot)?;
            writer.write(&annotated)?;

            if config.video.show_preview {
                highgui::imshow(PREVIEW_WINDOW, &annotated)?;
                if highgui::wait_key(1)? == i32::from(b'q') {
                    info!("User quit preview early");
                    return Ok(RunState::UserStopped);
                }
            }

            log_lane_records(&mut logger, &counter, &tracked, frame_idx, fps)?;
            progress.inc(1);
        }
    })();

    // CLOSED: reached from every terminal state and from a failed frame
    // body alike. Each resource is released exactly once; the body's error,
    // if any, propagates only after teardown.
    if let Err(e) = reader.release() {
        warn!("Failed to release input stream: {}", e);
    }
    if let Err(e) = writer.release() {
        warn!("Failed to release output writer: {}", e);
    }
    progress.finish();
    if config.video.show_preview {
        if let Err(e) = highgui::destroy_all_windows() {
            warn!("Failed to close preview window: {}", e);
        }
    }
    let log_result = logger.finish();

    let state = loop_result?;
    log_result?;

    let avg_fps = frame_idx as f64 / start_time.elapsed().as_secs_f64().max(f64::EPSILON);
    info!(
        "Run {}: {} frames at {:.1} FPS",
        state.as_str(),
        frame_idx,
        avg_fps
    );

    Ok(RunSummary {
        state,
        frames_processed: frame_idx,
        counts: counter.counts(),
        avg_fps,
    })
}

/// Persist one record per tracked object currently inside a lane. The
/// membership query is the same one the ledger ran for this frame, so the
/// logged lane always agrees with what attribution saw.
fn log_lane_records<W: Write>(
    logger: &mut CsvLogger<W>,
    counter: &LaneCounter,
    tracked: &[TrackedObject],
    frame_idx: u64,
    fps: f64,
) -> Result<()> {
    for obj in tracked {
        let (cx, cy) = centroid(&obj.bbox);
        if let Some(lane_id) = counter.layout().membership(cx, cy) {
            logger.log(obj.track_id, lane_id, frame_idx, frame_idx as f64 / fps)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Detection, TrackedBox, VehicleClass};
    use std::collections::BTreeMap;

    #[test]
    fn test_five_frames_one_count_five_records() {
        // track 1 sits inside lane 2 of a 3-lane layout for five frames:
        // counted exactly once, logged on every frame
        let layout = LaneLayout::vertical_bands(3, 1280, 720, 0.4);
        let mut counter = LaneCounter::new(layout);
        let mut logger = CsvLogger::from_writer(Vec::new()).unwrap();
        let fps = 25.0;

        for frame_idx in 1..=5u64 {
            let detections = vec![Detection {
                bbox: [600.0, 450.0, 680.0, 550.0],
                confidence: 0.9,
                class: VehicleClass::Car,
            }];
            let boxes = vec![TrackedBox {
                bbox: [600.0, 450.0, 680.0, 550.0],
                track_id: 1,
            }];
            let tracked = reconcile(&detections, &boxes, 0.5);
            let snapshot = counter.attribute(&tracked);
            assert_eq!(snapshot[&2], 1);

            log_lane_records(&mut logger, &counter, &tracked, frame_idx, fps).unwrap();
        }

        assert_eq!(counter.counts(), BTreeMap::from([(1, 0), (2, 1), (3, 0)]));

        let written = String::from_utf8(logger.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 6); // header + one record per frame
        for (i, line) in lines.iter().skip(1).enumerate() {
            assert!(line.starts_with(&format!("1,2,{},", i + 1)));
        }
    }

    #[test]
    fn test_no_record_outside_lanes() {
        let layout = LaneLayout::vertical_bands(3, 1280, 720, 0.4);
        let counter = LaneCounter::new(layout);
        let mut logger = CsvLogger::from_writer(Vec::new()).unwrap();

        // centroid above the lane bands
        let tracked = vec![TrackedObject {
            track_id: 4,
            bbox: [600.0, 10.0, 680.0, 110.0],
            confidence: None,
            class: None,
        }];
        log_lane_records(&mut logger, &counter, &tracked, 1, 25.0).unwrap();

        let written = String::from_utf8(logger.into_inner().unwrap()).unwrap();
        assert_eq!(written.lines().count(), 1); // header only
    }

    #[test]
    fn test_record_follows_current_membership() {
        // the ledger keeps the first attribution, but per-frame records
        // report where the vehicle actually is
        let layout = LaneLayout::vertical_bands(3, 1280, 720, 0.4);
        let mut counter = LaneCounter::new(layout);
        let mut logger = CsvLogger::from_writer(Vec::new()).unwrap();

        let in_lane = |x: f32| TrackedObject {
            track_id: 9,
            bbox: [x, 450.0, x + 80.0, 550.0],
            confidence: None,
            class: None,
        };

        let frame1 = vec![in_lane(600.0)]; // lane 2
        counter.attribute(&frame1);
        log_lane_records(&mut logger, &counter, &frame1, 1, 25.0).unwrap();

        let frame2 = vec![in_lane(100.0)]; // drifts into lane 1
        counter.attribute(&frame2);
        log_lane_records(&mut logger, &counter, &frame2, 2, 25.0).unwrap();

        // count stays with the first lane
        assert_eq!(counter.counts(), BTreeMap::from([(1, 0), (2, 1), (3, 0)]));

        let written = String::from_utf8(logger.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert!(lines[1].starts_with("9,2,1,"));
        assert!(lines[2].starts_with("9,1,2,"));
    }
}
