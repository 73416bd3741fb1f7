// src/video_processor.rs
//
// Thin wrappers around OpenCV video input/output.

use anyhow::{Context, Result};
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst, VideoWriter},
};
use std::path::Path;
use tracing::info;

use crate::types::Frame;

pub struct VideoReader {
    cap: VideoCapture,
    pub fps: f64,
    pub total_frames: i32,
    pub current_frame: i32,
    pub width: i32,
    pub height: i32,
}

/// Open the input video and validate its properties. Fatal if the file is
/// missing, unopenable, or reports unusable dimensions/frame-rate.
pub fn open_input(path: &str) -> Result<VideoReader> {
    if !Path::new(path).exists() {
        anyhow::bail!("input video not found: {}", path);
    }

    info!("Opening video: {}", path);
    let cap = VideoCapture::from_file(path, videoio::CAP_ANY)?;
    if !cap.is_opened()? {
        anyhow::bail!("could not open video: {}", path);
    }

    let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;
    let total_frames = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_COUNT)? as i32;
    let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)? as i32;
    let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)? as i32;

    if width <= 0 || height <= 0 {
        anyhow::bail!("input video reports invalid dimensions {}x{}", width, height);
    }
    if !fps.is_finite() || fps <= 0.0 {
        anyhow::bail!("input video reports invalid frame rate {}", fps);
    }

    info!(
        "Video properties: {}x{} @ {:.1} FPS, {} frames",
        width, height, fps, total_frames
    );

    Ok(VideoReader {
        cap,
        fps,
        total_frames,
        current_frame: 0,
        width,
        height,
    })
}

impl VideoReader {
    /// Next frame as RGB bytes, or None at end of stream.
    pub fn read_frame(&mut self) -> Result<Option<Frame>> {
        let mut mat = Mat::default();

        if !VideoCaptureTrait::read(&mut self.cap, &mut mat)? || mat.empty() {
            return Ok(None);
        }

        self.current_frame += 1;

        let mut rgb_mat = Mat::default();
        imgproc::cvt_color(&mat, &mut rgb_mat, imgproc::COLOR_BGR2RGB, 0)?;
        let data = rgb_mat.data_bytes()?.to_vec();

        Ok(Some(Frame {
            data,
            width: self.width as usize,
            height: self.height as usize,
        }))
    }

    pub fn release(&mut self) -> Result<()> {
        self.cap.release()?;
        Ok(())
    }
}

/// Open the output writer, sized to match the input dimensions and frame
/// rate. Fatal if the writer cannot be opened.
pub fn create_writer(path: &str, width: i32, height: i32, fps: f64) -> Result<VideoWriter> {
    if let Some(parent) = Path::new(path).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory for {}", path))?;
    }

    let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
    let writer = VideoWriter::new(path, fourcc, fps, core::Size::new(width, height), true)?;
    if !writer.is_opened()? {
        anyhow::bail!("could not open video writer for {}", path);
    }

    info!("Output video: {}", path);
    Ok(writer)
}
