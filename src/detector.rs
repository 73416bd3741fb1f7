// src/detector.rs
//
// YOLOv8 vehicle detection via ONNX Runtime. Letterbox preprocessing,
// vehicle-class filtering, and NMS; returns boxes in original image
// coordinates.

use std::path::Path;

use anyhow::{bail, Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use tracing::{debug, info};

use crate::types::{Detection, ModelConfig, VehicleClass};

const INPUT_SIZE: usize = 640;
const NUM_CLASSES: usize = 80;
const NUM_PREDICTIONS: usize = 8400;
const NMS_IOU_THRESHOLD: f32 = 0.45;

/// Letterbox transform parameters, needed to map model-space boxes back to
/// original image coordinates.
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

pub struct YoloDetector {
    session: Session,
    confidence_threshold: f32,
}

impl YoloDetector {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        if !Path::new(&config.path).exists() {
            bail!(
                "model weights not found at {}; download yolov8n.onnx and place it there",
                config.path
            );
        }

        info!("Loading YOLO model: {}", config.path);
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(&config.path)
            .context("failed to load detection model")?;
        info!("✓ Vehicle detector ready");

        Ok(Self {
            session,
            confidence_threshold: config.confidence_threshold,
        })
    }

    /// Run detection on one RGB frame. Only vehicle classes come back;
    /// everything else the model saw is dropped during postprocessing.
    pub fn detect(&mut self, frame: &[u8], width: usize, height: usize) -> Result<Vec<Detection>> {
        let (input, letterbox) = preprocess(frame, width, height);
        let output = self.infer(&input)?;
        let detections = self.postprocess(&output, &letterbox);
        debug!("Detected {} vehicles", detections.len());
        Ok(detections)
    }

    fn infer(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let shape = [1, 3, INPUT_SIZE, INPUT_SIZE];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.to_vec().into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs!["images" => input_value])?;
        let (_, data) = outputs[0].try_extract_tensor::<f32>()?;

        Ok(data.to_vec())
    }

    /// Parse the [1, 84, 8400] output tensor: per prediction a center-format
    /// box and 80 class scores. Keep the best class when it is a vehicle and
    /// clears the confidence threshold, undo the letterbox, then NMS.
    fn postprocess(&self, output: &[f32], letterbox: &Letterbox) -> Vec<Detection> {
        let mut detections = Vec::new();

        for i in 0..NUM_PREDICTIONS {
            let cx = output[i];
            let cy = output[NUM_PREDICTIONS + i];
            let w = output[NUM_PREDICTIONS * 2 + i];
            let h = output[NUM_PREDICTIONS * 3 + i];

            let mut best_score = 0.0f32;
            let mut best_class = 0;
            for c in 0..NUM_CLASSES {
                let score = output[NUM_PREDICTIONS * (4 + c) + i];
                if score > best_score {
                    best_score = score;
                    best_class = c;
                }
            }

            if best_score < self.confidence_threshold {
                continue;
            }
            let Some(class) = VehicleClass::from_coco(best_class) else {
                continue;
            };

            let x1 = (cx - w / 2.0 - letterbox.pad_x) / letterbox.scale;
            let y1 = (cy - h / 2.0 - letterbox.pad_y) / letterbox.scale;
            let x2 = (cx + w / 2.0 - letterbox.pad_x) / letterbox.scale;
            let y2 = (cy + h / 2.0 - letterbox.pad_y) / letterbox.scale;

            detections.push(Detection {
                bbox: [x1, y1, x2, y2],
                confidence: best_score,
                class,
            });
        }

        nms(detections, NMS_IOU_THRESHOLD)
    }
}

/// Scale into a 640x640 canvas preserving aspect ratio, pad with gray,
/// normalize to [0, 1] and reorder HWC -> CHW.
fn preprocess(src: &[u8], src_w: usize, src_h: usize) -> (Vec<f32>, Letterbox) {
    let scale = (INPUT_SIZE as f32 / src_w as f32).min(INPUT_SIZE as f32 / src_h as f32);
    let scaled_w = (src_w as f32 * scale) as usize;
    let scaled_h = (src_h as f32 * scale) as usize;
    let pad_x = (INPUT_SIZE - scaled_w) as f32 / 2.0;
    let pad_y = (INPUT_SIZE - scaled_h) as f32 / 2.0;

    let resized = resize_bilinear(src, src_w, src_h, scaled_w, scaled_h);

    let mut canvas = vec![114u8; INPUT_SIZE * INPUT_SIZE * 3];
    for y in 0..scaled_h {
        for x in 0..scaled_w {
            let src_idx = (y * scaled_w + x) * 3;
            let dst_idx = ((y + pad_y as usize) * INPUT_SIZE + x + pad_x as usize) * 3;
            canvas[dst_idx..dst_idx + 3].copy_from_slice(&resized[src_idx..src_idx + 3]);
        }
    }

    let mut input = vec![0.0f32; 3 * INPUT_SIZE * INPUT_SIZE];
    for c in 0..3 {
        for y in 0..INPUT_SIZE {
            for x in 0..INPUT_SIZE {
                let hwc_idx = (y * INPUT_SIZE + x) * 3 + c;
                let chw_idx = c * INPUT_SIZE * INPUT_SIZE + y * INPUT_SIZE + x;
                input[chw_idx] = canvas[hwc_idx] as f32 / 255.0;
            }
        }
    }

    (
        input,
        Letterbox {
            scale,
            pad_x,
            pad_y,
        },
    )
}

fn resize_bilinear(src: &[u8], src_w: usize, src_h: usize, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let mut dst = vec![0u8; dst_h * dst_w * 3];
    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for dy in 0..dst_h {
        for dx in 0..dst_w {
            let sx = dx as f32 * x_ratio;
            let sy = dy as f32 * y_ratio;
            let sx0 = sx.floor() as usize;
            let sy0 = sy.floor() as usize;
            let sx1 = (sx0 + 1).min(src_w - 1);
            let sy1 = (sy0 + 1).min(src_h - 1);
            let fx = sx - sx0 as f32;
            let fy = sy - sy0 as f32;

            for c in 0..3 {
                let p00 = src[(sy0 * src_w + sx0) * 3 + c] as f32;
                let p10 = src[(sy0 * src_w + sx1) * 3 + c] as f32;
                let p01 = src[(sy1 * src_w + sx0) * 3 + c] as f32;
                let p11 = src[(sy1 * src_w + sx1) * 3 + c] as f32;

                let val = p00 * (1.0 - fx) * (1.0 - fy)
                    + p10 * fx * (1.0 - fy)
                    + p01 * (1.0 - fx) * fy
                    + p11 * fx * fy;

                dst[(dy * dst_w + dx) * 3 + c] = val.round() as u8;
            }
        }
    }
    dst
}

fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Detection> = Vec::new();
    'candidates: for det in detections {
        for kept in &keep {
            if box_iou(&kept.bbox, &det.bbox) >= iou_threshold {
                continue 'candidates;
            }
        }
        keep.push(det);
    }
    keep
}

fn box_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    let union = area_a + area_b - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f32, y1: f32, x2: f32, y2: f32, conf: f32) -> Detection {
        Detection {
            bbox: [x1, y1, x2, y2],
            confidence: conf,
            class: VehicleClass::Car,
        }
    }

    #[test]
    fn test_nms_suppresses_overlapping_boxes() {
        let detections = vec![
            det(0.0, 0.0, 100.0, 100.0, 0.9),
            det(5.0, 5.0, 105.0, 105.0, 0.8),
            det(500.0, 500.0, 600.0, 600.0, 0.7),
        ];
        let kept = nms(detections, 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.7);
    }

    #[test]
    fn test_nms_keeps_highest_confidence_first() {
        let detections = vec![
            det(0.0, 0.0, 100.0, 100.0, 0.5),
            det(2.0, 2.0, 102.0, 102.0, 0.95),
        ];
        let kept = nms(detections, 0.45);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, 0.95);
    }

    #[test]
    fn test_letterbox_geometry_for_720p() {
        let frame = vec![0u8; 1280 * 720 * 3];
        let (input, letterbox) = preprocess(&frame, 1280, 720);
        assert_eq!(input.len(), 3 * 640 * 640);
        assert!((letterbox.scale - 0.5).abs() < 1e-6);
        assert!((letterbox.pad_x - 0.0).abs() < 1e-6);
        // 720 * 0.5 = 360 scaled height, centered vertically
        assert!((letterbox.pad_y - 140.0).abs() < 1e-6);
    }
}
