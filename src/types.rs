use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub tracker: TrackerConfig,
    pub reconcile: ReconcileConfig,
    pub lanes: LanesConfig,
    pub video: VideoConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: String,
    pub confidence_threshold: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: "models/yolov8n.onnx".to_string(),
            confidence_threshold: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Frames a track survives without a detection before expiry.
    pub max_age: u32,
    /// Consecutive hits required before a track is reported.
    pub min_hits: u32,
    /// Minimum IoU to associate a detection with an existing track.
    pub iou_threshold: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_age: 10,
            min_hits: 3,
            iou_threshold: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Minimum IoU for a detection to donate its label to a tracked box.
    /// A heuristic cutoff, kept configurable rather than baked in.
    pub iou_threshold: f32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self { iou_threshold: 0.5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanesConfig {
    /// Number of derived lanes when no explicit polygons are given.
    pub count: u32,
    /// Vertical start of the derived lane bands as a fraction of frame height.
    pub height_ratio: f32,
    /// Explicit lane polygons, lane id -> vertices. Overrides derivation.
    pub polygons: Option<BTreeMap<u32, Vec<(i32, i32)>>>,
}

impl Default for LanesConfig {
    fn default() -> Self {
        Self {
            count: 3,
            height_ratio: 0.4,
            polygons: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub input_path: String,
    pub output_path: String,
    pub csv_path: String,
    pub show_preview: bool,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            input_path: "data/traffic_video.mp4".to_string(),
            output_path: "outputs/processed_video.mp4".to_string(),
            csv_path: "outputs/results.csv".to_string(),
            show_preview: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// One decoded video frame, RGB, row-major HWC.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

/// Closed vehicle vocabulary. Detections outside it cannot be represented,
/// so non-vehicle classes never leak past the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleClass {
    Car,
    Motorbike,
    Bus,
    Truck,
}

impl VehicleClass {
    /// COCO class id -> vehicle class. Non-vehicle ids map to None.
    pub fn from_coco(class_id: usize) -> Option<Self> {
        match class_id {
            2 => Some(Self::Car),
            3 => Some(Self::Motorbike),
            5 => Some(Self::Bus),
            7 => Some(Self::Truck),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Car => "car",
            Self::Motorbike => "motorbike",
            Self::Bus => "bus",
            Self::Truck => "truck",
        }
    }
}

/// One detector output for a single frame. Rebuilt every frame, never
/// persisted across frames.
#[derive(Debug, Clone)]
pub struct Detection {
    /// [x1, y1, x2, y2] in original image pixels, x1 < x2, y1 < y2.
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub class: VehicleClass,
}

/// Anonymous tracker output: a box with a persistent identity.
#[derive(Debug, Clone, Copy)]
pub struct TrackedBox {
    pub bbox: [f32; 4],
    pub track_id: u32,
}

/// A tracked box with label metadata recovered by reconciliation.
/// Both options are None on frames where no detection matched.
#[derive(Debug, Clone)]
pub struct TrackedObject {
    pub track_id: u32,
    pub bbox: [f32; 4],
    pub confidence: Option<f32>,
    pub class: Option<VehicleClass>,
}

/// Bounding-box midpoint truncated to integer pixel coordinates.
pub fn centroid(bbox: &[f32; 4]) -> (i32, i32) {
    let cx = (bbox[0] + bbox[2]) / 2.0;
    let cy = (bbox[1] + bbox[3]) / 2.0;
    (cx as i32, cy as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vehicle_class_mapping() {
        assert_eq!(VehicleClass::from_coco(2), Some(VehicleClass::Car));
        assert_eq!(VehicleClass::from_coco(3), Some(VehicleClass::Motorbike));
        assert_eq!(VehicleClass::from_coco(5), Some(VehicleClass::Bus));
        assert_eq!(VehicleClass::from_coco(7), Some(VehicleClass::Truck));
        assert_eq!(VehicleClass::from_coco(0), None); // person
        assert_eq!(VehicleClass::from_coco(9), None); // traffic light
    }

    #[test]
    fn test_centroid_truncates() {
        assert_eq!(centroid(&[100.0, 150.0, 201.0, 301.0]), (150, 225));
        assert_eq!(centroid(&[0.0, 0.0, 5.0, 5.0]), (2, 2));
    }
}
