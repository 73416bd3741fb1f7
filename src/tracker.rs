// src/tracker.rs
//
// Multi-object tracker assigning persistent ids to vehicle detections.
// Greedy IoU association over linearly-predicted boxes, with bounded
// coasting through missed frames and hit-count confirmation. The contract
// is the `update` signature and id stability; everything else is internal.

use tracing::debug;

use crate::types::{Detection, TrackedBox, TrackerConfig};

#[derive(Debug, Clone)]
struct Track {
    id: u32,
    bbox: [f32; 4],
    /// Center displacement over the last matched frame, used as a constant
    /// velocity estimate while predicting and coasting.
    velocity: (f32, f32),
    hits: u32,
    time_since_update: u32,
}

impl Track {
    fn new(id: u32, bbox: [f32; 4]) -> Self {
        Self {
            id,
            bbox,
            velocity: (0.0, 0.0),
            hits: 1,
            time_since_update: 0,
        }
    }

    fn predict(&mut self) {
        let (dx, dy) = self.velocity;
        self.bbox = [
            self.bbox[0] + dx,
            self.bbox[1] + dy,
            self.bbox[2] + dx,
            self.bbox[3] + dy,
        ];
    }

    fn center(&self) -> (f32, f32) {
        (
            (self.bbox[0] + self.bbox[2]) * 0.5,
            (self.bbox[1] + self.bbox[3]) * 0.5,
        )
    }

    fn update(&mut self, bbox: [f32; 4]) {
        let (px, py) = self.center();
        let cx = (bbox[0] + bbox[2]) * 0.5;
        let cy = (bbox[1] + bbox[3]) * 0.5;
        self.velocity = (cx - px, cy - py);
        self.bbox = bbox;
        self.hits += 1;
        self.time_since_update = 0;
    }
}

pub struct SortTracker {
    config: TrackerConfig,
    tracks: Vec<Track>,
    next_id: u32,
    frame_count: u64,
}

impl SortTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            next_id: 1,
            frame_count: 0,
        }
    }

    /// Feed one frame's detections; returns the boxes of tracks that were
    /// matched this frame and have cleared the confirmation threshold.
    /// Tracks unseen for more than `max_age` frames expire silently;
    /// callers must not assume an id persists beyond what each call returns.
    pub fn update(&mut self, detections: &[Detection]) -> Vec<TrackedBox> {
        self.frame_count += 1;

        for track in &mut self.tracks {
            track.predict();
        }

        // Greedy association: best IoU pair first, each side used once.
        let mut pairs: Vec<(usize, usize, f32)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            for (di, det) in detections.iter().enumerate() {
                let score = iou(&track.bbox, &det.bbox);
                if score >= self.config.iou_threshold {
                    pairs.push((ti, di, score));
                }
            }
        }
        pairs.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

        let mut track_matched = vec![false; self.tracks.len()];
        let mut det_matched = vec![false; detections.len()];
        for (ti, di, _) in pairs {
            if track_matched[ti] || det_matched[di] {
                continue;
            }
            track_matched[ti] = true;
            det_matched[di] = true;
            self.tracks[ti].update(detections[di].bbox);
        }

        for (ti, matched) in track_matched.iter().enumerate() {
            if !matched {
                self.tracks[ti].time_since_update += 1;
            }
        }

        for (di, matched) in det_matched.iter().enumerate() {
            if !matched {
                let track = Track::new(self.next_id, detections[di].bbox);
                debug!("New track {} created", self.next_id);
                self.next_id += 1;
                self.tracks.push(track);
            }
        }

        let max_age = self.config.max_age;
        self.tracks.retain(|t| {
            if t.time_since_update > max_age {
                debug!("Track {} expired after {} missed frames", t.id, t.time_since_update);
                false
            } else {
                true
            }
        });

        // Report tracks updated this frame once confirmed; the confirmation
        // gate is waived during the first frames of the run so early vehicles
        // are not withheld while the tracker warms up.
        let min_hits = self.config.min_hits;
        self.tracks
            .iter()
            .filter(|t| {
                t.time_since_update == 0
                    && (t.hits >= min_hits || self.frame_count <= min_hits as u64)
            })
            .map(|t| TrackedBox {
                bbox: t.bbox,
                track_id: t.id,
            })
            .collect()
    }
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter <= 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
