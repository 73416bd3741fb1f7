// src/reconcile.rs
//
// Recovers class/confidence metadata for the tracker's anonymous boxes by
// matching them back against the frame's raw detections.

use crate::types::{Detection, TrackedBox, TrackedObject};

/// For each tracked box, attach the label of the first detection (in
/// detection-list order) whose IoU clears the threshold. Greedy first-match
/// on purpose: the tracker already did the correctness-critical assignment,
/// this step only restores descriptive metadata. A box with no match stays
/// unlabeled but remains tracked and countable.
pub fn reconcile(
    detections: &[Detection],
    tracked_boxes: &[TrackedBox],
    iou_threshold: f32,
) -> Vec<TrackedObject> {
    tracked_boxes
        .iter()
        .map(|tb| {
            let matched = detections
                .iter()
                .find(|det| iou(&det.bbox, &tb.bbox) > iou_threshold);
            TrackedObject {
                track_id: tb.track_id,
                bbox: tb.bbox,
                confidence: matched.map(|det| det.confidence),
                class: matched.map(|det| det.class),
            }
        })
        .collect()
}

/// Intersection-over-Union with the inclusive pixel-edge area convention
/// (width = x2 - x1 + 1): a box covering pixels x1..=x2 is x2-x1+1 wide.
/// Zero overlap returns 0.0 without touching the union.
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1 + 1.0).max(0.0) * (y2 - y1 + 1.0).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0] + 1.0) * (a[3] - a[1] + 1.0);
    let area_b = (b[2] - b[0] + 1.0) * (b[3] - b[1] + 1.0);
    inter / (area_a + area_b - inter)
}
