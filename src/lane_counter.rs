// src/lane_counter.rs
//
// Per-lane unique-vehicle ledger. Counts are monotonically non-decreasing
// and deduplicated by track id across the whole run.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use crate::lane_geometry::LaneLayout;
use crate::types::{centroid, TrackedObject};

/// Lane id -> current count, in lane-id order.
pub type CountsSnapshot = BTreeMap<u32, u64>;

pub struct LaneCounter {
    layout: LaneLayout,
    counts: BTreeMap<u32, u64>,
    counted: HashMap<u32, HashSet<u32>>,
    /// Track id -> lane it was first attributed to. First attribution wins:
    /// a vehicle is never re-counted, never decremented, and never moved to
    /// another lane even if its centroid later drifts across a boundary.
    assigned: HashMap<u32, u32>,
}

impl LaneCounter {
    pub fn new(layout: LaneLayout) -> Self {
        let counts = layout.lane_ids().map(|id| (id, 0)).collect();
        let counted = layout.lane_ids().map(|id| (id, HashSet::new())).collect();
        Self {
            layout,
            counts,
            counted,
            assigned: HashMap::new(),
        }
    }

    pub fn layout(&self) -> &LaneLayout {
        &self.layout
    }

    /// Attribute each tracked object to at most one lane and update the
    /// ledger. Idempotent per (track, run): re-attribution is a no-op.
    /// Returns the full snapshot; cheap, O(lanes).
    pub fn attribute(&mut self, tracked: &[TrackedObject]) -> CountsSnapshot {
        for obj in tracked {
            let (cx, cy) = centroid(&obj.bbox);
            let Some(lane_id) = self.layout.membership(cx, cy) else {
                continue;
            };
            if self.assigned.contains_key(&obj.track_id) {
                continue;
            }
            self.assigned.insert(obj.track_id, lane_id);
            let set = self.counted.entry(lane_id).or_default();
            set.insert(obj.track_id);
            let count = self.counts.entry(lane_id).or_insert(0);
            *count += 1;
            debug_assert_eq!(*count as usize, set.len());
            debug!("Track {} counted in lane {}", obj.track_id, lane_id);
        }
        self.counts.clone()
    }

    pub fn counts(&self) -> CountsSnapshot {
        self.counts.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn three_band_layout() -> LaneLayout {
        // 1280x720, bands start at y=288, each 426 wide
        LaneLayout::vertical_bands(3, 1280, 720, 0.4)
    }

    fn obj(track_id: u32, x1: f32, y1: f32, x2: f32, y2: f32) -> TrackedObject {
        TrackedObject {
            track_id,
            bbox: [x1, y1, x2, y2],
            confidence: Some(0.9),
            class: Some(crate::types::VehicleClass::Car),
        }
    }

    #[test]
    fn test_snapshot_starts_at_zero_for_every_lane() {
        let counter = LaneCounter::new(three_band_layout());
        assert_eq!(counter.counts(), Map::from([(1, 0), (2, 0), (3, 0)]));
    }

    #[test]
    fn test_counting_is_idempotent() {
        let mut counter = LaneCounter::new(three_band_layout());
        // centroid (640, 500) -> lane 2
        let objects = vec![obj(1, 600.0, 450.0, 680.0, 550.0)];

        for _ in 0..5 {
            let snapshot = counter.attribute(&objects);
            assert_eq!(snapshot, Map::from([(1, 0), (2, 1), (3, 0)]));
        }
    }

    #[test]
    fn test_first_attribution_wins_across_lanes() {
        let mut counter = LaneCounter::new(three_band_layout());

        // track 1 starts in lane 2
        counter.attribute(&[obj(1, 600.0, 450.0, 680.0, 550.0)]);
        // later drifts into lane 1 territory
        let snapshot = counter.attribute(&[obj(1, 100.0, 450.0, 180.0, 550.0)]);

        assert_eq!(snapshot, Map::from([(1, 0), (2, 1), (3, 0)]));
    }

    #[test]
    fn test_object_outside_all_lanes_is_skipped() {
        let mut counter = LaneCounter::new(three_band_layout());
        // centroid well above the bands
        let snapshot = counter.attribute(&[obj(1, 600.0, 10.0, 680.0, 110.0)]);
        assert_eq!(snapshot, Map::from([(1, 0), (2, 0), (3, 0)]));
    }

    #[test]
    fn test_distinct_tracks_count_separately() {
        let mut counter = LaneCounter::new(three_band_layout());
        let snapshot = counter.attribute(&[
            obj(1, 100.0, 450.0, 180.0, 550.0),  // lane 1
            obj(2, 600.0, 450.0, 680.0, 550.0),  // lane 2
            obj(3, 610.0, 450.0, 690.0, 550.0),  // lane 2
        ]);
        assert_eq!(snapshot, Map::from([(1, 1), (2, 2), (3, 0)]));
    }

    #[test]
    fn test_unlabeled_objects_still_count() {
        let mut counter = LaneCounter::new(three_band_layout());
        let unlabeled = TrackedObject {
            track_id: 7,
            bbox: [600.0, 450.0, 680.0, 550.0],
            confidence: None,
            class: None,
        };
        let snapshot = counter.attribute(&[unlabeled]);
        assert_eq!(snapshot[&2], 1);
    }
}
