// src/annotator.rs
//
// Draws tracked-vehicle overlays and lane geometry onto a frame for human
// inspection. Reads ledger state, never mutates it.

use anyhow::Result;
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
};

use crate::lane_counter::CountsSnapshot;
use crate::lane_geometry::LaneLayout;
use crate::types::{Frame, TrackedObject};

const BOX_COLOR: (f64, f64, f64) = (0.0, 255.0, 0.0); // green, BGR

/// Render one annotated BGR frame: per tracked object a box and an
/// "ID {id} {class} {conf}" label, per lane its outline and live count.
/// Unlabeled objects render as "vehicle" with confidence 0.00, never blank.
pub fn annotate(
    frame: &Frame,
    tracked: &[TrackedObject],
    layout: &LaneLayout,
    counts: &CountsSnapshot,
) -> Result<Mat> {
    let mat = Mat::from_slice(&frame.data)?;
    let mat = mat.reshape(3, frame.height as i32)?;

    let mut output = Mat::default();
    imgproc::cvt_color(&mat, &mut output, imgproc::COLOR_RGB2BGR, 0)?;

    let color = core::Scalar::new(BOX_COLOR.0, BOX_COLOR.1, BOX_COLOR.2, 0.0);

    for obj in tracked {
        let [x1, y1, x2, y2] = obj.bbox;
        let (x1, y1, x2, y2) = (x1 as i32, y1 as i32, x2 as i32, y2 as i32);

        imgproc::rectangle(
            &mut output,
            core::Rect::new(x1, y1, x2 - x1, y2 - y1),
            color,
            2,
            imgproc::LINE_8,
            0,
        )?;

        let label = format!(
            "ID {} {} {:.2}",
            obj.track_id,
            obj.class.map(|c| c.as_str()).unwrap_or("vehicle"),
            obj.confidence.unwrap_or(0.0)
        );
        imgproc::put_text(
            &mut output,
            &label,
            core::Point::new(x1, (y1 - 10).max(20)),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.6,
            color,
            2,
            imgproc::LINE_8,
            false,
        )?;
    }

    for lane in layout.lanes() {
        let mut points = core::Vector::<core::Point>::new();
        for &(x, y) in &lane.vertices {
            points.push(core::Point::new(x, y));
        }
        imgproc::polylines(&mut output, &points, true, color, 2, imgproc::LINE_8, 0)?;

        let count = counts.get(&lane.id).copied().unwrap_or(0);
        if let Some(&(x, y)) = lane.vertices.first() {
            imgproc::put_text(
                &mut output,
                &format!("Lane {}: {}", lane.id, count),
                core::Point::new(x, y - 10),
                imgproc::FONT_HERSHEY_SIMPLEX,
                0.7,
                color,
                2,
                imgproc::LINE_8,
                false,
            )?;
        }
    }

    Ok(output)
}
