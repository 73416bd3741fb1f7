// src/csv_log.rs
//
// Per-frame lane attribution records, persisted as CSV.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

/// Writes one record per (tracked vehicle, frame) with a lane membership.
/// Header precedes all records; the file is flushed and closed at run end.
pub struct CsvLogger<W: Write> {
    writer: csv::Writer<W>,
}

impl CsvLogger<File> {
    pub fn create(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory for {}", path))?;
        }
        let file =
            File::create(path).with_context(|| format!("failed to create CSV log {}", path))?;
        Self::from_writer(file)
    }
}

impl<W: Write> CsvLogger<W> {
    pub fn from_writer(writer: W) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(["VehicleID", "Lane", "Frame", "Timestamp"])?;
        Ok(Self { writer })
    }

    /// `seconds` is the raw frame timestamp; it is truncated to whole
    /// seconds for display, matching the summary timestamps.
    pub fn log(&mut self, vehicle_id: u32, lane_id: u32, frame_idx: u64, seconds: f64) -> Result<()> {
        self.writer.write_record([
            vehicle_id.to_string(),
            lane_id.to_string(),
            frame_idx.to_string(),
            format_timestamp(seconds),
        ])?;
        Ok(())
    }

    pub fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("failed to flush CSV log: {}", e))
    }
}

/// h:mm:ss with whole-second truncation: 90.7 -> "0:01:30".
pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds as u64;
    format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_truncates_to_whole_seconds() {
        assert_eq!(format_timestamp(0.0), "0:00:00");
        assert_eq!(format_timestamp(1.96), "0:00:01");
        assert_eq!(format_timestamp(90.5), "0:01:30");
        assert_eq!(format_timestamp(3700.0), "1:01:40");
    }

    #[test]
    fn test_header_precedes_records() {
        let mut logger = CsvLogger::from_writer(Vec::new()).unwrap();
        logger.log(1, 2, 45, 90.5).unwrap();
        logger.log(2, 1, 60, 120.0).unwrap();
        logger.finish().unwrap();

        let written = String::from_utf8(logger.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines[0], "VehicleID,Lane,Frame,Timestamp");
        assert_eq!(lines[1], "1,2,45,0:01:30");
        assert_eq!(lines[2], "2,1,60,0:02:00");
        assert_eq!(lines.len(), 3);
    }
}
