//! Append-only frame result log and CSV export.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::track::TrackedDetection;

/// Default name for an exported results file.
pub const DEFAULT_EXPORT_FILENAME: &str = "pedestrian_detection_results.csv";

/// How many appends between published snapshot refreshes.
const SNAPSHOT_INTERVAL: usize = 10;

/// Outcome of one processed frame.
#[derive(Clone, Debug)]
pub struct FrameResult {
    /// Sequential frame number. Gaps appear where inference failed.
    pub frame_number: u64,
    /// Source playback position at capture, seconds.
    pub timestamp_s: f64,
    pub person_count: usize,
    pub detections: Vec<TrackedDetection>,
}

/// Append-only log of frame results.
///
/// The authoritative sequence is always complete; a published snapshot lags
/// behind it and is refreshed every [`SNAPSHOT_INTERVAL`] appends and on
/// `finalize`. Presentation layers read the snapshot so they repaint in
/// batches instead of per frame.
#[derive(Default)]
pub struct ResultLog {
    entries: Vec<FrameResult>,
    snapshot: Vec<FrameResult>,
    appends_since_publish: usize,
}

impl ResultLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, result: FrameResult) {
        self.entries.push(result);
        self.appends_since_publish += 1;
        if self.appends_since_publish >= SNAPSHOT_INTERVAL {
            self.publish();
        }
    }

    /// Publish any pending entries to the snapshot.
    pub fn finalize(&mut self) {
        if self.appends_since_publish > 0 {
            self.publish();
        }
    }

    fn publish(&mut self) {
        self.snapshot = self.entries.clone();
        self.appends_since_publish = 0;
    }

    /// The complete sequence, including entries not yet in the snapshot.
    pub fn entries(&self) -> &[FrameResult] {
        &self.entries
    }

    /// The last published batch view.
    pub fn snapshot(&self) -> &[FrameResult] {
        &self.snapshot
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.snapshot.clear();
        self.appends_since_publish = 0;
    }

    /// Person counts of the most recent `last_n` frames, oldest first.
    pub fn count_series(&self, last_n: usize) -> Vec<usize> {
        let start = self.entries.len().saturating_sub(last_n);
        self.entries[start..].iter().map(|r| r.person_count).collect()
    }

    /// Write the full log as CSV.
    pub fn write_csv(&self, mut out: impl Write) -> Result<()> {
        writeln!(out, "Frame,Timestamp(s),PersonCount,TrackIDs,AvgConfidence")?;
        for result in &self.entries {
            writeln!(out, "{}", csv_row(result))?;
        }
        Ok(())
    }

    /// Export the log to a file. Refuses to write an empty log.
    pub fn export_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if self.is_empty() {
            anyhow::bail!("no results to export");
        }
        let file = File::create(path)
            .with_context(|| format!("failed to create export file {}", path.display()))?;
        self.write_csv(file)
            .with_context(|| format!("failed to write export file {}", path.display()))
    }
}

fn csv_row(result: &FrameResult) -> String {
    let track_ids = result
        .detections
        .iter()
        .map(|d| match d.identity {
            Some(id) => id.to_string(),
            None => "?".to_string(),
        })
        .collect::<Vec<_>>()
        .join(";");
    let avg_conf = if result.detections.is_empty() {
        "0".to_string()
    } else {
        let sum: f32 = result.detections.iter().map(|d| d.detection.score).sum();
        format!("{:.1}", sum / result.detections.len() as f32 * 100.0)
    };
    format!(
        "{},{:.2},{},\"{}\",{}",
        result.frame_number, result.timestamp_s, result.person_count, track_ids, avg_conf
    )
}
