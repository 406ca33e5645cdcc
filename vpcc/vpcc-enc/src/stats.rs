//! Lightweight per-frame counters, logged when a GOF completes.

use std::time::Duration;

/// Counters filled in as a frame moves through the pipeline.
#[derive(Debug, Default, Clone)]
pub(crate) struct FrameStats {
    pub frame_id: usize,
    pub point_count: usize,
    pub voxel_count: usize,
    pub patch_count: usize,
    pub patch_generation_time: Duration,
    pub map_generation_time: Duration,
}

impl FrameStats {
    pub fn log_summary(&self) {
        log::debug!(
            target: "STATISTICS",
            "frame {}: {} points, {} voxels, {} patches, patch gen {:.1?}, map gen {:.1?}",
            self.frame_id,
            self.point_count,
            self.voxel_count,
            self.patch_count,
            self.patch_generation_time,
            self.map_generation_time,
        );
    }
}

/// Aggregate of the frame stats of one GOF.
pub(crate) fn log_gof_summary(gof_id: usize, stats: &[FrameStats]) {
    if stats.is_empty() {
        return;
    }
    let points: usize = stats.iter().map(|s| s.point_count).sum();
    let patches: usize = stats.iter().map(|s| s.patch_count).sum();
    log::info!(
        target: "STATISTICS",
        "GOF {gof_id}: {} frames, {points} points, {patches} patches",
        stats.len(),
    );
}
