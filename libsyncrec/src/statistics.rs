use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use super::alignment::StreamStats;
use super::error::ProcessorError;
use super::sample::SampleId;

/// Counters for one stream, tagged with the stream it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamStatistics {
    pub id: SampleId,
    pub rate: f64,
    #[serde(flatten)]
    pub counts: StreamStats,
}

/// Snapshot of everything a sync record builder has counted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStatistics {
    /// Samples whose id is not part of the layout
    pub unrecognized: u64,
    /// Samples older than both live records
    pub stale: u64,
    /// Jumps of more than one record ahead
    pub leaps: u64,
    /// Samples refused because no record layout could be built
    #[serde(default)]
    pub no_layout: u64,
    pub records_emitted: u64,
    pub streams: Vec<StreamStatistics>,
}

impl SyncStatistics {
    pub fn stream(&self, id: SampleId) -> Option<&StreamStatistics> {
        self.streams.iter().find(|stream| stream.id == id)
    }

    /// Log the totals, and every stream that lost data
    pub fn log_summary(&self) {
        spdlog::info!(
            "{} records emitted; {} unrecognized samples, {} stale samples, {} leaps",
            self.records_emitted,
            self.unrecognized,
            self.stale,
            self.leaps
        );
        if self.no_layout > 0 {
            spdlog::info!("{} samples refused without a record layout", self.no_layout);
        }
        for stream in self.streams.iter() {
            let c = &stream.counts;
            if c.discarded + c.over_written + c.skipped + c.resyncs == 0 {
                continue;
            }
            spdlog::info!(
                "Stream {} ({} Hz): total={} discarded={} overwritten={} skipped={} resyncs={}",
                stream.id,
                stream.rate,
                c.total,
                c.discarded,
                c.over_written,
                c.skipped,
                c.resyncs
            );
        }
    }

    /// Write the statistics as yaml
    pub fn write_yaml(&self, path: &Path) -> Result<(), ProcessorError> {
        let mut file = std::fs::File::create(path)?;
        file.write_all(serde_yaml::to_string(self)?.as_bytes())?;
        Ok(())
    }
}
