use std::sync::Arc;

use super::constants::LOG_EVERY;
use super::error::{LayoutError, SinkError};
use super::header::SyncHeader;
use super::layout::{MinDiffBound, RecordLayout};
use super::sample::Sample;
use super::sink::RecordSink;
use super::statistics::SyncStatistics;
use super::sync_builder::SyncRecordBuilder;
use super::variable::StreamConfig;

/// A producer of samples that advertises the streams it will deliver
pub trait SampleSource {
    fn name(&self) -> &str;

    fn streams(&self) -> &[StreamConfig];
}

/// SyncRecordSource is the ingestion side of the sync record builder.
///
/// Sources are connected while the stream catalog is still open. The first call to
/// `init` (or the first sample) freezes the layout; streams offered after that are
/// ignored. If the layout cannot be built, samples are refused and counted until a
/// later `connect` or `init` succeeds.
pub struct SyncRecordSource {
    catalog: Vec<StreamConfig>,
    sources: Vec<String>,
    pending_sinks: Vec<Box<dyn RecordSink>>,
    out_of_slot_max: u32,
    policy: MinDiffBound,
    builder: Option<SyncRecordBuilder>,
    init_error: Option<LayoutError>,
    no_layout: u64,
}

impl SyncRecordSource {
    pub fn new(out_of_slot_max: u32, policy: MinDiffBound) -> Self {
        Self {
            catalog: Vec::new(),
            sources: Vec::new(),
            pending_sinks: Vec::new(),
            out_of_slot_max,
            policy,
            builder: None,
            init_error: None,
            no_layout: 0,
        }
    }

    /// Register the streams of a source.
    ///
    /// A stream offered by more than one source must be described identically each time.
    pub fn connect(&mut self, source: &dyn SampleSource) -> Result<(), LayoutError> {
        if self.builder.is_some() {
            spdlog::warn!(
                "Source {} connected after the record layout was frozen; its new streams are ignored",
                source.name()
            );
            self.sources.push(source.name().to_string());
            return Ok(());
        }

        for stream in source.streams() {
            match self.catalog.iter().find(|known| known.id == stream.id) {
                Some(known) if known == stream => continue,
                Some(_) => return Err(LayoutError::DuplicateStream(stream.id)),
                None => self.catalog.push(stream.clone()),
            }
        }
        self.init_error = None;
        spdlog::info!(
            "Connected source {} with {} streams",
            source.name(),
            source.streams().len()
        );
        self.sources.push(source.name().to_string());
        Ok(())
    }

    /// Forget a source. Its streams stay in the layout.
    pub fn disconnect(&mut self, source: &dyn SampleSource) {
        if let Some(pos) = self.sources.iter().position(|name| name == source.name()) {
            self.sources.remove(pos);
            spdlog::info!("Disconnected source {}", source.name());
        }
    }

    pub fn n_sources(&self) -> usize {
        self.sources.len()
    }

    pub fn add_sink(&mut self, sink: Box<dyn RecordSink>) {
        match self.builder.as_mut() {
            Some(builder) => builder.add_sink(sink),
            None => self.pending_sinks.push(sink),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.builder.is_some()
    }

    /// Freeze the layout from the streams connected so far
    pub fn init(&mut self) -> Result<(), LayoutError> {
        if self.builder.is_some() {
            return Ok(());
        }
        let layout = match RecordLayout::new(&self.catalog, self.policy) {
            Ok(layout) => layout,
            Err(e) => {
                self.init_error = Some(e.clone());
                return Err(e);
            }
        };
        self.init_error = None;
        spdlog::info!(
            "Sync record layout frozen with {} streams and {} values per record",
            layout.n_streams(),
            layout.record_length()
        );
        let mut builder = SyncRecordBuilder::new(layout, self.out_of_slot_max);
        for sink in self.pending_sinks.drain(..) {
            builder.add_sink(sink);
        }
        self.builder = Some(builder);
        Ok(())
    }

    /// Why the last attempt to build the layout failed, if it did
    pub fn init_error(&self) -> Option<&LayoutError> {
        self.init_error.as_ref()
    }

    /// Hand a sample to the builder, freezing the layout first if needed.
    ///
    /// A failed layout build is not retried per sample.
    pub fn receive(&mut self, sample: &Sample) -> bool {
        if self.builder.is_none() && self.init_error.is_none() {
            if let Err(e) = self.init() {
                spdlog::error!("Could not build the sync record layout: {}", e);
            }
        }
        match self.builder.as_mut() {
            Some(builder) => builder.receive(sample),
            None => {
                self.no_layout += 1;
                if self.no_layout % LOG_EVERY == 1 {
                    spdlog::warn!(
                        "Sample id {} refused without a record layout; {} such samples so far",
                        sample.id,
                        self.no_layout
                    );
                }
                false
            }
        }
    }

    /// Emit whatever the live records hold. Calling it again does nothing.
    pub fn flush(&mut self) {
        if let Some(builder) = self.builder.as_mut() {
            builder.flush();
        }
    }

    /// Flush and close every sink at end of stream
    pub fn finish(&mut self) {
        if let Some(builder) = self.builder.as_mut() {
            builder.finish();
        }
    }

    pub fn header(&self) -> Option<Arc<SyncHeader>> {
        self.builder.as_ref().map(|builder| builder.header())
    }

    pub fn statistics(&self) -> SyncStatistics {
        let mut stats = self
            .builder
            .as_ref()
            .map(|builder| builder.statistics())
            .unwrap_or_default();
        stats.no_layout = self.no_layout;
        stats
    }

    pub fn take_sink_error(&mut self) -> Option<SinkError> {
        self.builder.as_mut().and_then(|builder| builder.take_sink_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleId;
    use crate::sink::SyncOutput;
    use crate::variable::Variable;
    use std::sync::mpsc::channel;

    struct TestSource {
        name: String,
        streams: Vec<StreamConfig>,
    }

    impl SampleSource for TestSource {
        fn name(&self) -> &str {
            &self.name
        }

        fn streams(&self) -> &[StreamConfig] {
            &self.streams
        }
    }

    fn source(name: &str, ids: &[u32]) -> TestSource {
        TestSource {
            name: name.to_string(),
            streams: ids
                .iter()
                .map(|id| StreamConfig::new(*id, 1.0, vec![Variable::new(&format!("V{id}"), "V", 1)]))
                .collect(),
        }
    }

    #[test]
    fn test_connect_shared_streams() {
        let mut sync = SyncRecordSource::new(4, MinDiffBound::SlotPeriod);
        sync.connect(&source("a", &[1, 2])).unwrap();
        sync.connect(&source("b", &[2, 3])).unwrap();
        assert_eq!(sync.n_sources(), 2);
        sync.init().unwrap();
        assert_eq!(sync.header().unwrap().streams.len(), 3);
    }

    #[test]
    fn test_conflicting_stream() {
        let mut sync = SyncRecordSource::new(4, MinDiffBound::SlotPeriod);
        sync.connect(&source("a", &[1])).unwrap();
        let mut other = source("b", &[1]);
        other.streams[0].rate = 10.0;
        assert_eq!(
            sync.connect(&other).unwrap_err(),
            LayoutError::DuplicateStream(SampleId(1))
        );
    }

    #[test]
    fn test_layout_frozen_after_init() {
        let mut sync = SyncRecordSource::new(4, MinDiffBound::SlotPeriod);
        let a = source("a", &[1]);
        sync.connect(&a).unwrap();
        assert!(sync.receive(&Sample::new(SampleId(1), 0, vec![1.0])));
        assert!(sync.is_initialized());
        sync.connect(&source("b", &[2])).unwrap();
        assert!(!sync.receive(&Sample::new(SampleId(2), 0, vec![1.0])));
        assert_eq!(sync.statistics().unrecognized, 1);
        sync.disconnect(&a);
        assert_eq!(sync.n_sources(), 1);
        assert!(sync.receive(&Sample::new(SampleId(1), 1_000_000, vec![1.0])));
    }

    #[test]
    fn test_init_without_streams() {
        let mut sync = SyncRecordSource::new(4, MinDiffBound::SlotPeriod);
        assert_eq!(sync.init().unwrap_err(), LayoutError::NoStreams);
        assert!(!sync.receive(&Sample::new(SampleId(1), 0, vec![1.0])));
        let stats = sync.statistics();
        assert_eq!(stats.no_layout, 1);
        assert_eq!(stats.records_emitted, 0);
        assert!(stats.streams.is_empty());
    }

    #[test]
    fn test_failed_layout_is_not_rebuilt_per_sample() {
        let mut sync = SyncRecordSource::new(4, MinDiffBound::SlotPeriod);
        for t in 0..3 {
            assert!(!sync.receive(&Sample::new(SampleId(1), t, vec![1.0])));
        }
        assert_eq!(sync.init_error(), Some(&LayoutError::NoStreams));
        assert_eq!(sync.statistics().no_layout, 3);
        assert!(!sync.is_initialized());

        // a new source makes the layout buildable again
        sync.connect(&source("a", &[1])).unwrap();
        assert!(sync.init_error().is_none());
        assert!(sync.receive(&Sample::new(SampleId(1), 0, vec![1.0])));
        assert!(sync.is_initialized());
        assert_eq!(sync.statistics().no_layout, 3);
    }

    #[test]
    fn test_flush_is_idempotent() {
        let mut sync = SyncRecordSource::new(4, MinDiffBound::SlotPeriod);
        sync.connect(&source("a", &[1])).unwrap();
        let (tx, rx) = channel();
        sync.add_sink(Box::new(tx));
        sync.receive(&Sample::new(SampleId(1), 0, vec![1.0]));
        sync.flush();
        sync.flush();
        let records = rx
            .try_iter()
            .filter(|out| matches!(out, SyncOutput::Record(_)))
            .count();
        assert_eq!(records, 1);
        assert_eq!(sync.statistics().records_emitted, 1);
    }
}
