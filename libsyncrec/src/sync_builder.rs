use std::sync::Arc;

use super::alignment::{SlotTarget, StreamState};
use super::constants::{DEFAULT_OUT_OF_SLOT_MAX, LOG_EVERY, USECS_PER_SEC};
use super::error::SinkError;
use super::header::SyncHeader;
use super::layout::RecordLayout;
use super::record::{RecordRing, SyncRecord};
use super::sample::{epoch_of, Sample};
use super::sink::RecordSink;
use super::statistics::{StreamStatistics, SyncStatistics};

/// Where a sample lands relative to the stream's own position
#[derive(Debug, Clone, Copy, PartialEq)]
enum Placement {
    /// The record the stream is currently filling
    Current,
    /// The record before it, after the stream has moved on
    Previous,
}

/// How a placement moves the stream's slot cursor
#[derive(Debug, Clone, Copy, PartialEq)]
enum Cursor {
    /// Classify against the cursor, resynchronizing on sustained drift
    Track,
    /// Step past the slot without classifying
    Jump,
    /// Leave the cursor alone
    Keep,
}

/// SyncRecordBuilder assigns samples to slots of the two live records and emits sealed
/// records downstream.
///
/// Every condition a single sample can run into is counted rather than returned as an
/// error; `receive` reports only whether the sample was stored.
pub struct SyncRecordBuilder {
    layout: RecordLayout,
    states: Vec<StreamState>,
    ring: RecordRing,
    sinks: Vec<Box<dyn RecordSink>>,
    out_of_slot_max: u32,
    header: Option<Arc<SyncHeader>>,
    unrecognized: u64,
    stale: u64,
    leaps: u64,
    records_emitted: u64,
    last_emitted_epoch: Option<i64>,
    sink_error: Option<SinkError>,
}

impl SyncRecordBuilder {
    /// Create a builder over a frozen layout.
    ///
    /// An `out_of_slot_max` of zero falls back to the default.
    pub fn new(layout: RecordLayout, out_of_slot_max: u32) -> Self {
        let states = layout.streams().iter().map(StreamState::new).collect();
        let ring = RecordRing::new(&layout);
        Self {
            layout,
            states,
            ring,
            sinks: Vec::new(),
            out_of_slot_max: if out_of_slot_max == 0 {
                DEFAULT_OUT_OF_SLOT_MAX
            } else {
                out_of_slot_max
            },
            header: None,
            unrecognized: 0,
            stale: 0,
            leaps: 0,
            records_emitted: 0,
            last_emitted_epoch: None,
            sink_error: None,
        }
    }

    pub fn add_sink(&mut self, sink: Box<dyn RecordSink>) {
        self.sinks.push(sink);
    }

    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// The header as published, or as it will be published if no record has been emitted yet
    pub fn header(&self) -> Arc<SyncHeader> {
        match &self.header {
            Some(header) => header.clone(),
            None => Arc::new(self.layout.header()),
        }
    }

    /// Place a sample into the live records.
    ///
    /// Returns true if the sample's values were written to a slot.
    pub fn receive(&mut self, sample: &Sample) -> bool {
        let row = match self.layout.row_of(sample.id) {
            Some(row) => row,
            None => {
                self.unrecognized += 1;
                if self.unrecognized % LOG_EVERY == 1 {
                    spdlog::warn!(
                        "Sample id {} is not part of the record layout; {} such samples so far",
                        sample.id,
                        self.unrecognized
                    );
                }
                return false;
            }
        };
        self.states[row].stats.total += 1;

        let epoch = epoch_of(sample.time_tag);
        let index = match self.select_record(epoch) {
            Some(index) => index,
            None => {
                self.stale += 1;
                self.states[row].stats.discarded += 1;
                if self.stale % LOG_EVERY == 1 {
                    spdlog::warn!(
                        "Sample id {} at {} is older than the live records; {} stale samples so far",
                        sample.id,
                        sample.time_tag,
                        self.stale
                    );
                }
                return false;
            }
        };

        self.place(row, index, epoch, sample)
    }

    /// Find the live record covering `epoch`, moving the pair forward if needed.
    ///
    /// Returns None if the epoch is older than every live record.
    fn select_record(&mut self, epoch: i64) -> Option<usize> {
        if !self.ring.is_started() {
            if self.last_emitted_epoch.is_some_and(|last| epoch <= last) {
                return None;
            }
            self.ring.start(epoch);
            return Some(self.ring.oldest());
        }

        if epoch < self.ring.oldest_epoch() {
            return None;
        }
        if let Some(index) = self.ring.index_of(epoch) {
            return Some(index);
        }

        let newest = self.ring.newest_epoch();
        if epoch == newest + USECS_PER_SEC {
            let sealed = self.ring.advance(&self.layout);
            self.publish(sealed);
        } else {
            self.leaps += 1;
            spdlog::warn!(
                "Sample time leaped {} s past the newest record; restarting records at {}",
                (epoch - newest) / USECS_PER_SEC,
                epoch
            );
            for sealed in self.ring.rebase(&self.layout, epoch) {
                self.publish(sealed);
            }
        }
        self.ring.index_of(epoch)
    }

    /// Bring the stream's state up to `epoch`, binding it afresh if it has lost track
    fn follow_stream(&mut self, row: usize, epoch: i64, sample_time: i64) -> Placement {
        match self.states[row].epoch() {
            Some(current) if current == epoch => Placement::Current,
            Some(current) if current == epoch + USECS_PER_SEC => Placement::Previous,
            Some(current) if current + USECS_PER_SEC == epoch => {
                let observed = self
                    .ring
                    .index_of(current)
                    .and_then(|previous| self.ring.get(previous).row_min(row));
                self.states[row].advance_record(observed);
                Placement::Current
            }
            _ => {
                self.states[row].bind(epoch, sample_time);
                Placement::Current
            }
        }
    }

    /// Live record for the epoch after `epoch`, advancing the pair if `epoch` is the newest
    fn following_record(&mut self, epoch: i64) -> Option<usize> {
        let next = epoch + USECS_PER_SEC;
        if let Some(index) = self.ring.index_of(next) {
            return Some(index);
        }
        if self.ring.is_started() && self.ring.newest_epoch() == epoch {
            let sealed = self.ring.advance(&self.layout);
            self.publish(sealed);
        }
        self.ring.index_of(next)
    }

    /// Bring the stream's state to the chosen record and write the sample into its slot.
    ///
    /// A sample nearer a slot of the neighbouring second than any slot of its own is
    /// placed in the neighbouring record when that record is live.
    fn place(&mut self, row: usize, index: usize, epoch: i64, sample: &Sample) -> bool {
        let t = sample.time_tag;
        let placement = self.follow_stream(row, epoch, t);

        let target = {
            let state = &self.states[row];
            match placement {
                Placement::Current => {
                    state.locate(t, epoch, state.min_diff(), state.used_slots())
                }
                Placement::Previous => {
                    state.locate(t, epoch, state.previous_min_diff(), state.previous_used_slots())
                }
            }
        };
        let own_cursor = match placement {
            Placement::Current => Cursor::Track,
            Placement::Previous => Cursor::Keep,
        };
        let n_slots = self.layout.streams()[row].n_slots;

        let (index, placement, slot, cursor) = match target {
            SlotTarget::Outside => {
                let stream_id = self.layout.streams()[row].id;
                let state = &mut self.states[row];
                state.stats.discarded += 1;
                if state.stats.discarded % LOG_EVERY == 1 {
                    spdlog::warn!(
                        "Stream {} sample at {} is too far from any slot; {} discarded so far",
                        stream_id,
                        t,
                        state.stats.discarded
                    );
                }
                return false;
            }
            SlotTarget::Within(slot) => (index, placement, slot, own_cursor),
            SlotTarget::Following(slot) => match self.following_record(epoch) {
                Some(next) => {
                    if placement == Placement::Current {
                        let observed = self.ring.get(index).row_min(row);
                        self.states[row].advance_record(observed);
                        (next, Placement::Current, slot, Cursor::Jump)
                    } else {
                        (next, Placement::Current, slot, Cursor::Keep)
                    }
                }
                None => (index, placement, n_slots - 1, own_cursor),
            },
            SlotTarget::Preceding(back) => {
                match self.ring.index_of(epoch - USECS_PER_SEC) {
                    Some(previous) if placement == Placement::Current => {
                        let slot = self.states[row].previous_used_slots().saturating_sub(back);
                        (previous, Placement::Previous, slot, Cursor::Keep)
                    }
                    _ => (index, placement, 0, own_cursor),
                }
            }
        };

        let stream = &self.layout.streams()[row];
        let state = &mut self.states[row];
        let slot = if cursor == Cursor::Track && state.note_placement(slot, self.out_of_slot_max) {
            let resynced = state.resync_slot(t, epoch);
            spdlog::warn!(
                "Stream {} drifted off its slot grid; resynchronized to slot offset {} us ({} resyncs)",
                stream.id,
                state.min_diff(),
                state.stats.resyncs
            );
            match resynced {
                Some(slot) => slot,
                None => {
                    state.stats.discarded += 1;
                    return false;
                }
            }
        } else {
            slot
        };

        let skips = match placement {
            Placement::Current => state.check_non_integral_skip(),
            Placement::Previous => state.previous_record_skips(),
        };
        if slot == stream.n_slots - 1 && skips {
            state.stats.skipped += 1;
            return false;
        }

        let record = self.ring.get_mut(index);
        if record.put(stream, slot, &sample.data) {
            state.stats.over_written += 1;
        }
        let deviation = t - record.epoch() - slot as i64 * stream.dt_usec;
        record.note_deviation(row, deviation);
        if cursor != Cursor::Keep {
            state.pass_slot(slot);
        }
        true
    }

    /// Send a sealed record to every sink, preceded by the header the first time
    fn publish(&mut self, sealed: SyncRecord) {
        if self.header.is_none() {
            let mut header = self.layout.header();
            header.start_time = Some(sealed.epoch);
            self.send_header(Arc::new(header));
        }

        spdlog::debug!(
            "Emitting sync record for epoch {} ({})",
            sealed.epoch,
            sealed.time_string()
        );
        let record = Arc::new(sealed);
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.send_record(&record) {
                spdlog::error!("Failed to send sync record {}: {}", record.epoch, e);
                self.sink_error.get_or_insert(e);
            }
        }
        self.records_emitted += 1;
        self.last_emitted_epoch = Some(record.epoch);
    }

    fn send_header(&mut self, header: Arc<SyncHeader>) {
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.send_header(&header) {
                spdlog::error!("Failed to send sync header: {}", e);
                self.sink_error.get_or_insert(e);
            }
        }
        self.header = Some(header);
    }

    /// Emit the live records that hold data and stop.
    ///
    /// Samples arriving afterwards start a new pair of records, unless they are no newer
    /// than the last record emitted.
    pub fn flush(&mut self) {
        for sealed in self.ring.drain(&self.layout) {
            self.publish(sealed);
        }
    }

    /// Flush at end of stream and close every sink
    pub fn finish(&mut self) {
        self.flush();
        if self.header.is_none() {
            self.send_header(Arc::new(self.layout.header()));
        }
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.close() {
                spdlog::error!("Failed to close record sink: {}", e);
                self.sink_error.get_or_insert(e);
            }
        }
    }

    pub fn statistics(&self) -> SyncStatistics {
        SyncStatistics {
            unrecognized: self.unrecognized,
            stale: self.stale,
            leaps: self.leaps,
            no_layout: 0,
            records_emitted: self.records_emitted,
            streams: self
                .layout
                .streams()
                .iter()
                .zip(self.states.iter())
                .map(|(stream, state)| StreamStatistics {
                    id: stream.id,
                    rate: stream.rate,
                    counts: state.stats.clone(),
                })
                .collect(),
        }
    }

    /// The first error any sink reported, if any
    pub fn take_sink_error(&mut self) -> Option<SinkError> {
        self.sink_error.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::MinDiffBound;
    use crate::sample::SampleId;
    use crate::sink::SyncOutput;
    use crate::variable::{StreamConfig, Variable};
    use std::sync::mpsc::{channel, Receiver};

    const BASE: i64 = 1_700_000_000_000_000;

    fn builder(configs: &[StreamConfig]) -> (SyncRecordBuilder, Receiver<SyncOutput>) {
        let layout = RecordLayout::new(configs, MinDiffBound::SlotPeriod).unwrap();
        let mut builder = SyncRecordBuilder::new(layout, DEFAULT_OUT_OF_SLOT_MAX);
        let (tx, rx) = channel();
        builder.add_sink(Box::new(tx));
        (builder, rx)
    }

    fn records(rx: &Receiver<SyncOutput>) -> Vec<Arc<SyncRecord>> {
        rx.try_iter()
            .filter_map(|out| match out {
                SyncOutput::Record(record) => Some(record),
                SyncOutput::Header(_) => None,
            })
            .collect()
    }

    fn ten_hz() -> StreamConfig {
        StreamConfig::new(100, 10.0, vec![Variable::new("TTX", "degC", 1)])
    }

    #[test]
    fn test_advance_emits_oldest() {
        let (mut b, rx) = builder(&[ten_hz()]);
        let id = SampleId(100);
        assert!(b.receive(&Sample::new(id, BASE + 9_000, vec![1.0])));
        assert!(b.receive(&Sample::new(id, BASE + 1_009_000, vec![2.0])));
        assert!(records(&rx).is_empty());
        assert!(b.receive(&Sample::new(id, BASE + 2_009_000, vec![3.0])));
        let emitted = records(&rx);
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].epoch, BASE);
        assert_eq!(emitted[0].time_tag, BASE + 500_000);
        assert_eq!(emitted[0].data[0], 9_000.0);
        assert_eq!(emitted[0].data[1], 1.0);
        assert_eq!(b.statistics().records_emitted, 1);
    }

    #[test]
    fn test_unrecognized_does_not_advance() {
        let (mut b, rx) = builder(&[ten_hz()]);
        b.receive(&Sample::new(SampleId(100), BASE + 9_000, vec![1.0]));
        assert!(!b.receive(&Sample::new(SampleId(7), BASE + 5_009_000, vec![1.0])));
        assert!(records(&rx).is_empty());
        let stats = b.statistics();
        assert_eq!(stats.unrecognized, 1);
        assert_eq!(stats.leaps, 0);
        assert_eq!(stats.streams[0].counts.total, 1);
    }

    #[test]
    fn test_stale_sample() {
        let (mut b, _rx) = builder(&[ten_hz()]);
        let id = SampleId(100);
        b.receive(&Sample::new(id, BASE + 9_000, vec![1.0]));
        b.receive(&Sample::new(id, BASE + 1_009_000, vec![1.0]));
        b.receive(&Sample::new(id, BASE + 2_009_000, vec![1.0]));
        assert!(!b.receive(&Sample::new(id, BASE + 109_000, vec![1.0])));
        let stats = b.statistics();
        assert_eq!(stats.stale, 1);
        assert_eq!(stats.streams[0].counts.discarded, 1);
    }

    #[test]
    fn test_late_sample_goes_to_previous_record() {
        let (mut b, rx) = builder(&[ten_hz()]);
        let id = SampleId(100);
        b.receive(&Sample::new(id, BASE + 9_000, vec![0.0]));
        b.receive(&Sample::new(id, BASE + 1_009_000, vec![10.0]));
        // delivered after the stream moved on to the next second
        assert!(b.receive(&Sample::new(id, BASE + 909_000, vec![9.0])));
        b.finish();
        let emitted = records(&rx);
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[0].data[10], 9.0);
        assert_eq!(emitted[1].data[1], 10.0);
    }

    #[test]
    fn test_crossing_sample_opens_next_record() {
        let (mut b, rx) = builder(&[ten_hz()]);
        let id = SampleId(100);
        b.receive(&Sample::new(id, BASE + 9_000, vec![0.0]));
        b.receive(&Sample::new(id, BASE + 1_009_000, vec![10.0]));
        // nearer the next second's first slot than this second's last
        assert!(b.receive(&Sample::new(id, BASE + 1_999_000, vec![20.0])));
        let emitted = records(&rx);
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].epoch, BASE);
        assert!(b.receive(&Sample::new(id, BASE + 2_109_000, vec![21.0])));
        b.finish();
        let emitted = records(&rx);
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[1].epoch, BASE + 2_000_000);
        assert_eq!(&emitted[1].data[1..3], &[20.0, 21.0]);
        assert_eq!(b.statistics().streams[0].counts.over_written, 0);
    }

    #[test]
    fn test_late_crossing_sample_joins_current_record() {
        let (mut b, rx) = builder(&[ten_hz()]);
        let id = SampleId(100);
        b.receive(&Sample::new(id, BASE + 9_000, vec![0.0]));
        b.receive(&Sample::new(id, BASE + 1_109_000, vec![11.0]));
        // delivered after the stream moved on, nearest the first slot of its new second
        assert!(b.receive(&Sample::new(id, BASE + 999_000, vec![10.0])));
        b.finish();
        let emitted = records(&rx);
        assert_eq!(emitted.len(), 2);
        assert!(emitted[0].data[10].is_nan());
        assert_eq!(&emitted[1].data[1..3], &[10.0, 11.0]);
    }

    #[test]
    fn test_header_precedes_records() {
        let (mut b, rx) = builder(&[ten_hz()]);
        b.receive(&Sample::new(SampleId(100), BASE + 9_000, vec![0.0]));
        b.finish();
        let outputs: Vec<SyncOutput> = rx.try_iter().collect();
        assert_eq!(outputs.len(), 2);
        match &outputs[0] {
            SyncOutput::Header(header) => {
                assert_eq!(header.start_time, Some(BASE));
                assert_eq!(header.record_length, 11);
            }
            other => panic!("expected header first, got {other:?}"),
        }
        assert!(matches!(outputs[1], SyncOutput::Record(_)));
    }

    #[test]
    fn test_finish_without_samples_sends_header() {
        let (mut b, rx) = builder(&[ten_hz()]);
        b.finish();
        let outputs: Vec<SyncOutput> = rx.try_iter().collect();
        assert_eq!(outputs.len(), 1);
        assert!(matches!(&outputs[0], SyncOutput::Header(h) if h.start_time.is_none()));
    }

    #[test]
    fn test_disconnected_sink_is_reported() {
        let (mut b, rx) = builder(&[ten_hz()]);
        drop(rx);
        b.receive(&Sample::new(SampleId(100), BASE + 9_000, vec![0.0]));
        b.flush();
        assert!(matches!(b.take_sink_error(), Some(SinkError::Disconnected)));
        assert!(b.take_sink_error().is_none());
    }

    #[test]
    fn test_zero_out_of_slot_max_uses_default() {
        let layout = RecordLayout::new(&[ten_hz()], MinDiffBound::SlotPeriod).unwrap();
        let b = SyncRecordBuilder::new(layout, 0);
        assert_eq!(b.out_of_slot_max, DEFAULT_OUT_OF_SLOT_MAX);
    }
}
