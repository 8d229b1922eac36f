use bit_set::BitSet;
use bitvec::prelude::*;
use time::macros::format_description;
use time::OffsetDateTime;

use super::constants::{HALF_EPOCH_USECS, LIVE_RECORDS, USECS_PER_SEC};
use super::header::StreamHeader;
use super::layout::{RecordLayout, StreamLayout};

/// A completed one second record, as handed to downstream consumers.
///
/// Immutable once emitted. `data` follows the layout described by the header, with NaN
/// marking absent values.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRecord {
    pub time_tag: i64,
    pub epoch: i64,
    pub data: Vec<f64>,
}

impl SyncRecord {
    /// The row of one stream: its toffset followed by every variable block
    pub fn row(&self, stream: &StreamHeader) -> &[f64] {
        &self.data[stream.offset..stream.offset + stream.row_length()]
    }

    pub fn toffset(&self, stream: &StreamHeader) -> f64 {
        self.data[stream.offset]
    }

    /// UTC date and time of the record's time tag
    pub fn time_string(&self) -> String {
        format_time_tag(self.time_tag)
    }
}

/// Format a microsecond time tag as `YYYY-MM-DD hh:mm:ss.sss`
pub fn format_time_tag(time_tag: i64) -> String {
    let format = format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
    );
    match OffsetDateTime::from_unix_timestamp_nanos(time_tag as i128 * 1000) {
        Ok(datetime) => datetime
            .format(format)
            .unwrap_or_else(|_| time_tag.to_string()),
        Err(_) => time_tag.to_string(),
    }
}

/// One of the records being filled.
///
/// Occupancy is tracked per slot rather than by testing values for NaN, since a sensor
/// may legitimately report NaN.
#[derive(Debug, Clone)]
pub struct LiveRecord {
    epoch: i64,
    data: Vec<f64>,
    occupied: BitVec,
    min_diffs: Vec<Option<i64>>,
    touched: BitSet,
}

impl LiveRecord {
    pub fn new(layout: &RecordLayout, epoch: i64) -> Self {
        Self {
            epoch,
            data: vec![f64::NAN; layout.record_length()],
            occupied: bitvec![0; layout.total_slots()],
            min_diffs: vec![None; layout.n_streams()],
            touched: BitSet::with_capacity(layout.n_streams()),
        }
    }

    /// Clear all values and rebind to a new epoch
    pub fn reset(&mut self, epoch: i64) {
        self.epoch = epoch;
        self.data.fill(f64::NAN);
        self.occupied.fill(false);
        self.min_diffs.fill(None);
        self.touched.clear();
    }

    pub fn epoch(&self) -> i64 {
        self.epoch
    }

    pub fn has_data(&self) -> bool {
        !self.touched.is_empty()
    }

    pub fn is_occupied(&self, stream: &StreamLayout, slot: usize) -> bool {
        self.occupied[stream.slot_base + slot]
    }

    /// Slot deviation of least magnitude seen for a stream's row, if the row holds any sample
    pub fn row_min(&self, row: usize) -> Option<i64> {
        self.min_diffs[row]
    }

    /// Write a sample's values into `slot` of the stream's row.
    ///
    /// Short payloads leave the remaining values NaN; extra values are ignored. Returns
    /// true if the slot already held a sample.
    pub fn put(&mut self, stream: &StreamLayout, slot: usize, values: &[f64]) -> bool {
        let overwrote = self.occupied.replace(stream.slot_base + slot, true);
        let mut input = values.iter();
        for (i, var) in stream.variables.iter().enumerate() {
            let start = stream.value_index(i, slot);
            for dest in self.data[start..start + var.length].iter_mut() {
                *dest = input.next().copied().unwrap_or(f64::NAN);
            }
        }
        self.touched.insert(stream.row);
        overwrote
    }

    /// Keep the row's deviation of least magnitude. Ties keep the earlier one.
    pub fn note_deviation(&mut self, row: usize, deviation: i64) {
        let current = &mut self.min_diffs[row];
        match current {
            Some(min) if min.abs() <= deviation.abs() => (),
            _ => *current = Some(deviation),
        }
    }

    /// Produce the emitted form of this record, writing each row's toffset.
    ///
    /// The toffset is held within `[0, min_diff_bound]` so slot 0 never starts before the
    /// record's second.
    pub fn seal(&self, layout: &RecordLayout) -> SyncRecord {
        let mut data = self.data.clone();
        for stream in layout.streams() {
            data[stream.offset] = match self.min_diffs[stream.row] {
                Some(min) => min.clamp(0, stream.min_diff_bound) as f64,
                None => f64::NAN,
            };
        }
        SyncRecord {
            time_tag: self.epoch + HALF_EPOCH_USECS,
            epoch: self.epoch,
            data,
        }
    }
}

/// The pair of live records.
///
/// Consecutive epochs always occupy different buffers. All index arithmetic on the pair
/// lives here.
#[derive(Debug, Clone)]
pub struct RecordRing {
    records: [LiveRecord; LIVE_RECORDS],
    oldest: usize,
    started: bool,
}

impl RecordRing {
    pub fn new(layout: &RecordLayout) -> Self {
        Self {
            records: [LiveRecord::new(layout, 0), LiveRecord::new(layout, USECS_PER_SEC)],
            oldest: 0,
            started: false,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Open the pair on `epoch` and the epoch after it
    pub fn start(&mut self, epoch: i64) {
        let newest = self.newest();
        self.records[self.oldest].reset(epoch);
        self.records[newest].reset(epoch + USECS_PER_SEC);
        self.started = true;
    }

    pub fn oldest(&self) -> usize {
        self.oldest
    }

    pub fn newest(&self) -> usize {
        (self.oldest + 1) % LIVE_RECORDS
    }

    pub fn oldest_epoch(&self) -> i64 {
        self.records[self.oldest].epoch()
    }

    pub fn newest_epoch(&self) -> i64 {
        self.records[self.newest()].epoch()
    }

    /// Index of the live record covering `epoch`
    pub fn index_of(&self, epoch: i64) -> Option<usize> {
        if !self.started {
            return None;
        }
        self.records.iter().position(|record| record.epoch() == epoch)
    }

    pub fn get(&self, index: usize) -> &LiveRecord {
        &self.records[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut LiveRecord {
        &mut self.records[index]
    }

    /// Seal the oldest record and recycle its buffer for the epoch after the newest
    pub fn advance(&mut self, layout: &RecordLayout) -> SyncRecord {
        let sealed = self.records[self.oldest].seal(layout);
        let next_epoch = self.newest_epoch() + USECS_PER_SEC;
        self.records[self.oldest].reset(next_epoch);
        self.oldest = self.newest();
        sealed
    }

    /// Seal every record holding data, oldest first, and close the pair
    pub fn drain(&mut self, layout: &RecordLayout) -> Vec<SyncRecord> {
        if !self.started {
            return vec![];
        }
        let mut sealed = Vec::with_capacity(LIVE_RECORDS);
        for index in [self.oldest, self.newest()] {
            if self.records[index].has_data() {
                sealed.push(self.records[index].seal(layout));
            }
        }
        self.started = false;
        sealed
    }

    /// Seal what holds data and reopen the pair on `epoch`, skipping the seconds between
    pub fn rebase(&mut self, layout: &RecordLayout, epoch: i64) -> Vec<SyncRecord> {
        let sealed = self.drain(layout);
        self.start(epoch);
        sealed
    }
}
