use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::constants::{NSLOT_LIMIT, USECS_PER_SEC};
use super::layout::StreamLayout;

/// Run-time counters for one stream. Exposed for operational monitoring only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStats {
    /// Samples received for this stream
    pub total: u64,
    /// Samples that could not be placed in either live record
    pub discarded: u64,
    /// Samples that replaced a value already in their slot
    pub over_written: u64,
    /// Samples that targeted a deliberately skipped last slot
    pub skipped: u64,
    /// Times the slot grid was resynchronized after sustained drift
    pub resyncs: u64,
    /// Current run of consecutive early placements
    pub early: u32,
    /// Current run of consecutive late placements
    pub late: u32,
}

/// Round `num / den` to the nearest integer, ties going up
fn round_half_up(num: i64, den: i64) -> i64 {
    (2 * num + den).div_euclid(2 * den)
}

/// Where a sample belongs relative to the record its index was computed against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotTarget {
    /// A slot of that record
    Within(usize),
    /// Past the slots used this second: a slot of the following record
    Following(usize),
    /// Before slot 0: this many slots back from the end of the preceding record
    Preceding(usize),
    /// Too far from any slot to be placed
    Outside,
}

/// Rolling bookkeeping for placing one stream's samples into slots.
///
/// `min_diff` is the estimated offset of slot 0 from the start of the record the stream
/// is currently filling. It is carried from record to record along the nominal slot
/// grid and refreshed from the smallest deviation actually observed.
#[derive(Debug, Clone)]
pub struct StreamState {
    n_slots: usize,
    dt_usec: i64,
    skip_mod: u32,
    slot: usize,
    epoch: Option<i64>,
    min_diff: i64,
    previous_min_diff: i64,
    skip_count: u64,
    pub stats: StreamStats,
}

impl StreamState {
    pub fn new(stream: &StreamLayout) -> Self {
        Self {
            n_slots: stream.n_slots,
            dt_usec: stream.dt_usec,
            skip_mod: stream.skip_mod,
            slot: 0,
            epoch: None,
            min_diff: 0,
            previous_min_diff: 0,
            skip_count: 0,
            stats: StreamStats::default(),
        }
    }

    /// Next expected slot in the current record
    pub fn cursor(&self) -> usize {
        self.slot
    }

    /// Epoch of the live record this stream is filling, if it is bound to one
    pub fn epoch(&self) -> Option<i64> {
        self.epoch
    }

    pub fn min_diff(&self) -> i64 {
        self.min_diff
    }

    pub fn previous_min_diff(&self) -> i64 {
        self.previous_min_diff
    }

    /// Candidate slot for `sample_time` in the record starting at `epoch_start`.
    ///
    /// Raw indices up to `NSLOT_LIMIT` slots outside the row are clamped into it; farther
    /// ones cannot be placed.
    pub fn compute_slot_index(&self, sample_time: i64, epoch_start: i64) -> Option<usize> {
        let raw = self.raw_slot_index(sample_time, epoch_start, self.min_diff);
        let last = self.n_slots as i64 - 1;
        if raw < -NSLOT_LIMIT || raw > last + NSLOT_LIMIT {
            return None;
        }
        Some(raw.clamp(0, last) as usize)
    }

    /// Slot index of `sample_time` on the grid starting `estimate` into the record, unclamped
    pub fn raw_slot_index(&self, sample_time: i64, epoch_start: i64, estimate: i64) -> i64 {
        round_half_up(sample_time - epoch_start - estimate, self.dt_usec)
    }

    /// Resolve `sample_time` against a record that fills `used` slots.
    ///
    /// An index at or past `used` carries on into the following record, a negative one
    /// reaches back into the preceding record. Indices more than `NSLOT_LIMIT` slots
    /// outside the row are `Outside`.
    pub fn locate(&self, sample_time: i64, epoch_start: i64, estimate: i64, used: usize) -> SlotTarget {
        let raw = self.raw_slot_index(sample_time, epoch_start, estimate);
        let last = self.n_slots as i64 - 1;
        if raw < -NSLOT_LIMIT || raw > last + NSLOT_LIMIT {
            SlotTarget::Outside
        } else if raw < 0 {
            SlotTarget::Preceding(raw.unsigned_abs() as usize)
        } else if raw >= used as i64 {
            SlotTarget::Following(((raw - used as i64) as usize).min(self.n_slots - 1))
        } else {
            SlotTarget::Within(raw as usize)
        }
    }

    /// Slots filled in the current record
    pub fn used_slots(&self) -> usize {
        self.n_slots - usize::from(self.check_non_integral_skip())
    }

    /// Slots filled in the record before the current one
    pub fn previous_used_slots(&self) -> usize {
        self.n_slots - usize::from(self.previous_record_skips())
    }

    pub fn advance_slot(&mut self) {
        if self.slot < self.n_slots {
            self.slot += 1;
        }
    }

    pub fn retreat_slot(&mut self) {
        self.slot = self.slot.saturating_sub(1);
    }

    /// Move the cursor just past `slot` after a placement at or beyond it
    pub fn pass_slot(&mut self, slot: usize) {
        while self.slot <= slot && self.slot < self.n_slots {
            self.advance_slot();
        }
    }

    fn skips_at(&self, count: u64) -> bool {
        let skip_mod = self.skip_mod as u64;
        skip_mod > 1 && count % skip_mod == skip_mod - 1
    }

    /// Whether the last slot of the current record is left empty this time through
    pub fn check_non_integral_skip(&self) -> bool {
        self.skips_at(self.skip_count)
    }

    /// Whether the last slot of the record before the current one was left empty
    pub fn previous_record_skips(&self) -> bool {
        self.skip_count > 0 && self.skips_at(self.skip_count - 1)
    }

    /// Move on to the next epoch's record.
    ///
    /// `observed` is the slot deviation closest to the grid seen in the record being left,
    /// if any sample landed there.
    pub fn advance_record(&mut self, observed: Option<i64>) {
        let used = self.used_slots() as i64;
        let base = observed.unwrap_or(self.min_diff);
        self.previous_min_diff = self.min_diff;
        self.min_diff = self.normalize(base + used * self.dt_usec - USECS_PER_SEC);
        self.skip_count += 1;
        self.slot = 0;
        self.epoch = self.epoch.map(|epoch| epoch + USECS_PER_SEC);
    }

    /// Bind to the record at `epoch_start` from scratch, taking the slot grid phase from
    /// this sample.
    ///
    /// Used for a stream's first sample and after it has been silent for longer than the
    /// live record window.
    pub fn bind(&mut self, epoch_start: i64, sample_time: i64) {
        self.min_diff = (sample_time - epoch_start).rem_euclid(self.dt_usec);
        self.previous_min_diff = self.min_diff;
        self.skip_count = if self.skip_mod > 1 && self.is_short_record() {
            self.skip_mod as u64 - 1
        } else {
            0
        };
        self.slot = 0;
        self.epoch = Some(epoch_start);
        self.stats.early = 0;
        self.stats.late = 0;
    }

    /// Re-derive the slot grid from this sample after sustained drift.
    ///
    /// The cursor is moved to the computed slot rather than stepped by one.
    pub fn resync_slot(&mut self, sample_time: i64, epoch_start: i64) -> Option<usize> {
        self.min_diff = (sample_time - epoch_start).rem_euclid(self.dt_usec);
        self.stats.early = 0;
        self.stats.late = 0;
        self.stats.resyncs += 1;
        let slot = self.compute_slot_index(sample_time, epoch_start)?;
        while self.slot > slot {
            self.retreat_slot();
        }
        while self.slot < slot {
            self.advance_slot();
        }
        Some(slot)
    }

    /// Classify a placement against the cursor.
    ///
    /// Returns true once the run of early or late placements reaches `out_of_slot_max`.
    pub fn note_placement(&mut self, slot: usize, out_of_slot_max: u32) -> bool {
        match slot.cmp(&self.slot) {
            Ordering::Less => {
                self.stats.early += 1;
                self.stats.late = 0;
            }
            Ordering::Greater => {
                self.stats.late += 1;
                self.stats.early = 0;
            }
            Ordering::Equal => {
                self.stats.early = 0;
                self.stats.late = 0;
            }
        }
        self.stats.early >= out_of_slot_max || self.stats.late >= out_of_slot_max
    }

    /// A record is short when its last slot would fall past the end of the second
    fn is_short_record(&self) -> bool {
        self.min_diff + (self.n_slots as i64 - 1) * self.dt_usec >= USECS_PER_SEC
    }

    /// Keep the slot 0 offset within [-dt/2, dt)
    fn normalize(&self, offset: i64) -> i64 {
        let mut offset = offset;
        while offset >= self.dt_usec {
            offset -= self.dt_usec;
        }
        while offset < -self.dt_usec / 2 {
            offset += self.dt_usec;
        }
        offset
    }
}
