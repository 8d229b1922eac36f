use super::layout::MinDiffBound;

/// Microseconds per second. Every sync record covers exactly this much time.
pub const USECS_PER_SEC: i64 = 1_000_000;

/// Half of a record epoch; emitted records are stamped at the epoch midpoint
pub const HALF_EPOCH_USECS: i64 = USECS_PER_SEC / 2;

/// Number of slots a raw slot index may fall outside of a row and still be clamped into it
pub const NSLOT_LIMIT: i64 = 2;

/// Consecutive early (or late) placements tolerated before the slot grid is resynchronized
pub const DEFAULT_OUT_OF_SLOT_MAX: u32 = 4;

/// Bound applied to the time offset of streams with a non-integral rate
pub const NON_INTEGRAL_MIN_DIFF_BOUND: MinDiffBound = MinDiffBound::SlotPeriod;

/// Number of records kept open at once
pub const LIVE_RECORDS: usize = 2;

/// Item id of the header in a record stream
pub const SYNC_RECORD_HEADER_ID: u32 = 1;
/// Item id of a data record in a record stream
pub const SYNC_RECORD_ID: u32 = 2;
/// Largest header item a record file reader accepts, in bytes
pub const MAX_HEADER_BYTES: usize = 16 * 1024 * 1024;

/// Warnings for per-sample conditions are only logged once per this many occurrences
pub const LOG_EVERY: u64 = 100;
