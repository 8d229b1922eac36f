use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::constants::USECS_PER_SEC;
use super::error::LayoutError;
use super::header::{StreamHeader, SyncHeader};
use super::sample::SampleId;
use super::variable::{StreamConfig, Variable};

/// Upper bound applied to a stream's time offset (`toffset`).
///
/// Integral rates always use `SlotPeriod`. For non-integral rates the two choices trade
/// off differently: `SlotPeriod` keeps the offset of a short second exact, while
/// `EpochOverflow` pins it to the amount by which `n_slots` slots overrun one second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinDiffBound {
    #[default]
    SlotPeriod,
    EpochOverflow,
}

/// Number of slots per record for a rate
pub fn slots_per_sec(rate: f64) -> usize {
    rate.ceil() as usize
}

/// Nominal microseconds between slots for a rate
pub fn usecs_per_slot(rate: f64) -> i64 {
    (USECS_PER_SEC as f64 / rate).round() as i64
}

/// Period, in seconds, at which the last slot is left empty for non-integral rates
pub fn skip_modulus(rate: f64) -> u32 {
    if rate.fract() == 0.0 {
        return 1;
    }
    let n_slots = slots_per_sec(rate) as f64;
    (1.0 / (1.0 - (n_slots - rate))).round() as u32
}

/// Frozen placement of one stream inside a sync record
#[derive(Debug, Clone, PartialEq)]
pub struct StreamLayout {
    pub id: SampleId,
    pub rate: f64,
    pub variables: Vec<Variable>,
    pub n_slots: usize,
    pub dt_usec: i64,
    pub skip_mod: u32,
    /// Row index of this stream, in registration order
    pub row: usize,
    /// Offset of this stream's row (its toffset field) in the flat record
    pub offset: usize,
    /// Offset of each variable's block relative to the first value after toffset
    pub var_offsets: Vec<usize>,
    /// Index of this stream's first slot in the record-wide slot numbering
    pub slot_base: usize,
    pub min_diff_bound: i64,
}

impl StreamLayout {
    fn new(
        config: &StreamConfig,
        row: usize,
        offset: usize,
        slot_base: usize,
        policy: MinDiffBound,
    ) -> Result<Self, LayoutError> {
        if !config.rate.is_finite() || config.rate <= 0.0 {
            return Err(LayoutError::BadRate(config.id, config.rate));
        }
        if config.variables.is_empty() {
            return Err(LayoutError::NoVariables(config.id));
        }
        if let Some(var) = config.variables.iter().find(|var| var.length == 0) {
            return Err(LayoutError::ZeroLengthVariable(config.id, var.name.clone()));
        }

        let n_slots = slots_per_sec(config.rate);
        let dt_usec = usecs_per_slot(config.rate);
        if dt_usec < 1 {
            return Err(LayoutError::RateTooHigh(config.id, config.rate));
        }

        let mut var_offsets = Vec::with_capacity(config.variables.len());
        let mut block = 0;
        for var in config.variables.iter() {
            var_offsets.push(block);
            block += var.length * n_slots;
        }

        let is_integral = config.rate.fract() == 0.0;
        let overflow = (n_slots as i64 * dt_usec) % USECS_PER_SEC;
        let min_diff_bound = match policy {
            MinDiffBound::EpochOverflow if !is_integral && overflow > 0 => overflow,
            _ => dt_usec,
        };

        Ok(Self {
            id: config.id,
            rate: config.rate,
            variables: config.variables.clone(),
            n_slots,
            dt_usec,
            skip_mod: skip_modulus(config.rate),
            row,
            offset,
            var_offsets,
            slot_base,
            min_diff_bound,
        })
    }

    /// Number of scalar values in one sample
    pub fn values_per_slot(&self) -> usize {
        self.variables.iter().map(|var| var.length).sum()
    }

    /// Values this stream contributes to a record: the toffset plus every slot of every variable
    pub fn row_length(&self) -> usize {
        1 + self.n_slots * self.values_per_slot()
    }

    /// Absolute index in the flat record of the first value of `var` at `slot`
    pub fn value_index(&self, var: usize, slot: usize) -> usize {
        self.offset + 1 + self.var_offsets[var] + slot * self.variables[var].length
    }

    pub fn header(&self) -> StreamHeader {
        StreamHeader {
            id: self.id,
            rate: self.rate,
            offset: self.offset,
            n_slots: self.n_slots,
            dt_usec: self.dt_usec,
            skip_mod: self.skip_mod,
            variables: self.variables.clone(),
        }
    }
}

/// The frozen layout of a sync record.
///
/// Built once from the full stream catalog before any sample is processed. Rows follow
/// the order in which streams were given.
#[derive(Debug, Clone)]
pub struct RecordLayout {
    streams: Vec<StreamLayout>,
    rows: FxHashMap<SampleId, usize>,
    record_length: usize,
    total_slots: usize,
}

impl RecordLayout {
    pub fn new(configs: &[StreamConfig], policy: MinDiffBound) -> Result<Self, LayoutError> {
        if configs.is_empty() {
            return Err(LayoutError::NoStreams);
        }

        let mut streams: Vec<StreamLayout> = Vec::with_capacity(configs.len());
        let mut rows = FxHashMap::default();
        let mut offset = 0;
        let mut slot_base = 0;
        for (row, config) in configs.iter().enumerate() {
            if rows.insert(config.id, row).is_some() {
                return Err(LayoutError::DuplicateStream(config.id));
            }
            let stream = StreamLayout::new(config, row, offset, slot_base, policy)?;
            spdlog::debug!(
                "Stream {} rate={} n_slots={} dt_usec={} skip_mod={} offset={}",
                stream.id,
                stream.rate,
                stream.n_slots,
                stream.dt_usec,
                stream.skip_mod,
                stream.offset
            );
            offset += stream.row_length();
            slot_base += stream.n_slots;
            streams.push(stream);
        }

        Ok(Self {
            streams,
            rows,
            record_length: offset,
            total_slots: slot_base,
        })
    }

    pub fn streams(&self) -> &[StreamLayout] {
        &self.streams
    }

    pub fn stream(&self, id: SampleId) -> Option<&StreamLayout> {
        self.row_of(id).map(|row| &self.streams[row])
    }

    pub fn row_of(&self, id: SampleId) -> Option<usize> {
        self.rows.get(&id).copied()
    }

    pub fn n_streams(&self) -> usize {
        self.streams.len()
    }

    pub fn record_length(&self) -> usize {
        self.record_length
    }

    /// Number of slots over all streams
    pub fn total_slots(&self) -> usize {
        self.total_slots
    }

    /// Describe this layout for downstream consumers
    pub fn header(&self) -> SyncHeader {
        SyncHeader::new(
            self.record_length,
            self.streams.iter().map(|stream| stream.header()).collect(),
        )
    }
}
