use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::constants::USECS_PER_SEC;

/// Identifier shared by every sample of one stream
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SampleId(pub u32);

impl Display for SampleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SampleId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// A single time tagged measurement as delivered by the upstream sorter.
///
/// The time tag is in microseconds since the Unix epoch and the payload holds the values
/// of every variable of the stream, in variable order.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub id: SampleId,
    pub time_tag: i64,
    pub data: Vec<f64>,
}

impl Sample {
    pub fn new(id: SampleId, time_tag: i64, data: Vec<f64>) -> Self {
        Self { id, time_tag, data }
    }

    /// Start of the one second epoch containing this sample
    pub fn epoch(&self) -> i64 {
        epoch_of(self.time_tag)
    }
}

/// Start of the one second epoch containing `time_tag`
pub fn epoch_of(time_tag: i64) -> i64 {
    time_tag - time_tag.rem_euclid(USECS_PER_SEC)
}
