use serde::{Deserialize, Serialize};

use super::sample::SampleId;

fn default_length() -> usize {
    1
}

/// A named physical quantity carried by a stream.
///
/// `length` is the number of scalar values per occurrence (1 for a scalar, more for
/// vector quantities such as particle size histograms).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub units: String,
    #[serde(default = "default_length")]
    pub length: usize,
    #[serde(default)]
    pub long_name: String,
}

impl Variable {
    pub fn new(name: &str, units: &str, length: usize) -> Self {
        Self {
            name: name.to_string(),
            units: units.to_string(),
            length,
            long_name: String::new(),
        }
    }

    pub fn with_long_name(mut self, long_name: &str) -> Self {
        self.long_name = long_name.to_string();
        self
    }
}

/// Catalog entry for one stream: its id, nominal rate in Hz and ordered variables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub id: SampleId,
    pub rate: f64,
    pub variables: Vec<Variable>,
}

impl StreamConfig {
    pub fn new(id: u32, rate: f64, variables: Vec<Variable>) -> Self {
        Self {
            id: SampleId(id),
            rate,
            variables,
        }
    }
}
