use serde::{Deserialize, Serialize};
use std::fmt::Write;

use super::constants::USECS_PER_SEC;
use super::error::HeaderError;
use super::sample::SampleId;
use super::variable::Variable;

/// This is the version of the record format
const FORMAT_VERSION: &str = "1.0";

/// Header entry for one stream: where its row sits and how to read it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamHeader {
    pub id: SampleId,
    pub rate: f64,
    pub offset: usize,
    pub n_slots: usize,
    pub dt_usec: i64,
    pub skip_mod: u32,
    pub variables: Vec<Variable>,
}

impl StreamHeader {
    pub fn row_length(&self) -> usize {
        1 + self.n_slots * self.variables.iter().map(|var| var.length).sum::<usize>()
    }
}

/// The layout contract published once, before the first sync record.
///
/// Streams appear in row order. `start_time` is the epoch of the first record that
/// followed this header, if the header has been published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncHeader {
    pub version: String,
    pub record_length: usize,
    pub usecs_per_record: i64,
    #[serde(default)]
    pub start_time: Option<i64>,
    pub streams: Vec<StreamHeader>,
}

impl SyncHeader {
    pub fn new(record_length: usize, streams: Vec<StreamHeader>) -> Self {
        Self {
            version: format!("{}:{}", env!("CARGO_PKG_NAME"), FORMAT_VERSION),
            record_length,
            usecs_per_record: USECS_PER_SEC,
            start_time: None,
            streams,
        }
    }

    pub fn stream(&self, id: SampleId) -> Option<&StreamHeader> {
        self.streams.iter().find(|stream| stream.id == id)
    }

    pub fn to_yaml(&self) -> Result<String, HeaderError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Parse a header and check that every row fits in the record
    pub fn from_yaml(yaml_str: &str) -> Result<Self, HeaderError> {
        let header = serde_yaml::from_str::<Self>(yaml_str)?;
        for stream in header.streams.iter() {
            if stream.offset + stream.row_length() > header.record_length {
                return Err(HeaderError::InconsistentLayout(
                    stream.id,
                    stream.offset,
                    header.record_length,
                ));
            }
        }
        Ok(header)
    }

    /// Render the legacy `variables { } rates { }` text block.
    ///
    /// Variable type is always `n` (continuous) since only continuous data are synced.
    pub fn rates_text(&self) -> String {
        let mut text = String::new();
        // write! to a String cannot fail
        let _ = writeln!(text, "variables {{");
        for stream in self.streams.iter() {
            for var in stream.variables.iter() {
                let _ = writeln!(
                    text,
                    "{} n {} \"{}\" \"{}\"  \"{}\";",
                    text_name(&var.name),
                    var.length,
                    var.units,
                    var.long_name,
                    var.units
                );
            }
        }
        let _ = writeln!(text, "}}");
        let _ = writeln!(text, "rates {{");
        for stream in self.streams.iter() {
            let _ = write!(text, "{:.2} ", stream.rate);
            for var in stream.variables.iter() {
                let _ = write!(text, "{} ", text_name(&var.name));
            }
            let _ = writeln!(text, ";");
        }
        let _ = writeln!(text, "}}");
        text
    }
}

/// Names in the text header are whitespace delimited
fn text_name(name: &str) -> String {
    if name.contains(' ') {
        spdlog::warn!(
            "variable name \"{}\" has one or more embedded spaces, replacing with '_'",
            name
        );
        name.replace(' ', "_")
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example() -> SyncHeader {
        SyncHeader::new(
            11 + 4,
            vec![
                StreamHeader {
                    id: SampleId(100),
                    rate: 10.0,
                    offset: 0,
                    n_slots: 10,
                    dt_usec: 100_000,
                    skip_mod: 1,
                    variables: vec![Variable::new("TTX", "degC", 1)],
                },
                StreamHeader {
                    id: SampleId(200),
                    rate: 2.5,
                    offset: 11,
                    n_slots: 3,
                    dt_usec: 400_000,
                    skip_mod: 2,
                    variables: vec![Variable::new("PSX", "hPa", 1).with_long_name("Static pressure")],
                },
            ],
        )
    }

    #[test]
    fn test_yaml_round_trip() {
        let header = example();
        let yaml = header.to_yaml().unwrap();
        let parsed = SyncHeader::from_yaml(&yaml).unwrap();
        assert_eq!(header, parsed);
        assert_eq!(parsed.stream(SampleId(200)).unwrap().row_length(), 4);
    }

    #[test]
    fn test_inconsistent_header() {
        let mut header = example();
        header.record_length = 12;
        let yaml = header.to_yaml().unwrap();
        match SyncHeader::from_yaml(&yaml) {
            Err(HeaderError::InconsistentLayout(id, offset, len)) => {
                assert_eq!(id, SampleId(200));
                assert_eq!(offset, 11);
                assert_eq!(len, 12);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_rates_text() {
        let mut header = example();
        header.streams[0].variables[0].name = String::from("T TX");
        let text = header.rates_text();
        assert!(text.starts_with("variables {\n"));
        assert!(text.contains("T_TX n 1 \"degC\""));
        assert!(text.contains("PSX n 1 \"hPa\" \"Static pressure\""));
        assert!(text.contains("rates {\n10.00 T_TX ;\n2.50 PSX ;\n}\n"));
    }
}
