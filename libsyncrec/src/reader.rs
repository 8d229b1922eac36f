use fxhash::FxHashMap;
use ndarray::ArrayView2;

use super::error::ReaderError;
use super::header::{StreamHeader, SyncHeader};
use super::record::SyncRecord;

/// Location of one variable's block inside a record
#[derive(Debug, Clone)]
struct VariableLocation {
    stream: usize,
    start: usize,
    length: usize,
}

/// SyncRecordReader pulls named variables back out of flat sync records.
///
/// Built from the header that preceded the records.
#[derive(Debug, Clone)]
pub struct SyncRecordReader {
    header: SyncHeader,
    locations: FxHashMap<String, VariableLocation>,
}

impl SyncRecordReader {
    pub fn new(header: SyncHeader) -> Result<Self, ReaderError> {
        let mut locations = FxHashMap::default();
        for (row, stream) in header.streams.iter().enumerate() {
            let mut start = stream.offset + 1;
            for var in stream.variables.iter() {
                let location = VariableLocation {
                    stream: row,
                    start,
                    length: var.length,
                };
                if locations.insert(var.name.clone(), location).is_some() {
                    return Err(ReaderError::DuplicateVariable(var.name.clone()));
                }
                start += var.length * stream.n_slots;
            }
        }
        Ok(Self { header, locations })
    }

    pub fn header(&self) -> &SyncHeader {
        &self.header
    }

    /// Variable names in record order
    pub fn variable_names(&self) -> Vec<&str> {
        self.header
            .streams
            .iter()
            .flat_map(|stream| stream.variables.iter().map(|var| var.name.as_str()))
            .collect()
    }

    /// The stream carrying a variable
    pub fn stream_of(&self, name: &str) -> Result<&StreamHeader, ReaderError> {
        let location = self.location(name)?;
        Ok(&self.header.streams[location.stream])
    }

    /// View of a variable's values, one row per slot
    pub fn values<'a>(
        &self,
        record: &'a SyncRecord,
        name: &str,
    ) -> Result<ArrayView2<'a, f64>, ReaderError> {
        self.check_length(record)?;
        let location = self.location(name)?;
        let n_slots = self.header.streams[location.stream].n_slots;
        let block = &record.data[location.start..location.start + n_slots * location.length];
        Ok(ArrayView2::from_shape((n_slots, location.length), block)?)
    }

    /// The time offset of the stream carrying a variable
    pub fn toffset(&self, record: &SyncRecord, name: &str) -> Result<f64, ReaderError> {
        self.check_length(record)?;
        let stream = self.stream_of(name)?;
        Ok(record.data[stream.offset])
    }

    /// Nominal time of each slot of a variable's stream, from the record's toffset.
    ///
    /// Empty if the stream had no sample in the record.
    pub fn slot_times(&self, record: &SyncRecord, name: &str) -> Result<Vec<i64>, ReaderError> {
        let toffset = self.toffset(record, name)?;
        if toffset.is_nan() {
            return Ok(vec![]);
        }
        let stream = self.stream_of(name)?;
        let first = record.epoch + toffset as i64;
        Ok((0..stream.n_slots as i64)
            .map(|slot| first + slot * stream.dt_usec)
            .collect())
    }

    fn location(&self, name: &str) -> Result<&VariableLocation, ReaderError> {
        self.locations
            .get(name)
            .ok_or_else(|| ReaderError::UnknownVariable(name.to_string()))
    }

    fn check_length(&self, record: &SyncRecord) -> Result<(), ReaderError> {
        if record.data.len() != self.header.record_length {
            return Err(ReaderError::BadRecordLength(
                record.data.len(),
                self.header.record_length,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{MinDiffBound, RecordLayout};
    use crate::variable::{StreamConfig, Variable};

    fn reader() -> SyncRecordReader {
        let layout = RecordLayout::new(
            &[
                StreamConfig::new(1, 2.0, vec![Variable::new("A", "V", 1)]),
                StreamConfig::new(
                    2,
                    2.0,
                    vec![Variable::new("B", "V", 2), Variable::new("C", "V", 1)],
                ),
            ],
            MinDiffBound::SlotPeriod,
        )
        .unwrap();
        SyncRecordReader::new(layout.header()).unwrap()
    }

    fn record() -> SyncRecord {
        // A: toffset, a0, a1 | B/C: toffset, b00, b01, b10, b11, c0, c1
        SyncRecord {
            time_tag: 10_500_000,
            epoch: 10_000_000,
            data: vec![
                1_000.0, 1.0, 2.0, f64::NAN, 10.0, 11.0, 20.0, 21.0, 30.0, 31.0,
            ],
        }
    }

    #[test]
    fn test_variable_names() {
        assert_eq!(reader().variable_names(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_values() {
        let reader = reader();
        let record = record();
        let a = reader.values(&record, "A").unwrap();
        assert_eq!(a.shape(), &[2, 1]);
        assert_eq!(a[[1, 0]], 2.0);
        let b = reader.values(&record, "B").unwrap();
        assert_eq!(b.shape(), &[2, 2]);
        assert_eq!(b[[0, 1]], 11.0);
        assert_eq!(b[[1, 0]], 20.0);
        let c = reader.values(&record, "C").unwrap();
        assert_eq!(c.column(0).to_vec(), vec![30.0, 31.0]);
    }

    #[test]
    fn test_slot_times() {
        let reader = reader();
        let record = record();
        assert_eq!(
            reader.slot_times(&record, "A").unwrap(),
            vec![10_001_000, 10_501_000]
        );
        assert!(reader.slot_times(&record, "B").unwrap().is_empty());
        assert!(reader.toffset(&record, "C").unwrap().is_nan());
    }

    #[test]
    fn test_errors() {
        let reader = reader();
        assert!(matches!(
            reader.values(&record(), "D"),
            Err(ReaderError::UnknownVariable(_))
        ));
        let short = SyncRecord {
            time_tag: 0,
            epoch: 0,
            data: vec![0.0; 3],
        };
        assert!(matches!(
            reader.values(&short, "A"),
            Err(ReaderError::BadRecordLength(3, 10))
        ));
        let mut header = reader.header().clone();
        header.streams[1].variables[1].name = String::from("A");
        assert!(matches!(
            SyncRecordReader::new(header),
            Err(ReaderError::DuplicateVariable(_))
        ));
    }
}
