use hdf5::types::VarLenUnicode;
use hdf5::File;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use super::error::SinkError;
use super::header::SyncHeader;
use super::record::SyncRecord;
use super::sink::RecordSink;

const RECORDS_NAME: &str = "records";
const STREAMS_NAME: &str = "streams";

// Record counters start from 0
const START_RECORD_NUMBER: u64 = 0;

fn unicode(text: &str) -> Result<VarLenUnicode, SinkError> {
    VarLenUnicode::from_str(text).map_err(|e| SinkError::EncodingError(e.to_string()))
}

/// A simple struct which wraps around the hdf5-rust library.
///
/// Opens an HDF5 file for writing sync records, one dataset per record.
#[derive(Debug)]
pub struct HDFWriter {
    file_handle: File,
    records_group: hdf5::Group,
    record_counter: u64,
    first_time_tag: Option<i64>,
    last_time_tag: i64,
}
// Structure
// records - min_record, max_record, min_time_tag, max_time_tag, record_length, version, header
// |---- record_#(dset) - time_tag, epoch
// streams
// |---- stream_#(group) - rate, offset, n_slots, dt_usec, skip_mod, variables, units

impl HDFWriter {
    /// Create the writer, opening a file at path and creating the records group
    pub fn new(path: &Path) -> Result<Self, SinkError> {
        let file_handle = File::create(path)?;
        let records_group = file_handle.create_group(RECORDS_NAME)?;
        records_group.new_attr::<u64>().create("min_record")?;
        records_group.new_attr::<u64>().create("max_record")?;
        records_group.new_attr::<i64>().create("min_time_tag")?;
        records_group.new_attr::<i64>().create("max_time_tag")?;

        Ok(Self {
            file_handle,
            records_group,
            record_counter: START_RECORD_NUMBER,
            first_time_tag: None,
            last_time_tag: 0,
        })
    }
}

impl RecordSink for HDFWriter {
    /// Write the layout as attributes, plus the full header text
    fn send_header(&mut self, header: &Arc<SyncHeader>) -> Result<(), SinkError> {
        self.records_group
            .new_attr::<u64>()
            .create("record_length")?
            .write_scalar(&(header.record_length as u64))?;
        self.records_group
            .new_attr::<VarLenUnicode>()
            .create("version")?
            .write_scalar(&unicode(&header.version)?)?;
        self.records_group
            .new_attr::<VarLenUnicode>()
            .create("header")?
            .write_scalar(&unicode(&header.to_yaml()?)?)?;

        let streams_group = self.file_handle.create_group(STREAMS_NAME)?;
        for stream in header.streams.iter() {
            let group = streams_group.create_group(&format!("stream_{}", stream.id))?;
            group.new_attr::<f64>().create("rate")?.write_scalar(&stream.rate)?;
            group
                .new_attr::<u64>()
                .create("offset")?
                .write_scalar(&(stream.offset as u64))?;
            group
                .new_attr::<u64>()
                .create("n_slots")?
                .write_scalar(&(stream.n_slots as u64))?;
            group
                .new_attr::<i64>()
                .create("dt_usec")?
                .write_scalar(&stream.dt_usec)?;
            group
                .new_attr::<u32>()
                .create("skip_mod")?
                .write_scalar(&stream.skip_mod)?;
            let names: Vec<&str> = stream.variables.iter().map(|var| var.name.as_str()).collect();
            let units: Vec<&str> = stream.variables.iter().map(|var| var.units.as_str()).collect();
            group
                .new_attr::<VarLenUnicode>()
                .create("variables")?
                .write_scalar(&unicode(&names.join(" "))?)?;
            group
                .new_attr::<VarLenUnicode>()
                .create("units")?
                .write_scalar(&unicode(&units.join(" "))?)?;
        }
        Ok(())
    }

    /// Write a record as a dataset
    fn send_record(&mut self, record: &Arc<SyncRecord>) -> Result<(), SinkError> {
        if self.first_time_tag.is_none() {
            self.first_time_tag = Some(record.time_tag);
        }
        self.last_time_tag = record.time_tag;

        let record_dset = self
            .records_group
            .new_dataset_builder()
            .with_data(&record.data)
            .create(format!("record_{}", self.record_counter).as_str())?;
        record_dset
            .new_attr::<i64>()
            .create("time_tag")?
            .write_scalar(&record.time_tag)?;
        record_dset
            .new_attr::<i64>()
            .create("epoch")?
            .write_scalar(&record.epoch)?;
        self.record_counter += 1;
        Ok(())
    }

    /// Write meta information on first and last records
    fn close(&mut self) -> Result<(), SinkError> {
        self.records_group
            .attr("min_record")?
            .write_scalar(&START_RECORD_NUMBER)?;
        self.records_group
            .attr("max_record")?
            .write_scalar(&self.record_counter.saturating_sub(1))?;
        let first = self.first_time_tag.unwrap_or(0);
        self.records_group.attr("min_time_tag")?.write_scalar(&first)?;
        self.records_group
            .attr("max_time_tag")?
            .write_scalar(&self.last_time_tag)?;
        self.file_handle.flush()?;
        spdlog::info!(
            "{} records written to HDF5. Records span {} seconds.",
            self.record_counter,
            (self.last_time_tag - first) / 1_000_000
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{MinDiffBound, RecordLayout};
    use crate::variable::{StreamConfig, Variable};

    #[test]
    fn test_write_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.h5");
        let layout = RecordLayout::new(
            &[StreamConfig::new(3, 2.0, vec![Variable::new("X", "m", 1)])],
            MinDiffBound::SlotPeriod,
        )
        .unwrap();
        let mut writer = HDFWriter::new(&path).unwrap();
        writer.send_header(&Arc::new(layout.header())).unwrap();
        writer
            .send_record(&Arc::new(SyncRecord {
                time_tag: 1_500_000,
                epoch: 1_000_000,
                data: vec![0.0, 1.0, 2.0],
            }))
            .unwrap();
        writer.close().unwrap();
        drop(writer);

        let file = File::open(&path).unwrap();
        let data: Vec<f64> = file.dataset("records/record_0").unwrap().read_raw().unwrap();
        assert_eq!(data, vec![0.0, 1.0, 2.0]);
        let max: u64 = file
            .group(RECORDS_NAME)
            .unwrap()
            .attr("max_record")
            .unwrap()
            .read_scalar()
            .unwrap();
        assert_eq!(max, 0);
    }
}
