use std::path::PathBuf;
use thiserror::Error;

use super::sample::SampleId;
use super::worker_status::WorkerStatus;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LayoutError {
    #[error("Stream {0} has an invalid rate {1}; rates must be finite and greater than zero")]
    BadRate(SampleId, f64),
    #[error("Stream {0} has a rate of {1} Hz which leaves less than one microsecond per slot")]
    RateTooHigh(SampleId, f64),
    #[error("Stream {0} has no variables")]
    NoVariables(SampleId),
    #[error("Variable {1} of stream {0} has zero length")]
    ZeroLengthVariable(SampleId, String),
    #[error("Stream {0} was registered more than once with different layouts")]
    DuplicateStream(SampleId),
    #[error("No streams were registered before the layout was built")]
    NoStreams,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config has an invalid out_of_slot_max of {0}; it must be at least 1")]
    BadOutOfSlotMax(u32),
}

#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("SyncHeader failed to convert to/from yaml: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("SyncHeader stream {0} at offset {1} overruns the record length {2}")]
    InconsistentLayout(SampleId, usize, usize),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("RecordSink failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("RecordSink failed because its receiver hung up")]
    Disconnected,
    #[error("RecordSink failed to encode the header: {0}")]
    HeaderError(#[from] HeaderError),
    #[error("RecordSink failed to encode a string: {0}")]
    EncodingError(String),
    #[cfg(feature = "hdf5")]
    #[error("RecordSink failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
}

#[derive(Debug, Error)]
pub enum SampleFileError {
    #[error("Could not open sample file because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Sample file failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Sample file failed to parse an integer on line {0}: {1}")]
    BadInteger(usize, std::num::ParseIntError),
    #[error("Sample file failed to parse a value on line {0}: {1}")]
    BadValue(usize, std::num::ParseFloatError),
    #[error("Sample file line {0} has too few columns; expected time,id[,values...]")]
    BadLineFormat(usize),
}

#[derive(Debug, Error)]
pub enum RecordFileError {
    #[error("Could not open record file because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Record file failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Record file did not start with a sync header item; found item id {0}")]
    MissingHeader(u32),
    #[error("Record file contained an unexpected item id {0}")]
    UnexpectedItem(u32),
    #[error("Record file header claims {0} bytes; at most {1} are accepted")]
    HeaderTooLarge(usize, usize),
    #[error("Record file header is not valid UTF-8")]
    BadHeaderText,
    #[error("Record file has a record of length {0}; the header describes length {1}")]
    BadRecordLength(usize, usize),
    #[error("Record file failed due to header error: {0}")]
    HeaderError(#[from] HeaderError),
    #[error("Record file was truncated in the middle of an item")]
    Truncated,
}

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("SyncRecordReader found variable {0} more than once in the header")]
    DuplicateVariable(String),
    #[error("SyncRecordReader has no variable named {0}")]
    UnknownVariable(String),
    #[error("SyncRecordReader was given a record of length {0}; the header describes length {1}")]
    BadRecordLength(usize, usize),
    #[error("SyncRecordReader failed to shape variable values: {0}")]
    ShapeError(#[from] ndarray::ShapeError),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to Layout error: {0}")]
    LayoutError(#[from] LayoutError),
    #[error("Processor failed due to SampleFile error: {0}")]
    SampleFileError(#[from] SampleFileError),
    #[error("Processor failed due to RecordFile error: {0}")]
    RecordFileError(#[from] RecordFileError),
    #[error("Processor failed due to RecordSink error: {0}")]
    SinkError(#[from] SinkError),
    #[error("Processor failed to write statistics yaml: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}
