use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use std::sync::Arc;

use super::constants::{MAX_HEADER_BYTES, SYNC_RECORD_HEADER_ID, SYNC_RECORD_ID};
use super::error::{RecordFileError, SinkError};
use super::header::SyncHeader;
use super::record::SyncRecord;
use super::sink::RecordSink;

/// Bytes in an item prefix: time tag, item id, payload length
const ITEM_PREFIX_BYTES: usize = 16;

/// Writes sync records as a little endian binary stream.
///
/// Each item is `[time_tag: i64][id: u32][length: u32][payload]`. The header item
/// carries YAML text and its length counts bytes; a record item carries `length` f64
/// values.
#[derive(Debug)]
pub struct RecordFileWriter {
    writer: BufWriter<File>,
    records_written: u64,
}

impl RecordFileWriter {
    pub fn new(path: &Path) -> Result<Self, SinkError> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
            records_written: 0,
        })
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    fn write_prefix(&mut self, time_tag: i64, id: u32, length: usize) -> Result<(), SinkError> {
        let length = u32::try_from(length).map_err(|_| {
            SinkError::EncodingError(format!("item length {length} does not fit in 32 bits"))
        })?;
        self.writer.write_i64::<LittleEndian>(time_tag)?;
        self.writer.write_u32::<LittleEndian>(id)?;
        self.writer.write_u32::<LittleEndian>(length)?;
        Ok(())
    }
}

impl RecordSink for RecordFileWriter {
    fn send_header(&mut self, header: &Arc<SyncHeader>) -> Result<(), SinkError> {
        let text = header.to_yaml()?;
        self.write_prefix(header.start_time.unwrap_or(0), SYNC_RECORD_HEADER_ID, text.len())?;
        self.writer.write_all(text.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    fn send_record(&mut self, record: &Arc<SyncRecord>) -> Result<(), SinkError> {
        self.write_prefix(record.time_tag, SYNC_RECORD_ID, record.data.len())?;
        for value in record.data.iter() {
            self.writer.write_f64::<LittleEndian>(*value)?;
        }
        self.writer.flush()?;
        self.records_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        spdlog::info!("Record file closed after {} records", self.records_written);
        Ok(())
    }
}

struct ItemPrefix {
    time_tag: i64,
    id: u32,
    length: usize,
}

/// Reads back a stream written by RecordFileWriter.
///
/// The header is read when the file is opened.
#[derive(Debug)]
pub struct RecordFileReader {
    reader: BufReader<File>,
    header: SyncHeader,
}

impl RecordFileReader {
    pub fn new(path: &Path) -> Result<Self, RecordFileError> {
        if !path.exists() {
            return Err(RecordFileError::BadFilePath(path.to_path_buf()));
        }
        let mut reader = BufReader::new(File::open(path)?);
        let prefix = match read_prefix(&mut reader)? {
            Some(prefix) => prefix,
            None => return Err(RecordFileError::Truncated),
        };
        if prefix.id != SYNC_RECORD_HEADER_ID {
            return Err(RecordFileError::MissingHeader(prefix.id));
        }
        if prefix.length > MAX_HEADER_BYTES {
            return Err(RecordFileError::HeaderTooLarge(prefix.length, MAX_HEADER_BYTES));
        }
        let mut text = vec![0u8; prefix.length];
        read_payload(&mut reader, &mut text)?;
        let text = String::from_utf8(text).map_err(|_| RecordFileError::BadHeaderText)?;
        let header = SyncHeader::from_yaml(&text)?;
        spdlog::debug!(
            "Opened record file {:?} starting at {:?}",
            path,
            header.start_time
        );
        Ok(Self { reader, header })
    }

    pub fn header(&self) -> &SyncHeader {
        &self.header
    }

    /// Read the next record.
    ///
    /// Returns a `Result<Option<SyncRecord>>`. The Option is None at end of file.
    pub fn next_record(&mut self) -> Result<Option<SyncRecord>, RecordFileError> {
        let prefix = match read_prefix(&mut self.reader)? {
            Some(prefix) => prefix,
            None => return Ok(None),
        };
        if prefix.id != SYNC_RECORD_ID {
            return Err(RecordFileError::UnexpectedItem(prefix.id));
        }
        if prefix.length != self.header.record_length {
            return Err(RecordFileError::BadRecordLength(
                prefix.length,
                self.header.record_length,
            ));
        }
        let mut data = vec![0.0; prefix.length];
        match self.reader.read_f64_into::<LittleEndian>(&mut data) {
            Ok(()) => (),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                return Err(RecordFileError::Truncated)
            }
            Err(e) => return Err(RecordFileError::IOError(e)),
        }
        Ok(Some(SyncRecord {
            time_tag: prefix.time_tag,
            epoch: prefix.time_tag - self.header.usecs_per_record / 2,
            data,
        }))
    }
}

/// Read an item prefix. None at a clean end of file.
fn read_prefix<R: Read>(reader: &mut R) -> Result<Option<ItemPrefix>, RecordFileError> {
    let mut bytes = [0u8; ITEM_PREFIX_BYTES];
    let mut filled = 0;
    while filled < ITEM_PREFIX_BYTES {
        match reader.read(&mut bytes[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(RecordFileError::Truncated),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(RecordFileError::IOError(e)),
        }
    }
    let mut cursor = &bytes[..];
    Ok(Some(ItemPrefix {
        time_tag: cursor.read_i64::<LittleEndian>()?,
        id: cursor.read_u32::<LittleEndian>()?,
        length: cursor.read_u32::<LittleEndian>()? as usize,
    }))
}

fn read_payload<R: Read>(reader: &mut R, buffer: &mut [u8]) -> Result<(), RecordFileError> {
    match reader.read_exact(buffer) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(RecordFileError::Truncated),
        Err(e) => Err(RecordFileError::IOError(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::StreamHeader;
    use crate::sample::SampleId;
    use crate::variable::Variable;

    fn header() -> Arc<SyncHeader> {
        let mut header = SyncHeader::new(
            3,
            vec![StreamHeader {
                id: SampleId(5),
                rate: 2.0,
                offset: 0,
                n_slots: 2,
                dt_usec: 500_000,
                skip_mod: 1,
                variables: vec![Variable::new("X", "m", 1)],
            }],
        );
        header.start_time = Some(4_000_000);
        Arc::new(header)
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.dat");
        let header = header();
        let records = vec![
            Arc::new(SyncRecord {
                time_tag: 4_500_000,
                epoch: 4_000_000,
                data: vec![1_000.0, 1.0, f64::NAN],
            }),
            Arc::new(SyncRecord {
                time_tag: 5_500_000,
                epoch: 5_000_000,
                data: vec![f64::NAN, f64::NAN, f64::NAN],
            }),
        ];

        let mut writer = RecordFileWriter::new(&path).unwrap();
        writer.send_header(&header).unwrap();
        for record in records.iter() {
            writer.send_record(record).unwrap();
        }
        writer.close().unwrap();
        assert_eq!(writer.records_written(), 2);

        let mut reader = RecordFileReader::new(&path).unwrap();
        assert_eq!(reader.header(), header.as_ref());
        for expected in records.iter() {
            let record = reader.next_record().unwrap().unwrap();
            assert_eq!(record.time_tag, expected.time_tag);
            assert_eq!(record.epoch, expected.epoch);
            let bits: Vec<u64> = record.data.iter().map(|v| v.to_bits()).collect();
            let expected_bits: Vec<u64> = expected.data.iter().map(|v| v.to_bits()).collect();
            assert_eq!(bits, expected_bits);
        }
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn test_truncated_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.dat");
        let mut writer = RecordFileWriter::new(&path).unwrap();
        writer.send_header(&header()).unwrap();
        writer
            .send_record(&Arc::new(SyncRecord {
                time_tag: 4_500_000,
                epoch: 4_000_000,
                data: vec![0.0; 3],
            }))
            .unwrap();
        drop(writer);
        let length = std::fs::metadata(&path).unwrap().len();
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(length - 4).unwrap();

        let mut reader = RecordFileReader::new(&path).unwrap();
        assert!(matches!(reader.next_record(), Err(RecordFileError::Truncated)));
    }

    #[test]
    fn test_missing_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.dat");
        let mut writer = RecordFileWriter::new(&path).unwrap();
        writer
            .send_record(&Arc::new(SyncRecord {
                time_tag: 0,
                epoch: 0,
                data: vec![],
            }))
            .unwrap();
        drop(writer);
        assert!(matches!(
            RecordFileReader::new(&path),
            Err(RecordFileError::MissingHeader(SYNC_RECORD_ID))
        ));
    }

    #[test]
    fn test_oversized_header_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.dat");
        let mut bytes: Vec<u8> = Vec::new();
        bytes.write_i64::<LittleEndian>(0).unwrap();
        bytes.write_u32::<LittleEndian>(SYNC_RECORD_HEADER_ID).unwrap();
        bytes.write_u32::<LittleEndian>(u32::MAX).unwrap();
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(
            RecordFileReader::new(&path),
            Err(RecordFileError::HeaderTooLarge(_, MAX_HEADER_BYTES))
        ));
    }
}
