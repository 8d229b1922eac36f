use std::sync::mpsc::Sender;
use std::sync::Arc;

use super::error::SinkError;
use super::header::SyncHeader;
use super::record::SyncRecord;

/// What a sync record builder hands downstream
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutput {
    Header(Arc<SyncHeader>),
    Record(Arc<SyncRecord>),
}

/// A downstream consumer of sync records.
///
/// The header is always sent once before the first record. Records arrive in strictly
/// increasing epoch order.
pub trait RecordSink {
    fn send_header(&mut self, header: &Arc<SyncHeader>) -> Result<(), SinkError>;

    fn send_record(&mut self, record: &Arc<SyncRecord>) -> Result<(), SinkError>;

    /// Called once at end of stream
    fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl RecordSink for Sender<SyncOutput> {
    fn send_header(&mut self, header: &Arc<SyncHeader>) -> Result<(), SinkError> {
        self.send(SyncOutput::Header(header.clone()))
            .map_err(|_| SinkError::Disconnected)
    }

    fn send_record(&mut self, record: &Arc<SyncRecord>) -> Result<(), SinkError> {
        self.send(SyncOutput::Record(record.clone()))
            .map_err(|_| SinkError::Disconnected)
    }
}
