/// Progress report sent from the processing thread to the UI
#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub progress: f32,
    pub samples_read: u64,
    pub records_emitted: u64,
}

impl WorkerStatus {
    pub fn new(progress: f32, samples_read: u64, records_emitted: u64) -> Self {
        Self {
            progress,
            samples_read,
            records_emitted,
        }
    }
}
