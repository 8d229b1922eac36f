use std::sync::mpsc::Sender;

use super::config::Config;
use super::error::ProcessorError;
#[cfg(feature = "hdf5")]
use super::hdf_writer::HDFWriter;
use super::record_file::RecordFileWriter;
use super::sample_file::SampleFile;
use super::source::SyncRecordSource;
use super::statistics::SyncStatistics;
use super::worker_status::WorkerStatus;

/// Attach the configured output sinks
fn add_sinks(config: &Config, sync: &mut SyncRecordSource) -> Result<(), ProcessorError> {
    if let Some(parent) = config.output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    sync.add_sink(Box::new(RecordFileWriter::new(&config.output_path)?));
    spdlog::info!("Writing sync records to {:?}", config.output_path);

    #[cfg(feature = "hdf5")]
    if let Some(hdf_path) = &config.hdf_path {
        sync.add_sink(Box::new(HDFWriter::new(hdf_path)?));
        spdlog::info!("Writing sync records to HDF5 file {:?}", hdf_path);
    }
    #[cfg(not(feature = "hdf5"))]
    if config.has_hdf_path() {
        spdlog::warn!("hdf_path is set but syncrec was built without the hdf5 feature; skipping HDF5 output");
    }
    Ok(())
}

/// The main loop of syncrec.
///
/// Reads every sample in the configured file, builds the sync records and writes them
/// out. Progress is reported over `tx`. The function to be called by a separate thread
/// (typically the UI).
pub fn process(config: Config, tx: Sender<WorkerStatus>) -> Result<SyncStatistics, ProcessorError> {
    let mut samples = SampleFile::new(&config.sample_path, config.streams.clone())?;
    spdlog::info!(
        "Total sample file size: {}",
        human_bytes::human_bytes(samples.size_bytes() as f64)
    );

    let mut sync = SyncRecordSource::new(config.out_of_slot_max, config.non_integral_bound);
    sync.connect(&samples)?;
    add_sinks(&config, &mut sync)?;
    sync.init()?;

    let total_data_size = samples.size_bytes();
    let flush_frac: f32 = 0.01;
    let flush_val = (total_data_size as f64 * flush_frac as f64) as u64;
    let mut last_flush: u64 = 0;
    let mut samples_read: u64 = 0;

    spdlog::info!("Processing samples...");
    tx.send(WorkerStatus::new(0.0, 0, 0))?;
    while let Some(sample) = samples.next_sample()? {
        sync.receive(&sample);
        samples_read += 1;
        if let Some(e) = sync.take_sink_error() {
            return Err(ProcessorError::SinkError(e));
        }

        if samples.bytes_read() - last_flush > flush_val {
            last_flush = samples.bytes_read();
            tx.send(WorkerStatus::new(
                samples.bytes_read() as f32 / total_data_size as f32,
                samples_read,
                sync.statistics().records_emitted,
            ))?;
        }
    }

    sync.finish();
    if let Some(e) = sync.take_sink_error() {
        return Err(ProcessorError::SinkError(e));
    }
    sync.disconnect(&samples);

    let stats = sync.statistics();
    stats.log_summary();
    let stats_path = config.get_stats_path();
    stats.write_yaml(&stats_path)?;
    spdlog::info!("Wrote statistics to {:?}", stats_path);

    tx.send(WorkerStatus::new(1.0, samples_read, stats.records_emitted))?;
    spdlog::info!("Done with {} samples.", samples_read);
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record_file::RecordFileReader;
    use crate::variable::{StreamConfig, Variable};
    use std::io::Write;
    use std::sync::mpsc::channel;

    #[test]
    fn test_process_sample_file() {
        let dir = tempfile::tempdir().unwrap();
        let sample_path = dir.path().join("samples.csv");
        let mut file = std::fs::File::create(&sample_path).unwrap();
        writeln!(file, "# time_usec,id,TTX").unwrap();
        for second in 0..3 {
            for i in 0..10 {
                let t = 1_000_000_000 + second * 1_000_000 + 9_000 + i * 100_000;
                writeln!(file, "{t},100,{i}").unwrap();
            }
        }
        writeln!(file, "1002500000,55,1.0").unwrap();
        drop(file);

        let config = Config {
            sample_path,
            output_path: dir.path().join("out").join("records.dat"),
            streams: vec![StreamConfig::new(100, 10.0, vec![Variable::new("TTX", "degC", 1)])],
            ..Default::default()
        };
        let (tx, rx) = channel();
        let stats = process(config.clone(), tx).unwrap();
        assert_eq!(stats.records_emitted, 3);
        assert_eq!(stats.unrecognized, 1);
        assert_eq!(stats.streams[0].counts.total, 30);

        let last = rx.try_iter().last().unwrap();
        assert_eq!(last.progress, 1.0);
        assert_eq!(last.samples_read, 31);

        let mut reader = RecordFileReader::new(&config.output_path).unwrap();
        assert_eq!(reader.header().start_time, Some(1_000_000_000));
        let mut count = 0;
        while let Some(record) = reader.next_record().unwrap() {
            assert_eq!(record.data[0], 9_000.0);
            assert_eq!(record.data[10], 9.0);
            count += 1;
        }
        assert_eq!(count, 3);
        assert!(config.get_stats_path().exists());
    }

    #[test]
    fn test_process_missing_samples() {
        let (tx, _rx) = channel();
        assert!(matches!(
            process(Config::template(), tx),
            Err(ProcessorError::SampleFileError(_))
        ));
    }
}
