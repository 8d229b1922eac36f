use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use super::error::SampleFileError;
use super::sample::{Sample, SampleId};
use super::source::SampleSource;
use super::variable::StreamConfig;

/// A text file of samples, one per line: `time_usec,sample_id,v0,v1,...`
///
/// Blank lines and lines starting with `#` are skipped. The streams the file carries
/// come from the configuration, as the file itself has no catalog.
#[derive(Debug)]
pub struct SampleFile {
    path: PathBuf,
    reader: BufReader<File>,
    streams: Vec<StreamConfig>,
    line_number: usize,
    bytes_read: u64,
    size_bytes: u64,
}

impl SampleFile {
    pub fn new(path: &Path, streams: Vec<StreamConfig>) -> Result<Self, SampleFileError> {
        if !path.exists() {
            return Err(SampleFileError::BadFilePath(path.to_path_buf()));
        }
        let file = File::open(path)?;
        let size_bytes = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            streams,
            line_number: 0,
            bytes_read: 0,
            size_bytes,
        })
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Read the next sample.
    ///
    /// Returns a `Result<Option<Sample>>`. The Option is None at end of file.
    pub fn next_sample(&mut self) -> Result<Option<Sample>, SampleFileError> {
        let mut line = String::new();
        loop {
            line.clear();
            let n_bytes = self.reader.read_line(&mut line)?;
            if n_bytes == 0 {
                return Ok(None);
            }
            self.bytes_read += n_bytes as u64;
            self.line_number += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            return parse_line(trimmed, self.line_number).map(Some);
        }
    }
}

impl SampleSource for SampleFile {
    fn name(&self) -> &str {
        self.path.to_str().unwrap_or("sample file")
    }

    fn streams(&self) -> &[StreamConfig] {
        &self.streams
    }
}

fn parse_line(line: &str, line_number: usize) -> Result<Sample, SampleFileError> {
    let mut fields = line.split(',').map(str::trim);
    let time_tag = match fields.next() {
        Some(field) if !field.is_empty() => field
            .parse::<i64>()
            .map_err(|e| SampleFileError::BadInteger(line_number, e))?,
        _ => return Err(SampleFileError::BadLineFormat(line_number)),
    };
    let id = match fields.next() {
        Some(field) => field
            .parse::<u32>()
            .map_err(|e| SampleFileError::BadInteger(line_number, e))?,
        None => return Err(SampleFileError::BadLineFormat(line_number)),
    };
    let data = fields
        .filter(|field| !field.is_empty())
        .map(|field| {
            field
                .parse::<f64>()
                .map_err(|e| SampleFileError::BadValue(line_number, e))
        })
        .collect::<Result<Vec<f64>, SampleFileError>>()?;
    Ok(Sample::new(SampleId(id), time_tag, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_line() {
        let sample = parse_line("1000009000, 100, 1.5, nan,-2", 1).unwrap();
        assert_eq!(sample.id, SampleId(100));
        assert_eq!(sample.time_tag, 1_000_009_000);
        assert_eq!(sample.data.len(), 3);
        assert_eq!(sample.data[0], 1.5);
        assert!(sample.data[1].is_nan());
        assert_eq!(sample.data[2], -2.0);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_line("1000", 3),
            Err(SampleFileError::BadLineFormat(3))
        ));
        assert!(matches!(
            parse_line("abc,1,2.0", 4),
            Err(SampleFileError::BadInteger(4, _))
        ));
        assert!(matches!(
            parse_line("10,1,x", 5),
            Err(SampleFileError::BadValue(5, _))
        ));
    }

    #[test]
    fn test_read_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# time,id,values").unwrap();
        writeln!(file, "9000,100,0.0").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "109000,100,1.0").unwrap();
        writeln!(file, "109000,100,oops").unwrap();
        file.flush().unwrap();

        let mut samples = SampleFile::new(file.path(), vec![]).unwrap();
        assert!(samples.size_bytes() > 0);
        assert_eq!(samples.next_sample().unwrap().unwrap().time_tag, 9_000);
        assert_eq!(samples.next_sample().unwrap().unwrap().data, vec![1.0]);
        assert!(matches!(
            samples.next_sample(),
            Err(SampleFileError::BadValue(5, _))
        ));
        assert_eq!(samples.next_sample().unwrap(), None);
        assert_eq!(samples.bytes_read(), samples.size_bytes());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            SampleFile::new(Path::new("/no/such/samples.csv"), vec![]),
            Err(SampleFileError::BadFilePath(_))
        ));
    }
}
