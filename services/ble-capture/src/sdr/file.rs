//! Replay of previously demodulated bytes from a file

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::info;

/// Bounded reads over a recorded byte stream
pub struct FileReplay {
    reader: Box<dyn Read + Send>,
    bytes_read: u64,
}

impl FileReplay {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open input file {}", path.display()))?;
        info!("Replaying demodulated bytes from {}", path.display());
        Ok(Self::from_reader(BufReader::new(file)))
    }

    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        Self {
            reader: Box::new(reader),
            bytes_read: 0,
        }
    }

    /// Read up to `max_bytes`. An empty chunk means end of input.
    pub fn read_chunk(&mut self, max_bytes: usize) -> io::Result<Vec<u8>> {
        let mut chunk = vec![0u8; max_bytes];
        let n_read = loop {
            match self.reader.read(&mut chunk) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };
        chunk.truncate(n_read);
        self.bytes_read += n_read as u64;
        Ok(chunk)
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_bounded_reads_until_empty() {
        let mut replay = FileReplay::from_reader(Cursor::new((0u8..10).collect::<Vec<_>>()));

        assert_eq!(replay.read_chunk(4).unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(replay.read_chunk(4).unwrap(), vec![4, 5, 6, 7]);
        assert_eq!(replay.read_chunk(4).unwrap(), vec![8, 9]);
        assert!(replay.read_chunk(4).unwrap().is_empty());
        assert_eq!(replay.bytes_read(), 10);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = FileReplay::open(Path::new("/nonexistent/ble-capture.bin"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("/nonexistent/ble-capture.bin"));
    }
}
