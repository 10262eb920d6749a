//! Byte sources a decode reads from.

use std::fs::{self, File};
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Result, io_error};

/// Seekable byte stream opened from an [`ImageSource`].
pub trait SourceStream: Read + Seek + Send {}

impl<T: Read + Seek + Send> SourceStream for T {}

/// Something that can be opened for reading, any number of times.
///
/// Sources are shared with worker threads for the duration of a decode, so
/// `open` must be callable from any thread.
pub trait ImageSource: Send + Sync {
    /// Open a fresh stream positioned at byte 0.
    fn open(&self) -> Result<Box<dyn SourceStream>>;

    /// Total bytes available.
    fn len(&self) -> Result<u64>;

    /// Whether the source holds no bytes.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// In-memory bytes.
#[derive(Clone, Debug)]
pub struct MemorySource {
    data: Arc<[u8]>,
}

impl MemorySource {
    /// Wrap `data`.
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into() }
    }

    /// The wrapped bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

impl From<Vec<u8>> for MemorySource {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl ImageSource for MemorySource {
    fn open(&self) -> Result<Box<dyn SourceStream>> {
        Ok(Box::new(Cursor::new(Arc::clone(&self.data))))
    }

    fn len(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }
}

/// A file on disk, reopened for every decode.
#[derive(Clone, Debug)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Source for `path`. The file is not touched until opened.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path this source reads.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ImageSource for FileSource {
    fn open(&self) -> Result<Box<dyn SourceStream>> {
        let file = File::open(&self.path).map_err(io_error)?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn len(&self) -> Result<u64> {
        Ok(fs::metadata(&self.path).map_err(io_error)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{SeekFrom, Write};

    #[test]
    fn memory_source_reopens_at_start() {
        let src = MemorySource::from(vec![1, 2, 3, 4]);
        assert_eq!(src.len().unwrap(), 4);
        assert!(!src.is_empty().unwrap());
        let mut s = src.open().unwrap();
        s.seek(SeekFrom::Start(2)).unwrap();
        let mut b = [0u8; 2];
        s.read_exact(&mut b).unwrap();
        assert_eq!(b, [3, 4]);

        let mut again = src.open().unwrap();
        again.read_exact(&mut b).unwrap();
        assert_eq!(b, [1, 2]);
    }

    #[test]
    fn file_source_reads_file() {
        let path = std::env::temp_dir().join(format!("rawview-source-{}.bin", std::process::id()));
        {
            let mut f = File::create(&path).unwrap();
            f.write_all(&[9, 8, 7]).unwrap();
        }
        let src = FileSource::new(&path);
        assert_eq!(src.len().unwrap(), 3);
        let mut out = Vec::new();
        src.open().unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, [9, 8, 7]);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_is_io_error() {
        let src = FileSource::new("/nonexistent/rawview/missing.raw");
        let err = src.len().unwrap_err();
        assert!(matches!(err.error(), crate::RenderError::Io(_)));
        assert!(src.open().is_err());
    }
}
