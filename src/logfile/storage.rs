//! Trait abstraction for log storage operations to enable testing

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

/// A file found in a storage directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// File name without the directory
    pub name: String,
    /// Size in bytes, including any buffered but unflushed writes
    pub size: u64,
}

/// Trait for non-volatile file storage
pub trait Storage: Send {
    /// Create an empty file for appending, truncating any previous content
    fn create(&mut self, path: &Path) -> io::Result<()>;

    /// Append bytes to the end of a file
    fn append(&mut self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Force buffered writes of a file to durable storage
    fn flush(&mut self, path: &Path) -> io::Result<()>;

    /// Read the whole content of a file
    fn read(&mut self, path: &Path) -> io::Result<Vec<u8>>;

    /// Remove a file, returning whether it existed
    fn delete(&mut self, path: &Path) -> io::Result<bool>;

    /// List the regular files of a directory, creating it if missing
    fn list(&mut self, dir: &Path) -> io::Result<Vec<StoredFile>>;
}

/// Filesystem storage keeping one buffered writer open for the active file
#[derive(Debug, Default)]
pub struct FsStorage {
    open: Option<OpenFile>,
}

#[derive(Debug)]
struct OpenFile {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FsStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn writer_for(&mut self, path: &Path) -> io::Result<&mut BufWriter<File>> {
        let reuse = matches!(&self.open, Some(open) if open.path.as_path() == path);
        if !reuse {
            self.close()?;
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            debug!("Opened {} for append", path.display());
            self.open = Some(OpenFile {
                path: path.to_path_buf(),
                writer: BufWriter::new(file),
            });
        }

        match self.open.as_mut() {
            Some(open) => Ok(&mut open.writer),
            None => Err(io::Error::new(io::ErrorKind::Other, "no open file")),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(mut open) = self.open.take() {
            open.writer.flush()?;
        }
        Ok(())
    }

    fn flush_if_open(&mut self, path: &Path) -> io::Result<()> {
        if let Some(open) = self.open.as_mut() {
            if open.path.as_path() == path {
                open.writer.flush()?;
            }
        }
        Ok(())
    }
}

impl Storage for FsStorage {
    fn create(&mut self, path: &Path) -> io::Result<()> {
        if matches!(&self.open, Some(open) if open.path.as_path() == path) {
            self.open = None;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        File::create(path)?;
        Ok(())
    }

    fn append(&mut self, path: &Path, data: &[u8]) -> io::Result<()> {
        self.writer_for(path)?.write_all(data)
    }

    fn flush(&mut self, path: &Path) -> io::Result<()> {
        if let Some(open) = self.open.as_mut() {
            if open.path.as_path() == path {
                open.writer.flush()?;
                open.writer.get_ref().sync_data()?;
            }
        }
        Ok(())
    }

    fn read(&mut self, path: &Path) -> io::Result<Vec<u8>> {
        self.flush_if_open(path)?;
        fs::read(path)
    }

    fn delete(&mut self, path: &Path) -> io::Result<bool> {
        if matches!(&self.open, Some(open) if open.path.as_path() == path) {
            self.close()?;
        }

        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn list(&mut self, dir: &Path) -> io::Result<Vec<StoredFile>> {
        fs::create_dir_all(dir)?;

        let open_path = self.open.as_ref().map(|open| open.path.clone());
        if let Some(path) = open_path {
            self.flush_if_open(&path)?;
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            files.push(StoredFile {
                name: entry.file_name().to_string_lossy().to_string(),
                size: metadata.len(),
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    /// In-memory storage for testing
    #[derive(Clone, Default)]
    pub struct MockStorage {
        pub files: Arc<Mutex<BTreeMap<PathBuf, Vec<u8>>>>,
        pub flushes: Arc<Mutex<Vec<PathBuf>>>,
        pub append_error: Arc<Mutex<Option<io::ErrorKind>>>,
        pub flush_error: Arc<Mutex<Option<io::ErrorKind>>>,
    }

    impl MockStorage {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn file(&self, path: &Path) -> Option<Vec<u8>> {
            self.files.lock().unwrap().get(path).cloned()
        }

        pub fn insert(&self, path: &Path, data: &[u8]) {
            self.files
                .lock()
                .unwrap()
                .insert(path.to_path_buf(), data.to_vec());
        }

        pub fn flush_count(&self) -> usize {
            self.flushes.lock().unwrap().len()
        }

        pub fn set_append_error(&self, error: Option<io::ErrorKind>) {
            *self.append_error.lock().unwrap() = error;
        }

        pub fn set_flush_error(&self, error: Option<io::ErrorKind>) {
            *self.flush_error.lock().unwrap() = error;
        }
    }

    impl Storage for MockStorage {
        fn create(&mut self, path: &Path) -> io::Result<()> {
            self.insert(path, &[]);
            Ok(())
        }

        fn append(&mut self, path: &Path, data: &[u8]) -> io::Result<()> {
            if let Some(error) = *self.append_error.lock().unwrap() {
                return Err(io::Error::new(error, "Mock append error"));
            }
            self.files
                .lock()
                .unwrap()
                .entry(path.to_path_buf())
                .or_default()
                .extend_from_slice(data);
            Ok(())
        }

        fn flush(&mut self, path: &Path) -> io::Result<()> {
            if let Some(error) = *self.flush_error.lock().unwrap() {
                return Err(io::Error::new(error, "Mock flush error"));
            }
            self.flushes.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }

        fn read(&mut self, path: &Path) -> io::Result<Vec<u8>> {
            self.file(path)
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Mock file not found"))
        }

        fn delete(&mut self, path: &Path) -> io::Result<bool> {
            Ok(self.files.lock().unwrap().remove(path).is_some())
        }

        fn list(&mut self, dir: &Path) -> io::Result<Vec<StoredFile>> {
            Ok(self
                .files
                .lock()
                .unwrap()
                .iter()
                .filter(|(path, _)| path.parent() == Some(dir))
                .filter_map(|(path, data)| {
                    path.file_name().map(|name| StoredFile {
                        name: name.to_string_lossy().to_string(),
                        size: data.len() as u64,
                    })
                })
                .collect())
        }
    }
}
