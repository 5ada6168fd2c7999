use std::fs;
use std::io::{self, Read, Seek, Write};
use std::path::Path;

use crate::{Result, UtilError};

/// A temporary file with RAII cleanup.
///
/// The temporary file is created in the same directory as the target path
/// so the final rename stays on one filesystem and is atomic. It is
/// deleted when dropped unless it has been persisted.
pub struct TempFile {
    inner: Option<::tempfile::NamedTempFile>,
}

impl TempFile {
    /// Create a new temporary file in the given directory with a unique name.
    pub fn new_in(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let named = ::tempfile::NamedTempFile::new_in(dir)?;
        Ok(Self { inner: Some(named) })
    }

    /// Create a new temporary file alongside the given target path.
    pub fn new_for(target: impl AsRef<Path>) -> Result<Self> {
        let target = target.as_ref();
        let dir = target.parent().unwrap_or(Path::new("."));
        Self::new_in(dir)
    }

    /// Path of the temporary file while it exists.
    pub fn path(&self) -> &Path {
        self.inner
            .as_ref()
            .map(|n| n.path())
            .unwrap_or(Path::new(""))
    }

    /// Mutable access to the underlying file handle.
    pub fn file_mut(&mut self) -> &mut fs::File {
        self.inner
            .as_mut()
            .expect("temp file already persisted")
            .as_file_mut()
    }

    /// Rename the temporary file onto the target path, consuming it.
    pub fn persist(mut self, target: impl AsRef<Path>) -> Result<()> {
        if let Some(named) = self.inner.take() {
            named.persist(target.as_ref()).map_err(|e| UtilError::Persist {
                path: target.as_ref().to_path_buf(),
                source: e.error,
            })?;
        }
        Ok(())
    }
}

impl Write for TempFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::other("temp file already persisted"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::other("temp file already persisted"))?
            .flush()
    }
}

impl Read for TempFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::other("temp file already persisted"))?
            .read(buf)
    }
}

impl Seek for TempFile {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::other("temp file already persisted"))?
            .seek(pos)
    }
}
