//! All-or-nothing replacement of a file.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// A temporary file that will either replace `target` or vanish.
///
/// The file is created next to `target` so the final rename stays on one
/// filesystem. Dropping it without calling either terminal method removes it
/// and leaves `target` untouched.
#[derive(Debug)]
pub struct ReplacementFile {
    file: NamedTempFile,
    target: PathBuf,
}

impl ReplacementFile {
    pub fn new(target: impl Into<PathBuf>) -> io::Result<Self> {
        let target = target.into();
        let dir = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let prefix = target
            .file_name()
            .map(|n| format!(".{}.", n.to_string_lossy()))
            .unwrap_or_else(|| ".cmdtest.".to_string());
        let file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".tmp")
            .tempfile_in(dir)?;
        Ok(Self { file, target })
    }

    /// Path of the temporary file.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Close and remove the temporary file.
    pub fn cleanup(self) -> io::Result<()> {
        self.file.close()
    }

    /// Flush the temporary file to disk and rename it over the target.
    ///
    /// On failure the temporary file is removed and the target is unchanged.
    pub fn close_atomically_replace(mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.as_file().sync_all()?;
        self.file
            .persist(&self.target)
            .map(drop)
            .map_err(|e| e.error)
    }
}

impl Write for ReplacementFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
