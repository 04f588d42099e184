//! Writes the stream to disk, split into chunks of bounded size.

use std::ffi::OsString;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use super::OutputPlugin;
use crate::error::PluginError;

/// File sink with size-based rollover.
///
/// The first chunk is `<base>`, later ones `<base>.0001`, `<base>.0002`, ...
/// A chunk is closed once it holds `max_chunk_size` bytes; the next one is
/// only created when there is more data. A maximum of 0 never rolls over.
pub struct FileWriter {
    name: String,
    base: PathBuf,
    max_chunk_size: u64,
    file: Option<File>,
    chunk_index: u32,
    chunk_written: u64,
    total_written: u64,
    buffer: Vec<u8>,
}

impl FileWriter {
    /// Create `<base>` right away so a bad path fails the recording early.
    pub fn create(base: impl AsRef<Path>, max_chunk_size: u64) -> Result<Self, PluginError> {
        let base = base.as_ref().to_path_buf();
        let name = format!("filewriter:{}", base.display());
        let file = File::create(&base).map_err(|e| PluginError::io(name.clone(), e))?;
        info!("[FileWriter] Recording to {:?}", base);
        Ok(Self {
            name,
            base,
            max_chunk_size,
            file: Some(file),
            chunk_index: 0,
            chunk_written: 0,
            total_written: 0,
            buffer: Vec::new(),
        })
    }

    /// Path of chunk `index`; chunk 0 is the base path itself.
    pub fn chunk_path(&self, index: u32) -> PathBuf {
        if index == 0 {
            return self.base.clone();
        }
        let mut name = OsString::from(self.base.as_os_str());
        name.push(format!(".{:04}", index));
        PathBuf::from(name)
    }

    /// Bytes written to disk so far, over all chunks.
    pub fn bytes_written(&self) -> u64 {
        self.total_written
    }

    /// Number of chunks created so far.
    pub fn chunk_count(&self) -> u32 {
        if self.file.is_some() {
            self.chunk_index + 1
        } else {
            self.chunk_index
        }
    }

    fn write_buffered(&mut self) -> Result<(), PluginError> {
        let data = std::mem::take(&mut self.buffer);
        let mut pos = 0;

        while pos < data.len() {
            let mut file = match self.file.take() {
                Some(file) => file,
                None => {
                    let path = self.chunk_path(self.chunk_index);
                    debug!("[FileWriter] Opening chunk {:?}", path);
                    match File::create(&path) {
                        Ok(file) => file,
                        Err(e) => {
                            // Keep the unwritten bytes for the next attempt.
                            self.buffer = data[pos..].to_vec();
                            return Err(PluginError::io(self.name.clone(), e));
                        }
                    }
                }
            };

            let remaining = (data.len() - pos) as u64;
            let len = if self.max_chunk_size > 0 {
                remaining.min(self.max_chunk_size - self.chunk_written)
            } else {
                remaining
            } as usize;

            if let Err(e) = file.write_all(&data[pos..pos + len]) {
                self.file = Some(file);
                self.buffer = data[pos..].to_vec();
                return Err(PluginError::io(self.name.clone(), e));
            }
            pos += len;
            self.chunk_written += len as u64;
            self.total_written += len as u64;

            if self.max_chunk_size > 0 && self.chunk_written >= self.max_chunk_size {
                debug!(
                    "[FileWriter] Chunk {} full ({} bytes)",
                    self.chunk_index, self.chunk_written
                );
                self.chunk_index += 1;
                self.chunk_written = 0;
            } else {
                self.file = Some(file);
            }
        }
        Ok(())
    }
}

impl OutputPlugin for FileWriter {
    fn name(&self) -> &str {
        &self.name
    }

    fn add_data(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    fn process_data(&mut self) -> Result<(), PluginError> {
        self.write_buffered()
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        if let Err(e) = self.write_buffered() {
            warn!("[FileWriter] {}", e);
        }
        info!(
            "[FileWriter] Closed {:?}: {} bytes in {} chunk(s)",
            self.base,
            self.total_written,
            self.chunk_count()
        );
    }
}
