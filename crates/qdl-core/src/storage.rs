//! Disk I/O and partial-file lifecycle.
//!
//! Tasks write into a `.part` file next to the final destination:
//! preallocated up front (fallocate on Linux when available, else
//! set_len), written concurrently at segment offsets (pwrite), synced,
//! and atomically renamed at finishing time. An existing destination is
//! replaced only by that final rename, never earlier.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
#[cfg(unix)]
use std::os::unix::fs::FileExt;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Partial-file suffix used before atomic rename.
pub const PART_SUFFIX: &str = ".part";

/// Builder for a new partial file. Call `preallocate` then `build` to
/// get a `PartFile` supporting concurrent `write_at` from workers.
pub struct PartFileBuilder {
    file: File,
    part_path: std::path::PathBuf,
}

impl PartFileBuilder {
    /// Create a new partial file at `part_path`. Overwrites an existing
    /// partial file at that path.
    pub fn create(part_path: &Path) -> Result<Self> {
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(part_path)
            .with_context(|| format!("failed to create partial file: {}", part_path.display()))?;
        Ok(PartFileBuilder {
            file,
            part_path: part_path.to_path_buf(),
        })
    }

    /// Preallocate `size` bytes. On Unix tries `posix_fallocate` for
    /// real block allocation; falls back to `set_len` on failure or
    /// non-Unix.
    pub fn preallocate(&mut self, size: u64) -> Result<()> {
        #[cfg(unix)]
        {
            let fd = self.file.as_raw_fd();
            let r = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
            if r == 0 {
                return Ok(());
            }
            tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
        }
        self.file
            .set_len(size)
            .context("failed to preallocate partial file")?;
        Ok(())
    }

    pub fn build(self) -> PartFile {
        PartFile {
            file: Arc::new(self.file),
            part_path: self.part_path,
        }
    }
}

/// Handle to a partial download file. Safe to clone across workers;
/// each `write_at` is independent (pwrite-style).
#[derive(Clone)]
pub struct PartFile {
    file: Arc<File>,
    part_path: std::path::PathBuf,
}

impl PartFile {
    /// Open an existing partial file for resume (read+write, no
    /// truncation). The file must have been preallocated already.
    pub fn open_existing(part_path: &Path) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .open(part_path)
            .with_context(|| {
                format!("failed to open existing partial file: {}", part_path.display())
            })?;
        Ok(PartFile {
            file: Arc::new(file),
            part_path: part_path.to_path_buf(),
        })
    }

    /// Write `data` at `offset` without moving a shared cursor; safe for
    /// concurrent use across segments (offsets are disjoint).
    #[cfg(unix)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> std::io::Result<()> {
        let n = self.file.write_at(data, offset)?;
        if n != data.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("short write: {} of {}", n, data.len()),
            ));
        }
        Ok(())
    }

    /// Non-Unix fallback: seek + write on a cloned descriptor. Not safe
    /// for concurrent use.
    #[cfg(not(unix))]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> std::io::Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        let mut f = (*self.file).try_clone()?;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(data)
    }

    /// Sync file data to disk. Call before `finalize` for durability.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all().context("partial file sync failed")?;
        Ok(())
    }

    pub fn part_path(&self) -> &Path {
        &self.part_path
    }

    /// Atomically rename the partial file to the final path, replacing
    /// any existing file there (the deferred Overwrite truncation).
    /// Consumes the handle; call `sync` first if you need durability.
    pub fn finalize(self, final_path: &Path) -> Result<()> {
        let part_path = self.part_path.clone();
        drop(self.file);

        std::fs::rename(&part_path, final_path).with_context(|| {
            format!(
                "failed to rename {} to {}",
                part_path.display(),
                final_path.display()
            )
        })?;
        Ok(())
    }
}

/// Path for the partial file: appends `.part` to the final path.
pub fn part_path(final_path: &Path) -> std::path::PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(PART_SUFFIX);
    std::path::PathBuf::from(o)
}
