//! File persistence for the geomap index.
//!
//! Index files are written once, in full, to a temporary sibling and renamed
//! into place, so a reader never observes a partially written file.

pub mod format;
pub mod key_table;

pub use format::{DirectoryEntry, Header};
pub use key_table::{KeyTable, KeyTableBuilder};

use crate::error::{GeoMapError, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Hidden, uniquely named sibling of `path`.
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "geomap".to_string());
    path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
}

fn sync_parent_dir(path: &Path) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    File::open(parent)
        .and_then(|dir| dir.sync_all())
        .map_err(|e| GeoMapError::io("sync index directory", e))
}

/// Write a file through `fill` and atomically move it to `path`.
///
/// On any error the temporary file is removed and `path` is left untouched.
pub(crate) fn write_atomically<F>(path: &Path, fill: F) -> Result<u64>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let temp = temp_path(path);
    let result = write_and_rename(&temp, path, fill);
    if result.is_err() && temp.exists() {
        if let Err(e) = std::fs::remove_file(&temp) {
            log::warn!("Failed to remove temporary index file {}: {}", temp.display(), e);
        }
    }
    result
}

fn write_and_rename<F>(temp: &Path, path: &Path, fill: F) -> Result<u64>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(temp)
        .map_err(|e| GeoMapError::io("create index file", e))?;

    let mut writer = BufWriter::new(file);
    fill(&mut writer)?;
    writer
        .flush()
        .map_err(|e| GeoMapError::io("write index file", e))?;

    let file = writer
        .into_inner()
        .map_err(|e| GeoMapError::io("write index file", e.into_error()))?;
    file.sync_all()
        .map_err(|e| GeoMapError::io("sync index file", e))?;
    let written = file
        .metadata()
        .map_err(|e| GeoMapError::io("stat index file", e))?
        .len();
    drop(file);

    std::fs::rename(temp, path).map_err(|e| GeoMapError::io("rename index file", e))?;
    sync_parent_dir(path)?;

    Ok(written)
}

/// Read exactly `len` bytes at `offset`.
pub(crate) fn read_at(file: &mut File, offset: u64, len: u64) -> Result<Vec<u8>> {
    let len = usize::try_from(len)
        .map_err(|_| GeoMapError::corruption(format!("section of {} bytes too large", len)))?;
    let mut buf = vec![0u8; len];
    file.seek(SeekFrom::Start(offset))
        .and_then(|_| file.read_exact(&mut buf))
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                GeoMapError::corruption(format!("unexpected end of file reading {} bytes at {}", len, offset))
            } else {
                GeoMapError::io("read index file", e)
            }
        })?;
    Ok(buf)
}
