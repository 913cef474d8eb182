//! On-disk format for the flat vector store.
//!
//! ```text
//! offset  size  field
//! 0       4     magic "GMVX"
//! 4       2     format version (u16 LE)
//! 6       2     reserved, zero
//! 8       4     dimension (u32 LE)
//! 12      8     vector count (u64 LE)
//! 20      ...   count * dimension f32 LE, row-major
//! ```
//!
//! Row `i` is the vector with internal id `i`. Writes go to a sibling
//! `.tmp` file that is renamed over the target, so a crash mid-write leaves
//! the previous file intact.
//!
//! A sibling `.lock` file carries an exclusive advisory lock for as long as
//! one process has the index open.

use fs2::FileExt;
use ndarray::Array2;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{MentorError, Result};

const MAGIC: &[u8; 4] = b"GMVX";
const FORMAT_VERSION: u16 = 1;
const HEADER_SIZE: usize = 20;
const LOCK_POLL: Duration = Duration::from_millis(20);

/// Read the store at `path`.
///
/// `Ok(None)` when no file exists. Any header mismatch or short read is an
/// [`MentorError::IndexFile`]; callers decide whether to start empty.
pub fn load(path: &Path, dimension: usize) -> Result<Option<Array2<f32>>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let mut header = [0u8; HEADER_SIZE];
    reader
        .read_exact(&mut header)
        .map_err(|_| MentorError::IndexFile(format!("{}: truncated header", path.display())))?;

    if &header[0..4] != MAGIC {
        return Err(MentorError::IndexFile(format!("{}: bad magic", path.display())));
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != FORMAT_VERSION {
        return Err(MentorError::IndexFile(format!(
            "{}: unsupported format version {version}",
            path.display()
        )));
    }
    let stored_dim = u32::from_le_bytes([header[8], header[9], header[10], header[11]]) as usize;
    if stored_dim != dimension {
        return Err(MentorError::IndexFile(format!(
            "{}: dimension {stored_dim} does not match configured {dimension}",
            path.display()
        )));
    }
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&header[12..20]);
    let count = u64::from_le_bytes(count_bytes);

    let expected_len = (count as u128) * (dimension as u128) * 4 + HEADER_SIZE as u128;
    if expected_len != file_len as u128 {
        return Err(MentorError::IndexFile(format!(
            "{}: header says {count} vectors but file is {file_len} bytes",
            path.display()
        )));
    }

    let rows = count as usize;
    let mut data = Vec::with_capacity(rows * dimension);
    let mut buf = [0u8; 4];
    for _ in 0..rows * dimension {
        reader
            .read_exact(&mut buf)
            .map_err(|_| MentorError::IndexFile(format!("{}: truncated body", path.display())))?;
        data.push(f32::from_le_bytes(buf));
    }

    let vectors = Array2::from_shape_vec((rows, dimension), data)
        .map_err(|e| MentorError::IndexFile(format!("{}: {e}", path.display())))?;
    Ok(Some(vectors))
}

/// Temporary sibling used while writing `path`.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `vectors` to the temporary sibling of `path` and sync it.
/// Returns the temporary path; nothing at `path` changes yet.
pub fn write_temp(path: &Path, vectors: &Array2<f32>) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = temp_path(path);
    let file = File::create(&tmp)?;
    let mut writer = BufWriter::with_capacity(1 << 20, file);

    let dimension = u32::try_from(vectors.ncols())
        .map_err(|_| MentorError::IndexFile(format!("dimension {} too large", vectors.ncols())))?;

    writer.write_all(MAGIC)?;
    writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
    writer.write_all(&0u16.to_le_bytes())?;
    writer.write_all(&dimension.to_le_bytes())?;
    writer.write_all(&(vectors.nrows() as u64).to_le_bytes())?;
    for value in vectors.iter() {
        writer.write_all(&value.to_le_bytes())?;
    }

    let file = writer
        .into_inner()
        .map_err(|e| MentorError::Io(e.into_error()))?;
    file.sync_all()?;
    Ok(tmp)
}

/// Move a finished temporary file into place.
pub fn commit_temp(tmp: &Path, path: &Path) -> Result<()> {
    fs::rename(tmp, path)?;
    Ok(())
}

/// Lock file guarding the index at `path`.
pub fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

/// Take the exclusive lock for the index at `path`, polling until `wait`
/// runs out. The lock is released when the returned file is dropped.
pub fn acquire_lock(path: &Path, wait: Duration) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let lock_path = lock_path(path);
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)?;

    let deadline = Instant::now() + wait;
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(file),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                if Instant::now() >= deadline {
                    return Err(MentorError::IndexLocked(lock_path));
                }
                std::thread::sleep(LOCK_POLL);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Write and commit in one step.
pub fn save(path: &Path, vectors: &Array2<f32>) -> Result<()> {
    let tmp = write_temp(path, vectors)?;
    commit_temp(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn second_lock_times_out_until_first_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("index.bin");

        let held = acquire_lock(&path, Duration::ZERO).unwrap();
        assert!(lock_path(&path).exists());

        let err = acquire_lock(&path, Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, MentorError::IndexLocked(_)));
        assert_eq!(err.kind(), crate::error::ErrorKind::StoreUnavailable);

        drop(held);
        acquire_lock(&path, Duration::ZERO).unwrap();
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("absent.bin"), 3).unwrap().is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("index.bin");
        let vectors = array![[1.0f32, 2.0, 3.0], [-0.5, 0.0, 7.25]];

        save(&path, &vectors).unwrap();
        assert!(!temp_path(&path).exists());

        let loaded = load(&path, 3).unwrap().unwrap();
        assert_eq!(loaded, vectors);
    }

    #[test]
    fn empty_store_has_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");
        save(&path, &Array2::<f32>::zeros((0, 4))).unwrap();

        assert_eq!(fs::metadata(&path).unwrap().len(), HEADER_SIZE as u64);
        assert_eq!(load(&path, 4).unwrap().unwrap().nrows(), 0);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");
        save(&path, &array![[1.0f32, 2.0]]).unwrap();

        let err = load(&path, 3).unwrap_err();
        assert!(matches!(err, MentorError::IndexFile(_)));
    }

    #[test]
    fn truncated_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");
        save(&path, &array![[1.0f32, 2.0], [3.0, 4.0]]).unwrap();

        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
        assert!(load(&path, 2).is_err());

        fs::write(&path, &bytes[..10]).unwrap();
        assert!(load(&path, 2).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");
        fs::write(&path, b"definitely not a vector index file").unwrap();
        assert!(load(&path, 2).is_err());
    }

    #[test]
    fn uncommitted_temp_leaves_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");
        save(&path, &array![[1.0f32]]).unwrap();

        let tmp = write_temp(&path, &array![[1.0f32], [2.0]]).unwrap();
        assert!(tmp.exists());
        assert_eq!(load(&path, 1).unwrap().unwrap().nrows(), 1);

        commit_temp(&tmp, &path).unwrap();
        assert_eq!(load(&path, 1).unwrap().unwrap().nrows(), 2);
    }
}
