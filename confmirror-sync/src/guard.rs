//! The debounce/conflict guard: content-compared file writes.
//!
//! A reconcile that would rewrite identical bytes is skipped entirely, so
//! the filesystem watcher on the other side never fires and the two watch
//! directions cannot feed each other. Comparison is chunked rather than a
//! whole-file read, since secrets and configmaps can carry sizable blobs.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use crate::error::{io_err, SyncError};

const COMPARE_CHUNK: usize = 8 * 1024;

/// Mode for materialized files: owner-writable, world-readable.
#[cfg(unix)]
const FILE_MODE: u32 = 0o644;
/// Mode for created target directories.
#[cfg(unix)]
const DIR_MODE: u32 = 0o750;

/// Outcome of a guarded file write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// On-disk content already matches; zero bytes written.
    Unchanged,
}

/// Compare two readers chunk by chunk without loading either fully.
pub fn readers_equal<A: Read, B: Read>(mut a: A, mut b: B) -> std::io::Result<bool> {
    let mut buf_a = [0u8; COMPARE_CHUNK];
    let mut buf_b = [0u8; COMPARE_CHUNK];
    loop {
        let len_a = read_full(&mut a, &mut buf_a)?;
        let len_b = read_full(&mut b, &mut buf_b)?;
        if len_a != len_b || buf_a[..len_a] != buf_b[..len_b] {
            return Ok(false);
        }
        if len_a < COMPARE_CHUNK {
            return Ok(true);
        }
    }
}

/// Read until the buffer is full or the reader is exhausted.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Write `data` to `path` unless the current content is byte-identical.
pub fn write_if_changed(path: &Path, data: &[u8]) -> Result<WriteOutcome, SyncError> {
    match File::open(path) {
        Ok(current) => {
            if readers_equal(current, data).map_err(|e| io_err(path, e))? {
                tracing::debug!(path = %path.display(), "unchanged");
                return Ok(WriteOutcome::Unchanged);
            }
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(io_err(path, e)),
    }

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_MODE);
    }
    let mut file = options.open(path).map_err(|e| io_err(path, e))?;
    file.write_all(data).map_err(|e| io_err(path, e))?;

    tracing::info!(path = %path.display(), bytes = data.len(), "wrote file");
    Ok(WriteOutcome::Written)
}

/// Create the target directory (and parents) if absent.
pub fn ensure_dir(path: &Path) -> Result<(), SyncError> {
    if path.is_dir() {
        return Ok(());
    }
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder.create(path).map_err(|e| io_err(path, e))
}

/// Remove a materialized file; a file already gone is a no-op, which keeps
/// cleanup retries safe.
pub fn remove_if_present(path: &Path) -> Result<(), SyncError> {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::info!(path = %path.display(), "removed file");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(path, e)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn readers_equal_on_identical_content() {
        let a: &[u8] = b"same bytes";
        let b: &[u8] = b"same bytes";
        assert!(readers_equal(a, b).expect("compare"));
    }

    #[test]
    fn readers_differ_on_content_and_length() {
        assert!(!readers_equal(&b"abc"[..], &b"abd"[..]).expect("compare"));
        assert!(!readers_equal(&b"abc"[..], &b"abcd"[..]).expect("compare"));
        assert!(!readers_equal(&b""[..], &b"x"[..]).expect("compare"));
    }

    #[test]
    fn readers_equal_across_chunk_boundaries() {
        let big_a = vec![7u8; COMPARE_CHUNK * 3 + 17];
        let mut big_b = big_a.clone();
        assert!(readers_equal(&big_a[..], &big_b[..]).expect("compare"));

        // Flip one byte in the final partial chunk.
        let last = big_b.len() - 1;
        big_b[last] = 8;
        assert!(!readers_equal(&big_a[..], &big_b[..]).expect("compare"));
    }

    #[test]
    fn first_write_then_unchanged() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("app.conf");

        let first = write_if_changed(&path, b"listen 8080\n").expect("write");
        assert_eq!(first, WriteOutcome::Written);

        let second = write_if_changed(&path, b"listen 8080\n").expect("write");
        assert_eq!(second, WriteOutcome::Unchanged);

        let third = write_if_changed(&path, b"listen 9090\n").expect("write");
        assert_eq!(third, WriteOutcome::Written);
        assert_eq!(
            std::fs::read(&path).expect("read"),
            b"listen 9090\n".to_vec()
        );
    }

    #[test]
    fn unchanged_write_preserves_mtime() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("app.conf");
        write_if_changed(&path, b"content").expect("write");
        let mtime = std::fs::metadata(&path).expect("meta").modified().expect("mtime");

        std::thread::sleep(std::time::Duration::from_millis(50));
        write_if_changed(&path, b"content").expect("write");
        let after = std::fs::metadata(&path).expect("meta").modified().expect("mtime");
        assert_eq!(mtime, after, "no-op write must not touch the file");
    }

    #[test]
    #[cfg(unix)]
    fn written_files_carry_the_fixed_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("app.conf");
        write_if_changed(&path, b"content").expect("write");
        let mode = std::fs::metadata(&path).expect("meta").permissions().mode();
        assert_eq!(mode & 0o777, FILE_MODE);
    }

    #[test]
    fn remove_if_present_is_idempotent() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("gone.conf");
        std::fs::write(&path, "x").expect("seed");
        remove_if_present(&path).expect("first remove");
        remove_if_present(&path).expect("second remove is a no-op");
        assert!(!path.exists());
    }

    #[test]
    fn ensure_dir_creates_nested_dirs() {
        let dir = TempDir::new().expect("tempdir");
        let target = dir.path().join("a").join("b");
        ensure_dir(&target).expect("create");
        assert!(target.is_dir());
        ensure_dir(&target).expect("idempotent");
    }
}
