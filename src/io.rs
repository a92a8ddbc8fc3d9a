//! Loading and saving buffers.
//!
//! Loaded buffers are read-only. With the `mmap` feature, [`load`] maps the
//! file instead of reading it, so only the pages actually touched are
//! brought into memory.

use std::io::{Read, Write};
use std::path::Path;

use log::debug;

use crate::buffer::Buffer;
use crate::error::Result;

/// Loads the file at `path` as a read-only buffer.
pub fn load(path: impl AsRef<Path>) -> Result<Buffer> {
    let path = path.as_ref();
    #[cfg(feature = "mmap")]
    {
        let file = std::fs::File::open(path)?;
        // Safety: the mapping is read-only; the file must not be truncated
        // while the buffer is alive.
        let map = unsafe { memmap2::Mmap::map(&file) }?;
        debug!("mapped {} ({} bytes)", path.display(), map.len());
        Ok(Buffer::from_mmap(map))
    }
    #[cfg(not(feature = "mmap"))]
    {
        let bytes = std::fs::read(path)?;
        debug!("read {} ({} bytes)", path.display(), bytes.len());
        Ok(Buffer::from_bytes(bytes))
    }
}

/// Reads everything from `r` into a read-only buffer.
pub fn load_reader<R: Read + ?Sized>(r: &mut R) -> Result<Buffer> {
    let mut bytes = Vec::new();
    r.read_to_end(&mut bytes)?;
    Ok(Buffer::from_bytes(bytes))
}

/// Writes the used bytes of `buf` to the file at `path`.
pub fn save(buf: &Buffer, path: impl AsRef<Path>) -> Result<()> {
    std::fs::write(path.as_ref(), buf.as_bytes())?;
    Ok(())
}

/// Writes the used bytes of `buf` to `w`.
pub fn save_writer<W: Write + ?Sized>(buf: &Buffer, w: &mut W) -> Result<()> {
    w.write_all(buf.as_bytes())?;
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn temp_path() -> std::path::PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("packbuf_io_{}_{n}.nb", std::process::id()))
    }

    #[test]
    fn save_then_load_is_read_only_copy() {
        let mut buf = Buffer::new();
        let o = buf.alloc_obj(4, 0).unwrap();
        buf.set_u32(o, 0, 0xdead_beef).unwrap();
        let path = temp_path();
        save(&buf, &path).unwrap();
        let mut loaded = load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded.as_bytes(), buf.as_bytes());
        assert!(!loaded.is_writable());
        assert_eq!(loaded.alloc(4).unwrap_err(), crate::Error::ReadOnlyBuffer);
    }

    #[test]
    fn reader_and_writer() {
        let mut buf = Buffer::new();
        buf.extend_from_slice(b"abcd").unwrap();
        let mut out = Vec::new();
        save_writer(&buf, &mut out).unwrap();
        let loaded = load_reader(&mut out.as_slice()).unwrap();
        assert_eq!(loaded.as_bytes(), b"abcd");
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            load("/packbuf/does/not/exist.nb"),
            Err(crate::Error::Io(_))
        ));
    }
}
