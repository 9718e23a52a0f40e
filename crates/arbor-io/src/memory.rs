use crate::backend::{resolve_seek, Backend, Whence};
use crate::error::{SourceError, SourceResult};

fn out_of_bounds(offset: u64, len: usize, size: usize) -> SourceError {
    SourceError::OutOfBounds {
        offset: offset as i64,
        len,
        size: size as u64,
    }
}

/// Copy as much of `src[offset..]` into `dst` as fits.
fn copy_out(src: &[u8], offset: u64, dst: &mut [u8]) -> SourceResult<usize> {
    if offset > src.len() as u64 {
        return Err(out_of_bounds(offset, dst.len(), src.len()));
    }
    let start = offset as usize;
    let n = dst.len().min(src.len() - start);
    dst[..n].copy_from_slice(&src[start..start + n]);
    Ok(n)
}

/// Fixed-size read/write buffer owned by the caller.
///
/// Transfers never extend past the end of the buffer; a request that does
/// not fit is truncated and the partial count is returned.
pub struct MemSource<'a> {
    buf: &'a mut [u8],
    pos: u64,
}

impl<'a> MemSource<'a> {
    /// Fixed-size read/write view of `buf`, positioned at its start.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }
}

impl Backend for MemSource<'_> {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn read(&mut self, buf: &mut [u8]) -> SourceResult<usize> {
        let n = copy_out(&*self.buf, self.pos, buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> SourceResult<usize> {
        copy_out(&*self.buf, offset, buf)
    }

    fn write(&mut self, buf: &[u8]) -> SourceResult<usize> {
        let n = self.write_at(buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> SourceResult<usize> {
        if offset > self.buf.len() as u64 {
            return Err(out_of_bounds(offset, buf.len(), self.buf.len()));
        }
        let start = offset as usize;
        let n = buf.len().min(self.buf.len() - start);
        self.buf[start..start + n].copy_from_slice(&buf[..n]);
        Ok(n)
    }

    fn tell(&mut self) -> SourceResult<u64> {
        Ok(self.pos)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> SourceResult<()> {
        let size = self.buf.len() as u64;
        match resolve_seek(self.pos, size, offset, whence) {
            Some(target) if target <= size => {
                self.pos = target;
                Ok(())
            }
            _ => Err(SourceError::OutOfBounds {
                offset,
                len: 0,
                size,
            }),
        }
    }

    fn bytes(&self) -> Option<&[u8]> {
        Some(&*self.buf)
    }
}

/// Read-only buffer owned by the caller.
pub struct ConstSource<'a> {
    buf: &'a [u8],
    pos: u64,
}

impl<'a> ConstSource<'a> {
    /// Read-only view of `buf`, positioned at its start.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }
}

impl Backend for ConstSource<'_> {
    fn kind(&self) -> &'static str {
        "const memory"
    }

    fn read(&mut self, buf: &mut [u8]) -> SourceResult<usize> {
        let n = copy_out(self.buf, self.pos, buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> SourceResult<usize> {
        copy_out(self.buf, offset, buf)
    }

    fn tell(&mut self) -> SourceResult<u64> {
        Ok(self.pos)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> SourceResult<()> {
        let size = self.buf.len() as u64;
        match resolve_seek(self.pos, size, offset, whence) {
            Some(target) if target <= size => {
                self.pos = target;
                Ok(())
            }
            _ => Err(SourceError::OutOfBounds {
                offset,
                len: 0,
                size,
            }),
        }
    }

    fn bytes(&self) -> Option<&[u8]> {
        Some(self.buf)
    }
}

/// Growable buffer that owns its storage.
///
/// Writes past the current size extend the buffer (zero-filling any gap
/// left by a seek past the end). Reads never grow it: reading past the
/// end is an out-of-bounds error.
#[derive(Default)]
pub struct AutoSource {
    buf: Vec<u8>,
    pos: u64,
}

impl AutoSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing contents, positioned at offset 0.
    pub fn with_bytes(buf: Vec<u8>) -> Self {
        Self { buf, pos: 0 }
    }

    fn check_read(&self, offset: u64, len: usize) -> SourceResult<usize> {
        let end = offset.checked_add(len as u64);
        match end {
            Some(end) if end <= self.buf.len() as u64 => Ok(offset as usize),
            _ => Err(out_of_bounds(offset, len, self.buf.len())),
        }
    }
}

impl Backend for AutoSource {
    fn kind(&self) -> &'static str {
        "growable memory"
    }

    fn read(&mut self, buf: &mut [u8]) -> SourceResult<usize> {
        let start = self.check_read(self.pos, buf.len())?;
        buf.copy_from_slice(&self.buf[start..start + buf.len()]);
        self.pos += buf.len() as u64;
        Ok(buf.len())
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> SourceResult<usize> {
        let start = self.check_read(offset, buf.len())?;
        buf.copy_from_slice(&self.buf[start..start + buf.len()]);
        Ok(buf.len())
    }

    fn write(&mut self, buf: &[u8]) -> SourceResult<usize> {
        let n = self.write_at(buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> SourceResult<usize> {
        let start = usize::try_from(offset).map_err(|_| out_of_bounds(offset, buf.len(), self.buf.len()))?;
        let end = start + buf.len();
        if end > self.buf.len() {
            self.buf.resize(end, 0);
        }
        self.buf[start..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn tell(&mut self) -> SourceResult<u64> {
        Ok(self.pos)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> SourceResult<()> {
        let size = self.buf.len() as u64;
        let target = resolve_seek(self.pos, size, offset, whence).ok_or(SourceError::OutOfBounds {
            offset,
            len: 0,
            size,
        })?;
        self.pos = target;
        Ok(())
    }

    fn close(&mut self) -> SourceResult<()> {
        self.buf = Vec::new();
        self.pos = 0;
        Ok(())
    }

    fn bytes(&self) -> Option<&[u8]> {
        Some(&self.buf)
    }

    fn into_bytes(self: Box<Self>) -> Option<Vec<u8>> {
        Some(self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Fixed buffer
    // -----------------------------------------------------------------------

    #[test]
    fn fixed_read_truncates_at_end() {
        let mut storage = *b"abcdef";
        let mut src = MemSource::new(&mut storage);
        src.seek(4, Whence::Set).unwrap();
        let mut out = [0u8; 4];
        assert_eq!(src.read(&mut out).unwrap(), 2);
        assert_eq!(&out[..2], b"ef");
        assert_eq!(src.tell().unwrap(), 6);
    }

    #[test]
    fn fixed_write_truncates_at_end() {
        let mut storage = [0u8; 4];
        {
            let mut src = MemSource::new(&mut storage);
            src.seek(2, Whence::Set).unwrap();
            assert_eq!(src.write(b"xyz").unwrap(), 2);
        }
        assert_eq!(storage, [0, 0, b'x', b'y']);
    }

    #[test]
    fn fixed_seek_out_of_bounds() {
        let mut storage = [0u8; 4];
        let mut src = MemSource::new(&mut storage);
        assert!(matches!(
            src.seek(5, Whence::Set).unwrap_err(),
            SourceError::OutOfBounds { .. }
        ));
        assert!(src.seek(-1, Whence::Set).is_err());
        assert!(src.seek(0, Whence::End).is_ok());
    }

    #[test]
    fn const_rejects_writes() {
        let src_bytes = [1u8, 2, 3];
        let mut src = ConstSource::new(&src_bytes);
        assert!(matches!(
            src.write(b"x").unwrap_err(),
            SourceError::NotSupported { op: "write", .. }
        ));
    }

    // -----------------------------------------------------------------------
    // Growable buffer
    // -----------------------------------------------------------------------

    #[test]
    fn auto_write_grows() {
        let mut src = AutoSource::new();
        src.write(b"hello").unwrap();
        src.write(b" world").unwrap();
        assert_eq!(src.bytes().unwrap(), b"hello world");
    }

    #[test]
    fn auto_seek_past_end_then_write_zero_fills() {
        let mut src = AutoSource::new();
        src.seek(3, Whence::Set).unwrap();
        src.write(b"x").unwrap();
        assert_eq!(src.bytes().unwrap(), &[0, 0, 0, b'x']);
    }

    #[test]
    fn auto_read_past_end_is_error() {
        let mut src = AutoSource::with_bytes(vec![1, 2]);
        let mut out = [0u8; 3];
        assert!(matches!(
            src.read(&mut out).unwrap_err(),
            SourceError::OutOfBounds { .. }
        ));
        // The failed read must not grow the buffer.
        assert_eq!(src.bytes().unwrap().len(), 2);
    }

    #[test]
    fn auto_write_at_keeps_position() {
        let mut src = AutoSource::new();
        src.write(b"abcd").unwrap();
        src.write_at(b"ZZ", 1).unwrap();
        assert_eq!(src.tell().unwrap(), 4);
        assert_eq!(src.bytes().unwrap(), b"aZZd");
    }

    #[test]
    fn auto_close_frees() {
        let mut src = AutoSource::with_bytes(vec![1, 2, 3]);
        src.close().unwrap();
        assert!(src.bytes().unwrap().is_empty());
    }
}
