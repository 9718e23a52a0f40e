use crate::error::{SourceError, SourceResult};

/// Reference point for [`Backend::seek`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Whence {
    /// Relative to the start of the stream.
    Set,
    /// Relative to the current position.
    Cur,
    /// Relative to the end of the stream.
    End,
}

/// Per-variant primitives behind a [`DataSource`](crate::DataSource).
///
/// Primitives return the number of bytes actually transferred. A backend
/// that can only supply part of a request returns the partial count and
/// leaves it to the source to decide whether that is an error.
///
/// Every method has a default that fails with
/// [`SourceError::NotSupported`], so variants only implement what they
/// can actually do.
pub trait Backend: Send {
    /// Short name of the variant, used in error messages.
    fn kind(&self) -> &'static str;

    fn read(&mut self, _buf: &mut [u8]) -> SourceResult<usize> {
        Err(self.unsupported("read"))
    }

    fn read_at(&mut self, _buf: &mut [u8], _offset: u64) -> SourceResult<usize> {
        Err(self.unsupported("read_at"))
    }

    fn write(&mut self, _buf: &[u8]) -> SourceResult<usize> {
        Err(self.unsupported("write"))
    }

    fn write_at(&mut self, _buf: &[u8], _offset: u64) -> SourceResult<usize> {
        Err(self.unsupported("write_at"))
    }

    fn tell(&mut self) -> SourceResult<u64> {
        Err(self.unsupported("tell"))
    }

    fn seek(&mut self, _offset: i64, _whence: Whence) -> SourceResult<()> {
        Err(self.unsupported("seek"))
    }

    fn close(&mut self) -> SourceResult<()> {
        Ok(())
    }

    /// Contents of an in-memory backend.
    fn bytes(&self) -> Option<&[u8]> {
        None
    }

    /// Take ownership of the contents of an owning in-memory backend.
    fn into_bytes(self: Box<Self>) -> Option<Vec<u8>> {
        None
    }

    fn unsupported(&self, op: &'static str) -> SourceError {
        SourceError::NotSupported {
            op,
            kind: self.kind(),
        }
    }
}

/// Resolve a seek request against a current position and a stream size.
///
/// Returns `None` if the result would be negative.
pub(crate) fn resolve_seek(pos: u64, size: u64, offset: i64, whence: Whence) -> Option<u64> {
    let base = match whence {
        Whence::Set => 0i128,
        Whence::Cur => pos as i128,
        Whence::End => size as i128,
    };
    let target = base + offset as i128;
    if target < 0 || target > u64::MAX as i128 {
        None
    } else {
        Some(target as u64)
    }
}
