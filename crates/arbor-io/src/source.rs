use std::fmt;
use std::fs::File;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::backend::{Backend, Whence};
use crate::codec::{type_code, ByteOrder, Scalar};
use crate::error::{SourceError, SourceResult};
use crate::file::FileSource;
use crate::memory::{AutoSource, ConstSource, MemSource};
use crate::socket::SocketSource;

/// Longest string accepted by [`DataSource::read_string`].
pub const MAX_STRING_LEN: usize = 0xf_ffff;

/// Callback invoked whenever a complete entry point fails.
pub type ErrorHook = Box<dyn Fn(&SourceError) + Send>;

/// A data source shared between threads.
pub type SharedSource = Arc<Mutex<DataSource<'static>>>;

/// Transfer counters, kept for diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    /// Bytes moved by the most recent read.
    pub rd_last: usize,
    /// Bytes read since the source was opened.
    pub rd_total: u64,
    /// Bytes moved by the most recent write.
    pub wr_last: usize,
    /// Bytes written since the source was opened.
    pub wr_total: u64,
}

/// Seekable byte stream over a pluggable [`Backend`].
///
/// Complete transfers ([`read`](Self::read), [`write`](Self::write) and
/// their `_at` forms) move exactly the requested number of bytes or fail
/// with a short-transfer error. Partial transfers
/// ([`read_partial`](Self::read_partial), [`write_partial`](Self::write_partial))
/// report whatever the backend managed.
///
/// Multi-byte scalars are encoded in the current [`ByteOrder`], which
/// defaults to big-endian. In debug mode every scalar and string is
/// preceded by a 4-byte type tag that is verified on read.
///
/// Methods take `&mut self`, so a source is used by one caller at a time;
/// wrap it with [`into_shared`](Self::into_shared) to hand it between
/// threads.
pub struct DataSource<'a> {
    backend: Box<dyn Backend + 'a>,
    byte_order: ByteOrder,
    debug: bool,
    counters: Counters,
    error_hook: Option<ErrorHook>,
}

impl<'a> DataSource<'a> {
    /// Wrap an arbitrary backend.
    pub fn new(backend: impl Backend + 'a) -> Self {
        Self {
            backend: Box::new(backend),
            byte_order: ByteOrder::default(),
            debug: false,
            counters: Counters::default(),
            error_hook: None,
        }
    }

    /// Fixed read/write buffer owned by the caller.
    pub fn open_mem(buf: &'a mut [u8]) -> Self {
        Self::new(MemSource::new(buf))
    }

    /// Read-only buffer owned by the caller.
    pub fn open_const(buf: &'a [u8]) -> Self {
        Self::new(ConstSource::new(buf))
    }
}

impl DataSource<'static> {
    /// Open a file with a C-style mode string (`"rb"`, `"wb"`, ...).
    pub fn open_file(path: impl AsRef<Path>, mode: &str) -> SourceResult<Self> {
        Ok(Self::new(FileSource::open(path.as_ref(), mode)?))
    }

    /// Wrap an already open file handle.
    pub fn from_file(file: File) -> Self {
        Self::new(FileSource::from_file(file))
    }

    /// Growable buffer owning its storage.
    pub fn open_auto() -> Self {
        Self::new(AutoSource::new())
    }

    /// Growable buffer starting from existing contents.
    pub fn open_auto_with(bytes: Vec<u8>) -> Self {
        Self::new(AutoSource::with_bytes(bytes))
    }

    /// Connect to a TCP endpoint.
    pub fn open_socket(addr: impl ToSocketAddrs) -> SourceResult<Self> {
        Ok(Self::new(SocketSource::connect(addr)?))
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: TcpStream) -> Self {
        Self::new(SocketSource::from_stream(stream))
    }

    pub fn into_shared(self) -> SharedSource {
        Arc::new(Mutex::new(self))
    }
}

impl<'a> DataSource<'a> {
    // ---- Configuration ----

    /// Backend name, such as `"file"` or `"socket"`.
    pub fn kind(&self) -> &'static str {
        self.backend.kind()
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Select the byte order for subsequent scalars, returning the previous one.
    pub fn set_byte_order(&mut self, order: ByteOrder) -> ByteOrder {
        std::mem::replace(&mut self.byte_order, order)
    }

    /// Run `f` with `order` selected, restoring the previous order afterwards.
    pub fn with_byte_order<T>(
        &mut self,
        order: ByteOrder,
        f: impl FnOnce(&mut Self) -> SourceResult<T>,
    ) -> SourceResult<T> {
        let saved = self.set_byte_order(order);
        let result = f(self);
        self.set_byte_order(saved);
        result
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Enable or disable type-tagged encoding, returning the previous setting.
    pub fn set_debug(&mut self, enabled: bool) -> bool {
        std::mem::replace(&mut self.debug, enabled)
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    /// Install a callback invoked for every failure of a complete entry point.
    pub fn set_error_hook(&mut self, hook: impl Fn(&SourceError) + Send + 'static) {
        self.error_hook = Some(Box::new(hook));
    }

    pub fn clear_error_hook(&mut self) {
        self.error_hook = None;
    }

    fn report<T>(&self, result: SourceResult<T>) -> SourceResult<T> {
        if let (Err(e), Some(hook)) = (&result, &self.error_hook) {
            hook(e);
        }
        result
    }

    // ---- Raw transfers ----

    /// Read up to `buf.len()` bytes, returning the count actually read.
    pub fn read_partial(&mut self, buf: &mut [u8]) -> SourceResult<usize> {
        let n = self.backend.read(buf)?;
        self.note_read(n);
        Ok(n)
    }

    /// Write up to `buf.len()` bytes, returning the count actually written.
    pub fn write_partial(&mut self, buf: &[u8]) -> SourceResult<usize> {
        let n = self.backend.write(buf)?;
        self.note_write(n);
        Ok(n)
    }

    /// Fill `buf` completely or fail with [`SourceError::ShortRead`].
    pub fn read(&mut self, buf: &mut [u8]) -> SourceResult<()> {
        let result = self
            .read_partial(buf)
            .and_then(|n| check_read(buf.len(), n));
        self.report(result)
    }

    /// Write all of `buf` or fail with [`SourceError::ShortWrite`].
    pub fn write(&mut self, buf: &[u8]) -> SourceResult<()> {
        let result = self
            .write_partial(buf)
            .and_then(|n| check_write(buf.len(), n));
        self.report(result)
    }

    /// Fill `buf` from `offset` without moving the stream position.
    pub fn read_at(&mut self, buf: &mut [u8], offset: u64) -> SourceResult<()> {
        let result = self.backend.read_at(buf, offset).and_then(|n| {
            self.note_read(n);
            check_read(buf.len(), n)
        });
        self.report(result)
    }

    /// Write `buf` at `offset` without moving the stream position.
    pub fn write_at(&mut self, buf: &[u8], offset: u64) -> SourceResult<()> {
        let result = self.backend.write_at(buf, offset).and_then(|n| {
            self.note_write(n);
            check_write(buf.len(), n)
        });
        self.report(result)
    }

    /// Current byte position.
    pub fn tell(&mut self) -> SourceResult<u64> {
        let result = self.backend.tell();
        self.report(result)
    }

    /// Move the position; backends without random access fail.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> SourceResult<()> {
        let result = self.backend.seek(offset, whence);
        self.report(result)
    }

    /// Close the backend. Owning backends release their storage.
    pub fn close(mut self) -> SourceResult<()> {
        let result = self.backend.close();
        self.report(result)
    }

    /// Contents of an in-memory source.
    pub fn bytes(&self) -> Option<&[u8]> {
        self.backend.bytes()
    }

    /// Take the contents of a growable buffer.
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        self.backend.into_bytes()
    }

    fn note_read(&mut self, n: usize) {
        self.counters.rd_last = n;
        self.counters.rd_total += n as u64;
    }

    fn note_write(&mut self, n: usize) {
        self.counters.wr_last = n;
        self.counters.wr_total += n as u64;
    }

    // ---- Type tags ----

    /// Write a 4-byte type tag in the current byte order.
    pub fn write_type_code(&mut self, code: u32) -> SourceResult<()> {
        self.write_raw_scalar(code)
    }

    /// Read a 4-byte type tag and compare it against `code`.
    pub fn check_type_code(&mut self, code: u32) -> SourceResult<()> {
        let found: u32 = self.read_raw_scalar()?;
        if found == code {
            Ok(())
        } else {
            trace!(expected = code, found, "type code mismatch");
            self.report(Err(SourceError::TypeCodeMismatch {
                expected: code,
                found,
            }))
        }
    }

    // ---- Scalars ----

    fn write_raw_scalar<T: Scalar>(&mut self, value: T) -> SourceResult<()> {
        let mut buf = [0u8; 8];
        value.encode(self.byte_order, &mut buf[..T::SIZE]);
        self.write(&buf[..T::SIZE])
    }

    fn read_raw_scalar<T: Scalar>(&mut self) -> SourceResult<T> {
        let mut buf = [0u8; 8];
        self.read(&mut buf[..T::SIZE])?;
        Ok(T::decode(self.byte_order, &buf[..T::SIZE]))
    }

    /// Write any scalar, tagging it in debug mode.
    pub fn write_scalar<T: Scalar>(&mut self, value: T) -> SourceResult<()> {
        if self.debug {
            self.write_type_code(T::TYPE_CODE)?;
        }
        self.write_raw_scalar(value)
    }

    /// Read any scalar, verifying its tag in debug mode.
    pub fn read_scalar<T: Scalar>(&mut self) -> SourceResult<T> {
        if self.debug {
            self.check_type_code(T::TYPE_CODE)?;
        }
        self.read_raw_scalar()
    }

    /// Write a scalar at `offset` without moving the stream position.
    pub fn write_scalar_at<T: Scalar>(&mut self, value: T, offset: u64) -> SourceResult<()> {
        let mut buf = [0u8; 8];
        value.encode(self.byte_order, &mut buf[..T::SIZE]);
        self.write_at(&buf[..T::SIZE], offset)
    }

    /// Read a scalar at `offset` without moving the stream position.
    pub fn read_scalar_at<T: Scalar>(&mut self, offset: u64) -> SourceResult<T> {
        let mut buf = [0u8; 8];
        self.read_at(&mut buf[..T::SIZE], offset)?;
        Ok(T::decode(self.byte_order, &buf[..T::SIZE]))
    }

    // ---- Strings ----

    /// Write a length-prefixed UTF-8 string.
    ///
    /// Strings longer than [`MAX_STRING_LEN`] bytes are rejected before
    /// anything is written, since no reader would accept them.
    pub fn write_string(&mut self, s: &str) -> SourceResult<()> {
        if s.len() > MAX_STRING_LEN {
            return self.report(Err(SourceError::StringTooLong {
                len: s.len(),
                max: MAX_STRING_LEN,
            }));
        }
        if self.debug {
            self.write_type_code(type_code::STRING)?;
        }
        self.write_raw_scalar(s.len() as u32)?;
        self.write(s.as_bytes())
    }

    fn read_string_len(&mut self) -> SourceResult<usize> {
        if self.debug {
            self.check_type_code(type_code::STRING)?;
        }
        let len = self.read_raw_scalar::<u32>()? as usize;
        if len > MAX_STRING_LEN {
            return self.report(Err(SourceError::StringTooLong {
                len,
                max: MAX_STRING_LEN,
            }));
        }
        Ok(len)
    }

    /// Read a length-prefixed string into a newly allocated `String`.
    pub fn read_string(&mut self) -> SourceResult<String> {
        let len = self.read_string_len()?;
        let mut bytes = vec![0u8; len];
        self.read(&mut bytes)?;
        let s = String::from_utf8(bytes);
        self.report(s.map_err(SourceError::from))
    }

    /// Read a string into `dst`, keeping at most `max` bytes.
    ///
    /// The whole string is consumed from the stream either way; the return
    /// value is `true` if it had to be truncated.
    pub fn copy_string(&mut self, dst: &mut String, max: usize) -> SourceResult<bool> {
        let s = self.read_string()?;
        dst.clear();
        if s.len() <= max {
            dst.push_str(&s);
            return Ok(false);
        }
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        dst.push_str(&s[..cut]);
        Ok(true)
    }

    /// Advance past a string without materializing it.
    pub fn skip_string(&mut self) -> SourceResult<()> {
        let len = self.read_string_len()?;
        match self.seek(len as i64, Whence::Cur) {
            Ok(()) => Ok(()),
            // Streams cannot seek; drain the bytes instead.
            Err(SourceError::NotSupported { .. }) => {
                let mut sink = vec![0u8; len];
                self.read(&mut sink)
            }
            Err(e) => Err(e),
        }
    }
}

fn check_read(expected: usize, actual: usize) -> SourceResult<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(SourceError::ShortRead { expected, actual })
    }
}

fn check_write(expected: usize, actual: usize) -> SourceResult<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(SourceError::ShortWrite { expected, actual })
    }
}

macro_rules! scalar_accessors {
    ($($read:ident, $write:ident => $ty:ty;)*) => {
        impl DataSource<'_> {
            $(
                pub fn $read(&mut self) -> SourceResult<$ty> {
                    self.read_scalar::<$ty>()
                }

                pub fn $write(&mut self, value: $ty) -> SourceResult<()> {
                    self.write_scalar(value)
                }
            )*
        }
    };
}

scalar_accessors! {
    read_u8, write_u8 => u8;
    read_i8, write_i8 => i8;
    read_u16, write_u16 => u16;
    read_i16, write_i16 => i16;
    read_u32, write_u32 => u32;
    read_i32, write_i32 => i32;
    read_u64, write_u64 => u64;
    read_i64, write_i64 => i64;
    read_f32, write_f32 => f32;
    read_f64, write_f64 => f64;
}

impl fmt::Debug for DataSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSource")
            .field("kind", &self.kind())
            .field("byte_order", &self.byte_order)
            .field("debug", &self.debug)
            .field("counters", &self.counters)
            .finish()
    }
}
