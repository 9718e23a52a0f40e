use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::warn;

use crate::backend::{Backend, Whence};
use crate::error::{SourceError, SourceResult};

/// Parse a C-style open mode (`"rb"`, `"wb"`, `"ab"`, `"r+b"`, `"w+b"`, `"a+b"`).
pub fn parse_mode(mode: &str) -> SourceResult<OpenOptions> {
    let plain: String = mode.chars().filter(|c| *c != 'b').collect();
    let mut opts = OpenOptions::new();
    match plain.as_str() {
        "r" => opts.read(true),
        "r+" => opts.read(true).write(true),
        "w" => opts.write(true).create(true).truncate(true),
        "w+" => opts.read(true).write(true).create(true).truncate(true),
        "a" => opts.append(true).create(true),
        "a+" => opts.read(true).append(true).create(true),
        _ => return Err(SourceError::InvalidMode(mode.to_string())),
    };
    Ok(opts)
}

/// Backend over an open file.
pub struct FileSource {
    file: Option<File>,
}

impl FileSource {
    pub fn open(path: &Path, mode: &str) -> SourceResult<Self> {
        let file = parse_mode(mode)?.open(path)?;
        Ok(Self::from_file(file))
    }

    pub fn from_file(file: File) -> Self {
        Self { file: Some(file) }
    }

    fn file(&mut self) -> SourceResult<&mut File> {
        self.file.as_mut().ok_or(SourceError::Closed)
    }

    /// Run `op` at `offset`, restoring the original position afterwards.
    ///
    /// The restore is attempted even if the transfer failed; the first
    /// error encountered is the one reported.
    fn at_offset<T>(
        &mut self,
        offset: u64,
        op: impl FnOnce(&mut File) -> io::Result<T>,
    ) -> SourceResult<T> {
        let file = self.file()?;
        let saved = file.stream_position()?;
        let result = file.seek(SeekFrom::Start(offset)).and_then(|_| op(file));
        let restored = file.seek(SeekFrom::Start(saved));
        if let Err(e) = &restored {
            warn!(saved, error = %e, "failed to restore file position");
        }
        let value = result?;
        restored?;
        Ok(value)
    }
}

/// Read until `buf` is full or end of file.
fn read_full(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match file.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// Write until `buf` is drained or the file stops accepting bytes.
fn write_full(file: &mut File, buf: &[u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match file.write(&buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

impl Backend for FileSource {
    fn kind(&self) -> &'static str {
        "file"
    }

    fn read(&mut self, buf: &mut [u8]) -> SourceResult<usize> {
        Ok(read_full(self.file()?, buf)?)
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> SourceResult<usize> {
        self.at_offset(offset, |f| read_full(f, buf))
    }

    fn write(&mut self, buf: &[u8]) -> SourceResult<usize> {
        Ok(write_full(self.file()?, buf)?)
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> SourceResult<usize> {
        self.at_offset(offset, |f| write_full(f, buf))
    }

    fn tell(&mut self) -> SourceResult<u64> {
        Ok(self.file()?.stream_position()?)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> SourceResult<()> {
        let from = match whence {
            Whence::Set => {
                let start = u64::try_from(offset).map_err(|_| SourceError::OutOfBounds {
                    offset,
                    len: 0,
                    size: 0,
                })?;
                SeekFrom::Start(start)
            }
            Whence::Cur => SeekFrom::Current(offset),
            Whence::End => SeekFrom::End(offset),
        };
        self.file()?.seek(from)?;
        Ok(())
    }

    fn close(&mut self) -> SourceResult<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }
}
