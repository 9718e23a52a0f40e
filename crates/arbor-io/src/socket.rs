use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};

use crate::backend::Backend;
use crate::error::{SourceError, SourceResult};

/// Backend over a connected TCP stream.
///
/// Streams have no random access: `read_at`, `write_at`, `seek` and
/// `tell` are not supported.
pub struct SocketSource {
    stream: Option<TcpStream>,
}

impl SocketSource {
    pub fn connect(addr: impl ToSocketAddrs) -> SourceResult<Self> {
        Ok(Self::from_stream(TcpStream::connect(addr)?))
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    fn stream(&mut self) -> SourceResult<&mut TcpStream> {
        self.stream.as_mut().ok_or(SourceError::Closed)
    }
}

impl Backend for SocketSource {
    fn kind(&self) -> &'static str {
        "socket"
    }

    fn read(&mut self, buf: &mut [u8]) -> SourceResult<usize> {
        let stream = self.stream()?;
        let mut total = 0;
        while total < buf.len() {
            match stream.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(total)
    }

    fn write(&mut self, buf: &[u8]) -> SourceResult<usize> {
        let stream = self.stream()?;
        let mut total = 0;
        while total < buf.len() {
            match stream.write(&buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(total)
    }

    fn close(&mut self) -> SourceResult<()> {
        if let Some(stream) = self.stream.take() {
            match stream.shutdown(Shutdown::Both) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
