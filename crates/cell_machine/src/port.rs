//! Byte streams for system bots.
//!
//! The machine never touches the host directly. A host hands a
//! [`SystemPort`] to the scheduler when it registers a system bot, and the
//! `avail`/`getb`/`putb` opcodes go through it.

use std::boxed::Box;
use std::io::{Read, Write};

use heapless::Deque;
use thiserror_no_std::Error;

/// Largest read window `avail` can prime.
pub const READ_WINDOW: usize = 256;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortError {
    #[error("{kind:?}: {message}")]
    Io {
        kind: std::io::ErrorKind,
        message: String,
    },
    #[error("port is closed")]
    Closed,
}

impl From<std::io::Error> for PortError {
    fn from(err: std::io::Error) -> Self {
        PortError::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

pub trait ByteSource {
    /// Reads up to `buf.len()` bytes, returning how many were read. Zero
    /// means nothing is available.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, PortError>;
}

pub trait ByteSink {
    fn write(&mut self, bytes: &[u8]) -> Result<(), PortError>;
}

/// Adapts any [`Read`] into a [`ByteSource`].
pub struct ReadSource<R: Read>(pub R);

impl<R: Read> ByteSource for ReadSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, PortError> {
        Ok(self.0.read(buf)?)
    }
}

/// Adapts any [`Write`] into a [`ByteSink`]. Every write is flushed.
pub struct WriteSink<W: Write>(pub W);

impl<W: Write> ByteSink for WriteSink<W> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), PortError> {
        self.0.write_all(bytes)?;
        self.0.flush()?;
        Ok(())
    }
}

/// A source with nothing in it, for system bots that only write.
pub struct NoInput;

impl ByteSource for NoInput {
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, PortError> {
        Ok(0)
    }
}

/// A sink that refuses every write, for system bots that only read.
pub struct NoOutput;

impl ByteSink for NoOutput {
    fn write(&mut self, _bytes: &[u8]) -> Result<(), PortError> {
        Err(PortError::Closed)
    }
}

pub struct SystemPort {
    input: Box<dyn ByteSource>,
    output: Box<dyn ByteSink>,
    window: Deque<u8, READ_WINDOW>,
}

impl SystemPort {
    pub fn new(input: Box<dyn ByteSource>, output: Box<dyn ByteSink>) -> Self {
        Self {
            input,
            output,
            window: Deque::new(),
        }
    }

    /// Tops the read window up to `wanted` bytes (at most [`READ_WINDOW`])
    /// and returns how many of them are buffered.
    pub fn probe(&mut self, wanted: usize) -> Result<usize, PortError> {
        let wanted = wanted.min(READ_WINDOW);
        let missing = wanted.saturating_sub(self.window.len());
        if missing > 0 {
            let mut buf = [0u8; READ_WINDOW];
            let chunk = buf.get_mut(..missing).ok_or(PortError::Closed)?;
            let read = self.input.read(chunk)?;
            for byte in chunk.iter().take(read) {
                if self.window.push_back(*byte).is_err() {
                    break;
                }
            }
        }
        Ok(self.window.len().min(wanted))
    }

    /// Next byte of the primed window, if any.
    pub fn take_byte(&mut self) -> Option<u8> {
        self.window.pop_front()
    }

    pub fn write_byte(&mut self, byte: u8) -> Result<(), PortError> {
        self.output.write(&[byte])
    }

    pub fn buffered(&self) -> usize {
        self.window.len()
    }
}

impl core::fmt::Debug for SystemPort {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SystemPort")
            .field("buffered", &self.window.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io::Cursor;
    use std::rc::Rc;

    struct SharedSink(Rc<RefCell<std::vec::Vec<u8>>>);

    impl ByteSink for SharedSink {
        fn write(&mut self, bytes: &[u8]) -> Result<(), PortError> {
            self.0.borrow_mut().extend_from_slice(bytes);
            Ok(())
        }
    }

    #[test]
    fn probe_fills_only_what_was_asked() -> Result<(), PortError> {
        let mut port = SystemPort::new(
            Box::new(ReadSource(Cursor::new(b"hello".to_vec()))),
            Box::new(NoOutput),
        );
        assert_eq!(port.probe(2)?, 2);
        assert_eq!(port.buffered(), 2);
        assert_eq!(port.take_byte(), Some(b'h'));
        assert_eq!(port.probe(10)?, 4);
        assert_eq!(port.take_byte(), Some(b'e'));
        assert_eq!(port.take_byte(), Some(b'l'));
        assert_eq!(port.take_byte(), Some(b'l'));
        assert_eq!(port.take_byte(), Some(b'o'));
        assert_eq!(port.take_byte(), None);
        assert_eq!(port.probe(1)?, 0);
        Ok(())
    }

    #[test]
    fn writes_reach_the_sink() -> Result<(), PortError> {
        let out = Rc::new(RefCell::new(std::vec::Vec::new()));
        let mut port = SystemPort::new(Box::new(NoInput), Box::new(SharedSink(out.clone())));
        port.write_byte(b'o')?;
        port.write_byte(b'k')?;
        assert_eq!(out.borrow().as_slice(), b"ok");
        Ok(())
    }

    #[test]
    fn closed_output_reports_an_error() {
        let mut port = SystemPort::new(Box::new(NoInput), Box::new(NoOutput));
        assert_eq!(port.write_byte(0), Err(PortError::Closed));
    }
}
