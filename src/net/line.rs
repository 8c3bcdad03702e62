use crate::runtime::intent::{Intent, Resume};

use std::io;
use std::mem;
use std::os::fd::RawFd;

/// Progress of a [`LineReader`].
#[derive(Debug)]
pub enum LineStep {
    /// Suspend on this intent and feed the result back.
    Wait(Intent),
    /// A complete line, newline included. A line without a trailing newline
    /// means the peer closed mid-line; an empty one means it closed before
    /// sending anything.
    Line(Vec<u8>),
    /// The read failed.
    Failed(io::Error),
}

/// Assembles a line from one-byte reads, for hand-written tasks.
///
/// This is the state-machine counterpart of
/// [`Stream::read_line`](super::Stream::read_line):
///
/// ```rust,ignore
/// // in Task::resume
/// match self.lines.feed(value) {
///     LineStep::Wait(intent) => Step::Wait(intent),
///     LineStep::Line(line) => { /* handle line */ }
///     LineStep::Failed(err) => { /* give up */ }
/// }
/// ```
#[derive(Debug)]
pub struct LineReader {
    fd: RawFd,
    line: Vec<u8>,
}

impl LineReader {
    pub fn new(fd: RawFd) -> Self {
        Self {
            fd,
            line: Vec::new(),
        }
    }

    /// The intent that starts reading the next line.
    pub fn start(&self) -> Intent {
        Intent::Read { fd: self.fd, max: 1 }
    }

    /// Consumes the result of the previous read.
    pub fn feed(&mut self, value: Resume) -> LineStep {
        match value.into_read() {
            Ok(bytes) if bytes.is_empty() => LineStep::Line(mem::take(&mut self.line)),
            Ok(bytes) => {
                self.line.extend_from_slice(&bytes);

                if self.line.last() == Some(&b'\n') {
                    LineStep::Line(mem::take(&mut self.line))
                } else {
                    LineStep::Wait(self.start())
                }
            }
            Err(err) => LineStep::Failed(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn byte(b: u8) -> Resume {
        Resume::Read(Ok(vec![b]))
    }

    #[test]
    fn test_assembles_line() {
        let mut reader = LineReader::new(3);
        assert_eq!(reader.start(), Intent::Read { fd: 3, max: 1 });

        assert!(matches!(reader.feed(byte(b'h')), LineStep::Wait(_)));
        assert!(matches!(reader.feed(byte(b'i')), LineStep::Wait(_)));

        match reader.feed(byte(b'\n')) {
            LineStep::Line(line) => assert_eq!(line, b"hi\n"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_eof_returns_partial_line() {
        let mut reader = LineReader::new(3);
        reader.feed(byte(b'x'));

        match reader.feed(Resume::Read(Ok(Vec::new()))) {
            LineStep::Line(line) => assert_eq!(line, b"x"),
            other => panic!("unexpected {other:?}"),
        }

        match reader.feed(Resume::Read(Ok(Vec::new()))) {
            LineStep::Line(line) => assert!(line.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_error_is_reported() {
        let mut reader = LineReader::new(3);
        let step = reader.feed(Resume::Read(Err(io::ErrorKind::ConnectionReset.into())));

        assert!(matches!(step, LineStep::Failed(e) if e.kind() == io::ErrorKind::ConnectionReset));
    }
}
