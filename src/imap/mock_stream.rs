use std::cmp::min;
use std::io::{Error, ErrorKind, Read, Result, Write};

/// An in-memory server: replays `read_buf` and records everything written.
#[derive(Debug, Default)]
pub(crate) struct MockStream {
    read_buf: Vec<u8>,
    read_pos: usize,
    pub(crate) written_buf: Vec<u8>,
    eof_on_read: bool,
    read_delay: usize,
}

impl MockStream {
    pub(crate) fn new(read_buf: Vec<u8>) -> MockStream {
        MockStream {
            read_buf,
            ..MockStream::default()
        }
    }

    pub(crate) fn with_eof(mut self) -> MockStream {
        self.eof_on_read = true;
        self
    }

    /// Hand out the first read one byte at a time.
    pub(crate) fn with_delay(mut self) -> MockStream {
        self.read_delay = 1;
        self
    }

    /// The commands written so far, one per line.
    pub(crate) fn written_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.written_buf)
            .split("\r\n")
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.eof_on_read {
            return Ok(0);
        }
        if self.read_pos >= self.read_buf.len() {
            return Err(Error::new(ErrorKind::UnexpectedEof, "EOF"));
        }
        let mut write_len = min(buf.len(), self.read_buf.len() - self.read_pos);
        if self.read_delay > 0 {
            self.read_delay -= 1;
            write_len = min(write_len, 1);
        }
        let max_pos = self.read_pos + write_len;
        buf[..write_len].copy_from_slice(&self.read_buf[self.read_pos..max_pos]);
        self.read_pos = max_pos;
        Ok(write_len)
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.written_buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
