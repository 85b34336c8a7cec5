//! Reader backends for comparators
//!
//! Comparators pull bytes through [`Readable`] so they work the same over a
//! file on disk and over output already held in memory.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Component, StructuredError};

const BUFFER_SIZE: usize = 64 * 1024;

/// A byte stream a comparator can consume
pub trait Readable: Send {
    /// Open (or reopen from the start)
    fn open(&mut self) -> Result<(), StructuredError>;

    /// Read up to `buf.len()` bytes, returning 0 at end of stream
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, StructuredError>;

    /// Whether the stream is exhausted
    fn at_end(&mut self) -> Result<bool, StructuredError>;

    /// Release the underlying resource
    fn close(&mut self);

    /// Short human-readable description for diagnostics
    fn describe(&self) -> String;
}

fn not_open(what: &str) -> StructuredError {
    StructuredError::invalid_argument(Component::Comparator, format!("{what} is not open"))
}

/// Reads a file from disk through a buffer
#[derive(Debug)]
pub struct FileReader {
    path: PathBuf,
    reader: Option<BufReader<File>>,
}

impl FileReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reader: None,
        }
    }

    fn io_error(&self, e: &std::io::Error) -> StructuredError {
        StructuredError::io(Component::Comparator, &self.path, e)
    }
}

impl Readable for FileReader {
    fn open(&mut self) -> Result<(), StructuredError> {
        let file = File::open(&self.path).map_err(|e| self.io_error(&e))?;
        self.reader = Some(BufReader::with_capacity(BUFFER_SIZE, file));
        Ok(())
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, StructuredError> {
        let result = match self.reader.as_mut() {
            Some(reader) => reader.read(buf),
            None => return Err(not_open(&self.describe())),
        };
        result.map_err(|e| self.io_error(&e))
    }

    fn at_end(&mut self) -> Result<bool, StructuredError> {
        let result = match self.reader.as_mut() {
            Some(reader) => reader.fill_buf().map(|buf| buf.is_empty()),
            None => return Err(not_open(&self.describe())),
        };
        result.map_err(|e| self.io_error(&e))
    }

    fn close(&mut self) {
        self.reader = None;
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// Reads bytes held in memory
#[derive(Debug, Clone)]
pub struct TextReader {
    data: Arc<[u8]>,
    pos: usize,
    open: bool,
}

impl TextReader {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
            open: false,
        }
    }
}

impl From<&str> for TextReader {
    fn from(text: &str) -> Self {
        TextReader::new(text.as_bytes())
    }
}

impl From<Vec<u8>> for TextReader {
    fn from(data: Vec<u8>) -> Self {
        TextReader::new(data)
    }
}

impl Readable for TextReader {
    fn open(&mut self) -> Result<(), StructuredError> {
        self.pos = 0;
        self.open = true;
        Ok(())
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, StructuredError> {
        if !self.open {
            return Err(not_open(&self.describe()));
        }
        let remaining = &self.data[self.pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }

    fn at_end(&mut self) -> Result<bool, StructuredError> {
        if !self.open {
            return Err(not_open(&self.describe()));
        }
        Ok(self.pos >= self.data.len())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn describe(&self) -> String {
        format!("{} bytes of text", self.data.len())
    }
}

/// Position of a byte within a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Byte offset from the start, 0-based
    pub offset: u64,
    /// Line number, 1-based
    pub line: u64,
    /// Column in bytes, 1-based
    pub column: u64,
}

impl Default for Position {
    fn default() -> Self {
        Self {
            offset: 0,
            line: 1,
            column: 1,
        }
    }
}

/// Byte-at-a-time cursor over a [`Readable`] with one byte of lookahead
pub(crate) struct ByteCursor<'a> {
    source: &'a mut dyn Readable,
    buf: Box<[u8]>,
    start: usize,
    end: usize,
    position: Position,
}

impl<'a> ByteCursor<'a> {
    pub fn new(source: &'a mut dyn Readable) -> Self {
        Self {
            source,
            buf: vec![0; BUFFER_SIZE].into_boxed_slice(),
            start: 0,
            end: 0,
            position: Position::default(),
        }
    }

    /// Position of the next byte
    pub fn position(&self) -> Position {
        self.position
    }

    fn fill(&mut self) -> Result<bool, StructuredError> {
        if self.start < self.end {
            return Ok(true);
        }
        self.start = 0;
        self.end = self.source.read_chunk(&mut self.buf)?;
        Ok(self.end > 0)
    }

    pub fn peek(&mut self) -> Result<Option<u8>, StructuredError> {
        if !self.fill()? {
            return Ok(None);
        }
        Ok(Some(self.buf[self.start]))
    }

    pub fn next_byte(&mut self) -> Result<Option<u8>, StructuredError> {
        let Some(byte) = self.peek()? else {
            return Ok(None);
        };
        self.start += 1;
        self.position.offset += 1;
        if byte == b'\n' {
            self.position.line += 1;
            self.position.column = 1;
        } else {
            self.position.column += 1;
        }
        Ok(Some(byte))
    }

    /// Next whitespace-separated token, or `None` at end of stream
    pub fn next_token(&mut self) -> Result<Option<Vec<u8>>, StructuredError> {
        while let Some(byte) = self.peek()? {
            if !byte.is_ascii_whitespace() {
                break;
            }
            self.next_byte()?;
        }

        let mut token = Vec::new();
        while let Some(byte) = self.peek()? {
            if byte.is_ascii_whitespace() {
                break;
            }
            token.push(byte);
            self.next_byte()?;
        }

        Ok((!token.is_empty()).then_some(token))
    }
}
