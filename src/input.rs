use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crate::error::{FoamError, Result};

/// Reads newline-terminated lines as raw bytes
pub struct LineReader<R> {
    reader: R,
    buffer: Vec<u8>,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
        }
    }

    /// Read the next line without its terminator, returning None at EOF
    pub fn read_line(&mut self) -> io::Result<Option<&[u8]>> {
        self.buffer.clear();
        let bytes_read = self.reader.read_until(b'\n', &mut self.buffer)?;

        if bytes_read == 0 {
            return Ok(None);
        }

        // Strip "\n" and a preceding "\r" (files written on Windows)
        if self.buffer.last() == Some(&b'\n') {
            self.buffer.pop();
        }
        if self.buffer.last() == Some(&b'\r') {
            self.buffer.pop();
        }

        Ok(Some(&self.buffer))
    }
}

/// Read all lines from a reader into owned buffers
pub fn read_all_lines<R: BufRead>(reader: R) -> io::Result<Vec<Vec<u8>>> {
    let mut lines = Vec::new();
    let mut line_reader = LineReader::new(reader);

    while let Some(line) = line_reader.read_line()? {
        lines.push(line.to_vec());
    }

    Ok(lines)
}

/// Open `path` and read all of its lines
pub fn read_file_lines(path: &Path) -> Result<Vec<Vec<u8>>> {
    let file = File::open(path).map_err(|e| FoamError::unavailable(path, e))?;
    Ok(read_all_lines(BufReader::new(file))?)
}
