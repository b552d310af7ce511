use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to read input: {0}")]
    Io(#[from] io::Error),
    #[error("source failed at offset {offset}: {reason}")]
    Other { offset: u64, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// Stable offset of the line in the source.
    pub id: u64,
    pub text: String,
}

/// Ordered, resumable producer of raw lines, read one batch at a time.
pub trait LineSource {
    /// Up to `max` lines in source order, or `None` at end of stream.
    fn next_batch(&mut self, max: usize) -> Result<Option<Vec<RawLine>>, SourceError>;
}

#[derive(Debug, Clone, Default)]
pub struct VecSource {
    lines: VecDeque<RawLine>,
}

impl VecSource {
    pub fn new<S: Into<String>>(lines: impl IntoIterator<Item = S>) -> Self {
        let lines = lines
            .into_iter()
            .enumerate()
            .map(|(i, text)| RawLine { id: i as u64, text: text.into() })
            .collect();
        Self { lines }
    }
}

impl LineSource for VecSource {
    fn next_batch(&mut self, max: usize) -> Result<Option<Vec<RawLine>>, SourceError> {
        if self.lines.is_empty() {
            return Ok(None);
        }
        let take = max.max(1).min(self.lines.len());
        Ok(Some(self.lines.drain(..take).collect()))
    }
}

/// Lines from one or more readers, consumed back to back.
pub struct ReaderSource {
    readers: VecDeque<Box<dyn BufRead + Send>>,
    next_id: u64,
    buf: Vec<u8>,
}

impl ReaderSource {
    pub fn from_reader<R: BufRead + Send + 'static>(reader: R) -> Self {
        Self::from_readers(vec![Box::new(reader) as Box<dyn BufRead + Send>])
    }

    pub fn from_readers(readers: Vec<Box<dyn BufRead + Send>>) -> Self {
        Self { readers: readers.into(), next_id: 0, buf: Vec::new() }
    }

    /// Opens every path in order; `-` (or no path at all) reads stdin.
    pub fn open(paths: &[String]) -> Result<Self, SourceError> {
        if paths.is_empty() {
            return Ok(Self::from_reader(BufReader::new(io::stdin())));
        }
        let mut readers: Vec<Box<dyn BufRead + Send>> = Vec::with_capacity(paths.len());
        for p in paths {
            if p == "-" {
                readers.push(Box::new(BufReader::new(io::stdin())));
            } else {
                let f = File::open(p).map_err(|source| SourceError::Open { path: p.clone(), source })?;
                // Larger buffer reduces syscalls on big files.
                readers.push(Box::new(BufReader::with_capacity(1 << 20, f)));
            }
        }
        Ok(Self::from_readers(readers))
    }

    fn next_line(&mut self) -> Result<Option<RawLine>, SourceError> {
        while let Some(reader) = self.readers.front_mut() {
            self.buf.clear();
            let n = reader.read_until(b'\n', &mut self.buf)?;
            if n == 0 {
                self.readers.pop_front();
                continue;
            }
            while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
                self.buf.pop();
            }
            // Invalid UTF-8 is kept lossily rather than failing the batch
            let text = String::from_utf8_lossy(&self.buf).into_owned();
            let id = self.next_id;
            self.next_id += 1;
            return Ok(Some(RawLine { id, text }));
        }
        Ok(None)
    }
}

impl LineSource for ReaderSource {
    fn next_batch(&mut self, max: usize) -> Result<Option<Vec<RawLine>>, SourceError> {
        let mut out = Vec::with_capacity(max.min(1 << 16));
        while out.len() < max.max(1) {
            match self.next_line()? {
                Some(line) => out.push(line),
                None => break,
            }
        }
        Ok(if out.is_empty() { None } else { Some(out) })
    }
}
