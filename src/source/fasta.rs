use std::{
    fs::File,
    io::{BufRead, BufReader, Read},
    path::Path,
};

use memchr::{memchr, memchr3};

use super::SourceEvent;
use crate::error::{BuildError, Error, Result};

/// Lazy FASTA reader yielding [`SourceEvent`]s
///
/// Sequence text is delivered in chunks of at most `chunk_size` bytes with line
/// breaks and interior whitespace removed. Sequence lines are consumed straight
/// from the reader's buffer, so memory use depends on neither the length of a
/// chromosome nor the length of its lines. Blank lines and `;` comment lines are
/// skipped. The chromosome name is the first whitespace-delimited token of a
/// header line.
pub struct FastaSource<R: BufRead> {
    reader: R,
    /// Label used in error messages
    label: String,
    line_no: usize,
    chunk_size: usize,
    /// Header line being parsed
    line: Vec<u8>,
    /// Sequence not yet emitted, at most `chunk_size` bytes
    pending: Vec<u8>,
    /// Header read while sequence was still pending
    queued: Option<String>,
    /// The current line is a sequence line whose end has not been consumed
    in_sequence: bool,
    seen_header: bool,
    done: bool,
}

impl FastaSource<BufReader<Box<dyn Read>>> {
    /// Opens a FASTA file, decompressing it on the fly if needed
    pub fn from_path<P: AsRef<Path>>(path: P, chunk_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let (handle, _format) = niffler::get_reader(Box::new(File::open(path)?))?;
        Ok(Self::new(
            BufReader::new(handle),
            path.display().to_string(),
            chunk_size,
        ))
    }
}

impl<R: BufRead> FastaSource<R> {
    pub fn new(reader: R, label: impl Into<String>, chunk_size: usize) -> Self {
        Self {
            reader,
            label: label.into(),
            line_no: 0,
            chunk_size: chunk_size.max(1),
            line: Vec::new(),
            pending: Vec::new(),
            queued: None,
            in_sequence: false,
            seen_header: false,
            done: false,
        }
    }

    fn malformed(&self, what: &str) -> Error {
        BuildError::MalformedSource(format!("{}:{}: {what}", self.label, self.line_no)).into()
    }

    fn take_chunk(&mut self) -> SourceEvent {
        SourceEvent::Sequence(std::mem::take(&mut self.pending))
    }

    fn next_event(&mut self) -> Result<Option<SourceEvent>> {
        loop {
            if self.pending.len() >= self.chunk_size {
                return Ok(Some(self.take_chunk()));
            }
            if let Some(name) = self.queued.take() {
                return Ok(Some(SourceEvent::Header(name)));
            }
            if self.done {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.take_chunk()));
            }
            if self.in_sequence {
                self.read_sequence()?;
                continue;
            }

            let Some(first) = self.reader.fill_buf()?.first().copied() else {
                self.done = true;
                continue;
            };
            self.line_no += 1;
            match first {
                b'>' => {
                    let name = self.read_header()?;
                    self.seen_header = true;
                    if self.pending.is_empty() {
                        return Ok(Some(SourceEvent::Header(name)));
                    }
                    self.queued = Some(name);
                    return Ok(Some(self.take_chunk()));
                }
                b';' => self.skip_line()?,
                _ => self.in_sequence = true,
            }
        }
    }

    fn read_header(&mut self) -> Result<String> {
        self.line.clear();
        self.reader.read_until(b'\n', &mut self.line)?;
        let name = self.line[1..]
            .split(u8::is_ascii_whitespace)
            .find(|token| !token.is_empty())
            .ok_or_else(|| self.malformed("header without a name"))?;
        String::from_utf8(name.to_vec())
            .map_err(|_| self.malformed("header name is not valid UTF-8"))
    }

    fn skip_line(&mut self) -> Result<()> {
        loop {
            let buf = self.reader.fill_buf()?;
            if buf.is_empty() {
                return Ok(());
            }
            if let Some(pos) = memchr(b'\n', buf) {
                self.reader.consume(pos + 1);
                return Ok(());
            }
            let n = buf.len();
            self.reader.consume(n);
        }
    }

    /// Moves bytes of the current sequence line into `pending` until the line ends
    /// or `pending` holds a full chunk
    fn read_sequence(&mut self) -> Result<()> {
        let mut stray = false;
        while self.in_sequence && self.pending.len() < self.chunk_size {
            let buf = self.reader.fill_buf()?;
            if buf.is_empty() {
                self.in_sequence = false;
                break;
            }
            let newline = memchr(b'\n', buf);
            let line_len = newline.unwrap_or(buf.len());
            let take = line_len.min(self.chunk_size - self.pending.len());
            let piece = &buf[..take];

            if !self.seen_header && !piece.iter().all(u8::is_ascii_whitespace) {
                stray = true;
                break;
            }
            if memchr3(b' ', b'\t', b'\r', piece).is_some() {
                self.pending
                    .extend(piece.iter().filter(|b| !b.is_ascii_whitespace()));
            } else {
                self.pending.extend_from_slice(piece);
            }

            let finished = newline.is_some() && take == line_len;
            self.reader.consume(take + usize::from(finished));
            if finished {
                self.in_sequence = false;
            }
        }
        if stray {
            return Err(self.malformed("sequence data before the first header"));
        }
        Ok(())
    }
}

impl<R: BufRead> Iterator for FastaSource<R> {
    type Item = Result<SourceEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_event() {
            Ok(event) => event.map(Ok),
            Err(e) => {
                self.done = true;
                self.pending.clear();
                self.queued = None;
                Some(Err(e))
            }
        }
    }
}
