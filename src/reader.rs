//! Fixed-size chunking of a record stream on record boundaries.

use std::io::{ErrorKind, Read, Seek, SeekFrom};

use crate::byte_buffer::ByteBuffer;
use crate::error::{Error, Result};

/// Complete records copied out of the read buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Byte offset of `bytes[0]` in the source stream.
    pub offset: u64,
    pub bytes: Vec<u8>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Reads `chunk_size` bytes at a time and cuts each read after its last
/// newline, seeking back over the partial record so the next read starts on
/// it. The final read of the stream is emitted whole, so a last record
/// without a trailing newline is kept.
pub struct ChunkReader<R> {
    source: R,
    buf: Vec<u8>,
    offset: u64,
}

impl<R: Read + Seek> ChunkReader<R> {
    pub fn new(source: R, chunk_size: usize) -> Self {
        Self {
            source,
            buf: vec![0u8; chunk_size],
            offset: 0,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.buf.len()
    }

    /// Next run of complete records, or `None` once the stream is drained.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        let filled = self.fill()?;

        if filled == 0 {
            return Ok(None);
        }

        let end = if filled < self.buf.len() {
            filled
        } else {
            match self.buf[..filled].last_byte_position(b'\n') {
                Some(newline) => newline + 1,
                None if self.at_end()? => filled,
                None => {
                    return Err(Error::RecordTooLong {
                        offset: self.offset,
                        capacity: self.buf.len(),
                    });
                }
            }
        };

        let partial = filled - end;
        if partial > 0 {
            self.source.seek(SeekFrom::Current(-(partial as i64)))?;
        }

        let chunk = Chunk {
            offset: self.offset,
            bytes: self.buf[..end].to_vec(),
        };
        self.offset += end as u64;

        Ok(Some(chunk))
    }

    /// True when the source has nothing past the current position.
    fn at_end(&mut self) -> Result<bool> {
        let mut probe = [0u8; 1];
        loop {
            match self.source.read(&mut probe) {
                Ok(n) => return Ok(n == 0),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Reads until the buffer is full or the source hits end of stream.
    fn fill(&mut self) -> Result<usize> {
        let mut filled = 0;

        while filled < self.buf.len() {
            match self.source.read(&mut self.buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(filled)
    }
}

impl<R: Read + Seek> Iterator for ChunkReader<R> {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}
