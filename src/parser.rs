use std::sync::Arc;

use crate::byte_buffer::ByteBuffer;
use crate::error::{Error, MalformedRecord, Result};
use crate::fixed_point::parse_tenths;
use crate::partition::{NameHasher, ShardRouter};
use crate::reader::Chunk;

/// One parsed `name;value` line. The name borrows from the chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    pub key: u64,
    pub value: i16,
    pub name: &'a [u8],
}

#[derive(Debug, Clone, Copy)]
struct RecordSlot {
    key: u64,
    value: i16,
    name_start: usize,
    name_end: usize,
}

/// Records of one chunk bound for one shard.
///
/// Holds the chunk alive until the shard has copied out whatever names it
/// needs, so records never outlive their bytes.
#[derive(Debug)]
pub struct RecordBatch {
    chunk: Arc<Chunk>,
    slots: Vec<RecordSlot>,
}

impl RecordBatch {
    fn new(chunk: Arc<Chunk>) -> Self {
        Self {
            chunk,
            slots: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        let bytes = &self.chunk.bytes;
        self.slots.iter().map(move |slot| Record {
            key: slot.key,
            value: slot.value,
            name: &bytes[slot.name_start..slot.name_end],
        })
    }
}

/// Newline separated lines of a chunk with their start positions. A last line
/// without a newline is still yielded.
struct Lines<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for Lines<'a> {
    type Item = (usize, &'a [u8]);

    #[inline(always)]
    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.bytes.len() {
            return None;
        }

        let start = self.pos;
        let rest = &self.bytes[start..];
        let len = rest.byte_position(b'\n').unwrap_or(rest.len());
        self.pos = start + len + 1;

        Some((start, &rest[..len]))
    }
}

/// Turns chunk bytes into keyed, routed records.
#[derive(Debug, Clone, Copy)]
pub struct RecordParser {
    hasher: NameHasher,
    router: ShardRouter,
}

impl RecordParser {
    pub fn new(hasher: NameHasher, router: ShardRouter) -> Self {
        Self { hasher, router }
    }

    pub fn hasher(&self) -> &NameHasher {
        &self.hasher
    }

    pub fn router(&self) -> &ShardRouter {
        &self.router
    }

    /// Parses one line without its trailing newline.
    #[inline(always)]
    pub fn parse_line<'a>(
        &self,
        line: &'a [u8],
    ) -> std::result::Result<Record<'a>, MalformedRecord> {
        // Values are shorter than names, so search from the end.
        let separator = line
            .last_byte_position(b';')
            .ok_or(MalformedRecord::MissingSeparator)?;

        let name = &line[..separator];
        let value = parse_tenths(&line[separator + 1..])?;

        Ok(Record {
            key: self.hasher.hash(name),
            value,
            name,
        })
    }

    /// Splits a chunk into one batch per shard, indexed by shard id. Batches
    /// for shards that own none of the chunk's records are empty.
    pub fn parse_chunk(&self, chunk: Arc<Chunk>) -> Result<Vec<RecordBatch>> {
        let mut batches: Vec<RecordBatch> = (0..self.router.shards())
            .map(|_| RecordBatch::new(Arc::clone(&chunk)))
            .collect();

        let lines = Lines {
            bytes: &chunk.bytes,
            pos: 0,
        };

        for (start, line) in lines {
            let record = self.parse_line(line).map_err(|kind| Error::Malformed {
                offset: chunk.offset + start as u64,
                kind,
                line: String::from_utf8_lossy(line).into_owned(),
            })?;

            let shard = self.router.route(record.name);
            batches[shard].slots.push(RecordSlot {
                key: record.key,
                value: record.value,
                name_start: start,
                name_end: start + record.name.len(),
            });
        }

        Ok(batches)
    }
}
