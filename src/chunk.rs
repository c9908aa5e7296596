//! # Chunk containers
//!
//! Every resource file in the Dynamix family is built from named chunks: a
//! 3-character ASCII identifier, a fixed `':'` separator, a little-endian
//! u32 payload length (top bit reserved as an unrelated flag and masked
//! off), then the payload. Payloads may themselves contain chunks, so a
//! top-level `BMP` chunk typically wraps `INF`/`BIN`/`VGA`/`MTX` children.
//!
//! Parsing never mutates: a [`Chunk`] is just a borrowed view into the
//! backing buffer plus the offset it was found at.

use crate::error::{CodecError, CodecResult};

pub const CHUNK_HEADER_SIZE: usize = 8;
pub const CHUNK_SEPARATOR: u8 = b':';

/// Top bit of the length field is a flag in one format variant, not length.
const LENGTH_MASK: u32 = 0x7FFF_FFFF;

/// A parsed chunk: identifier, address of the identifier in the enclosing
/// buffer, and the payload slice.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    pub id: [u8; 3],
    pub offset: usize,
    pub payload: &'a [u8],
}

impl<'a> Chunk<'a> {
    pub fn id_str(&self) -> &str {
        // Identifiers are validated as ASCII before a Chunk is constructed.
        std::str::from_utf8(&self.id).unwrap_or("???")
    }
}

/// Validate a chunk identifier supplied by a caller. Anything other than
/// exactly 3 ASCII characters is a programming error, not a data error.
fn checked_id(id: &str) -> [u8; 3] {
    let bytes = id.as_bytes();
    assert!(
        bytes.len() == 3 && bytes.iter().all(u8::is_ascii),
        "chunk identifier must be exactly 3 ASCII characters, got {:?}",
        id
    );
    [bytes[0], bytes[1], bytes[2]]
}

/// Read and validate the length field of the chunk starting at `offset`.
///
/// The 4 bytes at `offset + 4` are read little-endian and masked with
/// `0x7FFF_FFFF`. A length that does not fit the remaining buffer is a fatal
/// structural error, never a silent clamp.
pub fn read_length(buffer: &[u8], offset: usize) -> CodecResult<u32> {
    if offset + CHUNK_HEADER_SIZE > buffer.len() {
        return Err(CodecError::structural(
            "chunk",
            format!(
                "truncated chunk header at offset {} (buffer length {})",
                offset,
                buffer.len()
            ),
        ));
    }
    let raw = u32::from_le_bytes([
        buffer[offset + 4],
        buffer[offset + 5],
        buffer[offset + 6],
        buffer[offset + 7],
    ]);
    let length = raw & LENGTH_MASK;
    if offset + CHUNK_HEADER_SIZE + length as usize > buffer.len() {
        return Err(CodecError::structural(
            "chunk",
            format!(
                "chunk at offset {} declares {} payload bytes but only {} remain",
                offset,
                length,
                buffer.len() - offset - CHUNK_HEADER_SIZE
            ),
        ));
    }
    Ok(length)
}

/// Scan `buffer` for the first chunk named `id`.
///
/// Candidates are visited by skipping whole chunks (`8 + declared length`),
/// never byte-by-byte, so a payload that happens to contain the pattern is
/// never matched. The scan stops once fewer than 8 bytes remain.
pub fn find_chunk<'a>(buffer: &'a [u8], id: &str) -> CodecResult<Option<Chunk<'a>>> {
    let wanted = checked_id(id);
    let mut offset = 0;

    while offset + CHUNK_HEADER_SIZE <= buffer.len() {
        let candidate = &buffer[offset..offset + 4];
        if !candidate[..3].iter().all(u8::is_ascii) || candidate[3] != CHUNK_SEPARATOR {
            return Err(CodecError::structural(
                "chunk",
                format!("no chunk header at offset {}", offset),
            ));
        }
        let length = read_length(buffer, offset)? as usize;
        if candidate[..3] == wanted {
            let payload = &buffer[offset + CHUNK_HEADER_SIZE..offset + CHUNK_HEADER_SIZE + length];
            return Ok(Some(Chunk {
                id: wanted,
                offset,
                payload,
            }));
        }
        offset += CHUNK_HEADER_SIZE + length;
    }

    Ok(None)
}

/// Writer-side chunk: either a raw payload or a list of children that
/// serialise recursively.
#[derive(Debug, Clone)]
pub struct ChunkBuilder {
    id: [u8; 3],
    body: ChunkBody,
}

#[derive(Debug, Clone)]
enum ChunkBody {
    Raw(Vec<u8>),
    Children(Vec<ChunkBuilder>),
}

impl ChunkBuilder {
    /// A leaf chunk with an opaque payload.
    pub fn new(id: &str, payload: Vec<u8>) -> Self {
        ChunkBuilder {
            id: checked_id(id),
            body: ChunkBody::Raw(payload),
        }
    }

    /// A container chunk whose payload is the concatenation of its
    /// children's serialised bytes.
    pub fn container(id: &str, children: Vec<ChunkBuilder>) -> Self {
        ChunkBuilder {
            id: checked_id(id),
            body: ChunkBody::Children(children),
        }
    }

    fn payload_len(&self) -> usize {
        match &self.body {
            ChunkBody::Raw(payload) => payload.len(),
            ChunkBody::Children(children) => children
                .iter()
                .map(|c| CHUNK_HEADER_SIZE + c.payload_len())
                .sum(),
        }
    }

    /// Serialise identifier, separator, little-endian length and payload,
    /// recursing through nested children.
    pub fn write(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CHUNK_HEADER_SIZE + self.payload_len());
        self.write_into(&mut out);
        out
    }

    fn write_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.id);
        out.push(CHUNK_SEPARATOR);
        out.extend_from_slice(&(self.payload_len() as u32).to_le_bytes());
        match &self.body {
            ChunkBody::Raw(payload) => out.extend_from_slice(payload),
            ChunkBody::Children(children) => {
                for child in children {
                    child.write_into(out);
                }
            }
        }
    }
}
