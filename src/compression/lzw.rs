//! Dictionary (LZW) codec.
//!
//! The game-specific variant pinned here: literal codes 0-255, no clear or
//! end-of-stream codes, codes packed LSB-first, code width starting at 9
//! bits and growing to 12. The encoder inserts a dictionary entry after
//! every emitted code, widens when the next free code reaches `1 << width`,
//! and resets the whole table once it holds 4096 entries; the first code
//! emitted after a reset is always a literal. The decoder mirrors this with
//! the usual one-entry lag (widen one code early, reset at 4095) and
//! handles the self-referential KwKwK case.
//!
//! No public document describes the original table-growth behaviour, so the
//! golden byte vectors in the tests below are the reference for this crate.

use std::collections::HashMap;

use crate::error::{CodecError, CodecResult};

const MIN_WIDTH: u32 = 9;
const MAX_WIDTH: u32 = 12;
const FIRST_CODE: u16 = 256;
const MAX_TABLE: u16 = 1 << MAX_WIDTH;

#[derive(Default)]
struct BitWriter {
    out: Vec<u8>,
    acc: u32,
    bits: u32,
}

impl BitWriter {
    fn write(&mut self, code: u16, width: u32) {
        self.acc |= (code as u32) << self.bits;
        self.bits += width;
        while self.bits >= 8 {
            self.out.push(self.acc as u8);
            self.acc >>= 8;
            self.bits -= 8;
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.bits > 0 {
            self.out.push(self.acc as u8);
        }
        self.out
    }
}

struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    acc: u32,
    bits: u32,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            pos: 0,
            acc: 0,
            bits: 0,
        }
    }

    fn read(&mut self, width: u32) -> Option<u16> {
        while self.bits < width {
            if self.pos >= self.data.len() {
                return None;
            }
            self.acc |= (self.data[self.pos] as u32) << self.bits;
            self.pos += 1;
            self.bits += 8;
        }
        let code = (self.acc & ((1 << width) - 1)) as u16;
        self.acc >>= width;
        self.bits -= width;
        Some(code)
    }
}

pub fn encode(data: &[u8]) -> Vec<u8> {
    if data.is_empty() {
        return Vec::new();
    }

    let mut dict: HashMap<(u16, u8), u16> = HashMap::new();
    let mut next_code = FIRST_CODE;
    let mut width = MIN_WIDTH;
    let mut writer = BitWriter::default();
    let mut current = data[0] as u16;

    for &byte in &data[1..] {
        if let Some(&code) = dict.get(&(current, byte)) {
            current = code;
        } else {
            writer.write(current, width);
            dict.insert((current, byte), next_code);
            next_code += 1;
            if next_code == MAX_TABLE {
                dict.clear();
                next_code = FIRST_CODE;
                width = MIN_WIDTH;
            } else if next_code == 1 << width && width < MAX_WIDTH {
                width += 1;
            }
            current = byte as u16;
        }
    }

    writer.write(current, width);
    writer.finish()
}

pub fn decode(data: &[u8], declared_len: usize) -> CodecResult<Vec<u8>> {
    if declared_len == 0 {
        return Ok(Vec::new());
    }

    // Entries >= 256 reference a prefix code plus one suffix byte.
    let mut prefix = vec![0u16; MAX_TABLE as usize];
    let mut suffix = vec![0u8; MAX_TABLE as usize];
    let mut next_code = FIRST_CODE;
    let mut width = MIN_WIDTH;

    let mut reader = BitReader::new(data);
    let mut out = Vec::with_capacity(declared_len);
    let mut stack = Vec::new();

    let first = reader
        .read(width)
        .ok_or_else(|| CodecError::integrity("LZW stream ended before the first code"))?;
    if first >= FIRST_CODE {
        return Err(CodecError::integrity(format!(
            "initial LZW code {} is not a literal",
            first
        )));
    }
    out.push(first as u8);
    let mut prev = first;
    // Set right after a table reset: the next code is a bare literal again.
    let mut fresh = false;

    while out.len() < declared_len {
        let code = reader.read(width).ok_or_else(|| {
            CodecError::integrity(format!(
                "LZW stream exhausted after {} of {} declared bytes",
                out.len(),
                declared_len
            ))
        })?;

        if fresh {
            if code >= FIRST_CODE {
                return Err(CodecError::integrity(format!(
                    "LZW code {} after table reset is not a literal",
                    code
                )));
            }
            out.push(code as u8);
            prev = code;
            fresh = false;
            continue;
        }

        if code > next_code {
            return Err(CodecError::integrity(format!(
                "LZW code {} references an undefined table entry (next free {})",
                code, next_code
            )));
        }

        stack.clear();
        let mut cur = code;
        if code == next_code {
            // KwKwK: the string is prev + first char of prev.
            let mut head = prev;
            while head >= FIRST_CODE {
                head = prefix[head as usize];
            }
            stack.push(head as u8);
            cur = prev;
        }
        while cur >= FIRST_CODE {
            stack.push(suffix[cur as usize]);
            cur = prefix[cur as usize];
        }
        stack.push(cur as u8);

        let first_byte = *stack.last().unwrap();
        if out.len() + stack.len() > declared_len {
            return Err(CodecError::integrity(format!(
                "LZW decode overruns the declared length {} by {} bytes",
                declared_len,
                out.len() + stack.len() - declared_len
            )));
        }
        out.extend(stack.iter().rev());

        prefix[next_code as usize] = prev;
        suffix[next_code as usize] = first_byte;
        next_code += 1;
        if next_code == MAX_TABLE - 1 {
            // The encoder's table filled one entry ahead of ours.
            next_code = FIRST_CODE;
            width = MIN_WIDTH;
            fresh = true;
        } else if next_code == (1 << width) - 1 && width < MAX_WIDTH {
            width += 1;
        }
        prev = code;
    }

    Ok(out)
}
