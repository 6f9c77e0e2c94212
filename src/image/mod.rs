//! Flat serialized-image primitives.
//!
//! The whole dictionary lives in one little-endian byte buffer: a fixed
//! header followed by self-describing sections. Everything here is
//! byte-aligned so a memory-mapped file can be queried exactly as written,
//! with no unpacking step between disk bytes and the query engine.

use crate::{Error, NodeOrder, Result};

/// Magic constant opening every serialized dictionary.
pub const MAGIC: [u8; 8] = *b"STATTRIE";

/// Current image format version.
pub const FORMAT_VERSION: u32 = 1;

/// Append a `u32`, little-endian.
#[inline]
pub fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Append a `u64`, little-endian.
#[inline]
pub fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Read a `u32` at `off`. Caller guarantees bounds (sections are validated
/// once when an image is opened).
#[inline]
pub fn get_u32(data: &[u8], off: usize) -> u32 {
    u32::from_le_bytes(data[off..off + 4].try_into().unwrap())
}

/// Read a `u64` at `off`. Caller guarantees bounds.
#[inline]
pub fn get_u64(data: &[u8], off: usize) -> u64 {
    u64::from_le_bytes(data[off..off + 8].try_into().unwrap())
}

/// Bounds-checked sequential reader used while locating sections in an
/// untrusted image. Every overrun surfaces as [`Error::Format`].
#[derive(Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Start reading at the front of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset into the image.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Bytes left after the current position.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Advance past `n` bytes without interpreting them.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        if self.remaining() < n {
            return Err(Error::Format("truncated image"));
        }
        self.pos += n;
        Ok(())
    }

    /// Read the next `n` bytes.
    pub fn get_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::Format("truncated image"));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Read a little-endian `u32`.
    pub fn get_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.get_bytes(4)?.try_into().unwrap()))
    }

    /// Read a little-endian `u64`.
    pub fn get_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.get_bytes(8)?.try_into().unwrap()))
    }
}

/// Fixed-size image header: magic, version, level count, key count and the
/// child-ordering mode the dictionary was built with.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    /// Number of trie levels actually stored (>= 1).
    pub num_tries: u32,
    /// Number of keys in the dictionary.
    pub num_keys: u32,
    /// Child ordering the dictionary was built with.
    pub order: NodeOrder,
}

impl Header {
    /// Serialized header size in bytes.
    pub const SIZE: usize = 8 + 4 + 4 + 4 + 4;

    /// Append the header to `out`.
    pub fn write_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&MAGIC);
        put_u32(out, FORMAT_VERSION);
        put_u32(out, self.num_tries);
        put_u32(out, self.num_keys);
        put_u32(
            out,
            match self.order {
                NodeOrder::Label => 0,
                NodeOrder::Weight => 1,
            },
        );
    }

    /// Parse and validate a header at the reader's position.
    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        let magic = r.get_bytes(8).map_err(|_| Error::Format("image too short"))?;
        if magic != MAGIC {
            return Err(Error::Format("bad magic"));
        }
        let version = r.get_u32()?;
        if version != FORMAT_VERSION {
            return Err(Error::Format("unsupported format version"));
        }
        let num_tries = r.get_u32()?;
        if num_tries == 0 || num_tries as usize > crate::MAX_NUM_TRIES {
            return Err(Error::Format("level count out of range"));
        }
        let num_keys = r.get_u32()?;
        let order = match r.get_u32()? {
            0 => NodeOrder::Label,
            1 => NodeOrder::Weight,
            _ => return Err(Error::Format("unknown node order")),
        };
        Ok(Self {
            num_tries,
            num_keys,
            order,
        })
    }
}

/// Location of a length-prefixed raw byte section.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteSection {
    off: usize,
    len: usize,
}

impl ByteSection {
    /// Append `bytes` as a section.
    pub fn write_into(out: &mut Vec<u8>, bytes: &[u8]) {
        put_u64(out, bytes.len() as u64);
        out.extend_from_slice(bytes);
    }

    /// Parse a byte section at the reader's position.
    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        let len = r.get_u64()? as usize;
        let off = r.pos();
        r.skip(len)?;
        Ok(Self { off, len })
    }

    /// Section length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the section is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Borrow the section from its image.
    pub fn slice<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.off..self.off + self.len]
    }
}

/// Location of a length-prefixed array of little-endian `u32` values.
#[derive(Debug, Clone, Copy, Default)]
pub struct U32Section {
    off: usize,
    len: usize,
}

impl U32Section {
    /// Append `values` as a section.
    pub fn write_into(out: &mut Vec<u8>, values: &[u32]) {
        put_u64(out, values.len() as u64);
        for &v in values {
            put_u32(out, v);
        }
    }

    /// Parse a `u32` array section at the reader's position.
    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        let len = r.get_u64()? as usize;
        let off = r.pos();
        r.skip(len.checked_mul(4).ok_or(Error::Format("section too large"))?)?;
        Ok(Self { off, len })
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the array is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Value at `i`. Caller guarantees `i < len` (validated at open time).
    #[inline]
    pub fn get(&self, data: &[u8], i: usize) -> u32 {
        get_u32(data, self.off + i * 4)
    }
}
