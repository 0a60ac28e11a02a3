//! Little-endian byte cursor over an immutable buffer.
//!
//! # Invariants
//! - The cursor never mutates or aliases the underlying buffer; it only
//!   advances a position index.
//! - Every read is bounds-checked; running past the end yields a typed
//!   `ShortRead` instead of a panic.
//!
//! # Design Notes
//! - All multi-byte fields in the trace format are little-endian; doubles are
//!   IEEE-754 64-bit.
//! - `read_payload` treats the declared capacity as untrusted: it only feeds
//!   the shortfall check, never an allocation. Allocating from a header field
//!   would let a crafted header force a huge or overflowing allocation.

use std::fmt;

/// A read ran past the end of the buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShortRead {
    /// Bytes the failed read required.
    pub needed: usize,
    /// Bytes that were actually left.
    pub remaining: usize,
}

impl fmt::Display for ShortRead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "short read: needed {} bytes, {} remaining",
            self.needed, self.remaining
        )
    }
}

impl std::error::Error for ShortRead {}

/// Position-indexed reader over a byte slice.
#[derive(Clone, Debug)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    #[must_use]
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current offset from the start of the buffer.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Takes the next `len` bytes as a subslice.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ShortRead> {
        if self.remaining() < len {
            return Err(ShortRead {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    /// Advances past `len` bytes without inspecting them.
    pub fn skip(&mut self, len: usize) -> Result<(), ShortRead> {
        self.read_bytes(len).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8, ShortRead> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ShortRead> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, ShortRead> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64, ShortRead> {
        let b = self.read_bytes(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn read_f64(&mut self) -> Result<f64, ShortRead> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Reads a NUL-terminated byte string, consuming the terminator.
    ///
    /// A missing terminator is reported as a short read spanning the rest of
    /// the buffer.
    pub fn read_until_nul(&mut self) -> Result<&'a [u8], ShortRead> {
        let rest = &self.buf[self.pos..];
        match memchr::memchr(0, rest) {
            Some(end) => {
                let out = &rest[..end];
                self.pos += end + 1;
                Ok(out)
            }
            None => Err(ShortRead {
                needed: rest.len() + 1,
                remaining: rest.len(),
            }),
        }
    }

    /// Bulk-reads the remainder of the buffer into an owned payload vector.
    ///
    /// `capacity` is the writer-declared payload size and includes a `slack`
    /// allowance the writer may leave unfilled, so the remainder is allowed
    /// to fall short of `capacity` by up to `slack` bytes. Fewer bytes than
    /// that is a truncated payload. More bytes than `capacity` are consumed
    /// as well; trailing overrun is the writer's slack spilling over and is
    /// tolerated.
    ///
    /// `capacity` comes from untrusted header fields and is used only for
    /// the shortfall check; the allocation is bounded by the bytes actually
    /// present.
    pub fn read_payload(&mut self, capacity: usize, slack: usize) -> Result<Vec<u8>, ShortRead> {
        let needed = capacity.saturating_sub(slack);
        let avail = self.remaining();
        if avail < needed {
            return Err(ShortRead {
                needed,
                remaining: avail,
            });
        }
        let out = self.buf[self.pos..].to_vec();
        self.pos = self.buf.len();
        Ok(out)
    }
}
