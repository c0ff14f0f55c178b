//! Cursor-based byte stream reader used by the instruction decoder.
//!
//! [`Parser`] wraps an immutable byte slice and a read position. Every opcode handler
//! consults its bounds queries ([`Parser::can_read_byte`], [`Parser::can_read_u16`],
//! [`Parser::can_read`]) or uses the checked `read_*` methods, so a truncated instruction
//! always surfaces as an error instead of a panic. The block builder moves the cursor
//! between instruction addresses with [`Parser::seek`].
//!
//! # Examples
//!
//! ```rust
//! use x86scope::Parser;
//!
//! let data = [0xB8, 0x05, 0x00, 0x00, 0x00];
//! let mut parser = Parser::new(&data);
//!
//! assert_eq!(parser.read_le::<u8>()?, 0xB8);
//! assert!(parser.can_read(4));
//! assert_eq!(parser.peek_le::<u32>()?, 5);
//! assert_eq!(parser.pos(), 1);
//!
//! parser.seek(0)?;
//! assert_eq!(parser.peek_byte()?, 0xB8);
//! # Ok::<(), x86scope::Error>(())
//! ```

use crate::{
    stream::io::{read_le_at, ByteIO},
    Result,
};

/// A bounds-checked cursor over an immutable byte buffer.
///
/// The parser never owns the data; one buffer can back any number of parsers, which is
/// what allows several functions of the same image to be analysed concurrently.
#[derive(Debug, Clone)]
pub struct Parser<'a> {
    /// The binary data being parsed
    data: &'a [u8],
    /// Current position within the data buffer
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new [`Parser`] from a byte slice, positioned at offset 0.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns the length of the underlying data buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the parser has no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if there is more data available to parse.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Returns the number of bytes between the cursor and the end of the buffer.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Returns `true` if at least one more byte can be read.
    #[must_use]
    pub fn can_read_byte(&self) -> bool {
        self.can_read(1)
    }

    /// Returns `true` if a 16-bit value can be read.
    #[must_use]
    pub fn can_read_u16(&self) -> bool {
        self.can_read(2)
    }

    /// Returns `true` if `count` more bytes can be read.
    #[must_use]
    pub fn can_read(&self, count: usize) -> bool {
        self.remaining() >= count
    }

    /// Move the current position to the specified index.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if position is beyond the data length.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos >= self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = pos;
        Ok(())
    }

    /// Move the position forward by the specified number of bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if advancing by step would exceed the data length.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        if !self.can_read(step) {
            return Err(out_of_bounds_error!());
        }

        self.position += step;
        Ok(())
    }

    /// Get the current position of the parser within the data buffer.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Get access to the underlying data buffer.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Peek at the next byte without advancing the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if position is at or beyond the data length.
    pub fn peek_byte(&self) -> Result<u8> {
        self.peek_byte_at(0)
    }

    /// Peek at the byte `ahead` positions after the cursor without advancing.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if that byte is not part of the buffer.
    pub fn peek_byte_at(&self, ahead: usize) -> Result<u8> {
        self.position
            .checked_add(ahead)
            .and_then(|index| self.data.get(index))
            .copied()
            .ok_or(out_of_bounds_error!())
    }

    /// Peek at a value of type `T` in little-endian format without advancing the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading `T` would exceed the data length.
    pub fn peek_le<T: ByteIO>(&self) -> Result<T> {
        let mut temp_position = self.position;
        read_le_at::<T>(self.data, &mut temp_position)
    }

    /// Execute a closure transactionally, rolling back on failure.
    ///
    /// The position change made by `f` is only kept if it returns `Ok`. The decoder uses
    /// this so that a failed decode never leaves the cursor in the middle of an instruction.
    ///
    /// # Errors
    /// Returns any error produced by the closure `f`.
    pub fn transactional<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let saved_position = self.position;
        let result = f(self);
        if result.is_err() {
            self.position = saved_position;
        }
        result
    }

    /// Read a type `T` from the current position in little-endian format and advance the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the data length.
    pub fn read_le<T: ByteIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn bounds_queries() {
        let data = [0x01, 0x02, 0x03];
        let mut parser = Parser::new(&data);

        assert!(parser.can_read_byte());
        assert!(parser.can_read_u16());
        assert!(parser.can_read(3));
        assert!(!parser.can_read(4));

        parser.advance_by(2).unwrap();
        assert!(parser.can_read_byte());
        assert!(!parser.can_read_u16());
        assert_eq!(parser.remaining(), 1);

        parser.advance_by(1).unwrap();
        assert!(!parser.can_read_byte());
        assert!(!parser.has_more_data());
    }

    #[test]
    fn peek_does_not_consume() {
        let data = [0x8B, 0x45, 0xFC];
        let parser = Parser::new(&data);

        assert_eq!(parser.peek_byte().unwrap(), 0x8B);
        assert_eq!(parser.peek_byte_at(2).unwrap(), 0xFC);
        assert!(matches!(parser.peek_byte_at(3), Err(Error::OutOfBounds)));
        assert_eq!(parser.pos(), 0);
    }

    #[test]
    fn seek_bounds() {
        let data = [0x90, 0x90];
        let mut parser = Parser::new(&data);

        parser.seek(1).unwrap();
        assert_eq!(parser.pos(), 1);
        assert!(parser.seek(2).is_err());
        assert_eq!(parser.pos(), 1);
    }

    #[test]
    fn transactional_rollback() {
        let data = [0x01, 0x02, 0x03];
        let mut parser = Parser::new(&data);

        let result: Result<u32> = parser.transactional(|p| {
            p.read_le::<u8>()?;
            p.read_le::<u32>()
        });
        assert!(result.is_err());
        assert_eq!(parser.pos(), 0);

        let value: u16 = parser.transactional(|p| p.read_le()).unwrap();
        assert_eq!(value, 0x0201);
        assert_eq!(parser.pos(), 2);
    }

    #[test]
    fn empty_parser() {
        let parser = Parser::new(&[]);

        assert!(parser.is_empty());
        assert!(!parser.can_read_byte());
        assert!(matches!(parser.peek_byte(), Err(Error::OutOfBounds)));
    }
}
