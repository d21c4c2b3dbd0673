use pirwire_core::FormatError;

/// MSB-first bit reader over an in-memory stream.
///
/// Bits are pulled into a 64-bit accumulator a byte at a time, so any read
/// of up to 56 bits is served in one step.
pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    acc: u64,
    /// Valid low bits of `acc`.
    avail: u32,
}

impl<'a> BitReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            acc: 0,
            avail: 0,
        }
    }

    fn refill(&mut self, n: u32) -> Result<(), FormatError> {
        debug_assert!(n <= 56);
        while self.avail < n {
            let &byte = self.data.get(self.pos).ok_or(FormatError::Truncated)?;
            self.acc = (self.acc << 8) | byte as u64;
            self.pos += 1;
            self.avail += 8;
        }
        Ok(())
    }

    /// The next `n` bits without consuming them.
    pub(crate) fn peek(&mut self, n: u32) -> Result<u64, FormatError> {
        self.refill(n)?;
        Ok((self.acc >> (self.avail - n)) & mask(n))
    }

    /// Drop `n` bits that a prior [`peek`](Self::peek) made available.
    pub(crate) fn consume(&mut self, n: u32) {
        debug_assert!(n <= self.avail);
        self.avail -= n;
    }

    pub(crate) fn read(&mut self, n: u32) -> Result<u64, FormatError> {
        let value = self.peek(n)?;
        self.consume(n);
        Ok(value)
    }

    pub(crate) fn read_bit(&mut self) -> Result<bool, FormatError> {
        Ok(self.read(1)? == 1)
    }

    /// Skip the padding bits up to the next byte boundary.
    pub(crate) fn align_to_byte(&mut self) {
        self.avail -= self.avail % 8;
    }

    /// Whole input bytes consumed so far, counting a partly read byte.
    pub(crate) fn bytes_consumed(&self) -> usize {
        self.pos - (self.avail / 8) as usize
    }
}

#[inline]
fn mask(n: u32) -> u64 {
    if n >= 64 {
        u64::MAX
    } else {
        (1u64 << n) - 1
    }
}
