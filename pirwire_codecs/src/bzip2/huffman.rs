use pirwire_core::FormatError;

use super::bit_reader::BitReader;

/// Longest code length a block may declare.
pub(crate) const MAX_CODE_LEN: usize = 20;

/// Canonical Huffman decoding table for one coding group.
///
/// Codes are assigned in `(length, symbol)` order, so every length holds a
/// contiguous code range starting at `first_code[len]`; `symbols[len]` lists
/// that range's symbols in code order. Zero-length symbols get no code.
#[derive(Debug)]
pub(crate) struct HuffmanTable {
    first_code: [u32; MAX_CODE_LEN + 1],
    symbols: [Vec<u16>; MAX_CODE_LEN + 1],
    min_len: usize,
    max_len: usize,
}

impl HuffmanTable {
    /// Build the table from per-symbol code lengths (`lengths[symbol]`).
    pub(crate) fn from_lengths(lengths: &[u8]) -> Result<Self, FormatError> {
        let mut symbols: [Vec<u16>; MAX_CODE_LEN + 1] = Default::default();
        for (symbol, &len) in lengths.iter().enumerate() {
            let len = len as usize;
            if len > MAX_CODE_LEN {
                return Err(FormatError::HuffmanLengthOutOfRange(len as i32));
            }
            if len > 0 {
                symbols[len].push(symbol as u16);
            }
        }

        let mut first_code = [0u32; MAX_CODE_LEN + 1];
        let mut code = 0u32;
        let mut min_len = 0;
        let mut max_len = 0;
        for len in 1..=MAX_CODE_LEN {
            first_code[len] = code;
            let count = symbols[len].len() as u32;
            if count > 0 {
                if min_len == 0 {
                    min_len = len;
                }
                max_len = len;
            }
            code = (code + count) << 1;
        }
        if max_len == 0 {
            return Err(FormatError::InvalidHuffmanCode);
        }

        Ok(Self {
            first_code,
            symbols,
            min_len,
            max_len,
        })
    }

    /// Decode one symbol, trying the shortest code lengths first.
    pub(crate) fn decode(&self, bits: &mut BitReader<'_>) -> Result<u16, FormatError> {
        for len in self.min_len..=self.max_len {
            let at_len = &self.symbols[len];
            if at_len.is_empty() {
                continue;
            }
            let code = bits.peek(len as u32)? as u32;
            if let Some(offset) = code.checked_sub(self.first_code[len]) {
                if let Some(&symbol) = at_len.get(offset as usize) {
                    bits.consume(len as u32);
                    return Ok(symbol);
                }
            }
        }
        Err(FormatError::InvalidHuffmanCode)
    }
}
