//! Decoder for block-sorted, Huffman-coded streams (the `.bz2` format).
//!
//! Stream layout, all fields MSB-first:
//!
//! ```text
//! "BZ" | 'h' | digit '1'..'9'
//! ( tag:48 = 0x314159265359 | block_crc:32 | block )*
//! tag:48 = 0x177245385090 | stream_crc:32 | pad to byte
//! ```
//!
//! Each block is undone in reverse order of encoding: Huffman symbols,
//! zero-run and move-to-front decoding, inverse BWT, then expansion of the
//! initial 4-byte run-length pass.

mod bit_reader;
mod bwt;
mod crc;
mod huffman;
mod mtf;

use pirwire_core::codec::{Codec, DecodeOptions};
use pirwire_core::format::{
    StreamHeader, BLOCK_TAG_COMPRESSED, BLOCK_TAG_END_OF_STREAM, CODEC_BZIP2, STREAM_HEADER_SIZE,
};
use pirwire_core::{Error, FormatError, Result};
use tracing::{debug, trace};

use bit_reader::BitReader;
use huffman::{HuffmanTable, MAX_CODE_LEN};
use mtf::MoveToFront;

const MIN_GROUPS: u8 = 2;
const MAX_GROUPS: u8 = 6;

/// Symbols decoded with one Huffman group before the next selector applies.
const SYMBOLS_PER_GROUP: usize = 50;

/// The two zero-run symbols; every other symbol is an MTF index plus one.
const RUN_A: usize = 0;
const RUN_B: usize = 1;

/// Decode a complete stream.
///
/// With `check_crc`, every block CRC and the combined stream CRC are
/// verified. Bytes after the end-of-stream padding are ignored.
pub fn decompress(input: &[u8], check_crc: bool) -> Result<Vec<u8>> {
    let mut decoder = Bzip2Decoder::new(input, check_crc)?;
    let mut out = Vec::with_capacity(input.len().saturating_mul(4));
    while decoder.next_block(&mut out)?.is_some() {}
    Ok(out)
}

/// What one decoded block looked like on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSummary {
    pub index: usize,
    pub stored_crc: u32,
    pub primary_index: usize,
    pub symbols_in_use: usize,
    pub huffman_groups: usize,
    pub selectors: usize,
    /// Bytes in the block after Huffman/MTF decoding, before the inverse BWT.
    pub bwt_len: usize,
    /// Bytes the block contributed to the output.
    pub output_len: usize,
}

/// Block-at-a-time decoder. [`decompress`] drives it to completion; the CLI
/// uses it directly to report per-block structure.
pub struct Bzip2Decoder<'a> {
    bits: BitReader<'a>,
    header: StreamHeader,
    check_crc: bool,
    stream_crc: u32,
    blocks: usize,
    finished: bool,
}

impl<'a> Bzip2Decoder<'a> {
    /// Validate the stream header and position the decoder at the first block.
    pub fn new(input: &'a [u8], check_crc: bool) -> Result<Self> {
        if input.len() < STREAM_HEADER_SIZE {
            return Err(FormatError::Truncated.into());
        }
        let mut bits = BitReader::new(input);
        let magic = bits.read(16)? as u16;
        let method = bits.read(8)? as u8;
        let digit = bits.read(8)? as u8;
        let header = StreamHeader::from_fields(magic, method, digit)?;
        trace!(level = header.level, max_block_len = header.max_block_len(), "stream header");

        Ok(Self {
            bits,
            header,
            check_crc,
            stream_crc: 0,
            blocks: 0,
            finished: false,
        })
    }

    pub fn header(&self) -> StreamHeader {
        self.header
    }

    /// Combined CRC of the blocks decoded so far.
    pub fn stream_crc(&self) -> u32 {
        self.stream_crc
    }

    /// Input bytes consumed so far. After the end-of-stream marker this is
    /// the length of the stream, padding included.
    pub fn bytes_consumed(&self) -> usize {
        self.bits.bytes_consumed()
    }

    /// Decode the next block, appending its bytes to `out`.
    ///
    /// Returns `Ok(None)` once the end-of-stream marker has been read. On
    /// error, `out` may hold a partial block and must be discarded.
    pub fn next_block(&mut self, out: &mut Vec<u8>) -> Result<Option<BlockSummary>> {
        if self.finished {
            return Ok(None);
        }

        let tag = self.bits.read(48)?;
        let stored_crc = self.bits.read(32)? as u32;
        match tag {
            BLOCK_TAG_COMPRESSED => self.read_block(stored_crc, out).map(Some),
            BLOCK_TAG_END_OF_STREAM => {
                if self.check_crc && stored_crc != self.stream_crc {
                    return Err(Error::Integrity {
                        expected: stored_crc,
                        actual: self.stream_crc,
                    });
                }
                self.bits.align_to_byte();
                self.finished = true;
                debug!(blocks = self.blocks, stream_crc = stored_crc, "end of stream");
                Ok(None)
            }
            other => Err(FormatError::BadBlockTag(other).into()),
        }
    }

    fn read_block(&mut self, stored_crc: u32, out: &mut Vec<u8>) -> Result<BlockSummary> {
        let bits = &mut self.bits;
        if bits.read_bit()? {
            return Err(FormatError::Randomized.into());
        }
        let primary_index = bits.read(24)? as usize;

        let used = read_symbol_map(bits)?;
        if used.is_empty() {
            return Err(FormatError::EmptyBlock.into());
        }
        let symbols_in_use = used.len();

        let groups = bits.read(3)? as u8;
        if !(MIN_GROUPS..=MAX_GROUPS).contains(&groups) {
            return Err(FormatError::BadGroupCount(groups).into());
        }
        let selector_count = bits.read(15)? as usize;
        if selector_count == 0 {
            return Err(FormatError::NoSelectors.into());
        }
        let selectors = read_selectors(bits, groups as usize, selector_count)?;

        let alphabet = symbols_in_use + 2;
        let tables = (0..groups)
            .map(|_| read_code_lengths(bits, alphabet).and_then(|lengths| HuffmanTable::from_lengths(&lengths)))
            .collect::<Result<Vec<_>, FormatError>>()?;

        let bwt = decode_symbols(bits, &tables, &selectors, used, self.header.max_block_len())?;
        let plain = bwt::inverse(&bwt, primary_index)?;

        let start = out.len();
        expand_runs(&plain, out);
        let block = &out[start..];

        let actual = crc::checksum(block);
        if self.check_crc && actual != stored_crc {
            return Err(Error::Integrity {
                expected: stored_crc,
                actual,
            });
        }
        self.stream_crc = crc::combine(self.stream_crc, actual);

        let summary = BlockSummary {
            index: self.blocks,
            stored_crc,
            primary_index,
            symbols_in_use,
            huffman_groups: groups as usize,
            selectors: selector_count,
            bwt_len: bwt.len(),
            output_len: block.len(),
        };
        self.blocks += 1;
        debug!(
            block = summary.index,
            bwt_len = summary.bwt_len,
            output_len = summary.output_len,
            groups = summary.huffman_groups,
            "decoded block"
        );
        Ok(summary)
    }
}

/// Byte values present in the block, in ascending order.
///
/// A 16-bit mask says which 16-value ranges occur; each set range is followed
/// by its own 16-bit mask.
fn read_symbol_map(bits: &mut BitReader<'_>) -> Result<Vec<u8>, FormatError> {
    let ranges = bits.read(16)?;
    let mut used = Vec::with_capacity(256);
    for range in 0..16u16 {
        if ranges & (0x8000 >> range) == 0 {
            continue;
        }
        let values = bits.read(16)?;
        for low in 0..16u16 {
            if values & (0x8000 >> low) != 0 {
                used.push((range * 16 + low) as u8);
            }
        }
    }
    Ok(used)
}

/// Selectors are unary-coded MTF indices into the group list.
fn read_selectors(bits: &mut BitReader<'_>, groups: usize, count: usize) -> Result<Vec<u8>, FormatError> {
    let mut order = MoveToFront::new((0..groups as u8).collect());
    let mut selectors = Vec::with_capacity(count);
    for _ in 0..count {
        let mut index = 0;
        while bits.read_bit()? {
            index += 1;
            if index >= groups {
                return Err(FormatError::MtfOutOfRange { index, groups });
            }
        }
        let group = order
            .promote(index)
            .ok_or(FormatError::MtfOutOfRange { index, groups })?;
        selectors.push(group);
    }
    Ok(selectors)
}

/// Delta-coded code lengths: a 5-bit start, then per symbol a run of
/// `1x` pairs (x=0 lengthens, x=1 shortens) closed by a `0`.
fn read_code_lengths(bits: &mut BitReader<'_>, alphabet: usize) -> Result<Vec<u8>, FormatError> {
    let max = MAX_CODE_LEN as i32;
    let mut len = bits.read(5)? as i32;
    let mut lengths = Vec::with_capacity(alphabet);
    for _ in 0..alphabet {
        if !(0..=max).contains(&len) {
            return Err(FormatError::HuffmanLengthOutOfRange(len));
        }
        while bits.read_bit()? {
            len += if bits.read_bit()? { -1 } else { 1 };
            if !(0..=max).contains(&len) {
                return Err(FormatError::HuffmanLengthOutOfRange(len));
            }
        }
        lengths.push(len as u8);
    }
    Ok(lengths)
}

/// Decode the symbol stream into the BWT buffer.
///
/// RUN_A/RUN_B spell a bijective base-2 repeat count for the byte at the
/// front of the MTF list; any other symbol flushes the pending run and
/// either ends the block or promotes MTF entry `symbol - 1`.
fn decode_symbols(
    bits: &mut BitReader<'_>,
    tables: &[HuffmanTable],
    selectors: &[u8],
    used: Vec<u8>,
    limit: usize,
) -> Result<Vec<u8>, FormatError> {
    let end_of_block = used.len() + 1;
    let mut favourites = MoveToFront::new(used);
    let mut selectors = selectors.iter();

    let mut out = Vec::new();
    let mut table = &tables[0];
    let mut left = 0;
    let mut run = 0usize;
    let mut run_weight = 1usize;

    loop {
        if left == 0 {
            let &group = selectors.next().ok_or(FormatError::SelectorsExhausted)?;
            table = &tables[group as usize];
            left = SYMBOLS_PER_GROUP;
        }
        left -= 1;

        let symbol = table.decode(bits)? as usize;
        if symbol == RUN_A || symbol == RUN_B {
            run += run_weight << symbol;
            run_weight <<= 1;
            if run > limit {
                return Err(FormatError::BlockTooLarge { limit });
            }
            continue;
        }

        if run > 0 {
            if out.len() + run > limit {
                return Err(FormatError::BlockTooLarge { limit });
            }
            let byte = favourites.front().ok_or(FormatError::EmptyBlock)?;
            out.resize(out.len() + run, byte);
            run = 0;
            run_weight = 1;
        }

        if symbol == end_of_block {
            break;
        }
        if out.len() >= limit {
            return Err(FormatError::BlockTooLarge { limit });
        }
        let byte = favourites
            .promote(symbol - 1)
            .ok_or(FormatError::InvalidHuffmanCode)?;
        out.push(byte);
    }

    if out.is_empty() {
        return Err(FormatError::EmptyBlock);
    }
    Ok(out)
}

/// Undo the initial run-length pass: four equal bytes are followed by a
/// count of further repeats.
fn expand_runs(input: &[u8], out: &mut Vec<u8>) {
    let mut i = 0;
    while i < input.len() {
        let b = input[i];
        if i + 4 < input.len() && input[i + 1..i + 4].iter().all(|&x| x == b) {
            let extra = input[i + 4] as usize;
            out.resize(out.len() + 4 + extra, b);
            i += 5;
        } else {
            out.push(b);
            i += 1;
        }
    }
}

/// [`Codec`] adapter over [`decompress`].
pub struct Bzip2Codec;

impl Codec for Bzip2Codec {
    fn id(&self) -> u16 {
        CODEC_BZIP2
    }

    fn name(&self) -> &'static str {
        "bzip2"
    }

    fn decompress(&self, compressed: &[u8], opts: DecodeOptions) -> Result<Vec<u8>> {
        decompress(compressed, opts.check_crc)
    }
}
