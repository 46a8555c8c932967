//! Block codec for posting lists: Burrows-Wheeler transform, move-to-front,
//! then an adaptive binary range coder. Delta-encoded posting lists are full
//! of small repeated values, which the BWT groups into long runs the bit
//! coder can model cheaply.
//!
//! The stream layout is `[primary index: u32 LE][range-coded MTF output]`.
//! Decoding requires the exact uncompressed byte length from the enclosing
//! `Compressed` frame.

use anyhow::{bail, Result};

const PROB_BITS: u32 = 11;
const PROB_ONE: u16 = 1 << PROB_BITS;
const PROB_INIT: u16 = PROB_ONE / 2;
const MOVE_BITS: u32 = 5;
const TOP: u32 = 1 << 24;

/// Compress a block. Empty input produces an empty stream.
pub fn compress(input: &[u8]) -> Vec<u8> {
    if input.is_empty() {
        return Vec::new();
    }
    let (last, primary) = forward_bwt(input);
    let ranks = mtf_encode(&last);

    let mut model = ByteModel::new();
    let mut enc = RangeEncoder::new();
    for &r in &ranks {
        model.encode(&mut enc, r);
    }
    let coded = enc.finish();

    let mut out = Vec::with_capacity(4 + coded.len());
    out.extend_from_slice(&(primary as u32).to_le_bytes());
    out.extend_from_slice(&coded);
    out
}

/// Decompress a block of exactly `size` bytes.
pub fn decompress(input: &[u8], size: usize) -> Result<Vec<u8>> {
    if size == 0 {
        return Ok(Vec::new());
    }
    if input.len() < 4 {
        bail!("truncated block: missing primary index");
    }
    let primary = u32::from_le_bytes([input[0], input[1], input[2], input[3]]) as usize;
    if primary >= size {
        bail!("primary index {primary} out of range for block of {size}");
    }

    let mut model = ByteModel::new();
    let mut dec = RangeDecoder::new(&input[4..]);
    let mut ranks = Vec::with_capacity(size);
    for _ in 0..size {
        ranks.push(model.decode(&mut dec));
    }
    let last = mtf_decode(&ranks);
    Ok(inverse_bwt(&last, primary))
}

/// Sort the cyclic rotations of `input` by prefix doubling and return the
/// last column plus the row holding rotation 0.
fn forward_bwt(input: &[u8]) -> (Vec<u8>, usize) {
    let n = input.len();
    let mut sa: Vec<usize> = (0..n).collect();
    let mut rank: Vec<u32> = input.iter().map(|&b| u32::from(b)).collect();
    let mut next_rank = vec![0u32; n];

    let mut k = 1;
    while k < n {
        let key = |i: usize| (rank[i], rank[(i + k) % n]);
        sa.sort_unstable_by_key(|&i| key(i));
        next_rank[sa[0]] = 0;
        for j in 1..n {
            let step = u32::from(key(sa[j]) != key(sa[j - 1]));
            next_rank[sa[j]] = next_rank[sa[j - 1]] + step;
        }
        rank.copy_from_slice(&next_rank);
        if rank[sa[n - 1]] as usize == n - 1 {
            break;
        }
        k <<= 1;
    }

    let mut last = Vec::with_capacity(n);
    let mut primary = 0;
    for (row, &start) in sa.iter().enumerate() {
        last.push(input[(start + n - 1) % n]);
        if start == 0 {
            primary = row;
        }
    }
    (last, primary)
}

fn inverse_bwt(last: &[u8], primary: usize) -> Vec<u8> {
    let n = last.len();
    let mut counts = [0usize; 256];
    for &b in last {
        counts[b as usize] += 1;
    }
    let mut starts = [0usize; 256];
    let mut total = 0;
    for b in 0..256 {
        starts[b] = total;
        total += counts[b];
    }

    // next[i] is the row of row i's left rotation.
    let mut seen = [0usize; 256];
    let mut next = vec![0usize; n];
    for (i, &b) in last.iter().enumerate() {
        next[i] = starts[b as usize] + seen[b as usize];
        seen[b as usize] += 1;
    }

    let mut out = vec![0u8; n];
    let mut row = primary;
    for slot in out.iter_mut().rev() {
        *slot = last[row];
        row = next[row];
    }
    out
}

fn mtf_encode(input: &[u8]) -> Vec<u8> {
    let mut table: Vec<u8> = (0..=255).collect();
    input
        .iter()
        .map(|&b| {
            let idx = table.iter().position(|&t| t == b).expect("byte in table");
            table.remove(idx);
            table.insert(0, b);
            idx as u8
        })
        .collect()
}

fn mtf_decode(ranks: &[u8]) -> Vec<u8> {
    let mut table: Vec<u8> = (0..=255).collect();
    ranks
        .iter()
        .map(|&idx| {
            let b = table.remove(idx as usize);
            table.insert(0, b);
            b
        })
        .collect()
}

/// Carry-less binary range encoder with adaptive probabilities.
struct RangeEncoder {
    low: u64,
    range: u32,
    cache: u8,
    cache_size: u64,
    out: Vec<u8>,
}

impl RangeEncoder {
    fn new() -> Self {
        RangeEncoder {
            low: 0,
            range: u32::MAX,
            cache: 0,
            cache_size: 1,
            out: Vec::new(),
        }
    }

    fn encode_bit(&mut self, prob: &mut u16, bit: u32) {
        let bound = (self.range >> PROB_BITS) * u32::from(*prob);
        if bit == 0 {
            self.range = bound;
            *prob += (PROB_ONE - *prob) >> MOVE_BITS;
        } else {
            self.low += u64::from(bound);
            self.range -= bound;
            *prob -= *prob >> MOVE_BITS;
        }
        while self.range < TOP {
            self.shift_low();
            self.range <<= 8;
        }
    }

    fn shift_low(&mut self) {
        if (self.low as u32) < 0xFF00_0000 || (self.low >> 32) != 0 {
            let carry = (self.low >> 32) as u8;
            let mut byte = self.cache;
            loop {
                self.out.push(byte.wrapping_add(carry));
                byte = 0xFF;
                self.cache_size -= 1;
                if self.cache_size == 0 {
                    break;
                }
            }
            self.cache = (self.low >> 24) as u8;
        }
        self.cache_size += 1;
        self.low = (self.low & 0x00FF_FFFF) << 8;
    }

    fn finish(mut self) -> Vec<u8> {
        for _ in 0..5 {
            self.shift_low();
        }
        self.out
    }
}

struct RangeDecoder<'a> {
    code: u32,
    range: u32,
    input: &'a [u8],
    pos: usize,
}

impl<'a> RangeDecoder<'a> {
    fn new(input: &'a [u8]) -> Self {
        let mut dec = RangeDecoder {
            code: 0,
            range: u32::MAX,
            input,
            pos: 0,
        };
        for _ in 0..5 {
            dec.code = (dec.code << 8) | u32::from(dec.next_byte());
        }
        dec
    }

    fn next_byte(&mut self) -> u8 {
        let byte = self.input.get(self.pos).copied().unwrap_or(0);
        self.pos += 1;
        byte
    }

    fn decode_bit(&mut self, prob: &mut u16) -> u32 {
        let bound = (self.range >> PROB_BITS) * u32::from(*prob);
        let bit;
        if self.code < bound {
            self.range = bound;
            *prob += (PROB_ONE - *prob) >> MOVE_BITS;
            bit = 0;
        } else {
            self.code -= bound;
            self.range -= bound;
            *prob -= *prob >> MOVE_BITS;
            bit = 1;
        }
        while self.range < TOP {
            self.range <<= 8;
            self.code = (self.code << 8) | u32::from(self.next_byte());
        }
        bit
    }
}

/// Bit-tree model over a full byte, most significant bit first.
struct ByteModel {
    probs: [u16; 256],
}

impl ByteModel {
    fn new() -> Self {
        ByteModel {
            probs: [PROB_INIT; 256],
        }
    }

    fn encode(&mut self, enc: &mut RangeEncoder, byte: u8) {
        let mut ctx = 1usize;
        for i in (0..8).rev() {
            let bit = u32::from((byte >> i) & 1);
            enc.encode_bit(&mut self.probs[ctx], bit);
            ctx = (ctx << 1) | bit as usize;
        }
    }

    fn decode(&mut self, dec: &mut RangeDecoder) -> u8 {
        let mut ctx = 1usize;
        for _ in 0..8 {
            let bit = dec.decode_bit(&mut self.probs[ctx]);
            ctx = (ctx << 1) | bit as usize;
        }
        (ctx & 0xFF) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(input: &[u8]) {
        let packed = compress(input);
        let unpacked = decompress(&packed, input.len()).unwrap();
        assert_eq!(unpacked, input);
    }

    #[test]
    fn empty_block() {
        assert!(compress(&[]).is_empty());
        assert_eq!(decompress(&[], 0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn tiny_blocks() {
        round_trip(b"a");
        round_trip(b"ab");
        round_trip(b"banana");
        round_trip(b"aaaaaaaa");
        round_trip(b"abababab");
    }

    #[test]
    fn text_block() {
        round_trip(b"the quick brown fox jumps over the lazy dog, repeatedly, \
                     the quick brown fox jumps over the lazy dog");
    }

    #[test]
    fn binary_block() {
        // Deterministic pseudo-random bytes, all values represented.
        let mut state = 0x2545_f491u32;
        let mut data = Vec::with_capacity(4096);
        for _ in 0..4096 {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            data.push((state >> 24) as u8);
        }
        round_trip(&data);
    }

    #[test]
    fn delta_shaped_block() {
        // The shape posting lists actually have: long runs of small deltas.
        let mut data = Vec::new();
        for i in 0u32..512 {
            data.extend_from_slice(&(1 + (i % 3)).to_le_bytes());
        }
        round_trip(&data);
    }

    #[test]
    fn rejects_bad_primary() {
        let packed = compress(b"hello");
        let mut bad = packed.clone();
        bad[0] = 0xFF;
        bad[1] = 0xFF;
        assert!(decompress(&bad, 5).is_err());
    }

    #[test]
    fn rejects_truncated_stream() {
        assert!(decompress(&[0, 0], 5).is_err());
    }
}
