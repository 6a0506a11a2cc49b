//! Gorilla-style (timestamp_ms, f64) stream codec (L7).
//!
//! Grounded byte-for-byte in `original_source/src/timeseries/gorilla.cpp`:
//! the first point is written as a full zigzag-varint timestamp plus 64
//! raw value bits; every later point writes a byte-aligned zigzag
//! delta-of-delta timestamp, then either a single `0` control bit (value
//! unchanged) or a `1` bit followed by a 6-bit leading-zero count, a
//! 6-bit significant-bit count (0 means 64), and that many XOR payload
//! bits.

use crate::bits::{BitReader, BitWriter};

/// Appends `(timestamp_ms, value)` points and produces the packed byte
/// stream. Not reusable after [`GorillaEncoder::finish`].
pub struct GorillaEncoder {
    first: bool,
    prev_ts: i64,
    prev_dt: i64,
    prev_vbits: u64,
    bw: BitWriter,
}

impl Default for GorillaEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl GorillaEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            first: true,
            prev_ts: 0,
            prev_dt: 0,
            prev_vbits: 0,
            bw: BitWriter::new(),
        }
    }

    pub fn add(&mut self, timestamp_ms: i64, value: f64) {
        if self.first {
            self.bw.write_zigzag64(timestamp_ms);
            self.bw.write_bits(value.to_bits(), 64);
            self.prev_ts = timestamp_ms;
            self.prev_dt = 0;
            self.prev_vbits = value.to_bits();
            self.first = false;
            return;
        }

        self.bw.align_to_byte();
        let dt = timestamp_ms - self.prev_ts;
        let dod = dt - self.prev_dt;
        self.bw.write_zigzag64(dod);
        self.prev_ts = timestamp_ms;
        self.prev_dt = dt;

        let vbits = value.to_bits();
        let xorv = vbits ^ self.prev_vbits;

        if xorv == 0 {
            self.bw.write_bit(false);
        } else {
            self.bw.write_bit(true);
            let leading = xorv.leading_zeros();
            let trailing = xorv.trailing_zeros();
            let significant = 64 - leading - trailing;
            self.bw.write_bits(u64::from(leading), 6);
            self.bw.write_bits(u64::from(significant & 63), 6);
            self.bw.write_bits(xorv >> trailing, significant);
        }
        self.prev_vbits = vbits;
    }

    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.bw.finish()
    }
}

/// Decodes a byte stream produced by [`GorillaEncoder`] one point at a time.
pub struct GorillaDecoder<'a> {
    first: bool,
    prev_ts: i64,
    prev_dt: i64,
    prev_vbits: u64,
    br: BitReader<'a>,
}

impl<'a> GorillaDecoder<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            first: true,
            prev_ts: 0,
            prev_dt: 0,
            prev_vbits: 0,
            br: BitReader::new(data),
        }
    }

    /// Returns the next `(timestamp_ms, value)` pair, or `None` once the
    /// stream is exhausted.
    pub fn next_point(&mut self) -> Option<(i64, f64)> {
        if self.first {
            if self.br.eof() {
                return None;
            }
            self.br.align_to_byte();
            if self.br.eof() {
                return None;
            }
            let ts = self.br.read_zigzag64();
            let vbits = self.br.read_bits(64);
            self.prev_ts = ts;
            self.prev_dt = 0;
            self.prev_vbits = vbits;
            self.first = false;
            return Some((ts, f64::from_bits(vbits)));
        }

        self.br.align_to_byte();
        if self.br.eof() {
            return None;
        }

        let dod = self.br.read_zigzag64();
        let dt = self.prev_dt + dod;
        let ts = self.prev_ts + dt;
        self.prev_dt = dt;
        self.prev_ts = ts;

        if self.br.eof() {
            return None;
        }
        let different = self.br.read_bit();

        let vbits = if different {
            let leading = self.br.read_bits(6) as u32;
            let mut significant = self.br.read_bits(6) as u32;
            if significant == 0 {
                significant = 64;
            }
            let payload = self.br.read_bits(significant);
            let trailing = 64 - leading - significant;
            self.prev_vbits ^ (payload << trailing)
        } else {
            self.prev_vbits
        };

        self.prev_vbits = vbits;
        Some((ts, f64::from_bits(vbits)))
    }
}

impl<'a> Iterator for GorillaDecoder<'a> {
    type Item = (i64, f64);

    fn next(&mut self) -> Option<Self::Item> {
        self.next_point()
    }
}
