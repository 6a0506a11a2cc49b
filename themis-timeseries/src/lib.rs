//! The Gorilla time-series codec (L7): delta-of-delta timestamps and
//! XOR'd IEEE-754 values for `(timestamp_ms, f64)` streams.
//!
//! Storage of the resulting byte stream (segmenting, retention, query) is
//! explicitly out of scope here — this crate is the codec only.

mod bits;
mod gorilla;

pub use gorilla::{GorillaDecoder, GorillaEncoder};

/// Encode a full point sequence in one call.
#[must_use]
pub fn encode(points: &[(i64, f64)]) -> Vec<u8> {
    let mut enc = GorillaEncoder::new();
    for &(ts, v) in points {
        enc.add(ts, v);
    }
    enc.finish()
}

/// Decode a full point sequence in one call.
#[must_use]
pub fn decode(bytes: &[u8]) -> Vec<(i64, f64)> {
    GorillaDecoder::new(bytes).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_free_functions_roundtrip() {
        let points: Vec<(i64, f64)> = (0..50).map(|i| (i * 1000, i as f64 * 1.5)).collect();
        let bytes = encode(&points);
        let back = decode(&bytes);
        assert_eq!(points, back);
    }

    #[test]
    fn seed_scenario_mixed_specials_preserve_sign_and_nan() {
        let t0 = 1_700_000_000_000i64;
        let points = [
            (t0, 0.0),
            (t0 + 1, f64::INFINITY),
            (t0 + 2, f64::NEG_INFINITY),
            (t0 + 3, f64::NAN),
            (t0 + 4, 3.14),
        ];
        let bytes = encode(&points);
        let back = decode(&bytes);
        assert_eq!(back.len(), points.len());
        for (got, want) in back.iter().zip(points.iter()) {
            assert_eq!(got.0, want.0);
            assert_eq!(got.1.to_bits(), want.1.to_bits());
        }
        assert!(back[3].1.is_nan());
        assert!(back[1].1.is_infinite() && back[1].1.is_sign_positive());
        assert!(back[2].1.is_infinite() && back[2].1.is_sign_negative());
    }
}
