//! Constant-time byte comparison for signature/MAC verification, where a
//! data-dependent branch on mismatch position would leak timing
//! information to an attacker probing signatures.

use subtle::ConstantTimeEq;

/// Compares `a` and `b` in constant time. The length check short-circuits
/// (lengths aren't secret) but equal-length content is compared without
/// early exit.
#[must_use]
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_slices_match() {
        assert!(ct_eq(b"secret_value", b"secret_value"));
    }

    #[test]
    fn differing_content_does_not_match() {
        assert!(!ct_eq(b"secret_value_1", b"secret_value_2"));
    }

    #[test]
    fn differing_length_does_not_match() {
        assert!(!ct_eq(b"short", b"longer_value"));
    }
}
