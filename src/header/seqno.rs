//! Circular arithmetic on 48-bit sequence numbers.

use crate::core::{SEQNO_BITS, SEQNO_MAX};

const HALF: u64 = 1 << (SEQNO_BITS - 1);

/// Add a signed offset to a sequence number, wrapping at 2^48.
pub fn seq_add(seqno: u64, delta: i64) -> u64 {
    (seqno as i64).wrapping_add(delta) as u64 & SEQNO_MAX
}

/// Signed circular distance from `from` to `to`.
///
/// Positive when `to` comes after `from`, in `(-2^47, 2^47]`.
pub fn seq_dist(from: u64, to: u64) -> i64 {
    let d = to.wrapping_sub(from) & SEQNO_MAX;
    if d > HALF {
        d as i64 - (SEQNO_MAX as i64 + 1)
    } else {
        d as i64
    }
}

/// Circular maximum.
pub fn seq_max(a: u64, b: u64) -> u64 {
    if seq_dist(a, b) > 0 { b } else { a }
}

/// Check `lo <= seqno <= hi` circularly.
pub fn seq_in_window(seqno: u64, lo: u64, hi: u64) -> bool {
    seq_dist(lo, seqno) >= 0 && seq_dist(seqno, hi) >= 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_add_wraps() {
        assert_eq!(seq_add(SEQNO_MAX, 1), 0);
        assert_eq!(seq_add(0, -1), SEQNO_MAX);
        assert_eq!(seq_add(10, 5), 15);
    }

    #[test]
    fn test_seq_dist() {
        assert_eq!(seq_dist(10, 15), 5);
        assert_eq!(seq_dist(15, 10), -5);
        assert_eq!(seq_dist(SEQNO_MAX, 2), 3);
        assert_eq!(seq_dist(2, SEQNO_MAX), -3);
    }

    #[test]
    fn test_seq_max() {
        assert_eq!(seq_max(3, 9), 9);
        assert_eq!(seq_max(SEQNO_MAX - 1, 1), 1);
    }

    #[test]
    fn test_seq_in_window_across_wrap() {
        let lo = SEQNO_MAX - 10;
        let hi = 20;
        assert!(seq_in_window(SEQNO_MAX, lo, hi));
        assert!(seq_in_window(0, lo, hi));
        assert!(seq_in_window(20, lo, hi));
        assert!(!seq_in_window(21, lo, hi));
        assert!(!seq_in_window(lo - 1, lo, hi));
    }
}
