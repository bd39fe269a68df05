//! Packed bit helpers shared by the bitmap allocator and component pools.
//!
//! Bit `i` lives in byte `i / 8` at position `i % 8` (LSB first).

/// Reads bit `index`.
#[inline]
pub(crate) fn get_bit(bitmap: &[u8], index: usize) -> bool {
    bitmap[index / 8] & (1 << (index % 8)) != 0
}

/// Writes bit `index`.
#[inline]
pub(crate) fn set_bit(bitmap: &mut [u8], index: usize, value: bool) {
    let mask = 1u8 << (index % 8);
    if value {
        bitmap[index / 8] |= mask;
    } else {
        bitmap[index / 8] &= !mask;
    }
}

/// Returns `true` if every bit in `start..start + len` is set.
#[inline]
pub(crate) fn all_set(bitmap: &[u8], start: usize, len: usize) -> bool {
    (start..start + len).all(|i| get_bit(bitmap, i))
}

/// Number of set bits among the first `bits` bits.
pub(crate) fn count_set(bitmap: &[u8], bits: usize) -> usize {
    (0..bits).filter(|i| get_bit(bitmap, *i)).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear() {
        let mut bitmap = [0u8; 2];
        set_bit(&mut bitmap, 0, true);
        set_bit(&mut bitmap, 9, true);
        assert_eq!(bitmap, [0b0000_0001, 0b0000_0010]);
        assert!(get_bit(&bitmap, 9));

        set_bit(&mut bitmap, 9, false);
        assert!(!get_bit(&bitmap, 9));
        assert_eq!(count_set(&bitmap, 16), 1);
    }

    #[test]
    fn test_all_set() {
        let mut bitmap = [0u8; 1];
        for i in 2..5 {
            set_bit(&mut bitmap, i, true);
        }
        assert!(all_set(&bitmap, 2, 3));
        assert!(!all_set(&bitmap, 1, 3));
    }
}
