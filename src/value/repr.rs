//! The tagged value word.
//!
//! A value is one 64-bit word.  If bit 0 is set, the word is a smallint and
//! the remaining 63 bits are the integer in two's complement.  Otherwise the
//! word is an object reference: bits 1-2 select the heap space and bits 3-34
//! hold the slot index within that space.  Object references are rewritten by
//! the garbage collector when objects move; smallints are immutable.

/// Largest value representable as a smallint.
pub const SMALLINT_MAX: i64 = (1 << 62) - 1;
/// Smallest value representable as a smallint.  The range is symmetric
/// around zero.
pub const SMALLINT_MIN: i64 = -SMALLINT_MAX;

/// Heap spaces an object reference can point into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Space {
    /// The young generation; collected often, objects move out of it.
    Young,
    /// The old generation; collected by full cycles, objects move within it.
    Old,
    /// The no-move space; objects are swept but never relocated.
    Fixed,
}

/// A tagged value word: a smallint or an object reference.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Value(u64);

impl Value {
    /// Smallint zero.  Also the fill pattern for freshly zeroed slot vectors.
    pub const ZERO: Value = Value(1);

    /// Encode a smallint.  The value must be in smallint range.
    #[inline]
    pub fn smallint(v: i64) -> Value {
        debug_assert!((SMALLINT_MIN..=SMALLINT_MAX).contains(&v));
        Value((v as u64) << 1 | 1)
    }

    /// Encode a smallint, or `None` if `v` is out of range.
    #[inline]
    pub fn smallint_checked(v: i64) -> Option<Value> {
        (SMALLINT_MIN..=SMALLINT_MAX)
            .contains(&v)
            .then(|| Value::smallint(v))
    }

    #[inline]
    pub fn is_smallint(self) -> bool {
        self.0 & 1 == 1
    }

    #[inline]
    pub fn as_smallint(self) -> Option<i64> {
        self.is_smallint().then(|| (self.0 as i64) >> 1)
    }

    #[inline]
    pub fn is_object(self) -> bool {
        !self.is_smallint()
    }

    /// Build an object reference.
    #[inline]
    pub(crate) fn object(space: Space, index: u32) -> Value {
        let tag = match space {
            Space::Young => 0u64,
            Space::Old => 1,
            Space::Fixed => 2,
        };
        Value(tag << 1 | (index as u64) << 3)
    }

    /// Decompose an object reference.  `None` for smallints.
    #[inline]
    pub(crate) fn as_object(self) -> Option<(Space, u32)> {
        if self.is_smallint() {
            return None;
        }
        let space = match self.0 >> 1 & 0x3 {
            0 => Space::Young,
            1 => Space::Old,
            2 => Space::Fixed,
            _ => unreachable!("bad space tag"),
        };
        Some((space, (self.0 >> 3) as u32))
    }

    /// The space an object reference points into.  `None` for smallints.
    #[inline]
    pub fn space(self) -> Option<Space> {
        self.as_object().map(|(s, _)| s)
    }

    /// The raw word, for identity hashing of stable references.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.as_smallint() {
            Some(v) => write!(f, "smallint({v})"),
            None => {
                let (space, index) = self.as_object().unwrap();
                write!(f, "ref({space:?}, {index})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smallint_round_trip() {
        for &v in &[0i64, 1, -1, 42, -42, i32::MAX as i64, i32::MIN as i64, SMALLINT_MIN, SMALLINT_MAX] {
            let x = Value::smallint(v);
            assert!(x.is_smallint());
            assert_eq!(x.as_smallint(), Some(v));
        }
        assert!(Value::smallint_checked(SMALLINT_MAX + 1).is_none());
        assert!(Value::smallint_checked(SMALLINT_MIN - 1).is_none());
    }

    #[test]
    fn smallint_identity() {
        assert_eq!(Value::smallint(7), Value::smallint(7));
        assert_ne!(Value::smallint(7), Value::smallint(8));
        assert_eq!(Value::ZERO, Value::smallint(0));
    }

    #[test]
    fn object_round_trip() {
        for &space in &[Space::Young, Space::Old, Space::Fixed] {
            for &index in &[0u32, 1, 12345, u32::MAX >> 3] {
                let v = Value::object(space, index);
                assert!(v.is_object());
                assert_eq!(v.as_object(), Some((space, index)));
            }
        }
    }
}
