//! Helpers for working with secret-derived byte arrays in constant time.

use subtle::{Choice, ConditionallySelectable, ConstantTimeEq};
use zeroize::Zeroize;

/// A byte array of length `N` whose equality comparisons run in constant
/// time.
///
/// Used for anything derived from key material: digests, MAC tags, auth
/// values. Avoid `as_ref()`/`as_mut()` outside of code that has already
/// decided it doesn't need constant time (e.g. logging, wire encoding).
#[derive(Clone, Copy, Debug, Hash, Zeroize)]
pub struct CtByteArray<const N: usize>([u8; N]);

impl<const N: usize> ConstantTimeEq for CtByteArray<N> {
    fn ct_eq(&self, other: &Self) -> Choice {
        self.0.ct_eq(&other.0)
    }
}

impl<const N: usize> PartialEq for CtByteArray<N> {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other).into()
    }
}
impl<const N: usize> Eq for CtByteArray<N> {}

impl<const N: usize> From<[u8; N]> for CtByteArray<N> {
    fn from(value: [u8; N]) -> Self {
        Self(value)
    }
}

impl<const N: usize> From<CtByteArray<N>> for [u8; N] {
    fn from(value: CtByteArray<N>) -> Self {
        value.0
    }
}

impl<const N: usize> AsRef<[u8; N]> for CtByteArray<N> {
    fn as_ref(&self) -> &[u8; N] {
        &self.0
    }
}

impl<const N: usize> AsMut<[u8; N]> for CtByteArray<N> {
    fn as_mut(&mut self) -> &mut [u8; N] {
        &mut self.0
    }
}

/// Compare two byte slices for equality in constant time.
///
/// Used to check ntor `AUTH` tags, replay-sieve digests, and anything else
/// where a timing side channel on "did this match" would leak information to
/// an adversary who can measure response latency.
pub fn ct_eq_bytes(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Search `array` for an item for which `matches` returns true, without
/// leaking (via timing) which index matched or whether any did.
///
/// Every element is checked; only the final branch on `found` is not
/// constant-time, which is unavoidable since the caller needs a yes/no
/// answer.
pub fn ct_lookup<T, F>(array: &[T], matches: F) -> Option<&T>
where
    F: Fn(&T) -> Choice,
{
    let mut idx: u64 = 0;
    let mut found: Choice = 0.into();

    for (i, x) in array.iter().enumerate() {
        let equal = matches(x);
        idx.conditional_assign(&(i as u64), equal);
        found.conditional_assign(&equal, equal);
    }

    if found.into() {
        Some(&array[idx as usize])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn ct_byte_array_equality() {
        let a: CtByteArray<4> = [1, 2, 3, 4].into();
        let b: CtByteArray<4> = [1, 2, 3, 4].into();
        let c: CtByteArray<4> = [1, 2, 3, 5].into();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn lookup_finds_match() {
        let items = vec!["a".to_string(), "bb".to_string(), "ccc".to_string()];
        let found = ct_lookup(&items, |s| s.len().ct_eq(&2));
        assert_eq!(found.unwrap(), "bb");
        assert!(ct_lookup(&items, |s| s.len().ct_eq(&99)).is_none());
    }

    #[test]
    fn bytes_compare() {
        assert!(ct_eq_bytes(b"abc", b"abc"));
        assert!(!ct_eq_bytes(b"abc", b"abd"));
        assert!(!ct_eq_bytes(b"abc", b"ab"));
    }
}
