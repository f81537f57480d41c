use crate::pir_internals::{branch_opt_util, prg::Prg};

/// The field modulus, the Mersenne prime 2^31 - 1.
pub const MODULUS: u32 = 0x7fff_ffff;

/// Number of bytes an element occupies on the wire.
pub const BYTES: usize = 4;

/// A residue mod [`MODULUS`]. The canonical representative is always kept
/// in `[0, MODULUS)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Element(u32);

impl Element {
    #[inline(always)]
    pub const fn zero() -> Element {
        Element(0)
    }

    #[inline(always)]
    pub const fn one() -> Element {
        Element(1)
    }

    /// Reduces an arbitrary word into the field.
    #[inline(always)]
    pub const fn from_u32(v: u32) -> Element {
        Element(v % MODULUS)
    }

    #[inline(always)]
    pub const fn value(&self) -> u32 {
        self.0
    }

    #[inline(always)]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline(always)]
    pub const fn add(self, rhs: Element) -> Element {
        // Both operands are < 2^31, the sum fits a u32.
        let s = self.0 + rhs.0;
        Element(if s >= MODULUS { s - MODULUS } else { s })
    }

    #[inline(always)]
    pub const fn sub(self, rhs: Element) -> Element {
        self.add(rhs.neg())
    }

    #[inline(always)]
    pub const fn mul(self, rhs: Element) -> Element {
        Element(((self.0 as u64 * rhs.0 as u64) % MODULUS as u64) as u32)
    }

    #[inline(always)]
    pub const fn neg(self) -> Element {
        Element(if self.0 == 0 { 0 } else { MODULUS - self.0 })
    }

    /// Interprets `bytes` as a big-endian integer and reduces it into the
    /// field. Accepts any length; the function secret sharing core feeds it
    /// 16-byte seeds.
    pub fn set_bytes(bytes: &[u8]) -> Element {
        let mut acc = 0u64;
        for &byte in bytes {
            acc = ((acc << 8) | byte as u64) % MODULUS as u64;
        }
        Element(acc as u32)
    }

    /// Big-endian fixed-width encoding.
    #[inline(always)]
    pub const fn to_bytes(self) -> [u8; BYTES] {
        self.0.to_be_bytes()
    }
}

/// Samples a uniform element by rejection on the raw u32 stream of `prg`.
pub fn random_element(prg: &mut Prg) -> Element {
    let mut word = [0u8; BYTES];
    loop {
        prg.fill_bytes(&mut word);
        let v = u32::from_be_bytes(word);
        if branch_opt_util::likely(v < MODULUS) {
            return Element(v);
        }
    }
}

/// Samples `n` uniform elements from `prg`.
pub fn random_vector(prg: &mut Prg, n: usize) -> Vec<Element> {
    (0..n).map(|_| random_element(prg)).collect()
}

pub fn zero_vector(n: usize) -> Vec<Element> {
    vec![Element::zero(); n]
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pir_internals::prg::PrgKey;

    #[test]
    fn arithmetic_laws_hold() {
        let a = Element::from_u32(0x6001_0203);
        let b = Element::from_u32(0x7ffe_aabb);

        assert_eq!(a.add(b), b.add(a));
        assert_eq!(a.mul(b), b.mul(a));
        assert_eq!(a.add(a.neg()), Element::zero());
        assert_eq!(a.sub(b).add(b), a);
        assert_eq!(a.mul(Element::one()), a);
        assert_eq!(a.mul(Element::zero()), Element::zero());
        assert_eq!(Element::zero().neg(), Element::zero());
    }

    #[test]
    fn representative_stays_canonical() {
        let max = Element::from_u32(MODULUS - 1);
        assert!(max.add(max).value() < MODULUS);
        assert!(max.mul(max).value() < MODULUS);
        assert_eq!(Element::from_u32(MODULUS), Element::zero());
    }

    #[test]
    fn byte_encoding_round_trips() {
        let a = Element::from_u32(0x1234_5678);
        assert_eq!(Element::set_bytes(&a.to_bytes()), a);
    }

    #[test]
    fn set_bytes_folds_long_inputs() {
        // 2^32 mod (2^31 - 1) = 2
        assert_eq!(Element::set_bytes(&[1, 0, 0, 0, 0]), Element::from_u32(2));
        assert_eq!(Element::set_bytes(&[]), Element::zero());

        let seed = [0xffu8; 16];
        assert!(Element::set_bytes(&seed).value() < MODULUS);
    }

    #[test]
    fn random_vector_is_uniform_in_range_and_deterministic() {
        let key: PrgKey = [7u8; 16];

        let mut prg = Prg::new(&key);
        let v = random_vector(&mut prg, 4096);
        assert!(v.iter().all(|e| e.value() < MODULUS));

        let mut prg_again = Prg::new(&key);
        assert_eq!(random_vector(&mut prg_again, 4096), v);
    }
}
