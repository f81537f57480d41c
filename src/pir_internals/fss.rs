use crate::pir_internals::{
    error::VpirError,
    field::{self, Element},
    params::MAX_FSS_BIT_WIDTH,
    prg::{Prg, SeedExpander, BLOCK_BYTE_LEN},
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Per-level public correction value: an AES-block-sized seed plus one
/// advice bit per branch direction. Both parties' keys carry identical
/// correction words.
#[derive(Clone, Debug, PartialEq)]
pub struct CorrectionWord {
    pub s: [u8; BLOCK_BYTE_LEN],
    pub t_left: u8,
    pub t_right: u8,
}

/// Point function key, scalar output.
#[derive(Clone, Debug, PartialEq)]
pub struct Key {
    pub s_init: [u8; BLOCK_BYTE_LEN],
    pub t_init: u8,
    pub cw: Vec<CorrectionWord>,
    pub final_cw: Element,
}

/// Point function key, vector output. The final correction word carries one
/// field element per output coordinate.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorKey {
    pub s_init: [u8; BLOCK_BYTE_LEN],
    pub t_init: u8,
    pub cw: Vec<CorrectionWord>,
    pub final_cw: Vec<Element>,
}

/// Distributed point function over the input domain `{0, .., 2^num_bits - 1}`:
/// [`Fss::generate`] splits `b · 1[x == a]` into two keys whose evaluations
/// differ by exactly that function at every input.
pub struct Fss {
    num_bits: usize,
    expander: SeedExpander,
}

struct KeygenWalk {
    s_init: [[u8; BLOCK_BYTE_LEN]; 2],
    t_init: [u8; 2],
    cw: Vec<CorrectionWord>,
    s_final: [[u8; BLOCK_BYTE_LEN]; 2],
    t_final1: u8,
}

#[inline(always)]
fn bit_at(x: u64, level: usize, num_bits: usize) -> u8 {
    ((x >> (num_bits - 1 - level)) & 1) as u8
}

#[inline(always)]
fn xor_block(a: &[u8; BLOCK_BYTE_LEN], b: &[u8; BLOCK_BYTE_LEN]) -> [u8; BLOCK_BYTE_LEN] {
    let mut out = [0u8; BLOCK_BYTE_LEN];
    for i in 0..BLOCK_BYTE_LEN {
        out[i] = a[i] ^ b[i];
    }
    out
}

#[inline(always)]
fn xor_block_if(block: &[u8; BLOCK_BYTE_LEN], mask: &[u8; BLOCK_BYTE_LEN], advice: u8) -> [u8; BLOCK_BYTE_LEN] {
    if advice == 1 {
        xor_block(block, mask)
    } else {
        *block
    }
}

impl Fss {
    pub fn new(num_bits: usize) -> Result<Fss, VpirError> {
        if !(1..=MAX_FSS_BIT_WIDTH).contains(&num_bits) {
            return Err(VpirError::InvalidBitWidth(num_bits));
        }
        Ok(Fss {
            num_bits,
            expander: SeedExpander::new(),
        })
    }

    #[inline(always)]
    pub const fn num_bits(&self) -> usize {
        self.num_bits
    }

    /// Top-down walk along the bits of `a`, MSB first. Produces the shared
    /// correction words and both parties' initial and final seeds; the
    /// caller turns the final seeds into the output correction.
    fn keygen_walk(&self, a: u64) -> KeygenWalk {
        let mut rng = ChaCha8Rng::from_os_rng();

        let mut s_init = [[0u8; BLOCK_BYTE_LEN]; 2];
        rng.fill_bytes(&mut s_init[0]);
        rng.fill_bytes(&mut s_init[1]);

        let t0 = rng.random::<u8>() & 1;
        let t_init = [t0, t0 ^ 1];

        let mut s_curr = s_init;
        let mut t_curr = t_init;
        let mut cw = Vec::with_capacity(self.num_bits);

        for level in 0..self.num_bits {
            let (s0_left, t0_left, s0_right, t0_right) = self.expander.expand(&s_curr[0]);
            let (s1_left, t1_left, s1_right, t1_right) = self.expander.expand(&s_curr[1]);

            let a_bit = bit_at(a, level, self.num_bits);

            // Keep the branch `a` continues along, correct the other so the
            // parties' seeds collapse to equality off the special path.
            let (s0_keep, t0_keep, s0_lose) = if a_bit == 0 { (s0_left, t0_left, s0_right) } else { (s0_right, t0_right, s0_left) };
            let (s1_keep, t1_keep, s1_lose) = if a_bit == 0 { (s1_left, t1_left, s1_right) } else { (s1_right, t1_right, s1_left) };

            let word = CorrectionWord {
                s: xor_block(&s0_lose, &s1_lose),
                t_left: t0_left ^ t1_left ^ a_bit ^ 1,
                t_right: t0_right ^ t1_right ^ a_bit,
            };
            let t_keep_cw = if a_bit == 0 { word.t_left } else { word.t_right };

            s_curr[0] = xor_block_if(&s0_keep, &word.s, t_curr[0]);
            s_curr[1] = xor_block_if(&s1_keep, &word.s, t_curr[1]);
            t_curr = [t0_keep ^ (t_keep_cw & t_curr[0]), t1_keep ^ (t_keep_cw & t_curr[1])];

            cw.push(word);
        }

        KeygenWalk {
            s_init,
            t_init,
            cw,
            s_final: s_curr,
            t_final1: t_curr[1],
        }
    }

    /// Generates keys for the scalar point function evaluating to `b` at `a`.
    pub fn generate(&self, a: u64, b: Element) -> [Key; 2] {
        let walk = self.keygen_walk(a);

        let s_final0 = Element::set_bytes(&walk.s_final[0]);
        let s_final1 = Element::set_bytes(&walk.s_final[1]);

        let mut final_cw = b.sub(s_final0).add(s_final1);
        if walk.t_final1 == 1 {
            final_cw = final_cw.neg();
        }

        [
            Key {
                s_init: walk.s_init[0],
                t_init: walk.t_init[0],
                cw: walk.cw.clone(),
                final_cw,
            },
            Key {
                s_init: walk.s_init[1],
                t_init: walk.t_init[1],
                cw: walk.cw,
                final_cw,
            },
        ]
    }

    /// Generates keys for the vector point function evaluating to the
    /// vector `b` at `a`. The final seeds are stretched into field vectors
    /// through the PRG, coordinate by coordinate.
    pub fn generate_vector(&self, a: u64, b: &[Element]) -> [VectorKey; 2] {
        let walk = self.keygen_walk(a);

        let s_final0 = field::random_vector(&mut Prg::new(&walk.s_final[0]), b.len());
        let s_final1 = field::random_vector(&mut Prg::new(&walk.s_final[1]), b.len());

        let final_cw: Vec<Element> = b
            .iter()
            .zip(s_final0.iter().zip(s_final1.iter()))
            .map(|(&b_i, (&s0_i, &s1_i))| {
                let coord = b_i.sub(s0_i).add(s1_i);
                if walk.t_final1 == 1 {
                    coord.neg()
                } else {
                    coord
                }
            })
            .collect();

        [
            VectorKey {
                s_init: walk.s_init[0],
                t_init: walk.t_init[0],
                cw: walk.cw.clone(),
                final_cw: final_cw.clone(),
            },
            VectorKey {
                s_init: walk.s_init[1],
                t_init: walk.t_init[1],
                cw: walk.cw,
                final_cw,
            },
        ]
    }

    fn eval_walk(&self, s_init: &[u8; BLOCK_BYTE_LEN], t_init: u8, cw: &[CorrectionWord], x: u64) -> ([u8; BLOCK_BYTE_LEN], u8) {
        let mut s = *s_init;
        let mut t = t_init;

        for (level, word) in cw.iter().enumerate() {
            let (mut s_left, mut t_left, mut s_right, mut t_right) = self.expander.expand(&s);

            if t == 1 {
                s_left = xor_block(&s_left, &word.s);
                s_right = xor_block(&s_right, &word.s);
                t_left ^= word.t_left;
                t_right ^= word.t_right;
            }

            if bit_at(x, level, self.num_bits) == 0 {
                s = s_left;
                t = t_left;
            } else {
                s = s_right;
                t = t_right;
            }
        }

        (s, t)
    }

    /// Evaluates a scalar key at `x`. Infallible for well-formed keys.
    pub fn evaluate(&self, key: &Key, x: u64) -> Element {
        let (s, t) = self.eval_walk(&key.s_init, key.t_init, &key.cw, x);

        let mut out = Element::set_bytes(&s);
        if t == 1 {
            out = out.add(key.final_cw);
        }
        out
    }

    /// Evaluates a vector key at `x`.
    pub fn evaluate_vector(&self, key: &VectorKey, x: u64) -> Vec<Element> {
        let (s, t) = self.eval_walk(&key.s_init, key.t_init, &key.cw, x);

        let mut out = field::random_vector(&mut Prg::new(&s), key.final_cw.len());
        if t == 1 {
            for (coord, &cw_coord) in out.iter_mut().zip(key.final_cw.iter()) {
                *coord = coord.add(cw_coord);
            }
        }
        out
    }
}
