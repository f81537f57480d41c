use aes::{
    cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit, KeyIvInit, StreamCipher},
    Aes128,
};
use ctr::Ctr128BE;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

type Aes128Ctr = Ctr128BE<Aes128>;

pub const KEY_BYTE_LEN: usize = 16;
pub const BLOCK_BYTE_LEN: usize = 16;

pub type PrgKey = [u8; KEY_BYTE_LEN];

// Fixed PRF keys of the length-doubling expander used inside the function
// secret sharing core. Client and servers must agree on them, so they are
// crate constants rather than per-key material.
//
// WARNING: DO NOT USE THESE KEYS IN PRODUCTION!
const EXPANDER_KEYS: [PrgKey; 3] = [
    [41, 18, 199, 27, 80, 182, 29, 237, 117, 23, 32, 84, 6, 73, 205, 80],
    [209, 12, 199, 173, 29, 74, 44, 128, 194, 224, 14, 44, 2, 201, 110, 28],
    [122, 7, 81, 56, 129, 9, 59, 254, 104, 196, 220, 250, 78, 104, 217, 191],
];

/// Deterministic byte stream: AES-128-CTR keystream over a zero IV.
///
/// A PRG instance is single-threaded by construction; never share one
/// across workers.
pub struct Prg {
    stream: Aes128Ctr,
}

impl Prg {
    pub fn new(key: &PrgKey) -> Prg {
        let iv = [0u8; BLOCK_BYTE_LEN];
        Prg {
            stream: Aes128Ctr::new(key.into(), (&iv).into()),
        }
    }

    /// A PRG keyed from OS entropy.
    pub fn random() -> Prg {
        let mut key: PrgKey = [0u8; KEY_BYTE_LEN];
        ChaCha8Rng::from_os_rng().fill_bytes(&mut key);
        Prg::new(&key)
    }

    pub fn fill_bytes(&mut self, out: &mut [u8]) {
        out.fill(0);
        self.stream.apply_keystream(out);
    }
}

/// Length-doubling PRG for the seed tree: three fixed-key AES instances,
/// each contributing `AES_k(s) ^ s`. The 48 output bytes are parsed as
/// `s_left(16) ‖ t_left(1) ‖ s_right(16) ‖ t_right(1)`, with only the low
/// bit of each t byte significant.
pub struct SeedExpander {
    ciphers: [Aes128; 3],
}

impl SeedExpander {
    pub fn new() -> SeedExpander {
        SeedExpander {
            ciphers: EXPANDER_KEYS.map(|key| Aes128::new(GenericArray::from_slice(&key))),
        }
    }

    pub fn expand(&self, seed: &[u8; BLOCK_BYTE_LEN]) -> ([u8; BLOCK_BYTE_LEN], u8, [u8; BLOCK_BYTE_LEN], u8) {
        let mut out = [0u8; 3 * BLOCK_BYTE_LEN];

        for (cipher_idx, cipher) in self.ciphers.iter().enumerate() {
            let mut block = GenericArray::clone_from_slice(seed);
            cipher.encrypt_block(&mut block);

            let offset = cipher_idx * BLOCK_BYTE_LEN;
            for byte_idx in 0..BLOCK_BYTE_LEN {
                out[offset + byte_idx] = block[byte_idx] ^ seed[byte_idx];
            }
        }

        let mut s_left = [0u8; BLOCK_BYTE_LEN];
        let mut s_right = [0u8; BLOCK_BYTE_LEN];

        s_left.copy_from_slice(&out[..BLOCK_BYTE_LEN]);
        let t_left = out[BLOCK_BYTE_LEN] & 1;
        s_right.copy_from_slice(&out[BLOCK_BYTE_LEN + 1..2 * BLOCK_BYTE_LEN + 1]);
        let t_right = out[2 * BLOCK_BYTE_LEN + 1] & 1;

        (s_left, t_left, s_right, t_right)
    }
}
