use crate::pir_internals::{error::VpirError, prg::PrgKey};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr, thread};

/// Default number of servers for the multi-server schemes.
pub const DEFAULT_NUM_SERVERS: usize = 2;

/// Widest supported input domain for the function secret sharing core.
pub const MAX_FSS_BIT_WIDTH: usize = 64;

// WARNING: DO NOT USE THIS SEED IN PRODUCTION!
pub const DEFAULT_SEED_MATRIX_A: PrgKey = [19, 177, 222, 148, 155, 239, 159, 227, 155, 99, 246, 214, 220, 162, 30, 66];

/// Retrieval scheme selector, established out-of-band when a server or
/// client is constructed. The scheme tag never travels inside query blobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scheme {
    It,
    Dpf,
    Lwe,
    Lwe128,
    Dh,
}

impl Scheme {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::It => "it",
            Self::Dpf => "dpf",
            Self::Lwe => "lwe",
            Self::Lwe128 => "lwe-128",
            Self::Dh => "dh",
        }
    }
}

impl FromStr for Scheme {
    type Err = VpirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "it" => Ok(Self::It),
            "dpf" => Ok(Self::Dpf),
            "lwe" => Ok(Self::Lwe),
            "lwe-128" => Ok(Self::Lwe128),
            "dh" => Ok(Self::Dh),
            other => Err(VpirError::UnsupportedScheme(other.to_string())),
        }
    }
}

impl Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameter set for the single-server lattice scheme. The computation
/// modulus is the natural word modulus of the matrix cells (2^32 for the
/// `lwe` scheme, 2^64 for `lwe-128`) and is therefore not stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamsLwe {
    /// Plaintext modulus.
    pub p: u32,
    /// Lattice/secret dimension.
    pub n: usize,
    /// Error parameter.
    pub sigma: f64,
    /// Number of rows of the database.
    pub l: usize,
    /// Number of columns of the database.
    pub m: usize,
    /// Bound used in reconstruction.
    pub b: u64,
    /// Seed of the public matrix used to generate the digest.
    pub seed_a: PrgKey,
    /// Amplification factor: number of independent instances per retrieval.
    pub ecc_t: usize,
}

impl Default for ParamsLwe {
    fn default() -> Self {
        Self {
            p: 2,
            n: 1024,
            sigma: 6.0,
            l: 512,
            m: 128,
            b: 1000,
            seed_a: DEFAULT_SEED_MATRIX_A,
            ecc_t: 1,
        }
    }
}

impl ParamsLwe {
    /// Defaults for the 64-bit-word variant. Same dimensions and error
    /// envelope, wider modulus.
    pub fn default_128() -> Self {
        Self::default()
    }

    /// Defaults with ECC-style amplification enabled.
    pub fn amplified(t: usize) -> Self {
        Self { ecc_t: t, ..Self::default() }
    }
}

/// Number of workers the answer engine uses unless overridden.
pub fn default_workers() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scheme_selector_round_trips() {
        for scheme in [Scheme::It, Scheme::Dpf, Scheme::Lwe, Scheme::Lwe128, Scheme::Dh] {
            assert_eq!(Scheme::from_str(scheme.as_str()).unwrap(), scheme);
        }
        assert_eq!(Scheme::from_str("merkle"), Err(VpirError::UnsupportedScheme("merkle".to_string())));
    }

    #[test]
    fn lwe_params_serialize_round_trip() {
        let params = ParamsLwe::amplified(3);
        let bytes = bincode::serialize(&params).unwrap();
        let decoded: ParamsLwe = bincode::deserialize(&bytes).unwrap();
        assert_eq!(params, decoded);
    }
}
