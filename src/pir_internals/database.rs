use crate::pir_internals::{
    branch_opt_util,
    error::VpirError,
    field::{self, Element},
    matrix::{Matrix, Word},
    params::ParamsLwe,
    prg::Prg,
};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

/// Marks the end of the useful bytes inside a fixed-width Merkle block.
pub const SIGNAL_BYTE: u8 = 0x80;

/// ECC group tag of the elliptic authenticator. Carried for the
/// out-of-band info channel; the single-server DH scheme itself is not
/// part of this crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupId {
    P256,
    Ristretto255,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashId {
    Sha256,
    Sha512,
}

/// Public commitment to the database contents. Which variant a database
/// carries is decided by the scheme it serves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Authenticator {
    /// Per-block tags are embedded in the answers themselves.
    Classical,
    Merkle {
        root: Vec<u8>,
        proof_len: usize,
    },
    Elliptic {
        digest: Vec<u8>,
        sub_digests: Vec<u8>,
        group: GroupId,
        hash: HashId,
        element_size: usize,
        scalar_size: usize,
    },
    /// Digest matrix `DB · A` in matrix wire encoding, so one variant
    /// covers both cell widths.
    Lwe {
        digest: Vec<u8>,
        params: ParamsLwe,
    },
}

/// Public database layout, shared verbatim between client and servers.
/// Both sides treat these numbers as authoritative.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Info {
    pub num_rows: usize,
    pub num_columns: usize,
    pub block_size: usize,
    /// Length of a block identifier in bytes, key-import path only.
    pub id_length: usize,
    /// Length of a block payload in bytes, key-import path only.
    pub key_length: usize,
    pub auth: Authenticator,
}

impl Info {
    pub fn new(num_rows: usize, num_columns: usize, block_size: usize) -> Info {
        Info {
            num_rows,
            num_columns,
            block_size,
            id_length: 0,
            key_length: 0,
            auth: Authenticator::Classical,
        }
    }

    /// Query vector length for the tag-authenticated schemes, in elements.
    #[inline(always)]
    pub const fn query_elements(&self) -> usize {
        self.num_columns * (self.block_size + 1)
    }

    /// Answer length for the tag-authenticated schemes, in elements.
    #[inline(always)]
    pub const fn answer_elements(&self) -> usize {
        self.num_rows * (self.block_size + 1)
    }

    /// Input bit width of the function secret sharing core for this layout.
    pub fn fss_bit_width(&self) -> usize {
        let blocks = self.num_rows * self.num_columns;
        (blocks.next_power_of_two().trailing_zeros() as usize).max(1)
    }

    /// Out-of-band encoding of the public parameters.
    pub fn to_bytes(&self) -> Result<Vec<u8>, VpirError> {
        bincode::serialize(self).map_err(|e| VpirError::Internal(format!("failed to serialize database info: {}", e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Info, VpirError> {
        bincode::deserialize(bytes).map_err(|e| VpirError::Internal(format!("failed to deserialize database info: {}", e)))
    }
}

/// Per-block metadata of the key-import path. The cryptographic core never
/// interprets these fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub creation_time: u64,
    pub algorithm: u8,
    pub key_id: u64,
    pub block_length: usize,
}

/// Field-element database for the multi-server schemes. Immutable after
/// creation and freely shareable across worker threads.
pub struct Db {
    pub keys_info: Vec<KeyInfo>,
    entries: Vec<Element>,
    pub info: Info,
}

impl Db {
    /// Validates the layout invariant `entries = rows * columns * block size`.
    pub fn new(info: Info, entries: Vec<Element>, keys_info: Vec<KeyInfo>) -> Result<Db, VpirError> {
        if branch_opt_util::unlikely(info.num_rows * info.num_columns * info.block_size != entries.len()) {
            return Err(VpirError::InconsistentDatabaseShape);
        }
        Ok(Db { keys_info, entries, info })
    }

    /// Deterministic multi-bit database of roughly `db_len_bits` bits,
    /// filled by reducing the PRG word stream into the field.
    pub fn random_multi_bit(prg: &mut Prg, db_len_bits: usize, num_rows: usize, block_size: usize) -> Result<Db, VpirError> {
        let mut num_columns = db_len_bits / (8 * field::BYTES * num_rows * block_size);
        // handle very small databases
        if num_columns == 0 {
            num_columns = 1;
        }

        let info = Info::new(num_rows, num_columns, block_size);

        let n = num_rows * num_columns * block_size;
        let mut bytes = vec![0u8; n * field::BYTES];
        prg.fill_bytes(&mut bytes);

        let entries = bytes
            .chunks_exact(field::BYTES)
            .map(|chunk| Element::from_u32(u32::from_be_bytes(chunk.try_into().unwrap())))
            .collect();

        Db::new(info, entries, Vec::new())
    }

    /// Deterministic single-row key database: one 2048-bit block per
    /// identifier plus randomised per-block metadata.
    pub fn random_key_db(prg: &mut Prg, num_identifiers: usize) -> Result<Db, VpirError> {
        const ENTRY_LENGTH: usize = 64;
        const ALGORITHMS: [u8; 5] = [1, 16, 17, 18, 19];

        let entries = field::random_vector(prg, num_identifiers * ENTRY_LENGTH);

        let mut scratch = [0u8; 17];
        let keys_info = (0..num_identifiers)
            .map(|_| {
                prg.fill_bytes(&mut scratch);
                KeyInfo {
                    creation_time: u64::from_be_bytes(scratch[..8].try_into().unwrap()),
                    algorithm: ALGORITHMS[scratch[8] as usize % ALGORITHMS.len()],
                    key_id: u64::from_be_bytes(scratch[9..].try_into().unwrap()),
                    block_length: ENTRY_LENGTH,
                }
            })
            .collect();

        let mut info = Info::new(1, num_identifiers, ENTRY_LENGTH);
        info.id_length = 8;
        info.key_length = ENTRY_LENGTH * field::BYTES;

        Db::new(info, entries, keys_info)
    }

    #[inline(always)]
    pub fn entries(&self) -> &[Element] {
        &self.entries
    }

    pub fn range(&self, begin: usize, end: usize) -> &[Element] {
        &self.entries[begin..end]
    }
}

/// Word-matrix database for the single-server lattice scheme, together
/// with its public digest `DB · A`.
pub struct LweDatabase<W: Word = u32> {
    pub matrix: Matrix<W>,
    pub digest: Matrix<W>,
    pub params: ParamsLwe,
    pub info: Info,
}

impl<W: Word> LweDatabase<W> {
    /// Deterministic random plaintext-bit database of shape `L x M`.
    pub fn random(prg: &mut Prg, params: &ParamsLwe) -> Result<LweDatabase<W>, VpirError> {
        let mut matrix = Matrix::<W>::new(params.l, params.m)?;

        let mut bits = vec![0u8; params.l * params.m];
        prg.fill_bytes(&mut bits);

        for r_idx in 0..params.l {
            for c_idx in 0..params.m {
                matrix[(r_idx, c_idx)] = W::from_u128((bits[r_idx * params.m + c_idx] & 1) as u128);
            }
        }

        LweDatabase::with_matrix(matrix, params)
    }

    /// Wraps an existing plaintext matrix, computing its digest.
    pub fn with_matrix(matrix: Matrix<W>, params: &ParamsLwe) -> Result<LweDatabase<W>, VpirError> {
        if branch_opt_util::unlikely(matrix.num_rows() != params.l || matrix.num_cols() != params.m) {
            return Err(VpirError::InconsistentDatabaseShape);
        }

        let mat_a = public_matrix_a::<W>(params)?;
        let digest = (&matrix * &mat_a)?;

        let mut info = Info::new(params.l, params.m, 1);
        info.auth = Authenticator::Lwe {
            digest: digest.to_bytes(),
            params: params.clone(),
        };

        Ok(LweDatabase {
            matrix,
            digest,
            params: params.clone(),
            info,
        })
    }
}

/// Regenerates the public `M x N` matrix `A` from the seed carried in the
/// parameters. Clients derive the very same matrix server-side digests
/// were computed against.
pub fn public_matrix_a<W: Word>(params: &ParamsLwe) -> Result<Matrix<W>, VpirError> {
    Matrix::new_random(&mut Prg::new(&params.seed_a), params.m, params.n)
}

/// Hashes a block identifier to a database index, key-import interface.
pub fn hash_to_index(id: &[u8], length: usize) -> usize {
    let digest = Sha3_256::digest(id);
    (u64::from_be_bytes(digest[..8].try_into().unwrap()) % length as u64) as usize
}

/// Splits `num_blocks` into a database layout: a square-ish matrix when
/// `matrix_layout` is set, a single row otherwise.
pub fn calculate_num_rows_and_columns(num_blocks: usize, matrix_layout: bool) -> (usize, usize) {
    if matrix_layout {
        let utilised = (num_blocks as f64).sqrt().ceil() as usize;
        (utilised, utilised)
    } else {
        (1, num_blocks)
    }
}

/// Appends the signal byte and zero-fills a Merkle block up to `padded_len`.
pub fn pad_with_signal_byte(mut block: Vec<u8>, padded_len: usize) -> Result<Vec<u8>, VpirError> {
    if branch_opt_util::unlikely(block.len() + 1 > padded_len) {
        return Err(VpirError::InconsistentDatabaseShape);
    }

    block.push(SIGNAL_BYTE);
    block.resize(padded_len, 0);
    Ok(block)
}

/// Strips the zero fill and the signal byte. The scan never touches bytes
/// before the signal position, so payload or proof bytes equal to the
/// signal value are unaffected.
pub fn strip_signal_byte_padding(padded: &[u8]) -> Result<&[u8], VpirError> {
    let last_non_zero = padded
        .iter()
        .rposition(|&byte| byte != 0)
        .ok_or(VpirError::InconsistentDatabaseShape)?;

    if branch_opt_util::unlikely(padded[last_non_zero] != SIGNAL_BYTE) {
        return Err(VpirError::InconsistentDatabaseShape);
    }

    Ok(&padded[..last_non_zero])
}

/// Splits a stripped Merkle block into payload and encoded proof. The
/// proof length is fixed by the tree parameters and carried in
/// [`Authenticator::Merkle`], never inferred from the bytes.
pub fn merkle_block_parts(block: &[u8], proof_len: usize) -> Result<(&[u8], &[u8]), VpirError> {
    if branch_opt_util::unlikely(block.len() < proof_len) {
        return Err(VpirError::InconsistentDatabaseShape);
    }
    Ok(block.split_at(block.len() - proof_len))
}
