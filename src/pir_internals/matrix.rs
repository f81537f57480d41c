use crate::pir_internals::{branch_opt_util, error::VpirError, gauss::GaussSampler, prg::Prg};
use rayon::prelude::*;
use std::ops::{Add, Index, IndexMut, Mul, Sub};

mod sealed {
    pub trait Sealed {}
    impl Sealed for u32 {}
    impl Sealed for u64 {}
}

/// Cell type of a matrix. Arithmetic wraps at the natural word boundary,
/// i.e. the computation modulus is 2^32 or 2^64.
pub trait Word: sealed::Sealed + Copy + Default + PartialEq + Send + Sync + std::fmt::Debug + 'static {
    const BYTES: usize;
    /// The word modulus, as a u128.
    const MODULUS: u128;

    fn wrapping_add(self, rhs: Self) -> Self;
    fn wrapping_sub(self, rhs: Self) -> Self;
    fn wrapping_mul(self, rhs: Self) -> Self;
    fn from_le_slice(bytes: &[u8]) -> Self;
    fn write_le(self, out: &mut [u8]);
    /// Embeds a signed sample into the word's residue ring.
    fn from_centered(v: i64) -> Self;
    fn to_u128(self) -> u128;
    fn from_u128(v: u128) -> Self;
}

macro_rules! impl_word {
    ($ty:ty) => {
        impl Word for $ty {
            const BYTES: usize = std::mem::size_of::<$ty>();
            const MODULUS: u128 = 1u128 << (8 * std::mem::size_of::<$ty>());

            #[inline(always)]
            fn wrapping_add(self, rhs: Self) -> Self {
                <$ty>::wrapping_add(self, rhs)
            }
            #[inline(always)]
            fn wrapping_sub(self, rhs: Self) -> Self {
                <$ty>::wrapping_sub(self, rhs)
            }
            #[inline(always)]
            fn wrapping_mul(self, rhs: Self) -> Self {
                <$ty>::wrapping_mul(self, rhs)
            }
            #[inline(always)]
            fn from_le_slice(bytes: &[u8]) -> Self {
                <$ty>::from_le_bytes(bytes.try_into().unwrap())
            }
            #[inline(always)]
            fn write_le(self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_le_bytes());
            }
            #[inline(always)]
            fn from_centered(v: i64) -> Self {
                v as $ty
            }
            #[inline(always)]
            fn to_u128(self) -> u128 {
                self as u128
            }
            #[inline(always)]
            fn from_u128(v: u128) -> Self {
                v as $ty
            }
        }
    };
}

impl_word!(u32);
impl_word!(u64);

/// Dense row-major matrix over a word type.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix<W: Word = u32> {
    rows: usize,
    cols: usize,
    cells: Vec<W>,
}

impl<W: Word> Matrix<W> {
    /// Creates a zero-initialized matrix with the given dimensions, which must both be non-zero.
    pub fn new(rows: usize, cols: usize) -> Result<Matrix<W>, VpirError> {
        if branch_opt_util::likely((rows > 0) && (cols > 0)) {
            Ok(Matrix {
                rows,
                cols,
                cells: vec![W::default(); rows * cols],
            })
        } else {
            Err(VpirError::InvalidMatrixDimension)
        }
    }

    /// Creates a matrix with the given dimensions from pre-existing cells; the number of values must be `rows * cols`.
    pub fn from_values(rows: usize, cols: usize, values: Vec<W>) -> Result<Matrix<W>, VpirError> {
        if branch_opt_util::unlikely(rows == 0 || cols == 0) {
            return Err(VpirError::InvalidMatrixDimension);
        }
        if branch_opt_util::likely(rows * cols == values.len()) {
            Ok(Matrix { rows, cols, cells: values })
        } else {
            Err(VpirError::InvalidNumberOfElementsInMatrix)
        }
    }

    /// Fills a matrix with the PRG byte stream, interpreting every [`Word::BYTES`] chunk as a little-endian word.
    pub fn new_random(prg: &mut Prg, rows: usize, cols: usize) -> Result<Matrix<W>, VpirError> {
        let mut mat = Matrix::new(rows, cols)?;

        let mut bytes = vec![0u8; rows * cols * W::BYTES];
        prg.fill_bytes(&mut bytes);

        for (cell, chunk) in mat.cells.iter_mut().zip(bytes.chunks_exact(W::BYTES)) {
            *cell = W::from_le_slice(chunk);
        }

        Ok(mat)
    }

    /// Fills a matrix with discrete Gaussian samples in centered representation.
    pub fn new_gauss(rows: usize, cols: usize, sigma: f64) -> Result<Matrix<W>, VpirError> {
        Self::new_gauss_with(&mut GaussSampler::new(sigma), rows, cols)
    }

    pub fn new_gauss_with(sampler: &mut GaussSampler, rows: usize, cols: usize) -> Result<Matrix<W>, VpirError> {
        let mut mat = Matrix::new(rows, cols)?;

        for cell in mat.cells.iter_mut() {
            *cell = W::from_centered(sampler.sample());
        }

        Ok(mat)
    }

    #[inline(always)]
    pub const fn num_rows(&self) -> usize {
        self.rows
    }

    #[inline(always)]
    pub const fn num_cols(&self) -> usize {
        self.cols
    }

    #[inline(always)]
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Encodes the matrix as `rows: u32 BE ‖ cols: u32 BE ‖ cells as little-endian words`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; 8 + self.cells.len() * W::BYTES];

        out[..4].copy_from_slice(&(self.rows as u32).to_be_bytes());
        out[4..8].copy_from_slice(&(self.cols as u32).to_be_bytes());

        for (cell, chunk) in self.cells.iter().zip(out[8..].chunks_exact_mut(W::BYTES)) {
            cell.write_le(chunk);
        }

        out
    }

    /// Decodes a matrix produced by [`Matrix::to_bytes`], validating the exact byte length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Matrix<W>, VpirError> {
        if branch_opt_util::unlikely(bytes.len() < 8) {
            return Err(VpirError::MatrixBytesTooShort);
        }

        let rows = u32::from_be_bytes(bytes[..4].try_into().unwrap()) as usize;
        let cols = u32::from_be_bytes(bytes[4..8].try_into().unwrap()) as usize;

        if branch_opt_util::unlikely(rows == 0 || cols == 0) {
            return Err(VpirError::InvalidMatrixDimension);
        }
        if branch_opt_util::unlikely(bytes.len() - 8 != rows * cols * W::BYTES) {
            return Err(VpirError::InvalidNumberOfElementsInMatrix);
        }

        let cells = bytes[8..].chunks_exact(W::BYTES).map(W::from_le_slice).collect();
        Matrix::from_values(rows, cols, cells)
    }
}

/// Encodes same-shaped matrices as `per_matrix_len: u32 BE ‖ concat(matrices)`.
pub fn matrices_to_bytes<W: Word>(matrices: &[Matrix<W>]) -> Result<Vec<u8>, VpirError> {
    if branch_opt_util::unlikely(matrices.is_empty()) {
        return Err(VpirError::InvalidMatrixDimension);
    }
    if branch_opt_util::unlikely(matrices.iter().any(|m| m.rows != matrices[0].rows || m.cols != matrices[0].cols)) {
        return Err(VpirError::InvalidMatrixDimension);
    }

    let encoded = matrices[0].to_bytes();

    let mut out = Vec::with_capacity(4 + encoded.len() * matrices.len());
    out.extend_from_slice(&(encoded.len() as u32).to_be_bytes());
    out.extend_from_slice(&encoded);

    for matrix in matrices.iter().skip(1) {
        out.extend_from_slice(&matrix.to_bytes());
    }

    Ok(out)
}

/// Decodes a vector of matrices produced by [`matrices_to_bytes`].
pub fn bytes_to_matrices<W: Word>(bytes: &[u8]) -> Result<Vec<Matrix<W>>, VpirError> {
    if branch_opt_util::unlikely(bytes.len() < 4) {
        return Err(VpirError::MatrixBytesTooShort);
    }

    let per_matrix_len = u32::from_be_bytes(bytes[..4].try_into().unwrap()) as usize;
    let body = &bytes[4..];

    if branch_opt_util::unlikely(per_matrix_len == 0 || body.len() % per_matrix_len != 0) {
        return Err(VpirError::MatrixBytesTooShort);
    }

    body.chunks_exact(per_matrix_len).map(Matrix::from_bytes).collect()
}

impl<W: Word> Index<(usize, usize)> for Matrix<W> {
    type Output = W;

    #[inline(always)]
    fn index(&self, index: (usize, usize)) -> &Self::Output {
        let (ridx, cidx) = index;
        unsafe { self.cells.get_unchecked(ridx * self.cols + cidx) }
    }
}

impl<W: Word> IndexMut<(usize, usize)> for Matrix<W> {
    #[inline(always)]
    fn index_mut(&mut self, index: (usize, usize)) -> &mut Self::Output {
        let (ridx, cidx) = index;
        unsafe { self.cells.get_unchecked_mut(ridx * self.cols + cidx) }
    }
}

impl<'b, W: Word> Mul<&'b Matrix<W>> for &Matrix<W> {
    type Output = Result<Matrix<W>, VpirError>;

    /// `(i, k, j)` triple loop with natural word overflow, parallelised over disjoint output rows.
    fn mul(self, rhs: &Matrix<W>) -> Self::Output {
        if branch_opt_util::unlikely(self.cols != rhs.rows) {
            return Err(VpirError::IncompatibleDimensionForMatrixMultiplication);
        }

        let mut res_cells = vec![W::default(); self.rows * rhs.cols];

        res_cells.par_chunks_mut(rhs.cols).enumerate().for_each(|(r_idx, out_row)| {
            for k in 0..self.cols {
                let a = self[(r_idx, k)];
                let rhs_row = &rhs.cells[k * rhs.cols..(k + 1) * rhs.cols];

                for (out, &b) in out_row.iter_mut().zip(rhs_row) {
                    *out = out.wrapping_add(a.wrapping_mul(b));
                }
            }
        });

        Matrix::from_values(self.rows, rhs.cols, res_cells)
    }
}

impl<'b, W: Word> Add<&'b Matrix<W>> for &Matrix<W> {
    type Output = Result<Matrix<W>, VpirError>;

    fn add(self, rhs: &Matrix<W>) -> Self::Output {
        if branch_opt_util::unlikely(!(self.rows == rhs.rows && self.cols == rhs.cols)) {
            return Err(VpirError::IncompatibleDimensionForMatrixAddition);
        }

        let cells = self.cells.iter().zip(rhs.cells.iter()).map(|(&a, &b)| a.wrapping_add(b)).collect();
        Matrix::from_values(self.rows, self.cols, cells)
    }
}

impl<'b, W: Word> Sub<&'b Matrix<W>> for &Matrix<W> {
    type Output = Result<Matrix<W>, VpirError>;

    fn sub(self, rhs: &Matrix<W>) -> Self::Output {
        if branch_opt_util::unlikely(!(self.rows == rhs.rows && self.cols == rhs.cols)) {
            return Err(VpirError::IncompatibleDimensionForMatrixAddition);
        }

        let cells = self.cells.iter().zip(rhs.cells.iter()).map(|(&a, &b)| a.wrapping_sub(b)).collect();
        Matrix::from_values(self.rows, self.cols, cells)
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use crate::pir_internals::prg::{Prg, PrgKey};
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn small_matrix_multiplication_is_correct() {
        let a = Matrix::<u32>::from_values(2, 2, vec![1, 2, 3, 4]).unwrap();
        let b = Matrix::<u32>::from_values(2, 2, vec![5, 6, 7, 8]).unwrap();

        let c = (&a * &b).unwrap();
        assert_eq!(c, Matrix::from_values(2, 2, vec![19, 22, 43, 50]).unwrap());
    }

    #[test]
    fn multiplication_against_identity_is_identity() {
        let key: PrgKey = [11u8; 16];
        let mut prg = Prg::new(&key);

        let a = Matrix::<u32>::new_random(&mut prg, 17, 29).unwrap();

        let mut identity = Matrix::<u32>::new(29, 29).unwrap();
        (0..29).for_each(|idx| identity[(idx, idx)] = 1);

        assert_eq!((&a * &identity).unwrap(), a);
    }

    #[test]
    fn multiplication_wraps_at_word_boundary() {
        let a = Matrix::<u32>::from_values(1, 1, vec![u32::MAX]).unwrap();
        let b = Matrix::<u32>::from_values(1, 1, vec![2]).unwrap();

        assert_eq!((&a * &b).unwrap()[(0, 0)], u32::MAX - 1);
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let a = Matrix::<u32>::new(2, 3).unwrap();
        let b = Matrix::<u32>::new(2, 3).unwrap();
        let c = Matrix::<u32>::new(3, 2).unwrap();

        assert_eq!((&a * &b).err(), Some(VpirError::IncompatibleDimensionForMatrixMultiplication));
        assert_eq!((&a + &c).err(), Some(VpirError::IncompatibleDimensionForMatrixAddition));
        assert_eq!((&a - &c).err(), Some(VpirError::IncompatibleDimensionForMatrixAddition));
        assert!(Matrix::<u32>::new(0, 4).is_err());
    }

    #[test]
    fn addition_and_subtraction_cancel() {
        let key: PrgKey = [23u8; 16];
        let mut prg = Prg::new(&key);

        let a = Matrix::<u64>::new_random(&mut prg, 9, 13).unwrap();
        let b = Matrix::<u64>::new_random(&mut prg, 9, 13).unwrap();

        let sum = (&a + &b).unwrap();
        assert_eq!((&sum - &b).unwrap(), a);
    }

    #[test]
    fn codec_round_trips_for_random_shapes() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        for _ in 0..24 {
            let rows = rng.random_range(1..=1024);
            let cols = rng.random_range(1..=1024);

            let mut key: PrgKey = [0u8; 16];
            rng.fill_bytes(&mut key);
            let mut prg = Prg::new(&key);

            let mat = Matrix::<u32>::new_random(&mut prg, rows, cols).unwrap();
            assert_eq!(Matrix::<u32>::from_bytes(&mat.to_bytes()).unwrap(), mat);
        }
    }

    #[test]
    fn codec_round_trips_for_u64_cells() {
        let key: PrgKey = [5u8; 16];
        let mut prg = Prg::new(&key);

        let mat = Matrix::<u64>::new_random(&mut prg, 31, 7).unwrap();
        let bytes = mat.to_bytes();

        assert_eq!(bytes.len(), 8 + 31 * 7 * 8);
        assert_eq!(Matrix::<u64>::from_bytes(&bytes).unwrap(), mat);
    }

    #[test]
    fn codec_rejects_truncated_and_padded_input() {
        let mat = Matrix::<u32>::from_values(2, 2, vec![1, 2, 3, 4]).unwrap();
        let bytes = mat.to_bytes();

        assert!(Matrix::<u32>::from_bytes(&bytes[..bytes.len() - 1]).is_err());

        let mut padded = bytes.clone();
        padded.push(0);
        assert!(Matrix::<u32>::from_bytes(&padded).is_err());

        assert!(Matrix::<u32>::from_bytes(&[]).is_err());
    }

    #[test]
    fn matrices_codec_round_trips() {
        let key: PrgKey = [37u8; 16];
        let mut prg = Prg::new(&key);

        let matrices: Vec<Matrix<u32>> = (0..5).map(|_| Matrix::new_random(&mut prg, 12, 3).unwrap()).collect();

        let bytes = matrices_to_bytes(&matrices).unwrap();
        assert_eq!(bytes_to_matrices::<u32>(&bytes).unwrap(), matrices);
    }

    #[test]
    fn matrices_codec_requires_matching_shapes() {
        let a = Matrix::<u32>::new(2, 2).unwrap();
        let b = Matrix::<u32>::new(2, 3).unwrap();

        assert!(matrices_to_bytes(&[a, b]).is_err());
        assert!(matrices_to_bytes::<u32>(&[]).is_err());
    }

    #[test]
    fn gauss_matrix_has_small_centered_cells() {
        let bound = (6.0f64 * 6.0).ceil() as u32;

        for mat in [
            Matrix::<u32>::new_gauss_with(&mut GaussSampler::seeded(6.0, 3), 64, 64).unwrap(),
            Matrix::<u32>::new_gauss(64, 64, 6.0).unwrap(),
        ] {
            for r in 0..64 {
                for c in 0..64 {
                    let v = mat[(r, c)];
                    let centered = std::cmp::min(v, v.wrapping_neg());
                    assert!(centered <= bound);
                }
            }
        }
    }
}
