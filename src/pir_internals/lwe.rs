use crate::pir_internals::{
    branch_opt_util,
    database::LweDatabase,
    error::VpirError,
    gauss::GaussSampler,
    matrix::{Matrix, Word},
    params::ParamsLwe,
    prg::Prg,
};

/// Plaintext embedding step `floor(q / p)` in the cell width.
#[inline(always)]
pub fn delta<W: Word>(params: &ParamsLwe) -> W {
    W::from_u128(W::MODULUS / params.p as u128)
}

/// Builds one query for cell column `col`: secret `s`, error `e` and the
/// `M x 1` query vector `A·s + e + Δ·u_col`. Returns the secret (kept
/// client-side) and the query.
pub fn query<W: Word>(
    prg: &mut Prg,
    sampler: &mut GaussSampler,
    params: &ParamsLwe,
    mat_a: &Matrix<W>,
    col: usize,
) -> Result<(Matrix<W>, Matrix<W>), VpirError> {
    if branch_opt_util::unlikely(col >= params.m) {
        return Err(VpirError::IncompatibleQueryDimension);
    }

    let secret = Matrix::<W>::new_random(prg, params.n, 1)?;
    let error = Matrix::<W>::new_gauss_with(sampler, params.m, 1)?;

    let mut q = (&(mat_a * &secret)? + &error)?;
    q[(col, 0)] = q[(col, 0)].wrapping_add(delta::<W>(params));

    Ok((secret, q))
}

/// Server-side answer `DB · q`, an `L x 1` vector.
pub fn answer<W: Word>(db: &LweDatabase<W>, q: &Matrix<W>) -> Result<Matrix<W>, VpirError> {
    if branch_opt_util::unlikely(q.num_rows() != db.params.m || q.num_cols() != 1) {
        return Err(VpirError::IncompatibleQueryDimension);
    }
    &db.matrix * q
}

/// Client-side reconstruction: subtracts the digest contribution and
/// rounds the requested coordinate. The residue must land within the
/// decoding bound of a plaintext embedding, otherwise the answer is
/// rejected.
pub fn reconstruct<W: Word>(params: &ParamsLwe, digest: &Matrix<W>, secret: &Matrix<W>, ans: &Matrix<W>, row: usize) -> Result<u8, VpirError> {
    if branch_opt_util::unlikely(ans.num_rows() != params.l || ans.num_cols() != 1) {
        return Err(VpirError::InvalidAnswerLength {
            expected: params.l,
            got: ans.num_rows(),
        });
    }
    if branch_opt_util::unlikely(row >= params.l) {
        return Err(VpirError::IncompatibleQueryDimension);
    }

    let res = (ans - &(digest * secret)?)?;

    let v = res[(row, 0)].to_u128();
    let step = W::MODULUS / params.p as u128;
    let bound = params.b as u128;

    let dist_zero = v.min(W::MODULUS - v);
    let dist_one = {
        let d = v.abs_diff(step);
        d.min(W::MODULUS - d)
    };

    if dist_zero <= bound {
        Ok(0)
    } else if dist_one <= bound {
        Ok(1)
    } else {
        Err(VpirError::ReconstructionBoundExceeded)
    }
}

/// Queries for `params.ecc_t` independent instances of the scheme.
pub fn query_amplified<W: Word>(
    prg: &mut Prg,
    sampler: &mut GaussSampler,
    params: &ParamsLwe,
    mat_a: &Matrix<W>,
    col: usize,
) -> Result<(Vec<Matrix<W>>, Vec<Matrix<W>>), VpirError> {
    let mut secrets = Vec::with_capacity(params.ecc_t);
    let mut queries = Vec::with_capacity(params.ecc_t);

    for _ in 0..params.ecc_t.max(1) {
        let (secret, q) = query(prg, sampler, params, mat_a, col)?;
        secrets.push(secret);
        queries.push(q);
    }

    Ok((secrets, queries))
}

pub fn answer_amplified<W: Word>(db: &LweDatabase<W>, queries: &[Matrix<W>]) -> Result<Vec<Matrix<W>>, VpirError> {
    queries.iter().map(|q| answer(db, q)).collect()
}

/// Majority decoding over the amplified instances. Instances that fail the
/// bound check count as erasures; a strict majority of all instances must
/// agree on the plaintext bit.
pub fn reconstruct_amplified<W: Word>(
    params: &ParamsLwe,
    digest: &Matrix<W>,
    secrets: &[Matrix<W>],
    answers: &[Matrix<W>],
    row: usize,
) -> Result<u8, VpirError> {
    if branch_opt_util::unlikely(answers.len() != secrets.len()) {
        return Err(VpirError::WrongNumberOfAnswers {
            expected: secrets.len(),
            got: answers.len(),
        });
    }

    let mut votes = [0usize; 2];
    for (secret, ans) in secrets.iter().zip(answers.iter()) {
        if let Ok(bit) = reconstruct(params, digest, secret, ans, row) {
            votes[bit as usize] += 1;
        }
    }

    let threshold = secrets.len() / 2 + 1;
    if votes[0] >= threshold {
        Ok(0)
    } else if votes[1] >= threshold {
        Ok(1)
    } else {
        Err(VpirError::MajorityVoteFailed)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pir_internals::{database::public_matrix_a, prg::PrgKey};

    fn small_params(ecc_t: usize) -> ParamsLwe {
        ParamsLwe {
            l: 64,
            m: 32,
            n: 128,
            ecc_t,
            ..ParamsLwe::default()
        }
    }

    fn setup<W: Word>(params: &ParamsLwe, db_seed: u8) -> (LweDatabase<W>, Matrix<W>) {
        let key: PrgKey = [db_seed; 16];
        let mut prg = Prg::new(&key);
        let db = LweDatabase::<W>::random(&mut prg, params).unwrap();
        let mat_a = public_matrix_a::<W>(params).unwrap();
        (db, mat_a)
    }

    #[test]
    fn honest_round_trip_recovers_the_plaintext_bit() {
        let params = small_params(1);
        let (db, mat_a) = setup::<u32>(&params, 31);

        let mut prg = Prg::new(&[32u8; 16]);
        let mut sampler = GaussSampler::seeded(params.sigma, 11);

        for (row, col) in [(0usize, 0usize), (5, 7), (63, 31), (17, 30)] {
            let (secret, q) = query(&mut prg, &mut sampler, &params, &mat_a, col).unwrap();
            let ans = answer(&db, &q).unwrap();
            let bit = reconstruct(&params, &db.digest, &secret, &ans, row).unwrap();

            assert_eq!(bit as u128, db.matrix[(row, col)].to_u128(), "row = {}, col = {}", row, col);
        }
    }

    #[test]
    fn honest_round_trip_recovers_the_plaintext_bit_with_wide_cells() {
        let params = small_params(1);
        let (db, mat_a) = setup::<u64>(&params, 41);

        let mut prg = Prg::new(&[42u8; 16]);
        let mut sampler = GaussSampler::seeded(params.sigma, 13);

        for (row, col) in [(0usize, 0usize), (9, 13), (63, 0)] {
            let (secret, q) = query(&mut prg, &mut sampler, &params, &mat_a, col).unwrap();
            let ans = answer(&db, &q).unwrap();
            let bit = reconstruct(&params, &db.digest, &secret, &ans, row).unwrap();

            assert_eq!(bit as u128, db.matrix[(row, col)].to_u128(), "row = {}, col = {}", row, col);
        }
    }

    #[test]
    fn tampered_answer_exceeds_the_decoding_bound() {
        let params = small_params(1);
        let (db, mat_a) = setup::<u32>(&params, 51);

        let mut prg = Prg::new(&[52u8; 16]);
        let mut sampler = GaussSampler::seeded(params.sigma, 17);

        let (secret, q) = query(&mut prg, &mut sampler, &params, &mat_a, 3).unwrap();
        let mut ans = answer(&db, &q).unwrap();

        // push the requested coordinate halfway between the embeddings
        ans[(12, 0)] = ans[(12, 0)].wrapping_add(delta::<u32>(&params) / 2);

        assert_eq!(
            reconstruct(&params, &db.digest, &secret, &ans, 12).err(),
            Some(VpirError::ReconstructionBoundExceeded)
        );
    }

    #[test]
    fn shape_mismatches_are_rejected() {
        let params = small_params(1);
        let (db, mat_a) = setup::<u32>(&params, 61);

        let mut prg = Prg::new(&[62u8; 16]);
        let mut sampler = GaussSampler::seeded(params.sigma, 19);

        assert!(query(&mut prg, &mut sampler, &params, &mat_a, params.m).is_err());

        let bad_q = Matrix::<u32>::new(params.m + 1, 1).unwrap();
        assert_eq!(answer(&db, &bad_q).err(), Some(VpirError::IncompatibleQueryDimension));

        let (secret, q) = query(&mut prg, &mut sampler, &params, &mat_a, 0).unwrap();
        let ans = answer(&db, &q).unwrap();
        assert!(reconstruct(&params, &db.digest, &secret, &ans, params.l).is_err());
    }

    #[test]
    fn amplification_tolerates_a_deviating_answer() {
        let params = small_params(3);
        let (db, mat_a) = setup::<u32>(&params, 71);

        let mut prg = Prg::new(&[72u8; 16]);
        let mut sampler = GaussSampler::seeded(params.sigma, 23);

        let (row, col) = (20usize, 10usize);
        let (secrets, queries) = query_amplified(&mut prg, &mut sampler, &params, &mat_a, col).unwrap();
        assert_eq!(queries.len(), 3);

        let mut answers = answer_amplified(&db, &queries).unwrap();

        // one server deviates on an arbitrary row of its answer
        answers[1][(row, 0)] = answers[1][(row, 0)].wrapping_add(0xdead_beef);

        let bit = reconstruct_amplified(&params, &db.digest, &secrets, &answers, row).unwrap();
        assert_eq!(bit as u128, db.matrix[(row, col)].to_u128());
    }

    #[test]
    fn amplification_fails_without_a_majority() {
        let params = small_params(3);
        let (db, mat_a) = setup::<u32>(&params, 81);

        let mut prg = Prg::new(&[82u8; 16]);
        let mut sampler = GaussSampler::seeded(params.sigma, 29);

        let (secrets, queries) = query_amplified(&mut prg, &mut sampler, &params, &mat_a, 4).unwrap();
        let mut answers = answer_amplified(&db, &queries).unwrap();

        // two of three instances pushed outside the decoding bound
        let off = delta::<u32>(&params) / 2;
        answers[0][(8, 0)] = answers[0][(8, 0)].wrapping_add(off);
        answers[2][(8, 0)] = answers[2][(8, 0)].wrapping_add(off);

        assert_eq!(
            reconstruct_amplified(&params, &db.digest, &secrets, &answers, 8).err(),
            Some(VpirError::MajorityVoteFailed)
        );

        assert_eq!(
            reconstruct_amplified(&params, &db.digest, &secrets, &answers[..2], 8).err(),
            Some(VpirError::WrongNumberOfAnswers { expected: 3, got: 2 })
        );
    }
}
