use crate::pir_internals::{
    branch_opt_util,
    database::{public_matrix_a, Authenticator, Info},
    error::VpirError,
    field::{self, Element},
    fss::Fss,
    gauss::GaussSampler,
    lwe,
    matrix::{bytes_to_matrices, matrices_to_bytes, Matrix, Word},
    params::{ParamsLwe, Scheme, DEFAULT_NUM_SERVERS},
    prg::Prg,
    serialization,
};
use tracing::debug;

/// Per-retrieval secret state of the tag-authenticated schemes: the target
/// row and the tag scalars embedded at the target column. Consumed on
/// reconstruction.
struct TagQueryState {
    row: usize,
    tags: Vec<Element>,
}

fn sum_answers(info: &Info, answers: &[Vec<u8>], expected_servers: usize) -> Result<Vec<Element>, VpirError> {
    if branch_opt_util::unlikely(answers.len() != expected_servers) {
        return Err(VpirError::WrongNumberOfAnswers {
            expected: expected_servers,
            got: answers.len(),
        });
    }

    let expected_bytes = info.answer_elements() * field::BYTES;
    for ans in answers {
        if branch_opt_util::unlikely(ans.len() != expected_bytes) {
            return Err(VpirError::InvalidAnswerLength {
                expected: expected_bytes,
                got: ans.len(),
            });
        }
    }

    let mut combined = field::zero_vector(info.answer_elements());
    for ans in answers {
        for (acc, chunk) in combined.iter_mut().zip(ans.chunks_exact(field::BYTES)) {
            *acc = acc.add(Element::set_bytes(chunk));
        }
    }

    Ok(combined)
}

/// Shared reconstruction of the IT and DPF schemes: add up the per-server
/// answers, extract the requested row and check the tag equation against
/// the per-retrieval secrets.
fn reconstruct_tagged(info: &Info, state: &TagQueryState, answers: &[Vec<u8>], expected_servers: usize) -> Result<Vec<u8>, VpirError> {
    let combined = sum_answers(info, answers, expected_servers)?;

    let reply_len = info.block_size + 1;
    let reply = &combined[state.row * reply_len..(state.row + 1) * reply_len];
    let (block, tag) = (&reply[..info.block_size], reply[info.block_size]);

    let expected_tag = block
        .iter()
        .zip(state.tags.iter())
        .fold(Element::zero(), |acc, (&b, &t)| acc.add(b.mul(t)));

    if branch_opt_util::unlikely(expected_tag != tag) {
        return Err(VpirError::TagVerificationFailed);
    }

    Ok(serialization::elements_to_bytes(block))
}

/// Client of the multi-server information-theoretic scheme. Queries are
/// additive shares of the selector embedding; any strict subset of servers
/// learns nothing about the retrieved index.
pub struct ItClient {
    info: Info,
    num_servers: usize,
    prg: Prg,
    state: Option<TagQueryState>,
}

impl ItClient {
    pub fn new(info: Info, num_servers: usize) -> Result<ItClient, VpirError> {
        Self::with_prg(info, num_servers, Prg::random())
    }

    /// Deterministic query randomness, for tests and benchmarks.
    pub fn with_prg(info: Info, num_servers: usize, prg: Prg) -> Result<ItClient, VpirError> {
        if branch_opt_util::unlikely(num_servers < 2) {
            return Err(VpirError::MismatchedParameters);
        }
        if branch_opt_util::unlikely(info.num_rows == 0 || info.num_columns == 0 || info.block_size == 0) {
            return Err(VpirError::InconsistentDatabaseShape);
        }

        Ok(ItClient {
            info,
            num_servers,
            prg,
            state: None,
        })
    }

    pub fn query_bytes(&mut self, row: usize, col: usize) -> Result<Vec<Vec<u8>>, VpirError> {
        if branch_opt_util::unlikely(self.state.is_some()) {
            return Err(VpirError::PendingQueryExists);
        }
        if branch_opt_util::unlikely(row >= self.info.num_rows || col >= self.info.num_columns) {
            return Err(VpirError::IncompatibleQueryDimension);
        }

        let reply_len = self.info.block_size + 1;
        let tags = field::random_vector(&mut self.prg, self.info.block_size);

        // selector embedding: message scalar one, then the tag scalars
        let mut selector = field::zero_vector(self.info.query_elements());
        selector[col * reply_len] = Element::one();
        selector[col * reply_len + 1..(col + 1) * reply_len].copy_from_slice(&tags);

        // additive shares summing to the selector
        let mut shares: Vec<Vec<Element>> = (0..self.num_servers - 1)
            .map(|_| field::random_vector(&mut self.prg, self.info.query_elements()))
            .collect();

        let last: Vec<Element> = selector
            .iter()
            .enumerate()
            .map(|(idx, &target)| shares.iter().fold(target, |acc, share| acc.sub(share[idx])))
            .collect();
        shares.push(last);

        self.state = Some(TagQueryState { row, tags });
        debug!(scheme = %Scheme::It, servers = self.num_servers, "query prepared");

        Ok(shares.iter().map(|share| serialization::elements_to_bytes(share)).collect())
    }

    pub fn reconstruct_bytes(&mut self, answers: &[Vec<u8>]) -> Result<Vec<u8>, VpirError> {
        let state = self.state.take().ok_or(VpirError::NoPendingQuery)?;
        reconstruct_tagged(&self.info, &state, answers, self.num_servers)
    }
}

/// Client of the two-server DPF scheme: the selector embedding is
/// compressed into a pair of vector point function keys.
pub struct DpfClient {
    info: Info,
    fss: Fss,
    prg: Prg,
    state: Option<TagQueryState>,
}

impl DpfClient {
    pub fn new(info: Info) -> Result<DpfClient, VpirError> {
        Self::with_prg(info, Prg::random())
    }

    pub fn with_prg(info: Info, prg: Prg) -> Result<DpfClient, VpirError> {
        if branch_opt_util::unlikely(info.num_rows != 1) {
            return Err(VpirError::InconsistentDatabaseShape);
        }

        let fss = Fss::new(info.fss_bit_width())?;
        Ok(DpfClient {
            info,
            fss,
            prg,
            state: None,
        })
    }

    pub fn query_bytes(&mut self, row: usize, col: usize) -> Result<Vec<Vec<u8>>, VpirError> {
        if branch_opt_util::unlikely(self.state.is_some()) {
            return Err(VpirError::PendingQueryExists);
        }
        if branch_opt_util::unlikely(row >= self.info.num_rows || col >= self.info.num_columns) {
            return Err(VpirError::IncompatibleQueryDimension);
        }

        let tags = field::random_vector(&mut self.prg, self.info.block_size);

        let mut embedding = Vec::with_capacity(self.info.block_size + 1);
        embedding.push(Element::one());
        embedding.extend_from_slice(&tags);

        let target = (row * self.info.num_columns + col) as u64;
        let keys = self.fss.generate_vector(target, &embedding);

        self.state = Some(TagQueryState { row, tags });
        debug!(scheme = %Scheme::Dpf, "query prepared");

        Ok(keys.iter().map(serialization::vector_key_to_bytes).collect())
    }

    pub fn reconstruct_bytes(&mut self, answers: &[Vec<u8>]) -> Result<Vec<u8>, VpirError> {
        let state = self.state.take().ok_or(VpirError::NoPendingQuery)?;
        reconstruct_tagged(&self.info, &state, answers, 2)
    }
}

struct LweQueryState<W: Word> {
    row: usize,
    secrets: Vec<Matrix<W>>,
}

/// Client of the single-server lattice scheme. Holds only public material:
/// the parameters, the regenerated matrix `A` and the database digest.
pub struct LweClient<W: Word = u32> {
    params: ParamsLwe,
    mat_a: Matrix<W>,
    digest: Matrix<W>,
    prg: Prg,
    sampler: GaussSampler,
    state: Option<LweQueryState<W>>,
}

impl<W: Word> LweClient<W> {
    pub fn new(info: &Info) -> Result<LweClient<W>, VpirError> {
        let (digest_bytes, params) = match &info.auth {
            Authenticator::Lwe { digest, params } => (digest, params.clone()),
            _ => return Err(VpirError::MismatchedParameters),
        };

        let digest = Matrix::<W>::from_bytes(digest_bytes)?;
        if branch_opt_util::unlikely(digest.num_rows() != params.l || digest.num_cols() != params.n) {
            return Err(VpirError::MismatchedParameters);
        }
        if branch_opt_util::unlikely(info.num_rows != params.l || info.num_columns != params.m) {
            return Err(VpirError::MismatchedParameters);
        }

        let mat_a = public_matrix_a::<W>(&params)?;
        let sampler = GaussSampler::new(params.sigma);

        Ok(LweClient {
            params,
            mat_a,
            digest,
            prg: Prg::random(),
            sampler,
            state: None,
        })
    }

    pub fn query_bytes(&mut self, row: usize, col: usize) -> Result<Vec<Vec<u8>>, VpirError> {
        if branch_opt_util::unlikely(self.state.is_some()) {
            return Err(VpirError::PendingQueryExists);
        }
        if branch_opt_util::unlikely(row >= self.params.l || col >= self.params.m) {
            return Err(VpirError::IncompatibleQueryDimension);
        }

        let (secrets, queries) = lwe::query_amplified(&mut self.prg, &mut self.sampler, &self.params, &self.mat_a, col)?;

        let blob = if self.params.ecc_t > 1 {
            matrices_to_bytes(&queries)?
        } else {
            queries[0].to_bytes()
        };

        self.state = Some(LweQueryState { row, secrets });
        debug!(instances = self.params.ecc_t.max(1), "lattice query prepared");

        Ok(vec![blob])
    }

    pub fn reconstruct_bytes(&mut self, answers: &[Vec<u8>]) -> Result<Vec<u8>, VpirError> {
        let state = self.state.take().ok_or(VpirError::NoPendingQuery)?;

        if branch_opt_util::unlikely(answers.len() != 1) {
            return Err(VpirError::WrongNumberOfAnswers {
                expected: 1,
                got: answers.len(),
            });
        }

        let bit = if self.params.ecc_t > 1 {
            let decoded = bytes_to_matrices::<W>(&answers[0]).map_err(|_| VpirError::InvalidAnswerLength {
                expected: 4 + self.params.ecc_t * (8 + self.params.l * W::BYTES),
                got: answers[0].len(),
            })?;
            lwe::reconstruct_amplified(&self.params, &self.digest, &state.secrets, &decoded, state.row)?
        } else {
            let decoded = Matrix::<W>::from_bytes(&answers[0]).map_err(|_| VpirError::InvalidAnswerLength {
                expected: 8 + self.params.l * W::BYTES,
                got: answers[0].len(),
            })?;
            lwe::reconstruct(&self.params, &self.digest, &state.secrets[0], &decoded, state.row)?
        };

        Ok(vec![bit])
    }
}

/// Scheme-tagged client façade. Construction fixes the scheme out-of-band;
/// the query blobs never carry it.
pub enum Client {
    It(ItClient),
    Dpf(DpfClient),
    Lwe(LweClient<u32>),
    Lwe128(LweClient<u64>),
}

impl Client {
    pub fn new(scheme: Scheme, info: &Info) -> Result<Client, VpirError> {
        match scheme {
            Scheme::It => Ok(Client::It(ItClient::new(info.clone(), DEFAULT_NUM_SERVERS)?)),
            Scheme::Dpf => Ok(Client::Dpf(DpfClient::new(info.clone())?)),
            Scheme::Lwe => Ok(Client::Lwe(LweClient::new(info)?)),
            Scheme::Lwe128 => Ok(Client::Lwe128(LweClient::new(info)?)),
            Scheme::Dh => Err(VpirError::UnsupportedScheme(Scheme::Dh.as_str().to_string())),
        }
    }

    /// Builds the per-server query blobs for the block at `(row, col)`.
    pub fn query_bytes(&mut self, row: usize, col: usize) -> Result<Vec<Vec<u8>>, VpirError> {
        match self {
            Client::It(c) => c.query_bytes(row, col),
            Client::Dpf(c) => c.query_bytes(row, col),
            Client::Lwe(c) => c.query_bytes(row, col),
            Client::Lwe128(c) => c.query_bytes(row, col),
        }
    }

    /// Verifies and decodes the servers' answers into the requested block.
    pub fn reconstruct_bytes(&mut self, answers: &[Vec<u8>]) -> Result<Vec<u8>, VpirError> {
        match self {
            Client::It(c) => c.reconstruct_bytes(answers),
            Client::Dpf(c) => c.reconstruct_bytes(answers),
            Client::Lwe(c) => c.reconstruct_bytes(answers),
            Client::Lwe128(c) => c.reconstruct_bytes(answers),
        }
    }
}
