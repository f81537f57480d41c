use crate::pir_internals::{
    answer,
    branch_opt_util,
    database::{Db, Info, LweDatabase},
    error::VpirError,
    field::{self, Element},
    fss::Fss,
    lwe,
    matrix::{bytes_to_matrices, matrices_to_bytes, Matrix, Word},
    params::{default_workers, Scheme},
    serialization,
};
use tracing::debug;

/// Server of the multi-server information-theoretic scheme.
pub struct ItServer<'a> {
    db: &'a Db,
    workers: usize,
}

impl<'a> ItServer<'a> {
    pub fn new(db: &'a Db) -> ItServer<'a> {
        ItServer {
            db,
            workers: default_workers(),
        }
    }

    pub fn with_workers(db: &'a Db, workers: usize) -> ItServer<'a> {
        ItServer {
            db,
            workers: workers.max(1),
        }
    }

    pub fn db_info(&self) -> &Info {
        &self.db.info
    }

    pub fn answer(&self, q: &[Element]) -> Result<Vec<Element>, VpirError> {
        answer::answer(self.db, q, self.workers)
    }

    pub fn answer_bytes(&self, q: &[u8]) -> Result<Vec<u8>, VpirError> {
        let expected = self.db.info.query_elements() * field::BYTES;
        if branch_opt_util::unlikely(q.len() != expected) {
            return Err(VpirError::InvalidQueryLength { expected, got: q.len() });
        }

        let query = serialization::bytes_to_elements(q)?;
        let reply = self.answer(&query)?;
        Ok(serialization::elements_to_bytes(&reply))
    }
}

/// Server of the two-server DPF scheme. The query is a vector point
/// function key; expanding it column by column yields the same query
/// vector shape the information-theoretic engine consumes.
pub struct DpfServer<'a> {
    db: &'a Db,
    party: u8,
    fss: Fss,
    workers: usize,
}

impl<'a> DpfServer<'a> {
    pub fn new(db: &'a Db, party: u8) -> Result<DpfServer<'a>, VpirError> {
        Self::with_workers(db, party, default_workers())
    }

    pub fn with_workers(db: &'a Db, party: u8, workers: usize) -> Result<DpfServer<'a>, VpirError> {
        if branch_opt_util::unlikely(party > 1) {
            return Err(VpirError::MismatchedParameters);
        }
        if branch_opt_util::unlikely(db.info.num_rows != 1) {
            return Err(VpirError::InconsistentDatabaseShape);
        }

        let fss = Fss::new(db.info.fss_bit_width())?;
        Ok(DpfServer {
            db,
            party,
            fss,
            workers: workers.max(1),
        })
    }

    pub fn db_info(&self) -> &Info {
        &self.db.info
    }

    pub fn answer_bytes(&self, q: &[u8]) -> Result<Vec<u8>, VpirError> {
        let key = serialization::vector_key_from_bytes(q)?;

        if branch_opt_util::unlikely(key.cw.len() != self.fss.num_bits()) {
            return Err(VpirError::MalformedFssKey);
        }
        if branch_opt_util::unlikely(key.final_cw.len() != self.db.info.block_size + 1) {
            return Err(VpirError::MalformedFssKey);
        }

        // materialise this party's share of the query vector
        let mut query = Vec::with_capacity(self.db.info.query_elements());
        for col in 0..self.db.info.num_columns {
            let share = self.fss.evaluate_vector(&key, col as u64);
            if self.party == 1 {
                query.extend(share.into_iter().map(Element::neg));
            } else {
                query.extend(share);
            }
        }

        let reply = answer::answer(self.db, &query, self.workers)?;
        Ok(serialization::elements_to_bytes(&reply))
    }
}

/// Server of the single-server lattice scheme, generic over the cell width.
pub struct LweServer<'a, W: Word = u32> {
    db: &'a LweDatabase<W>,
}

impl<'a, W: Word> LweServer<'a, W> {
    pub fn new(db: &'a LweDatabase<W>) -> LweServer<'a, W> {
        LweServer { db }
    }

    pub fn db_info(&self) -> &Info {
        &self.db.info
    }

    pub fn answer(&self, q: &Matrix<W>) -> Result<Matrix<W>, VpirError> {
        lwe::answer(self.db, q)
    }

    pub fn answer_bytes(&self, q: &[u8]) -> Result<Vec<u8>, VpirError> {
        if self.db.params.ecc_t > 1 {
            let queries = bytes_to_matrices::<W>(q).map_err(|_| VpirError::MalformedQueryMatrix)?;
            if branch_opt_util::unlikely(queries.len() != self.db.params.ecc_t) {
                return Err(VpirError::MalformedQueryMatrix);
            }

            let answers = lwe::answer_amplified(self.db, &queries)?;
            matrices_to_bytes(&answers)
        } else {
            let query = Matrix::<W>::from_bytes(q).map_err(|_| VpirError::MalformedQueryMatrix)?;
            Ok(self.answer(&query)?.to_bytes())
        }
    }
}

/// Scheme-tagged server façade: one arm per scheme, each binding a
/// database reference for the server's lifetime. A query arriving for a
/// different scheme than the one fixed here fails to decode.
pub enum Server<'a> {
    It(ItServer<'a>),
    Dpf(DpfServer<'a>),
    Lwe(LweServer<'a, u32>),
    Lwe128(LweServer<'a, u64>),
}

impl<'a> Server<'a> {
    pub fn new_it(db: &'a Db) -> Server<'a> {
        Server::It(ItServer::new(db))
    }

    pub fn new_dpf(db: &'a Db, party: u8) -> Result<Server<'a>, VpirError> {
        Ok(Server::Dpf(DpfServer::new(db, party)?))
    }

    pub fn new_lwe(db: &'a LweDatabase<u32>) -> Server<'a> {
        Server::Lwe(LweServer::new(db))
    }

    pub fn new_lwe128(db: &'a LweDatabase<u64>) -> Server<'a> {
        Server::Lwe128(LweServer::new(db))
    }

    /// The single-server DH scheme is not implemented.
    pub fn new_dh(_db: &'a Db) -> Result<Server<'a>, VpirError> {
        Err(VpirError::UnsupportedScheme(Scheme::Dh.as_str().to_string()))
    }

    pub fn scheme(&self) -> Scheme {
        match self {
            Server::It(_) => Scheme::It,
            Server::Dpf(_) => Scheme::Dpf,
            Server::Lwe(_) => Scheme::Lwe,
            Server::Lwe128(_) => Scheme::Lwe128,
        }
    }

    pub fn db_info(&self) -> &Info {
        match self {
            Server::It(s) => s.db_info(),
            Server::Dpf(s) => s.db_info(),
            Server::Lwe(s) => s.db_info(),
            Server::Lwe128(s) => s.db_info(),
        }
    }

    /// Decodes the query for the scheme fixed at construction, computes
    /// the answer and re-encodes it.
    pub fn answer_bytes(&self, q: &[u8]) -> Result<Vec<u8>, VpirError> {
        debug!(scheme = %self.scheme(), query_bytes = q.len(), "answering query");

        match self {
            Server::It(s) => s.answer_bytes(q),
            Server::Dpf(s) => s.answer_bytes(q),
            Server::Lwe(s) => s.answer_bytes(q),
            Server::Lwe128(s) => s.answer_bytes(q),
        }
    }
}
