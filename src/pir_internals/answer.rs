use crate::pir_internals::{
    branch_opt_util,
    database::Db,
    error::VpirError,
    field::{self, Element},
};
use rayon::prelude::*;

/// Computes the tag-authenticated answer to a query vector: per row, the
/// blockwise message sums followed by one aggregated tag element.
///
/// The output is bit-identical for every worker count: chunk boundaries
/// depend only on `workers`, and the single-row partials combine under
/// exact field addition, which commutes.
pub fn answer(db: &Db, q: &[Element], workers: usize) -> Result<Vec<Element>, VpirError> {
    let info = &db.info;

    if branch_opt_util::unlikely(q.len() != info.query_elements()) {
        return Err(VpirError::InvalidQueryLength {
            expected: info.query_elements(),
            got: q.len(),
        });
    }

    let workers = workers.max(1);
    let block_size = info.block_size;
    let reply_len = block_size + 1;

    if info.num_rows == 1 {
        // One output slot: split the column range and add up the partials.
        let cols_per_chunk = info.num_columns.div_ceil(workers);

        let partials: Vec<Vec<Element>> = db
            .entries()
            .par_chunks(cols_per_chunk * block_size)
            .zip(q.par_chunks(cols_per_chunk * reply_len))
            .map(|(entry_chunk, q_chunk)| multiply_and_tag(entry_chunk, block_size, q_chunk))
            .collect();

        let mut combined = field::zero_vector(reply_len);
        for partial in partials {
            for (acc, p) in combined.iter_mut().zip(partial) {
                *acc = acc.add(p);
            }
        }

        Ok(combined)
    } else {
        // Split the row range; every worker owns a disjoint output slice.
        let rows_per_chunk = info.num_rows.div_ceil(workers);
        let row_elements = info.num_columns * block_size;

        let mut out = field::zero_vector(info.answer_elements());

        out.par_chunks_mut(rows_per_chunk * reply_len)
            .zip(db.entries().par_chunks(rows_per_chunk * row_elements))
            .for_each(|(out_chunk, entry_chunk)| {
                for (row_idx, row) in entry_chunk.chunks_exact(row_elements).enumerate() {
                    let reply = multiply_and_tag(row, block_size, q);
                    out_chunk[row_idx * reply_len..(row_idx + 1) * reply_len].copy_from_slice(&reply);
                }
            });

        Ok(out)
    }
}

/// Multiplies database entries with the per-column message scalars and
/// accumulates the per-byte tag scalars over the whole slice. `elements`
/// must cover whole blocks and `q` the matching columns.
fn multiply_and_tag(elements: &[Element], block_size: usize, q: &[Element]) -> Vec<Element> {
    let mut sum = field::zero_vector(block_size);
    let mut sum_tag = Element::zero();

    for (j, block) in elements.chunks_exact(block_size).enumerate() {
        let q_col = &q[j * (block_size + 1)..(j + 1) * (block_size + 1)];

        for (b, &entry) in block.iter().enumerate() {
            // no need to multiply if the element value is zero
            if entry.is_zero() {
                continue;
            }
            sum[b] = sum[b].add(entry.mul(q_col[0]));
            sum_tag = sum_tag.add(entry.mul(q_col[1 + b]));
        }
    }

    sum.push(sum_tag);
    sum
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pir_internals::{
        database::Info,
        prg::{Prg, PrgKey},
    };

    fn tiny_single_row_db() -> Db {
        // blocks [1,2] [3,4] [5,6] [7,8]
        let entries = (1..=8).map(Element::from_u32).collect();
        Db::new(Info::new(1, 4, 2), entries, Vec::new()).unwrap()
    }

    /// Query selecting column `target` with message scalar one and the
    /// given tag scalars, zero elsewhere.
    fn selector_query(num_columns: usize, block_size: usize, target: usize, tags: &[Element]) -> Vec<Element> {
        let mut q = field::zero_vector(num_columns * (block_size + 1));
        q[target * (block_size + 1)] = Element::one();
        q[target * (block_size + 1) + 1..(target + 1) * (block_size + 1)].copy_from_slice(tags);
        q
    }

    #[test]
    fn selector_query_extracts_the_block_and_its_tag() {
        let db = tiny_single_row_db();
        let tags = [Element::from_u32(10), Element::from_u32(100)];

        let q = selector_query(4, 2, 2, &tags);
        let reply = answer(&db, &q, 1).unwrap();

        assert_eq!(reply.len(), 3);
        assert_eq!(reply[0], Element::from_u32(5));
        assert_eq!(reply[1], Element::from_u32(6));
        // tag = 5 * 10 + 6 * 100
        assert_eq!(reply[2], Element::from_u32(650));
    }

    #[test]
    fn single_row_answer_is_identical_for_every_worker_count() {
        let key: PrgKey = [17u8; 16];
        let mut prg = Prg::new(&key);
        let db = Db::random_multi_bit(&mut prg, 64 * 1024 * 8, 1, 16).unwrap();

        let mut q_prg = Prg::new(&[18u8; 16]);
        let q = field::random_vector(&mut q_prg, db.info.query_elements());

        let reference = answer(&db, &q, 1).unwrap();
        for workers in [2usize, 3, 5, 8, 64, 1000] {
            assert_eq!(answer(&db, &q, workers).unwrap(), reference, "workers = {}", workers);
        }
    }

    #[test]
    fn multi_row_answer_is_identical_for_every_worker_count() {
        let key: PrgKey = [19u8; 16];
        let mut prg = Prg::new(&key);
        let db = Db::random_multi_bit(&mut prg, 64 * 1024 * 8, 7, 4).unwrap();

        let mut q_prg = Prg::new(&[20u8; 16]);
        let q = field::random_vector(&mut q_prg, db.info.query_elements());

        let reference = answer(&db, &q, 1).unwrap();
        assert_eq!(reference.len(), db.info.answer_elements());

        for workers in [2usize, 3, 4, 7, 16, 1000] {
            assert_eq!(answer(&db, &q, workers).unwrap(), reference, "workers = {}", workers);
        }
    }

    #[test]
    fn multi_row_rows_are_independent_single_row_answers() {
        let key: PrgKey = [21u8; 16];
        let mut prg = Prg::new(&key);
        let db = Db::random_multi_bit(&mut prg, 8 * 1024 * 8, 4, 8).unwrap();

        let mut q_prg = Prg::new(&[22u8; 16]);
        let q = field::random_vector(&mut q_prg, db.info.query_elements());

        let whole = answer(&db, &q, 3).unwrap();

        let reply_len = db.info.block_size + 1;
        let row_elements = db.info.num_columns * db.info.block_size;

        for row_idx in 0..db.info.num_rows {
            let row_entries = db.range(row_idx * row_elements, (row_idx + 1) * row_elements).to_vec();
            let row_db = Db::new(Info::new(1, db.info.num_columns, db.info.block_size), row_entries, Vec::new()).unwrap();
            let row_reply = answer(&row_db, &q, 2).unwrap();

            assert_eq!(&whole[row_idx * reply_len..(row_idx + 1) * reply_len], &row_reply[..]);
        }
    }

    #[test]
    fn wrong_query_length_is_rejected() {
        let db = tiny_single_row_db();
        let q = field::zero_vector(db.info.query_elements() - 1);

        assert_eq!(
            answer(&db, &q, 4).err(),
            Some(VpirError::InvalidQueryLength {
                expected: db.info.query_elements(),
                got: db.info.query_elements() - 1,
            })
        );
    }
}
