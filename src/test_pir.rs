#![cfg(test)]

use crate::{
    client::{Client, ItClient},
    pir_internals::{
        database::{self, Info},
        field::{self, Element},
        matrix::Matrix,
        serialization,
    },
    server::{ItServer, Server},
    Db, LweDatabase, ParamsLwe, Prg, Scheme, VpirError,
};
use rayon::prelude::*;

fn answer_all(servers: &[Server<'_>], queries: &[Vec<u8>]) -> Vec<Vec<u8>> {
    servers
        .iter()
        .zip(queries.iter())
        .map(|(server, query)| server.answer_bytes(query).expect("server must answer"))
        .collect()
}

#[test]
fn it_tiny_database_retrieves_the_selected_block() {
    // blocks [1,2] [3,4] [5,6] [7,8], target column 2
    let entries = (1..=8).map(Element::from_u32).collect();
    let db = Db::new(Info::new(1, 4, 2), entries, Vec::new()).expect("database must be valid");

    let mut query_seed = [0u8; 16];
    query_seed[15] = 1;

    let mut client = Client::It(ItClient::with_prg(db.info.clone(), 2, Prg::new(&query_seed)).expect("client setup failed"));
    let queries = client.query_bytes(0, 2).expect("query construction failed");
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0].len(), 4 * 3 * field::BYTES);

    let servers = [Server::new_it(&db), Server::new_it(&db)];
    let answers = answer_all(&servers, &queries);
    assert_eq!(answers[0].len(), 3 * field::BYTES);

    let block = client.reconstruct_bytes(&answers).expect("reconstruction failed");
    assert_eq!(block, [0, 0, 0, 5, 0, 0, 0, 6]);
}

#[test]
fn it_scheme_round_trips_for_every_block_of_a_matrix_database() {
    let mut prg = Prg::new(&[10u8; 16]);
    let db = Db::random_multi_bit(&mut prg, 128 * 1024, 4, 8).expect("database creation failed");

    let servers = [Server::It(ItServer::with_workers(&db, 1)), Server::It(ItServer::with_workers(&db, 3))];
    let mut client = Client::new(Scheme::It, &db.info).expect("client setup failed");

    let row_elements = db.info.num_columns * db.info.block_size;

    for (row, col) in [(0usize, 0usize), (1, 5), (3, db.info.num_columns - 1)] {
        let queries = client.query_bytes(row, col).expect("query construction failed");
        let answers = answer_all(&servers, &queries);
        let block = client.reconstruct_bytes(&answers).expect("reconstruction failed");

        let begin = row * row_elements + col * db.info.block_size;
        let expected = serialization::elements_to_bytes(db.range(begin, begin + db.info.block_size));
        assert_eq!(block, expected, "row = {}, col = {}", row, col);
    }
}

#[test]
fn it_scheme_supports_more_than_two_servers() {
    let mut prg = Prg::new(&[11u8; 16]);
    let db = Db::random_multi_bit(&mut prg, 32 * 1024, 1, 4).expect("database creation failed");

    let mut client = Client::It(ItClient::new(db.info.clone(), 3).expect("client setup failed"));
    let queries = client.query_bytes(0, 7).expect("query construction failed");
    assert_eq!(queries.len(), 3);

    let servers = [Server::new_it(&db), Server::new_it(&db), Server::new_it(&db)];
    let answers = answer_all(&servers, &queries);

    let block = client.reconstruct_bytes(&answers).expect("reconstruction failed");
    let begin = 7 * db.info.block_size;
    assert_eq!(block, serialization::elements_to_bytes(db.range(begin, begin + db.info.block_size)));
}

#[test]
fn it_scheme_rejects_a_perturbed_answer() {
    let mut prg = Prg::new(&[12u8; 16]);
    let db = Db::random_multi_bit(&mut prg, 32 * 1024, 1, 4).expect("database creation failed");

    let servers = [Server::new_it(&db), Server::new_it(&db)];
    let mut client = Client::new(Scheme::It, &db.info).expect("client setup failed");

    let queries = client.query_bytes(0, 3).expect("query construction failed");
    let mut answers = answer_all(&servers, &queries);

    // a single flipped output element must fail the tag check
    answers[1][2] ^= 0x01;

    assert_eq!(client.reconstruct_bytes(&answers).err(), Some(VpirError::TagVerificationFailed));
}

#[test]
fn dpf_scheme_round_trips_and_matches_the_database() {
    let mut prg = Prg::new(&[13u8; 16]);
    let db = Db::random_multi_bit(&mut prg, 64 * 1024, 1, 8).expect("database creation failed");

    let servers = [
        Server::new_dpf(&db, 0).expect("server setup failed"),
        Server::new_dpf(&db, 1).expect("server setup failed"),
    ];
    let mut client = Client::new(Scheme::Dpf, &db.info).expect("client setup failed");

    for col in [0usize, 1, 42, db.info.num_columns - 1] {
        let queries = client.query_bytes(0, col).expect("query construction failed");
        assert_eq!(queries.len(), 2);

        let answers = answer_all(&servers, &queries);
        let block = client.reconstruct_bytes(&answers).expect("reconstruction failed");

        let begin = col * db.info.block_size;
        let expected = serialization::elements_to_bytes(db.range(begin, begin + db.info.block_size));
        assert_eq!(block, expected, "col = {}", col);
    }
}

#[test]
fn dpf_scheme_rejects_a_perturbed_answer() {
    let mut prg = Prg::new(&[14u8; 16]);
    let db = Db::random_multi_bit(&mut prg, 32 * 1024, 1, 4).expect("database creation failed");

    let servers = [
        Server::new_dpf(&db, 0).expect("server setup failed"),
        Server::new_dpf(&db, 1).expect("server setup failed"),
    ];
    let mut client = Client::new(Scheme::Dpf, &db.info).expect("client setup failed");

    let queries = client.query_bytes(0, 9).expect("query construction failed");
    let mut answers = answer_all(&servers, &queries);
    let last = answers[0].len() - 1;
    answers[0][last] ^= 0x80;

    assert_eq!(client.reconstruct_bytes(&answers).err(), Some(VpirError::TagVerificationFailed));
}

#[test]
fn dpf_scheme_requires_a_single_row_layout() {
    let mut prg = Prg::new(&[15u8; 16]);
    let db = Db::random_multi_bit(&mut prg, 32 * 1024, 2, 4).expect("database creation failed");

    assert_eq!(Server::new_dpf(&db, 0).err(), Some(VpirError::InconsistentDatabaseShape));
    assert_eq!(Client::new(Scheme::Dpf, &db.info).err(), Some(VpirError::InconsistentDatabaseShape));
}

#[test]
fn key_database_blocks_are_retrievable_by_hashed_identifier() {
    let mut prg = Prg::new(&[16u8; 16]);
    let db = Db::random_key_db(&mut prg, 64).expect("database creation failed");

    let col = database::hash_to_index(b"0xDEADBEEF1234", db.info.num_columns);

    let servers = [Server::new_it(&db), Server::new_it(&db)];
    let mut client = Client::new(Scheme::It, &db.info).expect("client setup failed");

    let queries = client.query_bytes(0, col).expect("query construction failed");
    let answers = answer_all(&servers, &queries);
    let block = client.reconstruct_bytes(&answers).expect("reconstruction failed");

    let begin = col * db.info.block_size;
    assert_eq!(block, serialization::elements_to_bytes(db.range(begin, begin + db.info.block_size)));
    assert_eq!(block.len(), db.info.key_length);
}

#[test]
fn lwe_scheme_round_trips_with_default_parameters() {
    let params = ParamsLwe::default();

    let mut prg = Prg::new(&[17u8; 16]);
    let db = LweDatabase::<u32>::random(&mut prg, &params).expect("database creation failed");
    let server = Server::new_lwe(&db);

    // bounded-distance decoding may fail occasionally at this sigma
    let trials = 1000usize;
    let successes: usize = (0..trials)
        .into_par_iter()
        .map(|trial| {
            let row = (trial * 7) % params.l;
            let col = (trial * 13) % params.m;

            let mut client = Client::new(Scheme::Lwe, &db.info).expect("client setup failed");
            let queries = client.query_bytes(row, col).expect("query construction failed");
            let answer = server.answer_bytes(&queries[0]).expect("server must answer");

            match client.reconstruct_bytes(&[answer]) {
                Ok(block) => (block == vec![db.matrix[(row, col)] as u8]) as usize,
                Err(_) => 0,
            }
        })
        .sum();

    assert!(successes * 100 >= trials * 99, "only {} of {} trials succeeded", successes, trials);
}

#[test]
fn lwe128_scheme_round_trips() {
    let params = ParamsLwe {
        l: 128,
        m: 64,
        n: 256,
        ..ParamsLwe::default_128()
    };

    let mut prg = Prg::new(&[18u8; 16]);
    let db = LweDatabase::<u64>::random(&mut prg, &params).expect("database creation failed");
    let server = Server::new_lwe128(&db);

    let mut client = Client::new(Scheme::Lwe128, &db.info).expect("client setup failed");

    for (row, col) in [(0usize, 0usize), (77, 33), (127, 63)] {
        let queries = client.query_bytes(row, col).expect("query construction failed");
        let answer = server.answer_bytes(&queries[0]).expect("server must answer");
        let block = client.reconstruct_bytes(&[answer]).expect("reconstruction failed");

        assert_eq!(block, vec![db.matrix[(row, col)] as u8], "row = {}, col = {}", row, col);
    }
}

#[test]
fn amplified_lwe_survives_a_deviating_instance() {
    let params = ParamsLwe::amplified(3);

    let mut prg = Prg::new(&[19u8; 16]);
    let db = LweDatabase::<u32>::random(&mut prg, &params).expect("database creation failed");
    let server = Server::new_lwe(&db);

    let (row, col) = (100usize, 50usize);

    let mut client = Client::new(Scheme::Lwe, &db.info).expect("client setup failed");
    let queries = client.query_bytes(row, col).expect("query construction failed");
    assert_eq!(queries.len(), 1);

    let mut answer = server.answer_bytes(&queries[0]).expect("server must answer");

    // flip an arbitrary row inside the second instance's answer matrix
    let per_matrix_len = 8 + params.l * 4;
    let offset = 4 + per_matrix_len + 8 + row * 4;
    answer[offset..offset + 4].copy_from_slice(&0xdead_beefu32.to_le_bytes());

    let block = client.reconstruct_bytes(&[answer]).expect("majority reconstruction failed");
    assert_eq!(block, vec![db.matrix[(row, col)] as u8]);
}

#[test]
fn lwe_server_rejects_malformed_queries() {
    let params = ParamsLwe::default();

    let mut prg = Prg::new(&[20u8; 16]);
    let db = LweDatabase::<u32>::random(&mut prg, &params).expect("database creation failed");
    let server = Server::new_lwe(&db);

    assert_eq!(server.answer_bytes(&[0u8; 3]).err(), Some(VpirError::MalformedQueryMatrix));

    let wrong_shape = Matrix::<u32>::new(params.m + 1, 1).unwrap().to_bytes();
    assert_eq!(server.answer_bytes(&wrong_shape).err(), Some(VpirError::IncompatibleQueryDimension));
}

#[test]
fn it_server_rejects_wrong_query_lengths() {
    let mut prg = Prg::new(&[21u8; 16]);
    let db = Db::random_multi_bit(&mut prg, 8 * 1024, 1, 4).expect("database creation failed");
    let server = Server::new_it(&db);

    let expected = db.info.query_elements() * field::BYTES;
    assert_eq!(
        server.answer_bytes(&vec![0u8; expected - 4]).err(),
        Some(VpirError::InvalidQueryLength {
            expected,
            got: expected - 4,
        })
    );
}

#[test]
fn dh_scheme_is_recognised_but_not_constructible() {
    let mut prg = Prg::new(&[22u8; 16]);
    let db = Db::random_multi_bit(&mut prg, 8 * 1024, 1, 4).expect("database creation failed");

    assert_eq!(Server::new_dh(&db).err(), Some(VpirError::UnsupportedScheme("dh".to_string())));
    assert_eq!(Client::new(Scheme::Dh, &db.info).err(), Some(VpirError::UnsupportedScheme("dh".to_string())));
}

#[test]
fn clients_enforce_single_pending_query_state() {
    let mut prg = Prg::new(&[23u8; 16]);
    let db = Db::random_multi_bit(&mut prg, 8 * 1024, 1, 4).expect("database creation failed");

    let mut client = Client::new(Scheme::It, &db.info).expect("client setup failed");
    assert_eq!(client.reconstruct_bytes(&[]).err(), Some(VpirError::NoPendingQuery));

    client.query_bytes(0, 1).expect("query construction failed");
    assert_eq!(client.query_bytes(0, 2).err(), Some(VpirError::PendingQueryExists));
}
