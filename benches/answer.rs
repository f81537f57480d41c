use divan;
use vpir::{
    client::Client,
    server::{ItServer, Server},
    Db, LweDatabase, ParamsLwe, Prg, Scheme,
};
use std::time::Duration;

fn main() {
    divan::main();
}

const DB_LEN_BITS: usize = 8 * 1024 * 1024 * 8; // 8 MiB of field elements
const BLOCK_SIZE: usize = 16;

const WORKERS: &[usize] = &[1, 2, 4, 8];

#[divan::bench(args = WORKERS, max_time = Duration::from_secs(60), skip_ext_time = true)]
fn it_answer_single_row(bencher: divan::Bencher, workers: &usize) {
    let mut prg = Prg::new(&[1u8; 16]);
    let db = Db::random_multi_bit(&mut prg, DB_LEN_BITS, 1, BLOCK_SIZE).unwrap();
    let server = ItServer::with_workers(&db, *workers);

    let mut client = Client::new(Scheme::It, &db.info).unwrap();
    let queries = client.query_bytes(0, 0).unwrap();

    bencher.bench(|| server.answer_bytes(&queries[0]).unwrap());
}

#[divan::bench(args = WORKERS, max_time = Duration::from_secs(60), skip_ext_time = true)]
fn it_answer_matrix_layout(bencher: divan::Bencher, workers: &usize) {
    let mut prg = Prg::new(&[2u8; 16]);
    let db = Db::random_multi_bit(&mut prg, DB_LEN_BITS, 64, BLOCK_SIZE).unwrap();
    let server = ItServer::with_workers(&db, *workers);

    let mut client = Client::new(Scheme::It, &db.info).unwrap();
    let queries = client.query_bytes(0, 0).unwrap();

    bencher.bench(|| server.answer_bytes(&queries[0]).unwrap());
}

#[divan::bench(max_time = Duration::from_secs(60), skip_ext_time = true)]
fn dpf_answer(bencher: divan::Bencher) {
    let mut prg = Prg::new(&[3u8; 16]);
    let db = Db::random_multi_bit(&mut prg, DB_LEN_BITS / 8, 1, BLOCK_SIZE).unwrap();
    let server = Server::new_dpf(&db, 0).unwrap();

    let mut client = Client::new(Scheme::Dpf, &db.info).unwrap();
    let queries = client.query_bytes(0, 0).unwrap();

    bencher.bench(|| server.answer_bytes(&queries[0]).unwrap());
}

#[divan::bench(max_time = Duration::from_secs(60), skip_ext_time = true)]
fn lwe_answer(bencher: divan::Bencher) {
    let params = ParamsLwe::default();

    let mut prg = Prg::new(&[4u8; 16]);
    let db = LweDatabase::<u32>::random(&mut prg, &params).unwrap();
    let server = Server::new_lwe(&db);

    let mut client = Client::new(Scheme::Lwe, &db.info).unwrap();
    let queries = client.query_bytes(0, 0).unwrap();

    bencher.bench(|| server.answer_bytes(&queries[0]).unwrap());
}
