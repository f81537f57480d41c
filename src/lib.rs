//! vpir: Verifiable **P**rivate **I**nformation **R**etrieval.
//!
//! This crate implements the cryptographic core of a verifiable PIR service: a client fetches a block from a replicated
//! database without revealing which one, and verifies that the servers answered honestly instead of returning a tampered
//! or random block.
//!
//! ## Schemes
//!
//! * **`it`**: multi-server information-theoretic scheme. Queries are additive shares of a selector embedding over a
//!   prime field; every answer carries a per-block authentication tag the client checks against its per-retrieval secrets.
//! * **`dpf`**: two-server variant of the above with the query compressed into a pair of distributed point function keys.
//! * **`lwe` / `lwe-128`**: single-server lattice scheme over 32-bit or 64-bit matrix cells, verified against a public
//!   database digest, with optional ECC-style amplification across independent instances.
//!
//! ## Usage
//!
//! This crate is designed to be used in conjunction with other crates which provide the communication mechanism between
//! clients and servers; only byte blobs cross the boundary. You'll typically interact with the `Client` and `Server`
//! enums to construct queries, answer them and reconstruct-with-verification.
//!
//! ```rust
//! use vpir::{client::Client, server::Server, Db, Prg, Scheme};
//!
//! fn main() {
//!     // Deterministic database for the example; real deployments import one.
//!     let mut prg = Prg::new(&[1u8; 16]);
//!     let db = Db::random_multi_bit(&mut prg, 16 * 1024, 1, 8).expect("database creation failed");
//!
//!     // Two non-colluding servers hold replicas of the same database.
//!     let servers = [Server::new_it(&db), Server::new_it(&db)];
//!
//!     let mut client = Client::new(Scheme::It, &db.info).expect("client setup failed");
//!     let queries = client.query_bytes(0, 3).expect("query construction failed");
//!
//!     let answers: Vec<Vec<u8>> = servers
//!         .iter()
//!         .zip(queries.iter())
//!         .map(|(server, query)| server.answer_bytes(query).expect("server failed to answer"))
//!         .collect();
//!
//!     let block = client.reconstruct_bytes(&answers).expect("answers failed verification");
//!     assert_eq!(block.len(), 8 * 4);
//! }
//! ```
//!
//! ## Modules
//!
//! * `server`: the `Server` façade, dispatching scheme-tagged byte queries against an immutable database.
//! * `client`: the `Client` façade, constructing per-server queries and verifying answers.

pub use pir_internals::database::{Authenticator, Db, Info, KeyInfo, LweDatabase};
pub use pir_internals::error::VpirError;
pub use pir_internals::field::Element;
pub use pir_internals::params::{ParamsLwe, Scheme};
pub use pir_internals::prg::{Prg, PrgKey};

pub mod client;
pub mod server;

mod pir_internals;

mod test_pir;
