pub mod answer;
pub mod branch_opt_util;
pub mod database;
pub mod error;
pub mod field;
pub mod fss;
pub mod gauss;
pub mod lwe;
pub mod matrix;
pub mod params;
pub mod prg;
pub mod serialization;
