pub mod cleanup;
pub mod migrate;
