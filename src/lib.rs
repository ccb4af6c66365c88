//! Partscope bench binary internals, exposed for integration tests

pub mod bench;
