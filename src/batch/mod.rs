//! Request batching for the expensive generation call

pub mod batcher;

pub use batcher::{BatchDispatch, BatchError, RequestBatcher};
