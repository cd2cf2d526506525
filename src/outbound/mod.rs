//! Outbound adapters: persistence, cache, and bus implementations of the
//! domain ports.

pub mod bus;
pub mod cache;
pub mod persistence;
