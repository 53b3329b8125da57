//! Feedline: keyset-paginated social feeds with an optimistically reconciled client cache.

pub mod application;
pub mod cache;
pub mod client;
pub mod config;
pub mod domain;
pub mod infra;
