//! Synthetic HTTP load generation.
//!
//! A [`producer::LoadProducer`] runs a pool of independent workers. Each
//! worker picks an endpoint by weight, issues one request, records the
//! outcome, and paces itself according to a [`load_pattern::LoadConfig`]
//! until the producer is stopped.

pub mod client;
pub mod config;
pub mod endpoint;
pub mod errors;
pub mod executor;
pub mod load_pattern;
pub mod metrics;
pub mod producer;
pub mod shutdown;
pub mod utils;
pub mod worker;
