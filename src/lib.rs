//! Deterministic input pipeline for prong-based energy regression.
//!
//! Declarative [`config::DataConfig`] in, reproducible minibatches out:
//! frames ([`frame`]), derived flat weights ([`weights`]), per-row
//! transforms ([`transforms`]), grouped row access ([`dataset`]), batch
//! generation and decorators ([`generator`]), and the assembly layer
//! tying them together ([`pipeline`]).

pub mod config;
pub mod consts;
pub mod dataset;
pub mod energies;
pub mod error;
pub mod frame;
pub mod generator;
pub mod pipeline;
pub mod row;
pub mod transforms;
pub mod weights;

pub use config::DataConfig;
pub use dataset::Dataset;
pub use error::Error;
pub use generator::{Batch, BatchArray, BatchGenerator, DataGenerator, Prefetcher};
pub use row::Row;
