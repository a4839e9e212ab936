//! Error taxonomy for the data pipeline.
//!
//! Two classes of failure exist here:
//! - [`Error::Config`]: malformed or contradictory declarative configuration
//!   (unknown column, group or transform parameter). Raised eagerly at
//!   construction time, never deferred to batch-fetch time.
//! - [`Error::Batch`]: an internal invariant about batch shape or
//!   non-emptiness was violated at fetch time. Treated as a defect and
//!   propagated, not retried.
//!
//! Fallible operations return `anyhow::Result`, so either variant can be
//! recovered with `err.downcast_ref::<Error>()` when the class matters.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("batch error: {0}")]
    Batch(String),
}

impl Error {
    /// Shorthand for an `anyhow`-wrapped configuration error.
    pub fn config(msg: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(Error::Config(msg.into()))
    }

    /// Shorthand for an `anyhow`-wrapped batch invariant error.
    pub fn batch(msg: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(Error::Batch(msg.into()))
    }
}
