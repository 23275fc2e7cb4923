//! health.quantity_sample.v1 schema
//!
//! This module defines the sample records exchanged with health sources: the
//! synthetic batches written by the fallback generator and the seed files read
//! by the CLI.

mod adapter;
mod sample;

pub use adapter::*;
pub use sample::*;
