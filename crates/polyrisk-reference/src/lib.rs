//! polyrisk-reference — Reference statistics for PRS normalisation.
//!
//! Resolves (ancestry, trait, model) statistics from the cache and computes
//! the misses from the model's variants and population allele frequencies.

pub mod error;
pub mod service;
pub mod stats;

pub use error::{ReferenceError, Result};
pub use service::{ComputedBatch, ReferenceService, TraitFrequencies};
pub use stats::{compute, ComputeError, Distribution};
