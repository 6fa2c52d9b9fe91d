//! Canonical variant identifiers (`chrom:pos:ref:alt`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// The four parts of a canonical variant ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariantKey {
    pub chromosome: String,
    pub position: i64,
    pub reference: String,
    pub alternate: String,
}

impl VariantKey {
    pub fn new(
        chromosome: impl Into<String>,
        position: i64,
        reference: impl Into<String>,
        alternate: impl Into<String>,
    ) -> Self {
        Self {
            chromosome: chromosome.into(),
            position,
            reference: reference.into(),
            alternate: alternate.into(),
        }
    }

    /// Canonical string form, identical to `to_string()`.
    pub fn id(&self) -> String {
        format_variant_id(&self.chromosome, self.position, &self.reference, &self.alternate)
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", self.chromosome, self.position, self.reference, self.alternate)
    }
}

impl FromStr for VariantKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        parse_variant_id(s)
    }
}

pub fn format_variant_id(chromosome: &str, position: i64, reference: &str, alternate: &str) -> String {
    format!("{chromosome}:{position}:{reference}:{alternate}")
}

/// Split a canonical ID into its parts. Exactly four `:`-separated fields are
/// required and the position must be an integer.
pub fn parse_variant_id(id: &str) -> Result<VariantKey> {
    let parts: Vec<&str> = id.split(':').collect();
    if parts.len() != 4 {
        return Err(CoreError::InvalidVariantId(format!("invalid variant ID format: {id}")));
    }

    let position = parts[1]
        .trim()
        .parse::<i64>()
        .map_err(|_| CoreError::InvalidVariantId(format!("invalid position in variant ID: {id}")))?;

    Ok(VariantKey::new(parts[0], position, parts[2], parts[3]))
}
