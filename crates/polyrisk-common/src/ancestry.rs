//! Ancestry resolution for allele-frequency lookups.
//!
//! Maps a (population, gender) pair onto a canonical code (`EUR`, `EUR_MALE`)
//! and the gnomAD v3 frequency columns to try, most specific first.

use std::collections::HashMap;

use tracing::debug;

use crate::config::AncestryConfig;
use crate::error::{CoreError, Result};

const SUPPORTED_POPULATIONS: &[&str] = &["AFR", "AMR", "ASJ", "EAS", "EUR", "FIN", "SAS", "OTH", "AMI"];

/// Empty string is the gender-combined selector.
const SUPPORTED_GENDERS: &[&str] = &["", "MALE", "FEMALE"];

/// Resolved ancestry. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ancestry {
    population: String,
    gender: String,
    code: String,
    description: String,
    precedence: Vec<String>,
}

impl Ancestry {
    /// Resolve a population/gender pair; fails for anything outside the
    /// supported sets.
    pub fn new(population: &str, gender: &str) -> Result<Self> {
        if !is_supported(population, gender) {
            return Err(CoreError::UnsupportedAncestry {
                population: population.to_string(),
                gender: gender.to_string(),
            });
        }

        let column = population_column(population);

        let (precedence, description) = match gender {
            "" => (vec![format!("AF_{column}")], population_description(population).to_string()),
            _ => {
                let suffix = gender.to_ascii_lowercase();
                (
                    vec![
                        format!("AF_{column}_{suffix}"),
                        format!("AF_{column}"),
                        format!("AF_{suffix}"),
                    ],
                    format!("{} ({suffix}s only)", population_name(population)),
                )
            }
        };

        let code = build_code(population, gender);
        debug!(ancestry = %code, columns = ?precedence, "Resolved ancestry");
        Ok(Self {
            population: population.to_string(),
            gender: gender.to_string(),
            code,
            description,
            precedence,
        })
    }

    /// Resolve from the `[ancestry]` configuration section.
    pub fn from_config(cfg: &AncestryConfig) -> Result<Self> {
        if cfg.population.trim().is_empty() {
            return Err(CoreError::MissingAncestryConfig);
        }
        Self::new(cfg.population.trim(), cfg.gender.trim())
    }

    /// Re-resolve a canonical code such as `EUR` or `AFR_FEMALE`.
    pub fn from_code(code: &str) -> Result<Self> {
        match code.split_once('_') {
            Some((population, gender)) => Self::new(population, gender),
            None => Self::new(code, ""),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn population(&self) -> &str {
        &self.population
    }

    /// Empty for the gender-combined ancestry.
    pub fn gender(&self) -> &str {
        &self.gender
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Frequency columns ordered from most to least specific.
    pub fn column_precedence(&self) -> &[String] {
        &self.precedence
    }

    /// Walk the precedence list and return the first strictly positive
    /// frequency with the column that supplied it.
    ///
    /// Zero is treated the same as a missing column: gnomAD reports zero for
    /// strata that were never observed, so a zero falls through to the next
    /// column.
    pub fn select_frequency<'a>(&'a self, row: &HashMap<String, f64>) -> Result<(f64, &'a str)> {
        for column in &self.precedence {
            if let Some(&freq) = row.get(column) {
                if freq > 0.0 {
                    return Ok((freq, column.as_str()));
                }
            }
        }
        Err(CoreError::NoFrequencyData { ancestry: self.code.clone() })
    }
}

impl std::fmt::Display for Ancestry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.code)
    }
}

pub fn is_supported(population: &str, gender: &str) -> bool {
    SUPPORTED_POPULATIONS.contains(&population) && SUPPORTED_GENDERS.contains(&gender)
}

pub fn supported_populations() -> &'static [&'static str] {
    SUPPORTED_POPULATIONS
}

pub fn supported_genders() -> &'static [&'static str] {
    SUPPORTED_GENDERS
}

fn build_code(population: &str, gender: &str) -> String {
    if gender.is_empty() {
        population.to_string()
    } else {
        format!("{population}_{gender}")
    }
}

/// gnomAD column stem for a population code. EUR maps to Non-Finnish European.
fn population_column(population: &str) -> &'static str {
    match population {
        "AFR" => "afr",
        "AMR" => "amr",
        "ASJ" => "asj",
        "EAS" => "eas",
        "EUR" => "nfe",
        "FIN" => "fin",
        "SAS" => "sas",
        "AMI" => "ami",
        _ => "oth",
    }
}

/// Short name used in gendered descriptions.
fn population_name(population: &str) -> &'static str {
    match population {
        "EUR" => "European ancestry",
        _ => population_description(population),
    }
}

fn population_description(population: &str) -> &'static str {
    match population {
        "AFR" => "African-American/African ancestry",
        "AMR" => "Latino ancestry",
        "ASJ" => "Ashkenazi Jewish ancestry",
        "EAS" => "East Asian ancestry",
        "EUR" => "European ancestry (Non-Finnish European)",
        "FIN" => "Finnish ancestry",
        "SAS" => "South Asian ancestry",
        "AMI" => "Amish ancestry",
        _ => "Other ancestry",
    }
}
