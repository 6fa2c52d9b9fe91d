//! Per-entity row decoders. Rows are turned into typed structs here and
//! nowhere else.

use std::collections::HashMap;

use polyrisk_common::{parse_variant_id, ModelColumns, ReferenceStats, Variant, VariantKey};

use crate::error::{DbError, Result};
use crate::schema::{
    COL_ALT, COL_ANCESTRY, COL_BETA, COL_CHROM, COL_MAX, COL_MEAN, COL_MIN, COL_MODEL, COL_POS, COL_REF, COL_RISK_ALLELE,
    COL_RSID, COL_STD, COL_TRAIT,
};
use crate::value::{Row, Value};

fn decode_err(entity: &'static str, reason: impl Into<String>) -> DbError {
    DbError::Decode { entity, reason: reason.into() }
}

fn required_f64(row: &Row, col: &str, entity: &'static str) -> Result<f64> {
    row.get(col)
        .and_then(Value::as_f64)
        .ok_or_else(|| decode_err(entity, format!("missing or non-numeric {col}")))
}

fn required_text(row: &Row, col: &str, entity: &'static str) -> Result<String> {
    match row.get(col).and_then(Value::to_text) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(decode_err(entity, format!("missing or empty {col}"))),
    }
}

fn optional_f64(row: &Row, col: &str) -> Option<f64> {
    row.get(col).and_then(Value::as_f64)
}

fn optional_text(row: &Row, col: &str) -> Option<String> {
    row.get(col).and_then(Value::to_text).filter(|s| !s.is_empty())
}

// ── Reference stats ─────────────────────────────────────────────────────────

/// Decode one cache row. Validation of the numbers is left to the caller.
pub fn reference_stats(row: &Row) -> Result<ReferenceStats> {
    const ENTITY: &str = "reference stats";
    Ok(ReferenceStats {
        mean: required_f64(row, COL_MEAN, ENTITY)?,
        std: required_f64(row, COL_STD, ENTITY)?,
        min: required_f64(row, COL_MIN, ENTITY)?,
        max: required_f64(row, COL_MAX, ENTITY)?,
        ancestry: required_text(row, COL_ANCESTRY, ENTITY)?,
        trait_name: required_text(row, COL_TRAIT, ENTITY)?,
        model: required_text(row, COL_MODEL, ENTITY)?,
    })
}

pub fn reference_stats_row(ancestry: &str, trait_name: &str, model: &str, stats: &ReferenceStats) -> Row {
    crate::row! {
        COL_MEAN => stats.mean,
        COL_STD => stats.std,
        COL_MIN => stats.min,
        COL_MAX => stats.max,
        COL_ANCESTRY => ancestry,
        COL_TRAIT => trait_name,
        COL_MODEL => model,
    }
}

// ── Model variants ──────────────────────────────────────────────────────────

/// Decode one PRS model row under the configured column mapping.
///
/// The variant ID, a non-zero effect weight and the effect allele are
/// required; chromosome and position are taken from the ID.
pub fn variant(row: &Row, cols: &ModelColumns) -> Result<Variant> {
    const ENTITY: &str = "model variant";

    let id = required_text(row, &cols.id, ENTITY)?;
    let effect_weight = match optional_f64(row, &cols.effect_weight) {
        Some(w) if w != 0.0 && w.is_finite() => w,
        _ => return Err(decode_err(ENTITY, format!("missing or invalid effect weight for {id}"))),
    };
    let effect_allele = required_text(row, &cols.effect_allele, ENTITY)?;
    let key = parse_variant_id(&id).map_err(|e| decode_err(ENTITY, e.to_string()))?;

    Ok(Variant {
        chromosome: key.chromosome,
        position: key.position,
        id,
        effect_allele,
        other_allele: optional_text(row, &cols.other_allele).unwrap_or_default(),
        effect_weight,
        effect_freq: optional_f64(row, &cols.effect_freq).filter(|f| *f != 0.0),
        beta_value: optional_f64(row, &cols.beta_value),
        beta_ci_lower: optional_f64(row, &cols.beta_ci_lower),
        beta_ci_upper: optional_f64(row, &cols.beta_ci_upper),
        odds_ratio: optional_f64(row, &cols.odds_ratio),
        or_ci_lower: optional_f64(row, &cols.or_ci_lower),
        or_ci_upper: optional_f64(row, &cols.or_ci_upper),
        rsid: optional_text(row, &cols.rsid),
        trait_name: optional_text(row, &cols.trait_name),
    })
}

// ── Allele frequencies ──────────────────────────────────────────────────────

/// A frequency-table row: variant identity plus whichever `AF_*` columns
/// were selected. Null or non-numeric frequency columns are absent.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyRow {
    pub key: VariantKey,
    pub frequencies: HashMap<String, f64>,
}

impl FrequencyRow {
    pub fn variant_id(&self) -> String {
        self.key.id()
    }
}

pub fn frequency_row(row: &Row, frequency_columns: &[String]) -> Result<FrequencyRow> {
    const ENTITY: &str = "allele frequency";

    let chromosome = required_text(row, COL_CHROM, ENTITY)?;
    let position = row
        .get(COL_POS)
        .and_then(Value::as_i64)
        .ok_or_else(|| decode_err(ENTITY, "missing or non-integer pos"))?;
    let reference = required_text(row, COL_REF, ENTITY)?;
    let alternate = required_text(row, COL_ALT, ENTITY)?;

    let frequencies = frequency_columns
        .iter()
        .filter_map(|col| optional_f64(row, col).map(|f| (col.clone(), f)))
        .collect();

    Ok(FrequencyRow {
        key: VariantKey::new(chromosome, position, reference, alternate),
        frequencies,
    })
}

// ── GWAS associations ───────────────────────────────────────────────────────

/// One GWAS association for an rsID. An absent risk allele or trait decodes
/// as empty; such rows annotate with zero dosage or no trait.
#[derive(Debug, Clone, PartialEq)]
pub struct GwasAssociation {
    pub rsid: String,
    pub risk_allele: String,
    pub beta: f64,
    pub trait_name: String,
}

pub fn gwas_association(row: &Row) -> Result<GwasAssociation> {
    const ENTITY: &str = "gwas association";

    let rsid = required_text(row, COL_RSID, ENTITY)?;
    let beta = match optional_f64(row, COL_BETA) {
        Some(b) if b.is_finite() => b,
        _ => return Err(decode_err(ENTITY, format!("missing or non-finite beta for {rsid}"))),
    };
    Ok(GwasAssociation {
        risk_allele: optional_text(row, COL_RISK_ALLELE).unwrap_or_default(),
        trait_name: optional_text(row, COL_TRAIT).unwrap_or_default(),
        rsid,
        beta,
    })
}
