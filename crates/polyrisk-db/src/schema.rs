//! Table layouts the core reads and writes.

// =============================================================================
// Reference stats cache
// =============================================================================

pub const COL_MEAN: &str = "mean";
pub const COL_STD: &str = "std";
pub const COL_MIN: &str = "min";
pub const COL_MAX: &str = "max";
pub const COL_ANCESTRY: &str = "ancestry";
pub const COL_TRAIT: &str = "trait";
pub const COL_MODEL: &str = "model";

/// Every column is required and non-null. The (ancestry, trait, model) key is
/// not a schema constraint.
pub const CACHE_COLUMNS: [&str; 7] = [COL_MEAN, COL_STD, COL_MIN, COL_MAX, COL_ANCESTRY, COL_TRAIT, COL_MODEL];

// =============================================================================
// Allele frequencies
// =============================================================================

pub const COL_CHROM: &str = "chrom";
pub const COL_POS: &str = "pos";
pub const COL_REF: &str = "ref";
pub const COL_ALT: &str = "alt";

/// Variant identity columns of the frequency table; the per-ancestry `AF_*`
/// columns come from the resolved ancestry.
pub const FREQUENCY_KEY_COLUMNS: [&str; 4] = [COL_CHROM, COL_POS, COL_REF, COL_ALT];

// =============================================================================
// GWAS associations
// =============================================================================

pub const COL_RSID: &str = "rsid";
pub const COL_RISK_ALLELE: &str = "risk_allele";
pub const COL_BETA: &str = "beta";

pub const GWAS_COLUMNS: [&str; 4] = [COL_RSID, COL_RISK_ALLELE, COL_BETA, COL_TRAIT];

/// Postgres DDL for the cache table, used by the operator `check` command.
pub fn cache_table_ddl(table: &str) -> String {
    format!(
        r#"CREATE TABLE IF NOT EXISTS {table} (
    mean     DOUBLE PRECISION NOT NULL,
    std      DOUBLE PRECISION NOT NULL,
    min      DOUBLE PRECISION NOT NULL,
    max      DOUBLE PRECISION NOT NULL,
    ancestry TEXT NOT NULL,
    trait    TEXT NOT NULL,
    model    TEXT NOT NULL
)"#
    )
}
