//! SNP annotation: joins genotype calls with GWAS associations.
//!
//! The pipeline sees only [`SnpAnnotator`]. [`GwasAnnotator`] is the
//! repository-backed implementation; genotype parsing stays behind
//! [`GenotypeSource`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, instrument};

use polyrisk_common::AnnotatedSnp;
use polyrisk_db::schema::GWAS_COLUMNS;
use polyrisk_db::sql::{placeholder_list, validate_identifier};
use polyrisk_db::{decode, DbError, GwasAssociation, Repository, Value};

#[derive(Debug, Error)]
pub enum AnnotatorError {
    #[error("GWAS service initialization failed: {0}")]
    ServiceInit(String),

    #[error("failed to parse genotype file {path}: {reason}")]
    GenotypeParse { path: String, reason: String },

    #[error("GWAS query against {table} failed: {source}")]
    Query {
        table: String,
        #[source]
        source: DbError,
    },
}

/// Annotated SNPs plus the requested rsIDs that had no genotype call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotation {
    pub annotated: Vec<AnnotatedSnp>,
    pub missing: Vec<String>,
}

#[async_trait]
pub trait SnpAnnotator: Send + Sync {
    async fn annotate(&self, genotype_path: &Path, rsids: &[String]) -> Result<Annotation, AnnotatorError>;
}

#[async_trait]
impl<A: SnpAnnotator + ?Sized> SnpAnnotator for Arc<A> {
    async fn annotate(&self, genotype_path: &Path, rsids: &[String]) -> Result<Annotation, AnnotatorError> {
        (**self).annotate(genotype_path, rsids).await
    }
}

/// Reads genotype calls (`"AG"`, `"TT"`, ...) for the requested rsIDs.
/// rsIDs absent from the file are simply not in the returned map.
pub trait GenotypeSource: Send + Sync {
    fn read(&self, path: &Path, rsids: &[String]) -> Result<BTreeMap<String, String>, AnnotatorError>;
}

/// Copies of `risk_allele` in a two-letter genotype call. Ambiguous or
/// no-call genotypes count as zero.
pub fn compute_dosage(genotype: &str, risk_allele: &str) -> u8 {
    if genotype.len() != 2 || genotype == "NN" || genotype == "--" {
        return 0;
    }
    let mut allele = risk_allele.chars();
    match (allele.next(), allele.next()) {
        (Some(a), None) => genotype.chars().filter(|c| *c == a).count() as u8,
        _ => 0,
    }
}

/// Annotates genotyped SNPs from a GWAS association table, one query per run.
pub struct GwasAnnotator<G> {
    repo: Arc<dyn Repository>,
    table: String,
    genotypes: G,
}

impl<G: GenotypeSource> GwasAnnotator<G> {
    pub fn new(repo: Arc<dyn Repository>, table: &str, genotypes: G) -> Result<Self, AnnotatorError> {
        validate_identifier(table).map_err(|e| AnnotatorError::ServiceInit(e.to_string()))?;
        Ok(Self {
            repo,
            table: table.to_string(),
            genotypes,
        })
    }
}

#[async_trait]
impl<G: GenotypeSource> SnpAnnotator for GwasAnnotator<G> {
    #[instrument(skip(self, rsids), fields(table = %self.table, requested = rsids.len()))]
    async fn annotate(&self, genotype_path: &Path, rsids: &[String]) -> Result<Annotation, AnnotatorError> {
        let calls = self.genotypes.read(genotype_path, rsids)?;
        let missing: Vec<String> = rsids.iter().filter(|r| !calls.contains_key(*r)).cloned().collect();

        let genotyped: BTreeSet<&String> = rsids.iter().filter(|r| calls.contains_key(*r)).collect();
        if genotyped.is_empty() {
            return Ok(Annotation { annotated: Vec::new(), missing });
        }

        let sql = format!(
            "SELECT {} FROM {} WHERE rsid IN ({})",
            GWAS_COLUMNS.join(", "),
            self.table,
            placeholder_list(genotyped.len())
        );
        let args: Vec<Value> = genotyped.iter().map(|r| Value::from(r.as_str())).collect();
        debug!(sql = %sql, "Querying GWAS associations");

        let query_err = |source| AnnotatorError::Query { table: self.table.clone(), source };
        let rows = self.repo.query(&sql, &args).await.map_err(query_err)?;

        // One association per (rsid, trait); a later row replaces an earlier one.
        let mut associations: BTreeMap<(String, String), GwasAssociation> = BTreeMap::new();
        for row in &rows {
            let assoc = decode::gwas_association(row).map_err(query_err)?;
            if calls.contains_key(&assoc.rsid) {
                associations.insert((assoc.rsid.clone(), assoc.trait_name.clone()), assoc);
            }
        }
        if associations.len() < rows.len() {
            debug!(rows = rows.len(), kept = associations.len(), "Collapsed repeated GWAS associations");
        }

        let mut annotated = Vec::with_capacity(associations.len());
        for assoc in associations.into_values() {
            let Some(genotype) = calls.get(&assoc.rsid) else {
                continue;
            };
            annotated.push(AnnotatedSnp {
                dosage: compute_dosage(genotype, &assoc.risk_allele),
                genotype: genotype.clone(),
                rsid: assoc.rsid,
                risk_allele: assoc.risk_allele,
                beta: assoc.beta,
                trait_name: assoc.trait_name,
            });
        }

        info!(annotated = annotated.len(), missing = missing.len(), "Annotated SNPs");
        Ok(Annotation { annotated, missing })
    }
}
