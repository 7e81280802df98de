// src/lib.rs
pub mod abundance;
pub mod collection;
pub mod config;
pub mod denoise;
pub mod error;
pub mod fasta;
pub mod sample;
pub mod taxonomy;
pub mod types;

pub use crate::abundance::{AbundanceScale, LongFormColumn};
pub use crate::collection::{ImportMode, ImportReport, SampleCollection};
pub use crate::config::{ImportOptions, LayoutConfig, TaxonomyLayout};
pub use crate::denoise::ReportDialect;
pub use crate::error::{LineageError, LineageWarning, Result};
pub use crate::sample::{LineageIssue, Sample, SampleFiles};
pub use crate::types::{AbundanceRow, AnnotatedRow, Rank};

use crate::abundance::{annotated_text, build_long_form, filter_by_occurrence, join_metadata, long_form_text};

/// What to aggregate and how.
#[derive(Debug, Clone)]
pub struct AbundanceRequest {
    pub target_rank: Rank,
    /// Finer rank each target is broken down by.
    pub unit_rank: Rank,
    pub scale: AbundanceScale,
    /// Units with a non-zero count in fewer rows are dropped; 0 or 1 keeps everything.
    pub min_occurrence: usize,
    /// Join the collection's sample metadata onto every row.
    pub with_metadata: bool,
}

impl Default for AbundanceRequest {
    fn default() -> Self {
        Self {
            target_rank: Rank::Genus,
            unit_rank: Rank::Species,
            scale: AbundanceScale::Reads,
            min_occurrence: 0,
            with_metadata: false,
        }
    }
}

/// Cross-sample abundance table. Text is generated on demand.
#[derive(Debug, Clone)]
pub struct AbundanceReport {
    pub request: AbundanceRequest,
    /// Rectangular long-form rows (after the occurrence filter)
    pub rows: Vec<AbundanceRow>,
    /// Same rows with metadata attached, if requested
    pub annotated_rows: Option<Vec<AnnotatedRow>>,
}

impl AbundanceReport {
    /// Tab-separated long-form table, with metadata columns when joined.
    pub fn get_long_form_text(&self) -> String {
        match &self.annotated_rows {
            Some(annotated) => annotated_text(annotated),
            None => long_form_text(&self.rows),
        }
    }
}

/// Unified entry point: aggregate every sample of `collection` into one
/// zero-filled long-form table, filter rare units, and join metadata.
pub fn build_abundance_report(
    collection: &SampleCollection,
    request: &AbundanceRequest,
) -> Result<AbundanceReport> {
    let rows = build_long_form(
        collection.samples(),
        request.target_rank,
        request.unit_rank,
        request.scale,
    );
    let total = rows.len();
    let rows = filter_by_occurrence(rows, LongFormColumn::Unit, request.min_occurrence);
    log::info!(
        "{} x {} table: {} row(s), {} dropped by occurrence filter",
        request.target_rank,
        request.unit_rank,
        rows.len(),
        total - rows.len()
    );

    let annotated_rows = if request.with_metadata {
        Some(join_metadata(rows.clone(), collection.metadata())?)
    } else {
        None
    };

    Ok(AbundanceReport {
        request: request.clone(),
        rows,
        annotated_rows,
    })
}
