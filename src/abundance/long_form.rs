// src/abundance/long_form.rs

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as FmtWrite;

use ahash::AHashMap;

use super::compute::{compute_abundance, normalize};
use crate::error::{LineageError, Result};
use crate::sample::Sample;
use crate::types::{AbundanceRow, AnnotatedRow, Rank, SampleMetadata};

/// Whether long-form counts are raw reads or per-sample percentages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AbundanceScale {
    #[default]
    Reads,
    Percent,
}

/// Column of a long-form row that `filter_by_occurrence` groups on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LongFormColumn {
    Rank,
    Unit,
    Sample,
}

impl LongFormColumn {
    fn value(self, row: &AbundanceRow) -> &str {
        match self {
            LongFormColumn::Rank => &row.rank_name,
            LongFormColumn::Unit => &row.unit_name,
            LongFormColumn::Sample => &row.sample_id,
        }
    }
}

/// One row per `(sample, target, unit)`.
///
/// Every `(target, unit)` pair seen in any sample is emitted for every
/// sample, with an explicit 0 where the sample lacks it, so the result is
/// a full samples x units rectangle.
pub fn build_long_form<'a, I>(
    samples: I,
    target_rank: Rank,
    unit_rank: Rank,
    scale: AbundanceScale,
) -> Vec<AbundanceRow>
where
    I: IntoIterator<Item = &'a Sample>,
{
    let per_sample: Vec<(&str, BTreeMap<(String, String), f64>)> = samples
        .into_iter()
        .map(|sample| {
            let counts = compute_abundance(sample, target_rank, unit_rank);
            let values: BTreeMap<(String, String), f64> = match scale {
                AbundanceScale::Reads => counts
                    .into_iter()
                    .map(|(k, v)| (k, v as f64))
                    .collect(),
                AbundanceScale::Percent => normalize(&counts),
            };
            (sample.sample_id(), values)
        })
        .collect();

    let keys: BTreeSet<&(String, String)> = per_sample
        .iter()
        .flat_map(|(_, values)| values.keys())
        .collect();

    let mut rows = Vec::with_capacity(keys.len() * per_sample.len());
    for (sample_id, values) in &per_sample {
        for &key in &keys {
            rows.push(AbundanceRow {
                rank_name: key.0.clone(),
                unit_name: key.1.clone(),
                count: values.get(key).copied().unwrap_or(0.0),
                sample_id: sample_id.to_string(),
            });
        }
    }
    rows
}

/// Drops every value of `column` that is observed in fewer than
/// `min_occurrence` rows. Only rows with a non-zero count are occurrences:
/// [`build_long_form`] zero-fills every unit into every sample, so counting
/// zero rows would make every unit occur everywhere. All rows of a dropped
/// value go, zero rows included. `min_occurrence` of 0 or 1 keeps everything.
pub fn filter_by_occurrence(
    rows: Vec<AbundanceRow>,
    column: LongFormColumn,
    min_occurrence: usize,
) -> Vec<AbundanceRow> {
    if min_occurrence <= 1 {
        return rows;
    }
    let mut occurrence: AHashMap<String, usize> = AHashMap::new();
    for row in &rows {
        let seen = occurrence.entry(column.value(row).to_string()).or_insert(0);
        if row.count > 0.0 {
            *seen += 1;
        }
    }
    rows.into_iter()
        .filter(|row| occurrence[column.value(row)] >= min_occurrence)
        .collect()
}

/// Left join of rows with per-sample metadata. Every sample must have an entry.
pub fn join_metadata(
    rows: Vec<AbundanceRow>,
    metadata: &BTreeMap<String, SampleMetadata>,
) -> Result<Vec<AnnotatedRow>> {
    rows.into_iter()
        .map(|row| {
            let meta = metadata
                .get(&row.sample_id)
                .ok_or_else(|| LineageError::MetadataJoinMiss {
                    sample_id: row.sample_id.clone(),
                })?;
            Ok(AnnotatedRow {
                metadata: meta.clone(),
                row,
            })
        })
        .collect()
}

/// Tab-separated text of long-form rows, with a header.
pub fn long_form_text(rows: &[AbundanceRow]) -> String {
    let mut output = String::new();
    output.push_str("sample\trank\tunit\tcount\n");
    for row in rows {
        writeln!(
            output,
            "{}\t{}\t{}\t{}",
            row.sample_id, row.rank_name, row.unit_name, row.count
        )
        .unwrap();
    }
    output
}

/// Like [`long_form_text`], with one extra column per metadata field.
pub fn annotated_text(rows: &[AnnotatedRow]) -> String {
    let fields: BTreeSet<&str> = rows
        .iter()
        .flat_map(|r| r.metadata.keys().map(String::as_str))
        .collect();

    let mut output = String::new();
    output.push_str("sample\trank\tunit\tcount");
    for field in &fields {
        output.push('\t');
        output.push_str(field);
    }
    output.push('\n');

    for annotated in rows {
        let row = &annotated.row;
        write!(
            output,
            "{}\t{}\t{}\t{}",
            row.sample_id, row.rank_name, row.unit_name, row.count
        )
        .unwrap();
        for field in &fields {
            output.push('\t');
            output.push_str(annotated.metadata.get(*field).map(String::as_str).unwrap_or(""));
        }
        output.push('\n');
    }
    output
}
