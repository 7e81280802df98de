//src/taxonomy.rs

use std::collections::BTreeMap;
use std::io::BufRead;

use crate::config::TaxonomyLayout;
use crate::error::ParseError;
use crate::types::{Rank, TaxonomicAssignment};

pub type TaxonomyMap = BTreeMap<String, TaxonomicAssignment>;

/// Characters that cannot appear in a path component.
const ILLEGAL_PATH_CHARS: [char; 9] = [':', '/', '\\', '*', '?', '"', '<', '>', '|'];

/// Replaces every path-illegal character with `_`.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if ILLEGAL_PATH_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Builds an assignment from the seven block fields, species first.
///
/// The species is sanitized and the reference database's misfiled
/// `Mugil` genus is put back under `Mugilidae`. Everything else,
/// including an empty order, is kept verbatim.
pub fn assignment_from_block(block: &[&str]) -> TaxonomicAssignment {
    let mut ranks: [String; 7] = Default::default();
    for (slot, value) in ranks.iter_mut().zip(block) {
        *slot = value.to_string();
    }
    ranks[Rank::Species.index()] = sanitize(&ranks[Rank::Species.index()]);
    if ranks[Rank::Genus.index()] == "Mugil" {
        ranks[Rank::Family.index()] = "Mugilidae".to_string();
    }
    TaxonomicAssignment { ranks }
}

/// Parses a headerless, comma-separated search result table:
/// ```text
/// <haplotype_id>,<species>,<genus>,<family>,<order>,<class>,<phylum>,<kingdom>,<stats...>
/// ```
/// (the block starts at `layout.block_offset`). A row too short for the block
/// fails the whole table; blank lines are ignored.
pub fn parse_taxonomy_table<R: BufRead>(
    reader: R,
    layout: TaxonomyLayout,
) -> Result<TaxonomyMap, ParseError> {
    let mut table = TaxonomyMap::new();
    let needed = layout.required_fields();

    for (i, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() < needed {
            return Err(ParseError::MalformedRow {
                line_no: i + 1,
                line: line.to_string(),
                found: parts.len(),
                needed,
            });
        }

        let haplotype_id = parts[0].trim().to_string();
        let block = &parts[layout.block_offset..layout.block_offset + 7];
        table.insert(haplotype_id, assignment_from_block(block));
    }
    Ok(table)
}
