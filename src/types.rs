//src/types.rs

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LineageError;

/// Substituted for an empty order assignment when aggregating.
pub const NO_ORDER_LEVEL: &str = "no_order_level";

/// Rank value used for haplotypes that carry reads but no taxonomy row.
pub const UNASSIGNED: &str = "unassigned";

/// A dereplicated amplicon, as recorded by one denoise-report line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amplicon {
    pub id: String,
    pub sequence: String, // empty if the amplicon FASTA lacked this id
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HaplotypeKind {
    /// Kept as biological signal (`Zotu<k>` or `Otu<k>`).
    Signal,
    /// Flagged as a PCR/sequencing artifact (`Chimera<k>`).
    Chimera,
}

/// A finalized cluster of amplicons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Haplotype {
    pub id: String,
    pub kind: HaplotypeKind,
    /// Present only for signal haplotypes found in the haplotype FASTA.
    pub sequence: Option<String>,
    /// Sum of member amplicon sizes; tracked only for signal haplotypes.
    pub size: Option<u64>,
    /// Amplicon ids, in report order. Never empty.
    pub members: Vec<String>,
}

impl Haplotype {
    pub fn is_signal(&self) -> bool {
        self.kind == HaplotypeKind::Signal
    }
}

/// One level of the 7-rank hierarchy, finest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rank {
    Species,
    Genus,
    Family,
    Order,
    Class,
    Phylum,
    Kingdom,
}

impl Rank {
    pub const ALL: [Rank; 7] = [
        Rank::Species,
        Rank::Genus,
        Rank::Family,
        Rank::Order,
        Rank::Class,
        Rank::Phylum,
        Rank::Kingdom,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Rank::Species => "species",
            Rank::Genus => "genus",
            Rank::Family => "family",
            Rank::Order => "order",
            Rank::Class => "class",
            Rank::Phylum => "phylum",
            Rank::Kingdom => "kingdom",
        }
    }

    /// Position inside the taxonomy block of a search result row.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Rank {
    type Err = LineageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rank::ALL
            .iter()
            .copied()
            .find(|rank| rank.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| LineageError::InvalidRank(s.to_string()))
    }
}

/// The 7-rank assignment of one haplotype, species first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomicAssignment {
    pub ranks: [String; 7],
}

impl TaxonomicAssignment {
    pub fn get(&self, rank: Rank) -> &str {
        &self.ranks[rank.index()]
    }

    /// `{rank: value}` view over all 7 ranks.
    pub fn to_map(&self) -> BTreeMap<Rank, &str> {
        Rank::ALL.iter().map(|&r| (r, self.get(r))).collect()
    }
}

/// Free-form per-sample annotations (site, date, depth, ...).
pub type SampleMetadata = BTreeMap<String, String>;

/// A long-form abundance fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbundanceRow {
    pub rank_name: String,
    pub unit_name: String,
    pub count: f64,
    pub sample_id: String,
}

/// An `AbundanceRow` after the left join with sample metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedRow {
    pub row: AbundanceRow,
    pub metadata: SampleMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_parses_case_insensitively() {
        assert_eq!("Genus".parse::<Rank>().unwrap(), Rank::Genus);
        assert_eq!(" order ".parse::<Rank>().unwrap(), Rank::Order);
        assert!("strain".parse::<Rank>().is_err());
    }

    #[test]
    fn rank_index_follows_block_order() {
        let names: Vec<&str> = Rank::ALL.iter().map(|r| r.name()).collect();
        assert_eq!(
            names,
            ["species", "genus", "family", "order", "class", "phylum", "kingdom"]
        );
        assert_eq!(Rank::Kingdom.index(), 6);
    }
}
