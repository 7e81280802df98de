//! Error and warning types for haplolineage

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for haplolineage operations
pub type Result<T> = std::result::Result<T, LineageError>;

/// Failures raised by the pure per-format parsers.
///
/// These carry the offending line content but no file or sample context;
/// `LineageError::Parse` attaches both.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A denoise-report line without a `size=<int>` token
    #[error("missing or invalid size=<int> token in report line {line_no}: {line:?}")]
    MissingSizeToken { line_no: usize, line: String },

    /// A denoise-report line that cannot be interpreted
    #[error("malformed report line {line_no} ({reason}): {line:?}")]
    MalformedReportLine {
        line_no: usize,
        line: String,
        reason: String,
    },

    /// A chfilter disposition other than the dialect's signal keyword or "chimera"
    #[error("unknown disposition in report line {line_no}: {line:?}")]
    UnknownDisposition { line_no: usize, line: String },

    /// A taxonomy row too short to hold the 7-rank block
    #[error("taxonomy row {line_no} has {found} fields, need at least {needed}: {line:?}")]
    MalformedRow {
        line_no: usize,
        line: String,
        found: usize,
        needed: usize,
    },

    #[error("invalid FASTA: {0}")]
    MalformedFasta(String),
}

/// Error types surfaced to callers of the library
#[derive(Debug, Error)]
pub enum LineageError {
    /// Every required input that was absent, collected before any parsing
    #[error("missing {} required file(s): {}", .paths.len(), join_paths(.paths))]
    MissingFiles { paths: Vec<PathBuf> },

    #[error("sample {sample_id}: failed to parse {}: {source}", .path.display())]
    Parse {
        sample_id: String,
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sample {sample_id} has no metadata entry")]
    MetadataJoinMiss { sample_id: String },

    #[error("unknown sample id {0}")]
    UnknownSample(String),

    #[error("refusing to overwrite existing collection {}", .path.display())]
    CollectionExists { path: PathBuf },

    #[error("collection (de)serialization failed: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("invalid rank name {0:?}")]
    InvalidRank(String),

    #[error("malformed metadata table {}: {reason}", .path.display())]
    MalformedMetadata { path: PathBuf, reason: String },
}

impl LineageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LineageError::Io {
            path: path.into(),
            source,
        }
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Conditions that are recovered locally, logged, and handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineageWarning {
    /// A merge or import met a sample id already present; the first one was kept
    DuplicateSampleId { sample_id: String },
    /// A chfilter line finalized a cluster key that was never opened (or already closed)
    UnresolvedChfilterReference { line_no: usize, reference: String },
    /// A provisional cluster that no chfilter line finalized
    UnfinalizedCluster { key: String, members: usize },
    /// A haplotype FASTA record with no finalized cluster behind it
    HaplotypeWithoutCluster { haplotype_id: String },
    /// A finalized signal cluster missing from the haplotype FASTA
    ClusterWithoutSequence { haplotype_id: String },
    /// A report amplicon missing from the amplicon FASTA
    MissingAmpliconSequence { amplicon_id: String },
}

impl fmt::Display for LineageWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineageWarning::DuplicateSampleId { sample_id } => {
                write!(f, "duplicate sample id {sample_id}, keeping the existing one")
            }
            LineageWarning::UnresolvedChfilterReference { line_no, reference } => write!(
                f,
                "chfilter line {line_no} references {reference}, which has no open cluster; skipped"
            ),
            LineageWarning::UnfinalizedCluster { key, members } => {
                write!(f, "cluster {key} ({members} amplicons) was never finalized")
            }
            LineageWarning::HaplotypeWithoutCluster { haplotype_id } => {
                write!(f, "haplotype {haplotype_id} has a sequence but no cluster")
            }
            LineageWarning::ClusterWithoutSequence { haplotype_id } => {
                write!(f, "haplotype {haplotype_id} has a cluster but no sequence")
            }
            LineageWarning::MissingAmpliconSequence { amplicon_id } => {
                write!(f, "amplicon {amplicon_id} is not in the amplicon FASTA")
            }
        }
    }
}

/// A warning tagged with the sample it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleWarning {
    pub sample_id: String,
    pub warning: LineageWarning,
}

impl fmt::Display for SampleWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sample {}: {}", self.sample_id, self.warning)
    }
}
