//src/sample.rs

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::config::{ImportOptions, LayoutConfig};
use crate::denoise::{parse_denoise_report, DenoiseReport};
use crate::error::{LineageError, LineageWarning, ParseError, Result};
use crate::fasta::{open_text, read_fasta_records};
use crate::taxonomy::{parse_taxonomy_table, TaxonomyMap};
use crate::types::{Amplicon, Haplotype, HaplotypeKind, TaxonomicAssignment};

/// The four pipeline outputs one sample is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleFiles {
    pub amplicons: PathBuf,
    pub haplotypes: PathBuf,
    pub report: PathBuf,
    pub taxonomy: PathBuf,
}

impl SampleFiles {
    pub fn locate(dir: &Path, sample_id: &str, layout: &LayoutConfig) -> Self {
        Self {
            amplicons: layout.amplicon_path(dir, sample_id),
            haplotypes: layout.haplotype_path(dir, sample_id),
            report: layout.report_path(dir, sample_id),
            taxonomy: layout.taxonomy_path(dir, sample_id),
        }
    }

    pub fn paths(&self) -> [&Path; 4] {
        [
            self.amplicons.as_path(),
            self.haplotypes.as_path(),
            self.report.as_path(),
            self.taxonomy.as_path(),
        ]
    }

    /// File a sample-level warning points at.
    pub fn source_of(&self, warning: &LineageWarning) -> &Path {
        match warning {
            LineageWarning::MissingAmpliconSequence { .. } => self.amplicons.as_path(),
            LineageWarning::HaplotypeWithoutCluster { .. }
            | LineageWarning::ClusterWithoutSequence { .. } => self.haplotypes.as_path(),
            _ => self.report.as_path(),
        }
    }

    pub fn missing(&self) -> Vec<PathBuf> {
        self.paths()
            .into_iter()
            .filter(|p| !p.is_file())
            .map(Path::to_path_buf)
            .collect()
    }
}

/// A violated lineage invariant found by [`Sample::check_lineage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineageIssue {
    SizeMismatch {
        haplotype_id: String,
        recorded: u64,
        member_sum: u64,
    },
    MissingSequence {
        haplotype_id: String,
    },
    UnknownMember {
        haplotype_id: String,
        amplicon_id: String,
    },
    SharedAmplicon {
        amplicon_id: String,
        haplotypes: Vec<String>,
    },
    UnassignedAmplicon {
        amplicon_id: String,
    },
}

/// Read-only lineage and taxonomy of one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    sample_id: String,
    amplicons: BTreeMap<String, Amplicon>,
    haplotypes: BTreeMap<String, Haplotype>,
    taxonomy: BTreeMap<String, TaxonomicAssignment>,
}

impl Sample {
    /// Reads and parses the four files of one sample. Nothing is returned
    /// unless every file parsed.
    pub fn import(
        sample_id: &str,
        files: &SampleFiles,
        options: &ImportOptions,
    ) -> Result<(Sample, Vec<LineageWarning>)> {
        let with_context = |path: &Path| {
            let sample_id = sample_id.to_string();
            let path = path.to_path_buf();
            move |source: ParseError| LineageError::Parse {
                sample_id,
                path,
                source,
            }
        };
        let open = |path: &Path| open_text(path).map_err(|e| LineageError::io(path, e));

        let amplicon_seqs = read_fasta_records(open(files.amplicons.as_path())?, true)
            .map_err(with_context(files.amplicons.as_path()))?;
        let haplotype_seqs = read_fasta_records(open(files.haplotypes.as_path())?, true)
            .map_err(with_context(files.haplotypes.as_path()))?;
        let report = parse_denoise_report(open(files.report.as_path())?, options.dialect)
            .map_err(with_context(files.report.as_path()))?;
        let taxonomy = parse_taxonomy_table(open(files.taxonomy.as_path())?, options.taxonomy)
            .map_err(with_context(files.taxonomy.as_path()))?;

        log::debug!(
            "sample {sample_id}: {} amplicons, {} haplotypes, {} report lines, {} taxonomy rows",
            amplicon_seqs.len(),
            haplotype_seqs.len(),
            report.diagnostics.lines,
            taxonomy.len()
        );

        let (sample, warnings) =
            Sample::from_parts(sample_id, amplicon_seqs, haplotype_seqs, report, taxonomy);
        for warning in &warnings {
            log::warn!(
                "sample {sample_id} ({}): {warning}",
                files.source_of(warning).display()
            );
        }
        Ok((sample, warnings))
    }

    /// Composes a sample from already-parsed inputs.
    pub fn from_parts(
        sample_id: &str,
        amplicon_seqs: Vec<(String, String)>,
        haplotype_seqs: Vec<(String, String)>,
        report: DenoiseReport,
        taxonomy: TaxonomyMap,
    ) -> (Sample, Vec<LineageWarning>) {
        let mut warnings = report.diagnostics.warnings;

        let mut amplicon_seqs: AHashMap<String, String> = amplicon_seqs.into_iter().collect();
        let mut amplicons = BTreeMap::new();
        for (id, size) in report.amp_size {
            let sequence = match amplicon_seqs.remove(&id) {
                Some(seq) => seq,
                None => {
                    warnings.push(LineageWarning::MissingAmpliconSequence {
                        amplicon_id: id.clone(),
                    });
                    String::new()
                }
            };
            amplicons.insert(id.clone(), Amplicon { id, sequence, size });
        }

        let mut haplotype_seqs: BTreeMap<String, String> = haplotype_seqs.into_iter().collect();
        let mut hap2amp = report.hap2amp;
        let mut haplotypes = BTreeMap::new();
        for (id, kind) in report.haplotype_order {
            let members = hap2amp.remove(&id).unwrap_or_default();
            let sequence = match kind {
                HaplotypeKind::Signal => {
                    let seq = haplotype_seqs.remove(&id);
                    if seq.is_none() {
                        warnings.push(LineageWarning::ClusterWithoutSequence {
                            haplotype_id: id.clone(),
                        });
                    }
                    seq
                }
                HaplotypeKind::Chimera => None,
            };
            let size = report.hap_size.get(&id).copied();
            haplotypes.insert(
                id.clone(),
                Haplotype {
                    id,
                    kind,
                    sequence,
                    size,
                    members,
                },
            );
        }
        for haplotype_id in haplotype_seqs.into_keys() {
            warnings.push(LineageWarning::HaplotypeWithoutCluster { haplotype_id });
        }

        let sample = Sample {
            sample_id: sample_id.to_string(),
            amplicons,
            haplotypes,
            taxonomy,
        };
        (sample, warnings)
    }

    pub fn sample_id(&self) -> &str {
        &self.sample_id
    }

    pub fn amplicons(&self) -> &BTreeMap<String, Amplicon> {
        &self.amplicons
    }

    pub fn haplotypes(&self) -> &BTreeMap<String, Haplotype> {
        &self.haplotypes
    }

    pub fn taxonomy(&self) -> &BTreeMap<String, TaxonomicAssignment> {
        &self.taxonomy
    }

    pub fn amp_size(&self) -> BTreeMap<&str, u64> {
        self.amplicons
            .values()
            .map(|a| (a.id.as_str(), a.size))
            .collect()
    }

    pub fn hap2amp(&self) -> BTreeMap<&str, &[String]> {
        self.haplotypes
            .values()
            .map(|h| (h.id.as_str(), h.members.as_slice()))
            .collect()
    }

    /// Sizes of signal haplotypes only.
    pub fn hap_size(&self) -> BTreeMap<&str, u64> {
        self.haplotypes
            .values()
            .filter_map(|h| h.size.map(|s| (h.id.as_str(), s)))
            .collect()
    }

    /// Total reads carried by signal haplotypes.
    pub fn total_reads(&self) -> u64 {
        self.haplotypes.values().filter_map(|h| h.size).sum()
    }

    /// Checks the lineage invariants: every amplicon in exactly one
    /// haplotype, and every signal haplotype's size equal to its members'
    /// sum and backed by a sequence.
    pub fn check_lineage(&self) -> Vec<LineageIssue> {
        let mut issues = Vec::new();
        let mut owners: BTreeMap<&str, Vec<String>> = BTreeMap::new();

        for hap in self.haplotypes.values() {
            let mut member_sum = 0u64;
            for member in &hap.members {
                match self.amplicons.get(member) {
                    Some(amp) => member_sum += amp.size,
                    None => issues.push(LineageIssue::UnknownMember {
                        haplotype_id: hap.id.clone(),
                        amplicon_id: member.clone(),
                    }),
                }
                owners.entry(member.as_str()).or_default().push(hap.id.clone());
            }
            if !hap.is_signal() {
                continue;
            }
            let recorded = hap.size.unwrap_or(0);
            if recorded != member_sum {
                issues.push(LineageIssue::SizeMismatch {
                    haplotype_id: hap.id.clone(),
                    recorded,
                    member_sum,
                });
            }
            if hap.sequence.is_none() {
                issues.push(LineageIssue::MissingSequence {
                    haplotype_id: hap.id.clone(),
                });
            }
        }

        let assigned: BTreeSet<&str> = owners.keys().copied().collect();
        for (amplicon_id, haplotypes) in owners {
            if haplotypes.len() > 1 {
                issues.push(LineageIssue::SharedAmplicon {
                    amplicon_id: amplicon_id.to_string(),
                    haplotypes,
                });
            }
        }
        for amplicon_id in self.amplicons.keys() {
            if !assigned.contains(amplicon_id.as_str()) {
                issues.push(LineageIssue::UnassignedAmplicon {
                    amplicon_id: amplicon_id.clone(),
                });
            }
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::denoise::ReportDialect;
    use std::io::Cursor;

    fn seqs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(id, s)| (id.to_string(), s.to_string()))
            .collect()
    }

    fn build(report_text: &str, haplotype_seqs: &[(&str, &str)]) -> (Sample, Vec<LineageWarning>) {
        let report =
            parse_denoise_report(Cursor::new(report_text), ReportDialect::Zotu).unwrap();
        Sample::from_parts(
            "S1",
            seqs(&[("Uniq1", "ACGT"), ("Uniq2", "ACGA"), ("Uniq3", "TTTT")]),
            seqs(haplotype_seqs),
            report,
            TaxonomyMap::new(),
        )
    }

    #[test]
    fn composes_haplotypes_with_sequences() {
        let (sample, warnings) = build(
            "Uniq1;size=100;amp1;\n\
             Uniq2;size=5;denoise,shifted;top=Uniq1\n\
             Uniq3;size=7;amp2;\n\
             Uniq1;size=105;chfilter,zotu;\n\
             Uniq3;size=7;chfilter,chimera;\n",
            &[("Zotu1", "ACGT")],
        );
        assert!(warnings.is_empty(), "{warnings:?}");
        let zotu = &sample.haplotypes()["Zotu1"];
        assert_eq!(zotu.sequence.as_deref(), Some("ACGT"));
        assert_eq!(zotu.size, Some(105));
        let chimera = &sample.haplotypes()["Chimera1"];
        assert_eq!(chimera.size, None);
        assert_eq!(chimera.sequence, None);
        assert_eq!(sample.hap_size(), BTreeMap::from([("Zotu1", 105)]));
        assert_eq!(sample.amplicons()["Uniq2"].sequence, "ACGA");
        assert_eq!(sample.total_reads(), 105);
        assert!(sample.check_lineage().is_empty());
    }

    #[test]
    fn reports_orphans_both_ways() {
        let (sample, warnings) = build(
            "Uniq1;size=10;amp1;\n\
             Uniq1;size=10;chfilter,zotu;\n",
            &[("Zotu2", "ACGT")],
        );
        assert!(warnings.contains(&LineageWarning::ClusterWithoutSequence {
            haplotype_id: "Zotu1".into()
        }));
        assert!(warnings.contains(&LineageWarning::HaplotypeWithoutCluster {
            haplotype_id: "Zotu2".into()
        }));
        assert_eq!(
            sample.check_lineage(),
            vec![LineageIssue::MissingSequence {
                haplotype_id: "Zotu1".into()
            }]
        );
    }

    #[test]
    fn unfinalized_amplicons_are_flagged() {
        let (sample, _) = build(
            "Uniq1;size=10;amp1;\n\
             Uniq3;size=4;amp2;\n\
             Uniq1;size=10;chfilter,zotu;\n",
            &[("Zotu1", "ACGT")],
        );
        assert_eq!(
            sample.check_lineage(),
            vec![LineageIssue::UnassignedAmplicon {
                amplicon_id: "Uniq3".into()
            }]
        );
    }

    #[test]
    fn warnings_point_at_the_file_they_come_from() {
        let files = SampleFiles::locate(Path::new("run"), "S1", &LayoutConfig::default());
        let amplicon = LineageWarning::MissingAmpliconSequence {
            amplicon_id: "Uniq1".into(),
        };
        let orphan = LineageWarning::HaplotypeWithoutCluster {
            haplotype_id: "Zotu9".into(),
        };
        let unresolved = LineageWarning::UnresolvedChfilterReference {
            line_no: 4,
            reference: "Uniq7".into(),
        };
        assert_eq!(files.source_of(&amplicon), files.amplicons.as_path());
        assert_eq!(files.source_of(&orphan), files.haplotypes.as_path());
        assert_eq!(files.source_of(&unresolved), files.report.as_path());
    }

    #[test]
    fn missing_lists_every_absent_file() {
        let files = SampleFiles::locate(
            Path::new("/nonexistent/run"),
            "S1",
            &LayoutConfig::default(),
        );
        assert_eq!(files.missing().len(), 4);
    }
}
