// src/denoise/report.rs

use std::collections::BTreeMap;
use std::io::BufRead;

use ahash::AHashMap;

use super::ReportDialect;
use crate::error::{LineageWarning, ParseError};
use crate::types::HaplotypeKind;

/// Everything a denoise report says about one sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DenoiseReport {
    /// Read count of every amplicon named by a clustering line.
    pub amp_size: BTreeMap<String, u64>,
    /// Minted haplotype id -> member amplicon ids, in report order.
    pub hap2amp: BTreeMap<String, Vec<String>>,
    /// Minted signal haplotype id -> sum of member sizes. Chimeras are absent.
    pub hap_size: BTreeMap<String, u64>,
    /// Minted ids in the order the finalize lines appeared.
    pub haplotype_order: Vec<(String, HaplotypeKind)>,
    pub diagnostics: ReportDiagnostics,
}

/// Recovered oddities met while parsing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportDiagnostics {
    pub lines: usize,
    pub warnings: Vec<LineageWarning>,
}

/// A provisional cluster. Members only move when one provisional cluster
/// is folded into another; finalizing touches the key map alone.
#[derive(Debug, Default)]
struct Cluster {
    members: Vec<String>,
    merged_into: Option<usize>,
}

#[derive(Debug, Default)]
struct ClusterArena {
    clusters: Vec<Cluster>,
    /// Open (not yet finalized) cluster key -> arena index.
    open: AHashMap<String, usize>,
    /// Amplicon id -> arena index it was pushed into (may be stale after a merge).
    member_of: AHashMap<String, usize>,
}

impl ClusterArena {
    fn resolve(&self, mut idx: usize) -> usize {
        while let Some(next) = self.clusters[idx].merged_into {
            idx = next;
        }
        idx
    }

    fn open_cluster(&mut self, key: &str) -> usize {
        if let Some(&idx) = self.open.get(key) {
            return self.resolve(idx);
        }
        let idx = self.clusters.len();
        self.clusters.push(Cluster::default());
        self.open.insert(key.to_string(), idx);
        idx
    }

    /// Cluster a noise amplicon joins: an open cluster keyed by `top`, the cluster
    /// `top` itself already sits in, or a fresh cluster keyed by `top`.
    fn target_of(&mut self, top: &str) -> usize {
        if let Some(&idx) = self.open.get(top) {
            return self.resolve(idx);
        }
        if let Some(&idx) = self.member_of.get(top) {
            return self.resolve(idx);
        }
        self.open_cluster(top)
    }

    /// Folds the open cluster keyed by `key` (if any) into `target`.
    fn fold_into(&mut self, key: &str, target: usize) {
        let Some(idx) = self.open.get(key).copied() else {
            return;
        };
        let source = self.resolve(idx);
        if source == target {
            return;
        }
        self.open.remove(key);
        let moved = std::mem::take(&mut self.clusters[source].members);
        self.clusters[target].members.extend(moved);
        self.clusters[source].merged_into = Some(target);
    }

    fn push(&mut self, idx: usize, amplicon_id: &str) {
        self.clusters[idx].members.push(amplicon_id.to_string());
        self.member_of.insert(amplicon_id.to_string(), idx);
    }
}

enum ReportLine<'a> {
    Denoise {
        amplicon_id: &'a str,
        size: u64,
        top: &'a str,
    },
    Finalize {
        key: &'a str,
        size: u64,
        kind: HaplotypeKind,
    },
}

/// Parses a denoise report, one line at a time and strictly in file order.
///
/// Clustering lines record `amp_size` and append the amplicon to the cluster
/// of its top reference (its own id for `amp<k>` self-seeds). Finalize lines
/// rename an open cluster to the next `Zotu<n>`/`Chimera<n>` id; a finalize
/// line naming no open cluster is skipped with a warning.
pub fn parse_denoise_report<R: BufRead>(
    mut reader: R,
    dialect: ReportDialect,
) -> Result<DenoiseReport, ParseError> {
    let mut report = DenoiseReport::default();
    let mut arena = ClusterArena::default();
    let mut finalized: Vec<(String, HaplotypeKind, usize)> = Vec::new();
    let mut next_signal = 1usize;
    let mut next_chimera = 1usize;

    let mut line = String::new();
    let mut line_no = 0usize;
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break; // EOF
        }
        line_no += 1;

        let Some(parsed) = classify_line(line.trim_end(), line_no, dialect)? else {
            continue;
        };

        match parsed {
            ReportLine::Denoise {
                amplicon_id,
                size,
                top,
            } => {
                if arena.member_of.contains_key(amplicon_id) {
                    return Err(ParseError::MalformedReportLine {
                        line_no,
                        line: line.trim_end().to_string(),
                        reason: "amplicon already clustered".into(),
                    });
                }
                report.amp_size.insert(amplicon_id.to_string(), size);

                let idx = if top == amplicon_id {
                    arena.open_cluster(amplicon_id)
                } else {
                    let target = arena.target_of(top);
                    arena.fold_into(amplicon_id, target);
                    target
                };
                arena.push(idx, amplicon_id);
            }
            ReportLine::Finalize { key, size, kind } => {
                let Some(idx) = arena.open.remove(key) else {
                    log::debug!("finalize line {line_no} references unknown cluster {key}");
                    report
                        .diagnostics
                        .warnings
                        .push(LineageWarning::UnresolvedChfilterReference {
                            line_no,
                            reference: key.to_string(),
                        });
                    continue;
                };
                let counter = match kind {
                    HaplotypeKind::Signal => &mut next_signal,
                    HaplotypeKind::Chimera => &mut next_chimera,
                };
                let id = format!("{}{}", dialect.prefix(kind), *counter);
                *counter += 1;
                log::trace!("{key} -> {id} (reported size {size})");
                finalized.push((id, kind, arena.resolve(idx)));
            }
        }
    }
    report.diagnostics.lines = line_no;

    for (id, kind, idx) in finalized {
        let members = arena.clusters[arena.resolve(idx)].members.clone();
        if kind == HaplotypeKind::Signal {
            let size = members
                .iter()
                .map(|a| report.amp_size.get(a).copied().unwrap_or(0))
                .sum();
            report.hap_size.insert(id.clone(), size);
        }
        report.hap2amp.insert(id.clone(), members);
        report.haplotype_order.push((id, kind));
    }

    let mut unfinalized: Vec<(&String, usize)> = arena
        .open
        .iter()
        .map(|(key, &idx)| (key, arena.resolve(idx)))
        .collect();
    unfinalized.sort_by_key(|&(_, idx)| idx);
    for (key, idx) in unfinalized {
        report
            .diagnostics
            .warnings
            .push(LineageWarning::UnfinalizedCluster {
                key: key.clone(),
                members: arena.clusters[idx].members.len(),
            });
    }

    Ok(report)
}

/// Splits a report line into fields. Fields are `;`- or tab-separated and
/// empty fields are dropped, so `Uniq1;size=3;\tamp1` and `Uniq1;size=3;amp1;`
/// read the same.
fn classify_line(
    text: &str,
    line_no: usize,
    dialect: ReportDialect,
) -> Result<Option<ReportLine<'_>>, ParseError> {
    let fields: Vec<&str> = text
        .split([';', '\t'])
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .collect();
    if fields.is_empty() {
        return Ok(None);
    }

    let malformed = |reason: &str| ParseError::MalformedReportLine {
        line_no,
        line: text.to_string(),
        reason: reason.to_string(),
    };

    let size = fields
        .get(1)
        .and_then(|f| f.strip_prefix("size="))
        .and_then(|n| n.parse::<u64>().ok())
        .ok_or_else(|| ParseError::MissingSizeToken {
            line_no,
            line: text.to_string(),
        })?;

    let tokens: Vec<&str> = fields[2..]
        .iter()
        .flat_map(|f| f.split(','))
        .map(str::trim)
        .collect();

    if tokens.contains(&dialect.finalize_marker()) {
        let kind = dialect
            .disposition(tokens.iter().copied())
            .ok_or_else(|| ParseError::UnknownDisposition {
                line_no,
                line: text.to_string(),
            })?;
        return Ok(Some(ReportLine::Finalize {
            key: fields[0],
            size,
            kind,
        }));
    }

    let amplicon_id = fields[0];
    if tokens.iter().any(|t| is_seed_marker(t)) {
        return Ok(Some(ReportLine::Denoise {
            amplicon_id,
            size,
            top: amplicon_id,
        }));
    }

    if !tokens
        .iter()
        .any(|t| *t == dialect.denoise_marker() || *t == "shifted" || *t == "bad")
    {
        return Err(malformed("neither a clustering nor a finalize line"));
    }
    let top = tokens
        .iter()
        .find_map(|t| t.strip_prefix("top="))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| malformed("noise line without top=<id>"))?;

    Ok(Some(ReportLine::Denoise {
        amplicon_id,
        size,
        top,
    }))
}

/// `amp<k>`: the amplicon seeds its own cluster.
fn is_seed_marker(token: &str) -> bool {
    token
        .strip_prefix("amp")
        .map(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(text: &str) -> DenoiseReport {
        parse_denoise_report(Cursor::new(text), ReportDialect::Zotu).unwrap()
    }

    #[test]
    fn noise_joins_its_seed() {
        let report = parse(
            "Uniq1;size=100;amp1;\n\
             Uniq2;size=5;denoise,shifted;top=Uniq1\n\
             Uniq1;size=100;chfilter,zotu;\n",
        );
        assert_eq!(
            report.hap2amp,
            BTreeMap::from([(
                "Zotu1".to_string(),
                vec!["Uniq1".to_string(), "Uniq2".to_string()]
            )])
        );
        assert_eq!(report.hap_size, BTreeMap::from([("Zotu1".to_string(), 105)]));
        assert!(report.diagnostics.warnings.is_empty());
        assert_eq!(report.diagnostics.lines, 3);
    }

    #[test]
    fn seed_marker_after_denoise_token() {
        let report = parse(
            "Uniq1;size=100;\tdenoise\tamp1\n\
             Uniq2;size=5;\tdenoise\tshifted\ttop=Uniq1\n\
             Uniq3;size=20;denoise,amp2;\n\
             Uniq1;size=100;\tchfilter\tzotu\n\
             Uniq3;size=20;chfilter,zotu;\n",
        );
        assert_eq!(report.hap2amp["Zotu1"], ["Uniq1", "Uniq2"]);
        assert_eq!(report.hap2amp["Zotu2"], ["Uniq3"]);
        assert_eq!(report.hap_size["Zotu1"], 105);
        assert!(report.diagnostics.warnings.is_empty());
    }

    #[test]
    fn numbering_follows_file_order_per_disposition() {
        let report = parse(
            "Uniq1;size=50;amp1;\n\
             Uniq2;size=40;amp2;\n\
             Uniq3;size=30;amp3;\n\
             Uniq4;size=20;amp4;\n\
             Uniq3;size=30;chfilter,zotu;\n\
             Uniq2;size=40;chfilter,chimera;\n\
             Uniq1;size=50;chfilter,zotu;\n\
             Uniq4;size=20;chfilter,chimera;\n",
        );
        let order: Vec<&str> = report
            .haplotype_order
            .iter()
            .map(|(id, _)| id.as_str())
            .collect();
        assert_eq!(order, ["Zotu1", "Chimera1", "Zotu2", "Chimera2"]);
        assert_eq!(report.hap2amp["Zotu1"], ["Uniq3"]);
        assert_eq!(report.hap2amp["Zotu2"], ["Uniq1"]);
        assert_eq!(report.hap2amp["Chimera2"], ["Uniq4"]);
        assert!(!report.hap_size.contains_key("Chimera1"));
        assert_eq!(report.hap_size["Zotu2"], 50);
    }

    #[test]
    fn unresolved_finalize_is_skipped_without_rollback() {
        let report = parse(
            "Uniq1;size=10;amp1;\n\
             Uniq9;size=3;chfilter,zotu;\n\
             Uniq1;size=10;chfilter,zotu;\n",
        );
        assert_eq!(report.hap2amp.len(), 1);
        assert_eq!(report.hap2amp["Zotu1"], ["Uniq1"]);
        assert_eq!(report.amp_size["Uniq1"], 10);
        assert_eq!(
            report.diagnostics.warnings,
            vec![LineageWarning::UnresolvedChfilterReference {
                line_no: 2,
                reference: "Uniq9".into()
            }]
        );
    }

    #[test]
    fn finalizing_twice_warns() {
        let report = parse(
            "Uniq1;size=10;amp1;\n\
             Uniq1;size=10;chfilter,zotu;\n\
             Uniq1;size=10;chfilter,zotu;\n",
        );
        assert_eq!(report.hap2amp.len(), 1);
        assert_eq!(report.diagnostics.warnings.len(), 1);
    }

    #[test]
    fn missing_size_token_is_fatal() {
        let err = parse_denoise_report(
            Cursor::new("Uniq1;amp1;\n"),
            ReportDialect::Zotu,
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::MissingSizeToken { line_no: 1, .. }));

        let err = parse_denoise_report(
            Cursor::new("Uniq1;size=ten;amp1;\n"),
            ReportDialect::Zotu,
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::MissingSizeToken { .. }));
    }

    #[test]
    fn noise_before_seed_and_chains_resolve() {
        // Uniq3 points at Uniq2, which itself is noise of Uniq1.
        let report = parse(
            "Uniq2;size=8;denoise,shifted;top=Uniq1\n\
             Uniq1;size=100;amp1;\n\
             Uniq3;size=2;denoise,bad;top=Uniq2\n\
             Uniq1;size=100;chfilter,zotu;\n",
        );
        assert_eq!(report.hap2amp["Zotu1"], ["Uniq2", "Uniq1", "Uniq3"]);
        assert_eq!(report.hap_size["Zotu1"], 110);
    }

    #[test]
    fn provisional_cluster_folds_into_its_seed() {
        // Uniq5 collects noise before being reported as noise of Uniq1 itself.
        let report = parse(
            "Uniq1;size=100;amp1;\n\
             Uniq6;size=1;denoise,shifted;top=Uniq5\n\
             Uniq5;size=4;denoise,shifted;top=Uniq1\n\
             Uniq1;size=100;chfilter,zotu;\n",
        );
        assert_eq!(report.hap2amp["Zotu1"], ["Uniq1", "Uniq6", "Uniq5"]);
        assert_eq!(report.hap_size["Zotu1"], 105);
        assert!(report.diagnostics.warnings.is_empty());
    }

    #[test]
    fn tab_separated_fields_and_unfinalized_clusters() {
        let report = parse(
            "Uniq1;size=9;\tamp1\n\
             Uniq2;size=7;\tamp2\n\
             Uniq1;size=9;\tchfilter\tzotu\n",
        );
        assert_eq!(report.hap2amp["Zotu1"], ["Uniq1"]);
        assert_eq!(
            report.diagnostics.warnings,
            vec![LineageWarning::UnfinalizedCluster {
                key: "Uniq2".into(),
                members: 1
            }]
        );
        assert_eq!(report.amp_size["Uniq2"], 7);
    }

    #[test]
    fn otu_dialect_mints_otu_ids() {
        let report = parse_denoise_report(
            Cursor::new("Uniq1;size=3;amp1;\nUniq1;size=3;chfilter,otu;\n"),
            ReportDialect::Otu,
        )
        .unwrap();
        assert_eq!(report.hap_size["Otu1"], 3);
    }

    #[test]
    fn rejects_unknown_lines() {
        let err = parse_denoise_report(
            Cursor::new("Uniq1;size=3;something;\n"),
            ReportDialect::Zotu,
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::MalformedReportLine { .. }));

        let err = parse_denoise_report(
            Cursor::new("Uniq1;size=3;chfilter,keep;\n"),
            ReportDialect::Zotu,
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::UnknownDisposition { .. }));
    }
}
