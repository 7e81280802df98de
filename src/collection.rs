//src/collection.rs

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use bincode::{deserialize_from, serialize_into};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::abundance::{compute_abundance, rank_value, AbundanceCounts};
use crate::config::{ImportOptions, LayoutConfig};
use crate::error::{LineageError, LineageWarning, Result, SampleWarning};
use crate::fasta::open_text;
use crate::sample::{Sample, SampleFiles};
use crate::types::{Rank, SampleMetadata, UNASSIGNED};

/// What to do when an imported sample id is already in the collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImportMode {
    /// Keep the existing sample and warn.
    #[default]
    SkipExisting,
    /// Replace it with the freshly imported one.
    Replace,
}

/// Outcome of a successful `import_data`.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub imported: Vec<String>,
    pub skipped: Vec<String>,
    pub warnings: Vec<SampleWarning>,
}

/// One signal haplotype sequence, as handed to tree/embedding consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonSequence {
    pub sample_id: String,
    pub haplotype_id: String,
    pub sequence: String,
    pub size: u64,
}

/// Lists the sample ids present in `<dir>/<amplicon_subdir>`, sorted.
pub fn discover_sample_ids(dir: &Path, layout: &LayoutConfig) -> Result<Vec<String>> {
    let scan_dir = dir.join(&layout.amplicon_subdir);
    let entries = fs::read_dir(&scan_dir).map_err(|e| LineageError::io(&scan_dir, e))?;

    let mut ids: Vec<String> = entries
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            if !path.is_file() {
                return None;
            }
            let filename = path.file_name()?.to_string_lossy().to_string();
            layout.sample_id_from_file_name(&filename)
        })
        .collect();
    ids.sort();
    ids.dedup();
    Ok(ids)
}

/// Locates the four inputs of every id, failing with every missing path at once.
pub fn validate_files(
    dir: &Path,
    sample_ids: &[String],
    layout: &LayoutConfig,
) -> Result<BTreeMap<String, SampleFiles>> {
    let mut located = BTreeMap::new();
    let mut missing = Vec::new();
    for id in sample_ids {
        let files = SampleFiles::locate(dir, id, layout);
        missing.extend(files.missing());
        located.insert(id.clone(), files);
    }
    if !missing.is_empty() {
        return Err(LineageError::MissingFiles { paths: missing });
    }
    Ok(located)
}

/// All imported samples plus their metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleCollection {
    samples: BTreeMap<String, Sample>,
    metadata: BTreeMap<String, SampleMetadata>,
}

impl SampleCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Imports every discovered sample, or exactly `sample_ids` when given.
    ///
    /// All files are checked before any is parsed. If any sample fails to
    /// parse the collection is left untouched.
    pub fn import_data(
        &mut self,
        dir: &Path,
        sample_ids: Option<&[String]>,
        options: &ImportOptions,
        mode: ImportMode,
    ) -> Result<ImportReport> {
        let ids = match sample_ids {
            Some(ids) => {
                let mut ids = ids.to_vec();
                ids.sort();
                ids.dedup();
                ids
            }
            None => discover_sample_ids(dir, &options.layout)?,
        };
        let files = validate_files(dir, &ids, &options.layout)?;
        log::info!("importing {} sample(s) from {}", files.len(), dir.display());

        let warnings = Mutex::new(Vec::new());
        let import_one = |(id, files): (&String, &SampleFiles)| -> Result<Sample> {
            let (sample, sample_warnings) = Sample::import(id, files, options)?;
            warnings
                .lock()
                .extend(sample_warnings.into_iter().map(|warning| SampleWarning {
                    sample_id: id.clone(),
                    warning,
                }));
            Ok(sample)
        };
        let results: Vec<Result<Sample>> = if options.sequential {
            files.iter().map(import_one).collect()
        } else {
            files.par_iter().map(import_one).collect()
        };
        let samples = results.into_iter().collect::<Result<Vec<Sample>>>()?;

        let mut report = ImportReport {
            warnings: warnings.into_inner(),
            ..ImportReport::default()
        };
        report.warnings.sort_by(|a, b| a.sample_id.cmp(&b.sample_id));

        for sample in samples {
            let id = sample.sample_id().to_string();
            if mode == ImportMode::SkipExisting && self.samples.contains_key(&id) {
                log::warn!("sample {id} already imported, keeping the existing one");
                report.warnings.push(SampleWarning {
                    sample_id: id.clone(),
                    warning: LineageWarning::DuplicateSampleId {
                        sample_id: id.clone(),
                    },
                });
                report.skipped.push(id);
                continue;
            }
            self.samples.insert(id.clone(), sample);
            report.imported.push(id);
        }
        log::info!(
            "imported {} sample(s), skipped {}, {} warning(s)",
            report.imported.len(),
            report.skipped.len(),
            report.warnings.len()
        );
        Ok(report)
    }

    /// Moves every sample of `other` whose id is not taken yet into `self`,
    /// together with its metadata. A skipped sample leaves its metadata behind.
    pub fn merge(&mut self, other: SampleCollection) -> Vec<LineageWarning> {
        let SampleCollection {
            samples,
            mut metadata,
        } = other;
        let mut warnings = Vec::new();
        for (id, sample) in samples {
            if self.samples.contains_key(&id) {
                log::warn!("merge: duplicate sample id {id}, keeping the existing one");
                warnings.push(LineageWarning::DuplicateSampleId { sample_id: id });
                continue;
            }
            if let Some(meta) = metadata.remove(&id) {
                self.metadata.insert(id.clone(), meta);
            }
            self.samples.insert(id, sample);
        }
        warnings
    }

    /// Fails with `CollectionExists` when `path` is taken and `overwrite` is off.
    pub fn check_save_target<P: AsRef<Path>>(path: P, overwrite: bool) -> Result<()> {
        let path = path.as_ref();
        if path.exists() && !overwrite {
            return Err(LineageError::CollectionExists {
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }

    /// Writes the whole collection as one gzipped bincode blob. The blob goes
    /// to a sibling temporary file first and replaces `path` only once
    /// complete.
    pub fn save<P: AsRef<Path>>(&self, path: P, overwrite: bool) -> Result<()> {
        let path = path.as_ref();
        Self::check_save_target(path, overwrite)?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let tmp = NamedTempFile::new_in(dir).map_err(|e| LineageError::io(dir, e))?;

        let mut encoder = GzEncoder::new(BufWriter::new(tmp.as_file()), Compression::default());
        serialize_into(&mut encoder, self)?;
        let mut writer = encoder.finish().map_err(|e| LineageError::io(tmp.path(), e))?;
        writer.flush().map_err(|e| LineageError::io(tmp.path(), e))?;
        drop(writer);

        tmp.persist(path).map_err(|e| LineageError::io(path, e.error))?;
        log::info!("saved {} sample(s) to {}", self.samples.len(), path.display());
        Ok(())
    }

    /// Replaces the current state with the collection stored at `path`.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        *self = Self::open(path)?;
        Ok(())
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| LineageError::io(path, e))?;
        let mut decoder = GzDecoder::new(BufReader::new(file));
        let collection: SampleCollection = deserialize_from(&mut decoder)?;
        log::info!(
            "loaded {} sample(s) from {}",
            collection.samples.len(),
            path.display()
        );
        Ok(collection)
    }

    /// Per-`(target, unit)` read totals of one sample.
    pub fn compute_abundance(
        &self,
        sample_id: &str,
        target_rank: Rank,
        unit_rank: Rank,
    ) -> Result<AbundanceCounts> {
        let sample = self
            .sample(sample_id)
            .ok_or_else(|| LineageError::UnknownSample(sample_id.to_string()))?;
        Ok(compute_abundance(sample, target_rank, unit_rank))
    }

    pub fn sample(&self, sample_id: &str) -> Option<&Sample> {
        self.samples.get(sample_id)
    }

    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.values()
    }

    pub fn sample_ids(&self) -> Vec<&str> {
        self.samples.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn remove(&mut self, sample_id: &str) -> Option<Sample> {
        self.metadata.remove(sample_id);
        self.samples.remove(sample_id)
    }

    pub fn metadata(&self) -> &BTreeMap<String, SampleMetadata> {
        &self.metadata
    }

    /// Optional metadata of one sample. The collection is its only store.
    pub fn sample_metadata(&self, sample_id: &str) -> Option<&SampleMetadata> {
        self.metadata.get(sample_id)
    }

    pub fn set_metadata(&mut self, sample_id: &str, metadata: SampleMetadata) -> Result<()> {
        if !self.samples.contains_key(sample_id) {
            return Err(LineageError::UnknownSample(sample_id.to_string()));
        }
        self.metadata.insert(sample_id.to_string(), metadata);
        Ok(())
    }

    /// Reads a tab-separated metadata table with a header row whose first
    /// column is the sample id. Rows for ids not in the collection are kept
    /// too; the join decides what is required. Returns the number of rows.
    pub fn load_metadata_table<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let path = path.as_ref();
        let reader = open_text(path).map_err(|e| LineageError::io(path, e))?;
        let malformed = |reason: String| LineageError::MalformedMetadata {
            path: path.to_path_buf(),
            reason,
        };

        let mut lines = reader.lines();
        let header = match lines.next() {
            Some(line) => line.map_err(|e| LineageError::io(path, e))?,
            None => return Err(malformed("empty table".into())),
        };
        let columns: Vec<String> = header
            .trim_end()
            .split('\t')
            .map(|c| c.trim().to_string())
            .collect();
        if columns.len() < 2 {
            return Err(malformed("header needs a sample column and at least one field".into()));
        }

        let mut rows = 0;
        for line in lines {
            let line = line.map_err(|e| LineageError::io(path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let parts: Vec<&str> = line.trim_end().split('\t').collect();
            if parts.len() != columns.len() {
                return Err(malformed(format!(
                    "row for {} has {} fields, header has {}",
                    parts[0],
                    parts.len(),
                    columns.len()
                )));
            }
            let meta: SampleMetadata = columns[1..]
                .iter()
                .cloned()
                .zip(parts[1..].iter().map(|v| v.trim().to_string()))
                .collect();
            self.metadata.insert(parts[0].trim().to_string(), meta);
            rows += 1;
        }
        Ok(rows)
    }

    /// Signal haplotype sequences of every sample, grouped by their value at `rank`.
    pub fn haplotype_sequences_by_taxon(&self, rank: Rank) -> BTreeMap<String, Vec<TaxonSequence>> {
        let mut grouped: BTreeMap<String, Vec<TaxonSequence>> = BTreeMap::new();
        for sample in self.samples.values() {
            for hap in sample.haplotypes().values() {
                let Some(sequence) = &hap.sequence else {
                    continue;
                };
                let taxon = match sample.taxonomy().get(&hap.id) {
                    Some(assignment) => rank_value(assignment, rank),
                    None => UNASSIGNED.to_string(),
                };
                grouped.entry(taxon).or_default().push(TaxonSequence {
                    sample_id: sample.sample_id().to_string(),
                    haplotype_id: hap.id.clone(),
                    sequence: sequence.clone(),
                    size: hap.size.unwrap_or(0),
                });
            }
        }
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::denoise::{parse_denoise_report, ReportDialect};
    use crate::taxonomy::{assignment_from_block, TaxonomyMap};
    use crate::types::NO_ORDER_LEVEL;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn sample(id: &str, size: u64) -> Sample {
        let report = parse_denoise_report(
            Cursor::new(format!(
                "Uniq1;size={size};amp1;\nUniq1;size={size};chfilter,zotu;\n"
            )),
            ReportDialect::Zotu,
        )
        .unwrap();
        let mut taxonomy = TaxonomyMap::new();
        taxonomy.insert(
            "Zotu1".into(),
            assignment_from_block(&["Sp a", "Gen", "Fam", "", "Cls", "Phy", "Kin"]),
        );
        let (sample, _) = Sample::from_parts(
            id,
            vec![("Uniq1".into(), "ACGT".into())],
            vec![("Zotu1".into(), "ACGT".into())],
            report,
            taxonomy,
        );
        sample
    }

    fn collection(samples: Vec<Sample>) -> SampleCollection {
        let mut c = SampleCollection::new();
        for s in samples {
            c.samples.insert(s.sample_id().to_string(), s);
        }
        c
    }

    #[test]
    fn merge_is_first_writer_wins() {
        let mut a = collection(vec![sample("S1", 10)]);
        let b = collection(vec![sample("S1", 99), sample("S2", 5)]);
        let warnings = a.merge(b);
        assert_eq!(
            warnings,
            vec![LineageWarning::DuplicateSampleId {
                sample_id: "S1".into()
            }]
        );
        assert_eq!(a.len(), 2);
        assert_eq!(a.sample("S1").unwrap().total_reads(), 10);
    }

    #[test]
    fn merge_leaves_metadata_of_skipped_samples_behind() {
        let mut a = collection(vec![sample("S1", 10)]);
        let mut b = collection(vec![sample("S1", 99), sample("S2", 5)]);
        b.set_metadata("S1", SampleMetadata::from([("site".into(), "FromB".into())]))
            .unwrap();
        b.set_metadata("S2", SampleMetadata::from([("site".into(), "Bay".into())]))
            .unwrap();

        a.merge(b);
        assert_eq!(a.sample("S1").unwrap().total_reads(), 10);
        assert!(a.sample_metadata("S1").is_none());
        assert_eq!(a.metadata()["S2"]["site"], "Bay");
    }

    #[test]
    fn save_refuses_to_overwrite_and_load_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.hlc");

        let mut saved = collection(vec![sample("S1", 10), sample("S2", 3)]);
        saved
            .set_metadata("S1", SampleMetadata::from([("site".into(), "A".into())]))
            .unwrap();
        saved.save(&path, false).unwrap();
        assert!(matches!(
            saved.save(&path, false),
            Err(LineageError::CollectionExists { .. })
        ));
        saved.save(&path, true).unwrap();

        let mut loaded = collection(vec![sample("S9", 1)]);
        loaded.load(&path).unwrap();
        assert_eq!(loaded, saved);
        assert!(loaded.sample("S9").is_none());
    }

    #[test]
    fn save_replaces_whole_file_without_leftovers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.hlc");
        fs::write(&path, b"stale").unwrap();

        assert!(matches!(
            SampleCollection::check_save_target(&path, false),
            Err(LineageError::CollectionExists { .. })
        ));
        SampleCollection::check_save_target(&path, true).unwrap();
        SampleCollection::check_save_target(dir.path().join("new.hlc"), false).unwrap();

        let saved = collection(vec![sample("S1", 10)]);
        assert!(saved.save(&path, false).is_err());
        assert_eq!(fs::read(&path).unwrap(), b"stale");

        saved.save(&path, true).unwrap();
        assert_eq!(SampleCollection::open(&path).unwrap(), saved);
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn set_metadata_requires_known_sample() {
        let mut c = collection(vec![sample("S1", 1)]);
        assert!(matches!(
            c.set_metadata("S2", SampleMetadata::new()),
            Err(LineageError::UnknownSample(_))
        ));
    }

    #[test]
    fn metadata_table_is_parsed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meta.tsv");
        fs::write(&path, "sample\tsite\tdepth\nS1\tReef\t10\nS2\tBay\t3\n").unwrap();
        let mut c = collection(vec![sample("S1", 1)]);
        assert_eq!(c.load_metadata_table(&path).unwrap(), 2);
        assert_eq!(c.metadata()["S1"]["site"], "Reef");
        assert_eq!(c.metadata()["S2"]["depth"], "3");

        fs::write(&path, "sample\tsite\nS1\n").unwrap();
        assert!(matches!(
            c.load_metadata_table(&path),
            Err(LineageError::MalformedMetadata { .. })
        ));
    }

    #[test]
    fn sequences_grouped_by_taxon() {
        let c = collection(vec![sample("S1", 10), sample("S2", 4)]);
        let by_order = c.haplotype_sequences_by_taxon(Rank::Order);
        let group = &by_order[NO_ORDER_LEVEL];
        assert_eq!(group.len(), 2);
        assert_eq!(group[0].sample_id, "S1");
        assert_eq!(group[0].size, 10);
        let by_genus = c.haplotype_sequences_by_taxon(Rank::Genus);
        assert_eq!(by_genus["Gen"][1].haplotype_id, "Zotu1");
    }
}
