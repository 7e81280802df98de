//src/config.rs

use std::path::{Path, PathBuf};

use crate::denoise::ReportDialect;

/// Where the four per-sample inputs live under an import directory.
///
/// Each input is `<directory>/<subdir>/<sample_id><suffix>`. Sample ids
/// are discovered by listing `amplicon_subdir` and stripping
/// `amplicon_suffix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutConfig {
    pub amplicon_subdir: String,
    pub amplicon_suffix: String,
    pub haplotype_subdir: String,
    pub haplotype_suffix: String,
    pub report_subdir: String,
    pub report_suffix: String,
    pub taxonomy_subdir: String,
    pub taxonomy_suffix: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            amplicon_subdir: "derep".into(),
            amplicon_suffix: ".derep.fasta".into(),
            haplotype_subdir: "denoise".into(),
            haplotype_suffix: ".zotus.fasta".into(),
            report_subdir: "denoise".into(),
            report_suffix: ".report.txt".into(),
            taxonomy_subdir: "taxonomy".into(),
            taxonomy_suffix: ".taxonomy.csv".into(),
        }
    }
}

impl LayoutConfig {
    pub fn amplicon_path(&self, dir: &Path, sample_id: &str) -> PathBuf {
        resolve(dir, &self.amplicon_subdir, sample_id, &self.amplicon_suffix)
    }

    pub fn haplotype_path(&self, dir: &Path, sample_id: &str) -> PathBuf {
        resolve(dir, &self.haplotype_subdir, sample_id, &self.haplotype_suffix)
    }

    pub fn report_path(&self, dir: &Path, sample_id: &str) -> PathBuf {
        resolve(dir, &self.report_subdir, sample_id, &self.report_suffix)
    }

    pub fn taxonomy_path(&self, dir: &Path, sample_id: &str) -> PathBuf {
        resolve(dir, &self.taxonomy_subdir, sample_id, &self.taxonomy_suffix)
    }

    /// Sample id encoded in an amplicon file name, if it carries the amplicon suffix.
    pub fn sample_id_from_file_name(&self, file_name: &str) -> Option<String> {
        let stem = file_name.strip_suffix(".gz").unwrap_or(file_name);
        stem.strip_suffix(self.amplicon_suffix.as_str())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }
}

/// The plain path if it exists, else its `.gz` sibling if that exists,
/// else the plain path (so a missing-file report names the expected file).
fn resolve(dir: &Path, subdir: &str, sample_id: &str, suffix: &str) -> PathBuf {
    let plain = dir.join(subdir).join(format!("{sample_id}{suffix}"));
    if plain.exists() {
        return plain;
    }
    let gz = dir.join(subdir).join(format!("{sample_id}{suffix}.gz"));
    if gz.exists() {
        gz
    } else {
        plain
    }
}

/// Column placement of the 7-rank block in a search result row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxonomyLayout {
    /// Column index of the species field; the next six columns hold genus..kingdom.
    pub block_offset: usize,
}

impl Default for TaxonomyLayout {
    fn default() -> Self {
        Self { block_offset: 1 }
    }
}

impl TaxonomyLayout {
    /// Minimum number of fields a row needs.
    pub fn required_fields(&self) -> usize {
        self.block_offset + 7
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub layout: LayoutConfig,
    pub dialect: ReportDialect,
    pub taxonomy: TaxonomyLayout,
    /// Import on the calling thread instead of the rayon pool.
    pub sequential: bool,
}
