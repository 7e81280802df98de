// src/denoise/dialect.rs

use crate::types::HaplotypeKind;

/// Report formats written by different generations of the denoiser.
///
/// Both share one line shape; they differ in the disposition keyword that
/// marks a kept cluster and in the prefix of the ids minted for it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportDialect {
    /// `chfilter,zotu` lines, kept clusters become `Zotu<k>`.
    #[default]
    Zotu,
    /// `chfilter,otu` lines, kept clusters become `Otu<k>`.
    Otu,
}

impl ReportDialect {
    /// Marker token of the finalize phase.
    pub fn finalize_marker(self) -> &'static str {
        "chfilter"
    }

    /// Marker token of the clustering phase.
    pub fn denoise_marker(self) -> &'static str {
        "denoise"
    }

    pub fn signal_keyword(self) -> &'static str {
        match self {
            ReportDialect::Zotu => "zotu",
            ReportDialect::Otu => "otu",
        }
    }

    pub fn prefix(self, kind: HaplotypeKind) -> &'static str {
        match (self, kind) {
            (_, HaplotypeKind::Chimera) => "Chimera",
            (ReportDialect::Zotu, HaplotypeKind::Signal) => "Zotu",
            (ReportDialect::Otu, HaplotypeKind::Signal) => "Otu",
        }
    }

    /// Disposition named by the comma-separated tokens of a finalize line.
    pub fn disposition<'a, I>(self, tokens: I) -> Option<HaplotypeKind>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for token in tokens {
            let token = token.trim();
            if token.eq_ignore_ascii_case(self.signal_keyword()) {
                return Some(HaplotypeKind::Signal);
            }
            if token.eq_ignore_ascii_case("chimera") {
                return Some(HaplotypeKind::Chimera);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispositions_are_exact_tokens() {
        let zotu = ReportDialect::Zotu;
        assert_eq!(
            zotu.disposition(["chfilter", "zotu"]),
            Some(HaplotypeKind::Signal)
        );
        assert_eq!(
            zotu.disposition(["chfilter", "chimera"]),
            Some(HaplotypeKind::Chimera)
        );
        assert_eq!(zotu.disposition(["chfilter", "otu"]), None);
        assert_eq!(
            ReportDialect::Otu.disposition(["chfilter", "otu"]),
            Some(HaplotypeKind::Signal)
        );
    }
}
