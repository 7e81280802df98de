pub mod dialect;
pub mod report;

pub use dialect::ReportDialect;
pub use report::{parse_denoise_report, DenoiseReport, ReportDiagnostics};
