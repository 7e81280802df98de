pub mod compute;
pub mod long_form;

pub use compute::{compute_abundance, normalize, rank_value, AbundanceCounts};
pub use long_form::{
    annotated_text, build_long_form, filter_by_occurrence, join_metadata, long_form_text,
    AbundanceScale, LongFormColumn,
};
