//! Terminal-facing rendering helpers (lifecycle summaries, spinners).

pub mod lifecycle_summary;
pub mod spinner;
