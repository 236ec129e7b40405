//! Character-level edit scripts and their display form.
//!
//! Two pure stages, kept apart so each can be tested on its own:
//!
//! * [`compute_diff`] turns `(old, new)` into an [`EditScript`] with one
//!   [`DiffOp`] per grapheme cluster (LCS table + backtrack).
//! * [`render`] merges adjacent same-kind ops into [`StyledSegment`]s, which is
//!   what a view paints and what [`DiffStats`] counts.
//!
//! "Character" means an extended grapheme cluster throughout, so CJK text,
//! emoji sequences and combining marks never split across two ops.
//!
//! Neither stage can fail. Neither stage logs text content; diagnostics carry
//! lengths only.

mod render;
mod script;
mod stats;
mod style;

pub use render::{StyledSegment, render, render_ops};
pub use script::{
    DiffOp, EditScript, SegmentKind, compute_diff, compute_diff_graphemes, source_text,
    target_text,
};
pub use stats::DiffStats;
pub use style::{Highlight, SegmentStyle};
