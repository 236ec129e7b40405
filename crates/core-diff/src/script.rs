//! LCS edit script over grapheme clusters.
//!
//! Table: `(m + 1) x (n + 1)` cells, `dp[i][j]` = LCS length of `old[..i]` and
//! `new[..j]`. Backtracking from `(m, n)` takes `Equal` on a match, otherwise
//! `Insert` when `dp[i][j - 1] >= dp[i - 1][j]`, otherwise `Delete`. The
//! tie-break is observable: when several minimal scripts exist, inserts are
//! emitted after deletes at the same position and before a repeated match
//! (`diff("a", "aa")` is `[Insert("a"), Equal("a")]`).
//!
//! Cost is O(m·n) time and memory. Callers that re-diff a growing text are
//! expected to throttle (see the session accumulator).
//!
//! The common trailing run is peeled off before the table is built. The
//! backtrack always consumes a trailing match as `Equal` first, so the result
//! is identical to the unpeeled run. The leading run is NOT peeled: with the
//! tie-break above an insert may land in front of a matching first character.

use tracing::trace;
use unicode_segmentation::UnicodeSegmentation;

/// Classification shared by edit ops and rendered segments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    Equal,
    Insert,
    Delete,
}

impl SegmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentKind::Equal => "equal",
            SegmentKind::Insert => "insert",
            SegmentKind::Delete => "delete",
        }
    }

    /// Insert or Delete.
    pub fn is_change(&self) -> bool {
        !matches!(self, SegmentKind::Equal)
    }
}

/// One step of an edit script.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DiffOp {
    /// Text present in both sequences.
    Equal(String),
    /// Text present only in the new sequence.
    Insert(String),
    /// Text present only in the old sequence.
    Delete(String),
}

/// Ordered edit ops turning the old sequence into the new one.
pub type EditScript = Vec<DiffOp>;

impl DiffOp {
    pub fn new(kind: SegmentKind, text: impl Into<String>) -> Self {
        let text = text.into();
        match kind {
            SegmentKind::Equal => DiffOp::Equal(text),
            SegmentKind::Insert => DiffOp::Insert(text),
            SegmentKind::Delete => DiffOp::Delete(text),
        }
    }

    pub fn kind(&self) -> SegmentKind {
        match self {
            DiffOp::Equal(_) => SegmentKind::Equal,
            DiffOp::Insert(_) => SegmentKind::Insert,
            DiffOp::Delete(_) => SegmentKind::Delete,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            DiffOp::Equal(t) | DiffOp::Insert(t) | DiffOp::Delete(t) => t,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            DiffOp::Equal(t) | DiffOp::Insert(t) | DiffOp::Delete(t) => t,
        }
    }
}

/// Concatenation of the old-side text (`Equal` + `Delete`).
pub fn source_text(script: &[DiffOp]) -> String {
    script
        .iter()
        .filter(|op| !matches!(op, DiffOp::Insert(_)))
        .map(DiffOp::text)
        .collect()
}

/// Concatenation of the new-side text (`Equal` + `Insert`).
pub fn target_text(script: &[DiffOp]) -> String {
    script
        .iter()
        .filter(|op| !matches!(op, DiffOp::Delete(_)))
        .map(DiffOp::text)
        .collect()
}

/// Diff two strings at grapheme granularity. One op per grapheme cluster.
pub fn compute_diff(old: &str, new: &str) -> EditScript {
    let old: Vec<&str> = old.graphemes(true).collect();
    let new: Vec<&str> = new.graphemes(true).collect();
    compute_diff_graphemes(&old, &new)
}

/// Same as [`compute_diff`] over input that is already segmented.
pub fn compute_diff_graphemes(old: &[&str], new: &[&str]) -> EditScript {
    let suffix = old
        .iter()
        .rev()
        .zip(new.iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let old_head = &old[..old.len() - suffix];
    let new_head = &new[..new.len() - suffix];

    let table = LcsTable::build(old_head, new_head);
    trace!(
        target: "diff",
        old_len = old.len(),
        new_len = new.len(),
        suffix,
        cells = table.cells.len(),
        "lcs_table_built"
    );

    let mut reversed: Vec<DiffOp> = Vec::with_capacity(old_head.len() + new_head.len());
    let (mut i, mut j) = (old_head.len(), new_head.len());
    while i > 0 || j > 0 {
        if i > 0 && j > 0 && old_head[i - 1] == new_head[j - 1] {
            reversed.push(DiffOp::Equal(old_head[i - 1].to_owned()));
            i -= 1;
            j -= 1;
        } else if j > 0 && (i == 0 || table.get(i, j - 1) >= table.get(i - 1, j)) {
            reversed.push(DiffOp::Insert(new_head[j - 1].to_owned()));
            j -= 1;
        } else {
            reversed.push(DiffOp::Delete(old_head[i - 1].to_owned()));
            i -= 1;
        }
    }
    reversed.reverse();

    let mut script = reversed;
    script.extend(
        old[old.len() - suffix..]
            .iter()
            .map(|g| DiffOp::Equal((*g).to_owned())),
    );
    script
}

/// Flat row-major LCS length table.
struct LcsTable {
    width: usize,
    cells: Vec<u32>,
}

impl LcsTable {
    fn build(old: &[&str], new: &[&str]) -> Self {
        let width = new.len() + 1;
        let mut cells = vec![0u32; (old.len() + 1) * width];
        for i in 1..=old.len() {
            for j in 1..=new.len() {
                let here = i * width + j;
                cells[here] = if old[i - 1] == new[j - 1] {
                    cells[here - width - 1] + 1
                } else {
                    cells[here - width].max(cells[here - 1])
                };
            }
        }
        Self { width, cells }
    }

    #[inline]
    fn get(&self, i: usize, j: usize) -> u32 {
        self.cells[i * self.width + j]
    }
}
