use std::fmt;

use unicode_segmentation::UnicodeSegmentation;

use crate::render::StyledSegment;
use crate::script::{DiffOp, SegmentKind};

/// Summary numbers shown next to a settled diff.
///
/// `change_count` counts maximal runs of non-`Equal` content: a deletion
/// immediately followed by an insertion (a substitution) is one change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DiffStats {
    /// Graphemes in the rewritten (target) text.
    pub character_count: usize,
    pub change_count: usize,
    pub inserted: usize,
    pub deleted: usize,
}

impl DiffStats {
    /// Exact counts from a per-grapheme script.
    pub fn from_script(script: &[DiffOp]) -> Self {
        let mut stats = DiffStats::default();
        let mut in_change = false;
        for op in script {
            match op.kind() {
                SegmentKind::Equal => {
                    stats.character_count += 1;
                    in_change = false;
                    continue;
                }
                SegmentKind::Insert => {
                    stats.character_count += 1;
                    stats.inserted += 1;
                }
                SegmentKind::Delete => stats.deleted += 1,
            }
            if !in_change {
                stats.change_count += 1;
                in_change = true;
            }
        }
        stats
    }

    /// Counts from merged segments (graphemes re-counted per segment).
    pub fn from_segments(segments: &[StyledSegment]) -> Self {
        let mut stats = DiffStats::default();
        let mut in_change = false;
        for segment in segments {
            let len = segment.text.graphemes(true).count();
            match segment.kind {
                SegmentKind::Equal => {
                    stats.character_count += len;
                    in_change = false;
                    continue;
                }
                SegmentKind::Insert => {
                    stats.character_count += len;
                    stats.inserted += len;
                }
                SegmentKind::Delete => stats.deleted += len,
            }
            if !in_change {
                stats.change_count += 1;
                in_change = true;
            }
        }
        stats
    }
}

impl fmt::Display for DiffStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "字元數: {} | 改變: {}",
            self.character_count, self.change_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::render;
    use crate::script::compute_diff;

    #[test]
    fn substitution_counts_once() {
        let script = compute_diff("公圓", "公園");
        let stats = DiffStats::from_script(&script);
        assert_eq!(stats.change_count, 1);
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.deleted, 1);
        assert_eq!(stats.character_count, 2);
    }

    #[test]
    fn separated_changes_count_separately() {
        let script = compute_diff("abcde", "aXcYe");
        let stats = DiffStats::from_script(&script);
        assert_eq!(stats.change_count, 2);
        assert_eq!(stats.character_count, 5);
    }

    #[test]
    fn script_and_segment_counts_agree() {
        let script = compute_diff("今天天氣很好，我想去公圓走走。", "今天天氣真好，我想去公園散步。");
        assert_eq!(
            DiffStats::from_script(&script),
            DiffStats::from_segments(&render(&script))
        );
    }

    #[test]
    fn display_matches_status_line() {
        let stats = DiffStats {
            character_count: 12,
            change_count: 3,
            inserted: 0,
            deleted: 0,
        };
        assert_eq!(stats.to_string(), "字元數: 12 | 改變: 3");
    }
}
