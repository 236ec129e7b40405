//! Run merging: per-grapheme ops become display segments.
//!
//! A single linear pass; order is preserved and adjacent ops of the same kind
//! collapse into one [`StyledSegment`]. Empty ops are dropped so the output of
//! `render` is always a fixed point of `render(render_ops(..))`.

use crate::script::{DiffOp, SegmentKind};
use crate::style::SegmentStyle;

/// A maximal run of one kind, ready to paint.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StyledSegment {
    pub kind: SegmentKind,
    pub text: String,
}

impl StyledSegment {
    pub fn new(kind: SegmentKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    pub fn style(&self) -> SegmentStyle {
        self.kind.style()
    }
}

impl From<StyledSegment> for DiffOp {
    fn from(segment: StyledSegment) -> Self {
        DiffOp::new(segment.kind, segment.text)
    }
}

/// Merge adjacent same-kind ops into segments.
pub fn render(script: &[DiffOp]) -> Vec<StyledSegment> {
    let mut out: Vec<StyledSegment> = Vec::new();
    for op in script {
        let text = op.text();
        if text.is_empty() {
            continue;
        }
        match out.last_mut() {
            Some(last) if last.kind == op.kind() => last.text.push_str(text),
            _ => out.push(StyledSegment::new(op.kind(), text)),
        }
    }
    out
}

/// Turn segments back into (run-granular) ops.
pub fn render_ops(segments: &[StyledSegment]) -> Vec<DiffOp> {
    segments.iter().cloned().map(DiffOp::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::compute_diff;

    #[test]
    fn merges_adjacent_runs() {
        let segments = render(&compute_diff("abcxyz", "abQRyz"));
        assert_eq!(
            segments,
            vec![
                StyledSegment::new(SegmentKind::Equal, "ab"),
                StyledSegment::new(SegmentKind::Delete, "cx"),
                StyledSegment::new(SegmentKind::Insert, "QR"),
                StyledSegment::new(SegmentKind::Equal, "yz"),
            ]
        );
    }

    #[test]
    fn empty_script_renders_nothing() {
        assert!(render(&[]).is_empty());
    }

    #[test]
    fn empty_ops_are_skipped() {
        let script = vec![
            DiffOp::Equal("a".into()),
            DiffOp::Insert(String::new()),
            DiffOp::Equal("b".into()),
        ];
        assert_eq!(
            render(&script),
            vec![StyledSegment::new(SegmentKind::Equal, "ab")]
        );
    }

    #[test]
    fn segments_round_trip_through_ops() {
        let segments = render(&compute_diff("今天很好", "今日很好啊"));
        assert_eq!(render(&render_ops(&segments)), segments);
    }
}
