//! Boundary and end-to-end checks on merged output.

use core_diff::{DiffStats, SegmentKind, StyledSegment, compute_diff, render};
use pretty_assertions::assert_eq;

#[test]
fn empty_old_renders_one_insert() {
    assert_eq!(
        render(&compute_diff("", "新文字")),
        vec![StyledSegment::new(SegmentKind::Insert, "新文字")]
    );
}

#[test]
fn empty_new_renders_one_delete() {
    assert_eq!(
        render(&compute_diff("舊文字", "")),
        vec![StyledSegment::new(SegmentKind::Delete, "舊文字")]
    );
}

#[test]
fn both_empty_render_nothing() {
    assert!(render(&compute_diff("", "")).is_empty());
}

#[test]
fn proofreading_single_character_fix() {
    let original = "今天天氣很好，我想去公圓走走。";
    let corrected = "今天天氣很好，我想去公園走走。";
    let script = compute_diff(original, corrected);
    assert_eq!(
        render(&script),
        vec![
            StyledSegment::new(SegmentKind::Equal, "今天天氣很好，我想去公"),
            StyledSegment::new(SegmentKind::Delete, "圓"),
            StyledSegment::new(SegmentKind::Insert, "園"),
            StyledSegment::new(SegmentKind::Equal, "走走。"),
        ]
    );
    let stats = DiffStats::from_script(&script);
    assert_eq!(stats.change_count, 1);
    assert_eq!(stats.character_count, corrected.chars().count());
}

#[test]
fn spacing_between_cjk_and_latin_is_pure_insert() {
    let segments = render(&compute_diff("使用Google搜尋", "使用 Google 搜尋"));
    let kinds: Vec<SegmentKind> = segments.iter().map(|s| s.kind).collect();
    assert_eq!(
        kinds,
        vec![
            SegmentKind::Equal,
            SegmentKind::Insert,
            SegmentKind::Equal,
            SegmentKind::Insert,
            SegmentKind::Equal,
        ]
    );
    assert!(segments
        .iter()
        .filter(|s| s.kind == SegmentKind::Insert)
        .all(|s| s.text == " "));
}
