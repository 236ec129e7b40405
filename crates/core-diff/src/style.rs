//! Semantic styling for diff segments.
//!
//! Colors and fonts belong to whatever paints the segments. What is fixed here
//! is the three-way classification and the strikethrough-for-delete rule:
//! `Equal` uses the base style, `Insert` is highlighted as an addition, and
//! `Delete` is highlighted as a removal and struck through.

use crate::script::SegmentKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Highlight {
    Addition,
    Removal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct SegmentStyle {
    pub highlight: Option<Highlight>,
    pub strikethrough: bool,
}

impl SegmentStyle {
    pub const BASE: SegmentStyle = SegmentStyle {
        highlight: None,
        strikethrough: false,
    };
    pub const ADDITION: SegmentStyle = SegmentStyle {
        highlight: Some(Highlight::Addition),
        strikethrough: false,
    };
    pub const REMOVAL: SegmentStyle = SegmentStyle {
        highlight: Some(Highlight::Removal),
        strikethrough: true,
    };

    pub fn is_base(&self) -> bool {
        *self == Self::BASE
    }
}

impl SegmentKind {
    pub const fn style(self) -> SegmentStyle {
        match self {
            SegmentKind::Equal => SegmentStyle::BASE,
            SegmentKind::Insert => SegmentStyle::ADDITION,
            SegmentKind::Delete => SegmentStyle::REMOVAL,
        }
    }
}
