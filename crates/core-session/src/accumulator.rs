use unicode_segmentation::UnicodeSegmentation;

/// Buffer for streamed rewrite fragments with a recompute throttle.
///
/// Lengths are grapheme counts. `displayed_len` only moves forward, and only
/// through [`mark_displayed`](Self::mark_displayed).
///
/// Appending text can only extend the last cluster, so each push re-segments
/// from the start of that cluster rather than from the beginning.
#[derive(Debug, Clone)]
pub struct StreamAccumulator {
    text: String,
    len: usize,
    /// Byte offset where the last cluster starts.
    tail_start: usize,
    /// Clusters before `tail_start`.
    closed_len: usize,
    displayed_len: usize,
    threshold: usize,
}

impl StreamAccumulator {
    /// A threshold of zero behaves like one.
    pub fn new(threshold: usize) -> Self {
        Self {
            text: String::new(),
            len: 0,
            tail_start: 0,
            closed_len: 0,
            displayed_len: 0,
            threshold: threshold.max(1),
        }
    }

    /// Append a fragment. Returns `true` when enough new text arrived since the
    /// last displayed diff to warrant a recompute.
    pub fn push(&mut self, fragment: &str) -> bool {
        if fragment.is_empty() {
            return false;
        }
        self.text.push_str(fragment);
        let mut tail_count = 0;
        let mut last_offset = 0;
        for (offset, _) in self.text[self.tail_start..].grapheme_indices(true) {
            tail_count += 1;
            last_offset = offset;
        }
        self.len = self.closed_len + tail_count;
        self.closed_len += tail_count.saturating_sub(1);
        self.tail_start += last_offset;
        self.pending() >= self.threshold
    }

    /// Graphemes received but not yet reflected in a displayed diff.
    pub fn pending(&self) -> usize {
        self.len.saturating_sub(self.displayed_len)
    }

    pub fn mark_displayed(&mut self) {
        self.displayed_len = self.displayed_len.max(self.len);
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn displayed_len(&self) -> usize {
        self.displayed_len
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn into_text(self) -> String {
        self.text
    }
}
