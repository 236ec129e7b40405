//! Terminal presentation of a rewrite: styled diff segments, the stats line and
//! error hints.

use std::io::{self, Write};

use core_diff::{DiffStats, Highlight, SegmentKind, SegmentStyle, StyledSegment};
use core_events::ErrorKind;
use crossterm::cursor::{RestorePosition, SavePosition};
use crossterm::queue;
use crossterm::style::{Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor};
use crossterm::terminal::{Clear, ClearType};

const ADDITION_BG: Color = Color::DarkGreen;
const REMOVAL_BG: Color = Color::DarkRed;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Colors and strikethrough; the diff is redrawn in place as it streams.
    Styled,
    /// `[-removed-]{+added+}` markers; only the settled diff is printed.
    Plain,
}

pub struct DiffView<W: Write> {
    out: W,
    mode: DisplayMode,
    anchored: bool,
    latest: Vec<StyledSegment>,
}

impl<W: Write> DiffView<W> {
    pub fn new(out: W, mode: DisplayMode) -> Self {
        Self {
            out,
            mode,
            anchored: false,
            latest: Vec::new(),
        }
    }

    /// Record a diff update, redrawing immediately in styled mode.
    pub fn update(&mut self, segments: Vec<StyledSegment>) -> io::Result<()> {
        self.latest = segments;
        if self.mode == DisplayMode::Styled {
            self.redraw()?;
        }
        Ok(())
    }

    /// The run settled: make sure the final diff is on screen, then the stats line.
    pub fn settle(&mut self, stats: Option<DiffStats>, model: &str) -> io::Result<()> {
        if self.mode == DisplayMode::Plain {
            for segment in &self.latest {
                write_segment(&mut self.out, segment, self.mode)?;
            }
        }
        queue!(self.out, Print("\n"))?;
        if let Some(stats) = stats {
            queue!(self.out, Print(stats_line(&stats, model)), Print("\n"))?;
        }
        self.out.flush()
    }

    /// Remove a partially drawn diff (failure or interrupt).
    pub fn abandon(&mut self) -> io::Result<()> {
        if self.anchored {
            queue!(self.out, RestorePosition, Clear(ClearType::FromCursorDown))?;
            self.anchored = false;
        }
        self.latest.clear();
        self.out.flush()
    }

    pub fn print_text(&mut self, text: &str) -> io::Result<()> {
        queue!(self.out, Print(text), Print("\n"))?;
        self.out.flush()
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn redraw(&mut self) -> io::Result<()> {
        if self.anchored {
            queue!(self.out, RestorePosition, Clear(ClearType::FromCursorDown))?;
        } else {
            queue!(self.out, SavePosition)?;
            self.anchored = true;
        }
        for segment in &self.latest {
            write_segment(&mut self.out, segment, self.mode)?;
        }
        self.out.flush()
    }
}

fn write_segment<W: Write>(out: &mut W, segment: &StyledSegment, mode: DisplayMode) -> io::Result<()> {
    match mode {
        DisplayMode::Plain => match segment.kind {
            SegmentKind::Equal => queue!(out, Print(&segment.text)),
            SegmentKind::Delete => queue!(out, Print("[-"), Print(&segment.text), Print("-]")),
            SegmentKind::Insert => queue!(out, Print("{+"), Print(&segment.text), Print("+}")),
        },
        DisplayMode::Styled => {
            let style = segment.style();
            if style.is_base() {
                return queue!(out, Print(&segment.text));
            }
            apply_style(out, style)?;
            queue!(
                out,
                Print(&segment.text),
                ResetColor,
                SetAttribute(Attribute::Reset)
            )
        }
    }
}

fn apply_style<W: Write>(out: &mut W, style: SegmentStyle) -> io::Result<()> {
    match style.highlight {
        Some(Highlight::Addition) => queue!(out, SetBackgroundColor(ADDITION_BG))?,
        Some(Highlight::Removal) => queue!(out, SetBackgroundColor(REMOVAL_BG))?,
        None => {}
    }
    if style.strikethrough {
        queue!(out, SetAttribute(Attribute::CrossedOut))?;
    }
    Ok(())
}

/// `字元數: N | 改變: M | 模型: <model>`
pub fn stats_line(stats: &DiffStats, model: &str) -> String {
    format!("{stats} | 模型: {model}")
}

/// Extra guidance printed under an error message.
pub fn error_hint(kind: ErrorKind) -> Option<&'static str> {
    match kind {
        ErrorKind::RateLimit => Some("請求過於頻繁，請稍後再試。"),
        ErrorKind::Auth => Some("請檢查 API 金鑰設定。"),
        ErrorKind::Timeout => Some("服務回應逾時，可調整 [session] timeout_ms。"),
        ErrorKind::EmptyResponse => Some("服務沒有回傳任何文字。"),
        ErrorKind::Network | ErrorKind::Encoding | ErrorKind::InvalidResponse => None,
    }
}
