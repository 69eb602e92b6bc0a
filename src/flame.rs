//! Flame-graph data model for one frame
//!
//! Visualizations draw each matched call as a rectangle: horizontal position
//! and width come from its offset and duration within the frame, vertical
//! position from its nesting level. This module produces exactly that and
//! nothing about rendering.

use crate::clock::Timestamp;
use crate::event::{FuncId, TraceEvent};
use crate::reconstruct::Reconstructor;
use serde::{Deserialize, Serialize};

/// One matched call positioned within its frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlameSpan {
    pub func: FuncId,
    /// Nanoseconds from the first event of the frame
    pub offset_ns: u64,
    pub duration_ns: u64,
    pub level: usize,
}

impl FlameSpan {
    pub fn end_ns(&self) -> u64 {
        self.offset_ns.saturating_add(self.duration_ns)
    }
}

/// All matched calls of one frame, in call (pre-)order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlameGraph {
    pub frame_start: Timestamp,
    /// Time between the first and last event of the frame
    pub frame_duration_ns: u64,
    pub spans: Vec<FlameSpan>,
    pub max_level: usize,
}

impl FlameGraph {
    pub fn from_events(events: &[TraceEvent]) -> Self {
        let (Some(first), Some(last)) = (events.first(), events.last()) else {
            return Self::default();
        };
        let frame_start = first.time;

        let mut spans = Vec::new();
        Reconstructor::new().run(events, |interval| {
            spans.push(FlameSpan {
                func: interval.func,
                offset_ns: interval.start.nanos_since(frame_start),
                duration_ns: interval.duration_ns,
                level: interval.level,
            })
        });
        // Parents close after their children; reorder so each call precedes
        // its callees. The sort is stable, keeping siblings in close order.
        spans.sort_by_key(|span| (span.offset_ns, span.level));

        let max_level = spans.iter().map(|span| span.level).max().unwrap_or(0);
        Self {
            frame_start,
            frame_duration_ns: last.time.nanos_since(frame_start),
            spans,
            max_level,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Spans overlapping the window between fractions `from` and `to` of the
    /// frame (in either order, clamped to 0..=1)
    pub fn window(&self, from: f64, to: f64) -> impl Iterator<Item = &FlameSpan> + '_ {
        let (lo, hi) = if from <= to { (from, to) } else { (to, from) };
        let duration = self.frame_duration_ns as f64;
        let lo_ns = (lo.clamp(0.0, 1.0) * duration) as u64;
        let hi_ns = (hi.clamp(0.0, 1.0) * duration) as u64;
        self.spans
            .iter()
            .filter(move |span| span.offset_ns <= hi_ns && span.end_ns() >= lo_ns)
    }

    pub fn spans_at_level(&self, level: usize) -> impl Iterator<Item = &FlameSpan> + '_ {
        self.spans.iter().filter(move |span| span.level == level)
    }

    /// Start and width of `span` as fractions of the frame duration
    pub fn relative_extent(&self, span: &FlameSpan) -> (f64, f64) {
        if self.frame_duration_ns == 0 {
            return (0.0, 0.0);
        }
        let duration = self.frame_duration_ns as f64;
        (
            span.offset_ns as f64 / duration,
            span.duration_ns as f64 / duration,
        )
    }
}
