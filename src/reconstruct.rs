//! Call-stack reconstruction
//!
//! Pairs Enter/Exit events of one frame into nested, timed call intervals with
//! a single pass and a LIFO stack:
//!
//! - Enter pushes `(func, start)`.
//! - Exit pops the top entry and emits `(func, duration, level)`, where
//!   `level` is the number of calls still open after the pop. An Exit with an
//!   empty stack is a stray (profiling toggled mid-call) and is discarded.
//! - Entries left open at the end of the buffer are dropped.
//!
//! The same walk drives statistics aggregation, the history dumps and the
//! flame data model, so all of them agree on nesting.

use crate::clock::Timestamp;
use crate::event::{EventKind, FuncId, TraceEvent};
use serde::{Deserialize, Serialize};

/// A matched Enter/Exit pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallInterval {
    pub func: FuncId,
    pub start: Timestamp,
    pub duration_ns: u64,
    /// Number of still-open ancestors when this call closed
    pub level: usize,
}

impl CallInterval {
    pub fn end(&self) -> Timestamp {
        Timestamp::from_nanos(self.start.as_nanos().saturating_add(self.duration_ns))
    }
}

/// Outcome counters of one reconstruction pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconstructSummary {
    pub matched: usize,
    pub stray_exits: usize,
    pub unclosed: usize,
}

/// Receives the reconstructed call tree in event order
pub trait CallVisitor {
    /// A call opened; `depth` is the number of calls already open
    fn enter(&mut self, _func: FuncId, _depth: usize, _time: Timestamp) {}

    /// A call closed
    fn exit(&mut self, interval: &CallInterval);
}

impl<F: FnMut(&CallInterval)> CallVisitor for F {
    fn exit(&mut self, interval: &CallInterval) {
        self(interval)
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenCall {
    func: FuncId,
    start: Timestamp,
}

/// Reusable reconstruction state
///
/// Keeping one per thread avoids reallocating the stack every frame.
#[derive(Debug, Default)]
pub struct Reconstructor {
    stack: Vec<OpenCall>,
}

impl Reconstructor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            stack: Vec::with_capacity(capacity),
        }
    }

    /// Walk `events`, reporting every open and close to `visitor`
    pub fn walk<V: CallVisitor + ?Sized>(
        &mut self,
        events: &[TraceEvent],
        visitor: &mut V,
    ) -> ReconstructSummary {
        self.stack.clear();
        let mut summary = ReconstructSummary::default();

        for event in events {
            match event.kind {
                EventKind::Enter(func) => {
                    visitor.enter(func, self.stack.len(), event.time);
                    self.stack.push(OpenCall {
                        func,
                        start: event.time,
                    });
                }
                EventKind::Exit => {
                    let Some(open) = self.stack.pop() else {
                        summary.stray_exits += 1;
                        continue;
                    };
                    summary.matched += 1;
                    visitor.exit(&CallInterval {
                        func: open.func,
                        start: open.start,
                        duration_ns: event.time.nanos_since(open.start),
                        level: self.stack.len(),
                    });
                }
            }
        }

        summary.unclosed = self.stack.len();
        self.stack.clear();
        summary
    }

    /// Walk `events` and hand each closed call to `emit`
    pub fn run<F: FnMut(&CallInterval)>(
        &mut self,
        events: &[TraceEvent],
        mut emit: F,
    ) -> ReconstructSummary {
        self.walk(events, &mut emit)
    }
}

/// Reconstruct all intervals of `events`, in closing order
pub fn reconstruct(events: &[TraceEvent]) -> Vec<CallInterval> {
    let mut intervals = Vec::new();
    Reconstructor::new().run(events, |interval| intervals.push(*interval));
    intervals
}
