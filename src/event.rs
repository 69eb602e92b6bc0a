//! Trace events and the double-buffered frame history
//!
//! Each thread owns one `FrameHistory`. New events are appended to the active
//! buffer while the other buffer keeps the last completed frame readable.

use crate::clock::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, stable identity of a traced function
///
/// In practice this is either the function's entry address or an identity
/// handed out by [`crate::registry`]. It is the only key used by the stats
/// and info tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
#[serde(transparent)]
pub struct FuncId(u64);

impl FuncId {
    /// Bit reserved for registry-assigned identities. No user-space code
    /// address on supported targets has it set.
    pub const REGISTERED_TAG: u64 = 1 << 63;

    /// Identity from an opaque token
    ///
    /// Tokens with [`FuncId::REGISTERED_TAG`] set may coincide with a
    /// registered identity, in which case they resolve to the registered
    /// function.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Identity of a function from its entry address
    pub fn from_addr(addr: usize) -> Self {
        Self(addr as u64)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Whether this identity was assigned by the registry
    pub const fn is_registered(self) -> bool {
        self.0 & Self::REGISTERED_TAG != 0
    }
}

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

/// What a trace event records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Function entry
    Enter(FuncId),
    /// Function return; the identity is implied by the open call on top of the stack
    Exit,
}

/// One timestamped Enter or Exit record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub struct TraceEvent {
    pub kind: EventKind,
    pub time: Timestamp,
}

impl TraceEvent {
    pub fn enter(func: FuncId, time: Timestamp) -> Self {
        Self {
            kind: EventKind::Enter(func),
            time,
        }
    }

    pub fn exit(time: Timestamp) -> Self {
        Self {
            kind: EventKind::Exit,
            time,
        }
    }

    /// Identity for Enter events, `None` for Exit
    pub fn func(&self) -> Option<FuncId> {
        match self.kind {
            EventKind::Enter(func) => Some(func),
            EventKind::Exit => None,
        }
    }

    pub fn is_exit(&self) -> bool {
        matches!(self.kind, EventKind::Exit)
    }
}

/// Two alternating event buffers
///
/// `start_frame` flips the active buffer and clears it. `end_frame` marks the
/// active buffer as the last completed frame without clearing it, so it stays
/// readable until two more `start_frame` calls reuse it.
#[derive(Debug, Clone)]
pub struct FrameHistory {
    buffers: [Vec<TraceEvent>; 2],
    active: usize,
    /// (buffer index, event count) of the last completed frame
    completed: Option<(usize, usize)>,
}

impl Default for FrameHistory {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl FrameHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-allocate `capacity` events in each buffer
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffers: [Vec::with_capacity(capacity), Vec::with_capacity(capacity)],
            active: 0,
            completed: None,
        }
    }

    /// Append an event to the active buffer
    #[inline]
    pub fn push(&mut self, event: TraceEvent) {
        self.buffers[self.active].push(event);
    }

    /// Switch to the other buffer and clear it
    pub fn start_frame(&mut self) {
        self.active ^= 1;
        self.buffers[self.active].clear();
        if matches!(self.completed, Some((idx, _)) if idx == self.active) {
            self.completed = None;
        }
    }

    /// Freeze the active buffer as the last completed frame and return its events
    pub fn end_frame(&mut self) -> &[TraceEvent] {
        let len = self.buffers[self.active].len();
        self.completed = Some((self.active, len));
        &self.buffers[self.active][..len]
    }

    /// Events recorded so far in the active buffer
    pub fn active(&self) -> &[TraceEvent] {
        &self.buffers[self.active]
    }

    /// Events of the last completed frame; empty before any frame completed
    pub fn last_completed(&self) -> &[TraceEvent] {
        match self.completed {
            Some((idx, len)) => &self.buffers[idx][..len],
            None => &[],
        }
    }

    /// Drop everything, including the last completed frame
    pub fn reset(&mut self) {
        for buffer in &mut self.buffers {
            buffer.clear();
        }
        self.completed = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(ns: u64) -> Timestamp {
        Timestamp::from_nanos(ns)
    }

    #[test]
    fn test_registered_tag() {
        assert!(!FuncId::from_addr(0x5555_0000_1234).is_registered());
        assert!(FuncId::new(FuncId::REGISTERED_TAG | 7).is_registered());
    }

    #[test]
    fn test_func_id_display_is_hex() {
        assert_eq!(FuncId::new(0xabc).to_string(), "0x0000000000000abc");
    }

    #[test]
    fn test_event_accessors() {
        let a = FuncId::new(1);
        assert_eq!(TraceEvent::enter(a, ts(1)).func(), Some(a));
        assert!(TraceEvent::exit(ts(2)).is_exit());
        assert_eq!(TraceEvent::exit(ts(2)).func(), None);
    }

    #[test]
    fn test_no_completed_frame_is_empty() {
        let mut history = FrameHistory::new();
        history.push(TraceEvent::enter(FuncId::new(1), ts(1)));
        assert!(history.last_completed().is_empty());
        assert_eq!(history.active().len(), 1);
    }

    #[test]
    fn test_end_frame_exposes_exact_events() {
        let mut history = FrameHistory::new();
        history.start_frame();
        history.push(TraceEvent::enter(FuncId::new(1), ts(1)));
        history.push(TraceEvent::exit(ts(2)));
        assert_eq!(history.end_frame().len(), 2);

        // Events recorded after the frame ended are not part of it
        history.push(TraceEvent::enter(FuncId::new(2), ts(3)));
        assert_eq!(history.last_completed().len(), 2);
    }

    #[test]
    fn test_completed_frame_survives_one_start() {
        let mut history = FrameHistory::new();
        history.start_frame();
        history.push(TraceEvent::enter(FuncId::new(1), ts(1)));
        history.end_frame();

        history.start_frame();
        history.push(TraceEvent::enter(FuncId::new(2), ts(2)));
        assert_eq!(
            history.last_completed(),
            &[TraceEvent::enter(FuncId::new(1), ts(1))]
        );
    }

    #[test]
    fn test_double_buffer_wraparound() {
        let mut history = FrameHistory::new();
        history.start_frame();
        history.push(TraceEvent::enter(FuncId::new(1), ts(1)));
        history.end_frame();

        history.start_frame();
        history.end_frame();
        history.start_frame();

        // Two starts later the first frame's buffer has been reused
        assert!(history.active().is_empty());
        assert!(history.last_completed().is_empty());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut history = FrameHistory::with_capacity(8);
        history.start_frame();
        history.push(TraceEvent::exit(ts(1)));
        history.end_frame();
        history.reset();
        assert!(history.active().is_empty());
        assert!(history.last_completed().is_empty());
    }
}
