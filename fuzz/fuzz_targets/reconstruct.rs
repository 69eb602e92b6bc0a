#![no_main]

use hookprof::{FlameGraph, Reconstructor, StatsTable, TraceEvent};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|events: Vec<TraceEvent>| {
    // Any event sequence, balanced or not, must reconstruct without panicking
    let mut table = StatsTable::new();
    let summary = Reconstructor::new().run(&events, |interval| table.record_interval(interval));

    let exits = events.iter().filter(|e| e.is_exit()).count();
    assert_eq!(summary.matched + summary.stray_exits, exits);
    assert_eq!(summary.matched + summary.unclosed, events.len() - exits);

    let graph = FlameGraph::from_events(&events);
    assert_eq!(graph.spans.len(), summary.matched);
});
