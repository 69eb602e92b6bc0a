//! Text and JSON renderings of stats tables and frame histories
//!
//! Every renderer takes the info table explicitly so names resolved while
//! formatting stay cached for the next report.

use crate::clock::{TimeUnit, Timestamp};
use crate::event::{FuncId, TraceEvent};
use crate::flame::FlameGraph;
use crate::reconstruct::{CallInterval, CallVisitor, Reconstructor};
use crate::stats::{SortBy, StatsTable};
use crate::symbols::SymbolCache;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Spaces per nesting level in history dumps
const INDENT: usize = 2;

/// How reports are rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOptions {
    pub unit: TimeUnit,
    pub sort: SortBy,
    /// Function names are padded or truncated to this width in stats reports
    pub name_width: usize,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            unit: TimeUnit::Ns,
            sort: SortBy::Total,
            name_width: 64,
        }
    }
}

impl ReportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unit(mut self, unit: TimeUnit) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_sort(mut self, sort: SortBy) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_name_width(mut self, width: usize) -> Self {
        self.name_width = width;
        self
    }
}

/// One line per function: max, min, average, total and call count
pub fn format_stats(table: &StatsTable, symbols: &mut SymbolCache, options: &ReportOptions) -> String {
    let unit = options.unit;
    let mut out = String::new();
    for (func, stats) in table.sorted(options.sort) {
        let info = symbols.resolve(func);
        let _ = writeln!(
            out,
            "{:<w$.w$}.{:<4} | Max: {:>8} ({u}) | Min: {:>8} ({u}) | Avg: {:>8.0} ({u}) | Tot: {:>8} ({u}) | Count: {}",
            info.name,
            info.line,
            unit.convert(stats.max_ns),
            unit.convert(stats.min_or_zero()),
            unit.convert_f64(stats.average_ns()),
            unit.convert(stats.total_ns),
            stats.count,
            w = options.name_width,
            u = unit,
        );
    }
    out
}

/// One line per function: average and call count
pub fn format_stats_compact(
    table: &StatsTable,
    symbols: &mut SymbolCache,
    options: &ReportOptions,
) -> String {
    let unit = options.unit;
    let mut out = String::new();
    for (func, stats) in table.sorted(options.sort) {
        let info = symbols.resolve(func);
        let _ = writeln!(
            out,
            "{:<w$.w$}.{:<4} | Avg: {:>8.0} ({u}) | Count: {}",
            info.name,
            info.line,
            unit.convert_f64(stats.average_ns()),
            stats.count,
            w = options.name_width,
            u = unit,
        );
    }
    out
}

struct HistoryPrinter<'a> {
    out: String,
    symbols: &'a mut SymbolCache,
    unit: TimeUnit,
}

impl CallVisitor for HistoryPrinter<'_> {
    fn enter(&mut self, func: FuncId, depth: usize, _time: Timestamp) {
        let info = self.symbols.resolve(func);
        let _ = writeln!(
            self.out,
            "{:indent$}[+] {}.{}",
            "",
            info.name,
            info.line,
            indent = depth * INDENT
        );
    }

    fn exit(&mut self, interval: &CallInterval) {
        let info = self.symbols.resolve(interval.func);
        let _ = writeln!(
            self.out,
            "{:indent$}[-] {}.{}, time: {} ({})",
            "",
            info.name,
            info.line,
            self.unit.convert(interval.duration_ns),
            self.unit,
            indent = interval.level * INDENT
        );
    }
}

/// Call tree of a frame: an `[+]` line per Enter and a `[-]` line with the
/// duration per matched Exit, indented by nesting level
///
/// Stray exits produce no line.
pub fn format_history(events: &[TraceEvent], symbols: &mut SymbolCache, options: &ReportOptions) -> String {
    let mut printer = HistoryPrinter {
        out: String::new(),
        symbols,
        unit: options.unit,
    };
    Reconstructor::new().walk(events, &mut printer);
    printer.out
}

/// One line per matched call, in call order, indented by nesting level
pub fn format_history_compact(
    events: &[TraceEvent],
    symbols: &mut SymbolCache,
    options: &ReportOptions,
) -> String {
    let unit = options.unit;
    let mut out = String::new();
    for span in FlameGraph::from_events(events).spans {
        let info = symbols.resolve(span.func);
        let _ = writeln!(
            out,
            "{:indent$}{}.{} ({} {})",
            "",
            info.name,
            info.line,
            unit.convert(span.duration_ns),
            unit,
            indent = span.level * INDENT
        );
    }
    out
}

/// Statistics of one function in a JSON stats report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonFunctionStats {
    pub id: FuncId,
    pub name: String,
    pub file: String,
    pub line: u32,
    pub count: u64,
    /// Durations below are in the report's unit
    pub min: u64,
    pub max: u64,
    pub avg: f64,
    pub total: u64,
}

/// A stats table rendered for machine consumption
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonStatsReport {
    pub unit: TimeUnit,
    pub functions: Vec<JsonFunctionStats>,
}

/// One matched call in a JSON history report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonCall {
    pub id: FuncId,
    pub name: String,
    pub line: u32,
    /// Offset from the first event of the frame
    pub offset: u64,
    pub duration: u64,
    pub level: usize,
}

/// A frame history rendered for machine consumption
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonHistoryReport {
    pub unit: TimeUnit,
    pub frame_duration: u64,
    pub calls: Vec<JsonCall>,
}

pub fn stats_json(
    table: &StatsTable,
    symbols: &mut SymbolCache,
    options: &ReportOptions,
) -> serde_json::Result<String> {
    let unit = options.unit;
    let functions = table
        .sorted(options.sort)
        .into_iter()
        .map(|(func, stats)| {
            let info = symbols.resolve(func);
            JsonFunctionStats {
                id: func,
                name: info.name.clone(),
                file: info.file.clone(),
                line: info.line,
                count: stats.count,
                min: unit.convert(stats.min_or_zero()),
                max: unit.convert(stats.max_ns),
                avg: unit.convert_f64(stats.average_ns()),
                total: unit.convert(stats.total_ns),
            }
        })
        .collect();
    serde_json::to_string_pretty(&JsonStatsReport { unit, functions })
}

pub fn history_json(
    events: &[TraceEvent],
    symbols: &mut SymbolCache,
    options: &ReportOptions,
) -> serde_json::Result<String> {
    let unit = options.unit;
    let graph = FlameGraph::from_events(events);
    let calls = graph
        .spans
        .iter()
        .map(|span| {
            let info = symbols.resolve(span.func);
            JsonCall {
                id: span.func,
                name: info.name.clone(),
                line: info.line,
                offset: unit.convert(span.offset_ns),
                duration: unit.convert(span.duration_ns),
                level: span.level,
            }
        })
        .collect();
    serde_json::to_string_pretty(&JsonHistoryReport {
        unit,
        frame_duration: unit.convert(graph.frame_duration_ns),
        calls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::tests::TableProvider;
    use std::sync::Arc;

    fn symbols() -> SymbolCache {
        SymbolCache::with_provider(Arc::new(TableProvider::new(&[
            (0xa, "alpha", "a.rs", 10),
            (0xb, "beta", "b.rs", 20),
        ])))
    }

    fn ts(ns: u64) -> Timestamp {
        Timestamp::from_nanos(ns)
    }

    fn nested() -> Vec<TraceEvent> {
        // alpha(0..3000) { beta(1000..2500) }
        vec![
            TraceEvent::enter(FuncId::new(0xa), ts(0)),
            TraceEvent::enter(FuncId::new(0xb), ts(1000)),
            TraceEvent::exit(ts(2500)),
            TraceEvent::exit(ts(3000)),
        ]
    }

    fn table() -> StatsTable {
        let mut table = StatsTable::new();
        table.record(FuncId::new(0xa), 3000);
        table.record(FuncId::new(0xb), 1000);
        table.record(FuncId::new(0xb), 2400);
        table
    }

    #[test]
    fn test_stats_lines() {
        let options = ReportOptions::new().with_name_width(8);
        let text = format_stats(&table(), &mut symbols(), &options);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "alpha   .10   | Max:     3000 (ns) | Min:     3000 (ns) | Avg:     3000 (ns) | Tot:     3000 (ns) | Count: 1"
        );
        assert!(lines[1].starts_with("beta    .20   | Max:     2400 (ns) | Min:     1000 (ns)"));
        assert!(lines[1].ends_with("| Count: 2"));
    }

    #[test]
    fn test_stats_compact_in_microseconds() {
        let options = ReportOptions::new()
            .with_unit(TimeUnit::Us)
            .with_sort(SortBy::Count)
            .with_name_width(5);
        let text = format_stats_compact(&table(), &mut symbols(), &options);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "beta .20   | Avg:        2 (us) | Count: 2");
        assert_eq!(lines[1], "alpha.10   | Avg:        3 (us) | Count: 1");
    }

    #[test]
    fn test_long_names_are_truncated() {
        let options = ReportOptions::new().with_name_width(3);
        let text = format_stats_compact(&table(), &mut symbols(), &options);
        assert!(text.starts_with("alp.10"));
    }

    #[test]
    fn test_empty_reports() {
        let options = ReportOptions::default();
        assert!(format_stats(&StatsTable::new(), &mut symbols(), &options).is_empty());
        assert!(format_history(&[], &mut symbols(), &options).is_empty());
        assert!(format_history_compact(&[], &mut symbols(), &options).is_empty());
    }

    #[test]
    fn test_history_tree() {
        let text = format_history(&nested(), &mut symbols(), &ReportOptions::default());
        assert_eq!(
            text,
            "[+] alpha.10\n  [+] beta.20\n  [-] beta.20, time: 1500 (ns)\n[-] alpha.10, time: 3000 (ns)\n"
        );
    }

    #[test]
    fn test_history_skips_stray_exits() {
        let mut events = vec![TraceEvent::exit(ts(0))];
        events.extend(nested());
        let text = format_history(&events, &mut symbols(), &ReportOptions::default());
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn test_history_compact() {
        let options = ReportOptions::new().with_unit(TimeUnit::Us);
        let text = format_history_compact(&nested(), &mut symbols(), &options);
        assert_eq!(text, "alpha.10 (3 us)\n  beta.20 (1 us)\n");
    }

    #[test]
    fn test_formatting_fills_info_table() {
        let mut cache = symbols();
        format_history(&nested(), &mut cache, &ReportOptions::default());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_stats_json() {
        let json = stats_json(&table(), &mut symbols(), &ReportOptions::default()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["unit"], "ns");
        assert_eq!(value["functions"][0]["name"], "alpha");
        assert_eq!(value["functions"][1]["count"], 2);
        assert_eq!(value["functions"][1]["avg"], 1700.0);
    }

    #[test]
    fn test_history_json() {
        let json = history_json(&nested(), &mut symbols(), &ReportOptions::default()).unwrap();
        let report: JsonHistoryReport = serde_json::from_str(&json).unwrap();
        assert_eq!(report.frame_duration, 3000);
        assert_eq!(report.calls.len(), 2);
        assert_eq!(report.calls[1].name, "beta");
        assert_eq!(report.calls[1].offset, 1000);
        assert_eq!(report.calls[1].level, 1);
    }
}
