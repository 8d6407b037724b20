use crate::logging::{LogEvent, LogFields, LogLevel};
use crate::registry::BakeStats;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Default, Clone)]
pub struct ShapeMetrics {
    bakes: u64,
    traces: u64,
    closed: u64,
    dead_ends: u64,
    reentered: u64,
    non_minimal: u64,
    duplicates: u64,
    shapes: u64,
    dots_removed: u64,
    fills: u64,
    rects: u64,
}

impl ShapeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_bake(&mut self, stats: &BakeStats) {
        self.bakes = self.bakes.saturating_add(1);
        self.traces = self.traces.saturating_add(stats.traces);
        self.closed = self.closed.saturating_add(stats.closed);
        self.dead_ends = self.dead_ends.saturating_add(stats.dead_ends);
        self.reentered = self.reentered.saturating_add(stats.reentered);
        self.non_minimal = self.non_minimal.saturating_add(stats.non_minimal);
        self.duplicates = self.duplicates.saturating_add(stats.duplicates);
        self.shapes = self.shapes.saturating_add(stats.shapes);
    }

    pub fn record_dot_removed(&mut self) {
        self.dots_removed = self.dots_removed.saturating_add(1);
    }

    pub fn record_fill(&mut self, rect_count: usize) {
        self.fills = self.fills.saturating_add(1);
        self.rects = self.rects.saturating_add(rect_count as u64);
    }

    pub fn snapshot(&self, uptime: Duration) -> MetricSnapshot {
        MetricSnapshot {
            uptime_ms: u64::try_from(uptime.as_millis()).unwrap_or(u64::MAX),
            bakes: self.bakes,
            traces: self.traces,
            closed: self.closed,
            dead_ends: self.dead_ends,
            reentered: self.reentered,
            non_minimal: self.non_minimal,
            duplicates: self.duplicates,
            shapes: self.shapes,
            dots_removed: self.dots_removed,
            fills: self.fills,
            rects: self.rects,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSnapshot {
    pub uptime_ms: u64,
    pub bakes: u64,
    pub traces: u64,
    pub closed: u64,
    pub dead_ends: u64,
    pub reentered: u64,
    pub non_minimal: u64,
    pub duplicates: u64,
    pub shapes: u64,
    pub dots_removed: u64,
    pub fills: u64,
    pub rects: u64,
}

impl MetricSnapshot {
    pub fn to_log_event(&self, target: &str) -> LogEvent {
        LogEvent::with_fields(LogLevel::Info, target, "shape_metrics", self.as_fields())
    }

    pub fn as_fields(&self) -> LogFields {
        let mut map = LogFields::new();
        map.insert("uptime_ms".to_string(), json!(self.uptime_ms));
        map.insert("bakes".to_string(), json!(self.bakes));
        map.insert("traces".to_string(), json!(self.traces));
        map.insert("closed".to_string(), json!(self.closed));
        map.insert("dead_ends".to_string(), json!(self.dead_ends));
        map.insert("reentered".to_string(), json!(self.reentered));
        map.insert("non_minimal".to_string(), json!(self.non_minimal));
        map.insert("duplicates".to_string(), json!(self.duplicates));
        map.insert("shapes".to_string(), json!(self.shapes));
        map.insert("dots_removed".to_string(), json!(self.dots_removed));
        map.insert("fills".to_string(), json!(self.fills));
        map.insert("rects".to_string(), json!(self.rects));
        map
    }
}
