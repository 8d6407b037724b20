use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::json;

use crate::Result;
use crate::logging::{LogLevel, Logger, event_with_fields, json_kv, json_str};
use crate::metrics::ShapeMetrics;

use super::{EventFlow, LevelContext, LevelEvent, ShapePlugin};

/// Logs level lifecycle events for observability/debugging.
pub struct LifecycleLoggerPlugin {
    logger: Logger,
    level: LogLevel,
    log_discoveries: bool,
    log_removals: bool,
}

impl LifecycleLoggerPlugin {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            level: LogLevel::Debug,
            log_discoveries: true,
            log_removals: false,
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn log_discoveries(mut self, enabled: bool) -> Self {
        self.log_discoveries = enabled;
        self
    }

    pub fn log_removals(mut self, enabled: bool) -> Self {
        self.log_removals = enabled;
        self
    }

    fn emit(&self, message: &str, fields: impl IntoIterator<Item = (String, serde_json::Value)>) {
        let event = event_with_fields(self.level, "dotloop::runtime.lifecycle", message, fields);
        let _ = self.logger.log_event(event);
    }
}

impl ShapePlugin for LifecycleLoggerPlugin {
    fn name(&self) -> &str {
        "diagnostics.lifecycle_logger"
    }

    fn init(&mut self, ctx: &LevelContext<'_>) -> Result<()> {
        let geometry = ctx.geometry();
        self.emit(
            "plugin_initialized",
            [
                json_kv("logger_level", json!(format!("{:?}", self.level))),
                json_kv("columns", json!(geometry.columns)),
                json_kv("rows", json!(geometry.rows)),
            ],
        );
        Ok(())
    }

    fn on_event(&mut self, ctx: &LevelContext<'_>, event: &LevelEvent) -> Result<EventFlow> {
        match event {
            LevelEvent::Loaded { stats }
            | LevelEvent::Reset { stats }
            | LevelEvent::TopologyChanged { stats } => {
                self.emit(
                    &format!("event.{}", event.describe()),
                    [
                        json_kv("traces", json!(stats.traces)),
                        json_kv("shapes", json!(stats.shapes)),
                        json_kv("pending", json!(ctx.pending_shapes())),
                    ],
                );
            }
            LevelEvent::ShapeDiscovered { shape, dots } if self.log_discoveries => {
                let tiles = ctx.shape(*shape).map(|s| s.tile_count()).unwrap_or(0);
                self.emit(
                    "event.shape_discovered",
                    [
                        json_str("shape", shape.to_string()),
                        json_kv("dots", json!(dots)),
                        json_kv("tiles", json!(tiles)),
                    ],
                );
            }
            LevelEvent::DotRemoved { tile, touched } if self.log_removals => {
                self.emit(
                    "event.dot_removed",
                    [
                        json_kv("tile", json!(tile)),
                        json_kv("shapes", json!(touched.len())),
                    ],
                );
            }
            LevelEvent::ShapeFilled { shape, rects } => {
                self.emit(
                    "event.shape_filled",
                    [
                        json_str("shape", shape.to_string()),
                        json_kv("rects", json!(rects)),
                    ],
                );
            }
            LevelEvent::AllShapesFilled => {
                self.emit("event.all_shapes_filled", std::iter::empty());
            }
            LevelEvent::Unloaded => {
                self.emit("event.unloaded", std::iter::empty());
            }
            _ => {}
        }

        Ok(EventFlow::Continue)
    }
}

/// Emits shape metrics snapshots on bakes, fills and unload.
pub struct MetricsSnapshotPlugin {
    logger: Logger,
    metrics: Arc<Mutex<ShapeMetrics>>,
    target: String,
    interval: Duration,
    last_emit: Option<Instant>,
    started_at: Instant,
}

impl MetricsSnapshotPlugin {
    pub fn new(logger: Logger, metrics: Arc<Mutex<ShapeMetrics>>) -> Self {
        Self {
            logger,
            metrics,
            target: "dotloop::runtime.metrics".to_string(),
            interval: Duration::ZERO,
            last_emit: None,
            started_at: Instant::now(),
        }
    }

    /// Minimum gap between two snapshots. Zero emits on every trigger.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    fn emit_snapshot(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_emit {
            if now.duration_since(last) < self.interval {
                return;
            }
        }

        self.last_emit = Some(now);
        let uptime = now.duration_since(self.started_at);

        if let Ok(guard) = self.metrics.lock() {
            let event = guard.snapshot(uptime).to_log_event(&self.target);
            let _ = self.logger.log_event(event);
        }
    }
}

impl ShapePlugin for MetricsSnapshotPlugin {
    fn name(&self) -> &str {
        "diagnostics.metrics_snapshot"
    }

    fn init(&mut self, _ctx: &LevelContext<'_>) -> Result<()> {
        self.started_at = Instant::now();
        self.last_emit = None;
        Ok(())
    }

    fn on_event(&mut self, _ctx: &LevelContext<'_>, event: &LevelEvent) -> Result<EventFlow> {
        if matches!(
            event,
            LevelEvent::Loaded { .. }
                | LevelEvent::Reset { .. }
                | LevelEvent::TopologyChanged { .. }
                | LevelEvent::ShapeFilled { .. }
                | LevelEvent::Unloaded
        ) {
            self.emit_snapshot();
        }
        Ok(EventFlow::Continue)
    }
}
