use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::json;

use crate::connectivity::TileSource;
use crate::fill::FillRect;
use crate::geometry::{GridGeometry, TileIndex};
use crate::logging::{event_with_fields, json_kv, json_str};
use crate::metrics::{MetricSnapshot, ShapeMetrics};
use crate::registry::{BakeStats, DotRemoval, RegistryConfig, Shape, ShapeId, ShapeRegistry};
use crate::render::FillSink;
use crate::{LogLevel, Logger, Result, ShapeError};

pub mod diagnostics;

/// Configuration knobs for the level runtime.
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Optional structured logger used by the runtime.
    pub logger: Option<Logger>,
    /// Metrics accumulator shared with diagnostics plugins.
    pub metrics: Option<Arc<Mutex<ShapeMetrics>>>,
    /// Target field of runtime log events.
    pub log_target: String,
    pub registry: RegistryConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            logger: None,
            metrics: None,
            log_target: "dotloop::runtime".to_string(),
            registry: RegistryConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Enable metrics collection if it has not already been configured.
    pub fn enable_metrics(&mut self) {
        if self.metrics.is_none() {
            self.metrics = Some(Arc::new(Mutex::new(ShapeMetrics::new())));
        }
    }

    pub fn disable_metrics(&mut self) {
        self.metrics = None;
    }

    /// Access the shared metrics handle if metrics are enabled.
    pub fn metrics_handle(&self) -> Option<Arc<Mutex<ShapeMetrics>>> {
        self.metrics.as_ref().map(Arc::clone)
    }
}

/// Level events delivered to plugins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelEvent {
    Loaded { stats: BakeStats },
    Reset { stats: BakeStats },
    TopologyChanged { stats: BakeStats },
    ShapeDiscovered { shape: ShapeId, dots: usize },
    DotRemoved { tile: TileIndex, touched: Vec<ShapeId> },
    /// Sent exactly once per shape, after the fill sink received the rects.
    ShapeFilled { shape: ShapeId, rects: Vec<FillRect> },
    /// The last pending shape of the level was filled.
    AllShapesFilled,
    Unloaded,
}

impl LevelEvent {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Loaded { .. } => "loaded",
            Self::Reset { .. } => "reset",
            Self::TopologyChanged { .. } => "topology_changed",
            Self::ShapeDiscovered { .. } => "shape_discovered",
            Self::DotRemoved { .. } => "dot_removed",
            Self::ShapeFilled { .. } => "shape_filled",
            Self::AllShapesFilled => "all_shapes_filled",
            Self::Unloaded => "unloaded",
        }
    }
}

/// Control the propagation of an event across plugins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFlow {
    Continue,
    Consumed,
}

/// Read-only view of the loaded level handed to plugins.
pub struct LevelContext<'a> {
    registry: &'a ShapeRegistry,
}

impl<'a> LevelContext<'a> {
    fn new(registry: &'a ShapeRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'a ShapeRegistry {
        self.registry
    }

    pub fn geometry(&self) -> GridGeometry {
        self.registry.geometry()
    }

    pub fn shape(&self, id: ShapeId) -> Option<&'a Shape> {
        self.registry.shape(id)
    }

    pub fn pending_shapes(&self) -> usize {
        self.registry.pending_shapes()
    }
}

/// Behaviour injection point for the runtime.
pub trait ShapePlugin: Send {
    fn name(&self) -> &str {
        "shape_plugin"
    }

    /// Called once per `load`, after the first bake.
    fn init(&mut self, _ctx: &LevelContext<'_>) -> Result<()> {
        Ok(())
    }

    fn on_event(&mut self, _ctx: &LevelContext<'_>, _event: &LevelEvent) -> Result<EventFlow> {
        Ok(EventFlow::Continue)
    }
}

/// Owns the registry of the loaded level and drives its lifecycle.
pub struct LevelRuntime {
    registry: Option<ShapeRegistry>,
    plugins: Vec<Box<dyn ShapePlugin>>,
    fill_sink: Option<Box<dyn FillSink + Send>>,
    config: RuntimeConfig,
    loaded_at: Option<Instant>,
}

impl Default for LevelRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl LevelRuntime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            registry: None,
            plugins: Vec::new(),
            fill_sink: None,
            config,
            loaded_at: None,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RuntimeConfig {
        &mut self.config
    }

    pub fn register_plugin<P>(&mut self, plugin: P)
    where
        P: ShapePlugin + 'static,
    {
        self.plugins.push(Box::new(plugin));
    }

    /// Route completed rectangles to `sink`. Replaces any previous sink.
    pub fn set_fill_sink<S>(&mut self, sink: S)
    where
        S: FillSink + Send + 'static,
    {
        self.fill_sink = Some(Box::new(sink));
    }

    pub fn is_loaded(&self) -> bool {
        self.registry.is_some()
    }

    pub fn registry(&self) -> Option<&ShapeRegistry> {
        self.registry.as_ref()
    }

    /// Builds a registry for `tiles`, registers `dots` and bakes. A level that
    /// is already loaded is unloaded first.
    pub fn load<T, I>(&mut self, tiles: &T, dots: I) -> Result<BakeStats>
    where
        T: TileSource + ?Sized,
        I: IntoIterator<Item = TileIndex>,
    {
        self.unload();

        let geometry = tiles.geometry();
        let mut registry = ShapeRegistry::with_config(geometry, self.config.registry);
        for dot in dots {
            if !geometry.contains(dot) {
                return Err(ShapeError::TileOutOfBounds(dot));
            }
            registry.add_point(dot);
        }
        let stats = registry.bake(tiles);
        self.registry = Some(registry);
        self.loaded_at = Some(Instant::now());

        self.log_runtime_event(
            LogLevel::Info,
            "level_loaded",
            [
                json_kv("columns", json!(geometry.columns)),
                json_kv("rows", json!(geometry.rows)),
                json_kv("markers", json!(self.marker_count())),
            ],
        );
        self.init_plugins()?;
        self.finish_bake(LevelEvent::Loaded { stats }, stats)?;
        Ok(stats)
    }

    /// Level restart: every dot comes back and the shapes are baked again.
    pub fn reset<T>(&mut self, tiles: &T) -> Result<BakeStats>
    where
        T: TileSource + ?Sized,
    {
        let stats = self.loaded_mut()?.reset(tiles);
        self.log_runtime_event(LogLevel::Info, "level_reset", std::iter::empty());
        self.finish_bake(LevelEvent::Reset { stats }, stats)?;
        Ok(stats)
    }

    /// Connectivity changed: shapes are rebuilt, consumed dots stay consumed.
    pub fn topology_changed<T>(&mut self, tiles: &T) -> Result<BakeStats>
    where
        T: TileSource + ?Sized,
    {
        let stats = self.loaded_mut()?.rebake(tiles);
        self.log_runtime_event(LogLevel::Info, "topology_changed", std::iter::empty());
        self.finish_bake(LevelEvent::TopologyChanged { stats }, stats)?;
        Ok(stats)
    }

    /// Drops the loaded level. Returns `false` when nothing was loaded.
    pub fn unload(&mut self) -> bool {
        if self.registry.is_none() {
            return false;
        }

        if let Err(err) = self.dispatch_event(LevelEvent::Unloaded) {
            self.log_runtime_event(
                LogLevel::Warn,
                "plugin_failed",
                [json_str("error", err.to_string())],
            );
        }
        let uptime_ms = self
            .loaded_at
            .take()
            .map(|start| u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        self.registry = None;
        self.log_runtime_event(
            LogLevel::Info,
            "level_unloaded",
            [json_kv("uptime_ms", json!(uptime_ms))],
        );
        true
    }

    /// Registers a marker. It takes part in shapes from the next bake on.
    pub fn add_point(&mut self, tile: TileIndex) -> Result<bool> {
        let registry = self.loaded_mut()?;
        if !registry.geometry().contains(tile) {
            return Err(ShapeError::TileOutOfBounds(tile));
        }
        Ok(registry.add_point(tile))
    }

    /// Consumes the dot on `tile`, filling every shape it completes.
    ///
    /// Completed rectangles reach the fill sink before any plugin runs. A
    /// plugin error is returned only after all events were dispatched.
    pub fn remove_at(&mut self, tile: TileIndex) -> Result<DotRemoval> {
        let removal = self.loaded_mut()?.remove_at(tile);
        if removal.is_noop() {
            return Ok(removal);
        }

        self.with_metrics(ShapeMetrics::record_dot_removed);
        self.log_runtime_event(
            LogLevel::Debug,
            "dot_removed",
            [
                json_kv("tile", json!(tile)),
                json_kv("shapes", json!(removal.touched.len())),
            ],
        );
        let geometry = self.loaded_mut()?.geometry();
        for completion in &removal.completed {
            self.deliver_fill(geometry, completion.shape, &completion.rects);
        }

        // Fills are final: every event is still sent if a plugin fails, and
        // the first error is returned afterwards.
        let mut events = vec![LevelEvent::DotRemoved {
            tile,
            touched: removal.touched.clone(),
        }];
        events.extend(removal.completed.iter().map(|completion| LevelEvent::ShapeFilled {
            shape: completion.shape,
            rects: completion.rects.clone(),
        }));
        if !removal.completed.is_empty() && self.pending_shapes() == 0 {
            events.push(LevelEvent::AllShapesFilled);
        }

        let mut first_error = None;
        for event in events {
            if let Err(err) = self.dispatch_event(event) {
                first_error.get_or_insert(err);
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        Ok(removal)
    }

    pub fn metrics_snapshot(&self) -> Option<MetricSnapshot> {
        let metrics = self.config.metrics.as_ref()?;
        let uptime = self
            .loaded_at
            .map(|start| start.elapsed())
            .unwrap_or_default();
        metrics.lock().ok().map(|guard| guard.snapshot(uptime))
    }

    fn loaded_mut(&mut self) -> Result<&mut ShapeRegistry> {
        self.registry.as_mut().ok_or(ShapeError::NoLevelLoaded)
    }

    fn marker_count(&self) -> usize {
        self.registry
            .as_ref()
            .map(|registry| registry.markers().count())
            .unwrap_or(0)
    }

    fn pending_shapes(&self) -> usize {
        self.registry
            .as_ref()
            .map(ShapeRegistry::pending_shapes)
            .unwrap_or(0)
    }

    fn init_plugins(&mut self) -> Result<()> {
        let Some(registry) = self.registry.as_ref() else {
            return Ok(());
        };
        let ctx = LevelContext::new(registry);
        for plugin in self.plugins.iter_mut() {
            plugin.init(&ctx)?;
            if let Some(logger) = self.config.logger.as_ref() {
                let event = event_with_fields(
                    LogLevel::Debug,
                    &self.config.log_target,
                    "plugin_initialized",
                    [json_str("plugin", plugin.name())],
                );
                let _ = logger.log_event(event);
            }
        }
        Ok(())
    }

    fn finish_bake(&mut self, event: LevelEvent, stats: BakeStats) -> Result<()> {
        self.with_metrics(|metrics| metrics.record_bake(&stats));

        let discovered: Vec<(ShapeId, usize)> = self
            .registry
            .as_ref()
            .map(|registry| {
                registry
                    .shapes()
                    .iter()
                    .map(|shape| (shape.id(), shape.dots().len()))
                    .collect()
            })
            .unwrap_or_default();
        let digest = self
            .registry
            .as_ref()
            .map(|registry| registry.digest().to_hex().to_string())
            .unwrap_or_default();
        self.log_runtime_event(
            LogLevel::Info,
            "bake_completed",
            [
                json_kv("traces", json!(stats.traces)),
                json_kv("shapes", json!(discovered.len())),
                json_kv("duplicates", json!(stats.duplicates)),
                json_kv("non_minimal", json!(stats.non_minimal)),
                json_str("digest", digest),
            ],
        );

        self.dispatch_event(event)?;
        for (shape, dots) in discovered {
            self.dispatch_event(LevelEvent::ShapeDiscovered { shape, dots })?;
        }
        Ok(())
    }

    fn deliver_fill(&mut self, geometry: GridGeometry, shape: ShapeId, rects: &[FillRect]) {
        if let Some(sink) = self.fill_sink.as_mut() {
            for rect in rects {
                sink.fill(shape, rect, geometry);
            }
        }

        self.with_metrics(|metrics| metrics.record_fill(rects.len()));
        let cells: usize = rects.iter().map(|rect| rect.cell_count(geometry)).sum();
        self.log_runtime_event(
            LogLevel::Info,
            "shape_filled",
            [
                json_str("shape", shape.to_string()),
                json_kv("rects", json!(rects.len())),
                json_kv("cells", json!(cells)),
            ],
        );
    }

    fn dispatch_event(&mut self, event: LevelEvent) -> Result<()> {
        let Some(registry) = self.registry.as_ref() else {
            return Ok(());
        };
        let ctx = LevelContext::new(registry);
        let mut consumed = false;
        for plugin in self.plugins.iter_mut() {
            if plugin.on_event(&ctx, &event)? == EventFlow::Consumed {
                consumed = true;
                break;
            }
        }
        self.log_runtime_event(
            LogLevel::Trace,
            "event_dispatched",
            [
                json_kv("event", json!(event.describe())),
                json_kv("consumed", json!(consumed)),
            ],
        );
        Ok(())
    }

    fn with_metrics(&self, record: impl FnOnce(&mut ShapeMetrics)) {
        if let Some(metrics) = self.config.metrics.as_ref() {
            if let Ok(mut guard) = metrics.lock() {
                record(&mut *guard);
            }
        }
    }

    fn log_runtime_event<I>(&self, level: LogLevel, message: &str, fields: I)
    where
        I: IntoIterator<Item = (String, serde_json::Value)>,
    {
        if let Some(logger) = self.config.logger.as_ref() {
            let event = event_with_fields(level, &self.config.log_target, message, fields);
            let _ = logger.log_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::{Level, TileGrid};
    use crate::logging::MemorySink;

    const SHARED_DOT: &str = concat!(
        "*-o\n", //
        "| |\n",
        "o-*-o\n",
        "  | |\n",
        "  o-o\n",
    );

    /// Records every event it sees into a shared buffer.
    struct Recorder {
        seen: Arc<Mutex<Vec<LevelEvent>>>,
        flow: EventFlow,
    }

    impl Recorder {
        fn new(flow: EventFlow) -> (Self, Arc<Mutex<Vec<LevelEvent>>>) {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let recorder = Self {
                seen: Arc::clone(&seen),
                flow,
            };
            (recorder, seen)
        }
    }

    impl ShapePlugin for Recorder {
        fn on_event(&mut self, _ctx: &LevelContext<'_>, event: &LevelEvent) -> Result<EventFlow> {
            self.seen.lock().unwrap().push(event.clone());
            Ok(self.flow)
        }
    }

    fn fills(events: &[LevelEvent]) -> Vec<(ShapeId, Vec<FillRect>)> {
        events
            .iter()
            .filter_map(|event| match event {
                LevelEvent::ShapeFilled { shape, rects } => Some((*shape, rects.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn calls_without_a_level_fail() {
        let grid = TileGrid::fully_connected(2, 2).unwrap();
        let mut runtime = LevelRuntime::new();
        assert!(matches!(runtime.remove_at(0), Err(ShapeError::NoLevelLoaded)));
        assert!(matches!(runtime.add_point(0), Err(ShapeError::NoLevelLoaded)));
        assert!(matches!(runtime.reset(&grid), Err(ShapeError::NoLevelLoaded)));
        assert!(matches!(
            runtime.topology_changed(&grid),
            Err(ShapeError::NoLevelLoaded)
        ));
        assert!(!runtime.unload());
    }

    #[test]
    fn load_rejects_dots_outside_the_grid() {
        let grid = TileGrid::fully_connected(2, 2).unwrap();
        let mut runtime = LevelRuntime::new();
        assert!(matches!(
            runtime.load(&grid, [9]),
            Err(ShapeError::TileOutOfBounds(9))
        ));
        assert!(!runtime.is_loaded());
    }

    #[test]
    fn corner_dot_on_open_grid_fills_one_square() {
        let grid = TileGrid::fully_connected(4, 4).unwrap();
        let sink: Arc<Mutex<Vec<(ShapeId, FillRect)>>> = Arc::new(Mutex::new(Vec::new()));
        let (recorder, seen) = Recorder::new(EventFlow::Continue);

        let mut runtime = LevelRuntime::new();
        runtime.set_fill_sink(Arc::clone(&sink));
        runtime.register_plugin(recorder);
        let stats = runtime.load(&grid, [0]).unwrap();
        assert_eq!(stats.shapes, 1);

        let removal = runtime.remove_at(0).unwrap();
        assert_eq!(removal.completed.len(), 1);

        let shape = removal.completed[0].shape;
        assert_eq!(sink.lock().unwrap().as_slice(), &[(shape, FillRect::new(0, 5))]);

        let events = seen.lock().unwrap();
        assert_eq!(fills(&events), vec![(shape, vec![FillRect::new(0, 5)])]);
        assert_eq!(events.last(), Some(&LevelEvent::AllShapesFilled));
    }

    #[test]
    fn shared_dot_fills_shapes_independently() {
        let level = Level::parse(SHARED_DOT).unwrap();
        let (recorder, seen) = Recorder::new(EventFlow::Continue);
        let mut runtime = LevelRuntime::new();
        runtime.register_plugin(recorder);
        runtime.load(&level.grid, level.dots.iter().copied()).unwrap();

        let removal = runtime.remove_at(4).unwrap();
        assert_eq!(removal.touched.len(), 2);
        assert_eq!(fills(&seen.lock().unwrap()).len(), 1);

        runtime.remove_at(4).unwrap();
        runtime.remove_at(0).unwrap();
        runtime.remove_at(0).unwrap();

        let events = seen.lock().unwrap();
        let filled = fills(&events);
        assert_eq!(filled.len(), 2);
        assert_eq!(filled[0].1, vec![FillRect::new(4, 8)]);
        assert_eq!(filled[1].1, vec![FillRect::new(0, 4)]);
        let discovered = events
            .iter()
            .filter(|event| matches!(event, LevelEvent::ShapeDiscovered { .. }))
            .count();
        assert_eq!(discovered, 2);
    }

    /// Fails on every `DotRemoved` event.
    struct FailOnRemoval;

    impl ShapePlugin for FailOnRemoval {
        fn on_event(&mut self, _ctx: &LevelContext<'_>, event: &LevelEvent) -> Result<EventFlow> {
            if matches!(event, LevelEvent::DotRemoved { .. }) {
                return Err(ShapeError::Io(std::io::Error::other("removal hook failed")));
            }
            Ok(EventFlow::Continue)
        }
    }

    #[test]
    fn failing_plugin_does_not_lose_the_fill() {
        let level = Level::parse("*-o\n| |\no-o\n").unwrap();
        let sink: Arc<Mutex<Vec<(ShapeId, FillRect)>>> = Arc::new(Mutex::new(Vec::new()));
        let (recorder, seen) = Recorder::new(EventFlow::Continue);

        let mut runtime = LevelRuntime::new();
        runtime.set_fill_sink(Arc::clone(&sink));
        runtime.register_plugin(FailOnRemoval);
        runtime.register_plugin(recorder);
        runtime.load(&level.grid, level.dots.iter().copied()).unwrap();

        assert!(matches!(runtime.remove_at(0), Err(ShapeError::Io(_))));

        let shape = runtime.registry().unwrap().shapes()[0].id();
        assert_eq!(sink.lock().unwrap().as_slice(), &[(shape, FillRect::new(0, 3))]);
        let events = seen.lock().unwrap();
        assert_eq!(fills(&events), vec![(shape, vec![FillRect::new(0, 3)])]);
        assert_eq!(events.last(), Some(&LevelEvent::AllShapesFilled));
        drop(events);

        assert!(runtime.remove_at(0).unwrap().is_noop());
        assert_eq!(sink.lock().unwrap().len(), 1);
    }

    #[test]
    fn consumed_event_stops_later_plugins() {
        let grid = TileGrid::fully_connected(3, 3).unwrap();
        let (first, first_seen) = Recorder::new(EventFlow::Consumed);
        let (second, second_seen) = Recorder::new(EventFlow::Continue);

        let mut runtime = LevelRuntime::new();
        runtime.register_plugin(first);
        runtime.register_plugin(second);
        runtime.load(&grid, [0]).unwrap();

        assert!(!first_seen.lock().unwrap().is_empty());
        assert!(second_seen.lock().unwrap().is_empty());
    }

    #[test]
    fn reset_restores_dots_and_topology_keeps_them_consumed() {
        let level = Level::parse("*-*\n| |\no-o\n").unwrap();
        let mut runtime = LevelRuntime::new();
        runtime.load(&level.grid, level.dots.iter().copied()).unwrap();

        runtime.remove_at(0).unwrap();
        let stats = runtime.topology_changed(&level.grid).unwrap();
        assert_eq!(stats.shapes, 1);
        let registry = runtime.registry().unwrap();
        assert!(!registry.is_live_marker(0));
        assert_eq!(registry.shapes()[0].dots(), &[1]);

        runtime.reset(&level.grid).unwrap();
        let registry = runtime.registry().unwrap();
        assert!(registry.is_live_marker(0));
        assert_eq!(registry.shapes()[0].dots(), &[0, 1]);
    }

    #[test]
    fn lifecycle_is_logged_and_counted() {
        let level = Level::parse("*-o\n| |\no-o\n").unwrap();
        let sink = MemorySink::new();
        let mut runtime = LevelRuntime::new();
        runtime.config_mut().logger = Some(Logger::new(sink.clone()).with_min_level(LogLevel::Debug));
        runtime.config_mut().enable_metrics();

        runtime.load(&level.grid, level.dots.iter().copied()).unwrap();
        runtime.remove_at(0).unwrap();
        assert!(runtime.unload());

        assert_eq!(
            sink.messages(),
            vec![
                "level_loaded",
                "bake_completed",
                "dot_removed",
                "shape_filled",
                "level_unloaded",
            ]
        );
        let bake = &sink.events()[1];
        assert_eq!(bake.target, "dotloop::runtime");
        assert_eq!(bake.field("shapes"), Some(&json!(1)));
        assert_eq!(bake.field("digest").and_then(|v| v.as_str()).map(str::len), Some(64));

        let snapshot = runtime.metrics_snapshot().unwrap();
        assert_eq!(snapshot.bakes, 1);
        assert_eq!(snapshot.fills, 1);
        assert_eq!(snapshot.dots_removed, 1);
        assert!(!runtime.is_loaded());
    }
}
