use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use dotloop::logging::{LogEvent, LogSink};
use dotloop::{
    AnsiRenderer, EventFlow, LevelContext, LevelEvent, LevelRuntime, LifecycleLoggerPlugin,
    LogLevel, Logger, LoggingResult, RendererSettings, Result, ShapePlugin, TileSource,
};

const LEVEL: &str = "
*-o-o-o-*
|   |   |
o-o o-*-o
| |     |
o-*-o-o-o
";

/// Prints log events as compact JSON lines on stderr.
struct StderrSink;

impl LogSink for StderrSink {
    fn log(&self, event: &LogEvent) -> LoggingResult<()> {
        let line = serde_json::to_string(event)?;
        eprintln!("{line}");
        Ok(())
    }
}

/// Announces when the level is cleared.
struct WinCondition;

impl ShapePlugin for WinCondition {
    fn name(&self) -> &str {
        "demo.win_condition"
    }

    fn on_event(&mut self, ctx: &LevelContext<'_>, event: &LevelEvent) -> Result<EventFlow> {
        match event {
            LevelEvent::ShapeFilled { shape, rects } => {
                println!(
                    "{shape} filled with {} rect(s), {} shape(s) left",
                    rects.len(),
                    ctx.pending_shapes()
                );
            }
            LevelEvent::AllShapesFilled => println!("level cleared"),
            _ => {}
        }
        Ok(EventFlow::Continue)
    }
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let level: dotloop::Level = LEVEL.parse()?;
    let renderer = Arc::new(Mutex::new(AnsiRenderer::new(RendererSettings {
        colored: true,
        ..RendererSettings::default()
    })));

    let logger = Logger::new(StderrSink).with_min_level(LogLevel::Info);
    let mut runtime = LevelRuntime::new();
    runtime.config_mut().logger = Some(logger.clone());
    runtime.config_mut().enable_metrics();
    runtime.set_fill_sink(Arc::clone(&renderer));
    runtime.register_plugin(LifecycleLoggerPlugin::new(logger).with_level(LogLevel::Info));
    runtime.register_plugin(WinCondition);

    let stats = runtime.load(&level.grid, level.dots.iter().copied())?;
    println!("baked {} shape(s) from {} trace(s)", stats.shapes, stats.traces);

    let mut stdout = io::stdout();
    for &dot in &level.dots {
        runtime.remove_at(dot)?;
        let geometry = level.grid.geometry();
        let (column, row) = geometry.position(dot);
        writeln!(stdout, "\nafter dot ({column}, {row}):")?;

        let live = |tile| runtime.registry().is_some_and(|r| r.is_live_marker(tile));
        if let Ok(renderer) = renderer.lock() {
            renderer.render(&mut stdout, &level.grid, live)?;
        }
    }

    if let Some(snapshot) = runtime.metrics_snapshot() {
        println!("\n{:?}", snapshot);
    }
    runtime.unload();
    Ok(())
}
