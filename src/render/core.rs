use std::collections::HashSet;
use std::io::Write;
use std::sync::{Arc, Mutex};

use crossterm::queue;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

use crate::connectivity::TileSource;
use crate::error::Result;
use crate::fill::FillRect;
use crate::geometry::{Direction, GridGeometry, TileIndex};
use crate::registry::ShapeId;

/// Receives rectangles of completed shapes, in emission order.
pub trait FillSink {
    fn fill(&mut self, shape: ShapeId, rect: &FillRect, geometry: GridGeometry);
}

impl FillSink for Vec<(ShapeId, FillRect)> {
    fn fill(&mut self, shape: ShapeId, rect: &FillRect, _geometry: GridGeometry) {
        self.push((shape, *rect));
    }
}

/// Lets a host keep a handle on its renderer while the runtime feeds it.
impl<S: FillSink> FillSink for Arc<Mutex<S>> {
    fn fill(&mut self, shape: ShapeId, rect: &FillRect, geometry: GridGeometry) {
        if let Ok(mut sink) = self.lock() {
            sink.fill(shape, rect, geometry);
        }
    }
}

/// Renderer runtime parameters.
#[derive(Debug, Clone)]
pub struct RendererSettings {
    pub colored: bool,
    pub fill_glyph: char,
    pub show_dots: bool,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            colored: false,
            fill_glyph: '#',
            show_dots: true,
        }
    }
}

/// Text renderer drawing the level in its own map format, with filled cells
/// painted in `fill_glyph`.
#[derive(Debug)]
pub struct AnsiRenderer {
    settings: RendererSettings,
    filled: HashSet<TileIndex>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Glyph {
    Plain(char),
    Fill(char),
}

impl AnsiRenderer {
    pub fn new(settings: RendererSettings) -> Self {
        Self {
            settings,
            filled: HashSet::new(),
        }
    }

    pub fn with_default() -> Self {
        Self::new(RendererSettings::default())
    }

    pub fn settings_mut(&mut self) -> &mut RendererSettings {
        &mut self.settings
    }

    /// Whether the cell whose top-left tile is `cell` has been filled.
    pub fn is_filled(&self, cell: TileIndex) -> bool {
        self.filled.contains(&cell)
    }

    pub fn filled_cells(&self) -> usize {
        self.filled.len()
    }

    pub fn clear(&mut self) {
        self.filled.clear();
    }

    pub fn render<T, D>(&self, writer: &mut impl Write, tiles: &T, is_dot: D) -> Result<()>
    where
        T: TileSource + ?Sized,
        D: Fn(TileIndex) -> bool,
    {
        let geometry = tiles.geometry();
        for y in 0..(geometry.rows * 2).saturating_sub(1) {
            let mut line: Vec<Glyph> = (0..(geometry.columns * 2).saturating_sub(1))
                .map(|x| self.glyph_at(tiles, geometry, x, y, &is_dot))
                .collect();
            while line.last() == Some(&Glyph::Plain(' ')) {
                line.pop();
            }

            for glyph in line {
                match glyph {
                    Glyph::Fill(ch) if self.settings.colored => queue!(
                        writer,
                        SetForegroundColor(Color::Yellow),
                        Print(ch),
                        ResetColor
                    )?,
                    Glyph::Plain(ch) | Glyph::Fill(ch) => queue!(writer, Print(ch))?,
                }
            }
            queue!(writer, Print('\n'))?;
        }

        writer.flush()?;
        Ok(())
    }

    pub fn render_to_string<T, D>(&self, tiles: &T, is_dot: D) -> Result<String>
    where
        T: TileSource + ?Sized,
        D: Fn(TileIndex) -> bool,
    {
        let mut output = Vec::new();
        self.render(&mut output, tiles, is_dot)?;
        Ok(String::from_utf8_lossy(&output).into_owned())
    }

    fn glyph_at<T, D>(&self, tiles: &T, geometry: GridGeometry, x: usize, y: usize, is_dot: &D) -> Glyph
    where
        T: TileSource + ?Sized,
        D: Fn(TileIndex) -> bool,
    {
        let tile = geometry.index(x / 2, y / 2);
        let flags = tiles.flags(tile);
        let ch = match (x % 2, y % 2) {
            (0, 0) if self.settings.show_dots && is_dot(tile) => '*',
            (0, 0) if !flags.is_empty() => 'o',
            (1, 0) if flags.can_go(Direction::Right) => '-',
            (0, 1) if flags.can_go(Direction::Down) => '|',
            (1, 1) if self.filled.contains(&tile) => return Glyph::Fill(self.settings.fill_glyph),
            _ => ' ',
        };
        Glyph::Plain(ch)
    }
}

impl FillSink for AnsiRenderer {
    fn fill(&mut self, _shape: ShapeId, rect: &FillRect, geometry: GridGeometry) {
        self.filled.extend(rect.cells(geometry));
    }
}
