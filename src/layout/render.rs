/*!
 * Render plans handed to the compositor.
 *
 * A plan positions every wrapped line inside the bubble rectangle (block
 * centered vertically, each line centered horizontally) and picks an outline
 * that contrasts with the fill so the text stays legible over screentone.
 */

use serde::{Deserialize, Serialize};

use crate::pipeline::Rect;
use super::{GlyphMeasure, LayoutFit};

/// An RGB colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);
    pub const WHITE: Rgb = Rgb(255, 255, 255);

    /// Outline colour for this fill: white behind dark text, black behind light text
    pub fn contrasting(self) -> Rgb {
        let brightness = self.0 as u32 + self.1 as u32 + self.2 as u32;
        if brightness < 382 { Rgb::WHITE } else { Rgb::BLACK }
    }
}

impl Default for Rgb {
    fn default() -> Self {
        Rgb::BLACK
    }
}

/// A wrapped line at its final position (top-left of the line box)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedLine {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
}

/// Everything a compositor needs to paint one bubble
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderPlan {
    pub region: Rect,
    pub font_size: f32,
    pub line_height: f32,
    pub lines: Vec<PlacedLine>,
    pub fill: Rgb,
    pub outline: Rgb,
    pub outline_thickness: f32,
    pub overflow: bool,
}

impl RenderPlan {
    /// Position a fit inside `region`
    pub fn place(fit: &LayoutFit, region: Rect, fill: Rgb, measurer: &dyn GlyphMeasure) -> Self {
        let top = region.y1 + (region.height() - fit.total_height) / 2.0;

        let lines = fit
            .wrapped_lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                let width = measurer.line_width(line, fit.font_size);
                PlacedLine {
                    text: line.clone(),
                    x: region.x1 + (region.width() - width) / 2.0,
                    y: top + i as f32 * fit.line_height,
                    width,
                }
            })
            .collect();

        Self {
            region,
            font_size: fit.font_size,
            line_height: fit.line_height,
            lines,
            fill,
            outline: fill.contrasting(),
            outline_thickness: outline_thickness(fit.font_size),
            overflow: fit.overflow,
        }
    }

    /// Plans without lines leave the region untouched
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Outline width in pixels for a font size
pub fn outline_thickness(font_size: f32) -> f32 {
    (font_size / 12.0).clamp(1.0, 4.0)
}
