/*!
 * Bubble text layout.
 *
 * Fits a translated string into a fixed bubble rectangle by searching font
 * sizes downward from a size derived from the bubble's area and shape. Each
 * candidate size is word-wrapped and measured; the first candidate within the
 * fill ratios wins. When nothing fits, the minimum size is used and the fit
 * is flagged as overflowing. The search is bounded and never fails.
 */

use std::sync::Arc;

use log::debug;
use serde::Serialize;

use crate::app_config::LayoutConfig;

pub use self::measure::{GlyphMeasure, HeuristicMeasurer, is_wide_char};
pub use self::render::{PlacedLine, RenderPlan, Rgb};

pub mod measure;
pub mod render;

/// Result of the fit search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutFit {
    pub font_size: f32,
    pub line_height: f32,
    pub wrapped_lines: Vec<String>,
    /// Width of the longest rendered line
    pub max_line_width: f32,
    /// `wrapped_lines.len() × line_height`
    pub total_height: f32,
    /// Set when even the minimum size exceeds the fill ratios
    pub overflow: bool,
}

impl LayoutFit {
    /// Fit that renders nothing
    pub fn empty(font_size: f32, line_height: f32) -> Self {
        Self {
            font_size,
            line_height,
            wrapped_lines: Vec::new(),
            max_line_width: 0.0,
            total_height: 0.0,
            overflow: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.wrapped_lines.is_empty()
    }
}

/// Fit search over font sizes
#[derive(Clone)]
pub struct BubbleLayoutEngine {
    config: LayoutConfig,
    measurer: Arc<dyn GlyphMeasure>,
}

impl std::fmt::Debug for BubbleLayoutEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BubbleLayoutEngine")
            .field("config", &self.config)
            .finish()
    }
}

impl Default for BubbleLayoutEngine {
    fn default() -> Self {
        Self::new(LayoutConfig::default())
    }
}

impl BubbleLayoutEngine {
    /// Create an engine using the heuristic measurer
    pub fn new(config: LayoutConfig) -> Self {
        let measurer = Arc::new(HeuristicMeasurer::new(config.glyph_width_factor));
        Self { config, measurer }
    }

    /// Replace the glyph measurer
    pub fn with_measurer(mut self, measurer: Arc<dyn GlyphMeasure>) -> Self {
        self.measurer = measurer;
        self
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn measurer(&self) -> &dyn GlyphMeasure {
        self.measurer.as_ref()
    }

    /// Fit text into a region and position it for painting
    pub fn plan(&self, text: &str, region: crate::pipeline::Rect, fill: Rgb) -> RenderPlan {
        let fit = self.fit(text, region.width(), region.height());
        RenderPlan::place(&fit, region, fill, self.measurer())
    }

    /// Starting size for a region: bigger and squarer regions start larger
    pub fn starting_font_size(&self, region_width: f32, region_height: f32) -> f32 {
        let width = region_width.max(1.0);
        let height = region_height.max(1.0);
        let aspect = width / height;

        let mut size = (width * height).sqrt() / 6.0;
        if aspect > 2.5 {
            size *= 0.8;
        } else if aspect < 0.5 {
            size *= 1.1;
        }

        size.clamp(self.config.min_font_size, self.config.max_font_size)
    }

    /// Fit text into a region starting from the derived size
    pub fn fit(&self, text: &str, region_width: f32, region_height: f32) -> LayoutFit {
        let start = self.starting_font_size(region_width, region_height);
        self.fit_from(text, region_width, region_height, start)
    }

    /// Fit text into a region starting from `start_size`.
    ///
    /// Sizes shrink by `font_step`, or by a wider step when `max_attempts`
    /// could not otherwise reach the minimum, so the last attempt is always
    /// the minimum size.
    pub fn fit_from(&self, text: &str, region_width: f32, region_height: f32, start_size: f32) -> LayoutFit {
        let min_size = self.config.min_font_size;
        if text.trim().is_empty() {
            return LayoutFit::empty(min_size, min_size * self.config.line_height_factor);
        }

        let max_width = region_width.max(0.0) * self.config.width_fill;
        let max_height = region_height.max(0.0) * self.config.height_fill;
        let start = start_size.max(min_size);
        let attempts = self.config.max_attempts.max(1);
        let step = if attempts > 1 {
            self.config.font_step.max(0.1).max((start - min_size) / (attempts - 1) as f32)
        } else {
            self.config.font_step.max(0.1)
        };

        for attempt in 0..attempts {
            let size = (start - step * attempt as f32).max(min_size);
            let candidate = self.measure(text, size, max_width);
            if candidate.max_line_width <= max_width && candidate.total_height <= max_height {
                debug!(
                    "Layout fit at {:.1}px after {} attempts ({} lines)",
                    size,
                    attempt + 1,
                    candidate.wrapped_lines.len()
                );
                return candidate;
            }
            if size <= min_size {
                break;
            }
        }

        let mut fallback = self.measure(text, min_size, max_width);
        fallback.overflow = fallback.max_line_width > max_width || fallback.total_height > max_height;
        if fallback.overflow {
            debug!(
                "Text overflows at minimum size {:.1}px ({:.1}x{:.1} in {:.1}x{:.1})",
                min_size, fallback.max_line_width, fallback.total_height, region_width, region_height
            );
        }
        fallback
    }

    /// Wrap and measure text at one font size
    fn measure(&self, text: &str, font_size: f32, max_width: f32) -> LayoutFit {
        let line_height = font_size * self.config.line_height_factor;
        let glyph_width = font_size * self.measurer.average_em(text);
        let chars_per_line = if glyph_width > 0.0 {
            ((max_width / glyph_width).floor() as usize).max(1)
        } else {
            1
        };

        let wrapped_lines = wrap_text(text, chars_per_line);
        let max_line_width = wrapped_lines
            .iter()
            .map(|line| self.measurer.line_width(line, font_size))
            .fold(0.0_f32, f32::max);
        let total_height = wrapped_lines.len() as f32 * line_height;

        LayoutFit {
            font_size,
            line_height,
            wrapped_lines,
            max_line_width,
            total_height,
            overflow: false,
        }
    }
}

/// Greedy word wrap to at most `chars_per_line` characters per line.
///
/// Line breaks in the input are hard breaks; each logical line is wrapped on
/// its own. A word is split only when it alone exceeds the line.
pub fn wrap_text(text: &str, chars_per_line: usize) -> Vec<String> {
    let limit = chars_per_line.max(1);
    let mut lines = Vec::new();

    for logical in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let mut current = String::new();
        let mut current_len = 0;

        for word in logical.split_whitespace() {
            let word_len = word.chars().count();

            if current_len > 0 && current_len + 1 + word_len <= limit {
                current.push(' ');
                current.push_str(word);
                current_len += 1 + word_len;
                continue;
            }

            if current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }

            if word_len <= limit {
                current.push_str(word);
                current_len = word_len;
                continue;
            }

            let chars: Vec<char> = word.chars().collect();
            let mut chunks = chars.chunks(limit).peekable();
            while let Some(chunk) = chunks.next() {
                let piece: String = chunk.iter().collect();
                if chunks.peek().is_some() {
                    lines.push(piece);
                } else {
                    current_len = chunk.len();
                    current = piece;
                }
            }
        }

        if current_len > 0 {
            lines.push(current);
        }
    }

    lines
}
