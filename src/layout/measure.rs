/*!
 * Glyph measurement.
 *
 * The fit search only needs advance widths. The default measurer uses a
 * per-script heuristic so layout works without font files; a compositor
 * with real font metrics can plug in its own `GlyphMeasure`.
 */

use crate::text_normalizer::is_cjk_char;

/// Advance width source for the fit search
pub trait GlyphMeasure: Send + Sync {
    /// Horizontal advance of one character at `font_size`
    fn advance(&self, c: char, font_size: f32) -> f32;

    /// Width of a rendered line
    fn line_width(&self, line: &str, font_size: f32) -> f32 {
        line.chars().map(|c| self.advance(c, font_size)).sum()
    }

    /// Mean advance of the characters in `text`, as a fraction of the font size
    fn average_em(&self, text: &str) -> f32 {
        let count = text.chars().filter(|c| !c.is_whitespace()).count();
        if count == 0 {
            return self.advance('n', 1.0);
        }
        let total: f32 = text
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| self.advance(c, 1.0))
            .sum();
        total / count as f32
    }
}

/// Full-width glyphs: CJK ideographs, kana, Hangul and full-width forms
pub fn is_wide_char(c: char) -> bool {
    is_cjk_char(c)
        || matches!(c,
            '\u{AC00}'..='\u{D7AF}' |  // Hangul syllables
            '\u{1100}'..='\u{11FF}' |  // Hangul Jamo
            '\u{3000}'..='\u{303F}' |  // CJK punctuation
            '\u{FF01}'..='\u{FF60}'    // Full-width forms
        )
}

/// Heuristic measurer: wide glyphs take one em, everything else a fixed factor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeuristicMeasurer {
    narrow_factor: f32,
    wide_factor: f32,
}

impl HeuristicMeasurer {
    pub fn new(narrow_factor: f32) -> Self {
        Self {
            narrow_factor,
            wide_factor: 1.0,
        }
    }
}

impl Default for HeuristicMeasurer {
    fn default() -> Self {
        Self::new(0.55)
    }
}

impl GlyphMeasure for HeuristicMeasurer {
    fn advance(&self, c: char, font_size: f32) -> f32 {
        if is_wide_char(c) {
            font_size * self.wide_factor
        } else {
            font_size * self.narrow_factor
        }
    }
}
