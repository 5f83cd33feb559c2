/*!
 * Page processing pipeline.
 *
 * Pages flow through detection, text extraction and normalization on a
 * bounded worker pool, meet at a single batch translation call per run, and
 * then fan out again for layout and compositing. The external models sit
 * behind three traits:
 *
 * - `BubbleLocator`: finds speech bubbles on a page
 * - `TextExtractor`: reads the text inside one bubble
 * - `ImageCompositor`: paints the laid-out translations back onto the page
 *
 * The `dump` submodule provides JSON-backed implementations that replay
 * pre-extracted OCR output, which is what the command line tool runs on.
 */

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::PipelineError;
use crate::layout::RenderPlan;
use crate::translation::{Strategy, TranslationResult};

pub use self::runner::{MangaPipeline, PipelineOptions};

pub mod dump;
pub mod runner;

/// Axis-aligned rectangle in image pixel space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Rect {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Clip the rectangle to an image of the given size
    pub fn clamp_to(&self, width: f32, height: f32) -> Rect {
        Rect {
            x1: self.x1.clamp(0.0, width),
            y1: self.y1.clamp(0.0, height),
            x2: self.x2.clamp(0.0, width),
            y2: self.y2.clamp(0.0, height),
        }
    }

    /// Whether the rectangle covers no pixels
    pub fn is_degenerate(&self) -> bool {
        self.width() < 1.0 || self.height() < 1.0
    }

    /// Intersection over union with another rectangle
    pub fn iou(&self, other: &Rect) -> f32 {
        let inter = Rect::new(
            self.x1.max(other.x1),
            self.y1.max(other.y1),
            self.x2.min(other.x2),
            self.y2.min(other.y2),
        )
        .area();
        let union = self.area() + other.area() - inter;
        if union <= 0.0 { 0.0 } else { inter / union }
    }
}

/// One detector hit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub rect: Rect,
    pub score: f32,
    pub class_id: u32,
}

/// A page handed to the pipeline.
///
/// Pixel data is opaque here; only the collaborators know how to decode it.
#[derive(Clone)]
pub struct PageImage {
    pub id: String,
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
}

impl PageImage {
    pub fn new(id: impl Into<String>, width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            data: data.into(),
        }
    }
}

impl fmt::Debug for PageImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageImage")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// A detected bubble with its text, immutable once extraction is done
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BubbleRegion {
    pub image_id: String,
    pub rect: Rect,
    pub raw_text: String,
    pub normalized_text: String,
    /// Position in top-to-bottom reading order
    pub bubble_index: usize,
}

/// Final state of one page
#[derive(Debug, Clone)]
pub enum PageStatus {
    /// Translations were painted
    Completed,
    /// Nothing to translate on the page
    NoText,
    /// A stage failed for this page only
    Failed(PipelineError),
}

impl PageStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, PageStatus::Failed(_))
    }
}

/// Everything the pipeline produced for one page
#[derive(Debug, Clone)]
pub struct PageOutcome {
    pub image_id: String,
    pub regions: Vec<BubbleRegion>,
    /// One result per region, same order
    pub translations: Vec<TranslationResult>,
    /// Plans handed to the compositor (empty plans are left out)
    pub plans: Vec<RenderPlan>,
    pub status: PageStatus,
    pub elapsed: Duration,
}

impl PageOutcome {
    pub(crate) fn failed(image_id: &str, error: PipelineError, elapsed: Duration) -> Self {
        Self {
            image_id: image_id.to_string(),
            regions: Vec::new(),
            translations: Vec::new(),
            plans: Vec::new(),
            status: PageStatus::Failed(error),
            elapsed,
        }
    }
}

/// Summary of one run (a group of pages sharing one batch call)
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    /// Pages in input order
    pub pages: Vec<PageOutcome>,
    pub fragment_count: usize,
    /// Strategy that finished the run's batch, if any call was needed
    pub strategy: Option<Strategy>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn failed_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.status.is_failed()).count()
    }

    pub fn completed_pages(&self) -> usize {
        self.pages
            .iter()
            .filter(|p| matches!(p.status, PageStatus::Completed))
            .count()
    }
}

/// Finds speech bubbles on a page
#[async_trait]
pub trait BubbleLocator: Send + Sync {
    /// Detections in pixel space, in no particular order
    async fn detect(&self, image: &PageImage) -> Result<Vec<Detection>, PipelineError>;
}

/// Reads the text inside a bubble
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Text inside `region`; an empty string when there is none
    async fn extract(&self, image: &PageImage, region: &Rect, language_hint: &str) -> Result<String, PipelineError>;
}

/// Paints laid-out translations onto a page
#[async_trait]
pub trait ImageCompositor: Send + Sync {
    async fn composite(&self, image: &PageImage, plans: &[RenderPlan]) -> Result<(), PipelineError>;
}
