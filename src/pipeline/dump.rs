/*!
 * Replay of pre-extracted OCR dumps.
 *
 * A dump is a JSON file describing one page: its size and the bubbles a
 * detector and OCR engine found on it. `DumpReplay` serves those bubbles as
 * detections and text, and `JsonPlanCompositor` writes the render plans next
 * to each other as JSON instead of painting pixels.
 */

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;
use crate::layout::RenderPlan;

use super::{BubbleLocator, Detection, ImageCompositor, PageImage, Rect, TextExtractor};

/// Minimum overlap for a region to be matched to a dumped bubble
const MATCH_THRESHOLD: f32 = 0.5;

/// One page of OCR output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrDump {
    #[serde(default)]
    pub image_id: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub bubbles: Vec<DumpBubble>,
}

/// A detected bubble and its OCR text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpBubble {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    #[serde(default = "default_score")]
    pub score: f32,
    #[serde(default)]
    pub class_id: u32,
    #[serde(default)]
    pub text: String,
}

fn default_score() -> f32 {
    1.0
}

impl DumpBubble {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x1, self.y1, self.x2, self.y2)
    }
}

impl OcrDump {
    fn parse(page: &PageImage) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(&page.data)
    }
}

/// Load a dump file as a page. The file stem is the id when the dump has none.
pub fn load_page(path: &Path) -> Result<PageImage> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let dump: OcrDump =
        serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse OCR dump {}", path.display()))?;

    let id = if dump.image_id.trim().is_empty() {
        path.file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    } else {
        dump.image_id.clone()
    };

    Ok(PageImage::new(id, dump.width, dump.height, bytes))
}

/// Serves detections and text from the dump carried by each page
#[derive(Debug, Clone, Copy, Default)]
pub struct DumpReplay;

#[async_trait]
impl BubbleLocator for DumpReplay {
    async fn detect(&self, image: &PageImage) -> Result<Vec<Detection>, PipelineError> {
        let dump = OcrDump::parse(image).map_err(|e| PipelineError::Detection(e.to_string()))?;
        Ok(dump
            .bubbles
            .iter()
            .map(|bubble| Detection {
                rect: bubble.rect(),
                score: bubble.score,
                class_id: bubble.class_id,
            })
            .collect())
    }
}

#[async_trait]
impl TextExtractor for DumpReplay {
    async fn extract(&self, image: &PageImage, region: &Rect, _language_hint: &str) -> Result<String, PipelineError> {
        let dump = OcrDump::parse(image).map_err(|e| PipelineError::Extraction(e.to_string()))?;
        let best = dump
            .bubbles
            .iter()
            .map(|bubble| (bubble.rect().iou(region), bubble))
            .filter(|(overlap, _)| *overlap >= MATCH_THRESHOLD)
            .max_by(|a, b| a.0.total_cmp(&b.0));

        Ok(best.map(|(_, bubble)| bubble.text.clone()).unwrap_or_default())
    }
}

/// What `JsonPlanCompositor` writes for a page
#[derive(Debug, Serialize)]
struct RenderedPage<'a> {
    image_id: &'a str,
    width: u32,
    height: u32,
    plans: &'a [RenderPlan],
}

/// Writes render plans to `<output_dir>/<image_id>.render.json`
#[derive(Debug, Clone)]
pub struct JsonPlanCompositor {
    output_dir: PathBuf,
}

impl JsonPlanCompositor {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Output path for a page id
    pub fn output_path(&self, image_id: &str) -> PathBuf {
        let safe: String = image_id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
            .collect();
        self.output_dir.join(format!("{}.render.json", safe))
    }
}

#[async_trait]
impl ImageCompositor for JsonPlanCompositor {
    async fn composite(&self, image: &PageImage, plans: &[RenderPlan]) -> Result<(), PipelineError> {
        let page = RenderedPage {
            image_id: &image.id,
            width: image.width,
            height: image.height,
            plans,
        };
        let json = serde_json::to_string_pretty(&page).map_err(|e| PipelineError::Compositing(e.to_string()))?;

        let path = self.output_path(&image.id);
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| PipelineError::Compositing(e.to_string()))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| PipelineError::Compositing(format!("{}: {}", path.display(), e)))?;

        debug!("Wrote {} plans to {}", plans.len(), path.display());
        Ok(())
    }
}
