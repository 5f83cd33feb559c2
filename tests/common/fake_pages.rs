/*!
 * In-memory pipeline collaborators
 *
 * `FakePages` serves scripted bubbles per page id and can be told to fail
 * detection for chosen pages. `RecordingCompositor` keeps every plan it is
 * asked to paint instead of touching pixels.
 */

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use mangatl::errors::PipelineError;
use mangatl::layout::RenderPlan;
use mangatl::pipeline::{BubbleLocator, Detection, ImageCompositor, PageImage, Rect, TextExtractor};

/// Scripted bubbles keyed by page id
#[derive(Debug, Default)]
pub struct FakePages {
    bubbles: HashMap<String, Vec<(Rect, String)>>,
    failing: HashSet<String>,
}

impl FakePages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a page whose bubbles hold `texts`, listed bottom to top
    pub fn with_page(mut self, image_id: &str, texts: &[&str]) -> Self {
        let count = texts.len();
        let bubbles = texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let top = 20.0 + (count - 1 - i) as f32 * 120.0;
                (Rect::new(20.0, top, 220.0, top + 100.0), text.to_string())
            })
            .collect();
        self.bubbles.insert(image_id.to_string(), bubbles);
        self
    }

    /// Make detection fail for a page
    pub fn failing_on(mut self, image_id: &str) -> Self {
        self.failing.insert(image_id.to_string());
        self
    }

    /// Page images for every scripted page id, in the given order
    pub fn images(ids: &[&str]) -> Vec<PageImage> {
        ids.iter()
            .map(|id| PageImage::new(*id, 800, 1200, Vec::<u8>::new()))
            .collect()
    }
}

#[async_trait]
impl BubbleLocator for FakePages {
    async fn detect(&self, image: &PageImage) -> Result<Vec<Detection>, PipelineError> {
        if self.failing.contains(&image.id) {
            return Err(PipelineError::Detection(format!("detector crashed on {}", image.id)));
        }
        Ok(self
            .bubbles
            .get(&image.id)
            .map(|bubbles| {
                bubbles
                    .iter()
                    .map(|(rect, _)| Detection {
                        rect: *rect,
                        score: 0.9,
                        class_id: 0,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl TextExtractor for FakePages {
    async fn extract(&self, image: &PageImage, region: &Rect, _language_hint: &str) -> Result<String, PipelineError> {
        Ok(self
            .bubbles
            .get(&image.id)
            .and_then(|bubbles| bubbles.iter().find(|(rect, _)| rect == region))
            .map(|(_, text)| text.clone())
            .unwrap_or_default())
    }
}

/// Compositor that records what it was asked to paint
#[derive(Debug, Clone, Default)]
pub struct RecordingCompositor {
    painted: Arc<Mutex<Vec<(String, Vec<RenderPlan>)>>>,
}

impl RecordingCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Page ids painted so far, sorted
    pub fn painted_pages(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.painted.lock().unwrap().iter().map(|(id, _)| id.clone()).collect();
        ids.sort();
        ids
    }

    /// Plans painted for a page
    pub fn plans_for(&self, image_id: &str) -> Vec<RenderPlan> {
        self.painted
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == image_id)
            .flat_map(|(_, plans)| plans.clone())
            .collect()
    }
}

#[async_trait]
impl ImageCompositor for RecordingCompositor {
    async fn composite(&self, image: &PageImage, plans: &[RenderPlan]) -> Result<(), PipelineError> {
        self.painted.lock().unwrap().push((image.id.clone(), plans.to_vec()));
        Ok(())
    }
}
