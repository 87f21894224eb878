use std::sync::Arc;
use image::DynamicImage;

/// Immutable snapshot of how far a generation has come.
#[derive(Debug, Clone)]
pub struct Progress {
    pub step: u32,
    pub step_count: u32,
    pub preview: Option<Arc<DynamicImage>>,
}

impl Progress {
    pub fn new(step: u32, step_count: u32) -> Self {
        Self {
            step,
            step_count,
            preview: None,
        }
    }

    /// Completion in `0.0..=1.0`.
    pub fn fraction(&self) -> f32 {
        if self.step_count == 0 {
            return 0.0;
        }
        (self.step as f32 / self.step_count as f32).clamp(0.0, 1.0)
    }

    pub fn is_complete(&self) -> bool {
        self.step >= self.step_count
    }
}
