use serde::{Deserialize, Serialize};
use crate::error::ValidationError;

pub const STEPS_MIN: u32 = 1;
pub const STEPS_MAX: u32 = 50;
pub const GUIDANCE_MIN: f32 = 0.0;
pub const GUIDANCE_MAX: f32 = 20.0;
pub const IMAGE_COUNT_MIN: u32 = 1;
pub const IMAGE_COUNT_MAX: u32 = 10;

/// Everything a user provides for one generation, before the seed is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    /// Raw seed text. Anything that is not a `u32` means "pick one at random".
    pub seed_input: String,
    pub steps: u32,
    pub guidance_scale: f32,
    pub image_count: u32,
}

impl SamplingParams {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed_input: impl Into<String>) -> Self {
        self.seed_input = seed_input.into();
        self
    }

    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_guidance_scale(mut self, guidance_scale: f32) -> Self {
        self.guidance_scale = guidance_scale;
        self
    }

    pub fn with_image_count(mut self, image_count: u32) -> Self {
        self.image_count = image_count;
        self
    }

    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        let negative_prompt = negative_prompt.into();
        self.negative_prompt = (!negative_prompt.trim().is_empty()).then_some(negative_prompt);
        self
    }

    /// Out-of-range values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.prompt.trim().is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }

        if !(STEPS_MIN..=STEPS_MAX).contains(&self.steps) {
            return Err(ValidationError::StepsOutOfRange {
                value: self.steps,
                min: STEPS_MIN,
                max: STEPS_MAX,
            });
        }

        // NaN fails the range check as well
        if !(GUIDANCE_MIN..=GUIDANCE_MAX).contains(&self.guidance_scale) {
            return Err(ValidationError::GuidanceOutOfRange {
                value: self.guidance_scale,
                min: GUIDANCE_MIN,
                max: GUIDANCE_MAX,
            });
        }

        if !(IMAGE_COUNT_MIN..=IMAGE_COUNT_MAX).contains(&self.image_count) {
            return Err(ValidationError::ImageCountOutOfRange {
                value: self.image_count,
                min: IMAGE_COUNT_MIN,
                max: IMAGE_COUNT_MAX,
            });
        }

        Ok(())
    }
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: None,
            seed_input: String::new(),
            steps: 18,
            guidance_scale: 7.5,
            image_count: 1,
        }
    }
}
