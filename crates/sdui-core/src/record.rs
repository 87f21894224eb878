use std::path::PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::params::SamplingParams;
use crate::request::{GenerationRequest, RequestId};

/// Durable history entry for one successful generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: RequestId,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    /// Resolved seed in text form, so random submissions stay reproducible.
    pub seed: String,
    pub steps: u32,
    pub guidance_scale: f32,
    pub artifact_path: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub is_finished: bool,
}

impl ImageRecord {
    pub fn from_request(request: &GenerationRequest, artifact_path: PathBuf, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: request.id(),
            prompt: request.prompt().to_string(),
            negative_prompt: request.negative_prompt().map(str::to_string),
            seed: request.seed().to_string(),
            steps: request.steps(),
            guidance_scale: request.guidance_scale(),
            artifact_path,
            timestamp,
            is_finished: true,
        }
    }

    pub fn seed_value(&self) -> Option<u32> {
        self.seed.parse().ok()
    }

    /// Parameters that reproduce this record when submitted again.
    pub fn to_params(&self) -> SamplingParams {
        SamplingParams {
            prompt: self.prompt.clone(),
            negative_prompt: self.negative_prompt.clone(),
            seed_input: self.seed.clone(),
            steps: self.steps,
            guidance_scale: self.guidance_scale,
            image_count: 1,
        }
    }
}
