use std::path::PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use crate::params::{GUIDANCE_MAX, GUIDANCE_MIN, STEPS_MAX, STEPS_MIN};
use crate::record::ImageRecord;
use crate::request::RequestId;

/// Why a legacy row has no canonical equivalent.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LegacyRowError {
    #[error("seed {0} has no 32-bit equivalent")]
    Seed(i64),
    #[error("step count {0} is out of range")]
    Steps(i64),
    #[error("guidance scale {0} is out of range")]
    Guidance(f32),
}

/// Retired history schema: integer seed and the image bytes stored inline.
///
/// Only read as a migration source, never written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyImage {
    pub id: Uuid,
    pub seed: i64,
    pub prompt: String,
    pub steps: i64,
    pub guidance_scale: f32,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_finished: bool,
    #[serde(default)]
    pub image: Option<Vec<u8>>,
}

impl LegacyImage {
    pub fn has_image(&self) -> bool {
        self.image.as_ref().is_some_and(|bytes| !bytes.is_empty())
    }

    /// The seed as the engine takes it.
    ///
    /// The old column was a signed 16-bit integer, so a negative value is the
    /// same 16 bits read as unsigned. Values outside both ranges are rejected.
    pub fn resolved_seed(&self) -> Result<u32, LegacyRowError> {
        if let Ok(seed) = u32::try_from(self.seed) {
            return Ok(seed);
        }
        i16::try_from(self.seed)
            .map(|seed| u32::from(seed as u16))
            .map_err(|_| LegacyRowError::Seed(self.seed))
    }

    /// Canonical record for this row once its bytes live at `artifact_path`.
    pub fn to_record(&self, artifact_path: PathBuf) -> Result<ImageRecord, LegacyRowError> {
        let seed = self.resolved_seed()?;

        let steps = u32::try_from(self.steps)
            .ok()
            .filter(|steps| (STEPS_MIN..=STEPS_MAX).contains(steps))
            .ok_or(LegacyRowError::Steps(self.steps))?;

        if !(GUIDANCE_MIN..=GUIDANCE_MAX).contains(&self.guidance_scale) {
            return Err(LegacyRowError::Guidance(self.guidance_scale));
        }

        Ok(ImageRecord {
            id: RequestId::from_uuid(self.id),
            prompt: self.prompt.clone(),
            negative_prompt: None,
            seed: seed.to_string(),
            steps,
            guidance_scale: self.guidance_scale,
            artifact_path,
            timestamp: self.timestamp,
            // The artifact exists now, whatever the old flag said
            is_finished: true,
        })
    }
}
