use std::path::PathBuf;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use sdui_core::{Error, ImageRecord, RequestId};

/// Row shape of the `images` table.
///
/// Kept to plain strings and integers so the stored form does not depend on
/// how the database maps uuid or datetime types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredImage {
    pub request_id: String,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub seed: String,
    pub steps: i64,
    pub guidance_scale: f64,
    pub artifact_path: String,
    pub timestamp_micros: i64,
    /// Append order, breaks ties between equal timestamps.
    pub sequence: i64,
    pub is_finished: bool,
}

impl StoredImage {
    pub fn from_record(record: &ImageRecord, sequence: i64) -> Self {
        Self {
            request_id: record.id.to_string(),
            prompt: record.prompt.clone(),
            negative_prompt: record.negative_prompt.clone(),
            seed: record.seed.clone(),
            steps: i64::from(record.steps),
            guidance_scale: f64::from(record.guidance_scale),
            artifact_path: record.artifact_path.to_string_lossy().into_owned(),
            timestamp_micros: record.timestamp.timestamp_micros(),
            sequence,
            is_finished: record.is_finished,
        }
    }

    pub fn into_record(self) -> Result<ImageRecord, Error> {
        let id: RequestId = self
            .request_id
            .parse()
            .map_err(|e| Error::persistence(&format!("stored id '{}'", self.request_id), e))?;

        let timestamp = DateTime::from_timestamp_micros(self.timestamp_micros)
            .ok_or_else(|| Error::Persistence(format!("stored timestamp {} out of range", self.timestamp_micros)))?;

        let steps = u32::try_from(self.steps)
            .map_err(|e| Error::persistence(&format!("stored step count {}", self.steps), e))?;

        Ok(ImageRecord {
            id,
            prompt: self.prompt,
            negative_prompt: self.negative_prompt,
            seed: self.seed,
            steps,
            guidance_scale: self.guidance_scale as f32,
            artifact_path: PathBuf::from(self.artifact_path),
            timestamp,
            is_finished: self.is_finished,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_row_keeps_record_fields() {
        let record = ImageRecord {
            id: RequestId::new(),
            prompt: "a red cube".into(),
            negative_prompt: Some("blur".into()),
            seed: "42".into(),
            steps: 10,
            guidance_scale: 7.5,
            artifact_path: PathBuf::from("/pictures/x.jpeg"),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            is_finished: true,
        };

        let row = StoredImage::from_record(&record, 3);
        assert_eq!(row.sequence, 3);
        assert_eq!(row.into_record().unwrap(), record);
    }

    #[test]
    fn test_corrupt_id_is_a_persistence_error() {
        let row = StoredImage {
            request_id: "not-a-uuid".into(),
            prompt: "x".into(),
            negative_prompt: None,
            seed: "1".into(),
            steps: 1,
            guidance_scale: 1.0,
            artifact_path: "x.jpeg".into(),
            timestamp_micros: 0,
            sequence: 0,
            is_finished: true,
        };
        assert!(matches!(row.into_record(), Err(Error::Persistence(_))));
    }
}
