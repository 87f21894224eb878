use sdui_core::{Error, GenerationStatus, ImageRecord, Progress};

/// What a request handle observes, in order: zero or more progress
/// snapshots, then exactly one `Finished`.
#[derive(Debug, Clone)]
pub enum GenEvent {
    Progress(Progress),
    Finished(Outcome),
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Succeeded(ImageRecord),
    Failed(Error),
    Cancelled,
}

impl Outcome {
    pub fn status(&self) -> GenerationStatus {
        match self {
            Self::Succeeded(_) => GenerationStatus::Succeeded,
            Self::Failed(_) => GenerationStatus::Failed,
            Self::Cancelled => GenerationStatus::Cancelled,
        }
    }

    pub fn record(&self) -> Option<&ImageRecord> {
        match self {
            Self::Succeeded(record) => Some(record),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}
