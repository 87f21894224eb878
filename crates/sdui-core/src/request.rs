use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::params::SamplingParams;

/// Join key between a request and the record it eventually produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenerationStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl GenerationStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_advance_to(&self, next: GenerationStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Running | Self::Failed | Self::Cancelled) => true,
            (Self::Running, Self::Succeeded | Self::Failed | Self::Cancelled) => true,
            _ => false,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// A submitted generation. Lives in memory until it reaches a terminal status.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    id: RequestId,
    params: SamplingParams,
    seed: u32,
    status: GenerationStatus,
    created_at: DateTime<Utc>,
}

impl GenerationRequest {
    /// `params` are expected to be validated already.
    pub fn new(params: SamplingParams, seed: u32) -> Self {
        Self {
            id: RequestId::new(),
            params,
            seed,
            status: GenerationStatus::Pending,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn prompt(&self) -> &str {
        &self.params.prompt
    }

    pub fn negative_prompt(&self) -> Option<&str> {
        self.params.negative_prompt.as_deref()
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn steps(&self) -> u32 {
        self.params.steps
    }

    pub fn guidance_scale(&self) -> f32 {
        self.params.guidance_scale
    }

    pub fn image_count(&self) -> u32 {
        self.params.image_count
    }

    pub fn params(&self) -> &SamplingParams {
        &self.params
    }

    pub fn status(&self) -> GenerationStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Moves to `next` if the lifecycle allows it. Returns whether it moved.
    pub fn advance(&mut self, next: GenerationStatus) -> bool {
        if self.status.can_advance_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }
}
