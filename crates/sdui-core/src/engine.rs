use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("model resources not found at {0}")]
    ResourcesNotFound(PathBuf),
    #[error("engine failed to initialize: {0}")]
    Initialization(String),
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("generation stopped on request")]
    Cancelled,
}

/// Hardware the engine may schedule work on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeUnits {
    CpuOnly,
    CpuAndGpu,
    #[default]
    CpuAndNeuralEngine,
    All,
}

impl ComputeUnits {
    pub fn id(&self) -> &str {
        match self {
            Self::CpuOnly => "cpu_only",
            Self::CpuAndGpu => "cpu_and_gpu",
            Self::CpuAndNeuralEngine => "cpu_and_neural_engine",
            Self::All => "all",
        }
    }
}

impl fmt::Display for ComputeUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ComputeUnits {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu_only" => Ok(Self::CpuOnly),
            "cpu_and_gpu" => Ok(Self::CpuAndGpu),
            "cpu_and_neural_engine" => Ok(Self::CpuAndNeuralEngine),
            "all" => Ok(Self::All),
            other => Err(format!("unknown compute units '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeOptions {
    pub compute_units: ComputeUnits,
    pub disable_safety: bool,
}

impl Default for ComputeOptions {
    fn default() -> Self {
        Self {
            compute_units: ComputeUnits::default(),
            disable_safety: true,
        }
    }
}

/// Receives progress on the engine's own thread.
///
/// Returning `false` asks the engine to stop early. Engines may ignore it.
pub trait ProgressCallback {
    fn on_progress(&mut self, step: u32, step_count: u32, preview: Option<&DynamicImage>) -> bool;
}

impl<F> ProgressCallback for F
where
    F: FnMut(u32, u32, Option<&DynamicImage>) -> bool,
{
    fn on_progress(&mut self, step: u32, step_count: u32, preview: Option<&DynamicImage>) -> bool {
        self(step, step_count, preview)
    }
}

/// Arguments of a single engine call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationInput<'a> {
    pub prompt: &'a str,
    pub negative_prompt: Option<&'a str>,
    pub image_count: u32,
    pub step_count: u32,
    pub seed: u32,
    pub guidance_scale: f32,
}

/// A loaded text-to-image model.
///
/// `generate` blocks for the whole run and reports through `progress` as it goes.
pub trait DiffusionEngine: Send + Sync {
    fn name(&self) -> &str;

    fn generate(
        &self,
        input: &GenerationInput<'_>,
        progress: &mut dyn ProgressCallback,
    ) -> Result<Vec<DynamicImage>, EngineError>;
}
