// crates/sdui-engine/src/pipeline.rs

use std::path::{Path, PathBuf};
use image::{DynamicImage, Rgb, RgbImage};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use tracing::debug;
use sdui_core::{ComputeOptions, DiffusionEngine, EngineError, GenerationInput, ProgressCallback};

const DEFAULT_RESOLUTION: u32 = 512;

/// Procedural stand-in for a diffusion model.
///
/// Starts from seeded noise and blends toward a shaded sphere whose color is
/// picked from the prompt, one blend per step. Same inputs give the same pixels.
/// Real models plug in through [`DiffusionEngine`] the same way.
pub struct PlaceholderPipeline {
    resources: PathBuf,
    options: ComputeOptions,
    resolution: u32,
}

impl PlaceholderPipeline {
    /// Checks that the model resources directory exists, like a real loader would.
    pub fn initialize(resources_path: &Path, options: ComputeOptions) -> Result<Self, EngineError> {
        if !resources_path.is_dir() {
            return Err(EngineError::ResourcesNotFound(resources_path.to_path_buf()));
        }

        debug!(path = %resources_path.display(), "Model resources found");

        Ok(Self {
            resources: resources_path.to_path_buf(),
            options,
            resolution: DEFAULT_RESOLUTION,
        })
    }

    pub fn with_resolution(mut self, resolution: u32) -> Self {
        self.resolution = resolution.max(1);
        self
    }

    pub fn resources(&self) -> &Path {
        &self.resources
    }

    pub fn options(&self) -> ComputeOptions {
        self.options
    }

    fn render(&self, input: &GenerationInput<'_>, index: u32) -> (RgbImage, RgbImage) {
        let size = self.resolution;
        let base_color = extract_color_from_prompt(input.prompt, input.negative_prompt);
        let mut rng = StdRng::seed_from_u64(u64::from(input.seed) + u64::from(index));

        // Higher guidance pushes the subject color harder
        let saturation = (input.guidance_scale / 7.5).clamp(0.0, 2.0);

        let mut noise = RgbImage::new(size, size);
        let mut target = RgbImage::new(size, size);

        let center = size as f32 / 2.0;
        let radius = size as f32 * 0.3;

        for y in 0..size {
            for x in 0..size {
                noise.put_pixel(x, y, Rgb([rng.r#gen(), rng.r#gen(), rng.r#gen()]));

                let dx = x as f32 - center;
                let dy = y as f32 - center;
                let dist = (dx * dx + dy * dy).sqrt();
                let grain: f32 = rng.gen_range(-8.0..8.0);

                let pixel = if dist < radius {
                    let depth = (1.0 - (dist / radius).powi(2)).sqrt();
                    let brightness = depth * 0.7 + 0.3;
                    Rgb(base_color.map(|c| {
                        let gray = 128.0;
                        let c = gray + (c as f32 - gray) * saturation;
                        (c * brightness + grain).clamp(0.0, 255.0) as u8
                    }))
                } else {
                    let bg = 0.2 + (y as f32 / size as f32) * 0.1;
                    Rgb([50.0, 50.0, 60.0].map(|c: f32| (c * bg + grain).clamp(0.0, 255.0) as u8))
                };
                target.put_pixel(x, y, pixel);
            }
        }

        (noise, target)
    }
}

impl DiffusionEngine for PlaceholderPipeline {
    fn name(&self) -> &str {
        "placeholder"
    }

    fn generate(
        &self,
        input: &GenerationInput<'_>,
        progress: &mut dyn ProgressCallback,
    ) -> Result<Vec<DynamicImage>, EngineError> {
        if input.prompt.trim().is_empty() {
            return Err(EngineError::Generation("prompt is empty".into()));
        }
        if input.step_count == 0 {
            return Err(EngineError::Generation("step count must be positive".into()));
        }

        debug!(seed = input.seed, steps = input.step_count, images = input.image_count, "Generating");

        let layers: Vec<(RgbImage, RgbImage)> = (0..input.image_count.max(1))
            .map(|index| self.render(input, index))
            .collect();

        for step in 1..=input.step_count {
            let t = step as f32 / input.step_count as f32;
            let (noise, target) = &layers[0];
            let preview = DynamicImage::ImageRgb8(blend(noise, target, t));

            if !progress.on_progress(step, input.step_count, Some(&preview)) {
                debug!(step, "Stopping early on caller request");
                return Err(EngineError::Cancelled);
            }
        }

        Ok(layers
            .into_iter()
            .map(|(_, target)| DynamicImage::ImageRgb8(target))
            .collect())
    }
}

fn blend(noise: &RgbImage, target: &RgbImage, t: f32) -> RgbImage {
    let mut out = RgbImage::new(target.width(), target.height());
    for ((o, n), s) in out.pixels_mut().zip(noise.pixels()).zip(target.pixels()) {
        for c in 0..3 {
            o[c] = (n[c] as f32 * (1.0 - t) + s[c] as f32 * t).round() as u8;
        }
    }
    out
}

/// Color hint from the prompt. A color named in the negative prompt is skipped.
fn extract_color_from_prompt(prompt: &str, negative_prompt: Option<&str>) -> [u8; 3] {
    let prompt_lower = prompt.to_lowercase();
    let negative_lower = negative_prompt.map(str::to_lowercase).unwrap_or_default();

    let palette = [
        ("red", [255, 100, 100]),
        ("blue", [100, 100, 255]),
        ("green", [100, 255, 100]),
        ("yellow", [255, 255, 100]),
        ("purple", [200, 100, 255]),
    ];

    palette
        .iter()
        .find(|(name, _)| prompt_lower.contains(name) && !negative_lower.contains(name))
        .map(|(_, color)| *color)
        // Neutral gray-blue
        .unwrap_or([150, 150, 180])
}
