use std::env;
use std::path::PathBuf;
use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use sdui_app::{load_legacy_export, migrate_legacy, Generator, GeneratorConfig, HistoryIndex, Outcome};
use sdui_core::SamplingParams;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = GeneratorConfig::load()?;
    let generator = Generator::open(&config).await?;

    if let Ok(export) = env::var("SDUI_LEGACY_EXPORT") {
        let rows = load_legacy_export(&PathBuf::from(&export))
            .with_context(|| format!("reading legacy export {export}"))?;
        let report = migrate_legacy(rows, generator.artifacts(), generator.store().as_ref(), config.jpeg_quality).await?;
        info!(imported = report.imported, skipped = report.skipped, "Imported legacy history");
    }

    let history = HistoryIndex::spawn(generator.store()).await?;
    info!("{} images in history", history.len());

    if let Ok(prompt) = env::var("SDUI_PROMPT") {
        let params = runner_params(prompt)?;
        let handle = generator.submit(params)?;
        info!(request_id = %handle.id(), seed = handle.seed(), "Submitted");

        let outcome = handle
            .wait_with_progress(|progress| {
                info!("Step {}/{} ({:.0}%)", progress.step, progress.step_count, progress.fraction() * 100.0);
            })
            .await;

        match outcome {
            Outcome::Succeeded(record) => {
                let id = record.id;
                history.wait_for(|list| list.iter().any(|r| r.id == id)).await;
                info!("Saved {}", record.artifact_path.display());
            }
            Outcome::Failed(err) => warn!("Generation failed: {err}"),
            Outcome::Cancelled => warn!("Generation cancelled"),
        }
    }

    for record in history.records().iter() {
        info!(
            "{} seed={} steps={} guidance={} {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.seed,
            record.steps,
            record.guidance_scale,
            record.prompt
        );
    }

    Ok(())
}

fn runner_params(prompt: String) -> anyhow::Result<SamplingParams> {
    let mut params = SamplingParams::new(prompt);

    if let Ok(seed) = env::var("SDUI_SEED") {
        params = params.with_seed(seed);
    }
    if let Ok(steps) = env::var("SDUI_STEPS") {
        params = params.with_steps(steps.trim().parse().context("SDUI_STEPS")?);
    }
    if let Ok(guidance) = env::var("SDUI_GUIDANCE") {
        params = params.with_guidance_scale(guidance.trim().parse().context("SDUI_GUIDANCE")?);
    }

    Ok(params)
}
