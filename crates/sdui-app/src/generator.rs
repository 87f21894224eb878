use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use anyhow::Context;
use chrono::{SubsecRound, Utc};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use sdui_core::{
    DiffusionEngine, EngineError, Error, GenerationInput, GenerationRequest, GenerationStatus,
    ImageRecord, RequestId, SamplingParams, seed,
};
use sdui_engine::PlaceholderPipeline;
use crate::events::Outcome;
use crate::generator::artifact::{encode_jpeg, ArtifactWriter, DEFAULT_JPEG_QUALITY};
use crate::generator::config::GeneratorConfig;
use crate::generator::db::{ImageDatabase, MetadataStore};
use crate::generator::handle::{RequestHandle, RequestState};
use crate::generator::progress::ProgressBridge;

pub mod artifact;
pub mod config;
pub mod db;
pub mod handle;
pub mod migrate;
pub mod progress;

/// Turns sampling parameters into a stored image and a history record.
///
/// Each submission runs on its own task; the engine call itself is moved to
/// the blocking pool. Clones share the engine, the store and the set of
/// active requests.
#[derive(Clone)]
pub struct Generator {
    shared: Arc<Shared>,
    jpeg_quality: u8,
}

struct Shared {
    engine: Result<Arc<dyn DiffusionEngine>, EngineError>,
    artifacts: ArtifactWriter,
    store: Arc<dyn MetadataStore>,
    runtime: Handle,
    active: Mutex<HashMap<RequestId, Arc<RequestState>>>,
}

impl Shared {
    fn active(&self) -> MutexGuard<'_, HashMap<RequestId, Arc<RequestState>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Generator {
    /// Opens the history database and loads the engine named by `config`.
    ///
    /// A missing model is not fatal: the generator comes up without an engine
    /// and every submission fails fast until it is restarted with one.
    pub async fn open(config: &GeneratorConfig) -> anyhow::Result<Self> {
        let store = ImageDatabase::open(config.db_path.clone())
            .await
            .context("opening image history")?;

        let engine = match PlaceholderPipeline::initialize(&config.model_resources, config.compute) {
            Ok(pipeline) => {
                info!(
                    path = %pipeline.resources().display(),
                    compute_units = %pipeline.options().compute_units,
                    disable_safety = pipeline.options().disable_safety,
                    "Engine loaded"
                );
                Ok(Arc::new(pipeline) as Arc<dyn DiffusionEngine>)
            }
            Err(err) => {
                warn!("Engine unavailable: {err}");
                Err(err)
            }
        };

        let artifacts = ArtifactWriter::new(config.results_dir());
        info!("Writing images to {}", artifacts.dir().display());

        Ok(Self::with_parts(engine, artifacts, Arc::new(store), Handle::current())
            .with_jpeg_quality(config.jpeg_quality))
    }

    pub fn with_parts(
        engine: Result<Arc<dyn DiffusionEngine>, EngineError>,
        artifacts: ArtifactWriter,
        store: Arc<dyn MetadataStore>,
        runtime: Handle,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                engine,
                artifacts,
                store,
                runtime,
                active: Mutex::new(HashMap::new()),
            }),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.shared.store.clone()
    }

    pub fn artifacts(&self) -> &ArtifactWriter {
        &self.shared.artifacts
    }

    /// Why the engine failed to load, if it did.
    pub fn engine_error(&self) -> Option<&EngineError> {
        self.shared.engine.as_ref().err()
    }

    /// Validates `params`, resolves the seed and starts the request.
    ///
    /// Validation and a missing engine are reported here, before anything is
    /// dispatched. Everything after that arrives through the returned handle.
    pub fn submit(&self, params: SamplingParams) -> Result<RequestHandle, Error> {
        params.validate()?;

        let engine = match &self.shared.engine {
            Ok(engine) => engine.clone(),
            Err(err) => return Err(Error::Inference(format!("engine unavailable: {err}"))),
        };

        let seed = seed::resolve_seed(&params.seed_input);
        let mut request = GenerationRequest::new(params, seed);
        request.advance(GenerationStatus::Running);
        let id = request.id();
        let step_count = request.steps();

        info!(
            request_id = %id,
            seed,
            steps = step_count,
            guidance_scale = request.guidance_scale(),
            engine = engine.name(),
            "Generation started"
        );

        let state = Arc::new(RequestState::new(request));
        let (tx, rx) = mpsc::unbounded_channel();
        let bridge = ProgressBridge::new(id, step_count, state.clone(), tx);

        self.shared.active().insert(id, state.clone());
        let handle = RequestHandle::new(state.clone(), rx);

        self.shared
            .runtime
            .spawn(run(self.shared.clone(), engine, state, bridge, self.jpeg_quality));

        Ok(handle)
    }

    /// Form-style entry point: raw seed text and loose numbers.
    pub fn submit_prompt(
        &self,
        prompt: &str,
        seed_input: &str,
        steps: u32,
        guidance_scale: f32,
        image_count: u32,
    ) -> Result<RequestHandle, Error> {
        self.submit(
            SamplingParams::new(prompt)
                .with_seed(seed_input)
                .with_steps(steps)
                .with_guidance_scale(guidance_scale)
                .with_image_count(image_count),
        )
    }

    /// Submits the parameters of a stored record again, seed included.
    pub fn remix(&self, record: &ImageRecord) -> Result<RequestHandle, Error> {
        self.submit(record.to_params())
    }

    /// Requests that are submitted but not yet finished.
    pub fn active_requests(&self) -> Vec<GenerationRequest> {
        self.shared
            .active()
            .values()
            .map(|state| state.request())
            .collect()
    }

    /// Advisory cancel by id. False if the request is unknown, finished, or
    /// already committing its result.
    pub fn cancel(&self, id: RequestId) -> bool {
        let state = self.shared.active().get(&id).cloned();
        state.is_some_and(|state| state.cancel())
    }
}

async fn run(
    shared: Arc<Shared>,
    engine: Arc<dyn DiffusionEngine>,
    state: Arc<RequestState>,
    bridge: ProgressBridge,
    jpeg_quality: u8,
) {
    let request = state.request();
    let id = request.id();

    let outcome = match render(engine, &request, bridge.clone(), jpeg_quality).await {
        Ok(jpeg) => commit(&shared, &state, &request, jpeg).await,
        Err(_) if state.is_cancelled() => Outcome::Cancelled,
        Err(err) => Outcome::Failed(err),
    };

    let status = outcome.status();
    match &outcome {
        Outcome::Succeeded(record) => info!(request_id = %id, status = status.label(), path = %record.artifact_path.display(), "Generation finished"),
        Outcome::Failed(err) => error!(request_id = %id, status = status.label(), "Generation failed: {err}"),
        Outcome::Cancelled => info!(request_id = %id, status = status.label(), "Generation cancelled"),
    }

    state.finish(status);
    shared.active().remove(&id);
    bridge.finish(outcome);
}

/// Runs the engine on the blocking pool and encodes the first image.
async fn render(
    engine: Arc<dyn DiffusionEngine>,
    request: &GenerationRequest,
    mut bridge: ProgressBridge,
    jpeg_quality: u8,
) -> Result<Vec<u8>, Error> {
    let request = request.clone();

    tokio::task::spawn_blocking(move || -> Result<Vec<u8>, Error> {
        let input = GenerationInput {
            prompt: request.prompt(),
            negative_prompt: request.negative_prompt(),
            image_count: request.image_count(),
            step_count: request.steps(),
            seed: request.seed(),
            guidance_scale: request.guidance_scale(),
        };

        let images = engine.generate(&input, &mut bridge)?;
        debug!(request_id = %request.id(), count = images.len(), "Engine returned");

        // Only the first image of a batch is kept
        let first = images
            .into_iter()
            .next()
            .ok_or_else(|| Error::Inference("engine returned no images".to_string()))?;

        encode_jpeg(&first, jpeg_quality)
    })
    .await
    .map_err(|e| Error::Inference(format!("generation task panicked: {e}")))?
}

/// Writes the artifact, then the record. Nothing is written once the request
/// has been cancelled.
async fn commit(shared: &Shared, state: &RequestState, request: &GenerationRequest, jpeg: Vec<u8>) -> Outcome {
    let id = request.id();

    if !state.begin_commit() {
        info!(request_id = %id, "Result discarded after cancel");
        return Outcome::Cancelled;
    }

    let artifacts = shared.artifacts.clone();
    let path = match tokio::task::spawn_blocking(move || artifacts.persist(&jpeg, id)).await {
        Ok(Ok(path)) => path,
        Ok(Err(err)) => return Outcome::Failed(err),
        Err(e) => return Outcome::Failed(Error::persistence("writing artifact", e)),
    };

    // Microseconds are what the store keeps
    let record = ImageRecord::from_request(request, path, Utc::now().trunc_subsecs(6));

    match shared.store.append(&record).await {
        Ok(()) => Outcome::Succeeded(record),
        Err(err) => {
            // The file stays; history only lists what has a record
            warn!(
                request_id = %id,
                path = %record.artifact_path.display(),
                "Artifact written but not recorded"
            );
            Outcome::Failed(err)
        }
    }
}
